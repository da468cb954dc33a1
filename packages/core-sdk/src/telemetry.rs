use std::time::Duration;

use tracing::Span;
use tracing_subscriber::EnvFilter;

use crate::error::GatewayError;
use crate::models::GeneratedImage;
use crate::router::Provider;

pub const DEFAULT_FILTER: &str = "picrelay=info,picrelay_core_sdk=info,tower_http=info";

/**
 * \brief 安装全局 fmt 订阅器；优先使用 RUST_LOG。重复调用时静默忽略。
 */
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/**
 * \brief 生成单次请求的关联 ID。
 */
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/**
 * \brief 请求级 span，内部所有事件都带上 request_id。
 */
pub fn request_span(request_id: &str) -> Span {
    tracing::info_span!("request", request_id = %request_id)
}

/**
 * \brief 记录常规事件。
 */
pub fn log_event(category: &str, message: &str) {
    tracing::info!(category = category, "{}", message);
}

/**
 * \brief 记录错误事件。
 */
pub fn log_error(category: &str, message: &str) {
    tracing::error!(category = category, "{}", message);
}

pub fn log_call_start(stream: bool, message_count: usize) {
    tracing::info!(stream, messages = message_count, "chat completion started");
}

pub fn log_prompt(prompt: &str) {
    tracing::info!(prompt = %prompt, "prompt resolved");
}

pub fn log_input_images(images: &[String]) {
    let refs: Vec<String> = images.iter().map(|r| abbreviate(r)).collect();
    tracing::info!(count = images.len(), images = ?refs, "input images");
}

pub fn log_generation_start(provider: Provider, model: &str, size: &str, image_count: usize) {
    tracing::info!(
        provider = %provider,
        model = %model,
        size = %size,
        images = image_count,
        "generation started"
    );
}

pub fn log_output_images(images: &[GeneratedImage]) {
    let refs: Vec<String> = images
        .iter()
        .map(|img| match (&img.inline, &img.url) {
            (Some(inline), _) => format!(
                "inline:{} ({} chars)",
                inline.mime_type,
                inline.data.len()
            ),
            (None, Some(url)) => url.clone(),
            (None, None) => "<empty>".to_string(),
        })
        .collect();
    tracing::info!(count = images.len(), images = ?refs, "output images");
}

pub fn log_failure(err: &GatewayError) {
    tracing::error!(
        kind = err.kind(),
        provider = err.provider().map(|p| p.as_str()).unwrap_or("none"),
        reason = %err,
        "request failed"
    );
}

/**
 * \brief 每个请求恰好记录一次结束事件，无论成功与否。
 */
pub fn log_call_end(success: bool, elapsed: Duration) {
    tracing::info!(
        success,
        elapsed_ms = elapsed.as_millis() as u64,
        "chat completion finished"
    );
}

/** \brief data URI 只保留头部，避免把整段 base64 写进日志。 */
pub fn abbreviate(reference: &str) -> String {
    if reference.starts_with("data:") && reference.len() > 48 {
        let head: String = reference.chars().take(40).collect();
        format!("{}...({} chars)", head, reference.len())
    } else {
        reference.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_uris_are_shortened() {
        let long = format!("data:image/png;base64,{}", "A".repeat(200));
        let short = abbreviate(&long);
        assert!(short.starts_with("data:image/png;base64,"));
        assert!(short.ends_with(&format!("({} chars)", long.len())));
        assert_eq!(abbreviate("https://x/y.png"), "https://x/y.png");
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(new_request_id(), new_request_id());
        assert_eq!(new_request_id().len(), 32);
    }
}

use serde_json::{json, Value};

use crate::models::GeneratedImage;

/** \brief 没有任何可用图片时返回的固定文本，保证回复内容不为空。 */
pub const EMPTY_RESULT_PLACEHOLDER: &str =
    "Image generation failed: the backend returned no images.";

/**
 * \brief 把图片列表转成 markdown；内联数据优先于 URL，条目之间空一行。
 */
pub fn format_images(images: &[GeneratedImage]) -> String {
    let lines: Vec<String> = images
        .iter()
        .filter_map(|img| match (&img.inline, &img.url) {
            (Some(inline), _) => Some(format!(
                "![Generated Image](data:{};base64,{})",
                inline.mime_type, inline.data
            )),
            (None, Some(url)) if !url.is_empty() => Some(format!("![Generated Image]({})", url)),
            _ => None,
        })
        .collect();
    if lines.is_empty() {
        return EMPTY_RESULT_PLACEHOLDER.to_string();
    }
    lines.join("\n\n")
}

/**
 * \brief 非流式 chat.completion 响应体。
 */
pub fn chat_completion(id: &str, model: &str, created: i64, content: &str) -> Value {
    json!({
        "id": id,
        "object": "chat.completion",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0}
    })
}

/**
 * \brief 流式响应的两个分块：先给出完整内容，再给出结束原因。
 * 调用方在其后追加 `[DONE]`。
 */
pub fn stream_chunks(id: &str, model: &str, created: i64, content: &str) -> [Value; 2] {
    let chunk = |delta: Value, finish: Value| {
        json!({
            "id": id,
            "object": "chat.completion.chunk",
            "created": created,
            "model": model,
            "choices": [{"index": 0, "delta": delta, "finish_reason": finish}]
        })
    };
    [
        chunk(json!({"role": "assistant", "content": content}), Value::Null),
        chunk(json!({}), json!("stop")),
    ]
}

/**
 * \brief 统一错误信封。
 */
pub fn error_envelope(message: &str, kind: &str, provider: Option<&str>) -> Value {
    json!({
        "error": {
            "message": message,
            "type": kind,
            "provider": provider,
        }
    })
}

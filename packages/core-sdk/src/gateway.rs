use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use time::OffsetDateTime;
use tracing::Instrument;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::extract;
use crate::http::HttpClient;
use crate::models::ChatCompletionRequest;
use crate::providers::ImageAdapter;
use crate::response;
use crate::router::{self, Provider};
use crate::telemetry;

/**
 * \brief 一次成功生成的结果，由入口层包装成 JSON 或 SSE。
 */
#[derive(Debug, Clone)]
pub struct Completion {
    pub id: String,
    pub model: String,
    pub created: i64,
    pub content: String,
    pub provider: Provider,
}

impl Completion {
    pub fn to_json(&self) -> serde_json::Value {
        response::chat_completion(&self.id, &self.model, self.created, &self.content)
    }
}

/**
 * \brief 请求分发器：凭证 → Provider → (prompt, images) → 适配器 → markdown。
 * 不保存跨请求状态，可在多个并发请求间共享。
 */
#[derive(Debug, Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    client: HttpClient,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = HttpClient::new(config.request_timeout())?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /**
     * \brief 处理一次 chat completion。
     * \param authorization 原始 Authorization 头（可缺省）
     */
    pub async fn complete(
        &self,
        authorization: Option<&str>,
        request: &ChatCompletionRequest,
    ) -> Result<Completion, GatewayError> {
        let request_id = telemetry::new_request_id();
        let span = telemetry::request_span(&request_id);
        async move {
            let started = Instant::now();
            telemetry::log_call_start(request.stream, request.messages.len());
            let result = self.run(&request_id, authorization, request).await;
            if let Err(err) = &result {
                telemetry::log_failure(err);
            }
            telemetry::log_call_end(result.is_ok(), started.elapsed());
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        request_id: &str,
        authorization: Option<&str>,
        request: &ChatCompletionRequest,
    ) -> Result<Completion, GatewayError> {
        let credential = authorization
            .and_then(bearer_token)
            .ok_or_else(|| GatewayError::Authentication("missing bearer credential".into()))?;
        let provider = router::classify(credential);
        let adapter = ImageAdapter::select(provider, &self.config, &self.client)?;

        let mut canonical = extract::extract(&request.messages);
        canonical.requested_model = request.model.clone();
        canonical.requested_size = request.size.clone();
        telemetry::log_prompt(&canonical.prompt);
        telemetry::log_input_images(&canonical.images);

        let images = adapter.generate(credential, &canonical).await?;
        telemetry::log_output_images(&images);

        let model = request
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| adapter.default_model().to_string());
        Ok(Completion {
            id: format!("chatcmpl-{}", request_id),
            model,
            created: OffsetDateTime::now_utc().unix_timestamp(),
            content: response::format_images(&images),
            provider,
        })
    }
}

/**
 * \brief 解析 `Bearer <token>`；scheme 大小写不敏感，空 token 视为缺失。
 */
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};

use crate::config::ModelScopeConfig;
use crate::error::GatewayError;
use crate::http::{bearer_headers, ensure_success, HttpClient, RequestBody};
use crate::models::{CanonicalRequest, GeneratedImage};
use crate::providers::resolve_choice;
use crate::router::Provider;
use crate::telemetry;

const PROVIDER: Provider = Provider::ModelScope;

/**
 * \brief 单次轮询结果。Pending 继续，其余为终态。
 */
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    Pending,
    Succeeded(Vec<String>),
    Failed(Value),
}

/**
 * \brief 根据 `task_status` 判断任务状态。
 */
pub fn poll_status(v: &Value) -> PollStatus {
    match v.get("task_status").and_then(|s| s.as_str()) {
        Some("SUCCEED") => PollStatus::Succeeded(
            v.get("output_images")
                .and_then(|o| o.as_array())
                .map(|urls| {
                    urls.iter()
                        .filter_map(|u| u.as_str())
                        .filter(|u| !u.is_empty())
                        .map(|u| u.to_string())
                        .collect()
                })
                .unwrap_or_default(),
        ),
        Some("FAILED") => PollStatus::Failed(v.clone()),
        _ => PollStatus::Pending,
    }
}

/**
 * \brief 魔搭异步适配器：先提交任务，再按固定间隔轮询直到终态或次数用尽。
 */
#[derive(Debug, Clone)]
pub struct ModelScopeAdapter {
    config: ModelScopeConfig,
    client: HttpClient,
}

impl ModelScopeAdapter {
    pub fn new(config: ModelScopeConfig, client: HttpClient) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &ModelScopeConfig {
        &self.config
    }

    pub async fn generate(
        &self,
        credential: &str,
        request: &CanonicalRequest,
    ) -> Result<Vec<GeneratedImage>, GatewayError> {
        let model = resolve_choice(
            request.requested_model.as_deref(),
            &self.config.models,
            &self.config.default_model,
        );
        let size = resolve_choice(
            request.requested_size.as_deref(),
            &self.config.sizes,
            &self.config.default_size,
        );
        if !request.images.is_empty() {
            tracing::warn!(
                provider = %PROVIDER,
                ignored = request.images.len(),
                "input images are not sent to this backend"
            );
        }
        telemetry::log_generation_start(PROVIDER, &model, &size, 0);

        let task_id = self.submit(credential, &model, &request.prompt, &size).await?;
        tracing::info!(provider = %PROVIDER, task_id = %task_id, "task submitted");
        let urls = self.wait(credential, &task_id).await?;
        Ok(urls.into_iter().map(GeneratedImage::from_url).collect())
    }

    async fn submit(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
        size: &str,
    ) -> Result<String, GatewayError> {
        let url = format!("{}/v1/images/generations", self.base());
        let mut headers = bearer_headers(credential);
        headers.insert("X-ModelScope-Async-Mode", HeaderValue::from_static("true"));
        let body = json!({
            "model": model,
            "prompt": prompt,
            "size": size,
            "n": 1,
        });
        let resp = self
            .client
            .call(Method::POST, &url, headers, RequestBody::Json(body), None)
            .await
            .map_err(|e| GatewayError::from_http(PROVIDER, e))?;
        let resp = ensure_success(&url, resp)
            .await
            .map_err(|e| GatewayError::from_http(PROVIDER, e))?;
        let text = self
            .client
            .read_text(&url, resp)
            .await
            .map_err(|e| GatewayError::from_http(PROVIDER, e))?;
        let v: Value = serde_json::from_str(&text)
            .map_err(|e| GatewayError::data(PROVIDER, format!("invalid submit json: {}", e)))?;
        v.get("task_id")
            .and_then(|id| match id {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| GatewayError::data(PROVIDER, format!("missing task_id: {}", v)))
    }

    /**
     * \brief 轮询状态机：Pending → Succeeded | Failed | TimedOut。
     * 单次轮询的网络错误、非 2xx 或无法解析的响应都只记录日志并继续。
     */
    async fn wait(&self, credential: &str, task_id: &str) -> Result<Vec<String>, GatewayError> {
        let url = format!("{}/v1/tasks/{}", self.base(), task_id);
        let max_attempts = self.config.max_poll_attempts;
        for attempt in 1..=max_attempts {
            tokio::time::sleep(self.config.poll_interval()).await;
            let v = match self.poll_once(credential, &url).await {
                Ok(v) => v,
                Err(reason) => {
                    tracing::warn!(
                        attempt,
                        task_id = %task_id,
                        reason = %reason,
                        "poll failed, retrying"
                    );
                    continue;
                }
            };
            match poll_status(&v) {
                PollStatus::Pending => {
                    tracing::debug!(attempt, task_id = %task_id, "task pending");
                }
                PollStatus::Succeeded(urls) => {
                    tracing::info!(
                        attempt,
                        task_id = %task_id,
                        images = urls.len(),
                        "task succeeded"
                    );
                    return Ok(urls);
                }
                PollStatus::Failed(payload) => {
                    return Err(GatewayError::data(
                        PROVIDER,
                        format!("task {} failed: {}", task_id, payload),
                    ));
                }
            }
        }
        Err(GatewayError::Timeout {
            provider: PROVIDER,
            message: format!(
                "task {} not finished after {} polls",
                task_id, max_attempts
            ),
        })
    }

    async fn poll_once(&self, credential: &str, url: &str) -> Result<Value, String> {
        let mut headers: HeaderMap = bearer_headers(credential);
        headers.insert(
            "X-ModelScope-Task-Type",
            HeaderValue::from_static("image_generation"),
        );
        let resp = self
            .client
            .call(Method::GET, url, headers, RequestBody::Empty, None)
            .await
            .map_err(|e| e.to_string())?;
        let resp = ensure_success(url, resp).await.map_err(|e| e.to_string())?;
        let text = self
            .client
            .read_text(url, resp)
            .await
            .map_err(|e| e.to_string())?;
        serde_json::from_str(&text).map_err(|e| format!("invalid poll json: {}", e))
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }
}

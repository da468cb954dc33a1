use std::pin::Pin;
use std::time::Duration;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use reqwest::{Method, Response};
use serde_json::{json, Value};

use crate::config::HuggingFaceConfig;
use crate::error::{GatewayError, HttpError};
use crate::http::{bearer_headers, classify, ensure_success, HttpClient, RequestBody};
use crate::models::{CanonicalRequest, GeneratedImage};
use crate::providers::resolve_choice;
use crate::router::Provider;
use crate::telemetry;

const PROVIDER: Provider = Provider::HuggingFace;

/**
 * \brief 逐行解析 Gradio 结果流的状态机。
 *
 * `event: complete` 之后的下一行 `data:` 是结果；其它事件会清除等待状态，
 * 它们的 data 行被忽略；`event: error` 直接判定该地址失败。
 */
#[derive(Debug, Default)]
pub struct EventStreamParser {
    event: Option<String>,
    awaiting_data: bool,
}

/**
 * \brief 喂入一行后的结果。
 */
#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Image(String),
    Failed(String),
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, line: &str) -> LineOutcome {
        let line = line.trim_end_matches('\r');
        if let Some(event) = line.strip_prefix("event:") {
            let event = event.trim();
            self.awaiting_data = event == "complete";
            self.event = Some(event.to_string());
            if event == "error" {
                return LineOutcome::Failed("endpoint reported an error event".into());
            }
            return LineOutcome::Continue;
        }
        if let Some(data) = line.strip_prefix("data:") {
            if !self.awaiting_data {
                return LineOutcome::Continue;
            }
            self.awaiting_data = false;
            return match first_image_url(data.trim()) {
                Some(url) => LineOutcome::Image(url),
                None => LineOutcome::Failed(format!("unusable complete payload: {}", data.trim())),
            };
        }
        LineOutcome::Continue
    }

    pub fn last_event(&self) -> Option<&str> {
        self.event.as_deref()
    }
}

fn first_image_url(payload: &str) -> Option<String> {
    let v: Value = serde_json::from_str(payload).ok()?;
    v.as_array()?
        .first()?
        .get("url")?
        .as_str()
        .filter(|u| !u.is_empty())
        .map(|u| u.to_string())
}

/**
 * \brief 把 "WxH" 解析成 (width, height)。
 */
pub fn parse_size(size: &str) -> Option<(u32, u32)> {
    let (w, h) = size.split_once(['x', 'X', '*'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

/**
 * \brief HuggingFace Space 适配器：按顺序尝试地址池，首个成功即返回。
 */
#[derive(Debug, Clone)]
pub struct HuggingFaceAdapter {
    config: HuggingFaceConfig,
    client: HttpClient,
}

impl HuggingFaceAdapter {
    pub fn new(config: HuggingFaceConfig, client: HttpClient) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &HuggingFaceConfig {
        &self.config
    }

    pub async fn generate(
        &self,
        credential: &str,
        request: &CanonicalRequest,
    ) -> Result<Vec<GeneratedImage>, GatewayError> {
        if self.config.endpoints.is_empty() {
            return Err(GatewayError::Configuration {
                provider: PROVIDER,
                message: "endpoint pool is empty".into(),
            });
        }
        if !request.images.is_empty() {
            tracing::warn!(
                provider = %PROVIDER,
                ignored = request.images.len(),
                "input images ignored, backend has no edit mode"
            );
        }
        let size = resolve_choice(
            request.requested_size.as_deref(),
            &self.config.sizes,
            &self.config.default_size,
        );
        let (width, height) = parse_size(&size)
            .or_else(|| parse_size(&self.config.default_size))
            .unwrap_or((1024, 1024));
        let seed: u32 = rand::random_range(0..i32::MAX as u32);
        telemetry::log_generation_start(PROVIDER, &self.config.model, &size, 0);

        let payload = json!({
            "data": [request.prompt, height, width, self.config.steps, seed, false]
        });

        let mut last_error: Option<GatewayError> = None;
        for (index, base) in self.config.endpoints.iter().enumerate() {
            match self.attempt(base, credential, &payload).await {
                Ok(url) => {
                    tracing::info!(endpoint = %base, attempt = index + 1, "endpoint succeeded");
                    return Ok(vec![GeneratedImage::from_url(url)]);
                }
                Err(err) => {
                    tracing::warn!(
                        endpoint = %base,
                        attempt = index + 1,
                        error = %err,
                        "endpoint failed, trying next"
                    );
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| GatewayError::data(PROVIDER, "all endpoints failed")))
    }

    async fn attempt(
        &self,
        base: &str,
        credential: &str,
        payload: &Value,
    ) -> Result<String, GatewayError> {
        let base = base.trim_end_matches('/');
        let submit_url = format!("{}/gradio_api/call/{}", base, self.config.api_name);
        let resp = self
            .client
            .call(
                Method::POST,
                &submit_url,
                bearer_headers(credential),
                RequestBody::Json(payload.clone()),
                None,
            )
            .await
            .map_err(|e| GatewayError::from_http(PROVIDER, e))?;
        let resp = ensure_success(&submit_url, resp)
            .await
            .map_err(|e| GatewayError::from_http(PROVIDER, e))?;
        let text = self
            .client
            .read_text(&submit_url, resp)
            .await
            .map_err(|e| GatewayError::from_http(PROVIDER, e))?;
        let event_id = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("event_id").and_then(|e| e.as_str()).map(|e| e.to_string()))
            .filter(|e| !e.is_empty())
            .ok_or_else(|| GatewayError::data(PROVIDER, format!("missing event_id: {}", text)))?;

        let result_url = format!("{}/{}", submit_url, event_id);
        let resp = self
            .client
            .call(
                Method::GET,
                &result_url,
                bearer_headers(credential),
                RequestBody::Empty,
                None,
            )
            .await
            .map_err(|e| GatewayError::from_http(PROVIDER, e))?;
        let resp = ensure_success(&result_url, resp)
            .await
            .map_err(|e| GatewayError::from_http(PROVIDER, e))?;

        let mut parser = EventStreamParser::new();
        let mut lines = sse_lines(result_url.clone(), self.client.default_timeout(), resp);
        while let Some(line) = lines.as_mut().next().await {
            let line = line.map_err(|e| GatewayError::from_http(PROVIDER, e))?;
            match parser.feed(&line) {
                LineOutcome::Continue => {}
                LineOutcome::Image(url) => return Ok(url),
                LineOutcome::Failed(reason) => return Err(GatewayError::data(PROVIDER, reason)),
            }
        }
        Err(GatewayError::data(
            PROVIDER,
            format!(
                "stream ended without a complete payload (last event: {})",
                parser.last_event().unwrap_or("none")
            ),
        ))
    }
}

/**
 * \brief 把 SSE 响应体按行切分；读取失败沿用客户端的超时/传输错误分类。
 */
fn sse_lines(
    url: String,
    timeout: Duration,
    resp: Response,
) -> Pin<Box<dyn Stream<Item = Result<String, HttpError>> + Send>> {
    let mut stream = Box::pin(resp.bytes_stream());
    let mut buf = Vec::<u8>::new();
    let out = try_stream! {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify(&url, timeout, e))?;
            buf.extend_from_slice(&chunk);
            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line = buf.drain(..=pos).collect::<Vec<u8>>();
                yield String::from_utf8_lossy(&line[..pos]).into_owned();
            }
        }
        if !buf.is_empty() {
            yield String::from_utf8_lossy(&buf).into_owned();
        }
    };
    Box::pin(out)
}

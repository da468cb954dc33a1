use futures_util::future::join_all;
use reqwest::Method;
use serde_json::{json, Value};

use crate::config::VolcEngineConfig;
use crate::error::GatewayError;
use crate::http::{bearer_headers, ensure_success, HttpClient, RequestBody};
use crate::media;
use crate::models::{CanonicalRequest, GeneratedImage};
use crate::providers::resolve_choice;
use crate::router::Provider;
use crate::telemetry;

const PROVIDER: Provider = Provider::VolcEngine;

/**
 * \brief 火山引擎同步 JSON 适配器：一次阻塞 POST，默认取回 b64_json。
 */
#[derive(Debug, Clone)]
pub struct VolcEngineAdapter {
    config: VolcEngineConfig,
    client: HttpClient,
}

impl VolcEngineAdapter {
    pub fn new(config: VolcEngineConfig, client: HttpClient) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &VolcEngineConfig {
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
        telemetry::log_generation_start(PROVIDER, &model, &size, request.images.len());

        // 各图片互不依赖，并发下载；join_all 保持输入顺序
        let images = join_all(
            request
                .images
                .iter()
                .map(|r| media::inline_reference(&self.client, r)),
        )
        .await;

        let body = build_payload(&model, &request.prompt, &size, &images);
        let url = self.config.endpoint.as_str();
        let resp = self
            .client
            .call(
                Method::POST,
                url,
                bearer_headers(credential),
                RequestBody::Json(body),
                None,
            )
            .await
            .map_err(|e| GatewayError::from_http(PROVIDER, e))?;
        let resp = ensure_success(url, resp)
            .await
            .map_err(|e| GatewayError::from_http(PROVIDER, e))?;
        let text = self
            .client
            .read_text(url, resp)
            .await
            .map_err(|e| GatewayError::from_http(PROVIDER, e))?;
        let v: Value = serde_json::from_str(&text)
            .map_err(|e| GatewayError::data(PROVIDER, format!("invalid json: {}", e)))?;
        parse_response(&v)
    }
}

/**
 * \brief 构造请求体；只有存在输入图片时才带 `image` 字段。
 */
pub fn build_payload(model: &str, prompt: &str, size: &str, images: &[String]) -> Value {
    let mut body = json!({
        "model": model,
        "prompt": prompt,
        "size": size,
        "response_format": "b64_json",
        "watermark": false,
    });
    match images {
        [] => {}
        [single] => body["image"] = json!(single),
        many => {
            body["image"] = json!(many);
            body["sequential_image_generation"] = json!("disabled");
        }
    }
    body
}

fn parse_response(v: &Value) -> Result<Vec<GeneratedImage>, GatewayError> {
    let data = v
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| GatewayError::data(PROVIDER, format!("missing data array: {}", v)))?;
    Ok(data
        .iter()
        .filter_map(|item| {
            if let Some(b64) = item
                .get("b64_json")
                .and_then(|b| b.as_str())
                .filter(|b| !b.is_empty())
            {
                let mime = media::sniff_base64_mime(b64, "image/jpeg");
                return Some(GeneratedImage::from_base64(b64, mime));
            }
            item.get("url")
                .and_then(|u| u.as_str())
                .filter(|u| !u.is_empty())
                .map(GeneratedImage::from_url)
        })
        .collect())
}

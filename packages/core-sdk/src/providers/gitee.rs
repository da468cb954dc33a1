use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::{json, Value};

use crate::config::GiteeConfig;
use crate::error::GatewayError;
use crate::http::{bearer_headers, ensure_success, HttpClient, RequestBody};
use crate::media::{self, ImageLoadError};
use crate::models::{CanonicalRequest, GeneratedImage};
use crate::providers::resolve_choice;
use crate::router::Provider;
use crate::telemetry;

const PROVIDER: Provider = Provider::Gitee;

/**
 * \brief Gitee AI 适配器：有输入图片走编辑（multipart），否则走生成（JSON）。
 */
#[derive(Debug, Clone)]
pub struct GiteeAdapter {
    config: GiteeConfig,
    client: HttpClient,
}

impl GiteeAdapter {
    pub fn new(config: GiteeConfig, client: HttpClient) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &GiteeConfig {
        &self.config
    }

    pub async fn generate(
        &self,
        credential: &str,
        request: &CanonicalRequest,
    ) -> Result<Vec<GeneratedImage>, GatewayError> {
        match request.images.first() {
            Some(image) => self.edit(credential, request, image).await,
            None => self.text_to_image(credential, request).await,
        }
    }

    async fn edit(
        &self,
        credential: &str,
        request: &CanonicalRequest,
        image: &str,
    ) -> Result<Vec<GeneratedImage>, GatewayError> {
        let default_model = self
            .config
            .edit_models
            .first()
            .cloned()
            .ok_or_else(|| GatewayError::Configuration {
                provider: PROVIDER,
                message: "edit model list is empty".into(),
            })?;
        let model = resolve_choice(
            request.requested_model.as_deref(),
            &self.config.edit_models,
            &default_model,
        );
        let size = self.config.edit_size.clone();
        if request.images.len() > 1 {
            tracing::warn!(
                provider = %PROVIDER,
                ignored = request.images.len() - 1,
                "edit mode uses only the first image"
            );
        }
        telemetry::log_generation_start(PROVIDER, &model, &size, 1);

        let (bytes, mime) = media::load_image_bytes(&self.client, image)
            .await
            .map_err(|e| match e {
                ImageLoadError::Fetch(err) => GatewayError::from_http(PROVIDER, err),
                ImageLoadError::Decode(err) => {
                    GatewayError::data(PROVIDER, format!("input image: {}", err))
                }
            })?;
        let part = Part::bytes(bytes)
            .file_name(format!("image.{}", media::extension_for(&mime)))
            .mime_str(&mime)
            .map_err(|e| GatewayError::data(PROVIDER, format!("input image mime: {}", e)))?;
        let form = Form::new()
            .text("model", model)
            .text("prompt", request.prompt.clone())
            .text("size", size)
            .text("n", "1")
            .text("response_format", "b64_json")
            .part("image", part);

        self.send(
            credential,
            &self.config.edit_endpoint,
            RequestBody::Multipart(form),
        )
        .await
    }

    async fn text_to_image(
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
        telemetry::log_generation_start(PROVIDER, &model, &size, 0);

        let body = json!({
            "model": model,
            "prompt": request.prompt,
            "size": size,
            "n": 1,
            "response_format": "b64_json",
        });
        self.send(
            credential,
            &self.config.generation_endpoint,
            RequestBody::Json(body),
        )
        .await
    }

    async fn send(
        &self,
        credential: &str,
        url: &str,
        body: RequestBody,
    ) -> Result<Vec<GeneratedImage>, GatewayError> {
        let resp = self
            .client
            .call(Method::POST, url, bearer_headers(credential), body, None)
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
 * \brief 解析 `{data: [{b64_json|url}]}`；结果为空视为失败。
 */
fn parse_response(v: &Value) -> Result<Vec<GeneratedImage>, GatewayError> {
    let images: Vec<GeneratedImage> = v
        .get("data")
        .and_then(|d| d.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    if let Some(b64) = item.get("b64_json").and_then(|b| b.as_str()) {
                        if !b64.is_empty() {
                            let mime = media::sniff_base64_mime(b64, "image/png");
                            return Some(GeneratedImage::from_base64(b64, mime));
                        }
                    }
                    item.get("url")
                        .and_then(|u| u.as_str())
                        .filter(|u| !u.is_empty())
                        .map(GeneratedImage::from_url)
                })
                .collect()
        })
        .unwrap_or_default();
    if images.is_empty() {
        return Err(GatewayError::data(
            PROVIDER,
            format!("no images in response: {}", v),
        ));
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_is_a_failure() {
        assert!(parse_response(&json!({"data": []})).is_err());
        assert!(parse_response(&json!({})).is_err());
    }

    #[test]
    fn test_base64_results_default_to_png() {
        let v = json!({"data": [{"b64_json": "iVBORw0KGgoAAAANSUhEUg"}]});
        let images = parse_response(&v).unwrap();
        assert_eq!(images[0].inline.as_ref().unwrap().mime_type, "image/png");
    }
}

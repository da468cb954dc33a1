use std::time::Duration;

use anyhow::Result;
use reqwest::header::HeaderMap;
use reqwest::{multipart::Form, Method, Response};
use serde_json::Value;

use crate::error::HttpError;

/**
 * \brief 出站请求体。
 */
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(Form),
}

/**
 * \brief 所有出站调用共用的超时受限请求原语。
 *
 * 超时作用于整个请求（连接、发送、读取响应体）；超时后 future 被丢弃，
 * 底层连接随之关闭，而不是在后台继续等待。
 */
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    default_timeout: Duration,
}

impl HttpClient {
    pub fn new(default_timeout: Duration) -> Result<Self> {
        let inner = reqwest::Client::builder().build()?;
        Ok(Self {
            inner,
            default_timeout,
        })
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /**
     * \brief 发起一次请求；非 2xx 状态不视为错误，由调用方自行判断。
     * \param timeout 为空时使用共享默认超时
     */
    pub async fn call(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: RequestBody,
        timeout: Option<Duration>,
    ) -> Result<Response, HttpError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let mut req = self
            .inner
            .request(method, url)
            .headers(headers)
            .timeout(timeout);
        req = match body {
            RequestBody::Empty => req,
            RequestBody::Json(v) => req.json(&v),
            RequestBody::Multipart(form) => req.multipart(form),
        };
        req.send().await.map_err(|e| classify(url, timeout, e))
    }

    /**
     * \brief 读取完整响应体；失败按超时/传输错误归类。
     */
    pub async fn read_text(&self, url: &str, resp: Response) -> Result<String, HttpError> {
        resp.text()
            .await
            .map_err(|e| classify(url, self.default_timeout, e))
    }

    /**
     * \brief GET 下载原始字节，返回 (字节, Content-Type)。非 2xx 视为错误。
     */
    pub async fn fetch_bytes(&self, url: &str) -> Result<(Vec<u8>, Option<String>), HttpError> {
        let resp = self
            .call(Method::GET, url, HeaderMap::new(), RequestBody::Empty, None)
            .await?;
        let resp = ensure_success(url, resp).await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| classify(url, self.default_timeout, e))?;
        Ok((bytes.to_vec(), content_type))
    }
}

pub(crate) fn classify(url: &str, timeout: Duration, err: reqwest::Error) -> HttpError {
    if err.is_timeout() {
        HttpError::Timeout {
            url: url.to_string(),
            timeout,
        }
    } else {
        HttpError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/**
 * \brief 构造 `Authorization: Bearer <credential>` 头。
 */
pub fn bearer_headers(credential: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = format!("Bearer {}", credential).parse() {
        headers.insert(reqwest::header::AUTHORIZATION, value);
    }
    headers
}

/**
 * \brief 检查状态码，非 2xx 时连同响应体一起返回。
 */
pub async fn ensure_success(url: &str, resp: Response) -> Result<Response, HttpError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(HttpError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

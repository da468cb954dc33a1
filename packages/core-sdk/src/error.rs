use std::time::Duration;

use thiserror::Error;

use crate::router::Provider;

/**
 * \brief 网关统一错误分类；入口层据此生成错误信封。
 */
#[derive(Debug, Error)]
pub enum GatewayError {
    /** \brief 缺少凭证或凭证无法识别，对应 401。 */
    #[error("authentication failed: {0}")]
    Authentication(String),

    /** \brief 请求体无法解析，对应 400。 */
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{provider} returned HTTP {status}: {body}")]
    BackendHttp {
        provider: Provider,
        status: u16,
        body: String,
    },

    #[error("{provider} returned unusable data: {message}")]
    BackendData { provider: Provider, message: String },

    #[error("{provider} timed out: {message}")]
    Timeout { provider: Provider, message: String },

    #[error("{provider} transport error: {message}")]
    Transport { provider: Provider, message: String },

    #[error("{provider} is misconfigured: {message}")]
    Configuration { provider: Provider, message: String },
}

impl GatewayError {
    pub fn data(provider: Provider, message: impl Into<String>) -> Self {
        GatewayError::BackendData {
            provider,
            message: message.into(),
        }
    }

    /**
     * \brief 为底层 HTTP 错误附加 Provider 标签。
     */
    pub fn from_http(provider: Provider, err: HttpError) -> Self {
        match err {
            HttpError::Timeout { .. } => GatewayError::Timeout {
                provider,
                message: err.to_string(),
            },
            HttpError::Transport { .. } => GatewayError::Transport {
                provider,
                message: err.to_string(),
            },
            HttpError::Status { status, body, .. } => GatewayError::BackendHttp {
                provider,
                status,
                body,
            },
        }
    }

    pub fn provider(&self) -> Option<Provider> {
        match self {
            GatewayError::Authentication(_) | GatewayError::InvalidRequest(_) => None,
            GatewayError::BackendHttp { provider, .. }
            | GatewayError::BackendData { provider, .. }
            | GatewayError::Timeout { provider, .. }
            | GatewayError::Transport { provider, .. }
            | GatewayError::Configuration { provider, .. } => Some(*provider),
        }
    }

    /** \brief 认证错误映射为 401，请求体错误为 400，其余均为 500。 */
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Authentication(_) => 401,
            GatewayError::InvalidRequest(_) => 400,
            _ => 500,
        }
    }

    /** \brief 观测用的简短类别名。 */
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Authentication(_) => "authentication",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::BackendHttp { .. } => "backend_http",
            GatewayError::BackendData { .. } => "backend_data",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::Transport { .. } => "transport",
            GatewayError::Configuration { .. } => "configuration",
        }
    }
}

/**
 * \brief HTTP 客户端封装产生的错误，不携带 Provider 信息。
 */
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} returned HTTP {status}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
}

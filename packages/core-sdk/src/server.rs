use std::convert::Infallible;

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::GatewayError;
use crate::gateway::{self, Completion, Gateway};
use crate::models::ChatCompletionRequest;
use crate::{providers, response, telemetry};

/**
 * \brief 启动 OpenAI 兼容的 HTTP 网关。
 * \param addr 监听地址，如 "0.0.0.0:8080"
 */
pub async fn run(addr: &str, gateway: Gateway) -> Result<()> {
    let app = router(gateway);
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        telemetry::log_error("server", &format!("bind {} failed: {}", addr, e));
        e
    })?;
    telemetry::log_event("server", &format!("listening on http://{}", addr));
    if let Err(e) = axum::serve(listener, app).await {
        telemetry::log_error("server", &format!("server stopped: {}", e));
        return Err(e.into());
    }
    Ok(())
}

/**
 * \brief 构造路由；测试中可直接使用。
 */
pub fn router(gateway: Gateway) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

/**
 * \brief POST /v1/chat/completions
 *
 * 先检查凭证，再处理请求体的解析错误，两者都走统一错误信封。
 */
async fn chat_completions(
    State(gateway): State<Gateway>,
    headers: HeaderMap,
    body: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if authorization.and_then(gateway::bearer_token).is_none() {
        return reject(GatewayError::Authentication("missing bearer credential".into()));
    }
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return reject(GatewayError::InvalidRequest(rejection.body_text())),
    };
    match gateway.complete(authorization, &request).await {
        Ok(completion) if request.stream => stream_response(&completion),
        Ok(completion) => Json(completion.to_json()).into_response(),
        Err(err) => error_response(&err),
    }
}

fn stream_response(completion: &Completion) -> Response {
    let chunks = response::stream_chunks(
        &completion.id,
        &completion.model,
        completion.created,
        &completion.content,
    );
    let events: Vec<Result<Event, Infallible>> = chunks
        .iter()
        .map(|c| Ok(Event::default().data(c.to_string())))
        .chain(std::iter::once(Ok(Event::default().data("[DONE]"))))
        .collect();
    Sse::new(tokio_stream::iter(events)).into_response()
}

fn reject(err: GatewayError) -> Response {
    telemetry::log_failure(&err);
    error_response(&err)
}

/**
 * \brief 把网关错误转换为统一信封，不暴露适配器内部状态。
 */
pub fn error_response(err: &GatewayError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let kind = match status {
        StatusCode::UNAUTHORIZED => "authentication_error",
        StatusCode::BAD_REQUEST => "invalid_request_error",
        _ => "server_error",
    };
    let body = response::error_envelope(
        &err.to_string(),
        kind,
        err.provider().map(|p| p.as_str()),
    );
    (status, Json(body)).into_response()
}

/**
 * \brief GET /v1/models：列出所有已配置的模型。
 */
async fn list_models(State(gateway): State<Gateway>) -> Json<Value> {
    let data: Vec<Value> = providers::catalog(gateway.config())
        .into_iter()
        .map(|(provider, model)| {
            json!({
                "id": model,
                "object": "model",
                "owned_by": provider.as_str(),
            })
        })
        .collect();
    Json(json!({"object": "list", "data": data}))
}

async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

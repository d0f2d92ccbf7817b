use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::logging::SharedLogger;
use crate::models::ModelMap;
use crate::proxy::{self, StreamOutcome};
use crate::translate::STREAM_GENERATE_CONTENT;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub models: ModelMap,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1beta/models/:model_action", post(handle_generate))
        .route("/v1beta/models", get(handle_models))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_generate(
    State(state): State<Arc<AppState>>,
    Path(model_action): Path<String>,
    body: Bytes,
) -> Response {
    // Gemini-style paths put the action after the model id: "model:action"
    let Some((model, action)) = model_action.split_once(':') else {
        let err = error_body(400, "Expected path of the form model:action");
        return (StatusCode::BAD_REQUEST, Json(err)).into_response();
    };

    state.logger.info(
        "server",
        format!("Request: model={model} action={action} body_len={}", body.len()),
    );

    if action == STREAM_GENERATE_CONTENT {
        handle_streaming(state, &body, action, model).await
    } else {
        handle_non_streaming(state, &body, action, model).await
    }
}

async fn handle_non_streaming(
    state: Arc<AppState>,
    body: &Bytes,
    action: &str,
    model: &str,
) -> Response {
    match proxy::relay_non_streaming(
        body,
        action,
        model,
        &state.config,
        &state.models,
        &state.client,
        &state.logger,
    )
    .await
    {
        Ok(relayed) => {
            let status = StatusCode::from_u16(relayed.status).unwrap_or(StatusCode::BAD_GATEWAY);
            Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(relayed.body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(e) => proxy_error_response(&state, e),
    }
}

async fn handle_streaming(
    state: Arc<AppState>,
    body: &Bytes,
    action: &str,
    model: &str,
) -> Response {
    match proxy::relay_streaming(
        body,
        action,
        model,
        &state.config,
        &state.models,
        &state.client,
        &state.logger,
    )
    .await
    {
        Ok(StreamOutcome::Stream(lines)) => {
            let byte_stream = lines.map(Ok::<Bytes, Infallible>);
            Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "application/json")
                .header("cache-control", "no-cache")
                .body(Body::from_stream(byte_stream))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Ok(StreamOutcome::BackendError(relayed)) => {
            let status = StatusCode::from_u16(relayed.status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, relayed.body).into_response()
        }
        Err(e) => proxy_error_response(&state, e),
    }
}

fn proxy_error_response(state: &AppState, e: ProxyError) -> Response {
    state.logger.error("server", format!("Relay error: {e}"));

    let status = match e {
        ProxyError::MalformedInput { .. } => StatusCode::BAD_REQUEST,
        ProxyError::UnknownModel { .. } => StatusCode::NOT_FOUND,
        ProxyError::Backend { .. } | ProxyError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let err = error_body(status.as_u16(), &e.to_string());
    (status, Json(err)).into_response()
}

fn error_body(code: u16, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "code": code,
            "message": message,
        }
    })
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let mut names: Vec<&str> = state.models.public_ids().collect();
    names.sort_unstable();

    let models: Vec<serde_json::Value> = names
        .iter()
        .map(|name| serde_json::json!({ "name": format!("models/{name}") }))
        .collect();

    Json(serde_json::json!({ "models": models }))
}

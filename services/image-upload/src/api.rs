use crate::config::ApiConfig;
use crate::handler::UploadHandler;
use crate::metadata_store::MetadataStore;
use crate::response::ApiResponse;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub handler: UploadHandler,
    pub metadata_store: Arc<dyn MetadataStore>,
    pub service_name: String,
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, self.body).into_response();

        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                response.headers_mut().insert(name, value);
            }
        }

        response
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": state.service_name
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.metadata_store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not_ready",
                    "database": "disconnected"
                })),
            )
        }
    }
}

/// Upload endpoint. The request body is the upload payload itself.
#[instrument(skip_all, fields(size_bytes = body.len()))]
async fn upload(State(state): State<AppState>, body: Bytes) -> ApiResponse {
    let event = event_from_body(&body);
    state.handler.handle(&event).await
}

/// Wrap an HTTP body in the event shape the handler expects.
///
/// Bodies that are not JSON are passed on as a string so the decoder can
/// reject them.
fn event_from_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return json!({});
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(value) => json!({ "body": value }),
        Err(_) => json!({ "body": String::from_utf8_lossy(body) }),
    }
}

/// Start the API server and serve until `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting upload API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_from_body() {
        assert_eq!(event_from_body(b""), json!({}));
        assert_eq!(
            event_from_body(br#"{"company_id": 1}"#),
            json!({"body": {"company_id": 1}})
        );
        assert_eq!(event_from_body(b"not json"), json!({"body": "not json"}));
    }

    #[test]
    fn test_api_response_into_response() {
        let response = ApiResponse::error(400, "Invalid file content").into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }
}

//! HTTP surface: the WhatsApp webhook and a liveness check.
//!
//! `POST /webhook` validates the payload, hands the message to the
//! orchestrator on its own task, and acknowledges immediately. The answer to
//! the webhook caller never depends on how delivery goes.
//!
//! On shutdown the listener stops first, then messages already accepted are
//! given a bounded window to finish.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Form, FromRequest, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::orchestrator::Orchestrator;
use crate::whatsapp::{InboundMessage, WebhookError, WebhookPayload};

/// Empty TwiML document; tells Twilio there is no synchronous reply.
pub const EMPTY_TWIML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>";

/// Shared state for handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Message orchestrator.
    pub orchestrator: Arc<Orchestrator>,
}

/// Errors returned to HTTP callers.
#[derive(Debug)]
pub enum ApiError {
    /// The request is missing required data.
    BadRequest(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable reason.
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

/// Webhook body extractor accepting url-encoded forms or JSON.
#[derive(Debug)]
pub struct WebhookBody(pub WebhookPayload);

impl<S> FromRequest<S> for WebhookBody
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        if is_json {
            let Json(payload) = Json::<WebhookPayload>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(payload))
        } else {
            let Form(payload) = Form::<WebhookPayload>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(payload))
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// POST /webhook
async fn webhook_handler(
    State(state): State<AppState>,
    WebhookBody(payload): WebhookBody,
) -> Result<impl IntoResponse, ApiError> {
    let msg = InboundMessage::try_from(payload).map_err(|e| {
        warn!(error = %e, "rejecting malformed webhook");
        ApiError::from(e)
    })?;
    state.orchestrator.spawn(msg);
    Ok(([(CONTENT_TYPE, "text/xml")], EMPTY_TWIML))
}

/// GET /health
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Serve `state` on `listener` until Ctrl-C, then drain in-flight messages
/// for up to `drain_timeout`.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    drain_timeout: Duration,
) -> anyhow::Result<()> {
    serve_with_shutdown(listener, state, shutdown_signal(), drain_timeout).await
}

/// Like [`serve`], but stops accepting when `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
    drain_timeout: Duration,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "webhook server listening");
    let orchestrator = Arc::clone(&state.orchestrator);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    let abandoned = orchestrator.drain(drain_timeout).await;
    info!(abandoned, "webhook server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal, shutting down gracefully");
}

//! HTTP server implementation with route handlers
//!
//! Wires the axum router, validates request bodies, and maps session and
//! waiter results onto the JSON contract of each endpoint.

use std::sync::Arc;

use axum::extract::{FromRequest, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    GetLastMessageRequest, HealthResponse, InfoResponse, LastMessageResponse, SendRequest,
    SendResponse, WaitRequest, WaitResponse, format_timestamp,
};
use crate::session::SessionHolder;
use crate::waiter::{self, PollSettings};

/// Service name reported by `/info`
const SERVICE_NAME: &str = "Telegram Sender";
/// Characters of an outgoing message echoed into the log
const LOG_PREVIEW_CHARS: usize = 50;

/// Shared handler state
///
/// Cloned per request; the session itself is shared through `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The single authenticated session
    pub session: Arc<SessionHolder>,
    /// Poll cadence for `wait_for_response`
    pub poll: PollSettings,
}

/// JSON body extractor whose rejection is an [`AppError::InvalidInput`]
///
/// Keeps malformed bodies on the same `{error}` contract as missing fields.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection| AppError::InvalidInput(rejection.body_text()))
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info_endpoint))
        .route("/send_telegram", post(send_telegram))
        .route("/get_last_message", post(get_last_message))
        .route("/wait_for_response", post(wait_for_response))
        .layer(middleware::from_fn(request_span))
        .with_state(state)
}

/// Serve until Ctrl-C / SIGTERM, then release the session
///
/// # Errors
///
/// Returns `Internal` if the listener cannot bind or the server fails.
pub async fn serve(config: &ServerConfig, session: Arc<SessionHolder>) -> AppResult<()> {
    let state = AppState {
        session: session.clone(),
        poll: config.poll_settings(),
    };
    let listener = TcpListener::bind(config.bind_addr())
        .await
        .map_err(|e| AppError::Internal(format!("cannot bind {}: {e}", config.bind_addr())))?;
    info!("listening on {}", config.bind_addr());

    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Internal(format!("server error: {e}")));

    session.disconnect().await;
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

/// Run every request inside a span tagged with a fresh request id
async fn request_span(req: Request, next: Next) -> Response {
    let span = info_span!(
        "request",
        id = %Uuid::new_v4(),
        method = %req.method(),
        path = %req.uri().path(),
    );
    next.run(req).instrument(span).await
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let identity = state.session.current_identity().await;
    Json(HealthResponse {
        status: "ok".to_owned(),
        authenticated: state.session.is_authorized().await,
        connected: state.session.is_connected(),
        user: identity.and_then(|me| me.username),
        version: env!("CARGO_PKG_VERSION").to_owned(),
    })
}

async fn info_endpoint() -> Json<InfoResponse> {
    Json(InfoResponse {
        service: SERVICE_NAME.to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        endpoints: [
            "POST /send_telegram",
            "POST /get_last_message",
            "POST /wait_for_response",
            "GET /health",
            "GET /info",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect(),
    })
}

async fn send_telegram(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<SendRequest>,
) -> AppResult<Json<SendResponse>> {
    let (chat, text) = input.into_parts()?;
    state.session.require_identity().await?;

    info!("Sending to {chat}: {}...", preview(&text));
    let sent = state
        .session
        .send_message(&chat, &text)
        .await
        .inspect_err(|e| error!("Send error: {e}"))?;

    Ok(Json(SendResponse {
        success: true,
        message_id: sent.id,
        timestamp: format_timestamp(&sent.date.unwrap_or_else(Utc::now)),
    }))
}

async fn get_last_message(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<GetLastMessageRequest>,
) -> AppResult<Json<LastMessageResponse>> {
    let (chat, limit) = input.into_parts()?;
    state.session.require_identity().await?;

    let messages = state
        .session
        .fetch_recent(&chat, limit)
        .await
        .inspect_err(|e| error!("Get error: {e}"))?;
    Ok(Json(LastMessageResponse::from_newest(&messages)))
}

async fn wait_for_response(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<WaitRequest>,
) -> AppResult<Json<WaitResponse>> {
    let (chat, after_message_id, timeout_seconds) = input.into_parts()?;
    state.session.require_identity().await?;

    let timeout = state.poll.clamp_timeout(timeout_seconds);
    info!(
        "Waiting for reply in {chat} after message {after_message_id} ({:.1}s)",
        timeout.as_secs_f64()
    );
    let outcome = waiter::wait_for_response(
        &state.session,
        &chat,
        after_message_id,
        timeout,
        state.poll,
    )
    .await
    .inspect_err(|e| error!("Wait error: {e}"))?;
    Ok(Json(WaitResponse::from(outcome)))
}

/// First characters of an outgoing message for the log line
fn preview(text: &str) -> String {
    text.chars().take(LOG_PREVIEW_CHARS).collect()
}

//! HTTP hook for the chat transport.
//!
//! The transport (bot process, webhook relay) forwards each inbound message
//! here and relays the reply back to the chat.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check. Never touches a backend. |
//! | `POST` | `/commands` | Handle one message and return the reply |
//!
//! # Request / response
//!
//! ```json
//! { "actor": { "id": "123", "name": "Ana", "handle": "ana_q" }, "text": "/dni 12345678" }
//! ```
//!
//! ```json
//! {
//!   "outcome": "ok",
//!   "messages": ["..."],
//!   "attachments": [{ "filename": "Informe.pdf", "content_type": "application/pdf", "content_base64": "..." }]
//! }
//! ```
//!
//! Errors follow `{ "error": { "code": "bad_request", "message": "..." } }`.
//! Denials, backend failures and malformed commands are not HTTP errors;
//! they come back as a normal reply with the matching `outcome`.
//!
//! Each command runs on its own task. If the caller hangs up, the reply is
//! discarded but the command still finishes and its audit record is written.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::dispatch::{Dispatcher, Reply};
use crate::models::{Actor, Outcome};

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

/// Build the router. Exposed so tests and custom binaries can serve a
/// dispatcher wired by hand.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/commands", post(handle_command))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { dispatcher })
}

/// Wire the dispatcher from `config` and serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let dispatcher = Arc::new(Dispatcher::from_config(config).await?);
    tracing::info!(
        backends = ?dispatcher.enabled(),
        identity = dispatcher.has_identity(),
        audit = dispatcher.audit_sink(),
        messenger = dispatcher.messenger_name(),
        "dispatcher ready"
    );

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "listening");
    axum::serve(listener, router(dispatcher)).await?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Error response
// ═══════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// GET /health
// ═══════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ═══════════════════════════════════════════════════════════════════════
// POST /commands
// ═══════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct CommandRequest {
    actor: Actor,
    text: String,
}

#[derive(Serialize)]
struct AttachmentBody {
    filename: String,
    content_type: String,
    content_base64: String,
}

#[derive(Serialize)]
struct CommandResponse {
    outcome: Outcome,
    messages: Vec<String>,
    attachments: Vec<AttachmentBody>,
}

impl From<Reply> for CommandResponse {
    fn from(reply: Reply) -> Self {
        let engine = base64::engine::general_purpose::STANDARD;
        Self {
            outcome: reply.outcome,
            messages: reply.messages,
            attachments: reply
                .attachments
                .into_iter()
                .map(|a| AttachmentBody {
                    content_base64: engine.encode(&a.bytes),
                    filename: a.filename,
                    content_type: a.content_type,
                })
                .collect(),
        }
    }
}

async fn handle_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, AppError> {
    if req.actor.id.trim().is_empty() {
        return Err(bad_request("actor.id must not be empty"));
    }
    // Detached so a caller that disconnects cannot cancel a write or
    // broadcast halfway; the attempt still completes and is audited.
    let dispatcher = state.dispatcher.clone();
    let CommandRequest { actor, text } = req;
    let reply = tokio::spawn(async move { dispatcher.handle(&actor, &text).await })
        .await
        .map_err(|e| internal_error(format!("command task failed: {}", e)))?;
    Ok(Json(reply.into()))
}

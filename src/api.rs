//! REST API for the risk agent workflow
//!
//! Thin boundary over `WorkflowManager`: no logic beyond delegation.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::models::{RunStatus, WorkflowResult};
use crate::workflow::WorkflowManager;

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatMessageIn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessageIn>,
    pub session_id: Option<String>,
}

impl ChatRequest {
    /// `message`, else the last user entry of `messages`.
    fn user_message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or_else(|| {
                self.messages
                    .iter()
                    .rev()
                    .find(|m| m.role == "user")
                    .map(|m| m.content.as_str())
            })
            .filter(|m| !m.trim().is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ChatResponse {
    fn error(message: String) -> Self {
        Self {
            status: RunStatus::Error,
            response: None,
            error: Some(message),
            conversation_id: None,
            session_id: None,
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<WorkflowManager>,
    /// Cancelled on shutdown; every run gets a child token.
    pub shutdown: CancellationToken,
}

/// =============================
/// Handlers
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn run_workflow(State(state): State<ApiState>) -> (StatusCode, Json<WorkflowResult>) {
    info!("Received workflow run request");

    let run = state
        .manager
        .run_workflow(&state.shutdown.child_token())
        .await;

    let status = match run.status {
        RunStatus::Success => StatusCode::OK,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(run.result()))
}

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ChatResponse>) {
    let Some(message) = req.user_message() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ChatResponse::error("No user message found".into())),
        );
    };

    let session_id = match req.session_id.as_deref().map(Uuid::parse_str) {
        Some(Ok(id)) => Some(id),
        Some(Err(_)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ChatResponse::error("session_id must be a UUID".into())),
            )
        }
        None => None,
    };

    match state.manager.chat(session_id, message).await {
        Ok(reply) => (
            StatusCode::OK,
            Json(ChatResponse {
                status: RunStatus::Success,
                response: Some(reply.response),
                error: None,
                conversation_id: Some(reply.conversation_id.to_string()),
                session_id: Some(reply.session_id.to_string()),
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ChatResponse::error(format!("Chat failed: {}", e))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/workflow/run", post(run_workflow))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    manager: Arc<WorkflowManager>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let shutdown = CancellationToken::new();
    let router = create_router(ApiState {
        manager: Arc::clone(&manager),
        shutdown: shutdown.clone(),
    });

    let pruner = tokio::spawn(prune_sessions(Arc::clone(&manager), shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    let signal = shutdown.clone();
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested, cancelling in-flight runs");
            signal.cancel();
        })
        .await;

    shutdown.cancel();
    let _ = pruner.await;
    manager.cleanup_all_sessions().await;

    served?;
    Ok(())
}

/// Periodically drop idle chat sessions until `shutdown` fires.
async fn prune_sessions(manager: Arc<WorkflowManager>, shutdown: CancellationToken) {
    let max_idle = manager.settings().session_idle_timeout;
    let mut tick = tokio::time::interval((max_idle / 2).max(Duration::from_secs(1)));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tick.tick() => {
                manager.prune_idle_sessions(max_idle).await;
            }
        }
    }
}

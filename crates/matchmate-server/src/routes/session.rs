use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use matchmate::models::turn::Turn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct CreateSessionResponse {
    id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionResponse {
    id: String,
    turns: Vec<Turn>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let id = state.sessions.create().await;
    tracing::info!(session = %id, "created session");
    (StatusCode::CREATED, Json(CreateSessionResponse { id }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Some(conversation) = state.sessions.get(&id).await else {
        return error(StatusCode::NOT_FOUND, "Session not found");
    };

    // Turns are only committed when a cycle finishes, so a running cycle is reported as busy
    let Ok(conversation) = conversation.try_lock() else {
        return error(StatusCode::CONFLICT, "Session is busy");
    };

    Json(SessionResponse {
        id,
        turns: conversation.turns().to_vec(),
    })
    .into_response()
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if state.sessions.remove(&id).await {
        tracing::info!(session = %id, "deleted session");
        StatusCode::NO_CONTENT.into_response()
    } else {
        error(StatusCode::NOT_FOUND, "Session not found")
    }
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .with_state(state)
}

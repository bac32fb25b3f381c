use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{self, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use matchmate::{agent::ReplyEvent, output::AssistantReply};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Deserialize)]
struct ReplyRequest {
    message: String,
}

// Streamed response body in the data stream line protocol
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let body = axum::body::Body::from_stream(self);

        (
            [
                (http::header::CONTENT_TYPE, "text/event-stream"),
                (http::header::CACHE_CONTROL, "no-cache"),
                (http::header::CONNECTION, "keep-alive"),
            ],
            [("x-vercel-ai-data-stream", "v1")],
            body,
        )
            .into_response()
    }
}

// Protocol-specific message formatting
struct ProtocolFormatter;

impl ProtocolFormatter {
    fn format_text(text: &str) -> String {
        let encoded_text = serde_json::to_string(text).unwrap_or_else(|_| String::new());
        format!("0:{}\n", encoded_text)
    }

    fn format_tool_call(id: &str, name: &str, args: &Value) -> String {
        // Tool calls start with "9:"
        let tool_call = json!({
            "toolCallId": id,
            "toolName": name,
            "args": args
        });
        format!("9:{}\n", tool_call)
    }

    fn format_tool_result(id: &str, result: &Value) -> String {
        // Tool results start with "a:"
        let response = json!({
            "toolCallId": id,
            "result": result,
        });
        format!("a:{}\n", response)
    }

    fn format_reply(reply: &AssistantReply) -> String {
        // Structured data starts with "2:" and is always an array
        format!("2:{}\n", json!([reply]))
    }

    fn format_error(message: &str) -> String {
        let encoded = serde_json::to_string(message).unwrap_or_else(|_| String::new());
        format!("3:{}\n", encoded)
    }

    fn format_finish(reason: &str) -> String {
        // Finish messages start with "d:"
        let finish = json!({
            "finishReason": reason,
        });
        format!("d:{}\n", finish)
    }
}

fn format_event(event: &ReplyEvent) -> String {
    match event {
        ReplyEvent::TextDelta(text) => ProtocolFormatter::format_text(text),
        ReplyEvent::ToolCall {
            id,
            name,
            arguments,
        } => ProtocolFormatter::format_tool_call(id, name, arguments),
        ReplyEvent::ToolResult { id, outcome, .. } => {
            ProtocolFormatter::format_tool_result(id, &outcome.to_value())
        }
        ReplyEvent::Finished(reply) => ProtocolFormatter::format_reply(reply),
    }
}

async fn handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ReplyRequest>,
) -> Result<SseResponse, StatusCode> {
    if request.message.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let conversation = state
        .sessions
        .get(&session_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    // One cycle at a time per session; a second message is refused, not queued
    let mut conversation = conversation.try_lock_owned().map_err(|_| {
        tracing::info!(session = %session_id, "rejecting message while a cycle is running");
        StatusCode::CONFLICT
    })?;

    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);
    let agent = state.agent.clone();

    tokio::spawn(async move {
        let mut stream = match agent.reply(&mut conversation, &request.message).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to start reply stream: {}", e);
                let _ = tx.send(ProtocolFormatter::format_error(&e.to_string())).await;
                let _ = tx.send(ProtocolFormatter::format_finish("error")).await;
                return;
            }
        };

        // A disconnected client stops the frames, not the cycle: it still runs to
        // completion so the conversation never stops mid-cycle
        let mut connected = true;
        let mut finish_reason = "stop";
        loop {
            match timeout(Duration::from_millis(500), stream.next()).await {
                Ok(Some(Ok(event))) => {
                    if connected && tx.send(format_event(&event)).await.is_err() {
                        tracing::info!(session = %session_id, "client disconnected; finishing the cycle");
                        connected = false;
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::error!(session = %session_id, "Error processing reply: {}", e);
                    if connected {
                        let _ = tx.send(ProtocolFormatter::format_error(&e.to_string())).await;
                    }
                    finish_reason = "error";
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    // Heartbeat, used to detect disconnected clients
                    if connected && tx.is_closed() {
                        tracing::info!(session = %session_id, "client disconnected; finishing the cycle");
                        connected = false;
                    }
                    continue;
                }
            }
        }

        if connected {
            let _ = tx.send(ProtocolFormatter::format_finish(finish_reason)).await;
        }
    });

    Ok(SseResponse::new(stream))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/sessions/:id/reply", post(handler))
        .with_state(state)
}

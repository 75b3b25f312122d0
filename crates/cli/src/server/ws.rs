//! WebSocket chat channel.
//!
//! Client frames: `{"event":"ask","data":{"question":"..."}}`.
//! Server frames: `{"event":"response","data":{"response":"..."}}` or
//! `{"event":"response","data":{"error":"..."}}`. Each connection keeps
//! its own short conversation memory.

use super::handlers::answer;
use super::AppState;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use bocs_knowledge::{ConversationTurn, GenerationError};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// `GET /ws`
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut history: Vec<ConversationTurn> = Vec::new();
    tracing::info!("WebSocket client connected");

    while let Some(message) = ws_rx.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("WebSocket receive error: {}", e);
                break;
            }
        };

        match message {
            WsMessage::Text(text) => {
                let Some(reply) = respond_to_frame(&state, &mut history, text.as_str()).await else {
                    continue;
                };
                if ws_tx
                    .send(WsMessage::Text(reply.to_string().into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            WsMessage::Close(_) => break,
            WsMessage::Binary(_) | WsMessage::Ping(_) | WsMessage::Pong(_) => {}
        }
    }

    tracing::info!("WebSocket client disconnected");
}

fn response_frame(data: Value) -> Value {
    json!({ "event": "response", "data": data })
}

/// Reply to one client frame, if it calls for one.
pub(crate) async fn respond_to_frame(
    state: &AppState,
    history: &mut Vec<ConversationTurn>,
    text: &str,
) -> Option<Value> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            return Some(response_frame(json!({
                "error": format!("invalid frame: {}", e)
            })))
        }
    };
    if frame.event != "ask" {
        tracing::debug!("Ignoring WebSocket event '{}'", frame.event);
        return None;
    }

    let question = frame
        .data
        .get("question")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    if question.is_empty() {
        return Some(response_frame(
            json!({ "error": GenerationError::EmptyQuestion.to_string() }),
        ));
    }

    let outcome = answer(state, &question, history).await;
    let data = match &outcome.answer {
        Ok(text) => json!({ "response": text }),
        Err(e) => json!({ "error": e.to_string() }),
    };

    history.push(ConversationTurn::from_outcome(question, &outcome, Vec::new()));
    let keep = state.settings.memory_depth;
    if history.len() > keep {
        history.drain(..history.len() - keep);
    }

    Some(response_frame(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServiceSettings;
    use crate::testing;
    use tempfile::TempDir;

    async fn ready_state(upload_dir: &std::path::Path, memory_depth: usize) -> AppState {
        let state = AppState::new(
            testing::coordinator(upload_dir),
            ServiceSettings {
                top_k: 3,
                memory_depth,
            },
        );
        state.coordinator.write().await.initialize(false).await.unwrap();
        state
    }

    fn ask_frame(question: &str) -> String {
        json!({ "event": "ask", "data": { "question": question } }).to_string()
    }

    #[tokio::test]
    async fn test_conversation_memory_per_connection() {
        let docs = TempDir::new().unwrap();
        let state = ready_state(docs.path(), 1).await;
        let mut history = Vec::new();

        let first = respond_to_frame(&state, &mut history, &ask_frame("Who signs decrees?"))
            .await
            .unwrap();
        assert_eq!(first["event"], "response");
        assert_eq!(first["data"]["response"], "#1 Who signs decrees?");

        let second = respond_to_frame(&state, &mut history, &ask_frame("And when?"))
            .await
            .unwrap();
        let reply = second["data"]["response"].as_str().unwrap();
        assert!(reply.contains("Q: Who signs decrees?"));
        assert!(reply.ends_with("Current question: And when?"));
        assert_eq!(history.len(), 1);

        // A fresh connection starts without memory.
        let mut other = Vec::new();
        let fresh = respond_to_frame(&state, &mut other, &ask_frame("And when?"))
            .await
            .unwrap();
        assert_eq!(fresh["data"]["response"], "#1 And when?");
    }

    #[tokio::test]
    async fn test_error_frames() {
        let docs = TempDir::new().unwrap();
        let state = ready_state(docs.path(), 3).await;
        let mut history = Vec::new();

        let empty = respond_to_frame(&state, &mut history, &ask_frame("  "))
            .await
            .unwrap();
        assert_eq!(empty["data"]["error"], "question is empty");

        let failed = respond_to_frame(&state, &mut history, &ask_frame("explode"))
            .await
            .unwrap();
        assert!(failed["data"]["error"]
            .as_str()
            .unwrap()
            .contains("model overloaded"));

        let garbage = respond_to_frame(&state, &mut history, "not json")
            .await
            .unwrap();
        assert!(garbage["data"]["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid frame"));

        let ignored =
            respond_to_frame(&state, &mut history, r#"{"event":"typing","data":{}}"#).await;
        assert!(ignored.is_none());
    }
}

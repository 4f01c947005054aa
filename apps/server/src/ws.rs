//! Live training stream over WebSocket.
//!
//! Connecting attaches the socket as the session's observer and starts training. Every
//! progress event is forwarded as a JSON text frame. The client going away detaches the
//! observer, which cancels training at the next epoch boundary.

use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use synapse_orchestrator::{OrchestrationError, Orchestrator, ProgressEvent, SessionId};
use tracing::{debug, info, warn};

pub async fn training_socket(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket: WebSocket| async move {
        let (sink, stream) = socket.split();
        stream_session(state.orchestrator, SessionId::from(session_id), sink, stream).await;
    })
}

/// Drives one observer connection until training ends or the client disconnects.
pub async fn stream_session<Tx, Rx>(
    orchestrator: Arc<Orchestrator>,
    id: SessionId,
    mut sink: Tx,
    mut stream: Rx,
) where
    Tx: Sink<Message> + Unpin,
    Rx: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut observer = match orchestrator.attach(&id).await {
        Ok(observer) => observer,
        Err(e) => {
            let message = match e {
                OrchestrationError::SessionNotFound(_) => "Invalid session ID".to_string(),
                other => other.to_string(),
            };
            debug!(session_id = %id, error = %message, "Rejecting observer");
            let _ = send_json(&mut sink, &json!({ "error": message })).await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    if let Err(e) = orchestrator.start_training(&id).await {
        warn!(session_id = %id, error = %e, "Could not start training");
        let _ = send_json(&mut sink, &ProgressEvent::error(e.to_string())).await;
        orchestrator.detach(&id).await;
        let _ = sink.send(Message::Close(None)).await;
        return;
    }
    info!(session_id = %id, "Observer connected, training started");

    let mut client_gone = false;
    loop {
        tokio::select! {
            event = observer.recv() => {
                // The channel closes after the terminal event.
                let Some(event) = event else { break };
                if send_json(&mut sink, &event).await.is_err() {
                    client_gone = true;
                    break;
                }
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => {
                        client_gone = true;
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    orchestrator.detach(&id).await;
    if client_gone {
        info!(session_id = %id, "Observer disconnected");
    } else {
        let _ = sink.send(Message::Close(None)).await;
    }
}

async fn send_json<Tx, T>(sink: &mut Tx, value: &T) -> Result<(), ()>
where
    Tx: Sink<Message> + Unpin,
    T: Serialize,
{
    let text = serde_json::to_string(value).map_err(|e| {
        warn!(error = %e, "Failed to serialize progress event");
    })?;
    sink.send(Message::Text(text)).await.map_err(|_| ())
}

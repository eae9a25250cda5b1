//! WebSocket transport binding
//!
//! Adapts one WebSocket connection to the session dispatcher: inbound text
//! frames are JSON stream requests, outbound frames are JSON transcripts.
//! Closing the socket half-closes the request stream; the dispatcher then
//! drains, flushes, and completes.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use whisper_adapter_core::StreamTranscriptionRequest;

use crate::dispatcher::SessionDispatcher;
use crate::state::AppState;

#[derive(Serialize)]
struct ErrorFrame<'a> {
    error: &'a str,
}

fn error_frame(message: &str) -> Message {
    let frame = serde_json::to_string(&ErrorFrame { error: message })
        .unwrap_or_else(|_| String::from("{\"error\":\"internal error\"}"));
    Message::Text(frame)
}

/// Upgrade handler for the transcription stream endpoint.
pub async fn stream_transcription(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let Some(engine) = state.engine() else {
        let (mut sender, _receiver) = socket.split();
        let _ = sender
            .send(error_frame("adapter is initialising, retry shortly"))
            .await;
        let _ = sender.send(Message::Close(None)).await;
        return;
    };

    let (sender, mut receiver) = socket.split();
    let cancel = CancellationToken::new();

    let (request_tx, request_rx) = mpsc::channel::<StreamTranscriptionRequest>(32);
    let (transcript_tx, mut transcript_rx) = mpsc::channel(32);

    let dispatcher =
        SessionDispatcher::new(state.config().clone(), engine, state.recorder());
    let dispatcher_cancel = cancel.clone();
    let dispatcher_task =
        tokio::spawn(async move { dispatcher.run(dispatcher_cancel, request_rx, transcript_tx).await });

    // Writer owns the sink; backpressure from the peer propagates through
    // the bounded transcript channel.
    let writer_cancel = cancel.clone();
    let writer_task = tokio::spawn(async move {
        let mut sender = sender;
        while let Some(transcript) = transcript_rx.recv().await {
            let frame = match serde_json::to_string(&transcript) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::error!(error = %err, "failed to encode transcript");
                    continue;
                }
            };
            if sender.send(Message::Text(frame)).await.is_err() {
                writer_cancel.cancel();
                break;
            }
        }
        sender
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<StreamTranscriptionRequest>(&text) {
                Ok(request) => {
                    if request_tx.send(request).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "malformed stream request");
                    cancel.cancel();
                    break;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(error = %err, "websocket receive failed");
                cancel.cancel();
                break;
            }
        }
    }

    // Half-close: the dispatcher sees end-of-stream and finalises.
    drop(request_tx);

    let outcome = match dispatcher_task.await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(error = %err, "stream dispatcher task failed");
            return;
        }
    };

    if let Ok(mut sender) = writer_task.await {
        if let Err(err) = &outcome {
            tracing::error!(error = %err, "stream completed with error");
            let _ = sender.send(error_frame(&err.to_string())).await;
        }
        let _ = sender.send(Message::Close(None)).await;
    }
}

//! WebSocket connection dispatcher.
//!
//! One receive loop per connection parses inbound requests and routes
//! them to the task or upload manager; a single writer task drains the
//! connection's event channel. Because every event (synchronous acks
//! included) goes through that one FIFO channel, per-task and
//! per-session event ordering holds by construction.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::{SinkExt, StreamExt};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use v2m_media::MediaError;
use v2m_models::{ClientRequest, ConnectionId, ServerEvent};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;
use crate::tasks::CancelOutcome;

/// WebSocket endpoint.
pub async fn ws_endpoint(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle one connection until it closes.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection = ConnectionId::new();
    info!("New connection established: {}", connection);

    let (mut sender, mut receiver) = socket.split();
    let (events_tx, mut events_rx) = mpsc::channel::<ServerEvent>(64);

    let writer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!("failed to serialize event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_message(&state, connection, &events_tx, &text).await;
            }
            Ok(Message::Close(_)) => break,
            // Binary, ping and pong are not part of the protocol.
            Ok(_) => {}
            Err(e) => {
                info!("Connection {} errored: {}", connection, e);
                break;
            }
        }
    }

    // Tasks die with their owning connection; uploads survive until the
    // idle sweeper evicts them.
    let cancelled = state.tasks.cancel_connection(connection);
    if cancelled > 0 {
        info!(
            "Connection {} closed, cancelled {} running task(s)",
            connection, cancelled
        );
    }

    drop(events_tx);
    let _ = writer.await;
    info!("Connection closed: {}", connection);
}

/// Parse and dispatch one inbound message.
async fn handle_message(
    state: &AppState,
    connection: ConnectionId,
    events: &mpsc::Sender<ServerEvent>,
    text: &str,
) {
    let request: ClientRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            debug!("connection {} sent malformed request: {}", connection, e);
            let _ = events
                .send(ServerEvent::error(format!("Invalid request: {}", e)))
                .await;
            return;
        }
    };

    if let Err(e) = dispatch(state, connection, events, request).await {
        let _ = events.send(ServerEvent::error(e.to_string())).await;
    }
}

/// Route one request; every failure is reported as a single event.
async fn dispatch(
    state: &AppState,
    connection: ConnectionId,
    events: &mpsc::Sender<ServerEvent>,
    request: ClientRequest,
) -> ServerResult<()> {
    match request {
        ClientRequest::CheckFfmpeg => {
            let available = v2m_media::check_ffmpeg().is_ok();
            let message = if available {
                "FFmpeg is available"
            } else {
                "FFmpeg is not installed or not in PATH"
            };
            let _ = events
                .send(ServerEvent::FfmpegCheck {
                    available,
                    message: message.to_string(),
                })
                .await;
        }

        ClientRequest::Convert {
            input_file,
            output_file,
            options,
        } => {
            if input_file.is_empty() || output_file.is_empty() {
                return Err(ServerError::InvalidRequest(
                    "input_file and output_file must not be empty".to_string(),
                ));
            }

            // Precondition failures are rejected here, before any task
            // (or its acknowledgment) exists.
            v2m_media::check_ffmpeg()?;
            let input = PathBuf::from(&input_file);
            if !input.is_file() {
                return Err(ServerError::Media(MediaError::FileNotFound(input)));
            }

            let task_id = state
                .tasks
                .clone()
                .spawn_convert(
                    connection,
                    events.clone(),
                    input,
                    PathBuf::from(output_file),
                    options,
                )
                .await;
            debug!("connection {} started task {}", connection, task_id);
        }

        ClientRequest::Cancel { task_id } => match state.tasks.cancel(&task_id)? {
            CancelOutcome::Cancelled => {
                let _ = events.send(ServerEvent::task_cancelled(task_id)).await;
            }
            CancelOutcome::AlreadyFinished => {}
        },

        ClientRequest::Upload {
            file_name,
            file_size,
        } => {
            let upload_id = state.uploads.begin_upload(&file_name, file_size).await?;
            let _ = events.send(ServerEvent::upload_init(upload_id)).await;
        }

        ClientRequest::UploadChunk {
            upload_id,
            chunk,
            offset,
        } => {
            let payload = BASE64.decode(chunk.as_bytes()).map_err(|e| {
                ServerError::InvalidRequest(format!("chunk is not valid base64: {}", e))
            })?;
            let progress = state.uploads.accept_chunk(&upload_id, offset, &payload).await?;
            let _ = events
                .send(ServerEvent::UploadProgress {
                    upload_id,
                    progress: progress.progress,
                    uploaded: progress.uploaded,
                    total: progress.total,
                })
                .await;
        }

        ClientRequest::UploadComplete { upload_id } => {
            let done = state.uploads.finalize(&upload_id).await?;
            let _ = events
                .send(ServerEvent::upload_complete(
                    upload_id,
                    done.path.display().to_string(),
                    done.file_name,
                ))
                .await;
        }
    }

    Ok(())
}

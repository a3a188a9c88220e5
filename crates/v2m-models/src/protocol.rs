//! WebSocket protocol messages.
//!
//! Inbound messages carry an `action` discriminant, outbound events a
//! `type` discriminant. Task progress events additionally carry a
//! `status` field distinguishing periodic samples from terminal results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::options::ConvertOptions;
use crate::task::TaskId;
use crate::upload::UploadId;

/// Inbound client request, routed by `action`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Query encoder availability.
    CheckFfmpeg,

    /// Start a conversion task.
    Convert {
        input_file: String,
        output_file: String,
        #[serde(default)]
        options: ConvertOptions,
    },

    /// Cancel a running or pending task.
    Cancel { task_id: TaskId },

    /// Open a chunked upload session.
    Upload { file_name: String, file_size: u64 },

    /// Append one chunk to an upload session.
    ///
    /// `chunk` is the base64-encoded payload; `offset` is the byte
    /// position it is written at.
    UploadChunk {
        upload_id: UploadId,
        chunk: String,
        #[serde(default)]
        offset: u64,
    },

    /// Finalize an upload session.
    UploadComplete { upload_id: UploadId },
}

/// Task progress payload, discriminated by `status`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskUpdate {
    /// Periodic sample from the running encoder.
    Progress {
        /// Percentage in [0, 100]
        progress: u8,
        /// Seconds encoded so far
        time: f64,
        /// Total media duration in seconds
        duration: f64,
    },

    /// Task reached Completed.
    Completed { output: String },

    /// Task reached Failed.
    Error { message: String },
}

/// Outbound server event, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Reply to `check_ffmpeg`.
    FfmpegCheck { available: bool, message: String },

    /// Acknowledgment that a conversion task was accepted.
    TaskStarted { task_id: TaskId, message: String },

    /// Progress or terminal update for a task.
    Progress {
        task_id: TaskId,
        #[serde(flatten)]
        update: TaskUpdate,
    },

    /// Terminal event for a cancelled task.
    TaskCancelled { task_id: TaskId, message: String },

    /// Acknowledgment that an upload session was opened.
    UploadInit { upload_id: UploadId, message: String },

    /// Progress after an accepted chunk.
    UploadProgress {
        upload_id: UploadId,
        /// Percentage in [0, 100]
        progress: u8,
        /// Bytes covered by accepted chunks
        uploaded: u64,
        /// Declared total size
        total: u64,
    },

    /// Upload finalized; file ownership handed to the client.
    UploadComplete {
        upload_id: UploadId,
        file_path: String,
        file_name: String,
        message: String,
    },

    /// Connection-level rejection of a malformed or invalid request.
    Error { message: String },
}

impl ServerEvent {
    /// Create an error event.
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Create a task-started acknowledgment.
    pub fn task_started(task_id: TaskId) -> Self {
        ServerEvent::TaskStarted {
            task_id,
            message: "Conversion task started".to_string(),
        }
    }

    /// Create a periodic progress event.
    pub fn task_progress(task_id: TaskId, progress: u8, time: f64, duration: f64) -> Self {
        ServerEvent::Progress {
            task_id,
            update: TaskUpdate::Progress {
                progress: progress.min(100),
                time,
                duration,
            },
        }
    }

    /// Create a completion event.
    pub fn task_completed(task_id: TaskId, output: impl Into<String>) -> Self {
        ServerEvent::Progress {
            task_id,
            update: TaskUpdate::Completed {
                output: output.into(),
            },
        }
    }

    /// Create a failure event.
    pub fn task_failed(task_id: TaskId, message: impl Into<String>) -> Self {
        ServerEvent::Progress {
            task_id,
            update: TaskUpdate::Error {
                message: message.into(),
            },
        }
    }

    /// Create a cancellation event.
    pub fn task_cancelled(task_id: TaskId) -> Self {
        ServerEvent::TaskCancelled {
            task_id,
            message: "Conversion task cancelled".to_string(),
        }
    }

    /// Create an upload-init acknowledgment.
    pub fn upload_init(upload_id: UploadId) -> Self {
        ServerEvent::UploadInit {
            upload_id,
            message: "Upload initialized successfully".to_string(),
        }
    }

    /// Create an upload-complete event.
    pub fn upload_complete(
        upload_id: UploadId,
        file_path: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        ServerEvent::UploadComplete {
            upload_id,
            file_path: file_path.into(),
            file_name: file_name.into(),
            message: "File uploaded successfully".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_routing_by_action() {
        let req: ClientRequest = serde_json::from_str(
            r#"{"action":"convert","input_file":"/a.avi","output_file":"/a.mp4"}"#,
        )
        .unwrap();
        match req {
            ClientRequest::Convert {
                input_file,
                output_file,
                options,
            } => {
                assert_eq!(input_file, "/a.avi");
                assert_eq!(output_file, "/a.mp4");
                assert_eq!(options, ConvertOptions::default());
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(serde_json::from_str::<ClientRequest>(r#"{"action":"explode"}"#).is_err());
    }

    #[test]
    fn test_convert_missing_fields_rejected() {
        assert!(
            serde_json::from_str::<ClientRequest>(r#"{"action":"convert","input_file":"x"}"#)
                .is_err()
        );
    }

    #[test]
    fn test_progress_event_shape() {
        let event = ServerEvent::task_progress(TaskId::from_string("t1"), 42, 12.5, 30.0);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"progress\""));
        assert!(json.contains("\"status\":\"progress\""));
        assert!(json.contains("\"task_id\":\"t1\""));
        assert!(json.contains("\"progress\":42"));
    }

    #[test]
    fn test_terminal_event_shapes() {
        let done = ServerEvent::task_completed(TaskId::from_string("t1"), "/out.mp4");
        let json = serde_json::to_string(&done).unwrap();
        assert!(json.contains("\"status\":\"completed\""));
        assert!(json.contains("\"output\":\"/out.mp4\""));

        let failed = ServerEvent::task_failed(TaskId::from_string("t1"), "boom");
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"status\":\"error\""));

        let cancelled = ServerEvent::task_cancelled(TaskId::from_string("t1"));
        let json = serde_json::to_string(&cancelled).unwrap();
        assert!(json.contains("\"type\":\"task_cancelled\""));
    }

    #[test]
    fn test_progress_percentage_clamped() {
        let event = ServerEvent::task_progress(TaskId::from_string("t1"), 200, 1.0, 0.5);
        if let ServerEvent::Progress {
            update: TaskUpdate::Progress { progress, .. },
            ..
        } = event
        {
            assert_eq!(progress, 100);
        } else {
            panic!("expected progress event");
        }
    }

    #[test]
    fn test_upload_chunk_request() {
        let req: ClientRequest = serde_json::from_str(
            r#"{"action":"upload_chunk","upload_id":"u1","chunk":"aGVsbG8=","offset":5}"#,
        )
        .unwrap();
        match req {
            ClientRequest::UploadChunk {
                upload_id, offset, ..
            } => {
                assert_eq!(upload_id.as_str(), "u1");
                assert_eq!(offset, 5);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }
}

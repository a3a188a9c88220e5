//! Error taxonomy for the orchestrator.
//!
//! Every variant is recovered at the dispatcher boundary and turned into
//! exactly one outbound event; none of them crash the serving process or
//! affect unrelated tasks and sessions.

use thiserror::Error;

use v2m_media::MediaError;
use v2m_models::{TaskId, UploadId, UploadState};

/// Result type for orchestrator operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced to clients as `error` events.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Malformed or missing fields; rejected before any state mutation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Stale or fabricated task id.
    #[error("Task {0} not found")]
    UnknownTask(TaskId),

    /// Stale or fabricated upload id.
    #[error("Upload {0} not found")]
    UnknownSession(UploadId),

    /// Chunk sent to a session that is no longer accepting writes.
    #[error("Upload {id} is not receiving chunks (state: {state})")]
    SessionNotReceiving { id: UploadId, state: UploadState },

    /// Chunk would extend past the declared size.
    #[error("Chunk at offset {offset} ({len} bytes) exceeds declared size {declared_size}")]
    OffsetOutOfRange {
        offset: u64,
        len: u64,
        declared_size: u64,
    },

    /// Finalize requested before the written ranges cover the file.
    #[error("Upload incomplete: {received} of {declared_size} bytes received")]
    IncompleteUpload { received: u64, declared_size: u64 },

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

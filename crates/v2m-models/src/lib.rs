//! Shared data models for the vid2mp4 conversion service.
//!
//! This crate provides Serde-serializable types for:
//! - Conversion task identifiers and states
//! - Upload session identifiers and states
//! - Encoding options with documented defaults
//! - WebSocket protocol messages (client requests and server events)

pub mod options;
pub mod protocol;
pub mod task;
pub mod upload;

// Re-export common types
pub use options::ConvertOptions;
pub use protocol::{ClientRequest, ServerEvent, TaskUpdate};
pub use task::{ConnectionId, TaskId, TaskState};
pub use upload::{UploadId, UploadState};

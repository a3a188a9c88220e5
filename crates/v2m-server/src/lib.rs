//! WebSocket conversion and upload orchestrator.
//!
//! This crate provides:
//! - Task manager supervising external encoder runs with progress relay
//!   and cooperative cancellation
//! - Upload session manager reassembling chunked uploads by offset
//! - Connection dispatcher routing protocol messages between the two

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod tasks;
pub mod uploads;
pub mod ws;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use routes::create_router;
pub use state::AppState;
pub use tasks::{CancelOutcome, TaskManager};
pub use uploads::{FinalizedUpload, UploadManager, UploadProgress};

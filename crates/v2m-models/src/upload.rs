//! Upload session identifiers and lifecycle states.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a chunked upload session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct UploadId(pub String);

impl UploadId {
    /// Generate a new random upload ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    /// Session created, no chunk received yet
    #[default]
    Initialized,
    /// At least one chunk accepted
    Receiving,
    /// Completeness verified, flushing to disk
    Finalizing,
    /// Finalized; file ownership handed to the caller
    Complete,
    /// Aborted; backing storage released
    Aborted,
}

impl UploadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::Initialized => "initialized",
            UploadState::Receiving => "receiving",
            UploadState::Finalizing => "finalizing",
            UploadState::Complete => "complete",
            UploadState::Aborted => "aborted",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Complete | UploadState::Aborted)
    }

    /// Check if the session can accept chunk writes.
    pub fn accepts_chunks(&self) -> bool {
        matches!(self, UploadState::Initialized | UploadState::Receiving)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_chunks() {
        assert!(UploadState::Initialized.accepts_chunks());
        assert!(UploadState::Receiving.accepts_chunks());
        assert!(!UploadState::Finalizing.accepts_chunks());
        assert!(!UploadState::Complete.accepts_chunks());
        assert!(!UploadState::Aborted.accepts_chunks());
    }
}

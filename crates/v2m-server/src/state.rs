//! Application state.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::tasks::TaskManager;
use crate::uploads::UploadManager;

/// Shared application state.
///
/// The registries are owned here and passed into the dispatcher at
/// construction; there is no ambient global state.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub tasks: Arc<TaskManager>,
    pub uploads: Arc<UploadManager>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: ServerConfig) -> Self {
        let tasks = Arc::new(TaskManager::new(config.max_concurrent_tasks));
        let uploads = Arc::new(UploadManager::new(&config));
        Self {
            config,
            tasks,
            uploads,
        }
    }
}

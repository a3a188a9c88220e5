//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
///
/// The registries would otherwise grow without bound, so concurrency and
/// size limits are explicit and env-tunable.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Directory for upload session backing files
    pub upload_dir: PathBuf,
    /// Maximum concurrently Running conversion tasks; excess tasks queue
    /// in submission order
    pub max_concurrent_tasks: usize,
    /// Maximum accepted declared upload size in bytes
    pub max_upload_bytes: u64,
    /// Idle timeout after which an upload session with no chunk activity
    /// is aborted
    pub upload_idle_timeout: Duration,
    /// How often the idle sweeper scans the upload registry
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8765,
            upload_dir: PathBuf::from("uploads"),
            max_concurrent_tasks: 4,
            max_upload_bytes: 4 * 1024 * 1024 * 1024, // 4 GiB
            upload_idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("V2M_HOST").unwrap_or(defaults.host),
            port: std::env::var("V2M_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            upload_dir: std::env::var("V2M_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_concurrent_tasks: std::env::var("V2M_MAX_TASKS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_tasks),
            max_upload_bytes: std::env::var("V2M_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
            upload_idle_timeout: Duration::from_secs(
                std::env::var("V2M_UPLOAD_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.upload_idle_timeout.as_secs()),
            ),
            sweep_interval: Duration::from_secs(
                std::env::var("V2M_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.sweep_interval.as_secs()),
            ),
        }
    }
}

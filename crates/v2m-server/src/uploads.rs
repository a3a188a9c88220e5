//! Upload session manager.
//!
//! Sessions own a preallocated backing file and accept chunks at
//! arbitrary offsets. Completeness is tracked as the union of written
//! byte ranges rather than a running sum, so retried and out-of-order
//! chunks stay correct. Sessions are not bound to a connection; a client
//! may reconnect and keep uploading until the idle sweeper evicts the
//! session.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{info, warn};

use v2m_models::{UploadId, UploadState};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Union of half-open byte ranges, kept sorted and disjoint.
#[derive(Debug, Clone, Default)]
struct RangeSet {
    ranges: Vec<(u64, u64)>,
}

impl RangeSet {
    /// Insert `[start, end)`, merging overlapping and adjacent ranges.
    fn insert(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        self.ranges.push((start, end));
        self.ranges.sort_unstable();

        let mut merged: Vec<(u64, u64)> = Vec::with_capacity(self.ranges.len());
        for &(s, e) in &self.ranges {
            match merged.last_mut() {
                Some(last) if s <= last.1 => last.1 = last.1.max(e),
                _ => merged.push((s, e)),
            }
        }
        self.ranges = merged;
    }

    /// Total number of bytes covered.
    fn covered(&self) -> u64 {
        self.ranges.iter().map(|(s, e)| e - s).sum()
    }

    /// Whether the union is exactly `[0, len)`.
    fn covers(&self, len: u64) -> bool {
        self.ranges == [(0, len)]
    }
}

/// One in-flight upload session.
#[derive(Debug)]
struct SessionInner {
    file_name: String,
    path: PathBuf,
    declared_size: u64,
    state: UploadState,
    file: Option<File>,
    ranges: RangeSet,
    last_activity: Instant,
}

impl SessionInner {
    /// Transition to Aborted and release backing storage.
    async fn release(&mut self) {
        self.state = UploadState::Aborted;
        self.file = None;
        if let Err(e) = fs::remove_file(&self.path).await {
            warn!("failed to remove {}: {}", self.path.display(), e);
        }
    }
}

/// Progress snapshot returned for each accepted chunk.
#[derive(Debug, Clone, Copy)]
pub struct UploadProgress {
    /// Percentage in [0, 100]
    pub progress: u8,
    /// Bytes covered by accepted chunks
    pub uploaded: u64,
    /// Declared total size
    pub total: u64,
}

/// A finalized upload, ownership of the file handed to the caller.
#[derive(Debug, Clone)]
pub struct FinalizedUpload {
    pub path: PathBuf,
    pub file_name: String,
}

type SessionHandle = Arc<tokio::sync::Mutex<SessionInner>>;

/// Owns all in-flight upload sessions.
pub struct UploadManager {
    upload_dir: PathBuf,
    max_upload_bytes: u64,
    idle_timeout: Duration,
    // Held only to look up the per-session handle; file I/O happens
    // under the session's own async lock.
    registry: Mutex<HashMap<UploadId, SessionHandle>>,
}

impl UploadManager {
    /// Create a new manager.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
            idle_timeout: config.upload_idle_timeout,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Open a new session for `declared_size` bytes.
    pub async fn begin_upload(&self, file_name: &str, declared_size: u64) -> ServerResult<UploadId> {
        validate_file_name(file_name)?;

        if declared_size == 0 {
            return Err(ServerError::InvalidRequest(
                "file_size must be positive".to_string(),
            ));
        }
        if declared_size > self.max_upload_bytes {
            return Err(ServerError::InvalidRequest(format!(
                "file_size {} exceeds maximum {}",
                declared_size, self.max_upload_bytes
            )));
        }

        fs::create_dir_all(&self.upload_dir).await?;

        let upload_id = UploadId::new();
        // The id prefix keeps sessions that declare the same name from
        // addressing the same file.
        let path = self.upload_dir.join(format!("{}_{}", upload_id, file_name));

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await?;
        file.set_len(declared_size).await?;

        let inner = SessionInner {
            file_name: file_name.to_string(),
            path,
            declared_size,
            state: UploadState::Initialized,
            file: Some(file),
            ranges: RangeSet::default(),
            last_activity: Instant::now(),
        };

        self.registry
            .lock()
            .unwrap()
            .insert(upload_id.clone(), Arc::new(tokio::sync::Mutex::new(inner)));

        info!(
            "upload {} opened for {} ({} bytes)",
            upload_id, file_name, declared_size
        );
        Ok(upload_id)
    }

    /// Write one chunk at its declared offset.
    pub async fn accept_chunk(
        &self,
        upload_id: &UploadId,
        offset: u64,
        payload: &[u8],
    ) -> ServerResult<UploadProgress> {
        let session = self.get(upload_id)?;
        let mut inner = session.lock().await;

        if !inner.state.accepts_chunks() {
            return Err(ServerError::SessionNotReceiving {
                id: upload_id.clone(),
                state: inner.state,
            });
        }

        let len = payload.len() as u64;
        let end = offset.checked_add(len).filter(|&e| e <= inner.declared_size);
        let end = match end {
            Some(end) => end,
            None => {
                return Err(ServerError::OffsetOutOfRange {
                    offset,
                    len,
                    declared_size: inner.declared_size,
                })
            }
        };

        // The file handle is present in every chunk-accepting state.
        let file = inner.file.as_mut().expect("session file missing");
        let write = async {
            file.seek(SeekFrom::Start(offset)).await?;
            file.write_all(payload).await?;
            Ok::<_, std::io::Error>(())
        };
        if let Err(e) = write.await {
            // A failed write leaves the file contents undefined; abort
            // this session only.
            warn!("upload {} chunk write failed: {}", upload_id, e);
            inner.release().await;
            drop(inner);
            self.remove(upload_id);
            return Err(e.into());
        }

        inner.state = UploadState::Receiving;
        inner.ranges.insert(offset, end);
        inner.last_activity = Instant::now();

        let uploaded = inner.ranges.covered();
        let total = inner.declared_size;
        Ok(UploadProgress {
            progress: ((uploaded * 100) / total).min(100) as u8,
            uploaded,
            total,
        })
    }

    /// Verify completeness, flush, and hand the file to the caller.
    pub async fn finalize(&self, upload_id: &UploadId) -> ServerResult<FinalizedUpload> {
        let session = self.get(upload_id)?;
        let mut inner = session.lock().await;

        if !inner.state.accepts_chunks() {
            return Err(ServerError::SessionNotReceiving {
                id: upload_id.clone(),
                state: inner.state,
            });
        }

        if !inner.ranges.covers(inner.declared_size) {
            // Recoverable: the session stays in its prior state so the
            // client can send the missing chunks and retry.
            return Err(ServerError::IncompleteUpload {
                received: inner.ranges.covered(),
                declared_size: inner.declared_size,
            });
        }

        inner.state = UploadState::Finalizing;
        if let Some(mut file) = inner.file.take() {
            let flush = async {
                file.flush().await?;
                file.sync_all().await?;
                Ok::<_, std::io::Error>(())
            };
            if let Err(e) = flush.await {
                warn!("upload {} finalize failed: {}", upload_id, e);
                inner.release().await;
                drop(inner);
                self.remove(upload_id);
                return Err(e.into());
            }
        }
        inner.state = UploadState::Complete;

        let done = FinalizedUpload {
            path: inner.path.clone(),
            file_name: inner.file_name.clone(),
        };
        drop(inner);
        self.remove(upload_id);

        info!("upload {} finalized to {}", upload_id, done.path.display());
        Ok(done)
    }

    /// Abort a session and release its storage. Idempotent: aborting an
    /// unknown or already-terminal session does nothing.
    pub async fn abort(&self, upload_id: &UploadId) {
        let session = match self.remove(upload_id) {
            Some(s) => s,
            None => return,
        };
        let mut inner = session.lock().await;
        if !inner.state.is_terminal() {
            inner.release().await;
            info!("upload {} aborted", upload_id);
        }
    }

    /// Abort every session with no chunk activity for the idle timeout.
    /// Returns the evicted ids.
    pub async fn sweep_idle(&self) -> Vec<UploadId> {
        let snapshot: Vec<(UploadId, SessionHandle)> = {
            let registry = self.registry.lock().unwrap();
            registry
                .iter()
                .map(|(id, s)| (id.clone(), s.clone()))
                .collect()
        };

        let mut evicted = Vec::new();
        for (id, session) in snapshot {
            let idle = {
                let inner = session.lock().await;
                !inner.state.is_terminal() && inner.last_activity.elapsed() > self.idle_timeout
            };
            if idle {
                self.abort(&id).await;
                evicted.push(id);
            }
        }
        evicted
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.registry.lock().unwrap().len()
    }

    fn get(&self, upload_id: &UploadId) -> ServerResult<SessionHandle> {
        self.registry
            .lock()
            .unwrap()
            .get(upload_id)
            .cloned()
            .ok_or_else(|| ServerError::UnknownSession(upload_id.clone()))
    }

    fn remove(&self, upload_id: &UploadId) -> Option<SessionHandle> {
        self.registry.lock().unwrap().remove(upload_id)
    }
}

/// Background loop evicting idle sessions.
pub async fn run_sweeper(manager: Arc<UploadManager>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        for id in manager.sweep_idle().await {
            info!("upload {} evicted after idle timeout", id);
        }
    }
}

fn validate_file_name(name: &str) -> ServerResult<()> {
    if name.is_empty() {
        return Err(ServerError::InvalidRequest(
            "file_name must not be empty".to_string(),
        ));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") || name.contains('\0') {
        return Err(ServerError::InvalidRequest(
            "file_name must be a plain file name".to_string(),
        ));
    }
    Ok(())
}

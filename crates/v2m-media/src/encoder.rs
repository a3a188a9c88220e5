//! FFmpeg command construction and supervised execution.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use v2m_models::ConvertOptions;

use crate::error::{MediaError, MediaResult};
use crate::probe;
use crate::progress::{parse_progress_line, ProgressBlock, ProgressSample};

/// Builder for a conversion command line.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    options: ConvertOptions,
}

impl FfmpegCommand {
    /// Create a new command for one conversion.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>, options: ConvertOptions) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            options,
        }
    }

    /// Build the argument list.
    ///
    /// Progress goes to stdout as machine-readable key=value blocks;
    /// stderr carries only diagnostics (`-loglevel error`).
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
            "-i".to_string(),
            self.input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            self.options.codec().to_string(),
            "-preset".to_string(),
            self.options.preset().to_string(),
            "-crf".to_string(),
            self.options.crf().to_string(),
            "-c:a".to_string(),
            self.options.audio_codec().to_string(),
            "-b:a".to_string(),
            self.options.audio_bitrate().to_string(),
        ];

        if let Some(resolution) = self.options.resolution() {
            args.push("-vf".to_string());
            args.push(format!("scale={}", resolution));
        }

        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// One event from a supervised encoding run.
#[derive(Debug, Clone)]
pub enum EncodeEvent {
    /// Periodic progress sample; only emitted when total duration is known.
    Progress(ProgressSample),
    /// The process exited (or was killed); always the last event.
    Finished(EncodeOutcome),
}

/// Classification of how an encoding run ended.
#[derive(Debug, Clone)]
pub enum EncodeOutcome {
    /// Exit code 0 and the output file exists.
    Success { output: PathBuf },
    /// Non-zero exit or missing output; carries the diagnostic text.
    Failure { message: String },
    /// Killed by the caller.
    Cancelled,
}

/// Cooperative kill signal for a running encode.
///
/// Cloneable so a supervisor can trigger it while the event stream is
/// being consumed elsewhere.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    cancel: watch::Sender<bool>,
}

impl KillSwitch {
    /// Request termination. Safe to call after natural exit (no-op).
    pub fn kill(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Handle to a running encode: a finite event stream plus a kill switch.
#[derive(Debug)]
pub struct EncodeHandle {
    events: mpsc::Receiver<EncodeEvent>,
    kill: KillSwitch,
}

impl EncodeHandle {
    /// Receive the next event. Returns `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<EncodeEvent> {
        self.events.recv().await
    }

    /// Clone out the kill switch.
    pub fn kill_switch(&self) -> KillSwitch {
        self.kill.clone()
    }

    /// Request termination. Safe to call after natural exit (no-op).
    pub fn kill(&self) {
        self.kill.kill();
    }
}

/// Check that the external encoder is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Start a supervised encoding run.
///
/// Fails with `FfmpegNotFound` when the encoder tool cannot be located
/// and `FileNotFound` when the input does not exist; both are checked
/// before anything is spawned. Total duration is probed up front; when it
/// cannot be determined, progress events are suppressed and only the
/// terminal event is delivered.
pub async fn start_encode(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &ConvertOptions,
) -> MediaResult<EncodeHandle> {
    let input = input.as_ref().to_path_buf();
    let output = output.as_ref().to_path_buf();

    check_ffmpeg()?;

    if !input.is_file() {
        return Err(MediaError::FileNotFound(input));
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    // Best-effort: a container with no reported duration encodes fine,
    // it just cannot report percentages.
    let total_secs = probe::get_duration(&input).await.unwrap_or(0.0);

    let cmd = FfmpegCommand::new(&input, &output, options.clone());
    let args = cmd.build_args();
    debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child.stdout.take().expect("stdout not captured");
    let stderr = child.stderr.take().expect("stderr not captured");

    let (events_tx, events_rx) = mpsc::channel(32);
    let (cancel_tx, cancel_rx) = watch::channel(false);

    tokio::spawn(supervise(
        child, stdout, stderr, events_tx, cancel_rx, total_secs, output,
    ));

    Ok(EncodeHandle {
        events: events_rx,
        kill: KillSwitch { cancel: cancel_tx },
    })
}

/// Drive one encoding run to completion.
async fn supervise(
    mut child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    events: mpsc::Sender<EncodeEvent>,
    mut cancel_rx: watch::Receiver<bool>,
    total_secs: f64,
    output: PathBuf,
) {
    // Collect diagnostics concurrently so a chatty stderr cannot block
    // the process while we read progress from stdout.
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        let _ = BufReader::new(stderr).read_to_string(&mut buf).await;
        buf
    });

    let mut lines = BufReader::new(stdout).lines();
    let mut current = ProgressBlock::default();
    let mut last_encoded = 0.0f64;
    let mut killed = false;

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(block) = parse_progress_line(&line, &mut current) {
                        if total_secs > 0.0 && !block.is_complete {
                            // out_time is monotone in practice; clamp anyway
                            let encoded = (block.out_time_ms as f64 / 1000.0).max(last_encoded);
                            last_encoded = encoded;
                            let _ = events
                                .send(EncodeEvent::Progress(ProgressSample {
                                    encoded_secs: encoded,
                                    total_secs,
                                }))
                                .await;
                        }
                    }
                }
                // EOF: the process is exiting
                Ok(None) | Err(_) => break,
            },
            changed = cancel_rx.changed(), if !killed => {
                let cancelled = changed.is_err() || *cancel_rx.borrow();
                if cancelled {
                    warn!("encode cancelled, killing ffmpeg");
                    killed = true;
                    let _ = child.kill().await;
                }
            }
        }
    }

    let status = child.wait().await;
    let diagnostics = stderr_task.await.unwrap_or_default();

    let outcome = if killed {
        EncodeOutcome::Cancelled
    } else {
        match status {
            Ok(status) if status.success() && output.is_file() => {
                EncodeOutcome::Success { output }
            }
            Ok(status) if status.success() => EncodeOutcome::Failure {
                message: format!("ffmpeg produced no output file at {}", output.display()),
            },
            Ok(status) => {
                let message = if diagnostics.trim().is_empty() {
                    format!("ffmpeg exited with {}", status)
                } else {
                    diagnostics.trim().to_string()
                };
                EncodeOutcome::Failure { message }
            }
            Err(e) => EncodeOutcome::Failure {
                message: format!("failed to reap ffmpeg: {}", e),
            },
        }
    };

    let _ = events.send(EncodeEvent::Finished(outcome)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_argument_list() {
        let cmd = FfmpegCommand::new("in.avi", "out.mp4", ConvertOptions::default());
        let args = cmd.build_args();

        let expect = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-progress",
            "pipe:1",
            "-i",
            "in.avi",
            "-c:v",
            "libx264",
            "-preset",
            "medium",
            "-crf",
            "23",
            "-c:a",
            "aac",
            "-b:a",
            "128k",
            "out.mp4",
        ];
        assert_eq!(args, expect);
    }

    #[test]
    fn test_resolution_adds_scale_filter() {
        let options = ConvertOptions {
            resolution: Some("1280x720".to_string()),
            ..Default::default()
        };
        let cmd = FfmpegCommand::new("in.avi", "out.mp4", options);
        let args = cmd.build_args();

        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "scale=1280x720");
        // output path stays last
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_options_forwarded_verbatim() {
        let options = ConvertOptions {
            codec: Some("libx265".to_string()),
            crf: Some(28),
            audio_bitrate: Some("192k".to_string()),
            ..Default::default()
        };
        let cmd = FfmpegCommand::new("in.mkv", "out.mp4", options);
        let args = cmd.build_args();

        assert!(args.windows(2).any(|w| w == ["-c:v", "libx265"]));
        assert!(args.windows(2).any(|w| w == ["-crf", "28"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "192k"]));
    }

    #[tokio::test]
    async fn test_start_encode_missing_input() {
        if check_ffmpeg().is_err() {
            return;
        }
        let err = start_encode(
            "/nonexistent/input.avi",
            "/tmp/out.mp4",
            &ConvertOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}

//! FFmpeg CLI wrapper for the vid2mp4 conversion service.
//!
//! This crate is the encoder invoker: it locates the external tools,
//! probes input duration, builds argument lists from the option set, and
//! supervises the encoding process, exposing its progress as a typed
//! event stream with cooperative cancellation. It knows nothing about
//! tasks, upload sessions, or connections.

pub mod encoder;
pub mod error;
pub mod probe;
pub mod progress;

pub use encoder::{
    check_ffmpeg, start_encode, EncodeEvent, EncodeHandle, EncodeOutcome, FfmpegCommand, KillSwitch,
};
pub use error::{MediaError, MediaResult};
pub use probe::get_duration;
pub use progress::ProgressSample;

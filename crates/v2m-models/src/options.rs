//! Encoding options forwarded to the external encoder.
//!
//! The values are opaque to this service: they are passed verbatim to
//! ffmpeg, with documented defaults for unset keys.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec.
pub const DEFAULT_CODEC: &str = "libx264";
/// Default encoding preset.
pub const DEFAULT_PRESET: &str = "medium";
/// Default Constant Rate Factor.
pub const DEFAULT_CRF: u32 = 23;
/// Default audio codec.
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default audio bitrate.
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Options for a single conversion.
///
/// Unset keys fall back to the documented defaults; `resolution` unset
/// means the source resolution is kept unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertOptions {
    /// Video codec (default: libx264)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,

    /// Encoding preset (default: medium)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    /// Constant Rate Factor (default: 23)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crf: Option<u32>,

    /// Audio codec (default: aac)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,

    /// Audio bitrate (default: 128k)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<String>,

    /// Target resolution, e.g. "1920x1080" (default: source unchanged)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl ConvertOptions {
    /// Video codec, defaulted.
    pub fn codec(&self) -> &str {
        self.codec.as_deref().unwrap_or(DEFAULT_CODEC)
    }

    /// Encoding preset, defaulted.
    pub fn preset(&self) -> &str {
        self.preset.as_deref().unwrap_or(DEFAULT_PRESET)
    }

    /// Constant Rate Factor, defaulted.
    pub fn crf(&self) -> u32 {
        self.crf.unwrap_or(DEFAULT_CRF)
    }

    /// Audio codec, defaulted.
    pub fn audio_codec(&self) -> &str {
        self.audio_codec.as_deref().unwrap_or(DEFAULT_AUDIO_CODEC)
    }

    /// Audio bitrate, defaulted.
    pub fn audio_bitrate(&self) -> &str {
        self.audio_bitrate.as_deref().unwrap_or(DEFAULT_AUDIO_BITRATE)
    }

    /// Target resolution, if any.
    pub fn resolution(&self) -> Option<&str> {
        self.resolution.as_deref()
    }
}

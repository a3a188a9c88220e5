//! FFmpeg progress parsing.
//!
//! `-progress pipe:1` emits key=value blocks terminated by a `progress=`
//! line; the accumulator is flushed into a sample on each terminator.

use serde::{Deserialize, Serialize};

/// One observation of the running encoder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    /// Seconds of output encoded so far
    pub encoded_secs: f64,
    /// Total media duration in seconds (constant for a run)
    pub total_secs: f64,
}

impl ProgressSample {
    /// Percentage as `round(100 * encoded / total)`, clamped to [0, 100].
    pub fn percentage(&self) -> u8 {
        if self.total_secs <= 0.0 {
            return 0;
        }
        let pct = (100.0 * self.encoded_secs / self.total_secs).round();
        pct.clamp(0.0, 100.0) as u8
    }
}

/// Accumulator for one key=value progress block.
#[derive(Debug, Clone, Default)]
pub struct ProgressBlock {
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Whether the encoder reported `progress=end`
    pub is_complete: bool,
}

/// Parse one line of `-progress` output into `current`.
///
/// Returns a snapshot of the block when the terminating `progress=` key
/// is seen, `None` for every other line.
pub fn parse_progress_line(line: &str, current: &mut ProgressBlock) -> Option<ProgressBlock> {
    let line = line.trim();

    if let Some((key, value)) = line.split_once('=') {
        match key {
            // ffmpeg emits microseconds under both names depending on version
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    current.out_time_ms = us / 1000;
                }
            }
            "progress" => {
                if value == "end" {
                    current.is_complete = true;
                }
                return Some(current.clone());
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_flushed_on_progress_key() {
        let mut current = ProgressBlock::default();

        assert!(parse_progress_line("frame=100", &mut current).is_none());
        assert!(parse_progress_line("out_time_ms=5000000", &mut current).is_none());
        assert_eq!(current.out_time_ms, 5000);

        let block = parse_progress_line("progress=continue", &mut current).unwrap();
        assert_eq!(block.out_time_ms, 5000);
        assert!(!block.is_complete);

        let block = parse_progress_line("progress=end", &mut current).unwrap();
        assert!(block.is_complete);
    }

    #[test]
    fn test_garbage_lines_ignored() {
        let mut current = ProgressBlock::default();
        assert!(parse_progress_line("", &mut current).is_none());
        assert!(parse_progress_line("out_time_ms=N/A", &mut current).is_none());
        assert_eq!(current.out_time_ms, 0);
    }

    #[test]
    fn test_percentage_rounds_and_clamps() {
        let sample = ProgressSample {
            encoded_secs: 12.5,
            total_secs: 30.0,
        };
        assert_eq!(sample.percentage(), 42);

        let over = ProgressSample {
            encoded_secs: 31.0,
            total_secs: 30.0,
        };
        assert_eq!(over.percentage(), 100);

        let unknown = ProgressSample {
            encoded_secs: 5.0,
            total_secs: 0.0,
        };
        assert_eq!(unknown.percentage(), 0);
    }
}

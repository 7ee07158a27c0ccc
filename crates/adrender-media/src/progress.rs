//! Encoder progress parsing.
//!
//! FFmpeg prints a stats line on stderr containing a `time=HH:MM:SS.cs`
//! marker while encoding. The runner scans every stderr line for it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use adrender_models::timestamp::parse_timestamp;

/// Progress is reported as at most this value until the process has
/// actually exited successfully.
pub const MAX_RUNNING_PERCENT: u8 = 99;

/// Minimum progress before an ETA is derived; early extrapolations are
/// wildly unstable.
pub const ETA_MIN_PERCENT: u8 = 5;

/// A progress observation parsed from the encoder's stderr.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EncodeProgress {
    /// Output position in milliseconds
    pub out_time_ms: i64,
}

impl EncodeProgress {
    /// Progress percentage given the expected output duration.
    /// Capped below 100: success is only known once the process exits.
    pub fn percentage(&self, total_ms: i64) -> u8 {
        if total_ms <= 0 || self.out_time_ms <= 0 {
            return 0;
        }
        let pct = (self.out_time_ms as f64 / total_ms as f64) * 100.0;
        (pct as u8).min(MAX_RUNNING_PERCENT)
    }

    /// Estimate seconds remaining from encoding throughput so far.
    ///
    /// Returns `None` until progress passes [`ETA_MIN_PERCENT`].
    pub fn eta_seconds(&self, total_ms: i64, elapsed: Duration) -> Option<u64> {
        if self.percentage(total_ms) < ETA_MIN_PERCENT {
            return None;
        }
        let encoded_secs = self.out_time_ms as f64 / 1000.0;
        if encoded_secs <= 0.0 {
            return None;
        }
        let remaining_secs = (total_ms - self.out_time_ms).max(0) as f64 / 1000.0;
        let rate = elapsed.as_secs_f64() / encoded_secs;
        Some((remaining_secs * rate).round() as u64)
    }
}

/// Scan one stderr line for a `time=` marker.
///
/// Returns `None` for lines without a parseable marker (including the
/// `time=N/A` form printed before the first frame).
pub fn parse_time_marker(line: &str) -> Option<EncodeProgress> {
    let idx = line.find("time=")?;
    let rest = &line[idx + "time=".len()..];
    let token = rest.split_whitespace().next()?;
    if token == "N/A" {
        return None;
    }
    let secs = parse_timestamp(token).ok()?;
    Some(EncodeProgress {
        out_time_ms: (secs * 1000.0) as i64,
    })
}

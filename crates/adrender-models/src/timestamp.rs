//! Timestamp parsing and formatting.
//!
//! Supports `HH:MM:SS`, `HH:MM:SS.mmm`, `MM:SS`, and `SS` forms, both for
//! client-supplied trim points and for the `time=` progress marker FFmpeg
//! prints on stderr.

use thiserror::Error;

/// Maximum reasonable video duration (24 hours in seconds).
pub const MAX_DURATION_SECS: f64 = 86400.0;

/// Timestamp parsing errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("timestamp is empty")]
    Empty,

    #[error("invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("timestamp components must be non-negative")]
    Negative,

    #[error("invalid timestamp format: {0}")]
    InvalidFormat(String),

    #[error("end {end}s is not after start {start}s")]
    EndBeforeStart { start: f64, end: f64 },
}

/// Parse a timestamp string to total seconds.
///
/// # Examples
/// ```
/// use adrender_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let secs = match parts.len() {
        1 => component(parts[0], "seconds")?,
        2 => component(parts[0], "minutes")? * 60.0 + component(parts[1], "seconds")?,
        3 => {
            component(parts[0], "hours")? * 3600.0
                + component(parts[1], "minutes")? * 60.0
                + component(parts[2], "seconds")?
        }
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    Ok(secs)
}

fn component(s: &str, name: &'static str) -> Result<f64, TimestampError> {
    let value: f64 = s
        .parse()
        .map_err(|_| TimestampError::InvalidValue(name, s.to_string()))?;
    if value < 0.0 {
        return Err(TimestampError::Negative);
    }
    Ok(value)
}

/// Format seconds into an `HH:MM:SS` or `HH:MM:SS.mmm` string.
pub fn format_seconds(total_secs: f64) -> String {
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;

    if (secs - secs.floor()).abs() > 0.0001 {
        format!("{:02}:{:02}:{:06.3}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, mins, secs.floor() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_forms() {
        assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
        assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
        assert_eq!(parse_timestamp("90").unwrap(), 90.0);
        assert!((parse_timestamp("00:00:12.34").unwrap() - 12.34).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("a:b:c").is_err());
        assert!(parse_timestamp("1:2:3:4").is_err());
        assert_eq!(parse_timestamp("-5"), Err(TimestampError::Negative));
    }

    #[test]
    fn test_format_round_trip() {
        assert_eq!(format_seconds(5400.0), "01:30:00");
        assert_eq!(format_seconds(330.0), "00:05:30");
        assert_eq!(format_seconds(12.34), "00:00:12.340");
        assert!((parse_timestamp(&format_seconds(12.34)).unwrap() - 12.34).abs() < 1e-9);
    }
}

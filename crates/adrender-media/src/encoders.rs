//! Encoder availability detection.
//!
//! Runs once at startup: the encoder binary's own capability listing is
//! scanned for a usable hardware encoder, and a concurrency slot count is
//! derived from it. The scheduler only ever consumes the resulting
//! integer.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use adrender_models::Encoder;

use crate::error::{MediaError, MediaResult};

/// Hardware encoders probed for, in preference order.
const HARDWARE_CANDIDATES: [Encoder; 3] = [Encoder::Nvenc, Encoder::Vaapi, Encoder::VideoToolbox];

/// The encoders usable on this host and how many may run at once.
#[derive(Debug, Clone)]
pub struct EncoderPool {
    /// Preferred hardware encoder, if one is present
    pub hardware: Option<Encoder>,
    /// Concurrency slots (>= 1)
    pub slots: usize,
}

impl EncoderPool {
    /// The encoder a first attempt should use.
    pub fn preferred(&self) -> Encoder {
        self.hardware.unwrap_or(Encoder::Software)
    }

    /// A software-only pool with the given slot count. Useful for tests
    /// and hosts without detection.
    pub fn software_only(slots: usize) -> Self {
        Self {
            hardware: None,
            slots: slots.max(1),
        }
    }
}

/// Locate the encoder binary, failing fast when it is absent.
pub fn find_encoder_binary(name: &str) -> MediaResult<PathBuf> {
    which::which(name).map_err(|_| MediaError::FfmpegNotFound)
}

/// Detect available encoders and derive the slot count.
///
/// Hardware presence is read from `<binary> -hide_banner -encoders`; a
/// listed encoder is not a guarantee it works at runtime, which is what
/// the software fallback is for. Software-only hosts get a small
/// CPU-derived limit.
pub async fn detect_encoders(binary: &Path) -> MediaResult<EncoderPool> {
    let output = Command::new(binary)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        warn!("encoder capability listing failed, assuming software only");
        return Ok(EncoderPool::software_only(cpu_slots()));
    }

    let listing = String::from_utf8_lossy(&output.stdout);
    let hardware = HARDWARE_CANDIDATES
        .iter()
        .copied()
        .find(|enc| listing.contains(enc.codec_name()));

    let pool = match hardware {
        Some(encoder) => {
            info!("Detected hardware encoder: {}", encoder.codec_name());
            EncoderPool {
                hardware: Some(encoder),
                slots: 1,
            }
        }
        None => {
            info!("No hardware encoder detected, using software encoding");
            EncoderPool::software_only(cpu_slots())
        }
    };

    Ok(pool)
}

/// Slot count for software-only hosts: a fraction of the core count.
fn cpu_slots() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_software_only_pool() {
        let pool = EncoderPool::software_only(0);
        assert_eq!(pool.slots, 1);
        assert_eq!(pool.preferred(), Encoder::Software);
    }

    #[test]
    fn test_hardware_pool_prefers_hardware() {
        let pool = EncoderPool {
            hardware: Some(Encoder::Nvenc),
            slots: 1,
        };
        assert_eq!(pool.preferred(), Encoder::Nvenc);
    }

    #[test]
    fn test_cpu_slots_is_at_least_one() {
        assert!(cpu_slots() >= 1);
    }
}

//! Encoder selection and encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default software codec (H.264)
pub const SOFTWARE_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default quality (CRF for software, CQ for hardware)
pub const DEFAULT_QUALITY: u8 = 18;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// The encoder implementation a render attempt uses.
///
/// The argument builder receives an already-decided encoder; choosing
/// between hardware and software (and falling back) is the runner
/// policy's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Encoder {
    /// CPU encoding via libx264
    #[default]
    Software,
    /// NVIDIA NVENC
    Nvenc,
    /// VA-API (Intel/AMD on Linux)
    Vaapi,
    /// Apple VideoToolbox
    VideoToolbox,
}

impl Encoder {
    pub fn is_hardware(&self) -> bool {
        !matches!(self, Encoder::Software)
    }

    /// FFmpeg video codec name.
    pub fn codec_name(&self) -> &'static str {
        match self {
            Encoder::Software => SOFTWARE_CODEC,
            Encoder::Nvenc => "h264_nvenc",
            Encoder::Vaapi => "h264_vaapi",
            Encoder::VideoToolbox => "h264_videotoolbox",
        }
    }

    /// Extra filter stage a hardware path needs before encoding
    /// (pixel-format conversion and, for VA-API, a frame upload).
    pub fn filter_stage(&self) -> Option<&'static str> {
        match self {
            Encoder::Software => None,
            Encoder::Nvenc => Some("format=yuv420p"),
            Encoder::Vaapi => Some("format=nv12,hwupload"),
            Encoder::VideoToolbox => Some("format=nv12"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoder::Software => "software",
            Encoder::Nvenc => "nvenc",
            Encoder::Vaapi => "vaapi",
            Encoder::VideoToolbox => "video_toolbox",
        }
    }
}

impl std::fmt::Display for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Video encoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Encoding preset (e.g. "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Quality target (CRF 0-51 for software, CQ for hardware)
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_quality() -> u8 {
    DEFAULT_QUALITY
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            quality: default_quality(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
        }
    }
}

impl EncodingConfig {
    /// Video codec arguments for the given encoder.
    ///
    /// Hardware encoders use `-cq` instead of `-crf`, and the software
    /// path enables fast-start metadata placement (hardware paths omit it
    /// for muxer compatibility).
    pub fn video_args(&self, encoder: Encoder) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            encoder.codec_name().to_string(),
            "-preset".to_string(),
            self.preset.clone(),
        ];

        if encoder.is_hardware() {
            args.extend_from_slice(&["-cq".to_string(), self.quality.to_string()]);
        } else {
            args.extend_from_slice(&["-crf".to_string(), self.quality.to_string()]);
            args.extend_from_slice(&["-movflags".to_string(), "+faststart".to_string()]);
        }

        args
    }

    /// Audio codec arguments.
    pub fn audio_args(&self) -> Vec<String> {
        vec![
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]
    }
}

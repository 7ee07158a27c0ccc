//! Job kinds and their input specifications.
//!
//! `JobKind` is a closed tagged enum, so dispatch over kinds is total and
//! an "unknown job type" runtime path cannot exist.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::timestamp::{parse_timestamp, TimestampError};

/// A point in time, accepted either as plain seconds or as a
/// `HH:MM:SS(.mmm)` / `MM:SS` / `SS` string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TimePoint {
    Seconds(f64),
    Timecode(String),
}

impl TimePoint {
    /// Resolve to seconds.
    pub fn as_secs(&self) -> Result<f64, TimestampError> {
        match self {
            TimePoint::Seconds(s) if *s >= 0.0 => Ok(*s),
            TimePoint::Seconds(_) => Err(TimestampError::Negative),
            TimePoint::Timecode(ts) => parse_timestamp(ts),
        }
    }
}

impl From<f64> for TimePoint {
    fn from(s: f64) -> Self {
        TimePoint::Seconds(s)
    }
}

/// Trim window. The end is converted to a duration by the argument
/// builder, never passed as an absolute end-time flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrimWindow {
    pub start: TimePoint,
    pub end: TimePoint,
}

impl TrimWindow {
    /// Resolve to `(start_secs, duration_secs)`.
    pub fn resolve(&self) -> Result<(f64, f64), TimestampError> {
        let start = self.start.as_secs()?;
        let end = self.end.as_secs()?;
        if end <= start {
            return Err(TimestampError::EndBeforeStart { start, end });
        }
        Ok((start, end - start))
    }
}

/// Fixed target dimensions. No aspect-ratio auto-correction is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

/// Audio options shared by all kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioOpts {
    /// Drop the audio stream entirely
    #[serde(default)]
    pub mute: bool,
    /// Volume multiplier, clamped to [0.0, 2.0]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// Transition applied between adjacent sources in a concatenation.
///
/// Unrecognized names fall back to `Fade`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    #[default]
    Fade,
    Wipe,
    Slide,
    Zoom,
}

impl Transition {
    /// Parse a client-supplied transition name, defaulting to fade.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "wipe" => Transition::Wipe,
            "slide" => Transition::Slide,
            "zoom" => Transition::Zoom,
            _ => Transition::Fade,
        }
    }

    /// The xfade filter transition name.
    pub fn xfade_name(&self) -> &'static str {
        match self {
            Transition::Fade => "fade",
            Transition::Wipe => "wipeleft",
            Transition::Slide => "slideright",
            Transition::Zoom => "circlecrop",
        }
    }
}

/// Input spec for a single-clip edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EditSpec {
    /// Local source path. A URL-shaped value here is treated as remote.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    /// Remote source URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Optional trim window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trim: Option<TrimWindow>,
    /// Playback-speed multiplier, clamped to [0.25, 4.0]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Optional fixed-dimension resize
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resize: Option<Resize>,
    /// Audio options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioOpts>,
    /// Output container extension (default "mp4")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    /// Optional project/tenant scope carried through for collaborators
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl EditSpec {
    /// The declared source reference, if any.
    pub fn source(&self) -> Option<&str> {
        self.source_path.as_deref().or(self.source_url.as_deref())
    }
}

/// One segment of an execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanSegment {
    /// Local source path. A URL-shaped value here is treated as remote.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    /// Remote source URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Segment trim window (required: a plan is all about timing)
    pub trim: TrimWindow,
    /// Per-segment playback-speed multiplier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl PlanSegment {
    pub fn source(&self) -> Option<&str> {
        self.source_path.as_deref().or(self.source_url.as_deref())
    }
}

/// Input spec for a timed multi-segment plan. Segments are rendered in
/// order and concatenated into one output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Ordered segments
    pub segments: Vec<PlanSegment>,
    /// Common output dimensions all segments are normalized to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resize: Option<Resize>,
    /// Audio options applied to the whole output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioOpts>,
    /// Output container extension (default "mp4")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// Input spec for a multi-source concatenation with transitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConcatSpec {
    /// Sources, concatenated in order. Local paths are accepted alongside
    /// URLs; URL-shaped values are always treated as remote.
    pub source_urls: Vec<String>,
    /// Transition names per boundary. Missing entries and unknown names
    /// fall back to fade.
    #[serde(default)]
    pub transitions: Vec<String>,
    /// Common output dimensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resize: Option<Resize>,
    /// Audio options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioOpts>,
    /// Output container extension (default "mp4")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl ConcatSpec {
    /// Transition for the boundary after input `i`.
    pub fn transition_at(&self, i: usize) -> Transition {
        self.transitions
            .get(i)
            .map(|name| Transition::from_name(name))
            .unwrap_or_default()
    }
}

/// A job's kind together with its validated input payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "input", rename_all = "snake_case")]
pub enum JobKind {
    /// Single-clip trim/speed/resize edit
    SimpleEdit(EditSpec),
    /// Timed multi-segment plan
    TimedPlan(ExecutionPlan),
    /// Multi-source concatenation with transitions
    MultiSourceConcat(ConcatSpec),
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::SimpleEdit(_) => "simple_edit",
            JobKind::TimedPlan(_) => "timed_plan",
            JobKind::MultiSourceConcat(_) => "multi_source_concat",
        }
    }

    /// Check that the spec declares at least one source reference.
    pub fn has_source(&self) -> bool {
        match self {
            JobKind::SimpleEdit(spec) => spec.source().is_some(),
            JobKind::TimedPlan(plan) => {
                !plan.segments.is_empty() && plan.segments.iter().all(|s| s.source().is_some())
            }
            JobKind::MultiSourceConcat(spec) => !spec.source_urls.is_empty(),
        }
    }

    /// All declared local-path references, for path-safety validation.
    pub fn declared_paths(&self) -> Vec<&str> {
        match self {
            JobKind::SimpleEdit(spec) => spec.source_path.as_deref().into_iter().collect(),
            JobKind::TimedPlan(plan) => plan
                .segments
                .iter()
                .filter_map(|s| s.source_path.as_deref())
                .collect(),
            JobKind::MultiSourceConcat(spec) => spec
                .source_urls
                .iter()
                .map(String::as_str)
                .filter(|s| {
                    let lower = s.to_ascii_lowercase();
                    !lower.starts_with("http://") && !lower.starts_with("https://")
                })
                .collect(),
        }
    }

    /// Requested output container extension, if any.
    pub fn output_format(&self) -> Option<&str> {
        match self {
            JobKind::SimpleEdit(spec) => spec.output_format.as_deref(),
            JobKind::TimedPlan(plan) => plan.output_format.as_deref(),
            JobKind::MultiSourceConcat(spec) => spec.output_format.as_deref(),
        }
    }
}

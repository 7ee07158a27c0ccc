//! Argument builders, one per job kind.
//!
//! These are pure functions from a validated spec plus an already-chosen
//! encoder to a concrete argument vector. They never decide hardware vs
//! software themselves; that is the fallback policy's job.

use std::path::{Path, PathBuf};

use adrender_models::{ConcatSpec, EditSpec, Encoder, EncodingConfig, ExecutionPlan};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};

/// Playback-speed multiplier bounds.
pub const SPEED_MIN: f64 = 0.25;
pub const SPEED_MAX: f64 = 4.0;

/// Output dimension bounds in pixels.
pub const DIMENSION_MIN: u32 = 100;
pub const DIMENSION_MAX: u32 = 4096;

/// Audio volume multiplier bounds.
pub const VOLUME_MIN: f64 = 0.0;
pub const VOLUME_MAX: f64 = 2.0;

/// Cross-fade length between concatenated sources, in seconds.
pub const TRANSITION_SECS: f64 = 0.5;

/// Frame rate all concat inputs are normalized to.
const CONCAT_FPS: u32 = 30;

/// Default normalization size for concat jobs without an explicit resize.
const CONCAT_DEFAULT_WIDTH: u32 = 1280;
const CONCAT_DEFAULT_HEIGHT: u32 = 720;

/// A built argument vector with its planned output.
#[derive(Debug, Clone)]
pub struct BuiltCommand {
    /// Full argument vector (recorded on the job before spawn)
    pub args: Vec<String>,
    /// Planned output path
    pub output: PathBuf,
    /// Expected output duration in seconds, for progress computation
    pub expected_duration: Option<f64>,
}

pub fn clamp_speed(speed: f64) -> f64 {
    speed.clamp(SPEED_MIN, SPEED_MAX)
}

pub fn clamp_dimension(dim: u32) -> u32 {
    dim.clamp(DIMENSION_MIN, DIMENSION_MAX)
}

pub fn clamp_volume(volume: f64) -> f64 {
    volume.clamp(VOLUME_MIN, VOLUME_MAX)
}

/// Format a float without trailing zeros ("0.5", "2", "1.3333").
fn fmt_f64(value: f64) -> String {
    let s = format!("{:.4}", value);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Decompose a speed multiplier into a chain of `atempo` filters.
///
/// A single `atempo` instance only accepts [0.5, 2.0], so factors outside
/// that range are composed from multiple instances.
fn atempo_chain(speed: f64) -> Vec<String> {
    let mut factors = Vec::new();
    let mut f = speed;
    while f > 2.0 {
        factors.push(2.0);
        f /= 2.0;
    }
    while f < 0.5 {
        factors.push(0.5);
        f /= 0.5;
    }
    if (f - 1.0).abs() > 1e-9 || factors.is_empty() {
        factors.push(f);
    }
    factors
        .into_iter()
        .map(|v| format!("atempo={}", fmt_f64(v)))
        .collect()
}

/// Build the command for a single-clip edit.
///
/// `source_duration` is the probed duration of the input, used to derive
/// the expected output duration when no trim window is set.
pub fn build_simple_edit(
    spec: &EditSpec,
    input: &Path,
    source_duration: Option<f64>,
    encoder: Encoder,
    cfg: &EncodingConfig,
    output: &Path,
) -> MediaResult<BuiltCommand> {
    let speed = spec.speed.map(clamp_speed).unwrap_or(1.0);

    let (mut cmd, trimmed_duration) = match &spec.trim {
        Some(trim) => {
            let (start, duration) = trim.resolve()?;
            (
                FfmpegCommand::new(output).seeked_input(input, start, duration),
                Some(duration),
            )
        }
        None => (FfmpegCommand::new(output).input(input), None),
    };

    let expected_duration = trimmed_duration.or(source_duration).map(|d| d / speed);

    let mut vf: Vec<String> = Vec::new();
    if (speed - 1.0).abs() > 1e-9 {
        vf.push(format!("setpts={}*PTS", fmt_f64(1.0 / speed)));
    }
    if let Some(resize) = &spec.resize {
        vf.push(format!(
            "scale={}:{}",
            clamp_dimension(resize.width),
            clamp_dimension(resize.height)
        ));
    }
    if let Some(stage) = encoder.filter_stage() {
        vf.push(stage.to_string());
    }
    if !vf.is_empty() {
        cmd = cmd.video_filter(vf.join(","));
    }

    cmd = cmd.output_args(cfg.video_args(encoder));

    let audio = spec.audio.clone().unwrap_or_default();
    if audio.mute {
        cmd = cmd.no_audio();
    } else {
        let mut af: Vec<String> = Vec::new();
        if (speed - 1.0).abs() > 1e-9 {
            af.extend(atempo_chain(speed));
        }
        if let Some(volume) = audio.volume {
            af.push(format!("volume={}", fmt_f64(clamp_volume(volume))));
        }
        if !af.is_empty() {
            cmd = cmd.audio_filter(af.join(","));
        }
        cmd = cmd.output_args(cfg.audio_args());
    }

    Ok(BuiltCommand {
        args: cmd.build_args(),
        output: output.to_path_buf(),
        expected_duration,
    })
}

/// Build the command for a timed multi-segment plan.
///
/// Each segment gets its own input slot; segments are trimmed and retimed
/// in the filter graph, then joined with the concat filter. `inputs` must
/// be parallel to `plan.segments`.
pub fn build_timed_plan(
    plan: &ExecutionPlan,
    inputs: &[PathBuf],
    encoder: Encoder,
    cfg: &EncodingConfig,
    output: &Path,
) -> MediaResult<BuiltCommand> {
    if plan.segments.is_empty() {
        return Err(MediaError::argument_build("plan has no segments"));
    }
    if inputs.len() != plan.segments.len() {
        return Err(MediaError::argument_build(format!(
            "plan has {} segments but {} resolved inputs",
            plan.segments.len(),
            inputs.len()
        )));
    }

    let audio = plan.audio.clone().unwrap_or_default();
    let with_audio = !audio.mute;

    let mut cmd = FfmpegCommand::new(output);
    for input in inputs {
        cmd = cmd.input(input);
    }

    let mut graph: Vec<String> = Vec::new();
    let mut concat_inputs = String::new();
    let mut expected_duration = 0.0;

    for (i, segment) in plan.segments.iter().enumerate() {
        let (start, duration) = segment.trim.resolve()?;
        let speed = segment.speed.map(clamp_speed).unwrap_or(1.0);
        expected_duration += duration / speed;

        let setpts = if (speed - 1.0).abs() > 1e-9 {
            format!("setpts=(PTS-STARTPTS)*{}", fmt_f64(1.0 / speed))
        } else {
            "setpts=PTS-STARTPTS".to_string()
        };

        let mut chain = format!(
            "[{i}:v]trim=start={:.3}:duration={:.3},{}",
            start, duration, setpts
        );
        if let Some(resize) = &plan.resize {
            chain.push_str(&format!(
                ",scale={}:{},setsar=1",
                clamp_dimension(resize.width),
                clamp_dimension(resize.height)
            ));
        }
        chain.push_str(&format!("[v{i}]"));
        graph.push(chain);

        if with_audio {
            let mut achain = format!(
                "[{i}:a]atrim=start={:.3}:duration={:.3},asetpts=PTS-STARTPTS",
                start, duration
            );
            if (speed - 1.0).abs() > 1e-9 {
                achain.push(',');
                achain.push_str(&atempo_chain(speed).join(","));
            }
            achain.push_str(&format!("[a{i}]"));
            graph.push(achain);
            concat_inputs.push_str(&format!("[v{i}][a{i}]"));
        } else {
            concat_inputs.push_str(&format!("[v{i}]"));
        }
    }

    let n = plan.segments.len();
    let a_streams = if with_audio { 1 } else { 0 };
    let mut video_label = "[vcat]".to_string();
    graph.push(format!(
        "{concat_inputs}concat=n={n}:v=1:a={a_streams}{}",
        if with_audio { "[vcat][acat]" } else { "[vcat]" }
    ));

    if let Some(stage) = encoder.filter_stage() {
        graph.push(format!("[vcat]{stage}[vout]"));
        video_label = "[vout]".to_string();
    }

    let mut audio_label = "[acat]".to_string();
    if with_audio {
        if let Some(volume) = audio.volume {
            graph.push(format!(
                "[acat]volume={}[aout]",
                fmt_f64(clamp_volume(volume))
            ));
            audio_label = "[aout]".to_string();
        }
    }

    cmd = cmd.filter_complex(graph.join(";")).map(video_label);
    cmd = cmd.output_args(cfg.video_args(encoder));

    if with_audio {
        cmd = cmd.map(audio_label).output_args(cfg.audio_args());
    } else {
        cmd = cmd.no_audio();
    }

    Ok(BuiltCommand {
        args: cmd.build_args(),
        output: output.to_path_buf(),
        expected_duration: Some(expected_duration),
    })
}

/// Build the command for a multi-source concatenation with transitions.
///
/// Every input is normalized to one resolution/frame-rate via scale+pad
/// before any transition filter runs; mismatched inputs cannot be
/// cross-faded directly. `durations` must be parallel to `inputs` and
/// carry each input's probed duration (xfade offsets depend on them).
pub fn build_concat(
    spec: &ConcatSpec,
    inputs: &[PathBuf],
    durations: &[f64],
    max_duration: f64,
    encoder: Encoder,
    cfg: &EncodingConfig,
    output: &Path,
) -> MediaResult<BuiltCommand> {
    if inputs.is_empty() {
        return Err(MediaError::argument_build("concat has no sources"));
    }
    if inputs.len() != durations.len() {
        return Err(MediaError::argument_build(format!(
            "concat has {} inputs but {} durations",
            inputs.len(),
            durations.len()
        )));
    }

    let (width, height) = match &spec.resize {
        Some(r) => (clamp_dimension(r.width), clamp_dimension(r.height)),
        None => (CONCAT_DEFAULT_WIDTH, CONCAT_DEFAULT_HEIGHT),
    };

    let audio = spec.audio.clone().unwrap_or_default();
    let with_audio = !audio.mute;

    let mut cmd = FfmpegCommand::new(output);
    for input in inputs {
        cmd = cmd.input(input);
    }

    let mut graph: Vec<String> = Vec::new();

    // Normalize every input before any transition is applied.
    for i in 0..inputs.len() {
        graph.push(format!(
            "[{i}:v]scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={CONCAT_FPS}[v{i}]"
        ));
    }

    // Chain one xfade per adjacent pair.
    let mut video_label = "v0".to_string();
    let mut total = durations[0];
    for i in 1..inputs.len() {
        let transition = spec.transition_at(i - 1).xfade_name();
        let offset = (total - TRANSITION_SECS).max(0.0);
        graph.push(format!(
            "[{video_label}][v{i}]xfade=transition={transition}:duration={TRANSITION_SECS}:offset={:.3}[x{i}]",
            offset
        ));
        video_label = format!("x{i}");
        total = offset + durations[i];
    }

    if let Some(stage) = encoder.filter_stage() {
        graph.push(format!("[{video_label}]{stage}[vout]"));
        video_label = "vout".to_string();
    }

    // Audio cross-fades mirror the video transitions.
    let audio_label = if with_audio && inputs.len() > 1 {
        let mut label = "0:a".to_string();
        for i in 1..inputs.len() {
            graph.push(format!(
                "[{label}][{i}:a]acrossfade=d={TRANSITION_SECS}[xa{i}]"
            ));
            label = format!("xa{i}");
        }
        if let Some(volume) = audio.volume {
            graph.push(format!(
                "[{label}]volume={}[avol]",
                fmt_f64(clamp_volume(volume))
            ));
            label = "avol".to_string();
        }
        Some(format!("[{label}]"))
    } else if with_audio {
        Some("0:a".to_string())
    } else {
        None
    };

    cmd = cmd
        .filter_complex(graph.join(";"))
        .map(format!("[{video_label}]"));
    cmd = cmd.output_args(cfg.video_args(encoder));

    match audio_label {
        Some(label) => {
            cmd = cmd.map(label).output_args(cfg.audio_args());
        }
        None => {
            cmd = cmd.no_audio();
        }
    }

    // Total output duration is capped regardless of input count.
    let expected_duration = if total > max_duration {
        cmd = cmd.output_duration(max_duration);
        max_duration
    } else {
        total
    };

    Ok(BuiltCommand {
        args: cmd.build_args(),
        output: output.to_path_buf(),
        expected_duration: Some(expected_duration),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use adrender_models::{AudioOpts, PlanSegment, TimePoint, TrimWindow};

    fn trim(start: f64, end: f64) -> TrimWindow {
        TrimWindow {
            start: TimePoint::Seconds(start),
            end: TimePoint::Seconds(end),
        }
    }

    fn edit_spec() -> EditSpec {
        EditSpec {
            source_path: Some("/data/uploads/in.mp4".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_trim_becomes_seek_plus_duration() {
        let spec = EditSpec {
            trim: Some(trim(2.0, 7.0)),
            ..edit_spec()
        };
        let built = build_simple_edit(
            &spec,
            Path::new("/in.mp4"),
            None,
            Encoder::Software,
            &EncodingConfig::default(),
            Path::new("/out.mp4"),
        )
        .unwrap();

        let ss = built.args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(built.args[ss + 1], "2.000");
        let t = built.args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(built.args[t + 1], "5.000");
        assert!(!built.args.contains(&"-to".to_string()));
        assert_eq!(built.expected_duration, Some(5.0));
    }

    #[test]
    fn test_speed_retimes_video_and_audio() {
        let spec = EditSpec {
            speed: Some(2.0),
            trim: Some(trim(0.0, 10.0)),
            ..edit_spec()
        };
        let built = build_simple_edit(
            &spec,
            Path::new("/in.mp4"),
            None,
            Encoder::Software,
            &EncodingConfig::default(),
            Path::new("/out.mp4"),
        )
        .unwrap();

        let vf = built.args.iter().position(|a| a == "-vf").unwrap();
        assert!(built.args[vf + 1].contains("setpts=0.5*PTS"));
        let af = built.args.iter().position(|a| a == "-af").unwrap();
        assert!(built.args[af + 1].contains("atempo=2"));
        assert_eq!(built.expected_duration, Some(5.0));
    }

    #[test]
    fn test_knobs_are_clamped() {
        assert_eq!(clamp_speed(10.0), SPEED_MAX);
        assert_eq!(clamp_speed(0.01), SPEED_MIN);
        assert_eq!(clamp_dimension(50), DIMENSION_MIN);
        assert_eq!(clamp_dimension(9999), DIMENSION_MAX);
        assert_eq!(clamp_volume(5.0), VOLUME_MAX);
    }

    #[test]
    fn test_atempo_chain_composes_extreme_factors() {
        assert_eq!(atempo_chain(2.0), vec!["atempo=2"]);
        assert_eq!(atempo_chain(4.0), vec!["atempo=2", "atempo=2"]);
        assert_eq!(atempo_chain(0.25), vec!["atempo=0.5", "atempo=0.5"]);
    }

    #[test]
    fn test_mute_drops_audio_stream() {
        let spec = EditSpec {
            audio: Some(AudioOpts {
                mute: true,
                volume: None,
            }),
            ..edit_spec()
        };
        let built = build_simple_edit(
            &spec,
            Path::new("/in.mp4"),
            Some(10.0),
            Encoder::Software,
            &EncodingConfig::default(),
            Path::new("/out.mp4"),
        )
        .unwrap();
        assert!(built.args.contains(&"-an".to_string()));
        assert!(!built.args.contains(&"-c:a".to_string()));
    }

    #[test]
    fn test_hardware_path_adds_upload_stage() {
        let built = build_simple_edit(
            &edit_spec(),
            Path::new("/in.mp4"),
            Some(10.0),
            Encoder::Vaapi,
            &EncodingConfig::default(),
            Path::new("/out.mp4"),
        )
        .unwrap();
        let vf = built.args.iter().position(|a| a == "-vf").unwrap();
        assert!(built.args[vf + 1].contains("hwupload"));
        assert!(built.args.contains(&"h264_vaapi".to_string()));
        assert!(!built.args.contains(&"+faststart".to_string()));
    }

    #[test]
    fn test_plan_graph_trims_and_concats() {
        let plan = ExecutionPlan {
            segments: vec![
                PlanSegment {
                    source_path: Some("/data/uploads/a.mp4".into()),
                    source_url: None,
                    trim: trim(0.0, 4.0),
                    speed: None,
                },
                PlanSegment {
                    source_path: Some("/data/uploads/b.mp4".into()),
                    source_url: None,
                    trim: trim(2.0, 6.0),
                    speed: Some(2.0),
                },
            ],
            ..Default::default()
        };
        let inputs = vec![PathBuf::from("/a.mp4"), PathBuf::from("/b.mp4")];
        let built = build_timed_plan(
            &plan,
            &inputs,
            Encoder::Software,
            &EncodingConfig::default(),
            Path::new("/out.mp4"),
        )
        .unwrap();

        let fc = built.args.iter().position(|a| a == "-filter_complex").unwrap();
        let graph = &built.args[fc + 1];
        assert!(graph.contains("trim=start=0.000:duration=4.000"));
        assert!(graph.contains("trim=start=2.000:duration=4.000"));
        assert!(graph.contains("setpts=(PTS-STARTPTS)*0.5"));
        assert!(graph.contains("atempo=2"));
        assert!(graph.contains("concat=n=2:v=1:a=1"));
        // 4.0 + 4.0/2.0
        assert_eq!(built.expected_duration, Some(6.0));
    }

    #[test]
    fn test_concat_normalizes_then_fades() {
        let spec = ConcatSpec {
            source_urls: vec![
                "https://cdn.example.com/a.mp4".into(),
                "https://cdn.example.com/b.mp4".into(),
                "https://cdn.example.com/c.mp4".into(),
            ],
            transitions: vec!["wipe".into(), "sparkle".into()],
            ..Default::default()
        };
        let inputs = vec![
            PathBuf::from("/a.mp4"),
            PathBuf::from("/b.mp4"),
            PathBuf::from("/c.mp4"),
        ];
        let built = build_concat(
            &spec,
            &inputs,
            &[10.0, 10.0, 10.0],
            120.0,
            Encoder::Software,
            &EncodingConfig::default(),
            Path::new("/out.mp4"),
        )
        .unwrap();

        let fc = built.args.iter().position(|a| a == "-filter_complex").unwrap();
        let graph = &built.args[fc + 1];
        // Normalization comes before any xfade
        let pad_idx = graph.find("pad=1280:720").unwrap();
        let xfade_idx = graph.find("xfade").unwrap();
        assert!(pad_idx < xfade_idx);
        // First boundary is a wipe, the unknown name falls back to fade
        assert!(graph.contains("xfade=transition=wipeleft"));
        assert!(graph.contains("xfade=transition=fade"));
        assert!(graph.contains("acrossfade"));
        // 10 + 9.5 + 9.5
        assert_eq!(built.expected_duration, Some(29.0));
    }

    #[test]
    fn test_concat_duration_is_capped() {
        let spec = ConcatSpec {
            source_urls: vec![
                "https://cdn.example.com/a.mp4".into(),
                "https://cdn.example.com/b.mp4".into(),
            ],
            ..Default::default()
        };
        let inputs = vec![PathBuf::from("/a.mp4"), PathBuf::from("/b.mp4")];
        let built = build_concat(
            &spec,
            &inputs,
            &[100.0, 100.0],
            60.0,
            Encoder::Software,
            &EncodingConfig::default(),
            Path::new("/out.mp4"),
        )
        .unwrap();

        let t = built.args.iter().rposition(|a| a == "-t").unwrap();
        assert_eq!(built.args[t + 1], "60.000");
        assert_eq!(built.expected_duration, Some(60.0));
    }
}

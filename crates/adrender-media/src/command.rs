//! FFmpeg command assembly and the process runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{parse_time_marker, EncodeProgress};

/// Number of stderr lines retained for failure messages.
const STDERR_TAIL_LINES: usize = 40;

/// One input file with its pre-`-i` arguments.
#[derive(Debug, Clone)]
struct Input {
    args: Vec<String>,
    path: PathBuf,
}

/// Builder for an FFmpeg argument vector.
///
/// Outputs are always force-overwritten, and `-stats` keeps the `time=`
/// progress marker on stderr even at the quiet log level.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<Input>,
    output_args: Vec<String>,
    output: PathBuf,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output_args: Vec::new(),
            output: output.as_ref().to_path_buf(),
            log_level: "error".to_string(),
        }
    }

    /// Add a plain input file.
    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.inputs.push(Input {
            args: Vec::new(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    /// Add an input with a seek offset and a duration window.
    ///
    /// The window is expressed as `-ss` + `-t`; an absolute end-time flag
    /// is never emitted because it is misinterpreted after a seek.
    pub fn seeked_input(mut self, path: impl AsRef<Path>, start: f64, duration: f64) -> Self {
        self.inputs.push(Input {
            args: vec![
                "-ss".to_string(),
                format!("{:.3}", start),
                "-t".to_string(),
                format!("{:.3}", duration),
            ],
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    /// Add an output argument (after all inputs).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set a simple video filter chain.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set a simple audio filter chain.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    /// Set a filter complex graph.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a filter graph label into the output.
    pub fn map(self, label: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(label)
    }

    /// Drop the audio stream.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Cap the output duration.
    pub fn output_duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// The planned output path.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the full argument vector.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        // Force overwrite
        args.push("-y".to_string());

        // Quiet logs, but keep the stats line with the time= marker
        args.push("-v".to_string());
        args.push(self.log_level.clone());
        args.push("-stats".to_string());

        for input in &self.inputs {
            args.extend(input.args.clone());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Terminal classification of one execution attempt.
///
/// `spawned -> running -> {exited_zero | exited_nonzero | timed_out |
/// spawn_failed}`; a zero exit additionally requires a non-empty output
/// file before the attempt counts as a success.
pub struct FfmpegRunner {
    binary: PathBuf,
    timeout: Duration,
}

impl FfmpegRunner {
    /// Create a runner invoking the given encoder binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: Duration::from_secs(600),
        }
    }

    /// Set the wall-clock ceiling for one attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run one attempt.
    ///
    /// Every stderr line is handed to `on_line`; lines carrying a `time=`
    /// marker additionally produce an `on_progress` call. The call only
    /// returns `Ok` when the process exited zero *and* the output file
    /// exists and is non-empty.
    pub async fn run<L, P>(&self, args: &[String], output: &Path, on_line: L, on_progress: P) -> MediaResult<()>
    where
        L: Fn(String) + Send + 'static,
        P: Fn(EncodeProgress) + Send + 'static,
    {
        debug!("Running encoder: {} {}", self.binary.display(), args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::SpawnFailed {
                message: e.to_string(),
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::SpawnFailed {
                message: "stderr not captured".to_string(),
            })?;

        // Drain stderr concurrently with waiting for exit, so the pipe
        // never fills up and progress flows while the process runs.
        let drain = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(progress) = parse_time_marker(&line) {
                    on_progress(progress);
                }
                if tail.len() >= STDERR_TAIL_LINES {
                    tail.remove(0);
                }
                tail.push(line.clone());
                on_line(line);
            }
            tail
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Encoder timed out after {}s, killing process",
                    self.timeout.as_secs()
                );
                let _ = child.kill().await;
                let _ = drain.await;
                return Err(MediaError::Timeout(self.timeout.as_secs()));
            }
        };

        let stderr_tail = drain.await.unwrap_or_default();

        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                "encoder exited with non-zero status",
                Some(stderr_tail.join("\n")),
                status.code(),
            ));
        }

        // Exit-code success alone is not trusted.
        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(MediaError::EmptyOutput(output.to_path_buf())),
        }
    }
}

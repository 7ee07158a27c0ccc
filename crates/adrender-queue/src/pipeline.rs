//! Per-job execution pipeline.
//!
//! Each running job is one sequential task: resolve sources, build the
//! argument vector, run the encoder (with hardware-to-software fallback),
//! register the artifact. Scratch files are removed in the epilogue no
//! matter which path was taken, and no error ever escapes into the drain
//! loop.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info, warn};

use adrender_media::{
    build_concat, build_simple_edit, build_timed_plan, classify_source, get_duration,
    probe_media, BuiltCommand, FfmpegRunner, MediaError, MediaResult, SourceRef,
};
use adrender_models::{Artifact, Encoder, JobId, JobKind};

use crate::error::{QueueError, QueueResult};
use crate::scheduler::Scheduler;

/// MIME type for a produced container extension.
fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => "video/mp4",
    }
}

impl Scheduler {
    /// Drive one job from `running` to a terminal state.
    pub(crate) async fn run_job(&self, job_id: JobId) {
        info!(job_id = %job_id, "Job started");
        self.store.update(&job_id, |job| {
            job.start();
            job.push_log("Job started");
        });

        let result = self.execute(&job_id).await;

        // Guaranteed epilogue: scratch files go away exactly once per job,
        // on success and on failure alike.
        for path in self.store.take_temp_files(&job_id) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(job_id = %job_id, "Removed temp file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(job_id = %job_id, "Failed to remove temp file {}: {}", path.display(), e)
                }
            }
        }

        match result {
            Ok((artifacts, encoder)) => {
                info!(job_id = %job_id, encoder = %encoder, "Job completed");
                self.store.update(&job_id, |job| {
                    job.push_log("Job completed");
                    job.complete(artifacts, encoder);
                });
            }
            Err(e) => {
                warn!(job_id = %job_id, "Job failed: {}", e);
                self.store.update(&job_id, |job| {
                    job.push_log(format!("Job failed: {e}"));
                    job.fail(e.to_job_error());
                });
            }
        }
    }

    /// The fallible part of the pipeline.
    async fn execute(&self, job_id: &JobId) -> QueueResult<(Vec<Artifact>, Encoder)> {
        let kind = self
            .store
            .read(job_id, |job| job.kind.clone())
            .ok_or_else(|| QueueError::not_found(job_id.to_string()))?;

        let ext = kind.output_format().unwrap_or("mp4").to_string();
        let output = self.config.output_dir.join(format!("{job_id}.{ext}"));

        let (built, encoder) = match &kind {
            JobKind::SimpleEdit(spec) => {
                let input = self
                    .resolve_one(
                        job_id,
                        0,
                        spec.source_path.as_deref(),
                        spec.source_url.as_deref(),
                    )
                    .await?;
                // The probed duration only matters for progress when no
                // trim window fixes the output length.
                let source_duration = if spec.trim.is_none() {
                    get_duration(&input).await.ok()
                } else {
                    None
                };
                self.run_attempts(job_id, |encoder| {
                    build_simple_edit(
                        spec,
                        &input,
                        source_duration,
                        encoder,
                        &self.config.encoding,
                        &output,
                    )
                })
                .await?
            }
            JobKind::TimedPlan(plan) => {
                let sources: Vec<(Option<&str>, Option<&str>)> = plan
                    .segments
                    .iter()
                    .map(|s| (s.source_path.as_deref(), s.source_url.as_deref()))
                    .collect();
                let inputs = self.resolve_list(job_id, sources).await?;
                self.run_attempts(job_id, |encoder| {
                    build_timed_plan(plan, &inputs, encoder, &self.config.encoding, &output)
                })
                .await?
            }
            JobKind::MultiSourceConcat(spec) => {
                let sources: Vec<(Option<&str>, Option<&str>)> = spec
                    .source_urls
                    .iter()
                    .map(|u| (Some(u.as_str()), None))
                    .collect();
                let inputs = self.resolve_list(job_id, sources).await?;

                // xfade offsets depend on every input's real duration.
                let mut durations = Vec::with_capacity(inputs.len());
                for (index, input) in inputs.iter().enumerate() {
                    let duration = get_duration(input).await.map_err(|e| {
                        QueueError::Media(MediaError::InvalidVideo(format!(
                            "source {index}: {e}"
                        )))
                    })?;
                    durations.push(duration);
                }

                self.run_attempts(job_id, |encoder| {
                    build_concat(
                        spec,
                        &inputs,
                        &durations,
                        self.config.max_concat_duration,
                        encoder,
                        &self.config.encoding,
                        &output,
                    )
                })
                .await?
            }
        };

        let artifact = self.collect_artifact(&built, &ext).await?;
        Ok((vec![artifact], encoder))
    }

    /// Resolve one declared source to a local file.
    async fn resolve_one(
        &self,
        job_id: &JobId,
        index: usize,
        path: Option<&str>,
        url: Option<&str>,
    ) -> QueueResult<PathBuf> {
        match classify_source(path, url)? {
            SourceRef::Local(local) => {
                debug!(job_id = %job_id, "Using local source {}", local);
                Ok(PathBuf::from(local))
            }
            SourceRef::Remote(remote) => {
                let dest = self.resolver.scratch_path(job_id.as_str(), index, remote);
                // Registered before the download starts so a partial file
                // is still cleaned up.
                let registered = dest.clone();
                self.store
                    .update(job_id, |job| job.register_temp_file(registered));
                self.store
                    .update(job_id, |job| job.push_log(format!("Downloading {remote}")));
                self.resolver.download(remote, &dest).await?;
                Ok(dest)
            }
        }
    }

    /// Resolve an ordered source list; the first failure aborts the whole
    /// job with the failing index attached.
    async fn resolve_list(
        &self,
        job_id: &JobId,
        sources: Vec<(Option<&str>, Option<&str>)>,
    ) -> QueueResult<Vec<PathBuf>> {
        let mut inputs = Vec::with_capacity(sources.len());
        for (index, (path, url)) in sources.into_iter().enumerate() {
            let resolved = self
                .resolve_one(job_id, index, path, url)
                .await
                .map_err(|e| {
                    let origin = url.or(path).unwrap_or("<none>").to_string();
                    QueueError::Media(MediaError::download_failed(
                        origin,
                        format!("source {index}: {e}"),
                    ))
                })?;
            inputs.push(resolved);
        }
        Ok(inputs)
    }

    /// Run the encoder, retrying once with the software encoder when a
    /// hardware attempt fails. The retry is invisible to clients: the job
    /// stays in one `running` episode, and only `encoder_used` betrays
    /// that a fallback happened.
    async fn run_attempts<F>(&self, job_id: &JobId, build: F) -> QueueResult<(BuiltCommand, Encoder)>
    where
        F: Fn(Encoder) -> MediaResult<BuiltCommand>,
    {
        let primary = self.pool.preferred();
        match self.attempt(job_id, &build, primary).await {
            Ok(built) => Ok((built, primary)),
            Err(QueueError::Media(e)) if primary.is_hardware() && e.is_attempt_failure() => {
                warn!(
                    job_id = %job_id,
                    "Hardware encoder failed ({}), retrying with software encoder", e
                );
                self.store.update(job_id, |job| {
                    job.push_log(format!(
                        "Hardware encoder failed ({e}), retrying with software encoder"
                    ));
                });
                let built = self.attempt(job_id, &build, Encoder::Software).await?;
                Ok((built, Encoder::Software))
            }
            Err(e) => Err(e),
        }
    }

    /// One execution attempt with the given encoder.
    async fn attempt<F>(
        &self,
        job_id: &JobId,
        build: &F,
        encoder: Encoder,
    ) -> QueueResult<BuiltCommand>
    where
        F: Fn(Encoder) -> MediaResult<BuiltCommand>,
    {
        let built = build(encoder)?;

        // The exact command is on the record before the process spawns.
        let display = format!(
            "{} {}",
            self.config.encoder_binary.display(),
            built.args.join(" ")
        );
        self.store.update(job_id, |job| {
            job.command_line = Some(built.args.clone());
            job.push_log(format!("Command: {display}"));
        });

        let expected_ms = built.expected_duration.map(|d| (d * 1000.0) as i64);
        let started = Instant::now();

        let log_store = self.store.clone();
        let log_id = job_id.clone();
        let progress_store = self.store.clone();
        let progress_id = job_id.clone();

        let runner = FfmpegRunner::new(&self.config.encoder_binary)
            .with_timeout(self.config.attempt_timeout);
        let run = runner
            .run(
                &built.args,
                &built.output,
                move |line| {
                    log_store.update(&log_id, |job| job.push_log(line));
                },
                move |progress| {
                    if let Some(total_ms) = expected_ms {
                        let percent = progress.percentage(total_ms);
                        let eta = progress.eta_seconds(total_ms, started.elapsed());
                        progress_store.update(&progress_id, |job| {
                            job.set_progress(percent);
                            if let Some(eta) = eta {
                                job.eta_seconds = Some(eta);
                            }
                        });
                    }
                },
            )
            .await;

        if let Err(e) = run {
            // A failed attempt must not leave a partial output behind.
            let _ = tokio::fs::remove_file(&built.output).await;
            return Err(e.into());
        }

        Ok(built)
    }

    /// Build artifact metadata for the produced output file.
    async fn collect_artifact(&self, built: &BuiltCommand, ext: &str) -> QueueResult<Artifact> {
        let meta = tokio::fs::metadata(&built.output).await?;

        // Probe the real output: a speed-changed render reports its
        // retimed duration, not the source's.
        let duration_ms = match probe_media(&built.output).await {
            Ok(info) if info.duration > 0.0 => (info.duration * 1000.0) as u64,
            _ => built
                .expected_duration
                .map(|d| (d * 1000.0) as u64)
                .unwrap_or(0),
        };

        Ok(Artifact {
            kind: "video".to_string(),
            mime: mime_for_extension(ext).to_string(),
            path: built.output.clone(),
            size_bytes: meta.len(),
            duration_ms,
        })
    }
}
//! Scheduler integration tests.
//!
//! These drive a real `Scheduler` against a stub encoder executable that
//! mimics FFmpeg's observable behavior: it writes the output file named by
//! the last argument, prints a `time=` stats line on stderr, and can be
//! made to fail deterministically.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use wiremock::matchers::{method, path as url_path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use adrender_media::EncoderPool;
use adrender_models::{
    ConcatSpec, EditSpec, Encoder, JobId, JobKind, JobStatus, Priority, TimePoint, TrimWindow,
};
use adrender_queue::{QueueError, Scheduler, SchedulerConfig};

/// Write an executable stub encoder script.
fn stub_encoder(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("stub-ffmpeg.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Stub body that renders successfully after an optional delay.
fn success_body(sleep: &str) -> String {
    format!(
        r#"{sleep}
for a; do out="$a"; done
echo "frame=  30 fps=30 q=28.0 size=100KiB time=00:00:01.00 bitrate=1k speed=1x" >&2
printf 'rendered' > "$out""#
    )
}

fn test_config(tmp: &Path, encoder: PathBuf) -> SchedulerConfig {
    let upload_dir = tmp.join("uploads");
    std::fs::create_dir_all(&upload_dir).unwrap();
    SchedulerConfig {
        encoder_binary: encoder,
        scratch_dir: tmp.join("scratch"),
        output_dir: tmp.join("outputs"),
        upload_dir,
        ..SchedulerConfig::default()
    }
}

fn local_edit(config: &SchedulerConfig, name: &str) -> JobKind {
    let source = config.upload_dir.join(name);
    std::fs::write(&source, b"source-bytes").unwrap();
    JobKind::SimpleEdit(EditSpec {
        source_path: Some(source.to_string_lossy().into_owned()),
        trim: Some(TrimWindow {
            start: TimePoint::Seconds(2.0),
            end: TimePoint::Seconds(7.0),
        }),
        ..Default::default()
    })
}

async fn wait_terminal(
    scheduler: &Arc<Scheduler>,
    id: &JobId,
    timeout: Duration,
) -> adrender_queue::JobView {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let view = scheduler.view(id).expect("job should exist");
        if view.status.is_terminal() {
            return view;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job did not finish in time; last status {:?}",
            view.status
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

async fn wait_running(scheduler: &Arc<Scheduler>, id: &JobId) {
    for _ in 0..200 {
        if scheduler.view(id).unwrap().status == JobStatus::Running {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job never started running");
}

fn job_id(receipt: &adrender_queue::SubmitReceipt) -> JobId {
    JobId::from_string(receipt.job_id.clone())
}

#[tokio::test]
async fn simple_edit_runs_to_done() {
    let tmp = TempDir::new().unwrap();
    let encoder = stub_encoder(tmp.path(), &success_body(""));
    let config = test_config(tmp.path(), encoder);
    let scheduler = Scheduler::new(config.clone(), EncoderPool::software_only(1)).unwrap();

    let receipt = scheduler
        .submit(local_edit(&config, "in.mp4"), Priority::Normal)
        .unwrap();
    assert_eq!(receipt.status, "queued");
    assert_eq!(receipt.queue_position, 1);

    let id = job_id(&receipt);
    let view = wait_terminal(&scheduler, &id, Duration::from_secs(5)).await;

    assert_eq!(view.status, JobStatus::Done);
    assert_eq!(view.progress_percent, 100);
    assert_eq!(view.encoder_used, Some(Encoder::Software));
    assert!(view.completed_at.is_some());

    // Trim became -ss 2 + -t 5, never an absolute end flag.
    let command = view.command.expect("command recorded");
    assert!(command.contains("-ss 2.000"));
    assert!(command.contains("-t 5.000"));
    assert!(!command.contains("-to "));

    let artifact = &view.artifacts[0];
    assert_eq!(artifact.mime, "video/mp4");
    assert!(artifact.size_bytes > 0);
    assert!(artifact.path.exists());
}

#[tokio::test]
async fn hardware_failure_falls_back_to_software_with_two_spawns() {
    let tmp = TempDir::new().unwrap();
    let count_file = tmp.path().join("spawns");
    let body = format!(
        r#"echo run >> "{count}"
case "$*" in *h264_nvenc*) exit 1 ;; esac
for a; do out="$a"; done
printf 'rendered' > "$out""#,
        count = count_file.display()
    );
    let encoder = stub_encoder(tmp.path(), &body);
    let config = test_config(tmp.path(), encoder);
    let pool = EncoderPool {
        hardware: Some(Encoder::Nvenc),
        slots: 1,
    };
    let scheduler = Scheduler::new(config.clone(), pool).unwrap();

    let receipt = scheduler
        .submit(local_edit(&config, "in.mp4"), Priority::Normal)
        .unwrap();
    let id = job_id(&receipt);
    let view = wait_terminal(&scheduler, &id, Duration::from_secs(5)).await;

    assert_eq!(view.status, JobStatus::Done);
    assert_eq!(view.encoder_used, Some(Encoder::Software));

    // Exactly two process spawns: one hardware attempt, one fallback.
    let spawns = std::fs::read_to_string(&count_file).unwrap();
    assert_eq!(spawns.lines().count(), 2);

    // The recorded command is the one that actually succeeded.
    assert!(view.command.unwrap().contains("libx264"));
}

#[tokio::test]
async fn equal_slots_dequeue_by_priority_then_fifo() {
    let tmp = TempDir::new().unwrap();
    let encoder = stub_encoder(tmp.path(), &success_body("sleep 0.4"));
    let config = test_config(tmp.path(), encoder);
    let scheduler = Scheduler::new(config.clone(), EncoderPool::software_only(1)).unwrap();

    // Occupy the single slot so the next three stay pending.
    let blocker = scheduler
        .submit(local_edit(&config, "blocker.mp4"), Priority::High)
        .unwrap();
    wait_running(&scheduler, &job_id(&blocker)).await;

    let low = scheduler
        .submit(local_edit(&config, "low.mp4"), Priority::Low)
        .unwrap();
    let high = scheduler
        .submit(local_edit(&config, "high.mp4"), Priority::High)
        .unwrap();
    let normal = scheduler
        .submit(local_edit(&config, "normal.mp4"), Priority::Normal)
        .unwrap();

    let low = wait_terminal(&scheduler, &job_id(&low), Duration::from_secs(10)).await;
    let high = wait_terminal(&scheduler, &job_id(&high), Duration::from_secs(10)).await;
    let normal = wait_terminal(&scheduler, &job_id(&normal), Duration::from_secs(10)).await;

    let high_started = high.started_at.unwrap();
    let normal_started = normal.started_at.unwrap();
    let low_started = low.started_at.unwrap();
    assert!(high_started < normal_started);
    assert!(normal_started < low_started);
}

#[tokio::test]
async fn full_pending_list_rejects_submissions() {
    let tmp = TempDir::new().unwrap();
    let encoder = stub_encoder(tmp.path(), &success_body("sleep 0.5"));
    let config = SchedulerConfig {
        max_pending: 2,
        ..test_config(tmp.path(), encoder)
    };
    let scheduler = Scheduler::new(config.clone(), EncoderPool::software_only(1)).unwrap();

    let blocker = scheduler
        .submit(local_edit(&config, "blocker.mp4"), Priority::Normal)
        .unwrap();
    wait_running(&scheduler, &job_id(&blocker)).await;

    let first = scheduler
        .submit(local_edit(&config, "a.mp4"), Priority::Normal)
        .unwrap();
    let second = scheduler
        .submit(local_edit(&config, "b.mp4"), Priority::Normal)
        .unwrap();

    let err = scheduler
        .submit(local_edit(&config, "c.mp4"), Priority::Normal)
        .unwrap_err();
    assert!(matches!(err, QueueError::QueueOverflow { capacity: 2 }));

    // The already-queued jobs are unaffected by the rejection.
    let first = wait_terminal(&scheduler, &job_id(&first), Duration::from_secs(10)).await;
    let second = wait_terminal(&scheduler, &job_id(&second), Duration::from_secs(10)).await;
    assert_eq!(first.status, JobStatus::Done);
    assert_eq!(second.status, JobStatus::Done);
}

#[tokio::test]
async fn temp_files_are_removed_on_success_and_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(url_path("/ok.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"remote-bytes".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/missing.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let encoder = stub_encoder(tmp.path(), &success_body(""));
    let config = test_config(tmp.path(), encoder);
    let scratch = config.scratch_dir.clone();
    let scheduler = Scheduler::new(config, EncoderPool::software_only(1)).unwrap();

    // Success path: the downloaded scratch file is gone afterwards.
    let ok = scheduler
        .submit(
            JobKind::SimpleEdit(EditSpec {
                source_url: Some(format!("{}/ok.mp4", server.uri())),
                trim: Some(TrimWindow {
                    start: TimePoint::Seconds(0.0),
                    end: TimePoint::Seconds(1.0),
                }),
                ..Default::default()
            }),
            Priority::Normal,
        )
        .unwrap();
    let view = wait_terminal(&scheduler, &job_id(&ok), Duration::from_secs(5)).await;
    assert_eq!(view.status, JobStatus::Done);

    // Failure path: download fails, job errors, nothing lingers.
    let bad = scheduler
        .submit(
            JobKind::SimpleEdit(EditSpec {
                source_url: Some(format!("{}/missing.mp4", server.uri())),
                ..Default::default()
            }),
            Priority::Normal,
        )
        .unwrap();
    let view = wait_terminal(&scheduler, &job_id(&bad), Duration::from_secs(5)).await;
    assert_eq!(view.status, JobStatus::Error);
    assert_eq!(view.error.unwrap().code, "source_unavailable");

    let leftovers: Vec<_> = std::fs::read_dir(&scratch).unwrap().collect();
    assert!(leftovers.is_empty(), "scratch not cleaned: {leftovers:?}");
}

#[tokio::test]
async fn concat_failure_identifies_source_index_and_creates_no_output() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(url_path("/a.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"aaaa".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/b.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/c.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"cccc".to_vec()))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let encoder = stub_encoder(tmp.path(), &success_body(""));
    let config = test_config(tmp.path(), encoder);
    let output_dir = config.output_dir.clone();
    let scheduler = Scheduler::new(config, EncoderPool::software_only(1)).unwrap();

    let receipt = scheduler
        .submit(
            JobKind::MultiSourceConcat(ConcatSpec {
                source_urls: vec![
                    format!("{}/a.mp4", server.uri()),
                    format!("{}/b.mp4", server.uri()),
                    format!("{}/c.mp4", server.uri()),
                ],
                transitions: vec!["fade".into(), "wipe".into()],
                ..Default::default()
            }),
            Priority::Normal,
        )
        .unwrap();

    let view = wait_terminal(&scheduler, &job_id(&receipt), Duration::from_secs(5)).await;
    assert_eq!(view.status, JobStatus::Error);

    let error = view.error.unwrap();
    assert_eq!(error.code, "source_unavailable");
    assert!(error.message.contains("source 1"), "message: {}", error.message);

    let outputs: Vec<_> = std::fs::read_dir(&output_dir).unwrap().collect();
    assert!(outputs.is_empty(), "no output file should exist");
}

#[tokio::test]
async fn single_slot_never_runs_two_jobs_at_once() {
    let tmp = TempDir::new().unwrap();
    let encoder = stub_encoder(tmp.path(), &success_body("sleep 0.3"));
    let config = test_config(tmp.path(), encoder);
    let scheduler = Scheduler::new(config.clone(), EncoderPool::software_only(1)).unwrap();

    let a = job_id(
        &scheduler
            .submit(local_edit(&config, "a.mp4"), Priority::Normal)
            .unwrap(),
    );
    let b = job_id(
        &scheduler
            .submit(local_edit(&config, "b.mp4"), Priority::Normal)
            .unwrap(),
    );

    loop {
        let status_a = scheduler.view(&a).unwrap().status;
        let status_b = scheduler.view(&b).unwrap().status;
        assert!(
            !(status_a == JobStatus::Running && status_b == JobStatus::Running),
            "two jobs running with one slot"
        );
        if status_a.is_terminal() && status_b.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn timeout_kills_the_attempt() {
    let tmp = TempDir::new().unwrap();
    let encoder = stub_encoder(tmp.path(), &success_body("sleep 5"));
    let config = SchedulerConfig {
        attempt_timeout: Duration::from_millis(300),
        ..test_config(tmp.path(), encoder)
    };
    let scheduler = Scheduler::new(config.clone(), EncoderPool::software_only(1)).unwrap();

    let receipt = scheduler
        .submit(local_edit(&config, "in.mp4"), Priority::Normal)
        .unwrap();
    let view = wait_terminal(&scheduler, &job_id(&receipt), Duration::from_secs(5)).await;

    assert_eq!(view.status, JobStatus::Error);
    assert_eq!(view.error.unwrap().code, "timeout");
}

#[tokio::test]
async fn zero_exit_without_output_is_a_failure() {
    let tmp = TempDir::new().unwrap();
    // Exits zero but never writes the output file.
    let encoder = stub_encoder(tmp.path(), "exit 0");
    let config = test_config(tmp.path(), encoder);
    let scheduler = Scheduler::new(config.clone(), EncoderPool::software_only(1)).unwrap();

    let receipt = scheduler
        .submit(local_edit(&config, "in.mp4"), Priority::Normal)
        .unwrap();
    let view = wait_terminal(&scheduler, &job_id(&receipt), Duration::from_secs(5)).await;

    assert_eq!(view.status, JobStatus::Error);
    assert_eq!(view.error.unwrap().code, "process_failed");
}

#[tokio::test]
async fn submission_without_source_is_rejected_without_a_record() {
    let tmp = TempDir::new().unwrap();
    let encoder = stub_encoder(tmp.path(), &success_body(""));
    let config = test_config(tmp.path(), encoder);
    let scheduler = Scheduler::new(config, EncoderPool::software_only(1)).unwrap();

    let err = scheduler
        .submit(JobKind::SimpleEdit(EditSpec::default()), Priority::Normal)
        .unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));
    assert_eq!(scheduler.pending_len(), 0);
}

#[tokio::test]
async fn paths_outside_allowed_roots_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let encoder = stub_encoder(tmp.path(), &success_body(""));
    let config = test_config(tmp.path(), encoder);
    let scheduler = Scheduler::new(config, EncoderPool::software_only(1)).unwrap();

    let err = scheduler
        .submit(
            JobKind::SimpleEdit(EditSpec {
                source_path: Some("/etc/passwd".into()),
                ..Default::default()
            }),
            Priority::Normal,
        )
        .unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));
}

#[tokio::test]
async fn unknown_job_id_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let encoder = stub_encoder(tmp.path(), &success_body(""));
    let config = test_config(tmp.path(), encoder);
    let scheduler = Scheduler::new(config, EncoderPool::software_only(1)).unwrap();

    let err = scheduler.view(&JobId::new()).unwrap_err();
    assert!(matches!(err, QueueError::NotFound(_)));
}

//! End-to-end runs of the job pipeline against a scripted session.

mod common;

use chrono::Duration;

use common::{artifact_bytes, Script, ScriptedDriver, TestHarness};
use common::{MemoryStorage, RecordingNotifier};
use linkcast::jobs::{JobStatus, MediaKind};
use linkcast::JobOutcome;

#[tokio::test(start_paused = true)]
async fn test_happy_path_produces_both_artifacts() {
    let h = TestHarness::new();
    let job = h.claimed("https://example.com/article");
    let id = job.id;
    let (mut driver, log) = ScriptedDriver::happy();

    let outcome = h.pipeline().run(job, &mut driver).await;

    let JobOutcome::Completed { artifacts } = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert_eq!(artifacts.len(), 2);

    let job = h.job(id);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert!(job.error_message.is_none());
    let started = job.started_at.expect("started_at");
    let completed = job.completed_at.expect("completed_at");
    assert!(started <= completed);

    let stored = h.store.get_artifacts(id).unwrap();
    assert_eq!(stored.len(), 2);
    for kind in MediaKind::ALL {
        let artifact = stored.iter().find(|a| a.kind == kind).expect("artifact per kind");
        assert_eq!(artifact.filename, kind.filename_for(id));
        assert_eq!(artifact.byte_size, artifact_bytes(kind).len() as u64);
        assert_eq!(artifact.expires_at - artifact.created_at, Duration::days(7));
        assert_eq!(h.storage.object(&artifact.storage_key), Some(artifact_bytes(kind)));
        assert!(artifact.public_url.starts_with("https://cdn.test/media/"));
    }

    let log = log.lock().unwrap();
    assert_eq!(log.opens, 1);
    assert_eq!(log.closes, 1);
    assert!(!log.open);
    assert_eq!(
        log.calls,
        vec![
            "open",
            "createWorkspace",
            "attachSource:https://example.com/article",
            "startGeneration:audio",
            "startGeneration:video",
            "awaitGeneration:audio",
            "awaitGeneration:video",
            "fetchArtifact:audio",
            "fetchArtifact:video",
            "close",
        ]
    );

    assert_eq!(h.notifier.completions.lock().unwrap().as_slice(), &[(id, 2)]);
    assert!(h.notifier.failed_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_progress_events_only_move_forward() {
    let h = TestHarness::new();
    let job = h.claimed("https://example.com/progress");
    let mut events = h.store.subscribe().expect("broadcaster attached");
    let (mut driver, _log) = ScriptedDriver::happy();

    assert!(h.pipeline().run(job, &mut driver).await.is_success());

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.len() >= 9, "got {} events", seen.len());
    assert!(seen.windows(2).all(|w| w[0].progress <= w[1].progress));

    let (last, rest) = seen.split_last().unwrap();
    assert!(rest.iter().all(|e| e.status == JobStatus::Processing));
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.progress, 100);
}

#[tokio::test(start_paused = true)]
async fn test_transient_attach_failures_are_retried() {
    let h = TestHarness::new();
    let job = h.claimed("https://example.com/flaky");
    let (mut driver, log) = ScriptedDriver::new(Script {
        attach_failures: 2,
        ..Script::default()
    });

    let outcome = h.pipeline().run(job, &mut driver).await;

    assert!(outcome.is_success());
    assert_eq!(log.lock().unwrap().count("attachSource"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_attach_source_exhausts_retries() {
    let h = TestHarness::new();
    let job = h.claimed("https://example.com/broken");
    let id = job.id;
    let (mut driver, log) = ScriptedDriver::new(Script {
        attach_failures: u32::MAX,
        ..Script::default()
    });

    let outcome = h.pipeline().run(job, &mut driver).await;

    let JobOutcome::Failed { error } = outcome else {
        panic!("expected failure");
    };
    assert!(error.contains("attachSource"), "error was: {}", error);

    let job = h.job(id);
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.as_deref().unwrap_or("").contains("attachSource"));
    assert!(job.completed_at.is_some());
    assert!(h.store.get_artifacts(id).unwrap().is_empty());

    let log = log.lock().unwrap();
    assert_eq!(log.count("attachSource"), 3);
    assert_eq!(log.count("startGeneration"), 0);
    assert_eq!(log.closes, 1);

    assert_eq!(h.notifier.failed_ids(), vec![id]);
    assert!(h.notifier.completed_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_generation_is_retried_once() {
    let h = TestHarness::new();
    let job = h.claimed("https://example.com/busy");
    let (mut driver, log) = ScriptedDriver::new(Script {
        start_failures: u32::MAX,
        ..Script::default()
    });

    let outcome = h.pipeline().run(job, &mut driver).await;

    assert!(!outcome.is_success());
    let log = log.lock().unwrap();
    assert_eq!(log.count("startGeneration:audio"), 2);
    assert_eq!(log.count("startGeneration:video"), 0);
    assert_eq!(log.closes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_generation_timeout_is_not_retried() {
    let h = TestHarness::new();
    let job = h.claimed("https://example.com/slow");
    let id = job.id;
    let (mut driver, log) = ScriptedDriver::new(Script {
        timeout_on: Some(MediaKind::Video),
        ..Script::default()
    });

    let outcome = h.pipeline().run(job, &mut driver).await;

    assert!(!outcome.is_success());
    let job = h.job(id);
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap().contains("video generation did not finish"));

    let log = log.lock().unwrap();
    assert_eq!(log.count("awaitGeneration:video"), 1);
    assert_eq!(log.count("fetchArtifact"), 0);
    assert_eq!(log.closes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_artifact_fails_without_partial_results() {
    let h = TestHarness::new();
    let job = h.claimed("https://example.com/missing");
    let id = job.id;
    let (mut driver, _log) = ScriptedDriver::new(Script {
        missing_artifact: Some(MediaKind::Video),
        ..Script::default()
    });

    let outcome = h.pipeline().run(job, &mut driver).await;

    assert!(!outcome.is_success());
    assert_eq!(h.job(id).status, JobStatus::Failed);
    assert!(h.store.get_artifacts(id).unwrap().is_empty());
    assert_eq!(h.storage.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_upload_failure_marks_job_failed() {
    let h = TestHarness::with_parts(MemoryStorage::failing(), RecordingNotifier::default());
    let job = h.claimed("https://example.com/upload");
    let id = job.id;
    let (mut driver, log) = ScriptedDriver::happy();

    let outcome = h.pipeline().run(job, &mut driver).await;

    assert!(!outcome.is_success());
    let job = h.job(id);
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap().contains("Upload failed"));
    assert!(h.store.get_artifacts(id).unwrap().is_empty());
    assert_eq!(log.lock().unwrap().closes, 1);
    assert_eq!(h.notifier.failed_ids(), vec![id]);
}

#[tokio::test(start_paused = true)]
async fn test_session_open_failure_still_closes() {
    let h = TestHarness::new();
    let job = h.claimed("https://example.com/locked");
    let id = job.id;
    let (mut driver, log) = ScriptedDriver::new(Script {
        fail_open: true,
        ..Script::default()
    });

    let outcome = h.pipeline().run(job, &mut driver).await;

    assert!(!outcome.is_success());
    assert_eq!(h.job(id).status, JobStatus::Failed);
    let log = log.lock().unwrap();
    assert_eq!(log.count("open"), 1);
    assert_eq!(log.count("createWorkspace"), 0);
    assert_eq!(log.closes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_driver_fails_job_and_closes_session() {
    let h = TestHarness::new();
    let job = h.claimed("https://example.com/panic");
    let id = job.id;
    let (mut driver, log) = ScriptedDriver::new(Script {
        panic_on_fetch: true,
        ..Script::default()
    });

    let outcome = h.pipeline().run(job, &mut driver).await;

    let JobOutcome::Failed { error } = outcome else {
        panic!("expected failure");
    };
    assert!(error.contains("driver exploded"), "error was: {}", error);
    assert_eq!(h.job(id).status, JobStatus::Failed);
    assert_eq!(log.lock().unwrap().closes, 1);
    assert_eq!(h.notifier.failed_ids(), vec![id]);
}

#[tokio::test(start_paused = true)]
async fn test_notification_failure_keeps_job_completed() {
    let h = TestHarness::with_parts(MemoryStorage::default(), RecordingNotifier::broken());
    let job = h.claimed("https://example.com/quiet");
    let id = job.id;
    let (mut driver, _log) = ScriptedDriver::happy();

    let outcome = h.pipeline().run(job, &mut driver).await;

    assert!(outcome.is_success());
    assert_eq!(h.job(id).status, JobStatus::Completed);
    assert_eq!(h.notifier.completed_ids(), vec![id]);
}

#[tokio::test(start_paused = true)]
async fn test_panic_while_closing_keeps_completed_outcome() {
    let h = TestHarness::new();
    let job = h.claimed("https://example.com/fragile-close");
    let id = job.id;
    let (mut driver, log) = ScriptedDriver::new(Script {
        panic_on_close: true,
        ..Script::default()
    });

    let outcome = h.pipeline().run(job, &mut driver).await;

    assert!(outcome.is_success());
    assert_eq!(h.job(id).status, JobStatus::Completed);
    assert_eq!(log.lock().unwrap().closes, 1);
    assert_eq!(h.notifier.completed_ids(), vec![id]);
}

#[tokio::test(start_paused = true)]
async fn test_panic_while_closing_after_failure_still_fails_job() {
    let h = TestHarness::new();
    let job = h.claimed("https://example.com/double-trouble");
    let id = job.id;
    let (mut driver, _log) = ScriptedDriver::new(Script {
        attach_failures: u32::MAX,
        panic_on_close: true,
        ..Script::default()
    });

    let outcome = h.pipeline().run(job, &mut driver).await;

    assert!(!outcome.is_success());
    assert_eq!(h.job(id).status, JobStatus::Failed);
    assert_eq!(h.notifier.failed_ids(), vec![id]);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_notifier_does_not_escape() {
    let h = TestHarness::with_parts(MemoryStorage::default(), RecordingNotifier::panicking());
    let ok = h.claimed("https://example.com/loud");
    let ok_id = ok.id;
    let (mut driver, _log) = ScriptedDriver::happy();
    assert!(h.pipeline().run(ok, &mut driver).await.is_success());

    let bad = h.claimed("https://example.com/loud-failure");
    let bad_id = bad.id;
    let (mut driver, _log) = ScriptedDriver::new(Script {
        fail_open: true,
        ..Script::default()
    });
    assert!(!h.pipeline().run(bad, &mut driver).await.is_success());

    assert_eq!(h.job(ok_id).status, JobStatus::Completed);
    assert_eq!(h.job(bad_id).status, JobStatus::Failed);
    assert_eq!(h.notifier.completed_ids(), vec![ok_id]);
    assert_eq!(h.notifier.failed_ids(), vec![bad_id]);
}

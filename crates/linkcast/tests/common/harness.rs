//! Test harness for isolated pipeline runs.
//!
//! The `TestHarness` wires an in-memory database, a job store with a
//! progress broadcaster, memory-backed storage and a recording notifier
//! into a [`Pipeline`] or [`Dispatcher`]. Retry backoff and the indexing
//! pause are real durations, so tests that run jobs should use
//! `#[tokio::test(start_paused = true)]`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use linkcast::automation::RetryConfig;
use linkcast::config::DispatcherConfig;
use linkcast::jobs::{JobProgressBroadcaster, ARTIFACT_TTL_DAYS};
use linkcast::{Database, Dispatcher, Job, JobId, JobStore, OriginRef, Pipeline, PipelineConfig};

use super::fakes::{MemoryStorage, RecordingNotifier, ScriptedDriver};

pub struct TestHarness {
    pub store: JobStore,
    pub storage: Arc<MemoryStorage>,
    pub notifier: Arc<RecordingNotifier>,
    pub config: PipelineConfig,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_parts(MemoryStorage::default(), RecordingNotifier::default())
    }

    pub fn with_parts(storage: MemoryStorage, notifier: RecordingNotifier) -> Self {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let store = JobStore::new(db).with_broadcaster(JobProgressBroadcaster::new(256));
        Self {
            store,
            storage: Arc::new(storage),
            notifier: Arc::new(notifier),
            config: PipelineConfig {
                indexing_delay: Duration::from_secs(10),
                link_ttl: Duration::from_secs(ARTIFACT_TTL_DAYS as u64 * 24 * 60 * 60),
                retry: RetryConfig::default(),
            },
        }
    }

    pub fn origin() -> OriginRef {
        OriginRef {
            channel: "C0TEST".into(),
            thread: "1700000000.000100".into(),
            user: "U0TEST".into(),
            workspace: Some("T0TEST".into()),
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.store.clone(),
            self.storage.clone(),
            self.notifier.clone(),
            self.config.clone(),
        )
    }

    pub fn dispatcher(&self, driver: ScriptedDriver) -> Dispatcher {
        Dispatcher::new(
            self.store.clone(),
            self.pipeline(),
            Box::new(driver),
            DispatcherConfig {
                idle_interval_secs: 5,
                between_jobs_secs: 1,
            },
        )
    }

    pub fn enqueue(&self, url: &str) -> JobId {
        self.store
            .enqueue(url, &Self::origin())
            .expect("Failed to enqueue job")
    }

    /// Enqueues `url` and claims it, ready to hand to [`Pipeline::run`].
    pub fn claimed(&self, url: &str) -> Job {
        let id = self.enqueue(url);
        let job = self
            .store
            .claim_next()
            .expect("Failed to claim job")
            .expect("Queue was empty");
        assert_eq!(job.id, id);
        job
    }

    pub fn job(&self, id: JobId) -> Job {
        self.store
            .get_job(id)
            .expect("Failed to load job")
            .expect("Job missing")
    }
}

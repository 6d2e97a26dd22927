use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::automation::SessionDriver;
use crate::config::DispatcherConfig;
use crate::jobs::{JobStatus, JobStore, JobStoreError, QueueStats, StatusUpdate};
use crate::pipeline::runner::panic_message;
use crate::pipeline::{JobOutcome, Pipeline};

/// Pulls pending jobs one at a time and runs them to completion.
///
/// The dispatcher owns the only automation session, so at most one job is
/// ever in flight.
pub struct Dispatcher {
    store: JobStore,
    pipeline: Pipeline,
    session: Box<dyn SessionDriver>,
    config: DispatcherConfig,
    running: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(
        store: JobStore,
        pipeline: Pipeline,
        session: Box<dyn SessionDriver>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            pipeline,
            session,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Shared flag that mirrors [`Dispatcher::is_running`].
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stats(&self) -> Result<QueueStats, JobStoreError> {
        self.store.stats()
    }

    /// Claims and runs the oldest pending job, if any.
    ///
    /// Returns `None` when the queue was empty. A panic that escapes the
    /// pipeline fails the job instead of unwinding into the caller.
    pub async fn run_once(&mut self) -> Result<Option<JobOutcome>, JobStoreError> {
        let Some(job) = self.store.claim_next()? else {
            return Ok(None);
        };

        let job_id = job.id;
        info!(job_id, "Dispatching job");
        let run = self.pipeline.run(job, self.session.as_mut());
        let outcome = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let error = format!("Job execution panicked: {}", panic_message(payload));
                error!(job_id, error = %error, "Job execution panicked");
                if let Err(e) = self.store.update_status(
                    job_id,
                    JobStatus::Failed,
                    StatusUpdate::failure(error.clone()),
                ) {
                    error!(job_id, error = %e, "Failed to mark job as failed");
                }
                JobOutcome::Failed { error }
            }
        };
        Ok(Some(outcome))
    }

    /// Loops until `shutdown` turns true. A job that is already running is
    /// finished before the loop exits.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        self.running.store(true, Ordering::Relaxed);
        self.report_stranded_jobs();
        info!("Dispatcher started");

        while !*shutdown.borrow() {
            let pause = match self.run_once().await {
                Ok(Some(outcome)) => {
                    debug!(success = outcome.is_success(), "Job finished");
                    self.config.between_jobs()
                }
                Ok(None) => self.config.idle_interval(),
                Err(e) => {
                    error!(error = %e, "Failed to claim next job");
                    self.config.idle_interval()
                }
            };

            if wait_or_shutdown(&mut shutdown, pause).await {
                break;
            }
        }

        self.running.store(false, Ordering::Relaxed);
        info!("Dispatcher stopped");
    }

    /// Jobs left in `processing` by a previous run cannot be resumed because
    /// their browser state is gone.
    fn report_stranded_jobs(&self) {
        match self.store.in_flight() {
            Ok(jobs) => {
                for job in jobs {
                    warn!(
                        job_id = job.id,
                        step = job.current_step.as_deref().unwrap_or(""),
                        "Job was interrupted while processing and needs manual recovery"
                    );
                }
            }
            Err(e) => error!(error = %e, "Failed to list interrupted jobs"),
        }
    }
}

/// Sleeps for `pause`; returns true if shutdown was requested meanwhile.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, pause: Duration) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(pause) => false,
        changed = shutdown.changed() => match changed {
            Ok(()) => *shutdown.borrow(),
            // Sender dropped: nobody can ask us to stop anymore.
            Err(_) => {
                tokio::time::sleep(pause).await;
                false
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_after_pause() {
        let (_tx, mut rx) = watch::channel(false);
        let start = tokio::time::Instant::now();
        assert!(!wait_or_shutdown(&mut rx, Duration::from_secs(5)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_interrupted_by_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let start = tokio::time::Instant::now();
        let waiter =
            tokio::spawn(async move { wait_or_shutdown(&mut rx, Duration::from_secs(60)).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();

        assert!(waiter.await.unwrap());
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_wait_skips_when_already_shut_down() {
        let (_tx, mut rx) = watch::channel(true);
        assert!(wait_or_shutdown(&mut rx, Duration::from_secs(3600)).await);
    }
}

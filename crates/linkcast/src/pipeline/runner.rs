use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::automation::{OperationCost, RetrySupervisor, SessionDriver};
use crate::chat::ChatError;
use crate::jobs::{Artifact, Job, JobStatus, JobStore, MediaKind, NewArtifact, StatusUpdate};
use crate::sanitize;
use crate::storage::ObjectStorage;

use super::config::PipelineConfig;
use super::context::{PipelineContext, WorkflowState};
use super::error::PipelineError;
use super::notifier::JobNotifier;
use super::progress::JobPhase;

/// How a job run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { artifacts: Vec<Artifact> },
    Failed { error: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}

/// Runs the fixed stage sequence for one job against a borrowed session.
pub struct Pipeline {
    store: JobStore,
    storage: Arc<dyn ObjectStorage>,
    notifier: Arc<dyn JobNotifier>,
    retry: RetrySupervisor,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: JobStore,
        storage: Arc<dyn ObjectStorage>,
        notifier: Arc<dyn JobNotifier>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            storage,
            notifier,
            retry: RetrySupervisor::new(config.retry.clone()),
            config,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Run the whole workflow for `job`.
    ///
    /// The session is closed on every exit path, including panics inside a
    /// stage. Failures are recorded on the job and reported to the notifier;
    /// they never propagate to the caller. A panic during teardown or
    /// notification is logged and does not change the recorded outcome.
    pub async fn run(&self, job: Job, session: &mut dyn SessionDriver) -> JobOutcome {
        let span = info_span!("pipeline",
            job_id = job.id,
            url = %sanitize::redact_url(&job.url),
        );

        async move {
            let mut ctx = PipelineContext::new(job);

            let result = AssertUnwindSafe(self.execute(&mut ctx, &mut *session))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(PipelineError::Panicked(panic_message(payload))));

            match AssertUnwindSafe(session.close_session()).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Failed to close automation session"),
                Err(payload) => error!(
                    panic = %panic_message(payload),
                    "Automation session panicked while closing"
                ),
            }

            match result {
                Ok(job) => {
                    info!(artifacts = ctx.artifacts.len(), "Job completed");
                    let notify = self.notifier.notify_completion(&job, &ctx.artifacts);
                    let notified = AssertUnwindSafe(notify).catch_unwind().await;
                    log_notification("completion", notified);
                    JobOutcome::Completed {
                        artifacts: ctx.artifacts,
                    }
                }
                Err(e) => self.fail(&mut ctx, e).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn fail(&self, ctx: &mut PipelineContext, err: PipelineError) -> JobOutcome {
        let message = err.to_string();
        error!(state = %ctx.state(), error = %message, "Job failed");

        if !ctx.state().is_terminal() {
            // Init..Uploaded can always move to Failed.
            let _ = ctx.advance(WorkflowState::Failed);
        }

        let job = match self.store.update_status(
            ctx.job.id,
            JobStatus::Failed,
            StatusUpdate::failure(message.clone()),
        ) {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Failed to mark job as failed");
                ctx.job.clone()
            }
        };

        let notified = AssertUnwindSafe(self.notifier.notify_failure(&job))
            .catch_unwind()
            .await;
        log_notification("failure", notified);

        JobOutcome::Failed { error: message }
    }

    async fn execute(
        &self,
        ctx: &mut PipelineContext,
        session: &mut dyn SessionDriver,
    ) -> Result<Job, PipelineError> {
        // Step 1: Open session
        {
            self.report(ctx, JobStatus::Processing, JobPhase::OpeningSession)?;
            session
                .open_session()
                .instrument(info_span!("open_session"))
                .await?;
        }

        // Step 2: Create workspace
        {
            self.report(ctx, JobStatus::Processing, JobPhase::CreatingWorkspace)?;
            self.retry
                .run(session, "createWorkspace", OperationCost::Cheap, |s| {
                    s.create_workspace()
                })
                .instrument(info_span!("create_workspace"))
                .await?;
            ctx.advance(WorkflowState::WorkspaceCreated)?;
        }

        // Step 3: Attach source, then give the service time to index it
        {
            self.report(ctx, JobStatus::Processing, JobPhase::AttachingSource)?;
            let url = ctx.job.url.clone();
            self.retry
                .run(session, "attachSource", OperationCost::Cheap, |s| {
                    s.attach_source(url.clone())
                })
                .instrument(info_span!("attach_source"))
                .await?;
            ctx.advance(WorkflowState::SourceAttached)?;

            debug!(
                delay_ms = self.config.indexing_delay.as_millis() as u64,
                "Waiting for source indexing"
            );
            tokio::time::sleep(self.config.indexing_delay).await;
        }

        // Step 4: Start both generations back to back, then wait for each
        {
            self.report(ctx, JobStatus::Processing, JobPhase::Generating)?;
            let span = info_span!("generate");
            async {
                for kind in MediaKind::ALL {
                    self.retry
                        .run(session, "startGeneration", OperationCost::Expensive, |s| {
                            s.start_generation(kind)
                        })
                        .await?;
                    info!(kind = %kind, "Generation started");
                }
                ctx.advance(WorkflowState::GeneratingBoth)?;

                for kind in MediaKind::ALL {
                    session.await_generation(kind).await?;
                    info!(kind = %kind, "Generation finished");
                }
                Ok::<(), PipelineError>(())
            }
            .instrument(span)
            .await?;
        }

        // Step 5: Download both artifacts
        for kind in MediaKind::ALL {
            self.report(ctx, JobStatus::Processing, JobPhase::Downloading(kind))?;
            let fetched = self
                .retry
                .run(session, "fetchArtifact", OperationCost::Cheap, |s| {
                    s.fetch_artifact(kind)
                })
                .instrument(info_span!("fetch_artifact", kind = %kind))
                .await?;
            debug!(kind = %kind, bytes = fetched.bytes.len(), "Artifact downloaded");
            ctx.fetched.push((kind, fetched));
        }
        ctx.advance(WorkflowState::ArtifactsReady)?;

        // Step 6: Upload and record
        let fetched = std::mem::take(&mut ctx.fetched);
        for (kind, artifact) in fetched {
            self.report(ctx, JobStatus::Processing, JobPhase::Uploading(kind))?;
            let recorded = self
                .upload_artifact(ctx.job.id, kind, artifact.bytes)
                .instrument(info_span!("upload_artifact", kind = %kind))
                .await?;
            ctx.artifacts.push(recorded);
        }
        ctx.advance(WorkflowState::Uploaded)?;

        // Step 7: Mark completed
        let job = self.report(ctx, JobStatus::Completed, JobPhase::Completed)?;
        ctx.advance(WorkflowState::Done)?;
        Ok(job)
    }

    async fn upload_artifact(
        &self,
        job_id: i64,
        kind: MediaKind,
        bytes: Vec<u8>,
    ) -> Result<Artifact, PipelineError> {
        let filename = kind.filename_for(job_id);
        let byte_size = bytes.len() as u64;

        let storage_key = self
            .storage
            .upload(bytes, &filename, kind.content_type())
            .await?;
        let public_url = self
            .storage
            .public_reference(&storage_key, self.config.link_ttl)
            .await?;

        let artifact = self.store.record_artifact(
            job_id,
            NewArtifact {
                kind,
                filename,
                storage_key,
                public_url,
                byte_size,
            },
        )?;
        Ok(artifact)
    }

    fn report(
        &self,
        ctx: &mut PipelineContext,
        status: JobStatus,
        phase: JobPhase,
    ) -> Result<Job, PipelineError> {
        let job = self.store.update_status(
            ctx.job.id,
            status,
            StatusUpdate::step(phase.progress(), phase.to_string()),
        )?;
        ctx.job = job.clone();
        Ok(job)
    }
}

fn log_notification(
    kind: &'static str,
    notified: Result<Result<(), ChatError>, Box<dyn Any + Send>>,
) {
    match notified {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(kind, error = %e, "Failed to send job notification"),
        Err(payload) => error!(kind, panic = %panic_message(payload), "Job notifier panicked"),
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

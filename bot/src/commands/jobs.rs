//! Manual job submission and queue inspection.

use linkcast::chat::extract_and_validate_url;
use linkcast::jobs::{Artifact, Job, JobId, JobStoreError, OriginRef};
use linkcast::LinkcastError;
use serde::Serialize;

use super::print_json;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job: Job,
    pub artifacts: Vec<Artifact>,
}

pub fn enqueue(
    state: &AppState,
    url: &str,
    channel: String,
    thread: String,
    user: String,
    team: Option<String>,
    json: bool,
) -> Result<(), LinkcastError> {
    let url = extract_and_validate_url(url)
        .ok_or_else(|| JobStoreError::InvalidInput(format!("not an http(s) URL: {}", url)))?;

    let origin = OriginRef {
        channel,
        thread,
        user,
        workspace: team,
    };
    let job_id = state.store.enqueue(&url, &origin)?;

    if json {
        print_json(serde_json::json!({ "jobId": job_id }))
    } else {
        println!("Queued job {}", job_id);
        Ok(())
    }
}

pub fn status(state: &AppState, job_id: JobId, json: bool) -> Result<(), LinkcastError> {
    let job = state
        .store
        .get_job(job_id)?
        .ok_or(JobStoreError::NotFound(job_id))?;
    let artifacts = state.store.get_artifacts(job_id)?;

    if json {
        return print_json(JobStatusResponse { job, artifacts });
    }

    println!("Job {}: {} ({}%)", job.id, job.status, job.progress);
    println!("  URL:     {}", job.url);
    if let Some(ref step) = job.current_step {
        println!("  Step:    {}", step);
    }
    if let Some(ref error) = job.error_message {
        println!("  Error:   {}", error);
    }
    println!("  Created: {}", job.created_at.to_rfc3339());
    if let Some(started) = job.started_at {
        println!("  Started: {}", started.to_rfc3339());
    }
    if let Some(completed) = job.completed_at {
        println!("  Done:    {}", completed.to_rfc3339());
    }
    for artifact in &artifacts {
        println!(
            "  {}: {} ({} MB, expires {})",
            artifact.kind,
            artifact.public_url,
            artifact.size_mb(),
            artifact.expires_at.to_rfc3339()
        );
    }
    Ok(())
}

pub fn stats(state: &AppState, json: bool) -> Result<(), LinkcastError> {
    let stats = state.store.stats()?;
    if json {
        return print_json(stats);
    }

    println!("pending:    {}", stats.pending);
    println!("processing: {}", stats.processing);
    println!("completed:  {}", stats.completed);
    println!("failed:     {}", stats.failed);
    println!("total:      {}", stats.total());
    Ok(())
}

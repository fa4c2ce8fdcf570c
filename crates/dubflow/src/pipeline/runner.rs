//! Pipeline orchestrator.
//!
//! `Orchestrator::execute` drives one job end to end: stage the source,
//! materialize the step plan, run each stage in order, publish artifacts and
//! record the outcome. Execution is crash-safe by construction: every state
//! change is persisted before and after each step, and `resume` can pick a
//! job up from whatever the store last recorded.

use std::sync::Arc;

use serde_json::json;
use tracing::Instrument;

use super::error::PipelineError;
use super::handler::{StepContext, StepError};
use super::registry::StepRegistry;
use crate::notify::Notifier;
use crate::store::{Job, JobError, JobStatus, JobStore, StepStatus, StepUpdate};
use crate::workspace::{Workspace, WorkspaceError, WorkspaceManager};
use crate::storage::StorageError;

pub struct Orchestrator {
    store: JobStore,
    registry: Arc<StepRegistry>,
    workspaces: WorkspaceManager,
    notifier: Arc<dyn Notifier>,
}

impl Orchestrator {
    pub fn new(
        store: JobStore,
        registry: Arc<StepRegistry>,
        workspaces: WorkspaceManager,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            registry,
            workspaces,
            notifier,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Runs a job to completion.
    ///
    /// Safe to call for redelivered messages: a missing or already terminal
    /// job returns `Ok` without doing any work. A transient error returns
    /// `Err` with the job left in `processing` so a later attempt can
    /// continue; a step failure marks the job failed before returning.
    pub async fn execute(&self, job_id: &str) -> Result<(), PipelineError> {
        let span = tracing::info_span!("pipeline", job_id = %job_id);
        self.execute_inner(job_id).instrument(span).await
    }

    async fn execute_inner(&self, job_id: &str) -> Result<(), PipelineError> {
        let job = match self.store.find_job(job_id)? {
            Some(job) => job,
            None => {
                log::warn!("Ignoring execution request for unknown job {}", job_id);
                return Ok(());
            }
        };
        if job.status.is_terminal() {
            log::info!(
                "Job {} already {}, ignoring execution request",
                job_id,
                job.status
            );
            return Ok(());
        }

        let job = self.store.transition(job_id, JobStatus::Processing)?;

        let source_ref = match job.config.source_ref() {
            Some(s) => s.to_string(),
            None => {
                self.fail_permanent(job_id, "INVALID_CONFIG", "missing source_ref in job config")
                    .await?;
                return Ok(());
            }
        };

        let workspace = self.workspaces.acquire(job_id).await?;
        let outcome = self.run_job(job_id, &workspace, &source_ref).await;

        // Cleanup runs on every exit path; workspaces are a cache, a
        // resumed job re-stages whatever it needs.
        if let Err(e) = self.workspaces.release(&workspace).await {
            log::warn!("Failed to release workspace for job {}: {}", job_id, e);
        }
        outcome
    }

    async fn run_job(
        &self,
        job_id: &str,
        workspace: &Workspace,
        source_ref: &str,
    ) -> Result<(), PipelineError> {
        let source_path = match self.workspaces.stage_input(workspace, source_ref).await {
            Ok(path) => path,
            Err(WorkspaceError::Storage(StorageError::NotFound(key))) => {
                self.fail_permanent(
                    job_id,
                    "SOURCE_NOT_FOUND",
                    &format!("source object missing: {}", key),
                )
                .await?;
                return Ok(());
            }
            // Transient: leave the job in processing for a later attempt.
            Err(e) => return Err(e.into()),
        };

        self.store.create_steps(job_id, &self.registry.seeds())?;

        self.run_steps(job_id, workspace, &source_path).await?;

        // A cancel observed mid-run exits the step loop with the job
        // already terminal.
        let job = self.store.get_job(job_id)?;
        if job.status == JobStatus::Cancelled {
            return Ok(());
        }

        let artifacts = match self.workspaces.publish_outputs(workspace).await {
            Ok(artifacts) => artifacts,
            Err(WorkspaceError::MissingArtifact(path)) => {
                let message = format!("expected artifact missing: {}", path.display());
                self.fail_permanent(job_id, "MISSING_ARTIFACT", &message).await?;
                return Err(PipelineError::StepFailed {
                    step: "finalize_video".to_string(),
                    code: "MISSING_ARTIFACT".to_string(),
                    message,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let result = json!({
            "dubbed_video_url": artifacts.dubbed_video_key,
            "subtitles_url": artifacts.subtitles_key,
            "completed_at": chrono::Utc::now().to_rfc3339(),
        });
        let job = self.store.complete_job(job_id, result)?;

        if let Err(e) = self.notifier.job_completed(&job).await {
            log::warn!("Completion notification for job {} failed: {}", job_id, e);
        }
        Ok(())
    }

    /// Runs the job's frozen step plan in recorded order.
    ///
    /// The plan was snapshotted into the step rows at creation; the live
    /// registry only supplies handlers by name. A recorded step the
    /// registry no longer knows fails the job permanently rather than
    /// being skipped.
    async fn run_steps(
        &self,
        job_id: &str,
        workspace: &Workspace,
        source_path: &std::path::Path,
    ) -> Result<(), PipelineError> {
        let plan = self.store.get_steps(job_id)?;
        for planned in &plan {
            let step_name = planned.step_name.as_str();

            // Cancellation is observed between steps only.
            let job = self.store.get_job(job_id)?;
            if job.status == JobStatus::Cancelled {
                log::info!("Job {} cancelled, stopping before step {}", job_id, step_name);
                return Ok(());
            }

            if planned.status.is_terminal() && planned.status != StepStatus::Failed {
                log::debug!("Skipping already {} step {}", planned.status, step_name);
                continue;
            }

            let handler = match self.registry.handler(step_name) {
                Some(handler) => handler,
                None => {
                    self.fail_permanent(
                        job_id,
                        "UNKNOWN_STEP",
                        &format!("no handler registered for step {}", step_name),
                    )
                    .await?;
                    return Err(PipelineError::UnknownStep(step_name.to_string()));
                }
            };

            self.store.update_step_status(
                job_id,
                step_name,
                StepUpdate::status(StepStatus::Processing),
            )?;

            let ctx = StepContext {
                job: job.clone(),
                workspace: workspace.clone(),
                source_path: source_path.to_path_buf(),
            };
            let span = tracing::info_span!("step", name = step_name);
            match handler.run(&ctx).instrument(span).await {
                Ok(output) => {
                    self.store.update_step_status(
                        job_id,
                        step_name,
                        StepUpdate::completed(output.data),
                    )?;
                    log::info!("Job {} completed step {}", job_id, step_name);
                }
                Err(step_error) => {
                    return self.handle_step_failure(job_id, step_name, step_error).await;
                }
            }
        }
        Ok(())
    }

    async fn handle_step_failure(
        &self,
        job_id: &str,
        step_name: &str,
        step_error: StepError,
    ) -> Result<(), PipelineError> {
        let error = JobError::new(&step_error.code, &step_error.message);
        self.store
            .update_step_status(job_id, step_name, StepUpdate::failed(error.clone()))?;
        let job = self.store.fail_job(job_id, &error)?;

        if let Err(e) = self.notifier.job_failed(&job, &error).await {
            log::warn!("Failure notification for job {} failed: {}", job_id, e);
        }

        Err(PipelineError::StepFailed {
            step: step_name.to_string(),
            code: step_error.code,
            message: step_error.message,
        })
    }

    /// Resumes a job according to its recorded status.
    ///
    /// Failed jobs are reset and re-run from the first unfinished step.
    /// Jobs stuck in `processing` (a crashed worker) get their in-flight
    /// steps reset first. Pending jobs simply execute. Completed and
    /// cancelled jobs are not resumable.
    pub async fn resume(&self, job_id: &str) -> Result<(), PipelineError> {
        let job = self.store.get_job(job_id)?;
        match job.status {
            JobStatus::Completed | JobStatus::Cancelled => Err(PipelineError::NotResumable {
                job_id: job_id.to_string(),
                status: job.status,
            }),
            JobStatus::Failed => {
                self.store.reset_for_resume(job_id)?;
                self.execute(job_id).await
            }
            JobStatus::Processing => {
                let reset = self.store.reset_inflight_steps(job_id)?;
                if reset > 0 {
                    log::info!("Job {}: reset {} in-flight steps before resume", job_id, reset);
                }
                self.execute(job_id).await
            }
            JobStatus::Pending => self.execute(job_id).await,
        }
    }

    async fn fail_permanent(
        &self,
        job_id: &str,
        code: &str,
        message: &str,
    ) -> Result<Job, PipelineError> {
        let error = JobError::new(code, message);
        let job = self.store.fail_job(job_id, &error)?;
        if let Err(e) = self.notifier.job_failed(&job, &error).await {
            log::warn!("Failure notification for job {} failed: {}", job_id, e);
        }
        Ok(job)
    }
}

//! Job and step state store.
//!
//! `JobStore` is the single write path for job lifecycle state: creation,
//! status transitions, per-step bookkeeping and weighted progress. Progress
//! is derived from completed step weights and never moves backwards.
//!
//! Calls are synchronous; SQLite operations here are sub-millisecond, so the
//! async layers above call straight into the store without `spawn_blocking`.

use chrono::{Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::db::{job_repo, step_repo, Database};

pub mod error;
pub mod types;

pub use error::StoreError;
pub use types::{Job, JobConfig, JobError, JobStatus, JobStatusView, JobStep, StepStatus};

use types::{format_timestamp, parse_status};

/// Parameters for creating a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: String,
    pub video_id: Option<String>,
    pub job_type: String,
    pub config: JobConfig,
    pub max_retries: u32,
}

impl NewJob {
    pub fn dubbing(user_id: impl Into<String>, video_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            video_id: Some(video_id.into()),
            job_type: "dubbing".to_string(),
            config: JobConfig::default(),
            max_retries: 3,
        }
    }

    pub fn with_config(mut self, config: JobConfig) -> Self {
        self.config = config;
        self
    }
}

/// A named pipeline stage with its progress weight, used to materialize
/// step rows when a job's plan is frozen.
#[derive(Debug, Clone)]
pub struct StepSeed {
    pub name: String,
    pub weight: f64,
}

/// Partial update applied to a single step. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct StepUpdate {
    pub status: Option<StepStatus>,
    pub progress: Option<f64>,
    pub error: Option<JobError>,
    pub input_data: Option<Value>,
    pub output_data: Option<Value>,
}

impl StepUpdate {
    pub fn status(status: StepStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn completed(output_data: Option<Value>) -> Self {
        Self {
            status: Some(StepStatus::Completed),
            progress: Some(100.0),
            output_data,
            ..Default::default()
        }
    }

    pub fn failed(error: JobError) -> Self {
        Self {
            status: Some(StepStatus::Failed),
            error: Some(error),
            ..Default::default()
        }
    }
}

/// The job and step state store.
///
/// Cheap to clone; all clones share the underlying database handle.
#[derive(Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // ─── Creation ───────────────────────────────────────────────────────────

    /// Creates a new pending job and returns it. The config is snapshotted
    /// at this point and never modified afterwards.
    pub fn create_job(&self, new: NewJob) -> Result<Job, StoreError> {
        let now = format_timestamp(Utc::now());
        let row = job_repo::JobRow {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            video_id: new.video_id,
            job_type: new.job_type,
            status: JobStatus::Pending.as_str().to_string(),
            progress: 0.0,
            config: Some(serde_json::to_string(&new.config.to_json())?),
            result: None,
            error_code: None,
            error_message: None,
            retry_count: 0,
            max_retries: new.max_retries,
            created_at: now.clone(),
            updated_at: now,
            started_at: None,
            completed_at: None,
        };
        job_repo::insert(&self.db, &row)?;

        log::info!("Created job {} for user {}", row.id, row.user_id);
        Ok(Job::from_row(&row))
    }

    /// Materializes the step rows for a job from the given seeds, in order.
    ///
    /// Idempotent: if the job already has steps (a redelivered message or a
    /// resume), the existing rows are kept untouched and the seeds ignored,
    /// so the plan stays frozen at first materialization.
    pub fn create_steps(&self, job_id: &str, seeds: &[StepSeed]) -> Result<(), StoreError> {
        self.load_row(job_id)?;

        let job_id = job_id.to_string();
        let seeds = seeds.to_vec();
        self.db.with_tx(|conn| {
            if step_repo::exists_for_job_with_conn(conn, &job_id)? {
                return Ok(());
            }
            let now = format_timestamp(Utc::now());
            for (index, seed) in seeds.iter().enumerate() {
                step_repo::insert_with_conn(
                    conn,
                    &step_repo::StepRow {
                        job_id: job_id.clone(),
                        step_name: seed.name.clone(),
                        step_order: index as u32 + 1,
                        weight: seed.weight,
                        status: StepStatus::Pending.as_str().to_string(),
                        progress: 0.0,
                        error_code: None,
                        error_message: None,
                        input_data: None,
                        output_data: None,
                        started_at: None,
                        completed_at: None,
                        updated_at: now.clone(),
                    },
                )?;
            }
            Ok(())
        })?;
        Ok(())
    }

    // ─── Job transitions ────────────────────────────────────────────────────

    /// Transitions a job to a new status.
    ///
    /// A transition to the current status is a no-op (redeliveries and
    /// resumes hit this). Transitions out of a terminal status are rejected.
    /// Entering `Processing` stamps `started_at` on first entry; entering a
    /// terminal status stamps `completed_at`; entering `Completed` forces
    /// progress to 100.
    pub fn transition(&self, job_id: &str, to: JobStatus) -> Result<Job, StoreError> {
        self.transition_inner(job_id, to, None)
    }

    /// Like [`transition`](Self::transition), recording an error alongside
    /// the status change.
    pub fn transition_with_error(
        &self,
        job_id: &str,
        to: JobStatus,
        error: &JobError,
    ) -> Result<Job, StoreError> {
        self.transition_inner(job_id, to, Some(error))
    }

    fn transition_inner(
        &self,
        job_id: &str,
        to: JobStatus,
        error: Option<&JobError>,
    ) -> Result<Job, StoreError> {
        let mut row = self.load_row(job_id)?;
        let from = parse_status(&row.status, job_id);

        if from == to {
            return Ok(Job::from_row(&row));
        }
        if from.is_terminal() {
            return Err(StoreError::InvalidTransition {
                job_id: job_id.to_string(),
                from,
                to,
            });
        }

        let now = Utc::now();
        row.status = to.as_str().to_string();
        row.updated_at = format_timestamp(now);
        if let Some(error) = error {
            row.error_code = Some(error.code.clone());
            row.error_message = Some(error.message.clone());
        }
        if to == JobStatus::Processing && row.started_at.is_none() {
            row.started_at = Some(format_timestamp(now));
        }
        if to.is_terminal() {
            row.completed_at = Some(format_timestamp(now));
        }
        if to == JobStatus::Completed {
            row.progress = 100.0;
        }
        job_repo::update(&self.db, &row)?;

        log::info!("Job {} transitioned {} -> {}", job_id, from, to);
        Ok(Job::from_row(&row))
    }

    /// Marks a job as failed with the given error, stamping `completed_at`
    /// and bumping `retry_count` while retries remain. Failing a job that is
    /// already terminal is a no-op.
    pub fn fail_job(&self, job_id: &str, error: &JobError) -> Result<Job, StoreError> {
        let mut row = self.load_row(job_id)?;
        let from = parse_status(&row.status, job_id);
        if from.is_terminal() {
            return Ok(Job::from_row(&row));
        }

        let now = format_timestamp(Utc::now());
        row.status = JobStatus::Failed.as_str().to_string();
        row.error_code = Some(error.code.clone());
        row.error_message = Some(error.message.clone());
        if row.retry_count < row.max_retries {
            row.retry_count += 1;
        }
        row.updated_at = now.clone();
        row.completed_at = Some(now);
        job_repo::update(&self.db, &row)?;

        log::warn!("Job {} failed: [{}] {}", job_id, error.code, error.message);
        Ok(Job::from_row(&row))
    }

    /// Marks a job as completed with its result payload. Progress is forced
    /// to 100 regardless of the recorded step weights.
    pub fn complete_job(&self, job_id: &str, result: Value) -> Result<Job, StoreError> {
        let mut row = self.load_row(job_id)?;
        let from = parse_status(&row.status, job_id);
        if from.is_terminal() {
            return Err(StoreError::InvalidTransition {
                job_id: job_id.to_string(),
                from,
                to: JobStatus::Completed,
            });
        }

        let now = format_timestamp(Utc::now());
        row.status = JobStatus::Completed.as_str().to_string();
        row.progress = 100.0;
        row.result = Some(serde_json::to_string(&result)?);
        row.error_code = None;
        row.error_message = None;
        row.updated_at = now.clone();
        row.completed_at = Some(now);
        job_repo::update(&self.db, &row)?;

        log::info!("Job {} completed", job_id);
        Ok(Job::from_row(&row))
    }

    /// Requests cancellation of a job. Cancelling an already cancelled job
    /// is a no-op; cancelling a completed or failed job is rejected.
    ///
    /// The running pipeline observes the status between steps, so work in
    /// flight finishes its current step before stopping.
    pub fn cancel_job(&self, job_id: &str) -> Result<Job, StoreError> {
        let row = self.load_row(job_id)?;
        let from = parse_status(&row.status, job_id);
        if from == JobStatus::Cancelled {
            return Ok(Job::from_row(&row));
        }
        self.transition(job_id, JobStatus::Cancelled)
    }

    /// Resets a failed job so it can be re-run.
    ///
    /// Only failed jobs are eligible, and only while retries remain. Failed
    /// steps go back to pending with errors cleared; completed steps keep
    /// their state so the pipeline resumes from the first unfinished step.
    pub fn reset_for_resume(&self, job_id: &str) -> Result<Job, StoreError> {
        let row = self.load_row(job_id)?;
        let from = parse_status(&row.status, job_id);
        if from != JobStatus::Failed {
            return Err(StoreError::InvalidTransition {
                job_id: job_id.to_string(),
                from,
                to: JobStatus::Pending,
            });
        }
        if row.retry_count >= row.max_retries {
            return Err(StoreError::RetryExhausted {
                job_id: job_id.to_string(),
                retry_count: row.retry_count,
                max_retries: row.max_retries,
            });
        }

        let job_id_owned = job_id.to_string();
        let updated = self.db.with_tx(|conn| {
            let mut row = row.clone();
            let now = format_timestamp(Utc::now());

            for mut step in step_repo::find_by_job_with_conn(conn, &job_id_owned)? {
                if step.status == StepStatus::Failed.as_str()
                    || step.status == StepStatus::Processing.as_str()
                {
                    step.status = StepStatus::Pending.as_str().to_string();
                    step.progress = 0.0;
                    step.error_code = None;
                    step.error_message = None;
                    step.started_at = None;
                    step.completed_at = None;
                    step.updated_at = now.clone();
                    step_repo::update_with_conn(conn, &step)?;
                }
            }

            row.status = JobStatus::Pending.as_str().to_string();
            row.error_code = None;
            row.error_message = None;
            row.result = None;
            row.completed_at = None;
            row.updated_at = now;
            job_repo::update_with_conn(conn, &row)?;
            Ok(row)
        })?;

        log::info!(
            "Job {} reset for resume (attempt {}/{})",
            job_id,
            updated.retry_count,
            updated.max_retries
        );
        Ok(Job::from_row(&updated))
    }

    /// Resets steps stuck in `processing` back to `pending`.
    ///
    /// Used by crash recovery: a step left in `processing` after a restart
    /// never got its completion recorded, so it must run again.
    pub fn reset_inflight_steps(&self, job_id: &str) -> Result<u32, StoreError> {
        let job_id = job_id.to_string();
        let reset = self.db.with_tx(|conn| {
            let now = format_timestamp(Utc::now());
            let mut reset = 0u32;
            for mut step in step_repo::find_by_job_with_conn(conn, &job_id)? {
                if step.status == StepStatus::Processing.as_str() {
                    step.status = StepStatus::Pending.as_str().to_string();
                    step.progress = 0.0;
                    step.started_at = None;
                    step.updated_at = now.clone();
                    step_repo::update_with_conn(conn, &step)?;
                    reset += 1;
                }
            }
            Ok(reset)
        })?;
        Ok(reset)
    }

    // ─── Step updates ───────────────────────────────────────────────────────

    /// Applies a partial update to a step and recomputes the job's weighted
    /// progress in the same transaction.
    ///
    /// Progress is `100 * completed_weight / total_weight`, floored at the
    /// job's current value so redeliveries never roll it back.
    pub fn update_step_status(
        &self,
        job_id: &str,
        step_name: &str,
        update: StepUpdate,
    ) -> Result<JobStep, StoreError> {
        let job_id_owned = job_id.to_string();
        let step_name_owned = step_name.to_string();

        let result = self.db.with_tx(|conn| {
            let mut step = match step_repo::find_one_with_conn(conn, &job_id_owned, &step_name_owned)? {
                Some(step) => step,
                None => return Ok(None),
            };
            let now = Utc::now();
            let now_str = format_timestamp(now);

            if let Some(status) = update.status {
                step.status = status.as_str().to_string();
                if status == StepStatus::Processing && step.started_at.is_none() {
                    step.started_at = Some(now_str.clone());
                }
                if status.is_terminal() {
                    step.completed_at = Some(now_str.clone());
                }
                if status == StepStatus::Completed {
                    step.progress = 100.0;
                }
            }
            if let Some(progress) = update.progress {
                step.progress = progress.clamp(0.0, 100.0);
            }
            if let Some(error) = &update.error {
                step.error_code = Some(error.code.clone());
                step.error_message = Some(error.message.clone());
            }
            if let Some(input) = &update.input_data {
                step.input_data = Some(input.to_string());
            }
            if let Some(output) = &update.output_data {
                step.output_data = Some(output.to_string());
            }
            step.updated_at = now_str.clone();
            step_repo::update_with_conn(conn, &step)?;

            // Recompute the job's weighted progress from all steps.
            let steps = step_repo::find_by_job_with_conn(conn, &job_id_owned)?;
            let total_weight: f64 = steps.iter().map(|s| s.weight).sum();
            let completed_weight: f64 = steps
                .iter()
                .filter(|s| {
                    s.status == StepStatus::Completed.as_str()
                        || s.status == StepStatus::Skipped.as_str()
                })
                .map(|s| s.weight)
                .sum();

            if let Some(mut job) = job_repo::find_by_id_with_conn(conn, &job_id_owned)? {
                // A terminal job is immutable; a step finishing after a
                // cancellation must not bump its progress.
                let status = parse_status(&job.status, &job_id_owned);
                let computed = if total_weight > 0.0 {
                    100.0 * completed_weight / total_weight
                } else {
                    0.0
                };
                if !status.is_terminal() && computed > job.progress {
                    job.progress = computed;
                    job.updated_at = now_str;
                    job_repo::update_with_conn(conn, &job)?;
                }
            }

            Ok(Some(step))
        })?;

        match result {
            Some(row) => Ok(JobStep::from_row(&row)),
            None => Err(StoreError::StepNotFound {
                job_id: job_id.to_string(),
                step_name: step_name.to_string(),
            }),
        }
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    pub fn get_job(&self, job_id: &str) -> Result<Job, StoreError> {
        Ok(Job::from_row(&self.load_row(job_id)?))
    }

    pub fn find_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(job_repo::find_by_id(&self.db, job_id)?
            .as_ref()
            .map(Job::from_row))
    }

    /// Returns the job's steps in execution order.
    pub fn get_steps(&self, job_id: &str) -> Result<Vec<JobStep>, StoreError> {
        let rows = step_repo::find_by_job(&self.db, job_id)?;
        Ok(rows.iter().map(JobStep::from_row).collect())
    }

    /// Lightweight status view for polling clients.
    pub fn job_status_view(&self, job_id: &str) -> Result<JobStatusView, StoreError> {
        Ok(JobStatusView::from_job(&self.get_job(job_id)?))
    }

    pub fn list_by_user(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<Job>, u64), StoreError> {
        self.query(job_repo::JobFilter {
            user_id: Some(user_id.to_string()),
            limit: Some(limit),
            offset: Some(offset),
            ..Default::default()
        })
    }

    pub fn list_by_video(&self, video_id: &str) -> Result<Vec<Job>, StoreError> {
        let (jobs, _) = self.query(job_repo::JobFilter {
            video_id: Some(video_id.to_string()),
            ..Default::default()
        })?;
        Ok(jobs)
    }

    pub fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        let (jobs, _) = self.query(job_repo::JobFilter {
            status: Some(status.as_str().to_string()),
            ..Default::default()
        })?;
        Ok(jobs)
    }

    pub fn count_by_status(&self, status: JobStatus) -> Result<u64, StoreError> {
        Ok(job_repo::count_by_status(&self.db, status.as_str())?)
    }

    fn query(&self, filter: job_repo::JobFilter) -> Result<(Vec<Job>, u64), StoreError> {
        let (rows, total) = job_repo::query(&self.db, &filter)?;
        Ok((rows.iter().map(Job::from_row).collect(), total))
    }

    // ─── Maintenance ────────────────────────────────────────────────────────

    /// Deletes terminal jobs that finished more than `retention` ago.
    /// Returns the number of jobs removed.
    pub fn cleanup_old_jobs(&self, retention: Duration) -> Result<u64, StoreError> {
        let cutoff = format_timestamp(Utc::now() - retention);
        let deleted = job_repo::delete_terminal_before(&self.db, &cutoff)?;
        if deleted > 0 {
            log::info!("Cleaned up {} old jobs", deleted);
        }
        Ok(deleted)
    }

    fn load_row(&self, job_id: &str) -> Result<job_repo::JobRow, StoreError> {
        job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))
    }
}

//! Typed domain model for jobs and steps.
//!
//! Status, progress and timestamps are strongly typed; the config and result
//! payloads stay loosely typed JSON at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::job_repo::JobRow;
use crate::db::step_repo::StepRow;

/// Lifecycle status of a job. `Completed`, `Failed` and `Cancelled` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a single pipeline step. Steps have no `cancelled`
/// state; cancellation is observed between steps by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Processing => "processing",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StepStatus::Pending),
            "processing" => Some(StepStatus::Processing),
            "completed" => Some(StepStatus::Completed),
            "failed" => Some(StepStatus::Failed),
            "skipped" => Some(StepStatus::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (code, message) error pair recorded on failed jobs and steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

impl JobError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Immutable job configuration snapshot taken at creation.
///
/// The payload is a loosely typed JSON object (target language, voice,
/// feature flags); well-known keys get typed accessors. It is passed by
/// reference through the call chain and never mutated in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfig(Map<String, Value>);

impl JobConfig {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    /// Storage reference of the source media to dub.
    pub fn source_ref(&self) -> Option<&str> {
        self.get_str("source_ref")
    }

    pub fn target_language(&self) -> Option<&str> {
        self.get_str("target_language")
    }

    pub fn voice_id(&self) -> Option<&str> {
        self.get_str("voice_id")
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self(map.clone()),
            _ => Self::default(),
        }
    }
}

/// One end-to-end dubbing request and its execution state.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub video_id: Option<String>,
    pub job_type: String,
    pub status: JobStatus,
    pub progress: f64,
    pub config: JobConfig,
    pub result: Option<Value>,
    pub error: Option<JobError>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub(crate) fn from_row(row: &JobRow) -> Self {
        let config = row
            .config
            .as_deref()
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
            .map(|v| JobConfig::from_json(&v))
            .unwrap_or_default();
        let result = row
            .result
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok());
        let error = match (&row.error_code, &row.error_message) {
            (None, None) => None,
            (code, message) => Some(JobError {
                code: code.clone().unwrap_or_default(),
                message: message.clone().unwrap_or_default(),
            }),
        };

        Self {
            id: row.id.clone(),
            user_id: row.user_id.clone(),
            video_id: row.video_id.clone(),
            job_type: row.job_type.clone(),
            status: parse_status(&row.status, &row.id),
            progress: row.progress,
            config,
            result,
            error,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            created_at: parse_timestamp(&row.created_at),
            started_at: row.started_at.as_deref().map(parse_timestamp),
            completed_at: row.completed_at.as_deref().map(parse_timestamp),
        }
    }

    /// Execution time in seconds, when both timestamps are set.
    pub fn duration_secs(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }
}

/// Per-job execution record of one named pipeline stage.
#[derive(Debug, Clone)]
pub struct JobStep {
    pub job_id: String,
    pub step_name: String,
    pub step_order: u32,
    pub weight: f64,
    pub status: StepStatus,
    pub progress: f64,
    pub error: Option<JobError>,
    pub input_data: Option<Value>,
    pub output_data: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobStep {
    pub(crate) fn from_row(row: &StepRow) -> Self {
        let error = match (&row.error_code, &row.error_message) {
            (None, None) => None,
            (code, message) => Some(JobError {
                code: code.clone().unwrap_or_default(),
                message: message.clone().unwrap_or_default(),
            }),
        };

        Self {
            job_id: row.job_id.clone(),
            step_name: row.step_name.clone(),
            step_order: row.step_order,
            weight: row.weight,
            status: parse_step_status(&row.status, &row.job_id, &row.step_name),
            progress: row.progress,
            error,
            input_data: row
                .input_data
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
            output_data: row
                .output_data
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
            started_at: row.started_at.as_deref().map(parse_timestamp),
            completed_at: row.completed_at.as_deref().map(parse_timestamp),
        }
    }
}

/// Job status read model consumed by the API layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobStatusView {
    pub(crate) fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            error_message: job.error.as_ref().map(|e| e.message.clone()),
        }
    }
}

// ─── Parsing helpers ────────────────────────────────────────────────────────

pub(crate) fn parse_status(s: &str, job_id: &str) -> JobStatus {
    JobStatus::parse(s).unwrap_or_else(|| {
        log::warn!(
            "Unknown job status '{}' for job {}, defaulting to Pending",
            s,
            job_id
        );
        JobStatus::Pending
    })
}

pub(crate) fn parse_step_status(s: &str, job_id: &str, step_name: &str) -> StepStatus {
    StepStatus::parse(s).unwrap_or_else(|| {
        log::warn!(
            "Unknown step status '{}' for {}/{}, defaulting to Pending",
            s,
            job_id,
            step_name
        );
        StepStatus::Pending
    })
}

pub(crate) fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            Utc::now()
        })
}

pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());

        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Processing.is_terminal());
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(StepStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_job_config_accessors() {
        let value = serde_json::json!({
            "source_ref": "uploads/u1/source.mp4",
            "target_language": "ko",
            "voice_id": "alloy",
            "preserve_background_music": true
        });
        let config = JobConfig::from_json(&value);

        assert_eq!(config.source_ref(), Some("uploads/u1/source.mp4"));
        assert_eq!(config.target_language(), Some("ko"));
        assert_eq!(config.voice_id(), Some("alloy"));
        assert_eq!(
            config.get("preserve_background_music"),
            Some(&Value::Bool(true))
        );
        assert!(config.get_str("missing").is_none());
    }

    #[test]
    fn test_job_config_from_non_object() {
        let config = JobConfig::from_json(&Value::Null);
        assert!(config.as_map().is_empty());
    }

    #[test]
    fn test_status_view_serializes_camel_case() {
        let view = JobStatusView {
            job_id: "j1".to_string(),
            status: JobStatus::Processing,
            progress: 42.5,
            error_message: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["jobId"], "j1");
        assert_eq!(json["status"], "processing");
        assert_eq!(json["progress"], 42.5);
        assert!(json.get("errorMessage").is_none());
    }

    #[test]
    fn test_parse_timestamp_roundtrip() {
        let now = Utc::now();
        let parsed = parse_timestamp(&format_timestamp(now));
        assert_eq!(parsed.timestamp(), now.timestamp());
    }
}

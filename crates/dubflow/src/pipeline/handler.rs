//! Step handler trait and execution context.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::store::Job;
use crate::workspace::Workspace;

/// Everything a step needs to do its work: the job (with its config
/// snapshot), the scratch workspace and the staged source media.
pub struct StepContext {
    pub job: Job,
    pub workspace: Workspace,
    pub source_path: PathBuf,
}

/// Result payload of a successful step, persisted as the step's
/// `output_data` and readable by later steps.
#[derive(Debug, Default)]
pub struct StepOutput {
    pub data: Option<Value>,
}

impl StepOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_data(data: Value) -> Self {
        Self { data: Some(data) }
    }
}

/// A step failure. Step failures are permanent: the job is marked failed
/// and only an explicit resume re-runs it.
#[derive(Debug)]
pub struct StepError {
    pub code: String,
    pub message: String,
}

impl StepError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// One stage of the dubbing pipeline.
///
/// Handlers must be idempotent against re-execution: after a crash or a
/// resume a step that never recorded completion runs again, possibly on a
/// workspace holding its own partial output.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepError>;
}

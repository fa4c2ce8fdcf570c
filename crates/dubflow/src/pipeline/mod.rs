//! Dubbing pipeline: stage registry, step handlers and the orchestrator.

pub mod error;
pub mod handler;
pub mod registry;
pub mod runner;

pub use error::PipelineError;
pub use handler::{StepContext, StepError, StepHandler, StepOutput};
pub use registry::{StepRegistry, StepSpec, DUBBING_STEPS};
pub use runner::Orchestrator;

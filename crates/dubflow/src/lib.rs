//! Core engine of a video dubbing service.
//!
//! A dubbing job runs a fixed pipeline of weighted stages (transcribe,
//! translate, synthesize, mux) over a source video. This crate provides the
//! pieces that hold it together:
//!
//! - [`store::JobStore`]: persistent job and step state with weighted
//!   progress, backed by SQLite
//! - [`pipeline::StepRegistry`] and [`pipeline::Orchestrator`]: the stage
//!   table and the engine that drives a job through it
//! - [`workspace::WorkspaceManager`]: per-job scratch directories and
//!   artifact publication
//! - [`queue`]: at-least-once job dispatch and consumption
//! - [`recovery::RecoveryManager`]: startup recovery of interrupted jobs
//!
//! Execution is resumable: every state change is persisted, duplicate
//! deliveries are absorbed, and failed or interrupted jobs continue from
//! the first unfinished stage.

pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod queue;
pub mod recovery;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod workspace;

pub use config::ServiceConfig;
pub use db::Database;
pub use error::{DubflowError, Result};
pub use pipeline::{Orchestrator, StepRegistry};
pub use queue::{Consumer, ConsumerPool, Dispatcher};
pub use recovery::RecoveryManager;
pub use store::JobStore;
pub use workspace::WorkspaceManager;

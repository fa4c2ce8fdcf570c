//! Shared harness: a full in-process stack with scripted step handlers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use dubflow::db::Database;
use dubflow::notify::LogNotifier;
use dubflow::pipeline::{
    Orchestrator, StepContext, StepError, StepHandler, StepOutput, StepRegistry, StepSpec,
};
use dubflow::queue::{Consumer, Dispatcher, InMemoryQueue};
use dubflow::storage::LocalObjectStorage;
use dubflow::store::{JobConfig, JobStore, NewJob};
use dubflow::workspace::WorkspaceManager;

pub const SOURCE_KEY: &str = "uploads/u1/source.mp4";

/// Execution trace: step names in the order they actually ran.
pub type StepLog = Arc<Mutex<Vec<String>>>;

/// A step handler driven by the test script.
///
/// Every invocation is recorded in the shared log. The handler fails its
/// first `fail_times` invocations, optionally cancels its own job (to
/// model an external cancel arriving while the step runs), and writes the
/// artifacts its stage is responsible for.
struct ScriptedHandler {
    name: String,
    log: StepLog,
    fail_remaining: AtomicU32,
    cancel_job: Option<JobStore>,
    writes_video: bool,
    writes_subtitles: bool,
}

#[async_trait]
impl StepHandler for ScriptedHandler {
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        self.log.lock().unwrap().push(self.name.clone());

        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StepError::new(
                "E_STEP",
                format!("scripted failure in {}", self.name),
            ));
        }

        if let Some(store) = &self.cancel_job {
            store.cancel_job(&ctx.job.id).expect("cancel failed");
        }

        if self.writes_subtitles {
            std::fs::write(ctx.workspace.subtitles_path(), b"1\n00:00 --> 00:01\nhi\n")
                .expect("write subtitles");
        }
        if self.writes_video {
            std::fs::write(ctx.workspace.dubbed_video_path(), b"dubbed video")
                .expect("write video");
        }

        Ok(StepOutput::with_data(serde_json::json!({
            "step": self.name,
        })))
    }
}

pub struct TestEnv {
    pub store: JobStore,
    pub queue: Arc<InMemoryQueue>,
    pub dispatcher: Dispatcher,
    pub orchestrator: Arc<Orchestrator>,
    pub consumer: Consumer,
    pub log: StepLog,
    pub storage_root: TempDir,
    pub workspace_root: TempDir,
}

pub struct EnvBuilder {
    specs: Vec<StepSpec>,
    fail_times: HashMap<&'static str, u32>,
    cancel_at: Option<&'static str>,
    visibility_timeout: Duration,
}

impl EnvBuilder {
    pub fn new(specs: &[StepSpec]) -> Self {
        Self {
            specs: specs.to_vec(),
            fail_times: HashMap::new(),
            cancel_at: None,
            visibility_timeout: Duration::from_secs(30),
        }
    }

    /// Makes the named step fail its first `times` invocations.
    pub fn fail_step(mut self, name: &'static str, times: u32) -> Self {
        self.fail_times.insert(name, times);
        self
    }

    /// Makes the named step cancel its own job while running.
    pub fn cancel_during(mut self, name: &'static str) -> Self {
        self.cancel_at = Some(name);
        self
    }

    pub fn visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn build(self) -> TestEnv {
        let storage_root = TempDir::new().unwrap();
        let workspace_root = TempDir::new().unwrap();

        // Seed the source object every job config points at.
        let source = storage_root.path().join(SOURCE_KEY);
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, b"source video bytes").unwrap();

        let store = JobStore::new(Database::open_in_memory().unwrap());
        let log: StepLog = Arc::new(Mutex::new(Vec::new()));

        let mut registry = StepRegistry::new();
        let last = self.specs.last().map(|s| s.name);
        for spec in &self.specs {
            registry.register(
                *spec,
                Arc::new(ScriptedHandler {
                    name: spec.name.to_string(),
                    log: log.clone(),
                    fail_remaining: AtomicU32::new(
                        self.fail_times.get(spec.name).copied().unwrap_or(0),
                    ),
                    cancel_job: (self.cancel_at == Some(spec.name)).then(|| store.clone()),
                    writes_video: Some(spec.name) == last,
                    writes_subtitles: spec.name == "generate_subtitles",
                }),
            );
        }

        let storage = Arc::new(LocalObjectStorage::new(storage_root.path()));
        let workspaces = WorkspaceManager::new(workspace_root.path(), storage);
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            Arc::new(registry),
            workspaces,
            Arc::new(LogNotifier),
        ));

        let queue = Arc::new(InMemoryQueue::new(self.visibility_timeout));
        let dispatcher = Dispatcher::new(store.clone(), queue.clone());
        let consumer = Consumer::new(queue.clone(), orchestrator.clone(), Duration::from_millis(50));

        TestEnv {
            store,
            queue,
            dispatcher,
            orchestrator,
            consumer,
            log,
            storage_root,
            workspace_root,
        }
    }
}

impl TestEnv {
    /// Submits a dubbing job whose config points at the seeded source.
    pub async fn submit(&self) -> dubflow::store::Job {
        let config = JobConfig::from_json(&serde_json::json!({
            "source_ref": SOURCE_KEY,
            "target_language": "ko",
        }));
        self.dispatcher
            .submit(NewJob::dubbing("u1", "v1").with_config(config))
            .await
            .unwrap()
    }

    /// Steps the consumer until the queue stops yielding messages.
    pub async fn drain(&self) {
        while self.consumer.run_once().await.unwrap() {}
    }

    pub fn ran_steps(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

/// A small three-stage pipeline with the weight split used in most tests:
/// completing the stages lands progress at 10, 40 and 100.
pub fn three_step_specs() -> Vec<StepSpec> {
    vec![
        StepSpec {
            name: "extract",
            weight: 10.0,
            description: "test stage",
        },
        StepSpec {
            name: "translate",
            weight: 30.0,
            description: "test stage",
        },
        StepSpec {
            name: "render",
            weight: 60.0,
            description: "test stage",
        },
    ]
}

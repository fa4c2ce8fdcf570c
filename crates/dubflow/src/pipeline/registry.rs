//! Step registry: the ordered stage list and its handlers.

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::StepHandler;
use crate::store::StepSeed;

/// Static description of one pipeline stage. The weight is the stage's
/// share of overall job progress, relative to the sum of all weights.
#[derive(Debug, Clone, Copy)]
pub struct StepSpec {
    pub name: &'static str,
    pub weight: f64,
    pub description: &'static str,
}

/// The canonical dubbing pipeline, in execution order.
///
/// Weights reflect typical wall-clock share: transcription, translation and
/// audio generation dominate, bookkeeping stages are cheap.
pub const DUBBING_STEPS: &[StepSpec] = &[
    StepSpec {
        name: "prepare_video",
        weight: 3.0,
        description: "Probe the source media and extract the audio track",
    },
    StepSpec {
        name: "speech_recognition",
        weight: 15.0,
        description: "Transcribe speech with word-level timestamps",
    },
    StepSpec {
        name: "nlp_split",
        weight: 5.0,
        description: "Split the transcript into sentence-level segments",
    },
    StepSpec {
        name: "meaning_split",
        weight: 5.0,
        description: "Re-split long segments along meaning boundaries",
    },
    StepSpec {
        name: "summarize",
        weight: 8.0,
        description: "Summarize content to build translation context",
    },
    StepSpec {
        name: "translate",
        weight: 15.0,
        description: "Translate all segments into the target language",
    },
    StepSpec {
        name: "split_subtitles",
        weight: 5.0,
        description: "Split translated text into subtitle-sized lines",
    },
    StepSpec {
        name: "generate_subtitles",
        weight: 8.0,
        description: "Align subtitle timing and write the subtitle file",
    },
    StepSpec {
        name: "embed_subtitles",
        weight: 5.0,
        description: "Render subtitles into the video track",
    },
    StepSpec {
        name: "audio_task_setup",
        weight: 5.0,
        description: "Prepare the audio synthesis task table",
    },
    StepSpec {
        name: "create_dub_chunks",
        weight: 8.0,
        description: "Group segments into synthesizable chunks",
    },
    StepSpec {
        name: "reference_audio",
        weight: 5.0,
        description: "Extract reference audio for voice matching",
    },
    StepSpec {
        name: "generate_audio",
        weight: 20.0,
        description: "Synthesize dubbed audio for every chunk",
    },
    StepSpec {
        name: "merge_audio",
        weight: 10.0,
        description: "Merge chunks into a single dubbed audio track",
    },
    StepSpec {
        name: "finalize_video",
        weight: 8.0,
        description: "Mux dubbed audio into the final video",
    },
];

/// Ordered stage list plus the handler implementing each stage.
///
/// The registry is built once at startup and shared read-only across
/// consumers; the stage order and weights a job sees are snapshotted into
/// its step rows at creation, so later registry changes never affect jobs
/// already in flight.
pub struct StepRegistry {
    specs: Vec<StepSpec>,
    handlers: HashMap<&'static str, Arc<dyn StepHandler>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            specs: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Appends a stage. Ordering follows registration order.
    pub fn register(&mut self, spec: StepSpec, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(spec.name, handler);
        self.specs.push(spec);
    }

    pub fn specs(&self) -> &[StepSpec] {
        &self.specs
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn total_weight(&self) -> f64 {
        self.specs.iter().map(|s| s.weight).sum()
    }

    /// Step seeds for materializing a new job's plan.
    pub fn seeds(&self) -> Vec<StepSeed> {
        self.specs
            .iter()
            .map(|s| StepSeed {
                name: s.name.to_string(),
                weight: s.weight,
            })
            .collect()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::handler::{StepContext, StepError, StepOutput};
    use async_trait::async_trait;

    struct NoopHandler;

    #[async_trait]
    impl StepHandler for NoopHandler {
        async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, StepError> {
            Ok(StepOutput::empty())
        }
    }

    #[test]
    fn test_dubbing_steps_shape() {
        assert_eq!(DUBBING_STEPS.len(), 15);
        assert_eq!(DUBBING_STEPS[0].name, "prepare_video");
        assert_eq!(DUBBING_STEPS[14].name, "finalize_video");

        let total: f64 = DUBBING_STEPS.iter().map(|s| s.weight).sum();
        assert_eq!(total, 125.0);

        // Names must be unique; they key the step rows.
        let mut names: Vec<_> = DUBBING_STEPS.iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), DUBBING_STEPS.len());
    }

    #[test]
    fn test_registry_preserves_order() {
        let mut registry = StepRegistry::new();
        for spec in DUBBING_STEPS {
            registry.register(*spec, Arc::new(NoopHandler));
        }

        let seeds = registry.seeds();
        assert_eq!(seeds.len(), 15);
        assert_eq!(seeds[1].name, "speech_recognition");
        assert_eq!(seeds[1].weight, 15.0);
        assert!(registry.handler("translate").is_some());
        assert!(registry.handler("unknown").is_none());
        assert_eq!(registry.total_weight(), 125.0);
    }
}

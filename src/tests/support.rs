//! Deterministic test doubles for the embedding and generation services.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::generate::{GenerationError, Generator};
use crate::querylog::{QueryLog, QueryLogEntry};
use crate::semantic::{Embedder, EmbeddingError};

/// One axis per term, plus a small constant axis so no vector has zero norm.
const VOCABULARY: [&str; 10] = [
    "mean",
    "median",
    "mode",
    "deviation",
    "variance",
    "chain rule",
    "derivative",
    "probability",
    "histogram",
    "integral",
];

const BIAS: f32 = 0.1;

/// Keyword-axis embedder: texts sharing terms point the same way.
#[derive(Default)]
pub struct FakeEmbedder {
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = VOCABULARY
            .iter()
            .map(|term| if lower.contains(term) { 1.0 } else { 0.0 })
            .collect();
        vector.push(BIAS);
        vector
    }
}

impl Embedder for FakeEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(text.to_string());

        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::EmbeddingFailed(
                "embedding service unavailable".to_string(),
            ));
        }

        Ok(Self::vector_for(text))
    }

    fn name(&self) -> &str {
        "fake-keyword"
    }
}

/// Returns a fixed answer and remembers every prompt.
pub struct ScriptedGenerator {
    answer: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Ok(answer.to_string()),
            prompts: Mutex::new(vec![]),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            answer: Err(reason.to_string()),
            prompts: Mutex::new(vec![]),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answer
            .clone()
            .map_err(GenerationError::RequestFailed)
    }
}

/// In-memory query log.
#[derive(Default)]
pub struct MemoryQueryLog {
    entries: Mutex<Vec<QueryLogEntry>>,
}

impl MemoryQueryLog {
    pub fn entries(&self) -> Vec<QueryLogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl QueryLog for MemoryQueryLog {
    fn record(&self, entry: QueryLogEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

#[test]
fn test_fake_embedder_shares_axes_for_shared_terms() {
    let a = FakeEmbedder::vector_for("What is the MEAN?");
    let b = FakeEmbedder::vector_for("mean formula");
    let c = FakeEmbedder::vector_for("chain rule");

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), VOCABULARY.len() + 1);
}

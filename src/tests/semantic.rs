//! Retrieval and gating scenarios across the cache, selector, ranker,
//! service and gate.

use std::sync::Arc;

use crate::notes::{BackendCsv, Note, NoteCreate, NoteStore};
use crate::semantic::{
    CandidateSelector, ConfidenceGate, EmbeddingCache, EmbeddingModel, MatchOutcome,
    RetrievalService, DEFAULT_THRESHOLD,
};
use crate::tests::support::FakeEmbedder;

struct Corpus {
    _dir: tempfile::TempDir,
    store: Arc<BackendCsv>,
    cache: EmbeddingCache,
    service: RetrievalService,
}

fn corpus() -> Corpus {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(BackendCsv::load(dir.path().join("notes.csv")).unwrap());
    let cache = EmbeddingCache::new(Arc::new(FakeEmbedder::new()));
    let service = RetrievalService::new(
        store.clone(),
        cache.clone(),
        CandidateSelector::new("statistics"),
    );

    Corpus {
        _dir: dir,
        store,
        cache,
        service,
    }
}

impl Corpus {
    fn add(&self, title: &str, topic: &str, content: &str) -> Note {
        let (note, _) = self.cache.ensure_embedding(Note::new(NoteCreate {
            title: title.to_string(),
            topic: Some(topic.to_string()),
            content: content.to_string(),
            metadata: None,
        }));
        self.store.put(note).unwrap()
    }

    fn add_with_vector(&self, title: &str, vector: Vec<f32>) {
        let mut note = Note::new(NoteCreate {
            title: title.to_string(),
            topic: Some("statistics".to_string()),
            content: "body".to_string(),
            metadata: None,
        });
        note.embedding_hash = Some(note.current_hash());
        note.embedding = Some(vector);
        self.store.put(note).unwrap();
    }
}

fn gate() -> ConfidenceGate {
    ConfidenceGate::new(DEFAULT_THRESHOLD, 5, true)
}

#[test]
fn test_mean_question_is_answered_directly() {
    let c = corpus();
    c.add("Median", "descriptive-statistics", "The median is the middle value");
    c.add("Mean formula", "descriptive-statistics", "The mean is the sum divided by count");
    c.add("Chain rule", "differentiation", "Differentiate the outer function");

    let outcome = gate()
        .match_note(
            &c.service,
            "how do I calculate the mean",
            Some("descriptive-statistics"),
            None,
        )
        .unwrap();

    match outcome {
        MatchOutcome::DirectAnswer {
            note,
            confidence,
            scored,
        } => {
            assert_eq!(note.title, "Mean formula");
            assert!(confidence > 0.8);
            assert!(confidence >= DEFAULT_THRESHOLD);
            assert_eq!(scored[0].note.title, "Mean formula");
        }
        other => panic!("expected direct answer, got {other:?}"),
    }
}

#[test]
fn test_off_topic_question_falls_back_to_generation_context() {
    let c = corpus();
    c.add("Mean formula", "statistics", "The mean is the sum divided by count");
    c.add("Variance", "statistics", "Variance measures spread around the mean");

    let outcome = gate()
        .match_note(
            &c.service,
            "what is the chain rule",
            Some("differentiation"),
            None,
        )
        .unwrap();

    match outcome {
        MatchOutcome::FallbackGenerate { confidence, scored } => {
            assert!(confidence < 0.1);
            assert_eq!(scored.len(), 2);
            assert!(scored.windows(2).all(|w| w[0].score >= w[1].score));
        }
        other => panic!("expected generation fallback, got {other:?}"),
    }
}

#[test]
fn test_top_n_limits_well_scored_candidates() {
    let c = corpus();
    // mean axis plus a growing median component, so scores fall with i
    for i in 0..10 {
        let mut vector = vec![0.0; 11];
        vector[0] = 1.0;
        vector[1] = i as f32 * 0.1;
        vector[10] = 0.1;
        c.add_with_vector(&format!("Note {i}"), vector);
    }

    let results = c
        .service
        .search_similar("how do I calculate the mean", None, 3)
        .unwrap();

    let titles: Vec<_> = results.iter().map(|s| s.note.title.as_str()).collect();
    assert_eq!(titles, vec!["Note 0", "Note 1", "Note 2"]);
    assert!(results.windows(2).all(|w| w[0].score > w[1].score));
}

#[test]
fn test_question_context_steers_retrieval() {
    let c = corpus();
    c.add("Histogram", "statistics", "A histogram shows frequency");
    c.add("Probability", "probability", "Probability of an event");

    let outcome = ConfidenceGate::new(0.5, 5, false)
        .match_note(
            &c.service,
            "explain this",
            None,
            Some("Draw a histogram of the data"),
        )
        .unwrap();

    assert!(matches!(
        outcome,
        MatchOutcome::DirectAnswer { ref note, .. } if note.title == "Histogram"
    ));
}

#[test]
fn test_concurrent_queries_share_the_corpus() {
    let c = corpus();
    c.add("Mean formula", "statistics", "The mean is the sum divided by count");
    c.add("Median", "statistics", "The median is the middle value");
    let gate = gate();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    gate.match_note(&c.service, "what is the mean", None, None)
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            let outcome = handle.join().unwrap();
            assert!(matches!(
                outcome,
                MatchOutcome::DirectAnswer { ref note, .. } if note.title == "Mean formula"
            ));
        }
    });
}

#[test]
fn test_model_change_skips_old_vectors_and_falls_back() {
    let c = corpus();
    // embedded by a model with a different dimensionality
    c.add_with_vector("Old statistics note", vec![0.5; 384]);

    let outcome = gate()
        .match_note(&c.service, "what is the mean", None, None)
        .unwrap();

    match outcome {
        MatchOutcome::FallbackGenerate { confidence, scored } => {
            assert_eq!(confidence, 0.0);
            assert_eq!(scored[0].note.title, "Old statistics note");
        }
        other => panic!("expected generation fallback, got {other:?}"),
    }
}

#[test]
#[ignore = "requires model download (~23MB)"]
fn test_real_model_mean_question() {
    let dir = tempfile::tempdir().unwrap();
    let model = EmbeddingModel::new("all-MiniLM-L6-v2", dir.path().to_path_buf(), None)
        .expect("Failed to initialize embedding model");
    let store = Arc::new(BackendCsv::load(dir.path().join("notes.csv")).unwrap());
    let cache = EmbeddingCache::new(Arc::new(model));

    for (title, content) in [
        ("Mean formula", "The mean is the sum divided by count"),
        ("Chain rule", "Differentiate the outer function, then multiply by the derivative of the inner"),
        ("Quadratic roots", "Use the quadratic formula to find the roots"),
    ] {
        let (note, _) = cache.ensure_embedding(Note::new(NoteCreate {
            title: title.to_string(),
            topic: Some("maths".to_string()),
            content: content.to_string(),
            metadata: None,
        }));
        store.put(note).unwrap();
    }

    let service = RetrievalService::new(store, cache, CandidateSelector::new("statistics"));
    let results = service
        .search_similar("how do I calculate the mean", None, 3)
        .unwrap();

    assert_eq!(results[0].note.title, "Mean formula");
}

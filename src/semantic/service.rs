//! Retrieval service: query embedding, candidate selection and ranking.
//!
//! `search_similar` always returns a prefix of a sorted list. When nothing
//! can be ranked it falls back to notes from the fallback category with a
//! score of exactly `0.0`, so callers can tell "context" from "match".

use std::sync::Arc;

use crate::notes::{Note, NoteError, NoteStore};
use crate::semantic::cache::EmbeddingCache;
use crate::semantic::embeddings::EmbeddingError;
use crate::semantic::rank::{ScoredNote, SimilarityRanker};
use crate::semantic::selector::CandidateSelector;

/// Errors that can occur during retrieval.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("query could not be embedded: {0}")]
    EmbeddingUnavailableForQuery(#[from] EmbeddingError),

    #[error("note store error: {0}")]
    Store(#[from] NoteError),
}

pub struct RetrievalService {
    store: Arc<dyn NoteStore>,
    cache: EmbeddingCache,
    selector: CandidateSelector,
    ranker: SimilarityRanker,
}

impl RetrievalService {
    pub fn new(store: Arc<dyn NoteStore>, cache: EmbeddingCache, selector: CandidateSelector) -> Self {
        Self {
            store,
            cache,
            selector,
            ranker: SimilarityRanker::new(),
        }
    }

    /// Find the `top_n` notes most similar to `query`.
    ///
    /// Only a failure to embed the query is an error; malformed note vectors
    /// are skipped by the ranker.
    pub fn search_similar(
        &self,
        query: &str,
        topic_hint: Option<&str>,
        top_n: usize,
    ) -> Result<Vec<ScoredNote>, RetrievalError> {
        let query_vector = self.cache.embed_query(query)?;

        let notes = self.store.list()?;
        let candidates = self.selector.select(&notes, topic_hint);
        let mut ranked = self.ranker.rank(&query_vector, candidates);

        if ranked.is_empty() {
            log::warn!(
                "No topic match found, falling back to '{}' notes",
                self.selector.fallback_category()
            );
            ranked = self.fallback(&notes, top_n);
        }

        ranked.truncate(top_n);

        if ranked.is_empty() {
            log::info!("retrieval found no notes for query");
        }
        for scored in &ranked {
            log::debug!("retrieved {} -> {:.3}", scored.note.title, scored.score);
        }

        Ok(ranked)
    }

    /// Unranked fallback-category notes in corpus order, all scored `0.0`.
    fn fallback(&self, notes: &[Note], top_n: usize) -> Vec<ScoredNote> {
        notes
            .iter()
            .filter(|note| self.selector.in_fallback_category(note))
            .take(top_n)
            .map(|note| ScoredNote {
                score: 0.0,
                note: note.clone(),
            })
            .collect()
    }
}

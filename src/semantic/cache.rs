//! Hash-keyed embedding cache for notes.
//!
//! A note is only sent to the embedding service when the hash of its
//! embeddable text differs from the hash stored next to its vector.

use std::sync::Arc;

use crate::notes::Note;
use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::preprocess::{content_hash, frame_query};

/// What `ensure_embedding` did to a note.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingStatus {
    /// Stored vector already matches the current text.
    Fresh,
    /// A new vector was generated.
    Embedded,
    /// The embedding service failed; the note is left unsearchable.
    Unavailable(String),
}

#[derive(Clone)]
pub struct EmbeddingCache {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingCache {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    /// Bring a note's embedding in line with its current text.
    ///
    /// Never fails: on embedding errors the note comes back with neither
    /// vector nor hash, and will be retried on the next save.
    pub fn ensure_embedding(&self, mut note: Note) -> (Note, EmbeddingStatus) {
        let text = note.embeddable_text();
        let hash = content_hash(&text);

        if note.embedding.is_some() && note.embedding_hash.as_deref() == Some(hash.as_str()) {
            log::debug!("note={} embedding cache hit", note.id);
            return (note, EmbeddingStatus::Fresh);
        }

        log::info!("Re-embedding note: {}", note.title);
        match self.embedder.embed(&text) {
            Ok(vector) => {
                note.embedding = Some(vector);
                note.embedding_hash = Some(hash);
                (note, EmbeddingStatus::Embedded)
            }
            Err(err) => {
                log::warn!(
                    "note={} embedding unavailable, excluded from search until re-embedded: {}",
                    note.id,
                    err
                );
                note.clear_embedding();
                (note, EmbeddingStatus::Unavailable(err.to_string()))
            }
        }
    }

    /// Embed a student question under the fixed query framing.
    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embedder.embed(&frame_query(text))
    }
}

//! Topic-scoped candidate selection.

use std::collections::HashSet;

use crate::notes::Note;
use crate::semantic::preprocess::normalize_topic_hint;

/// Picks the notes worth scoring for a query.
///
/// Notes without a valid embedding are never candidates. A topic hint narrows
/// the set to notes whose topic or title contains it, always unioned with
/// notes from the fallback category.
#[derive(Debug, Clone)]
pub struct CandidateSelector {
    fallback_category: String,
}

impl CandidateSelector {
    pub fn new(fallback_category: &str) -> Self {
        Self {
            fallback_category: fallback_category.trim().to_lowercase(),
        }
    }

    pub fn fallback_category(&self) -> &str {
        &self.fallback_category
    }

    pub fn in_fallback_category(&self, note: &Note) -> bool {
        !self.fallback_category.is_empty()
            && note
                .topic_name()
                .to_lowercase()
                .contains(&self.fallback_category)
    }

    /// Select candidates in corpus order. May return an empty list.
    pub fn select<'a>(&self, notes: &'a [Note], topic_hint: Option<&str>) -> Vec<&'a Note> {
        let hint = topic_hint.map(normalize_topic_hint).unwrap_or_default();

        let mut seen = HashSet::new();
        let selected: Vec<&Note> = notes
            .iter()
            .filter(|note| note.has_valid_embedding())
            .filter(|note| hint.is_empty() || self.matches_hint(note, &hint))
            .filter(|note| seen.insert(note.id.clone()))
            .collect();

        log::debug!(
            "selector hint={:?} selected={} of {}",
            hint,
            selected.len(),
            notes.len()
        );

        selected
    }

    fn matches_hint(&self, note: &Note, hint: &str) -> bool {
        let topic = normalize_topic_hint(note.topic_name());

        topic.contains(hint)
            || note.title.to_lowercase().contains(hint)
            || self.in_fallback_category(note)
    }
}

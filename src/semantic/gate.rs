//! Confidence gate between answering from a note and generating an answer.

use serde::Serialize;

use crate::notes::Note;
use crate::semantic::preprocess::expand_query;
use crate::semantic::rank::{sort_scored, ScoredNote};
use crate::semantic::service::{RetrievalError, RetrievalService};

/// Terminal outcome of a single question.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum MatchOutcome {
    /// Best note cleared the threshold and is the authoritative answer.
    DirectAnswer {
        note: Note,
        confidence: f32,
        scored: Vec<ScoredNote>,
    },
    /// No note is trusted; `scored` is the grounding context for generation.
    FallbackGenerate {
        confidence: f32,
        scored: Vec<ScoredNote>,
    },
    /// Nothing could be retrieved at all.
    NoMatch,
}

impl MatchOutcome {
    pub fn confidence(&self) -> Option<f32> {
        match self {
            MatchOutcome::DirectAnswer { confidence, .. }
            | MatchOutcome::FallbackGenerate { confidence, .. } => Some(*confidence),
            MatchOutcome::NoMatch => None,
        }
    }

    pub fn scored(&self) -> &[ScoredNote] {
        match self {
            MatchOutcome::DirectAnswer { scored, .. }
            | MatchOutcome::FallbackGenerate { scored, .. } => scored,
            MatchOutcome::NoMatch => &[],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceGate {
    threshold: f32,
    top_n: usize,
    expand_queries: bool,
}

impl ConfidenceGate {
    pub fn new(threshold: f32, top_n: usize, expand_queries: bool) -> Self {
        Self {
            threshold,
            top_n,
            expand_queries,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn with_threshold(self, threshold: f32) -> Self {
        Self { threshold, ..self }
    }

    /// Retrieve notes for a question and decide how it should be answered.
    ///
    /// `question_context` (e.g. the exercise the student is working on) is
    /// appended to the query before retrieval.
    pub fn match_note(
        &self,
        service: &RetrievalService,
        query: &str,
        topic_hint: Option<&str>,
        question_context: Option<&str>,
    ) -> Result<MatchOutcome, RetrievalError> {
        let mut search_query = if self.expand_queries {
            expand_query(query)
        } else {
            query.to_string()
        };

        if let Some(context) = question_context.map(str::trim).filter(|c| !c.is_empty()) {
            search_query = format!("{search_query} {context}");
            log::debug!("query with context: {query:?} + context");
        } else if search_query != query {
            log::debug!("query expanded: {query:?} -> {search_query:?}");
        }

        let scored = service.search_similar(&search_query, topic_hint, self.top_n)?;
        Ok(self.decide(scored))
    }

    /// Apply the threshold to a scored list. The boundary is inclusive.
    pub fn decide(&self, mut scored: Vec<ScoredNote>) -> MatchOutcome {
        if scored.is_empty() {
            log::warn!("No notes retrieved");
            return MatchOutcome::NoMatch;
        }

        sort_scored(&mut scored);
        let best = &scored[0];
        let confidence = best.score;

        if confidence >= self.threshold {
            log::info!(
                "match_note: strong match ({:.3}) -> {}",
                confidence,
                best.note.title
            );
            let note = best.note.clone();
            MatchOutcome::DirectAnswer {
                note,
                confidence,
                scored,
            }
        } else {
            log::info!(
                "match_note: weak match ({:.3}), using generation fallback",
                confidence
            );
            MatchOutcome::FallbackGenerate { confidence, scored }
        }
    }
}

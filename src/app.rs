//! Application layer: wires the note store, retrieval, generation and the
//! query log together behind `InfoBot`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::config::{Config, ConfigError, EmbeddingConfig, EmbeddingProvider};
use crate::generate::{build_prompt, GenerationError, Generator, HttpGenerator};
use crate::notes::{BackendCsv, Note, NoteCreate, NoteError, NoteId, NoteStore, NoteUpdate};
use crate::querylog::{AnswerPath, JsonlQueryLog, QueryLog, QueryLogEntry};
use crate::semantic::{
    CandidateSelector, ConfidenceGate, Embedder, EmbeddingCache, EmbeddingError, EmbeddingModel,
    EmbeddingStatus, HttpEmbedder, MatchOutcome, RetrievalError, RetrievalService, ScoredNote,
};
use crate::storage::BackendLocal;

pub const NOTES_FILE: &str = "notes.csv";

pub const NO_NOTES_MESSAGE: &str = "No notes are available to answer this question yet.";

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("note {0} not found")]
    NotFound(NoteId),

    #[error("the update did nothing")]
    EmptyUpdate,

    #[error("threshold must be between -1.0 and 1.0, got {0}")]
    InvalidThreshold(f32),

    #[error("note store error: {0}")]
    Note(#[from] NoteError),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),
}

/// What the student gets back.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Answer {
    DirectNote {
        answer: String,
        note_id: NoteId,
        note_title: String,
        confidence: f32,
    },
    Generated {
        answer: String,
        confidence: f32,
        sources: Vec<String>,
    },
    NoMatch {
        message: String,
    },
}

impl Answer {
    pub fn text(&self) -> &str {
        match self {
            Answer::DirectNote { answer, .. } | Answer::Generated { answer, .. } => answer,
            Answer::NoMatch { message } => message,
        }
    }
}

/// Outcome of a bulk re-embed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReembedReport {
    pub total: usize,
    pub embedded: usize,
    pub fresh: usize,
    pub failed: usize,
    /// Notes edited concurrently; their newer write was kept.
    pub conflicts: usize,
}

/// Loads the local model on first use so commands that never embed stay fast.
struct DeferredEmbedder {
    config: EmbeddingConfig,
    cache_dir: PathBuf,
    inner: OnceCell<EmbeddingModel>,
}

impl DeferredEmbedder {
    fn model(&self) -> Result<&EmbeddingModel, EmbeddingError> {
        self.inner.get_or_try_init(|| {
            let model = EmbeddingModel::new(
                &self.config.model,
                self.cache_dir.clone(),
                Some(Duration::from_secs(self.config.download_timeout_secs)),
            )?;
            log::info!(
                "embedding model '{}' ready ({} dimensions)",
                self.config.model,
                model.dimensions()
            );
            Ok(model)
        })
    }
}

impl Embedder for DeferredEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.model()?.embed(text)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

pub struct InfoBot {
    store: Arc<dyn NoteStore>,
    cache: EmbeddingCache,
    service: RetrievalService,
    gate: ConfidenceGate,
    generator: Arc<dyn Generator>,
    query_log: Arc<dyn QueryLog>,
    preamble: String,
    context_notes: usize,
}

impl InfoBot {
    pub fn new_with(
        config: &Config,
        store: Arc<dyn NoteStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        query_log: Arc<dyn QueryLog>,
    ) -> Self {
        let cache = EmbeddingCache::new(embedder);
        let selector = CandidateSelector::new(&config.retrieval.fallback_category);
        let service = RetrievalService::new(store.clone(), cache.clone(), selector);
        let gate = ConfidenceGate::new(
            config.retrieval.threshold,
            config.retrieval.top_n,
            config.retrieval.expand_queries,
        );

        Self {
            store,
            cache,
            service,
            gate,
            generator,
            query_log,
            preamble: config.generation.preamble.clone(),
            context_notes: config.generation.context_notes,
        }
    }

    /// Build the production wiring from config: csv notes, jsonl log and the
    /// configured embedding and generation endpoints.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let base_path = config.base_path().to_path_buf();

        let store = Arc::new(BackendCsv::load(base_path.join(NOTES_FILE))?);
        let query_log = Arc::new(JsonlQueryLog::new(Arc::new(BackendLocal::new(&base_path)?)));

        let emb = &config.embedding;
        let embedder: Arc<dyn Embedder> = match emb.provider {
            EmbeddingProvider::Local => Arc::new(DeferredEmbedder {
                config: emb.clone(),
                cache_dir: base_path.clone(),
                inner: OnceCell::new(),
            }),
            EmbeddingProvider::Http => Arc::new(HttpEmbedder::new(
                &emb.url,
                &emb.model,
                Config::api_key(&emb.api_key_env),
                Duration::from_secs(emb.timeout_secs),
            )?),
        };

        let generation = &config.generation;
        let generator = Arc::new(HttpGenerator::new(
            &generation.url,
            &generation.model,
            Config::api_key(&generation.api_key_env),
            generation.temperature,
            Duration::from_secs(generation.timeout_secs),
        )?);

        Ok(Self::new_with(config, store, embedder, generator, query_log))
    }

    pub fn embedder_name(&self) -> &str {
        self.cache.embedder_name()
    }

    pub fn create_note(&self, create: NoteCreate) -> Result<(Note, EmbeddingStatus), AppError> {
        let (note, status) = self.cache.ensure_embedding(Note::new(create));
        let note = self.store.put(note)?;
        log::info!("note={} created: {}", note.id, note.title);
        Ok((note, status))
    }

    /// Apply a partial update; the embedding is refreshed only if the
    /// embeddable text changed.
    pub fn update_note(
        &self,
        id: &NoteId,
        update: NoteUpdate,
    ) -> Result<(Note, EmbeddingStatus), AppError> {
        if update.is_empty() {
            return Err(AppError::EmptyUpdate);
        }

        let mut note = self.get_note(id)?;
        update.apply(&mut note);

        let (note, status) = self.cache.ensure_embedding(note);
        let note = self.store.put(note)?;
        Ok((note, status))
    }

    pub fn delete_note(&self, id: &NoteId) -> Result<(), AppError> {
        if !self.store.delete(id)? {
            return Err(AppError::NotFound(id.clone()));
        }
        log::info!("note={id} deleted");
        Ok(())
    }

    pub fn get_note(&self, id: &NoteId) -> Result<Note, AppError> {
        self.store
            .get(id)?
            .ok_or_else(|| AppError::NotFound(id.clone()))
    }

    pub fn list_notes(&self, topic: Option<&str>) -> Result<Vec<Note>, AppError> {
        let notes = self.store.list()?;
        let Some(topic) = topic.map(str::to_lowercase) else {
            return Ok(notes);
        };

        Ok(notes
            .into_iter()
            .filter(|n| n.topic_name().to_lowercase() == topic)
            .collect())
    }

    /// Re-embed stale notes, or every note with `force`.
    ///
    /// Writes go through compare-and-set so an edit that lands mid-run is
    /// never overwritten with a vector of older text.
    pub fn reembed_all(&self, force: bool, progress: &ProgressBar) -> Result<ReembedReport, AppError> {
        let notes = self.store.list()?;
        let mut report = ReembedReport {
            total: notes.len(),
            ..Default::default()
        };
        progress.set_length(notes.len() as u64);

        for mut note in notes {
            progress.set_message(note.title.clone());
            let expected_hash = note.embedding_hash.clone();
            if force {
                note.clear_embedding();
            }

            let (note, status) = self.cache.ensure_embedding(note);
            match status {
                EmbeddingStatus::Fresh => report.fresh += 1,
                EmbeddingStatus::Unavailable(_) => report.failed += 1,
                EmbeddingStatus::Embedded => {
                    let (Some(vector), Some(hash)) = (note.embedding, note.embedding_hash) else {
                        report.failed += 1;
                        progress.inc(1);
                        continue;
                    };

                    match self.store.store_embedding(&note.id, expected_hash.as_deref(), vector, hash) {
                        Ok(true) => report.embedded += 1,
                        Ok(false) => report.conflicts += 1,
                        // deleted while we were embedding it
                        Err(NoteError::NotFound(_)) => report.conflicts += 1,
                        Err(err) => return Err(err.into()),
                    }
                }
            }
            progress.inc(1);
        }

        progress.finish_and_clear();
        log::info!(
            "reembed: {} embedded, {} fresh, {} failed, {} conflicts",
            report.embedded,
            report.fresh,
            report.failed,
            report.conflicts
        );

        Ok(report)
    }

    /// Raw retrieval, for inspecting scores.
    pub fn search(
        &self,
        query: &str,
        topic_hint: Option<&str>,
        top_n: Option<usize>,
    ) -> Result<Vec<ScoredNote>, AppError> {
        let top_n = top_n.filter(|n| *n > 0).unwrap_or(self.gate.top_n());
        Ok(self.service.search_similar(query, topic_hint, top_n)?)
    }

    /// Answer a question from the notes, generating when no note is trusted.
    pub fn ask(
        &self,
        question: &str,
        topic_hint: Option<&str>,
        context: Option<&str>,
        threshold: Option<f32>,
    ) -> Result<Answer, AppError> {
        let span = tracing::info_span!("ask", topic = topic_hint.unwrap_or_default());
        let _enter = span.enter();

        let gate = match threshold {
            Some(t) if !(-1.0..=1.0).contains(&t) => return Err(AppError::InvalidThreshold(t)),
            Some(t) => self.gate.with_threshold(t),
            None => self.gate,
        };

        let outcome = gate.match_note(&self.service, question, topic_hint, context)?;
        log::debug!(
            "confidence={:?} candidates={}",
            outcome.confidence(),
            outcome.scored().len()
        );

        let answer = match outcome {
            MatchOutcome::NoMatch => {
                return Ok(Answer::NoMatch {
                    message: NO_NOTES_MESSAGE.to_string(),
                })
            }
            MatchOutcome::DirectAnswer {
                note, confidence, ..
            } => {
                self.query_log.record(QueryLogEntry::new(
                    topic_hint,
                    question,
                    &note.content,
                    Some(confidence),
                    vec![note.title.clone()],
                    AnswerPath::DirectNote,
                ));

                Answer::DirectNote {
                    answer: note.content,
                    note_id: note.id,
                    note_title: note.title,
                    confidence,
                }
            }
            MatchOutcome::FallbackGenerate { confidence, scored } => {
                let prompt = build_prompt(&self.preamble, question, &scored, self.context_notes);
                let answer = self.generator.generate(&prompt)?;
                let sources: Vec<String> = scored.iter().map(|s| s.note.title.clone()).collect();

                self.query_log.record(QueryLogEntry::new(
                    topic_hint,
                    question,
                    &answer,
                    Some(confidence),
                    sources.clone(),
                    AnswerPath::Generated,
                ));

                Answer::Generated {
                    answer,
                    confidence,
                    sources,
                }
            }
        };

        Ok(answer)
    }
}

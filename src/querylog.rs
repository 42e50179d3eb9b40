//! Append-only audit trail of answered questions.
//!
//! Writes are best-effort: a failing sink is logged and otherwise ignored so
//! it can never block or fail the answer itself.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::StorageManager;

const QUERY_LOG_FILE: &str = "queries.jsonl";

/// Which path produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerPath {
    DirectNote,
    Generated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub created_at: DateTime<Utc>,
    pub topic_hint: Option<String>,
    pub question: String,
    pub answer: String,
    pub confidence: Option<f32>,
    /// Titles of the notes consulted.
    pub sources: Vec<String>,
    pub path: AnswerPath,
}

impl QueryLogEntry {
    pub fn new(
        topic_hint: Option<&str>,
        question: &str,
        answer: &str,
        confidence: Option<f32>,
        sources: Vec<String>,
        path: AnswerPath,
    ) -> Self {
        Self {
            created_at: Utc::now(),
            topic_hint: topic_hint.map(str::to_string),
            question: question.to_string(),
            answer: answer.to_string(),
            confidence,
            sources,
            path,
        }
    }
}

pub trait QueryLog: Send + Sync {
    /// Fire-and-forget append.
    fn record(&self, entry: QueryLogEntry);
}

#[derive(Debug, thiserror::Error)]
pub enum QueryLogError {
    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("malformed entry on line {line}: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },
}

/// One JSON object per line in `queries.jsonl`.
pub struct JsonlQueryLog {
    storage: Arc<dyn StorageManager>,
    write_lock: Mutex<()>,
}

impl JsonlQueryLog {
    pub fn new(storage: Arc<dyn StorageManager>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    fn try_record(&self, entry: &QueryLogEntry) -> Result<(), QueryLogError> {
        let mut line = serde_json::to_string(entry)
            .map_err(|source| QueryLogError::Malformed { line: 0, source })?;
        line.push('\n');

        // a poisoned lock only means another writer panicked; appending is still safe
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.storage.append(QUERY_LOG_FILE, line.as_bytes())?;
        Ok(())
    }

    /// Most recent entries last; `limit` keeps only the newest ones.
    pub fn entries(&self, limit: Option<usize>) -> Result<Vec<QueryLogEntry>, QueryLogError> {
        if !self.storage.exists(QUERY_LOG_FILE) {
            return Ok(vec![]);
        }

        let data = self.storage.read(QUERY_LOG_FILE)?;
        let text = String::from_utf8_lossy(&data);

        let mut entries = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line)
                    .map_err(|source| QueryLogError::Malformed { line: idx + 1, source })
            })
            .collect::<Result<Vec<QueryLogEntry>, _>>()?;

        if let Some(limit) = limit {
            let skip = entries.len().saturating_sub(limit);
            entries.drain(..skip);
        }

        Ok(entries)
    }
}

impl QueryLog for JsonlQueryLog {
    fn record(&self, entry: QueryLogEntry) {
        if let Err(err) = self.try_record(&entry) {
            log::warn!(
                "failed to record query log entry for {:?}: {}",
                entry.question,
                err
            );
        }
    }
}

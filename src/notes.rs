use crate::semantic::preprocess::{content_hash, embeddable_text};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::Instant,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteId(String);

impl NoteId {
    pub fn new() -> Self {
        NoteId(rusty_ulid::Ulid::generate().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for NoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NoteId {
    fn from(fr: &str) -> Self {
        NoteId(fr.to_string())
    }
}

/// A unit of authored tutoring content.
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: NoteId,

    pub title: String,
    pub topic: Option<String>,
    pub content: String,
    /// Curated summary embedded in place of `content` when non-empty.
    pub metadata: Option<String>,

    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub embedding_hash: Option<String>,
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Note {
    pub fn new(create: NoteCreate) -> Self {
        Note {
            id: NoteId::new(),
            title: create.title,
            topic: create.topic.filter(|t| !t.trim().is_empty()),
            content: create.content,
            metadata: create.metadata.filter(|m| !m.trim().is_empty()),
            embedding: None,
            embedding_hash: None,
        }
    }

    pub fn topic_name(&self) -> &str {
        self.topic.as_deref().unwrap_or_default()
    }

    pub fn embeddable_text(&self) -> String {
        embeddable_text(
            &self.title,
            self.topic.as_deref(),
            self.metadata.as_deref(),
            &self.content,
        )
    }

    pub fn current_hash(&self) -> String {
        content_hash(&self.embeddable_text())
    }

    /// An embedding only counts when it was produced from the current text.
    pub fn has_valid_embedding(&self) -> bool {
        match (&self.embedding, &self.embedding_hash) {
            (Some(_), Some(hash)) => *hash == self.current_hash(),
            _ => false,
        }
    }

    pub fn clear_embedding(&mut self) {
        self.embedding = None;
        self.embedding_hash = None;
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NoteCreate {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// Partial update. An empty `topic`/`metadata` string clears the field.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NoteUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl NoteUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.topic.is_none()
            && self.content.is_none()
            && self.metadata.is_none()
    }

    pub fn apply(self, note: &mut Note) {
        if let Some(title) = self.title {
            note.title = title;
        }
        if let Some(topic) = self.topic {
            note.topic = Some(topic).filter(|t| !t.trim().is_empty());
        }
        if let Some(content) = self.content {
            note.content = content;
        }
        if let Some(metadata) = self.metadata {
            note.metadata = Some(metadata).filter(|m| !m.trim().is_empty());
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NoteError {
    #[error("note {0} not found")]
    NotFound(NoteId),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("note store lock poisoned")]
    Poisoned,
}

/// Read/write access to the note corpus.
pub trait NoteStore: Send + Sync {
    fn list(&self) -> Result<Vec<Note>, NoteError>;
    fn get(&self, id: &NoteId) -> Result<Option<Note>, NoteError>;
    /// Insert or replace a note as a whole, content and embedding together.
    fn put(&self, note: Note) -> Result<Note, NoteError>;
    fn delete(&self, id: &NoteId) -> Result<bool, NoteError>;
    /// Compare-and-set on `embedding_hash`.
    ///
    /// Stores `embedding`/`hash` only if the note's stored hash still equals
    /// `expected_hash` and `hash` matches the note's current text.
    /// Returns whether the write happened.
    fn store_embedding(
        &self,
        id: &NoteId,
        expected_hash: Option<&str>,
        embedding: Vec<f32>,
        hash: String,
    ) -> Result<bool, NoteError>;
}

#[derive(Debug, Clone)]
pub struct BackendCsv {
    list: Arc<RwLock<Vec<Note>>>,
    path: PathBuf,
}

const CSV_HEADERS: [&str; 7] = [
    "id",
    "title",
    "topic",
    "content",
    "metadata",
    "embedding",
    "embedding_hash",
];

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl BackendCsv {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NoteError> {
        let path = path.as_ref();
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new note database at {}", path.display());
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;

        let mut notes = vec![];
        for record in csv_reader.records() {
            let record = record?;
            let field = |idx: usize| {
                record
                    .get(idx)
                    .ok_or_else(|| NoteError::Malformed(format!("missing column {}", CSV_HEADERS[idx])))
            };

            let id = NoteId::from(field(0)?);
            let embedding_cell = field(5)?;
            let embedding = if embedding_cell.is_empty() {
                None
            } else {
                match serde_json::from_str::<Vec<f32>>(embedding_cell) {
                    Ok(vector) => Some(vector),
                    Err(err) => {
                        log::warn!("note={id} unreadable embedding, treating as absent: {err}");
                        None
                    }
                }
            };

            notes.push(Note {
                id,
                title: field(1)?.to_string(),
                topic: non_empty(field(2)?),
                content: field(3)?.to_string(),
                metadata: non_empty(field(4)?),
                embedding,
                embedding_hash: non_empty(field(6)?),
            });
        }

        log::debug!(
            "took {}ms to read {} notes",
            now.elapsed().as_micros() as f64 / 1000.0,
            notes.len()
        );

        Ok(BackendCsv {
            list: Arc::new(RwLock::new(notes)),
            path: path.to_path_buf(),
        })
    }

    fn save(&self, notes: &[Note]) -> Result<(), NoteError> {
        let temp_path = self.path.with_extension("csv-tmp");
        let mut csv_wrt = csv::Writer::from_path(&temp_path)?;
        csv_wrt.write_record(CSV_HEADERS)?;
        for note in notes {
            let embedding = match &note.embedding {
                Some(vector) => serde_json::to_string(vector)
                    .map_err(|e| NoteError::Malformed(e.to_string()))?,
                None => String::new(),
            };
            csv_wrt.write_record([
                note.id.as_str(),
                note.title.as_str(),
                note.topic_name(),
                note.content.as_str(),
                note.metadata.as_deref().unwrap_or_default(),
                embedding.as_str(),
                note.embedding_hash.as_deref().unwrap_or_default(),
            ])?;
        }
        csv_wrt.flush()?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl NoteStore for BackendCsv {
    fn list(&self) -> Result<Vec<Note>, NoteError> {
        let notes = self.list.read().map_err(|_| NoteError::Poisoned)?;
        Ok(notes.clone())
    }

    fn get(&self, id: &NoteId) -> Result<Option<Note>, NoteError> {
        let notes = self.list.read().map_err(|_| NoteError::Poisoned)?;
        Ok(notes.iter().find(|n| n.id == *id).cloned())
    }

    fn put(&self, note: Note) -> Result<Note, NoteError> {
        let mut notes = self.list.write().map_err(|_| NoteError::Poisoned)?;

        match notes.iter().position(|n| n.id == note.id) {
            Some(idx) => notes[idx] = note.clone(),
            None => notes.push(note.clone()),
        }

        self.save(&notes)?;
        Ok(note)
    }

    fn delete(&self, id: &NoteId) -> Result<bool, NoteError> {
        let mut notes = self.list.write().map_err(|_| NoteError::Poisoned)?;

        let Some(idx) = notes.iter().position(|n| n.id == *id) else {
            return Ok(false);
        };
        notes.remove(idx);

        self.save(&notes)?;
        Ok(true)
    }

    fn store_embedding(
        &self,
        id: &NoteId,
        expected_hash: Option<&str>,
        embedding: Vec<f32>,
        hash: String,
    ) -> Result<bool, NoteError> {
        let mut notes = self.list.write().map_err(|_| NoteError::Poisoned)?;

        let note = notes
            .iter_mut()
            .find(|n| n.id == *id)
            .ok_or_else(|| NoteError::NotFound(id.clone()))?;

        if note.embedding_hash.as_deref() != expected_hash || note.current_hash() != hash {
            log::debug!("note={id} embedding write lost compare-and-set, skipping");
            return Ok(false);
        }

        note.embedding = Some(embedding);
        note.embedding_hash = Some(hash);

        self.save(&notes)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(title: &str, topic: Option<&str>, content: &str) -> NoteCreate {
        NoteCreate {
            title: title.to_string(),
            topic: topic.map(str::to_string),
            content: content.to_string(),
            metadata: None,
        }
    }

    #[test]
    fn test_new_note_has_no_embedding() {
        let note = Note::new(create("Mean", Some("  "), "sum / count"));
        assert!(note.embedding.is_none());
        assert!(note.topic.is_none());
        assert!(!note.has_valid_embedding());
    }

    #[test]
    fn test_stale_embedding_is_not_valid() {
        let mut note = Note::new(create("Mean", None, "sum / count"));
        note.embedding = Some(vec![1.0, 0.0]);
        note.embedding_hash = Some(note.current_hash());
        assert!(note.has_valid_embedding());

        note.content = "changed".to_string();
        assert!(!note.has_valid_embedding());
    }

    #[test]
    fn test_update_apply_clears_with_empty_string() {
        let mut note = Note::new(NoteCreate {
            metadata: Some("summary".to_string()),
            ..create("Mean", Some("statistics"), "body")
        });

        NoteUpdate {
            topic: Some(String::new()),
            metadata: Some(" ".to_string()),
            ..Default::default()
        }
        .apply(&mut note);

        assert!(note.topic.is_none());
        assert!(note.metadata.is_none());
        assert_eq!(note.title, "Mean");
    }

    #[test]
    fn test_csv_roundtrip_keeps_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.csv");

        let store = BackendCsv::load(&path).unwrap();
        let mut note = Note::new(create("Mean", Some("descriptive-statistics"), "a, \"quoted\"\nbody"));
        note.embedding = Some(vec![0.5, -0.25]);
        note.embedding_hash = Some(note.current_hash());
        let id = store.put(note).unwrap().id;

        let reloaded = BackendCsv::load(&path).unwrap();
        let note = reloaded.get(&id).unwrap().unwrap();
        assert_eq!(note.content, "a, \"quoted\"\nbody");
        assert_eq!(note.topic.as_deref(), Some("descriptive-statistics"));
        assert_eq!(note.embedding, Some(vec![0.5, -0.25]));
        assert!(note.has_valid_embedding());
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackendCsv::load(dir.path().join("notes.csv")).unwrap();
        let id = store.put(Note::new(create("Mean", None, "body"))).unwrap().id;

        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_store_embedding_compare_and_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackendCsv::load(dir.path().join("notes.csv")).unwrap();
        let note = store.put(Note::new(create("Mean", None, "body"))).unwrap();
        let hash = note.current_hash();

        // first writer wins
        assert!(store
            .store_embedding(&note.id, None, vec![1.0], hash.clone())
            .unwrap());
        // second writer still expects "no embedding" and loses
        assert!(!store
            .store_embedding(&note.id, None, vec![2.0], hash.clone())
            .unwrap());

        let stored = store.get(&note.id).unwrap().unwrap();
        assert_eq!(stored.embedding, Some(vec![1.0]));
    }

    #[test]
    fn test_store_embedding_rejects_hash_of_old_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackendCsv::load(dir.path().join("notes.csv")).unwrap();
        let mut note = store.put(Note::new(create("Mean", None, "body"))).unwrap();
        let old_hash = note.current_hash();

        note.content = "new body".to_string();
        store.put(note.clone()).unwrap();

        assert!(!store
            .store_embedding(&note.id, None, vec![1.0], old_hash)
            .unwrap());
    }

    #[test]
    fn test_store_embedding_unknown_note() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackendCsv::load(dir.path().join("notes.csv")).unwrap();

        let result = store.store_embedding(&NoteId::from("missing"), None, vec![1.0], "h".into());
        assert!(matches!(result, Err(NoteError::NotFound(_))));
    }
}

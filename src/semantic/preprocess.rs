//! Text preparation for embedding generation.
//!
//! Builds the "embeddable text" of a note:
//! 1. Clean the body (chat prefixes, math delimiters, markdown emphasis)
//! 2. Prefer the metadata override over the content when present
//! 3. Label and join topic, title and body
//!
//! The same module frames and expands student questions so that query
//! vectors live in the same space as note vectors.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Framing prepended to every query before it is embedded.
pub const QUERY_PREFIX: &str = "Student question about Leaving Cert Maths:\n";

/// Short maths terms and the phrases appended when a query mentions them.
const QUERY_EXPANSIONS: [(&str, &str); 8] = [
    ("mean", "mean average central value sum divided count"),
    ("median", "median middle value sorted data"),
    ("mode", "mode most frequent common value"),
    (
        "standard deviation",
        "standard deviation SD spread variance dispersion",
    ),
    ("variance", "variance spread squared deviation"),
    ("range", "range difference maximum minimum"),
    ("quartile", "quartile Q1 Q2 Q3 percentile 25% 75%"),
    ("correlation", "correlation relationship association r value"),
];

static CHAT_PREFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(ChatGPT said:|AI said:|Assistant:)\s*\n?")
        .expect("Failed to compile chat prefix regex")
});

static DISPLAY_MATH_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\$([^$]+)\$\$").expect("Failed to compile display math regex")
});

static INLINE_MATH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([^$]+)\$").expect("Failed to compile inline math regex"));

static EMPHASIS_REGEXES: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"\*\*([^*]+)\*\*").expect("Failed to compile bold regex"),
        Regex::new(r"\*([^*]+)\*").expect("Failed to compile italic regex"),
        Regex::new(r"__([^_]+)__").expect("Failed to compile alt bold regex"),
        Regex::new(r"_([^_]+)_").expect("Failed to compile alt italic regex"),
    ]
});

static BLANK_LINES_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("Failed to compile blank lines regex"));

static SPACES_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" +").expect("Failed to compile spaces regex"));

/// Strip formatting artifacts that add noise to embeddings while keeping the
/// words themselves.
pub fn clean_content(content: &str) -> String {
    let content = CHAT_PREFIX_REGEX.replace_all(content, "");
    let content = DISPLAY_MATH_REGEX.replace_all(&content, "$1");
    let content = INLINE_MATH_REGEX.replace_all(&content, "$1");

    let mut content = content.into_owned();
    for regex in EMPHASIS_REGEXES.iter() {
        content = regex.replace_all(&content, "$1").into_owned();
    }

    let content = BLANK_LINES_REGEX.replace_all(&content, "\n");
    let content = SPACES_REGEX.replace_all(&content, " ");

    content.trim().to_string()
}

/// Build the exact text fed to the embedding service for a note.
///
/// `metadata` wins over `content` when it is non-empty after trimming.
pub fn embeddable_text(
    title: &str,
    topic: Option<&str>,
    metadata: Option<&str>,
    content: &str,
) -> String {
    let mut parts = vec![
        format!("Topic: {}", topic.unwrap_or_default().trim()),
        format!("Title: {}", title.trim()),
    ];

    match metadata.map(str::trim).filter(|m| !m.is_empty()) {
        Some(metadata) => parts.push(format!("Key concepts: {metadata}")),
        None => {
            let cleaned = clean_content(content);
            if !cleaned.is_empty() {
                parts.push(format!("Content: {cleaned}"));
            }
        }
    }

    parts.join("\n")
}

/// SHA-256 of the embeddable text, hex encoded.
/// Used to decide whether a note needs re-embedding.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Wrap a question in the fixed query framing.
pub fn frame_query(text: &str) -> String {
    format!("{QUERY_PREFIX}{}", text.trim())
}

/// Append expansion phrases for known maths terms found in the query.
pub fn expand_query(query: &str) -> String {
    let query_lower = query.to_lowercase();

    let expansions: Vec<&str> = QUERY_EXPANSIONS
        .iter()
        .filter(|(term, _)| query_lower.contains(term))
        .map(|(_, expansion)| *expansion)
        .collect();

    if expansions.is_empty() {
        return query.to_string();
    }

    format!("{query} {}", expansions.join(" "))
}

/// Normalize a topic hint (slug or free text) for substring matching.
pub fn normalize_topic_hint(hint: &str) -> String {
    hint.replace(['-', '_'], " ").trim().to_lowercase()
}

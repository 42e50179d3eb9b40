//! Answer generation from retrieved notes through an OpenAI-compatible
//! chat completions endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::semantic::ScoredNote;

pub const DEFAULT_PREAMBLE: &str = "You are a Leaving Cert Honours Maths tutor.";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("client initialization failed: {0}")]
    InitFailed(String),

    #[error("generation request failed: {0}")]
    RequestFailed(String),

    #[error("generation request timed out after {0} seconds")]
    Timeout(u64),

    #[error("generation returned no answer")]
    EmptyResponse,
}

pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Build the tutor prompt from the top `context_notes` retrieved notes.
pub fn build_prompt(
    preamble: &str,
    question: &str,
    scored: &[ScoredNote],
    context_notes: usize,
) -> String {
    let notes = scored
        .iter()
        .take(context_notes)
        .map(|s| s.note.content.trim())
        .filter(|content| !content.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\nRelevant notes:\n{}\n\nQuestion:\n{}",
        preamble.trim(),
        notes,
        question.trim()
    )
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct HttpGenerator {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    timeout: Duration,
}

impl HttpGenerator {
    pub fn new(
        url: &str,
        model: &str,
        api_key: Option<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::InitFailed(e.to_string()))?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            temperature,
            timeout,
        })
    }
}

impl Generator for HttpGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .json(&ChatRequest {
                model: &self.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                temperature: self.temperature,
            });

        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.timeout.as_secs())
            } else {
                GenerationError::RequestFailed(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(GenerationError::RequestFailed(format!(
                "chat API returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let resp: ChatResponse = resp
            .json()
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}

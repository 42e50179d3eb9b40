use crate::{
    generate::DEFAULT_PREAMBLE,
    semantic::{DEFAULT_FALLBACK_CATEGORY, DEFAULT_MODEL, DEFAULT_THRESHOLD, DEFAULT_TOP_N},
    storage::{self, StorageManager},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.yaml";

/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_GENERATION_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_CONTEXT_NOTES: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("config file is not valid utf8")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// In-process fastembed model
    #[default]
    Local,
    /// OpenAI-compatible `/embeddings` endpoint
    Http,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Model name, e.g. "bge-base-en-v1.5" or "text-embedding-3-small"
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Base url for the `http` provider
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Local,
            model: default_embedding_model(),
            url: default_api_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_api_url")]
    pub url: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of top notes passed to the model as grounding
    #[serde(default = "default_context_notes")]
    pub context_notes: usize,

    #[serde(default = "default_preamble")]
    pub preamble: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            model: default_generation_model(),
            api_key_env: default_api_key_env(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            context_notes: DEFAULT_CONTEXT_NOTES,
            preamble: default_preamble(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Minimum similarity to answer directly from a note, in [-1.0, 1.0]
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Topic searched when a topic-scoped query finds nothing
    #[serde(default = "default_fallback_category")]
    pub fallback_category: String,

    #[serde(default = "default_true")]
    pub expand_queries: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            top_n: DEFAULT_TOP_N,
            fallback_category: default_fallback_category(),
            expand_queries: true,
        }
    }
}

fn default_embedding_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_generation_model() -> String {
    DEFAULT_GENERATION_MODEL.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_context_notes() -> usize {
    DEFAULT_CONTEXT_NOTES
}

fn default_preamble() -> String {
    DEFAULT_PREAMBLE.to_string()
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_fallback_category() -> String {
    DEFAULT_FALLBACK_CATEGORY.to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

/// `INFOBOT_BASE_PATH`, else `~/.local/share/infobot`.
pub fn default_base_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var("INFOBOT_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = homedir::my_home()
        .map_err(|e| ConfigError::Invalid(format!("could not determine home directory: {e}")))?
        .ok_or_else(|| ConfigError::Invalid("home directory path is empty".to_string()))?;

    Ok(home.join(".local/share/infobot"))
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ret = &self.retrieval;
        if !(-1.0..=1.0).contains(&ret.threshold) {
            return Err(ConfigError::Invalid(format!(
                "retrieval.threshold must be between -1.0 and 1.0, got {}",
                ret.threshold
            )));
        }
        if ret.top_n == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.top_n must be greater than 0".to_string(),
            ));
        }
        if ret.fallback_category.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "retrieval.fallback_category must not be empty".to_string(),
            ));
        }

        let emb = &self.embedding;
        if emb.timeout_secs == 0 || emb.download_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "embedding timeouts must be greater than 0".to_string(),
            ));
        }
        if emb.provider == EmbeddingProvider::Http && emb.url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "embedding.url is required for the http provider".to_string(),
            ));
        }

        let generation = &self.generation;
        if generation.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "generation.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if generation.context_notes == 0 {
            return Err(ConfigError::Invalid(
                "generation.context_notes must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn load_with(base_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let base_path = base_path.as_ref();
        let store = storage::BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            log::info!("Writing default config to {}", store.path_of(CONFIG_FILE).display());
            store.write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str = String::from_utf8(store.read(CONFIG_FILE)?)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve an API key from the named environment variable.
    pub fn api_key(env_name: &str) -> Option<String> {
        std::env::var(env_name).ok().filter(|key| !key.is_empty())
    }
}

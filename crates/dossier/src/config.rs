//! TOML configuration parsing and validation.
//!
//! All tunables live in one file; `load_config` parses it, validates the
//! cross-field invariants, and resolves credentials from the environment
//! variables the config names. After load, components receive explicit
//! configuration through constructors; nothing reads the environment
//! later.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub scope: ScopeConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    /// SQLite database holding document and chunk records.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScopeConfig {
    /// Owner scope every ingested chunk and every query is bound to.
    pub owner_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: default_window_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_window_chars() -> usize {
    400
}
fn default_overlap_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptConfig {
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            overlap_tokens: default_overlap_tokens(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

fn default_token_budget() -> usize {
    1500
}
fn default_overlap_tokens() -> usize {
    200
}
fn default_chars_per_token() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"` or `"ollama"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Embedding dimensionality the deployment is pinned to. Stored and
    /// query vectors must both match it.
    #[serde(default)]
    pub dims: Option<usize>,
    /// Endpoint override (tests, proxies, self-hosted gateways).
    #[serde(default)]
    pub api_url: Option<String>,
    /// Environment variable the API key is read from at load time.
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Delay between embedding batches, to bound load on the service.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Resolved from `api_key_env` during `load_config`.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            api_url: None,
            api_key_env: default_embedding_key_env(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    50
}
fn default_batch_delay_ms() -> u64 {
    200
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Base URL of the vector index service.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Environment variable the index API key is read from at load time.
    #[serde(default = "default_index_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_index_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,
    /// Resolved from `api_key_env` during `load_config`.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key_env: default_index_key_env(),
            timeout_secs: default_index_timeout_secs(),
            upsert_batch_size: default_upsert_batch_size(),
            delete_batch_size: default_delete_batch_size(),
            api_key: None,
        }
    }
}

fn default_index_key_env() -> String {
    "VECTOR_INDEX_API_KEY".to_string()
}
fn default_index_timeout_secs() -> u64 {
    10
}
fn default_upsert_batch_size() -> usize {
    100
}
fn default_delete_batch_size() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k_meetings")]
    pub top_k_meetings: usize,
    #[serde(default = "default_top_k_documents")]
    pub top_k_documents: usize,
    #[serde(default = "default_top_k_knowledge_base")]
    pub top_k_knowledge_base: usize,
    /// Global cap on bundled chunks.
    #[serde(default = "default_bundle_cap")]
    pub bundle_cap: usize,
    /// Per-namespace query timeout, so one slow partition cannot block the
    /// others.
    #[serde(default = "default_namespace_timeout_secs")]
    pub namespace_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_meetings: default_top_k_meetings(),
            top_k_documents: default_top_k_documents(),
            top_k_knowledge_base: default_top_k_knowledge_base(),
            bundle_cap: default_bundle_cap(),
            namespace_timeout_secs: default_namespace_timeout_secs(),
        }
    }
}

fn default_top_k_meetings() -> usize {
    dossier_core::models::Namespace::Meetings.default_top_k()
}
fn default_top_k_documents() -> usize {
    dossier_core::models::Namespace::Documents.default_top_k()
}
fn default_top_k_knowledge_base() -> usize {
    dossier_core::models::Namespace::KnowledgeBase.default_top_k()
}
fn default_bundle_cap() -> usize {
    dossier_core::bundle::DEFAULT_BUNDLE_CAP
}
fn default_namespace_timeout_secs() -> u64 {
    10
}

impl RetrievalConfig {
    /// Configured top-K for a namespace.
    pub fn top_k(&self, namespace: dossier_core::models::Namespace) -> usize {
        use dossier_core::models::Namespace;
        match namespace {
            Namespace::Meetings => self.top_k_meetings,
            Namespace::Documents => self.top_k_documents,
            Namespace::KnowledgeBase => self.top_k_knowledge_base,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    // Resolve credentials once, up front. Components never read the
    // environment themselves.
    config.embedding.api_key = std::env::var(&config.embedding.api_key_env).ok();
    config.index.api_key = std::env::var(&config.index.api_key_env).ok();

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.scope.owner_id.trim().is_empty() {
        anyhow::bail!("scope.owner_id must be set");
    }

    if config.chunking.window_chars == 0 {
        anyhow::bail!("chunking.window_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.window_chars {
        anyhow::bail!(
            "chunking.overlap_chars ({}) must be smaller than chunking.window_chars ({})",
            config.chunking.overlap_chars,
            config.chunking.window_chars
        );
    }

    if config.transcript.token_budget == 0 || config.transcript.chars_per_token == 0 {
        anyhow::bail!("transcript.token_budget and transcript.chars_per_token must be > 0");
    }
    if config.transcript.overlap_tokens >= config.transcript.token_budget {
        anyhow::bail!(
            "transcript.overlap_tokens ({}) must be smaller than transcript.token_budget ({})",
            config.transcript.overlap_tokens,
            config.transcript.token_budget
        );
    }

    match config.embedding.provider.as_str() {
        "openai" | "ollama" => {}
        other => anyhow::bail!("Unknown embedding provider: '{}'. Must be openai or ollama.", other),
    }
    if config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified for provider '{}'",
            config.embedding.provider
        );
    }
    match config.embedding.dims {
        None | Some(0) => anyhow::bail!("embedding.dims must be > 0"),
        Some(_) => {}
    }

    if config.retrieval.bundle_cap == 0 {
        anyhow::bail!("retrieval.bundle_cap must be >= 1");
    }

    Ok(())
}

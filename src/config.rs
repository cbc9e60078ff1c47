//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to the engine's
//! defaults. `load_config` parses and then validates, failing with a message
//! that names the offending field.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use pagewise_core::assemble::DEFAULT_MAX_CONTEXT_CHARS;
use pagewise_core::catalog::Catalog;
use pagewise_core::chunk::{
    SlidingWindow, DEFAULT_CHUNK_SIZE, DEFAULT_MIN_TAIL_RATIO, DEFAULT_OVERLAP,
};
use pagewise_core::enrich::{DEFAULT_CONTEXT_CHARS, DEFAULT_MIN_TEMPLATE_SCORE};
use pagewise_core::progress::DEFAULT_RETENTION_SECS;
use pagewise_core::rank::{RetrievalParams, DEFAULT_GRAPH_BOOST};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_tail_ratio")]
    pub min_tail_ratio: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            min_tail_ratio: DEFAULT_MIN_TAIL_RATIO,
        }
    }
}

impl ChunkingConfig {
    pub fn window(&self) -> Result<SlidingWindow> {
        Ok(SlidingWindow::new(self.size, self.overlap)?.with_min_tail_ratio(self.min_tail_ratio))
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}
fn default_min_tail_ratio() -> f64 {
    DEFAULT_MIN_TAIL_RATIO
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Pages requested from the layout source per call.
    #[serde(default = "default_page_batch_size")]
    pub page_batch_size: usize,
    /// Fragments written per storage transaction.
    #[serde(default = "default_storage_batch_size")]
    pub storage_batch_size: usize,
    #[serde(default = "default_min_template_score")]
    pub min_template_score: usize,
    #[serde(default = "default_inference_context_chars")]
    pub inference_context_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            page_batch_size: default_page_batch_size(),
            storage_batch_size: default_storage_batch_size(),
            min_template_score: DEFAULT_MIN_TEMPLATE_SCORE,
            inference_context_chars: DEFAULT_CONTEXT_CHARS,
        }
    }
}

fn default_page_batch_size() -> usize {
    5
}
fn default_storage_batch_size() -> usize {
    50
}
fn default_min_template_score() -> usize {
    DEFAULT_MIN_TEMPLATE_SCORE
}
fn default_inference_context_chars() -> usize {
    DEFAULT_CONTEXT_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_graph_boost")]
    pub graph_boost: f64,
    #[serde(default = "default_graph_marker_limit")]
    pub graph_marker_limit: usize,
    #[serde(default = "default_three")]
    pub graph_text_limit: usize,
    #[serde(default = "default_three")]
    pub text_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            graph_boost: DEFAULT_GRAPH_BOOST,
            graph_marker_limit: default_graph_marker_limit(),
            graph_text_limit: 3,
            text_limit: 3,
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            graph_boost: self.graph_boost,
            graph_marker_limit: self.graph_marker_limit,
            graph_text_limit: self.graph_text_limit,
            text_limit: self.text_limit,
        }
    }
}

fn default_max_context_chars() -> usize {
    DEFAULT_MAX_CONTEXT_CHARS
}
fn default_graph_boost() -> f64 {
    DEFAULT_GRAPH_BOOST
}
fn default_graph_marker_limit() -> usize {
    5
}
fn default_three() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout. Absent means calls may wait indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            timeout_secs: None,
            temperature: default_temperature(),
        }
    }
}

impl InferenceConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProgressConfig {
    /// Seconds a completed ingestion stays pollable.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: i64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            retention_secs: DEFAULT_RETENTION_SECS,
        }
    }
}

fn default_retention_secs() -> i64 {
    DEFAULT_RETENTION_SECS
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CatalogConfig {
    /// TOML file replacing the built-in template catalog.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl CatalogConfig {
    pub fn load(&self) -> Result<Catalog> {
        match &self.path {
            None => Ok(Catalog::builtin()),
            Some(path) => {
                let content = std::fs::read_to_string(path).with_context(|| {
                    format!("Failed to read template catalog: {}", path.display())
                })?;
                Catalog::from_toml_str(&content)
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.chunking.size == 0 {
        bail!("chunking.size must be > 0");
    }
    if !(0.0..1.0).contains(&config.chunking.min_tail_ratio) {
        bail!("chunking.min_tail_ratio must be in [0.0, 1.0)");
    }

    if config.ingest.page_batch_size == 0 {
        bail!("ingest.page_batch_size must be > 0");
    }
    if config.ingest.storage_batch_size == 0 {
        bail!("ingest.storage_batch_size must be > 0");
    }
    if config.ingest.min_template_score == 0 {
        bail!("ingest.min_template_score must be >= 1");
    }

    if config.retrieval.max_context_chars == 0 {
        bail!("retrieval.max_context_chars must be > 0");
    }
    if !config.retrieval.graph_boost.is_finite() || config.retrieval.graph_boost < 0.0 {
        bail!("retrieval.graph_boost must be a non-negative number");
    }

    match config.inference.provider.as_str() {
        "disabled" => {}
        "openai" | "ollama" => {
            if config.inference.model.is_none() {
                bail!(
                    "inference.model must be specified when provider is '{}'",
                    config.inference.provider
                );
            }
        }
        other => bail!(
            "Unknown inference provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.inference.timeout_secs == Some(0) {
        bail!("inference.timeout_secs must be > 0 when set");
    }

    if config.progress.retention_secs < 0 {
        bail!("progress.retention_secs must be >= 0");
    }

    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub boundary: BoundaryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Location of the embedded SQLite pattern store.
    pub path: PathBuf,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_divergence_limit")]
    pub divergence_limit: i64,
}

fn default_similarity_threshold() -> f32 {
    0.85
}
fn default_divergence_limit() -> i64 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct SelectorConfig {
    /// A document counts as text-native when at least this fraction of
    /// pages pass the native-text probe.
    #[serde(default = "default_native_text_threshold")]
    pub native_text_threshold: f32,
    /// A page passes the probe when it yields more than this many
    /// non-whitespace characters.
    #[serde(default = "default_probe_min_chars")]
    pub probe_min_chars: usize,
    /// Maximum engines to attempt in the fallback chain.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Wall-clock bound per engine invocation. A hung backend counts as
    /// an engine failure, never a pipeline hang.
    #[serde(default = "default_engine_timeout_secs")]
    pub engine_timeout_secs: u64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            native_text_threshold: default_native_text_threshold(),
            probe_min_chars: default_probe_min_chars(),
            max_retries: default_max_retries(),
            engine_timeout_secs: default_engine_timeout_secs(),
        }
    }
}

fn default_native_text_threshold() -> f32 {
    0.8
}
fn default_probe_min_chars() -> usize {
    50
}
fn default_max_retries() -> usize {
    3
}
fn default_engine_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct BoundaryConfig {
    /// Candidates below this confidence are discarded, not reported.
    /// Conservative by design: a missed split merges two documents, a
    /// spurious split severs a legal instrument mid-clause.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Two matches closer than this many lines collapse to the higher
    /// confidence one.
    #[serde(default = "default_min_line_gap")]
    pub min_line_gap: usize,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            min_line_gap: default_min_line_gap(),
        }
    }
}

fn default_min_confidence() -> f32 {
    0.8
}
fn default_min_line_gap() -> usize {
    3
}

impl Config {
    /// Construct a config with defaults everywhere except the store path.
    pub fn with_store_path(path: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreConfig {
                path: path.into(),
                similarity_threshold: default_similarity_threshold(),
                divergence_limit: default_divergence_limit(),
            },
            selector: SelectorConfig::default(),
            boundary: BoundaryConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if !(0.0..=1.0).contains(&config.store.similarity_threshold) {
        anyhow::bail!("store.similarity_threshold must be in [0.0, 1.0]");
    }

    if config.store.divergence_limit < 1 {
        anyhow::bail!("store.divergence_limit must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.selector.native_text_threshold) {
        anyhow::bail!("selector.native_text_threshold must be in [0.0, 1.0]");
    }

    if config.selector.max_retries == 0 {
        anyhow::bail!("selector.max_retries must be >= 1");
    }

    if config.selector.engine_timeout_secs == 0 {
        anyhow::bail!("selector.engine_timeout_secs must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.boundary.min_confidence) {
        anyhow::bail!("boundary.min_confidence must be in [0.0, 1.0]");
    }

    Ok(config)
}

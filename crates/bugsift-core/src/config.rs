use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::error::DetectError;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "BUGSIFT_CONFIG";

/// Config file location relative to the project root.
pub const CONFIG_RELATIVE_PATH: &str = ".bugsift/config.toml";

const WEIGHT_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Hybrid score at or above which a submission is blocked.
    #[serde(default = "default_block_threshold")]
    pub block: f64,
    /// Hybrid score at or above which a submission is created as a duplicate.
    #[serde(default = "default_flag_threshold")]
    pub flag: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            block: default_block_threshold(),
            flag: default_flag_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_metadata_weight")]
    pub metadata_weight: f64,
    #[serde(default)]
    pub fields: FieldWeights,
    /// Sub-score used when a field is missing on either side.
    #[serde(default = "default_neutral_score")]
    pub neutral_score: f64,
    /// Subtracted from the hybrid score when both regions are known and differ.
    #[serde(default = "default_cross_region_penalty")]
    pub cross_region_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            metadata_weight: default_metadata_weight(),
            fields: FieldWeights::default(),
            neutral_score: default_neutral_score(),
            cross_region_penalty: default_cross_region_penalty(),
        }
    }
}

/// Relative weight of each metadata field inside the metadata similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldWeights {
    #[serde(default = "default_device_weight")]
    pub device: f64,
    #[serde(default = "default_build_weight")]
    pub build_version: f64,
    #[serde(default = "default_region_weight")]
    pub region: f64,
    #[serde(default = "default_os_weight")]
    pub os_version: f64,
    #[serde(default = "default_severity_weight")]
    pub severity: f64,
}

impl FieldWeights {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.device + self.build_version + self.region + self.os_version + self.severity
    }
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            device: default_device_weight(),
            build_version: default_build_weight(),
            region: default_region_weight(),
            os_version: default_os_weight(),
            severity: default_severity_weight(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_min_title_length")]
    pub min_title_length: usize,
    #[serde(default = "default_min_description_length")]
    pub min_description_length: usize,
    #[serde(default = "default_min_repro_steps_length")]
    pub min_repro_steps_length: usize,
    #[serde(default = "default_true")]
    pub require_repro_steps: bool,
    #[serde(default)]
    pub require_logs: bool,
    #[serde(default = "default_true")]
    pub require_environment: bool,
    #[serde(default = "default_min_quality_score")]
    pub min_quality_score: f64,
    #[serde(default = "default_uppercase_ratio")]
    pub uppercase_ratio: f64,
    #[serde(default = "default_unique_word_ratio")]
    pub unique_word_ratio: f64,
    #[serde(default = "default_symbol_ratio")]
    pub symbol_ratio: f64,
    /// Longest run of one repeated character tolerated in free text.
    #[serde(default = "default_max_char_run")]
    pub max_char_run: usize,
    #[serde(default = "default_generic_titles")]
    pub generic_titles: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_title_length: default_min_title_length(),
            min_description_length: default_min_description_length(),
            min_repro_steps_length: default_min_repro_steps_length(),
            require_repro_steps: default_true(),
            require_logs: false,
            require_environment: default_true(),
            min_quality_score: default_min_quality_score(),
            uppercase_ratio: default_uppercase_ratio(),
            unique_word_ratio: default_unique_word_ratio(),
            symbol_ratio: default_symbol_ratio(),
            max_char_run: default_max_char_run(),
            generic_titles: default_generic_titles(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Neighbours fetched from the index per submission.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Duplicate descendants needed to promote a root to Recurring.
    #[serde(default = "default_recurring_threshold")]
    pub recurring_threshold: usize,
    #[serde(default = "default_embed_timeout_ms")]
    pub embed_timeout_ms: u64,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Hard stop for parent-chain walks.
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Principal recorded on automatic audit entries.
    #[serde(default = "default_actor")]
    pub actor: String,
    #[serde(default)]
    pub embedder: EmbedderKind,
    /// Directory holding the ONNX model and `tokenizer.json`. Defaults to
    /// `<cache dir>/bugsift/models`.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
}

/// Which embedding backend turns report text into vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Feature hashing; always available.
    #[default]
    Hash,
    /// ONNX sentence encoder; needs the `semantic-ort` build and a model.
    Ort,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            recurring_threshold: default_recurring_threshold(),
            embed_timeout_ms: default_embed_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            max_chain_depth: default_max_chain_depth(),
            dimensions: default_dimensions(),
            actor: default_actor(),
            embedder: EmbedderKind::default(),
            model_dir: None,
        }
    }
}

impl Config {
    /// Check cross-field constraints that serde defaults cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Config`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), DetectError> {
        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.flag) || !(0.0..=1.0).contains(&t.block) {
            return Err(DetectError::Config(format!(
                "thresholds must lie in [0, 1] (flag={}, block={})",
                t.flag, t.block
            )));
        }
        if t.flag > t.block {
            return Err(DetectError::Config(format!(
                "flag threshold {} exceeds block threshold {}",
                t.flag, t.block
            )));
        }

        let s = &self.scoring;
        for (name, weight) in [
            ("vector_weight", s.vector_weight),
            ("metadata_weight", s.metadata_weight),
            ("neutral_score", s.neutral_score),
            ("cross_region_penalty", s.cross_region_penalty),
            ("fields.device", s.fields.device),
            ("fields.build_version", s.fields.build_version),
            ("fields.region", s.fields.region),
            ("fields.os_version", s.fields.os_version),
            ("fields.severity", s.fields.severity),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(DetectError::Config(format!(
                    "scoring.{name} = {weight} is outside [0, 1]"
                )));
            }
        }
        if (s.vector_weight + s.metadata_weight - 1.0).abs() > WEIGHT_EPSILON {
            return Err(DetectError::Config(format!(
                "vector_weight + metadata_weight must equal 1 (got {})",
                s.vector_weight + s.metadata_weight
            )));
        }
        if s.fields.total() <= 0.0 {
            return Err(DetectError::Config(
                "at least one metadata field weight must be positive".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.quality.min_quality_score) {
            return Err(DetectError::Config(format!(
                "quality.min_quality_score = {} is outside [0, 1]",
                self.quality.min_quality_score
            )));
        }

        let e = &self.engine;
        if e.top_k == 0 {
            return Err(DetectError::Config("engine.top_k must be at least 1".into()));
        }
        if e.recurring_threshold == 0 {
            return Err(DetectError::Config(
                "engine.recurring_threshold must be at least 1".into(),
            ));
        }
        if e.dimensions == 0 {
            return Err(DetectError::Config("engine.dimensions must be at least 1".into()));
        }
        if e.max_chain_depth == 0 {
            return Err(DetectError::Config(
                "engine.max_chain_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Resolve the config file path for a project root.
///
/// `BUGSIFT_CONFIG` wins over `<root>/.bugsift/config.toml`.
#[must_use]
pub fn config_path(project_root: &Path) -> PathBuf {
    env::var_os(CONFIG_ENV).map_or_else(|| project_root.join(CONFIG_RELATIVE_PATH), PathBuf::from)
}

/// Load and validate configuration from `path`. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or fails validation.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Config::default()
    };

    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// Per-user preferences, read from `<config dir>/bugsift/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    /// Default principal for manual overrides.
    #[serde(default)]
    pub actor: Option<String>,
}

/// Load the per-user config. No config directory or no file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };
    load_user_config_from(&config_dir.join("bugsift/config.toml"))
}

fn load_user_config_from(path: &Path) -> Result<UserConfig> {
    if !path.exists() {
        return Ok(UserConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Pick the CLI output mode: `--json`, then `BUGSIFT_FORMAT`, then the config
/// file, then `pretty` on a terminal and `text` otherwise.
#[must_use]
pub fn resolve_output(cli_json: bool, config_output: Option<&str>) -> &'static str {
    resolve_output_from(cli_json, config_output, env::var("BUGSIFT_FORMAT").ok().as_deref())
}

fn resolve_output_from(
    cli_json: bool,
    config_output: Option<&str>,
    env_format: Option<&str>,
) -> &'static str {
    fn normalize(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json";
    }
    if let Some(mode) = env_format.and_then(normalize) {
        return mode;
    }
    if let Some(mode) = config_output.and_then(normalize) {
        return mode;
    }
    if std::io::stdout().is_terminal() {
        "pretty"
    } else {
        "text"
    }
}

const fn default_true() -> bool {
    true
}

const fn default_block_threshold() -> f64 {
    0.85
}

const fn default_flag_threshold() -> f64 {
    0.70
}

const fn default_vector_weight() -> f64 {
    0.7
}

const fn default_metadata_weight() -> f64 {
    0.3
}

const fn default_neutral_score() -> f64 {
    0.5
}

const fn default_cross_region_penalty() -> f64 {
    0.05
}

const fn default_device_weight() -> f64 {
    0.2
}

const fn default_build_weight() -> f64 {
    0.3
}

const fn default_region_weight() -> f64 {
    0.2
}

const fn default_os_weight() -> f64 {
    0.15
}

const fn default_severity_weight() -> f64 {
    0.15
}

const fn default_min_title_length() -> usize {
    10
}

const fn default_min_description_length() -> usize {
    50
}

const fn default_min_repro_steps_length() -> usize {
    20
}

const fn default_min_quality_score() -> f64 {
    0.7
}

const fn default_uppercase_ratio() -> f64 {
    0.7
}

const fn default_unique_word_ratio() -> f64 {
    0.3
}

const fn default_symbol_ratio() -> f64 {
    0.3
}

const fn default_max_char_run() -> usize {
    6
}

fn default_generic_titles() -> Vec<String> {
    [
        "bug", "error", "help", "issue", "problem", "broken", "crash", "not working",
        "doesn't work", "fix", "urgent", "asap", "test",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

const fn default_top_k() -> usize {
    10
}

const fn default_recurring_threshold() -> usize {
    3
}

const fn default_embed_timeout_ms() -> u64 {
    5_000
}

const fn default_query_timeout_ms() -> u64 {
    2_000
}

const fn default_max_chain_depth() -> usize {
    64
}

const fn default_dimensions() -> usize {
    384
}

fn default_actor() -> String {
    "bugsift".to_string()
}

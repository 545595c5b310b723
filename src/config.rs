//! Configuration types for bitastro-core.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tokenizer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Maximum number of memoized encodings (0 = caching disabled).
    pub cache_capacity: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 4096,
        }
    }
}

/// Per-request sampling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Number of tokens to generate (one inference call each).
    pub max_tokens: usize,
    /// Temperature for sampling. Values below the sampler's floor are raised to it.
    pub temperature: f32,
    /// Top-k sampling (0 or >= vocabulary size = disabled).
    pub top_k: usize,
    /// Nucleus sampling: keep the most probable tokens up to and including
    /// the one whose cumulative probability passes `top_p` (>= 1.0 = disabled).
    pub top_p: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 100,
            temperature: 0.8,
            top_k: 40,
            top_p: 1.0,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Merge-rule file loaded into the tokenizer on initialization.
    pub merges_path: PathBuf,
    /// Model resource handed to the session factory.
    pub model_path: PathBuf,
    /// Name of the session input carrying token ids.
    pub input_name: String,
    /// Name of the session output carrying logits.
    pub output_name: String,
    /// Only the last `n` ids are sent to the session when set.
    pub context_window: Option<usize>,
    /// Seed for the sampler RNG. Entropy-seeded when unset.
    pub seed: Option<u64>,
    /// Tokenizer settings.
    pub tokenizer: TokenizerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            merges_path: PathBuf::from("bit_astro.merges"),
            model_path: PathBuf::from("bit_astro.onnx"),
            input_name: "input_ids".to_string(),
            output_name: "logits".to_string(),
            context_window: None,
            seed: None,
            tokenizer: TokenizerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reads an engine configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

//! Error types for bitastro-core.
//!
//! The variants callers are expected to branch on:
//! - [`Error::Load`]: the merge-rule resource could not be read. The tokenizer
//!   keeps working in its previous (possibly byte-only) state.
//! - [`Error::EngineInit`]: initialization failed; the engine is back to
//!   `Uninitialized` and may be retried.
//! - [`Error::EngineNotReady`]: generation was requested before initialization.
//! - [`Error::Inference`]: a single generation call was aborted by the session.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias for bitastro-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bitastro-core.
#[derive(Error, Debug)]
pub enum Error {
    /// Merge-rule resource unreachable or unreadable.
    #[error("failed to load merge rules from {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Tokenizer load or session construction failed.
    ///
    /// The cause is shared between every caller that awaited the same attempt.
    #[error("engine initialization failed: {0}")]
    EngineInit(#[source] Arc<Error>),

    /// Generation attempted before the engine reached `Ready`.
    #[error("engine is not ready")]
    EngineNotReady,

    /// The inference session failed during a decode step.
    #[error("inference failed at decode step {step}: {source}")]
    Inference {
        step: usize,
        #[source]
        source: Box<Error>,
    },

    /// Failure reported by an inference session implementation.
    #[error("session error: {0}")]
    Session(String),

    /// Sampling error.
    #[error("sampling error: {0}")]
    Sampling(String),

    /// Tokenization error.
    #[error("tokenization error: {0}")]
    Tokenization(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Tensor operation error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the caller can simply try again later (initialize or wait).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EngineInit(_) | Self::EngineNotReady)
    }
}

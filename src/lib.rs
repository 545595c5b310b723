//! bitastro-core: on-device text generation without a backend.
//!
//! This crate implements the two pieces that drive generation:
//! - A byte-level BPE tokenizer compatible with an offline merge-rule file
//! - A generation engine that serializes requests against one stateful
//!   inference session and samples each token with temperature + top-k
//!
//! The neural network itself is supplied by the caller through
//! [`SessionFactory`] / [`InferenceSession`].

pub mod config;
pub mod error;

pub mod engine;
pub mod tokenizer;

pub use config::{EngineConfig, SamplingConfig, TokenizerConfig};
pub use engine::{
    EngineStatus, GenerationEngine, GenerationOutput, GenerationRequest, InferenceSession,
    Sampler, SessionFactory, SessionInputs, SessionOutputs,
};
pub use error::{Error, Result};
pub use tokenizer::{LoadSummary, MergeRule, TokenId, Tokenizer};

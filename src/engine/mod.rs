//! Generation engine.
//!
//! This module contains:
//! - GenerationEngine for session lifecycle and the decode loop
//! - Sampler for token sampling
//! - The inference-session contract the engine drives

pub mod generator;
pub mod sampler;
pub mod session;

pub use generator::{EngineStatus, GenerationEngine, GenerationOutput, GenerationRequest};
pub use sampler::Sampler;
pub use session::{InferenceSession, SessionFactory, SessionInputs, SessionOutputs};

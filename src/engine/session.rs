//! Inference-session contract.
//!
//! The neural network is opaque to this crate: a session takes a named
//! `(1, seq_len)` tensor of token ids and returns named tensors, one of which
//! holds `(1, seq_len, vocab_size)` logits. Sessions are not safe for
//! concurrent use; the engine hands out `&mut` access one request at a time.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use candle_core::{DType, Device, IndexOp, Tensor};

use crate::error::{Error, Result};
use crate::tokenizer::TokenId;

/// Named input tensors for one session run.
pub type SessionInputs = HashMap<String, Tensor>;

/// Named output tensors from one session run.
pub type SessionOutputs = HashMap<String, Tensor>;

/// A stateful inference session.
#[async_trait]
pub trait InferenceSession: Send {
    /// Evaluates the network on `inputs`.
    async fn run(&mut self, inputs: SessionInputs) -> Result<SessionOutputs>;
}

/// Constructs inference sessions from a model resource.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self, model_path: &Path) -> Result<Box<dyn InferenceSession>>;
}

/// Builds the `(1, seq_len)` i64 input tensor for `ids`.
pub fn input_ids_tensor(ids: &[TokenId]) -> Result<Tensor> {
    let data: Vec<i64> = ids.iter().map(|&id| i64::from(id)).collect();
    Ok(Tensor::from_vec(data, (1, ids.len()), &Device::Cpu)?)
}

/// Extracts the logits row for the final sequence position.
///
/// Looks up `name`; if it is absent and the session returned exactly one
/// output, that output is used instead.
pub fn last_position_logits(outputs: &SessionOutputs, name: &str) -> Result<Vec<f32>> {
    let logits = match outputs.get(name) {
        Some(tensor) => tensor,
        None if outputs.len() == 1 => outputs
            .values()
            .next()
            .ok_or_else(|| Error::Session("session returned no outputs".to_string()))?,
        None => {
            return Err(Error::Session(format!(
                "session output {name:?} missing (got {} outputs)",
                outputs.len()
            )))
        }
    };

    let (batch, seq_len, vocab_size) = logits.dims3().map_err(|_| {
        Error::Session(format!(
            "expected logits of shape (1, seq_len, vocab_size), got {:?}",
            logits.dims()
        ))
    })?;
    if batch != 1 || seq_len == 0 || vocab_size == 0 {
        return Err(Error::Session(format!(
            "expected logits of shape (1, seq_len, vocab_size), got {:?}",
            logits.dims()
        )));
    }

    let row = logits.i((0, seq_len - 1))?.to_dtype(DType::F32)?.to_vec1::<f32>()?;
    Ok(row)
}

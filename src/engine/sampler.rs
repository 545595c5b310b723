//! Token sampling.
//!
//! ## Sampling Pipeline
//!
//! ```text
//! Logits [vocab_size]
//!     │
//!     ▼ Temperature scaling (floored at MIN_TEMPERATURE)
//! Logits / temperature
//!     │
//!     ▼ Top-k filtering (optional)
//! Everything outside the k best set to -inf
//!     │
//!     ▼ Stable softmax
//! exp(logit - max_finite), -inf -> exactly 0
//!     │
//!     ▼ Top-p filtering (optional)
//! Mass outside the nucleus -> exactly 0
//!     │
//!     ▼ Multinomial draw
//! First index whose cumulative mass reaches uniform * total
//! ```

use std::cmp::Ordering;

use candle_core::{DType, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SamplingConfig;
use crate::error::{Error, Result};
use crate::tokenizer::TokenId;

/// Temperatures below this are treated as this value.
pub const MIN_TEMPERATURE: f32 = 1e-6;

/// Temperature, top-k and top-p multinomial sampler with its own random source.
#[derive(Debug, Clone)]
pub struct Sampler {
    rng: StdRng,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler {
    /// Creates a sampler seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a sampler with a specific seed for reproducibility.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeded when `seed` is set, entropy-seeded otherwise.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::new, Self::with_seed)
    }

    /// Sample a token from one row of logits.
    pub fn sample(&mut self, logits: &[f32], config: &SamplingConfig) -> Result<TokenId> {
        let index = sample_index(logits, config, &mut self.rng)
            .ok_or_else(|| Error::Sampling("cannot sample from empty logits".to_string()))?;
        TokenId::try_from(index)
            .map_err(|_| Error::Sampling(format!("sampled index {index} exceeds token id range")))
    }

    /// Sample a token from a 1D logits tensor.
    pub fn sample_tensor(&mut self, logits: &Tensor, config: &SamplingConfig) -> Result<TokenId> {
        let row: Vec<f32> = logits.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?;
        self.sample(&row, config)
    }
}

/// Scales by temperature and suppresses everything outside the top `top_k`.
///
/// NaN scores are suppressed as well. `top_k` of 0 or >= `logits.len()`
/// disables filtering. Exactly `top_k` entries survive; ties keep the lower index.
pub fn filtered_logits(logits: &[f32], temperature: f32, top_k: usize) -> Vec<f32> {
    let temperature = temperature.max(MIN_TEMPERATURE);
    let mut scaled: Vec<f32> = logits
        .iter()
        .map(|&l| if l.is_nan() { f32::NEG_INFINITY } else { l / temperature })
        .collect();

    if top_k > 0 && top_k < scaled.len() {
        let mut order: Vec<usize> = (0..scaled.len()).collect();
        order.sort_by(|&a, &b| scaled[b].partial_cmp(&scaled[a]).unwrap_or(Ordering::Equal));
        for &i in &order[top_k..] {
            scaled[i] = f32::NEG_INFINITY;
        }
    }

    scaled
}

/// Zeroes the mass outside the nucleus.
///
/// Entries are ranked by mass (ties keep the lower index) and kept until the
/// cumulative share exceeds `top_p`, the crossing entry included. `top_p` of
/// 1.0 or more (or NaN) disables filtering; 0 or less keeps only the top entry.
pub fn apply_top_p(weights: &mut [f64], top_p: f32) {
    if top_p.is_nan() || top_p >= 1.0 {
        return;
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return;
    }

    let mut order: Vec<usize> = (0..weights.len()).filter(|&i| weights[i] > 0.0).collect();
    order.sort_by(|&a, &b| weights[b].partial_cmp(&weights[a]).unwrap_or(Ordering::Equal));

    let threshold = f64::from(top_p) * total;
    let mut cumulative = 0.0;
    let mut keep = order.len();
    for (rank, &i) in order.iter().enumerate() {
        cumulative += weights[i];
        if cumulative > threshold {
            keep = rank + 1;
            break;
        }
    }
    for &i in &order[keep..] {
        weights[i] = 0.0;
    }
}

/// Unnormalized probability mass per index.
fn weights(logits: &[f32], config: &SamplingConfig) -> Vec<f64> {
    let scaled = filtered_logits(logits, config.temperature, config.top_k);

    // Overflow to +inf after scaling: those entries share all the mass.
    let mut weights: Vec<f64> = if scaled.iter().any(|&l| l == f32::INFINITY) {
        scaled
            .iter()
            .map(|&l| if l == f32::INFINITY { 1.0 } else { 0.0 })
            .collect()
    } else {
        let max = scaled
            .iter()
            .copied()
            .filter(|l| l.is_finite())
            .fold(f32::NEG_INFINITY, f32::max);

        scaled
            .iter()
            .map(|&l| {
                if l.is_finite() {
                    (f64::from(l) - f64::from(max)).exp()
                } else {
                    0.0
                }
            })
            .collect()
    };

    apply_top_p(&mut weights, config.top_p);
    weights
}

/// Softmax over the filtered, temperature-scaled logits.
///
/// Suppressed entries get exactly zero. All zeros if nothing survives.
/// `max_tokens` is ignored.
pub fn probabilities(logits: &[f32], config: &SamplingConfig) -> Vec<f64> {
    let weights = weights(logits, config);
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        weights.iter().map(|w| w / total).collect()
    } else {
        weights
    }
}

/// Draws an index from `logits`. `None` only for empty input.
///
/// If rounding leaves the draw unreached, the last index carrying mass is
/// returned. If every entry is suppressed, the last index is returned.
pub fn sample_index<R: Rng + ?Sized>(
    logits: &[f32],
    config: &SamplingConfig,
    rng: &mut R,
) -> Option<usize> {
    let last = logits.len().checked_sub(1)?;
    let weights = weights(logits, config);
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Some(last);
    }

    let draw = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    let mut last_with_mass = last;
    for (i, &w) in weights.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        cumulative += w;
        last_with_mass = i;
        if cumulative >= draw {
            return Some(i);
        }
    }
    Some(last_with_mass)
}

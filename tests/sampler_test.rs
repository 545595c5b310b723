//! Integration tests for Sampler.

use std::collections::HashSet;

use bitastro_core::engine::sampler::{probabilities, sample_index};
use bitastro_core::{Error, Sampler, SamplingConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn test_sampling_config() -> SamplingConfig {
    SamplingConfig {
        temperature: 1.0,
        top_k: 0,
        top_p: 1.0,
        max_tokens: 100,
    }
}

#[test]
fn test_top_k_one_is_greedy_at_any_temperature() {
    let mut sampler = Sampler::with_seed(42);

    for temperature in [0.0f32, 0.1, 0.8, 1.0, 10.0, 1000.0] {
        let config = SamplingConfig {
            temperature,
            top_k: 1,
            ..test_sampling_config()
        };
        for _ in 0..50 {
            assert_eq!(sampler.sample(&[0.1, 5.0, 0.2], &config).unwrap(), 1);
        }
    }
}

#[test]
fn test_temperature_sampling() {
    let config = test_sampling_config();
    let mut sampler = Sampler::with_seed(42);

    // Uniform logits should spread across tokens
    let logits = [1.0f32, 1.0, 1.0, 1.0, 1.0];
    let mut seen = HashSet::new();
    for _ in 0..100 {
        seen.insert(sampler.sample(&logits, &config).unwrap());
    }

    assert!(seen.len() > 1, "Should sample different tokens");
}

#[test]
fn test_top_k_sampling() {
    let config = SamplingConfig {
        top_k: 2,
        temperature: 100.0, // flatten so both survivors are drawn
        ..test_sampling_config()
    };
    let mut sampler = Sampler::with_seed(42);

    // Tokens 3 and 4 have the highest values
    let logits = [0.1f32, 0.2, 0.3, 10.0, 9.0];
    let mut seen = HashSet::new();
    for _ in 0..200 {
        seen.insert(sampler.sample(&logits, &config).unwrap());
    }

    assert_eq!(seen, HashSet::from([3, 4]));
}

#[test]
fn test_top_k_out_of_range_disables_filtering() {
    let logits = [1.0f32, 1.0, 1.0];
    for top_k in [0, 3, 10] {
        let config = SamplingConfig {
            top_k,
            ..test_sampling_config()
        };
        let probs = probabilities(&logits, &config);
        assert!(probs.iter().all(|&p| (p - 1.0 / 3.0).abs() < 1e-9));
    }
}

#[test]
fn test_softmax_stability_with_large_logits() {
    let logits = [1000.0f32, 1000.1, 999.0];

    let probs = probabilities(&logits, &test_sampling_config());
    assert!(probs.iter().all(|p| p.is_finite() && *p > 0.0));
    assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);

    let mut sampler = Sampler::with_seed(3);
    for _ in 0..100 {
        let token = sampler.sample(&logits, &test_sampling_config()).unwrap();
        assert!((token as usize) < logits.len());
    }
}

#[test]
fn test_top_p_zeroes_mass_outside_nucleus() {
    // Softmax mass 0.5 / 0.3 / 0.2: the nucleus for 0.6 is {0, 1}.
    let logits = [0.5f32.ln(), 0.3f32.ln(), 0.2f32.ln()];
    let config = SamplingConfig {
        top_p: 0.6,
        ..test_sampling_config()
    };

    let probs = probabilities(&logits, &config);
    assert_eq!(probs[2], 0.0);
    assert!((probs[0] - 0.625).abs() < 1e-6);
    assert!((probs[1] - 0.375).abs() < 1e-6);

    let mut sampler = Sampler::with_seed(5);
    let mut seen = HashSet::new();
    for _ in 0..200 {
        seen.insert(sampler.sample(&logits, &config).unwrap());
    }
    assert_eq!(seen, HashSet::from([0, 1]));
}

#[test]
fn test_top_p_disabled_at_one() {
    let logits = [0.5f32.ln(), 0.3f32.ln(), 0.2f32.ln()];
    let probs = probabilities(&logits, &test_sampling_config());
    assert!(probs.iter().all(|&p| p > 0.0));
}

#[test]
fn test_low_temperature_sharpens() {
    let config = SamplingConfig {
        temperature: 0.01,
        ..test_sampling_config()
    };
    let mut sampler = Sampler::with_seed(11);
    for _ in 0..50 {
        assert_eq!(sampler.sample(&[1.0, 2.0, 0.5], &config).unwrap(), 1);
    }
}

#[test]
fn test_reproducibility_with_seed() {
    let config = test_sampling_config();
    let logits = [1.0f32, 1.0, 1.0, 1.0, 1.0];

    let mut sampler1 = Sampler::with_seed(12345);
    let mut sampler2 = Sampler::with_seed(12345);

    let tokens1: Vec<_> = (0..10).map(|_| sampler1.sample(&logits, &config).unwrap()).collect();
    let tokens2: Vec<_> = (0..10).map(|_| sampler2.sample(&logits, &config).unwrap()).collect();

    assert_eq!(tokens1, tokens2, "Same seed should produce same sequence");
}

#[test]
fn test_sample_index_with_injected_rng() {
    let mut rng = StdRng::seed_from_u64(99);
    let config = test_sampling_config();
    for _ in 0..20 {
        let index = sample_index(&[0.0, 0.0, 50.0, 0.0], &config, &mut rng).unwrap();
        assert_eq!(index, 2);
    }
}

#[test]
fn test_empty_logits_is_an_error() {
    let mut sampler = Sampler::with_seed(1);
    assert!(matches!(
        sampler.sample(&[], &test_sampling_config()),
        Err(Error::Sampling(_))
    ));
}

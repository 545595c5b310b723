//! Learning merge rules from a corpus.
//!
//! Each round counts adjacent pairs over the whole byte sequence, merges the
//! most frequent one and assigns it the next id. Equal counts go to the pair
//! that occurs first, so training is deterministic for a given corpus.

use std::collections::HashMap;

use log::debug;

use super::bpe::{merge_pair, MergeRule, TokenId, BYTE_VOCAB_SIZE};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct PairStats {
    count: usize,
    first_seen: usize,
}

/// Learns up to `vocab_size - 256` merge rules from `text`.
///
/// Stops early once the sequence has no adjacent pairs left.
pub fn train_merges(text: &str, vocab_size: usize) -> Result<Vec<MergeRule>> {
    if vocab_size < BYTE_VOCAB_SIZE {
        return Err(Error::Config(format!(
            "vocab_size must be at least {BYTE_VOCAB_SIZE}, got {vocab_size}"
        )));
    }
    let num_merges = vocab_size - BYTE_VOCAB_SIZE;
    let mut ids: Vec<TokenId> = text.bytes().map(TokenId::from).collect();
    // Every merge shortens `ids`, so the corpus bounds the rule count.
    let mut rules = Vec::with_capacity(num_merges.min(ids.len()));

    for i in 0..num_merges {
        let Some((pair, stats)) = most_frequent_pair(&ids) else {
            break;
        };
        let id = TokenId::try_from(BYTE_VOCAB_SIZE + i)
            .map_err(|_| Error::Config(format!("token id overflow at merge {i}")))?;
        ids = merge_pair(&ids, pair, id);
        rules.push(MergeRule::new(pair.0, pair.1, id));
        debug!(
            "merge {}: ({}, {}) -> {id} (count {})",
            i + 1,
            pair.0,
            pair.1,
            stats.count
        );
    }

    Ok(rules)
}

fn most_frequent_pair(ids: &[TokenId]) -> Option<((TokenId, TokenId), PairStats)> {
    let mut stats: HashMap<(TokenId, TokenId), PairStats> = HashMap::new();
    for (pos, w) in ids.windows(2).enumerate() {
        stats
            .entry((w[0], w[1]))
            .and_modify(|s| s.count += 1)
            .or_insert(PairStats {
                count: 1,
                first_seen: pos,
            });
    }
    stats.into_iter().max_by(|(_, a), (_, b)| {
        a.count
            .cmp(&b.count)
            .then_with(|| b.first_seen.cmp(&a.first_seen))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learns_most_frequent_pair_first() {
        let rules = train_merges("abababcd", 257).unwrap();
        assert_eq!(rules, vec![MergeRule::new(97, 98, 256)]);
    }

    #[test]
    fn test_tie_goes_to_first_occurrence() {
        // (c, d) and (a, b) both occur twice; (c, d) is seen first.
        let rules = train_merges("cdxabcdab", 257).unwrap();
        assert_eq!(rules, vec![MergeRule::new(99, 100, 256)]);
    }

    #[test]
    fn test_merges_build_on_each_other() {
        let rules = train_merges("aaaa", 258).unwrap();
        assert_eq!(
            rules,
            vec![MergeRule::new(97, 97, 256), MergeRule::new(256, 256, 257)]
        );
    }

    #[test]
    fn test_stops_when_no_pairs_remain() {
        let rules = train_merges("ab", 300).unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_huge_vocab_is_bounded_by_corpus() {
        let rules = train_merges("ab", usize::MAX).unwrap();
        assert_eq!(rules, vec![MergeRule::new(97, 98, 256)]);
        assert!(train_merges("", usize::MAX).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_small_vocab() {
        assert!(matches!(train_merges("ab", 10), Err(Error::Config(_))));
    }
}

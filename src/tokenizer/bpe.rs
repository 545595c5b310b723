//! Merge table and vocabulary for byte-level BPE.
//!
//! Ids 0..=255 are the raw bytes. Every later id is produced by a merge rule
//! and maps to the concatenation of its two parents' bytes. Rules carry a
//! priority equal to their load order; lower priority merges first.
//!
//! ## Encoding
//!
//! ```text
//! "abab" ──▶ [97, 98, 97, 98]          one id per UTF-8 byte
//!               │
//!               ▼  lowest-priority pair present: (97, 98) -> 256
//!            [256, 256]                 every non-overlapping occurrence
//!               │
//!               ▼  (256, 256) -> 257 if registered, else stop
//!            [257]
//! ```

use std::collections::HashMap;
use std::fmt;

/// Token identifier.
pub type TokenId = u32;

/// Number of single-byte ids every vocabulary starts with.
pub const BYTE_VOCAB_SIZE: usize = 256;

/// One merge rule: `left` followed by `right` becomes `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MergeRule {
    pub left: TokenId,
    pub right: TokenId,
    pub id: TokenId,
}

impl MergeRule {
    pub fn new(left: TokenId, right: TokenId, id: TokenId) -> Self {
        Self { left, right, id }
    }

    /// Parses a `left right id` line. `None` unless the line holds exactly three integers.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let left = fields.next()?.parse().ok()?;
        let right = fields.next()?.parse().ok()?;
        let id = fields.next()?.parse().ok()?;
        if fields.next().is_some() {
            return None;
        }
        Some(Self::new(left, right, id))
    }
}

impl fmt::Display for MergeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.right, self.id)
    }
}

/// Why a merge rule was not registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RuleRejection {
    /// A parent id is not in the vocabulary yet.
    UnknownToken(TokenId),
    /// The pair already has a rule.
    DuplicatePair(TokenId, TokenId),
    /// The new id is already taken.
    IdInUse(TokenId),
}

impl fmt::Display for RuleRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownToken(id) => write!(f, "unknown token id {id}"),
            Self::DuplicatePair(l, r) => write!(f, "pair ({l}, {r}) already registered"),
            Self::IdInUse(id) => write!(f, "token id {id} already in vocabulary"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MergeEntry {
    id: TokenId,
    priority: usize,
}

/// Immutable-after-build vocabulary plus merge table.
#[derive(Debug, Clone)]
pub(crate) struct BpeModel {
    vocab: HashMap<TokenId, Vec<u8>>,
    merges: HashMap<(TokenId, TokenId), MergeEntry>,
    rules: Vec<MergeRule>,
}

impl BpeModel {
    /// Vocabulary with the 256 single-byte ids and no merges.
    pub(crate) fn byte_level() -> Self {
        let vocab = (0..=u8::MAX).map(|b| (TokenId::from(b), vec![b])).collect();
        Self {
            vocab,
            merges: HashMap::new(),
            rules: Vec::new(),
        }
    }

    /// Registers `rule` with the next priority.
    pub(crate) fn push_rule(&mut self, rule: MergeRule) -> Result<(), RuleRejection> {
        let pair = (rule.left, rule.right);
        if self.merges.contains_key(&pair) {
            return Err(RuleRejection::DuplicatePair(rule.left, rule.right));
        }
        if self.vocab.contains_key(&rule.id) {
            return Err(RuleRejection::IdInUse(rule.id));
        }
        let left = self
            .vocab
            .get(&rule.left)
            .ok_or(RuleRejection::UnknownToken(rule.left))?;
        let right = self
            .vocab
            .get(&rule.right)
            .ok_or(RuleRejection::UnknownToken(rule.right))?;

        let mut bytes = Vec::with_capacity(left.len() + right.len());
        bytes.extend_from_slice(left);
        bytes.extend_from_slice(right);

        self.vocab.insert(rule.id, bytes);
        self.merges.insert(
            pair,
            MergeEntry {
                id: rule.id,
                priority: self.rules.len(),
            },
        );
        self.rules.push(rule);
        Ok(())
    }

    /// Encodes raw bytes by repeated merge rounds.
    pub(crate) fn encode_bytes(&self, bytes: &[u8]) -> Vec<TokenId> {
        let mut ids: Vec<TokenId> = bytes.iter().map(|&b| TokenId::from(b)).collect();

        while ids.len() >= 2 {
            let best = ids
                .windows(2)
                .filter_map(|w| {
                    self.merges
                        .get(&(w[0], w[1]))
                        .map(|entry| (entry.priority, (w[0], w[1]), entry.id))
                })
                .min_by_key(|&(priority, _, _)| priority);

            let Some((_, pair, id)) = best else {
                break;
            };
            ids = merge_pair(&ids, pair, id);
        }

        ids
    }

    /// Concatenates the bytes of every known id; unknown ids are skipped.
    pub(crate) fn decode_bytes(&self, ids: &[TokenId]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ids.len() * 2);
        for id in ids {
            if let Some(token) = self.vocab.get(id) {
                bytes.extend_from_slice(token);
            }
        }
        bytes
    }

    pub(crate) fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    pub(crate) fn num_merges(&self) -> usize {
        self.rules.len()
    }

    pub(crate) fn token_bytes(&self, id: TokenId) -> Option<&[u8]> {
        self.vocab.get(&id).map(Vec::as_slice)
    }

    /// Rules in priority order.
    pub(crate) fn rules(&self) -> &[MergeRule] {
        &self.rules
    }
}

/// Replaces every non-overlapping left-to-right occurrence of `pair` with `id`.
pub(crate) fn merge_pair(ids: &[TokenId], pair: (TokenId, TokenId), id: TokenId) -> Vec<TokenId> {
    let mut merged = Vec::with_capacity(ids.len());
    let mut i = 0;
    while i < ids.len() {
        if i + 1 < ids.len() && ids[i] == pair.0 && ids[i + 1] == pair.1 {
            merged.push(id);
            i += 2;
        } else {
            merged.push(ids[i]);
            i += 1;
        }
    }
    merged
}

//! Byte-level BPE tokenizer.
//!
//! This module contains:
//! - Vocabulary and merge table (`bpe`)
//! - Bounded encode cache (`cache`)
//! - Merge-rule learning (`trainer`)
//!
//! A [`Tokenizer`] starts out byte-only (256 ids) and gains merge rules from
//! a line-oriented `left right id` resource. All operations take `&self`; the
//! loaded merge table is swapped atomically so readers never observe a
//! half-built vocabulary.

pub mod bpe;
mod cache;
pub mod trainer;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use log::{debug, info, warn};

pub use bpe::{MergeRule, TokenId, BYTE_VOCAB_SIZE};
pub use trainer::train_merges;

use bpe::BpeModel;
use cache::EncodeCache;

use crate::config::TokenizerConfig;
use crate::error::{Error, Result};

/// Outcome of a successful merge-rule load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    /// Rules registered, in priority order.
    pub rules_loaded: usize,
    /// Lines ignored as malformed or inconsistent with the vocabulary.
    pub lines_skipped: usize,
}

#[derive(Debug)]
struct Snapshot {
    model: BpeModel,
    epoch: u64,
}

/// Byte-level BPE tokenizer with a bounded encode cache.
#[derive(Debug)]
pub struct Tokenizer {
    current: RwLock<Arc<Snapshot>>,
    cache: Mutex<EncodeCache>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(&TokenizerConfig::default())
    }
}

impl Tokenizer {
    /// Creates a byte-only tokenizer.
    pub fn new(config: &TokenizerConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot {
                model: BpeModel::byte_level(),
                epoch: 0,
            })),
            cache: Mutex::new(EncodeCache::new(config.cache_capacity)),
        }
    }

    /// Creates a tokenizer from rules already in memory.
    ///
    /// Rules that conflict with the vocabulary built so far are skipped.
    pub fn from_merges(rules: impl IntoIterator<Item = MergeRule>) -> Self {
        let tokenizer = Self::default();
        let mut model = BpeModel::byte_level();
        for rule in rules {
            if let Err(reason) = model.push_rule(rule) {
                warn!("skipping merge rule {rule}: {reason}");
            }
        }
        tokenizer.install(model);
        tokenizer
    }

    /// Loads merge rules from a file, replacing any previously loaded rules.
    ///
    /// On I/O failure nothing is committed and the tokenizer keeps its
    /// previous vocabulary (byte-only if nothing was loaded before).
    pub fn load(&self, path: impl AsRef<Path>) -> Result<LoadSummary> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| {
            warn!(
                "merge rules unavailable at {}, staying byte-level: {source}",
                path.display()
            );
            Error::Load {
                path: path.to_path_buf(),
                source,
            }
        })?;
        self.load_from_reader(BufReader::new(file), path)
    }

    /// Loads merge rules from any buffered reader. `origin` is used in errors and logs.
    pub fn load_from_reader<R: BufRead>(&self, reader: R, origin: impl AsRef<Path>) -> Result<LoadSummary> {
        let origin = origin.as_ref();
        let mut model = BpeModel::byte_level();
        let mut lines_skipped = 0;

        for (line_no, line) in reader.split(b'\n').enumerate() {
            let line = line.map_err(|source| Error::Load {
                path: PathBuf::from(origin),
                source,
            })?;
            let Some(rule) = std::str::from_utf8(&line).ok().and_then(MergeRule::parse) else {
                debug!("skipping malformed merge line {}", line_no + 1);
                lines_skipped += 1;
                continue;
            };
            if let Err(reason) = model.push_rule(rule) {
                warn!("skipping merge rule {rule} on line {}: {reason}", line_no + 1);
                lines_skipped += 1;
            }
        }

        let summary = LoadSummary {
            rules_loaded: model.num_merges(),
            lines_skipped,
        };
        self.install(model);
        info!(
            "loaded {} merge rules from {} ({} lines skipped, vocab size {})",
            summary.rules_loaded,
            origin.display(),
            summary.lines_skipped,
            self.vocab_size()
        );
        Ok(summary)
    }

    /// Learns merge rules from `text` and installs them.
    pub fn train(&self, text: &str, vocab_size: usize) -> Result<usize> {
        let rules = train_merges(text, vocab_size)?;
        let mut model = BpeModel::byte_level();
        for rule in rules {
            model
                .push_rule(rule)
                .map_err(|reason| Error::Tokenization(format!("trained rule {rule}: {reason}")))?;
        }
        let learned = model.num_merges();
        self.install(model);
        Ok(learned)
    }

    /// Writes the merge rules in priority order, one `left right id` line each.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = self.snapshot();
        let mut out = BufWriter::new(File::create(path)?);
        for rule in snapshot.model.rules() {
            writeln!(out, "{rule}")?;
        }
        out.flush()?;
        Ok(())
    }

    /// Encodes text into token ids.
    pub fn encode(&self, text: &str) -> Vec<TokenId> {
        if let Some(ids) = self.lock_cache().get(text) {
            return ids;
        }

        let snapshot = self.snapshot();
        let ids = snapshot.model.encode_bytes(text.as_bytes());
        self.lock_cache().insert(text, ids.clone(), snapshot.epoch);
        ids
    }

    /// Decodes token ids into text.
    ///
    /// Unknown ids are skipped and invalid UTF-8 is replaced with U+FFFD.
    pub fn decode(&self, ids: &[TokenId]) -> String {
        let bytes = self.snapshot().model.decode_bytes(ids);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Number of ids in the vocabulary (256 + merges).
    pub fn vocab_size(&self) -> usize {
        self.snapshot().model.vocab_size()
    }

    /// Number of registered merge rules.
    pub fn num_merges(&self) -> usize {
        self.snapshot().model.num_merges()
    }

    /// Raw bytes of a token.
    pub fn token_bytes(&self, id: TokenId) -> Option<Vec<u8>> {
        self.snapshot().model.token_bytes(id).map(<[u8]>::to_vec)
    }

    /// Merge rules in priority order.
    pub fn merges(&self) -> Vec<MergeRule> {
        self.snapshot().model.rules().to_vec()
    }

    /// Number of memoized encodings.
    pub fn cached_entries(&self) -> usize {
        self.lock_cache().len()
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_cache(&self) -> MutexGuard<'_, EncodeCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install(&self, model: BpeModel) {
        let mut cache = self.lock_cache();
        let epoch = cache.invalidate();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(Snapshot { model, epoch });
    }
}

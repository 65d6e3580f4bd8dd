//! Session-scoped memo of decrypted message bodies.
//!
//! Failures are cached too: an envelope that can't be opened now won't open on the next render
//! either, and retrying would just repeat the RSA work. Backlogs decrypt in parallel on a bounded
//! pool; results land in the map as they complete, in whatever order that is.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::codec::DecryptedPayload;
use crate::envelope::{MessageEnvelope, MessageId};
use crate::protocol::{DecryptOutcome, Reader};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    /// Each miss is one full unwrap + decrypt.
    pub misses: u64,
    pub entries: usize,
}

#[derive(Default)]
pub struct DecryptionCache {
    entries: RwLock<HashMap<MessageId, DecryptOutcome>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecryptionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &MessageId) -> Option<DecryptOutcome> {
        self.entries.read().get(id).cloned()
    }

    /// get_or_decrypt returns the cached outcome, or decrypts once and remembers the result
    pub fn get_or_decrypt(&self, envelope: &MessageEnvelope, reader: &Reader) -> DecryptOutcome {
        let cached = self.get(&envelope.id);
        if let Some(outcome) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return outcome;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let outcome = reader.decrypt(envelope);
        // First writer wins if two threads raced on the same id
        self.entries.write().entry(envelope.id.clone()).or_insert(outcome).clone()
    }

    /// get_or_decrypt_all resolves a whole backlog, returning outcomes in input order
    pub fn get_or_decrypt_all(&self, envelopes: &[MessageEnvelope], reader: &Reader, pool: &ThreadPool) -> Vec<DecryptOutcome> {
        let pending: Vec<&MessageEnvelope> = {
            let entries = self.entries.read();
            let mut seen = HashSet::new();
            envelopes
                .iter()
                .filter(|e| !entries.contains_key(&e.id) && seen.insert(&e.id))
                .collect()
        };
        self.hits.fetch_add((envelopes.len() - pending.len()) as u64, Ordering::Relaxed);
        self.misses.fetch_add(pending.len() as u64, Ordering::Relaxed);

        pool.install(|| {
            pending.par_iter().for_each(|envelope| {
                let outcome = reader.decrypt(envelope);
                self.entries.write().entry(envelope.id.clone()).or_insert(outcome);
            });
        });

        let entries = self.entries.read();
        envelopes
            .iter()
            .map(|e| match entries.get(&e.id) {
                Some(outcome) => outcome.clone(),
                // Only reachable if the cache was cleared mid-batch
                None => reader.decrypt(e),
            })
            .collect()
    }

    /// remember records plaintext the session already knows, e.g. a message it just sent
    pub fn remember(&self, id: MessageId, payload: DecryptedPayload) {
        self.entries.write().insert(id, DecryptOutcome::Plaintext(payload));
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

/* ------------------------------------------------------------------------- */

// TESTS

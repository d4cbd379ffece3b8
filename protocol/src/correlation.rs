//! Correlation primitives: display reference ids, the per-transaction
//! context a merchant carries between its two HTTP turnarounds, and the
//! replay cache providers keep of transactions they already answered.
//!
//! Reference ids are for operators and receipts. They carry no security
//! meaning; request hashes do that job.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::REFERENCE_ID_SEED;
use crate::crypto::RequestHash;

/// Process-wide, strictly increasing `"#n"` generator. Share it with `Arc`.
#[derive(Debug)]
pub struct ReferenceIdGenerator {
    next: AtomicU64,
}

impl ReferenceIdGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            next: AtomicU64::new(seed),
        }
    }

    /// Next reference. A single `fetch_add`, so no two callers ever see the
    /// same value.
    pub fn next(&self) -> String {
        format!("#{}", self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ReferenceIdGenerator {
    fn default() -> Self {
        Self::new(REFERENCE_ID_SEED)
    }
}

/// What the merchant remembers between issuing the payment request and
/// receiving the wallet's authorization. Consumed by the second turnaround.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionContext {
    pub request_hash: RequestHash,
    pub reference_id: String,
    /// Two-phase (reserve, then finalize) rather than direct debit.
    pub reserve_mode: bool,
    /// Capture every exchanged message for display.
    pub debug: bool,
}

// ---------------------------------------------------------------------------
// Replay Cache
// ---------------------------------------------------------------------------

/// How a request relates to what the cache already holds for its key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Seen<V> {
    /// Nothing stored for this key.
    New,
    /// The same request was answered before; here is that answer.
    Identical(V),
    /// A different request for the same key was answered before.
    Conflicting,
}

struct Remembered<V> {
    fingerprint: [u8; 32],
    value: V,
    expires: DateTime<Utc>,
}

/// Answers remembered per transaction key until the transaction expires.
///
/// The key names the transaction (a reservation, a payment request), the
/// fingerprint names the exact request bytes. Expired entries are swept on
/// every insert, so the cache holds at most the transactions that could
/// still be presented.
pub struct ReplayCache<V> {
    entries: DashMap<[u8; 32], Remembered<V>>,
}

impl<V: Clone> ReplayCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn lookup(&self, key: &[u8; 32], fingerprint: &[u8; 32]) -> Seen<V> {
        match self.entries.get(key) {
            None => Seen::New,
            Some(entry) => Self::compare(&entry, fingerprint),
        }
    }

    /// Store `value` unless a concurrent request got there first, in which
    /// case that one wins and is reported like a lookup would.
    pub fn insert(
        &self,
        key: [u8; 32],
        fingerprint: [u8; 32],
        value: V,
        expires: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Seen<V> {
        self.entries.retain(|_, entry| entry.expires > now);
        match self.entries.entry(key) {
            Entry::Occupied(entry) => Self::compare(entry.get(), &fingerprint),
            Entry::Vacant(slot) => {
                slot.insert(Remembered {
                    fingerprint,
                    value,
                    expires,
                });
                Seen::New
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn compare(entry: &Remembered<V>, fingerprint: &[u8; 32]) -> Seen<V> {
        if &entry.fingerprint == fingerprint {
            Seen::Identical(entry.value.clone())
        } else {
            Seen::Conflicting
        }
    }
}

impl<V: Clone> Default for ReplayCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

//! Keyed in-memory stores with per-entry expiry.
//!
//! Used for the job result table, the per-conversation send restriction
//! flag and the summary result cache. Expiry is measured on the tokio clock
//! so tests can drive it with `tokio::time::pause`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::core::models::{Fingerprint, SummaryDocument};

// Roughly thirty years
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlStore<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> Default for TtlStore<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> TtlStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        // A panic while holding the lock cannot leave an entry half-written
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Stores `value` until `ttl` has elapsed. A ttl too large for the clock
    /// keeps the entry for the life of the process.
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE);
        self.lock().insert(key, Entry { value, expires_at });
    }

    /// Returns the live value for `key`, dropping it if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restriction {
    pub reason: String,
}

/// Conversations the bot currently may not post to.
#[derive(Default)]
pub struct SendRestrictions {
    store: TtlStore<String, Restriction>,
}

impl SendRestrictions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_send_restricted(&self, conversation_id: &str, reason: &str, ttl: Duration) {
        info!(
            "Marking conversation {} send-restricted for {}s: {}",
            conversation_id,
            ttl.as_secs(),
            reason
        );
        self.store.insert(
            conversation_id.to_string(),
            Restriction {
                reason: reason.to_string(),
            },
            ttl,
        );
    }

    pub fn is_send_restricted(&self, conversation_id: &str) -> bool {
        self.restriction(conversation_id).is_some()
    }

    pub fn restriction(&self, conversation_id: &str) -> Option<Restriction> {
        self.store.get(&conversation_id.to_string())
    }
}

/// Finished summaries keyed by request fingerprint.
pub struct ResultCache {
    store: TtlStore<Fingerprint, SummaryDocument>,
    ttl: Duration,
}

impl ResultCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: TtlStore::new(),
            ttl,
        }
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<SummaryDocument> {
        self.store.get(fingerprint)
    }

    pub fn set(&self, fingerprint: Fingerprint, document: SummaryDocument) {
        self.store.purge_expired();
        self.store.insert(fingerprint, document, self.ttl);
    }
}

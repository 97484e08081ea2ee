//! Expiring counter store with JSON snapshot persistence.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors from loading or saving the state snapshot.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("State file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A stored value and when it stops being visible.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Entry {
    value: u128,
    /// Expiry timestamp (milliseconds since epoch); `None` never expires.
    expires_at_ms: Option<u64>,
}

impl Entry {
    fn is_live(&self, now_ms: u64) -> bool {
        self.expires_at_ms.map_or(true, |at| at > now_ms)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn deadline(ttl: Option<Duration>) -> Option<u64> {
    ttl.map(|ttl| now_ms().saturating_add(ttl.as_millis() as u64))
}

/// Key for the capacity used during `epoch`.
pub fn epoch_capacity_key(epoch: u64) -> String {
    format!("epochCapacity:{}", epoch)
}

/// Key for a block scanner's resume cursor.
pub fn last_seen_block_key(scanner: &str) -> String {
    format!("{}:lastSeenBlockNumber", scanner)
}

/// A thread-safe key → counter store.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    inner: Arc<DashMap<String, Entry>>,
    persistence_path: Option<String>,
}

impl StateStore {
    /// Create a new empty store.
    pub fn new(persistence_path: Option<String>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
        }
    }

    /// Load from file if it exists; expired entries are dropped on load.
    pub fn load_from_file(path: &str) -> Result<Self, StoreError> {
        let store = Self::new(Some(path.to_string()));
        if Path::new(path).exists() {
            let reader = BufReader::new(File::open(path)?);
            let map: HashMap<String, Entry> = serde_json::from_reader(reader)?;

            let now = now_ms();
            for (k, v) in map.into_iter().filter(|(_, v)| v.is_live(now)) {
                store.inner.insert(k, v);
            }
            tracing::info!(entries = store.inner.len(), path, "Loaded state snapshot");
        }
        Ok(store)
    }

    /// Save live entries to the persistence path, if one is configured.
    pub fn save_to_file(&self) -> Result<(), StoreError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let now = now_ms();
        let map: HashMap<String, Entry> = self
            .inner
            .iter()
            .filter(|r| r.value().is_live(now))
            .map(|r| (r.key().clone(), *r.value()))
            .collect();

        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &map)?;
        tracing::info!(entries = map.len(), path = %path, "Saved state snapshot");
        Ok(())
    }

    /// Current value of `key`, if present and not expired.
    pub fn get(&self, key: &str) -> Option<u128> {
        let now = now_ms();
        self.inner
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value)
    }

    /// Overwrite `key`, replacing any previous expiry.
    pub fn set(&self, key: &str, value: u128, ttl: Option<Duration>) {
        self.inner.insert(
            key.to_string(),
            Entry {
                value,
                expires_at_ms: deadline(ttl),
            },
        );
    }

    /// Atomically add `amount` to `key` and refresh its expiry. An expired
    /// entry counts as zero. Returns the new value.
    pub fn incr_by(&self, key: &str, amount: u128, ttl: Option<Duration>) -> u128 {
        let now = now_ms();
        let mut entry = self.inner.entry(key.to_string()).or_insert(Entry {
            value: 0,
            expires_at_ms: None,
        });
        let base = if entry.is_live(now) { entry.value } else { 0 };
        entry.value = base.saturating_add(amount);
        entry.expires_at_ms = deadline(ttl);
        entry.value
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = now_ms();
        let before = self.inner.len();
        self.inner.retain(|_, e| e.is_live(now));
        before - self.inner.len()
    }

    /// Number of stored entries, including not-yet-purged expired ones.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

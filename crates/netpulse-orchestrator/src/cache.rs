//! Bounded, TTL-scoped store of the last good snapshot per interface.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use netpulse_types::{config::CacheConfig, metrics::MetricSnapshot};
use tracing::debug;

#[derive(Clone)]
struct CacheEntry {
    snapshot: MetricSnapshot,
    inserted_at: Instant,
    /// `None` when the TTL overflows `Instant`; such entries never expire.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

pub struct SnapshotCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl SnapshotCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_entries)
    }

    /// Unexpired snapshot for `key`. Expired entries are dropped on access.
    pub fn get(&self, key: &str) -> Option<MetricSnapshot> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => Some(entry.snapshot.clone()),
            Some(_) => {
                entries.remove(key);
                debug!(key, "cache expired");
                None
            }
            None => None,
        }
    }

    /// Inserts or replaces `key`. At capacity the oldest entry is evicted.
    pub fn set(&self, key: impl Into<String>, snapshot: MetricSnapshot) {
        let key = key.into();
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        self.insert_locked(&mut entries, key, snapshot);
    }

    /// Like [`set`](Self::set), but keeps an unexpired entry whose reading is
    /// newer than `snapshot`. Returns whether `snapshot` was stored.
    pub fn set_if_newer(&self, key: impl Into<String>, snapshot: MetricSnapshot) -> bool {
        let key = key.into();
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        let now = Instant::now();
        if let Some(current) = entries.get(&key) {
            if current.is_live(now) && current.snapshot.timestamp > snapshot.timestamp {
                debug!(key = %key, "cache holds a newer reading");
                return false;
            }
        }
        self.insert_locked(&mut entries, key, snapshot);
        true
    }

    fn insert_locked(
        &self,
        entries: &mut HashMap<String, CacheEntry>,
        key: String,
        snapshot: MetricSnapshot,
    ) {
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone())
            {
                entries.remove(&oldest);
                debug!(evicted = %oldest, "cache full");
            }
        }
        let now = Instant::now();
        entries.insert(
            key,
            CacheEntry {
                snapshot,
                inserted_at: now,
                expires_at: now.checked_add(self.ttl),
            },
        );
    }

    /// Removes `key`; returns whether it was present.
    pub fn expire(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|mut entries| entries.remove(key).is_some())
            .unwrap_or(false)
    }

    pub fn purge_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Idempotency guard
//!
//! Deduplicates operations keyed by an external event id. A completed
//! operation's result is cached and replayed to later callers; a key with
//! an attempt still in flight is rejected rather than run twice.

use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use tracing::debug;

#[derive(Debug, Clone)]
enum Entry {
    InFlight,
    Completed {
        value: serde_json::Value,
        completed_at: DateTime<Utc>,
    },
}

/// In-memory idempotency guard with TTL-based expiry
pub struct IdempotencyGuard {
    entries: DashMap<String, Entry>,
    ttl_seconds: i64,
}

impl IdempotencyGuard {
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_seconds,
        }
    }

    /// Run `op` at most once per key. A completed key replays the cached
    /// result; an in-flight key returns `DuplicateInFlight`. A failed run
    /// clears the key so the caller may retry.
    pub async fn execute<F, Fut, T>(&self, key: &str, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        T: Serialize + DeserializeOwned,
    {
        // claim the key atomically
        {
            let entry = self.entries.entry(key.to_string());
            match entry {
                dashmap::mapref::entry::Entry::Occupied(occupied) => match occupied.get() {
                    Entry::Completed { value, .. } => {
                        debug!(key, "idempotent replay of cached result");
                        return Ok(serde_json::from_value(value.clone())?);
                    }
                    Entry::InFlight => {
                        return Err(Error::DuplicateInFlight(key.to_string()));
                    }
                },
                dashmap::mapref::entry::Entry::Vacant(vacant) => {
                    vacant.insert(Entry::InFlight);
                }
            }
        }

        match op().await {
            Ok(value) => {
                let cached = serde_json::to_value(&value)?;
                self.entries.insert(
                    key.to_string(),
                    Entry::Completed {
                        value: cached,
                        completed_at: Utc::now(),
                    },
                );
                Ok(value)
            }
            Err(e) => {
                self.entries.remove(key);
                Err(e)
            }
        }
    }

    /// Drop completed entries older than the TTL. In-flight entries are
    /// kept regardless of age.
    pub fn purge_expired(&self) -> usize {
        let cutoff = Utc::now() - Duration::seconds(self.ttl_seconds);
        let before = self.entries.len();
        self.entries.retain(|_, entry| match entry {
            Entry::InFlight => true,
            Entry::Completed { completed_at, .. } => *completed_at > cutoff,
        });
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! In-memory TTL cache with an injected clock.
//!
//! Expired entries are reclaimed lazily on access to the same key; there is
//! no background sweep. Two concurrent requests for the same uncached key may
//! both compute and both write; the second write simply replaces the first,
//! which is harmless because writes are idempotent replacements.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Time source for expiry decisions. Injected so tests can drive expiry
/// deterministically instead of sleeping on wall time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

pub struct TtlCache<T> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, Entry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        TtlCache {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached value, or `None` if the key was never set or its
    /// TTL elapsed. An expired entry is evicted before returning.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();

        {
            let entries = self.entries.read().ok()?;
            match entries.get(key) {
                Some(entry) if now < entry.expires_at => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: evict, re-checking under the write lock in case a
        // concurrent put refreshed the entry in between.
        if let Ok(mut entries) = self.entries.write() {
            if let Some(entry) = entries.get(key) {
                if self.clock.now() >= entry.expires_at {
                    entries.remove(key);
                }
            }
        }
        None
    }

    /// Unconditionally overwrites the entry and restarts its TTL from now.
    pub fn put(&self, key: impl Into<String>, value: T) {
        let expires_at = self.clock.now() + self.ttl;
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), Entry { value, expires_at });
        }
    }
}

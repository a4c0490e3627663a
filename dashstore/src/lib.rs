use std::time::{Duration, Instant};

use dashmap::DashMap;

use tagcache::{BackendError, CacheBackend};

/// In-process [`CacheBackend`] over `DashMap` shards. Counters ride the
/// shard locks of their own map, so `increment_or_create` is atomic without
/// any locking of its own.
///
/// `timeout: None` on `set` falls back to this store's default timeout; with
/// the default of no default, that means no expiry at all (the entry lives
/// until deleted or overwritten). Expired entries are reaped lazily on read.
pub struct DashStore {
    entries: DashMap<String, StoredBytes>,
    counters: DashMap<String, u64>,
    default_timeout: Option<Duration>,
}

struct StoredBytes {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredBytes {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

impl DashStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            counters: DashMap::new(),
            default_timeout: None,
        }
    }

    pub fn with_default_timeout(default_timeout: Duration) -> Self {
        Self {
            default_timeout: Some(default_timeout),
            ..Self::new()
        }
    }
}

impl Default for DashStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for DashStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(stored) if stored.is_expired(now) => {
                drop(stored);
                self.entries.remove_if(key, |_, stored| stored.is_expired(now));

                #[cfg(feature = "tracing")]
                tracing::debug!(%key, "expired entry reaped");

                Ok(None)
            }
            Some(stored) => Ok(Some(stored.bytes.clone())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, bytes: Vec<u8>, timeout: Option<Duration>) -> Result<(), BackendError> {
        let timeout = timeout.or(self.default_timeout);
        let stored = StoredBytes {
            bytes,
            expires_at: timeout.map(|t| Instant::now() + t),
        };
        self.entries.insert(key.to_string(), stored);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.entries.remove(key);
        Ok(())
    }

    fn increment_or_create(&self, counter_key: &str, delta: u64) -> Result<u64, BackendError> {
        let counter = self
            .counters
            .entry(counter_key.to_string())
            .and_modify(|count| *count += delta)
            .or_insert(delta);
        Ok(*counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let store = DashStore::new();
        store.set("k", b"v".to_vec(), None).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(b"v".as_slice()));

        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn expired_entries_read_as_absent() {
        let store = DashStore::new();
        store
            .set("k", b"v".to_vec(), Some(Duration::from_nanos(1)))
            .unwrap();

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn default_timeout_applies_when_set_passes_none() {
        let store = DashStore::with_default_timeout(Duration::from_nanos(1));
        store.set("k", b"v".to_vec(), None).unwrap();

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn explicit_timeout_overrides_the_default() {
        let store = DashStore::with_default_timeout(Duration::from_nanos(1));
        store
            .set("k", b"v".to_vec(), Some(Duration::from_secs(3600)))
            .unwrap();

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.get("k").unwrap().as_deref(), Some(b"v".as_slice()));
    }

    #[test]
    fn counters_create_at_delta_and_accumulate() {
        let store = DashStore::new();
        assert_eq!(store.increment_or_create("c", 0).unwrap(), 0);
        assert_eq!(store.increment_or_create("c", 1).unwrap(), 1);
        assert_eq!(store.increment_or_create("c", 1).unwrap(), 2);
        assert_eq!(store.increment_or_create("fresh", 1).unwrap(), 1);
    }

    #[test]
    fn counters_and_entries_do_not_shadow_each_other() {
        let store = DashStore::new();
        store.set("name", b"entry".to_vec(), None).unwrap();
        assert_eq!(store.increment_or_create("name", 1).unwrap(), 1);
        assert_eq!(
            store.get("name").unwrap().as_deref(),
            Some(b"entry".as_slice())
        );
    }
}

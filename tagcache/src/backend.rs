use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key-value store the engine runs on top of. Entries are opaque bytes;
/// counters live in the same keyspace but are only touched through
/// [`increment_or_create`](CacheBackend::increment_or_create).
///
/// `timeout: None` means "this store's default expiry", whatever that is for
/// the adapter. Whether that default is infinite is adapter-specific and must
/// be documented by each implementation, never assumed by callers.
pub trait CacheBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    fn set(&self, key: &str, bytes: Vec<u8>, timeout: Option<Duration>) -> Result<(), BackendError>;

    fn delete(&self, key: &str) -> Result<(), BackendError>;

    /// Atomically adds `delta` to the counter under `counter_key` and returns
    /// the new value. If the counter does not exist yet it is created holding
    /// exactly `delta` (so `delta = 0` reads a counter into existence at 0).
    /// Concurrent calls on the same key must not lose increments.
    fn increment_or_create(&self, counter_key: &str, delta: u64) -> Result<u64, BackendError>;
}

impl<B: CacheBackend + ?Sized> CacheBackend for &B {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, bytes: Vec<u8>, timeout: Option<Duration>) -> Result<(), BackendError> {
        (**self).set(key, bytes, timeout)
    }

    fn delete(&self, key: &str) -> Result<(), BackendError> {
        (**self).delete(key)
    }

    fn increment_or_create(&self, counter_key: &str, delta: u64) -> Result<u64, BackendError> {
        (**self).increment_or_create(counter_key, delta)
    }
}

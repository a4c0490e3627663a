use std::{collections::BTreeMap, time::Duration};

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    BackendError, CacheBackend, CacheEntry, EncodeEntry, NoActiveScope, PendingFlush, ScopeStack,
    Tag, TagVersionStore, entry,
};

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Encode(#[from] EncodeEntry),
    #[error(transparent)]
    Scope(#[from] NoActiveScope),
}

const DEFAULT_KEY_PREFIX: &str = "tagcache";

/// Tagged cache over one backend instance. Which backend (and which alias of
/// it) is the caller's choice at construction time; the engine holds no
/// global registry. The key prefix namespaces entry keys and tag counters so
/// several engines can share a backend without colliding.
///
/// Reads fail open: a stale snapshot, a corrupt record, or an unreachable
/// backend all come back as a miss. Writes and flushes propagate their
/// errors, since silently dropping a bump would leave readers serving stale
/// data forever.
pub struct TagCache<B> {
    backend: B,
    key_prefix: String,
}

impl<B: CacheBackend> TagCache<B> {
    pub fn new(backend: B) -> Self {
        Self::with_key_prefix(backend, DEFAULT_KEY_PREFIX)
    }

    pub fn with_key_prefix(backend: B, key_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn versions(&self) -> TagVersionStore<'_, B> {
        TagVersionStore::new(&self.backend, &self.key_prefix)
    }

    fn entry_key(&self, key: &str) -> String {
        format!("{}:entry:{}", self.key_prefix, key)
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(key = %key))
    )]
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let raw = match self.backend.get(&self.entry_key(key)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("backend unavailable, treating read as miss: {}", _err);

                return None;
            }
        };

        let entry: CacheEntry<V> = match entry::decode(&raw) {
            Ok(entry) => entry,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("corrupt cache entry, treating as miss: {}", _err);

                return None;
            }
        };

        let versions = self.versions();
        for (tag, recorded) in &entry.tag_versions {
            match versions.get_version(tag) {
                Ok(current) if current == *recorded => {}
                Ok(_current) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%tag, recorded, current = _current, "stale entry");

                    return None;
                }
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("backend unavailable, treating read as miss: {}", _err);

                    return None;
                }
            }
        }

        Some(entry.value)
    }

    /// Stores `value` under `key`, snapshotting the current version of every
    /// tag. The snapshot is taken here, after the value already exists, so
    /// the window against a concurrent invalidation is as small as it gets.
    /// A bump landing inside that window can still let one stale read
    /// through; that is the accepted eventual-consistency tradeoff.
    ///
    /// `tags` may be empty, in which case only `timeout` and backend
    /// eviction can ever retire the entry.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(key = %key))
    )]
    pub fn set<V: Serialize, T: Tag>(
        &self,
        key: &str,
        value: &V,
        tags: impl IntoIterator<Item = T>,
        timeout: Option<Duration>,
    ) -> Result<(), CacheError> {
        let versions = self.versions();
        let mut tag_versions = BTreeMap::new();
        for tag in tags {
            let tag = tag.id();
            let version = versions.get_version(tag)?;
            tag_versions.insert(tag.to_string(), version);
        }

        let bytes = entry::encode(&CacheEntry {
            value,
            tag_versions,
            timeout,
        })?;
        self.backend.set(&self.entry_key(key), bytes, timeout)?;
        Ok(())
    }

    /// Read-through: returns the cached value when fresh, otherwise runs
    /// `compute` and caches its result under `tags`.
    pub fn get_or_set<V, T>(
        &self,
        key: &str,
        tags: impl IntoIterator<Item = T>,
        timeout: Option<Duration>,
        compute: impl FnOnce() -> V,
    ) -> Result<V, CacheError>
    where
        V: Serialize + DeserializeOwned,
        T: Tag,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute();
        self.set(key, &value, tags, timeout)?;
        Ok(value)
    }

    /// Queues a version bump for each tag on the current scope. Nothing is
    /// visible to other readers until the owning transaction finishes.
    pub fn invalidate_tags<T: Tag>(
        &self,
        scopes: &mut ScopeStack,
        tags: impl IntoIterator<Item = T>,
    ) -> Result<(), NoActiveScope> {
        scopes.record_invalidate(tags)
    }

    /// Queues a direct key deletion, flushed together with the tag bumps.
    pub fn delete(&self, scopes: &mut ScopeStack, key: &str) -> Result<(), NoActiveScope> {
        scopes.record_delete(key)
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(depth = scopes.depth()))
    )]
    pub fn finish(&self, scopes: &mut ScopeStack) -> Result<(), CacheError> {
        match scopes.finish()? {
            Some(flush) => self.apply(flush),
            None => Ok(()),
        }
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(depth = scopes.depth()))
    )]
    pub fn finish_all(&self, scopes: &mut ScopeStack) -> Result<(), CacheError> {
        match scopes.finish_all() {
            Some(flush) => self.apply(flush),
            None => Ok(()),
        }
    }

    /// Wraps `f` in `begin` / `finish`. When `f` errors, every scope it left
    /// open is discarded down to the depth we entered at, so a rolled-back
    /// transaction flushes nothing.
    pub fn scoped<T, E>(
        &self,
        scopes: &mut ScopeStack,
        f: impl FnOnce(&mut ScopeStack) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<CacheError>,
    {
        let entry_depth = scopes.depth();
        scopes.begin();
        match f(scopes) {
            Ok(value) => {
                self.finish(scopes).map_err(E::from)?;
                Ok(value)
            }
            Err(err) => {
                while scopes.depth() > entry_depth {
                    let _ = scopes.discard();
                }
                Err(err)
            }
        }
    }

    /// Like [`scoped`](Self::scoped) but commits with `finish_all`, flushing
    /// every open scope at once when `f` succeeds.
    pub fn scoped_all<T, E>(
        &self,
        scopes: &mut ScopeStack,
        f: impl FnOnce(&mut ScopeStack) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<CacheError>,
    {
        scopes.begin();
        match f(scopes) {
            Ok(value) => {
                self.finish_all(scopes).map_err(E::from)?;
                Ok(value)
            }
            Err(err) => {
                scopes.discard_all();
                Err(err)
            }
        }
    }

    // Bumps then deletes; the two are commutative, nothing observable
    // depends on their relative order.
    fn apply(&self, flush: PendingFlush) -> Result<(), CacheError> {
        self.versions().bump(flush.tags.iter().map(String::as_str))?;
        for key in &flush.deletes {
            self.backend.delete(&self.entry_key(key))?;
        }
        Ok(())
    }
}

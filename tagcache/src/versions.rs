use std::collections::BTreeMap;

use crate::{BackendError, CacheBackend};

/// Tag name -> monotonic version counter, persisted in the backend under
/// `<prefix>:tag:<name>`. A tag nobody has seen before is version 0 and is
/// created lazily the first time anything asks about it.
pub struct TagVersionStore<'b, B> {
    backend: &'b B,
    key_prefix: &'b str,
}

impl<'b, B: CacheBackend> TagVersionStore<'b, B> {
    pub fn new(backend: &'b B, key_prefix: &'b str) -> Self {
        Self {
            backend,
            key_prefix,
        }
    }

    fn version_key(&self, tag: &str) -> String {
        format!("{}:tag:{}", self.key_prefix, tag)
    }

    pub fn get_version(&self, tag: &str) -> Result<u64, BackendError> {
        self.backend.increment_or_create(&self.version_key(tag), 0)
    }

    /// Bumps every named tag by one, creating absent tags at version 1, and
    /// returns the new versions. Relies on the backend's atomic increment, so
    /// concurrent bumps on the same tag are never lost. Bumping twice simply
    /// invalidates twice; staleness is a not-equal-to-current test, so any
    /// bump past an entry's recorded version stales it.
    pub fn bump<'t>(
        &self,
        tags: impl IntoIterator<Item = &'t str>,
    ) -> Result<BTreeMap<String, u64>, BackendError> {
        let mut new_versions = BTreeMap::new();
        for tag in tags {
            let version = self.backend.increment_or_create(&self.version_key(tag), 1)?;
            new_versions.insert(tag.to_string(), version);
        }
        Ok(new_versions)
    }
}

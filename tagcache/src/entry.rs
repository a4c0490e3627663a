use std::{collections::BTreeMap, time::Duration};

use serde::{Serialize, de::DeserializeOwned};

/// One cached record: the value plus the version every tag had when the
/// value was written. Freshness on read is "every recorded version still
/// equals the tag's current version"; the snapshot travels inside the record
/// so a single backend read is enough to start that check.
#[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub tag_versions: BTreeMap<String, u64>,
    pub timeout: Option<Duration>,
}

#[derive(thiserror::Error, Debug)]
#[error("failed to encode cache entry: {0}")]
pub struct EncodeEntry(#[from] serde_json::Error);

#[derive(thiserror::Error, Debug)]
#[error("corrupt cache entry: {0}")]
pub struct CorruptEntry(#[from] serde_json::Error);

pub fn encode<V: Serialize>(entry: &CacheEntry<V>) -> Result<Vec<u8>, EncodeEntry> {
    Ok(serde_json::to_vec(entry)?)
}

pub fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<CacheEntry<V>, CorruptEntry> {
    Ok(serde_json::from_slice(bytes)?)
}

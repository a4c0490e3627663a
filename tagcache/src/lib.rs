mod backend;
mod engine;
mod entry;
mod scope;
mod tag;
mod versions;

pub use backend::{BackendError, CacheBackend};
pub use engine::{CacheError, TagCache};
pub use entry::{CacheEntry, CorruptEntry, EncodeEntry};
pub use scope::{NoActiveScope, PendingFlush, ScopeStack};
pub use tag::Tag;
pub use versions::TagVersionStore;

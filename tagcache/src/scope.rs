use std::collections::HashSet;

use crate::Tag;

/// Raised when `record_invalidate` / `record_delete` / `finish` run at depth
/// zero. This is a programming error (a missing `begin`), never swallowed.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("no active transaction scope: begin() must be called first")]
pub struct NoActiveScope;

/// What a completed commit boundary wants applied to the world: tags whose
/// versions must be bumped and keys to delete outright.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PendingFlush {
    pub tags: HashSet<String>,
    pub deletes: HashSet<String>,
}

impl PendingFlush {
    fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.deletes.is_empty()
    }

    fn merge(&mut self, other: PendingFlush) {
        self.tags.extend(other.tags);
        self.deletes.extend(other.deletes);
    }
}

/// Nested transaction scopes for one logical unit of work (one request, one
/// background job). Invalidations recorded while a scope is open stay local
/// to this stack; nothing reaches the backend until the outermost scope
/// finishes, so a rolled-back transaction that never finishes leaks nothing.
///
/// Not shared across units of work. Sharing one stack between concurrent
/// transactions would corrupt the nesting depth and cross-contaminate their
/// pending invalidations.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<PendingFlush>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn begin(&mut self) {
        self.scopes.push(PendingFlush::default());
    }

    pub fn record_invalidate<T: Tag>(
        &mut self,
        tags: impl IntoIterator<Item = T>,
    ) -> Result<(), NoActiveScope> {
        let top = self.scopes.last_mut().ok_or(NoActiveScope)?;
        top.tags.extend(tags.into_iter().map(|tag| tag.id().to_string()));
        Ok(())
    }

    pub fn record_delete(&mut self, key: impl Into<String>) -> Result<(), NoActiveScope> {
        let top = self.scopes.last_mut().ok_or(NoActiveScope)?;
        top.deletes.insert(key.into());
        Ok(())
    }

    /// Pops the top scope. Only when the popped scope was the outermost does
    /// anything become flushable; an inner finish merges into the parent,
    /// because the parent transaction might still roll back.
    pub fn finish(&mut self) -> Result<Option<PendingFlush>, NoActiveScope> {
        let popped = self.scopes.pop().ok_or(NoActiveScope)?;
        match self.scopes.last_mut() {
            Some(parent) => {
                parent.merge(popped);
                Ok(None)
            }
            None if popped.is_empty() => Ok(None),
            None => Ok(Some(popped)),
        }
    }

    /// Collapses every open scope into one flush and resets depth to zero.
    /// Returns `None` when already idle or nothing was recorded.
    pub fn finish_all(&mut self) -> Option<PendingFlush> {
        let mut merged = PendingFlush::default();
        for scope in self.scopes.drain(..) {
            merged.merge(scope);
        }
        (!merged.is_empty()).then_some(merged)
    }

    /// Rollback of the innermost scope: drop it without flushing or merging.
    pub fn discard(&mut self) -> Result<(), NoActiveScope> {
        self.scopes.pop().map(|_| ()).ok_or(NoActiveScope)
    }

    /// Rollback: drop every open scope without flushing anything.
    pub fn discard_all(&mut self) {
        self.scopes.clear();
    }
}

//! Staging Manager
//!
//! Accumulates pending edits into a [`ChangeSet`] before any network
//! call is made. Purely local state: nothing here validates payload
//! content or talks to the gateway; malformed payloads are diagnosed at
//! validation time by the kernel.

use crate::domain::{ChangeRecord, ChangeSet};

/// Client-side edit queue with last-write-wins semantics per entity
///
/// Re-staging an edit to the same (kind, identity) replaces the earlier
/// record in its original slot, so a session's edit history collapses
/// without reordering unrelated edits.
#[derive(Debug, Default)]
pub struct StagingManager {
    pending: ChangeSet,
}

impl StagingManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for its (kind, identity) key
    pub fn stage(&mut self, record: ChangeRecord) -> &ChangeSet {
        self.pending.push(record);
        &self.pending
    }

    /// The currently staged set
    pub fn pending(&self) -> &ChangeSet {
        &self.pending
    }

    /// Hand the staged set off for commit, leaving a fresh empty set
    pub fn take(&mut self) -> ChangeSet {
        std::mem::take(&mut self.pending)
    }

    /// Discard all staged records
    pub fn clear(&mut self) {
        self.pending = ChangeSet::new();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

// src/ingest/dedup.rs
//! In-memory mirror of the identifiers already durable in the output store.
//!
//! Seeded once from the sink at startup and only extended after a batch has
//! been appended successfully, so it is always a subset of durable state.

use std::collections::HashSet;

#[derive(Debug, Default, Clone)]
pub struct DedupStore {
    seen: HashSet<String>,
}

impl DedupStore {
    pub fn from_ids(ids: HashSet<String>) -> Self {
        Self { seen: ids }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Drop items whose id is already durable, and repeats within `items`.
    /// Returns (unseen, removed_count); input order is preserved.
    pub fn retain_unseen<T, F>(&self, items: Vec<T>, id_of: F) -> (Vec<T>, usize)
    where
        F: Fn(&T) -> &str,
    {
        let total = items.len();
        let mut batch_ids: HashSet<String> = HashSet::new();
        let unseen: Vec<T> = items
            .into_iter()
            .filter(|it| {
                let id = id_of(it);
                !self.seen.contains(id) && batch_ids.insert(id.to_string())
            })
            .collect();
        let removed = total - unseen.len();
        (unseen, removed)
    }

    /// Record ids that are now durable. The set never shrinks.
    pub fn extend<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.seen.extend(ids);
    }
}

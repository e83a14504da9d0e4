//! Copy-on-write catalogs for process-wide reference data
//! (sanctions lists, rules, patterns).
//!
//! RULE: A snapshot is never mutated once published.
//! Readers take an `Arc` to the current snapshot and keep a consistent
//! view for as long as they hold it. Writers are serialised, build a new
//! snapshot from the current one and publish it with a single swap.

use crate::error::{AmlError, AmlResult};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

/// Anything that can live in a catalog under a stable string key.
pub trait CatalogEntry: Clone + Send + Sync + 'static {
    fn key(&self) -> &str;
}

/// One immutable version of a catalog: an arena of entries in insertion
/// order plus a key index into it.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot<T> {
    entries: Vec<T>,
    index:   HashMap<String, usize>,
    version: u64,
}

impl<T: CatalogEntry> CatalogSnapshot<T> {
    /// Build a snapshot. A later entry with a duplicate key replaces the
    /// earlier one in place.
    fn build(items: impl IntoIterator<Item = T>, version: u64) -> Self {
        let mut entries: Vec<T> = Vec::new();
        let mut index = HashMap::new();
        for item in items {
            match index.get(item.key()) {
                Some(&slot) => entries[slot] = item,
                None => {
                    index.insert(item.key().to_string(), entries.len());
                    entries.push(item);
                }
            }
        }
        Self { entries, index, version }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&slot| &self.entries[slot])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Monotonic version, bumped on every published change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.entries.clone()
    }
}

pub struct Catalog<T> {
    kind:    &'static str,
    current: ArcSwap<CatalogSnapshot<T>>,
    writer:  Mutex<()>,
}

impl<T: CatalogEntry> Catalog<T> {
    /// `kind` names the entry type in NotFound errors ("rule", "pattern", ...).
    pub fn new(kind: &'static str, entries: impl IntoIterator<Item = T>) -> Self {
        Self {
            kind,
            current: ArcSwap::from_pointee(CatalogSnapshot::build(entries, 0)),
            writer:  Mutex::new(()),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// The current published snapshot.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot<T>> {
        self.current.load_full()
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.current.load().get(key).cloned()
    }

    /// Insert a new entry or replace the one with the same key.
    pub fn upsert(&self, entry: T) {
        let _guard = self.writer.lock();
        let cur = self.current.load_full();
        let mut items = cur.to_vec();
        match cur.index.get(entry.key()) {
            Some(&slot) => items[slot] = entry,
            None => items.push(entry),
        }
        self.publish(items, cur.version);
    }

    /// Replace the entry under `key` with `f(existing)`.
    /// Fails with NotFound, or with `f`'s error, leaving the catalog unchanged.
    pub fn update<F>(&self, key: &str, f: F) -> AmlResult<T>
    where
        F: FnOnce(&T) -> AmlResult<T>,
    {
        let _guard = self.writer.lock();
        let cur = self.current.load_full();
        let slot = *cur
            .index
            .get(key)
            .ok_or_else(|| AmlError::not_found(self.kind, key))?;
        let replacement = f(&cur.entries[slot])?;
        let mut items = cur.to_vec();
        items[slot] = replacement.clone();
        self.publish(items, cur.version);
        Ok(replacement)
    }

    /// Remove and return the entry under `key`.
    pub fn remove(&self, key: &str) -> AmlResult<T> {
        let _guard = self.writer.lock();
        let cur = self.current.load_full();
        let slot = *cur
            .index
            .get(key)
            .ok_or_else(|| AmlError::not_found(self.kind, key))?;
        let mut items = cur.to_vec();
        let removed = items.remove(slot);
        self.publish(items, cur.version);
        Ok(removed)
    }

    /// Swap in a whole new set of entries.
    pub fn replace_all(&self, entries: impl IntoIterator<Item = T>) {
        let _guard = self.writer.lock();
        let version = self.current.load().version;
        self.publish(entries, version);
    }

    fn publish(&self, items: impl IntoIterator<Item = T>, prev_version: u64) {
        let next = CatalogSnapshot::build(items, prev_version + 1);
        log::debug!("{} catalog published v{} ({} entries)", self.kind, next.version, next.len());
        self.current.store(Arc::new(next));
    }
}

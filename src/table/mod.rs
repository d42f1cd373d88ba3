//! Storage shared by every prefix-keyed table.
//!
//! Tables are insertion-ordered sequences searched linearly; the first entry
//! whose prefix matches a query wins. Ordering is observable through the
//! diagnostic dumps, so removal preserves the relative order of what remains.
//!
//! Tables perform no locking of their own. They are shared through
//! [`TableLock`], which hands out scoped guards so that a caller can batch any
//! number of operations under one acquisition.

mod lock;

pub use lock::{ReadGuard, TableLock, WriteGuard};

use std::net::Ipv4Addr;

use crate::types::Prefix;

/// An entry keyed by a destination prefix.
pub trait PrefixEntry {
    /// The key this entry is stored under.
    fn prefix(&self) -> &Prefix;
}

/// Insertion-ordered collection of prefix-keyed entries.
#[derive(Debug, Clone)]
pub struct PrefixTable<E> {
    entries: Vec<E>,
}

impl<E: PrefixEntry> PrefixTable<E> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the first entry selected by `(addr, mask)`.
    pub fn position(&self, addr: Ipv4Addr, mask: Ipv4Addr) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.prefix().matches(addr, mask))
    }

    /// First entry selected by `(addr, mask)`.
    pub fn get(&self, addr: Ipv4Addr, mask: Ipv4Addr) -> Option<&E> {
        self.position(addr, mask).map(|i| &self.entries[i])
    }

    /// Mutable access to the first entry selected by `(addr, mask)`.
    pub fn get_mut(&mut self, addr: Ipv4Addr, mask: Ipv4Addr) -> Option<&mut E> {
        self.position(addr, mask).map(move |i| &mut self.entries[i])
    }

    /// Index of the entry stored under exactly `key`.
    pub fn position_key(&self, key: &Prefix) -> Option<usize> {
        self.entries.iter().position(|e| e.prefix().same_key(key))
    }

    /// Mutable access to the entry stored under exactly `key`.
    pub fn get_key_mut(&mut self, key: &Prefix) -> Option<&mut E> {
        self.position_key(key).map(move |i| &mut self.entries[i])
    }

    /// Remove the entry stored under exactly `key`.
    pub fn remove_key(&mut self, key: &Prefix) -> Option<E> {
        self.position_key(key).map(|i| self.entries.remove(i))
    }

    /// Append an entry at the back.
    pub fn push_back(&mut self, entry: E) {
        self.entries.push(entry);
    }

    /// Remove the first entry selected by `(addr, mask)`.
    pub fn remove(&mut self, addr: Ipv4Addr, mask: Ipv4Addr) -> Option<E> {
        self.position(addr, mask).map(|i| self.entries.remove(i))
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.entries.iter()
    }

    /// Mutable entries in insertion order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, E> {
        self.entries.iter_mut()
    }
}

impl<E: PrefixEntry> Default for PrefixTable<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, E: PrefixEntry> IntoIterator for &'a PrefixTable<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, E: PrefixEntry> IntoIterator for &'a mut PrefixTable<E> {
    type Item = &'a mut E;
    type IntoIter = std::slice::IterMut<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

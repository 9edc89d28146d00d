//! Key-scoped leases with skip-if-held semantics.
//!
//! A lease marks a key (an owner, a webhook) as busy for as long as the
//! returned guard lives. A second caller asking for the same key gets
//! `None` instead of waiting.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

/// Registry of held leases
#[derive(Debug)]
pub struct LeaseRegistry<K: Eq + Hash + Clone> {
    held: Arc<DashMap<K, ()>>,
}

impl<K: Eq + Hash + Clone> LeaseRegistry<K> {
    pub fn new() -> Self {
        Self {
            held: Arc::new(DashMap::new()),
        }
    }

    /// Takes the lease for `key`, or `None` if someone else holds it
    pub fn try_acquire(&self, key: K) -> Option<Lease<K>> {
        match self.held.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(());
                Some(Lease {
                    key,
                    held: Arc::clone(&self.held),
                })
            }
        }
    }

    pub fn is_held(&self, key: &K) -> bool {
        self.held.contains_key(key)
    }
}

impl<K: Eq + Hash + Clone> Default for LeaseRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> Clone for LeaseRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            held: Arc::clone(&self.held),
        }
    }
}

/// Guard of a held lease; dropping it releases the key
#[derive(Debug)]
pub struct Lease<K: Eq + Hash + Clone> {
    key: K,
    held: Arc<DashMap<K, ()>>,
}

impl<K: Eq + Hash + Clone> Lease<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash + Clone> Drop for Lease<K> {
    fn drop(&mut self) {
        self.held.remove(&self.key);
    }
}

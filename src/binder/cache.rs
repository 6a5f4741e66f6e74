//! Binding cache: one entry per bound root
//!
//! Keyed by root identity and holding the root weakly, so a cache entry
//! never keeps a detached tree alive. Entries for dropped roots are pruned.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::model::ModelBinding;
use crate::dom::{Node, WeakNode};

pub(crate) struct CacheEntry {
    root: WeakNode,
    pub(crate) binding: Rc<dyn ModelBinding>,
    /// Serialized model as of the last bind
    pub(crate) fingerprint: String,
}

/// Live entry handed to the digest pass (strong root, shared binding)
pub(crate) struct LiveEntry {
    pub(crate) root: Node,
    pub(crate) binding: Rc<dyn ModelBinding>,
    pub(crate) fingerprint: String,
}

#[derive(Default)]
pub(crate) struct BindingCache {
    entries: FxHashMap<usize, CacheEntry>,
}

impl BindingCache {
    pub(crate) fn get(&self, root: &Node) -> Option<&CacheEntry> {
        self.entries.get(&root.addr())
    }

    pub(crate) fn upsert(&mut self, root: &Node, binding: Rc<dyn ModelBinding>, fingerprint: String) {
        self.entries.insert(
            root.addr(),
            CacheEntry {
                root: root.downgrade(),
                binding,
                fingerprint,
            },
        );
    }

    pub(crate) fn remove(&mut self, root: &Node) -> bool {
        self.entries.remove(&root.addr()).is_some()
    }

    /// Drop entries whose root is gone; returns how many were dropped
    pub(crate) fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.root.is_dead());
        before - self.entries.len()
    }

    /// Entries whose root is still alive, in no particular order
    pub(crate) fn live_entries(&self) -> Vec<LiveEntry> {
        self.entries
            .values()
            .filter_map(|entry| {
                entry.root.upgrade().map(|root| LiveEntry {
                    root,
                    binding: Rc::clone(&entry.binding),
                    fingerprint: entry.fingerprint.clone(),
                })
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

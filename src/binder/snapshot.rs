//! Snapshot/reset of bound roots
//!
//! The first reset of a root records a deep clone of it (the pristine
//! template). Every later reset throws away the root's children and puts
//! fresh clones of the snapshot's children back, so binding always starts
//! from the template and never from the previous output.
//!
//! The root node itself is kept (callers hold it), so its own state is
//! restored field by field: listeners added since the snapshot are dropped,
//! and attributes and properties are put back when `restore_attributes` is set.

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::dom::{Node, WeakNode};
use crate::error::Result;

/// What `reset` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// First encounter: snapshot recorded, root untouched
    Taken,
    /// Root restored from its snapshot
    Restored,
}

struct SnapshotEntry {
    root: WeakNode,
    pristine: Node,
    /// Root properties at snapshot time (`deep_clone` does not copy them)
    properties: FxHashMap<String, Value>,
    /// Root listeners at snapshot time; later ones are binder-registered
    listeners: usize,
}

/// Pristine copies keyed by root identity
///
/// Roots are held weakly; entries for dropped roots are removed by `prune`.
#[derive(Default)]
pub(crate) struct Snapshots {
    entries: FxHashMap<usize, SnapshotEntry>,
}

impl Snapshots {
    pub(crate) fn contains(&self, root: &Node) -> bool {
        self.entries.contains_key(&root.addr())
    }

    /// Record the snapshot on first call, restore from it afterwards
    pub(crate) fn reset(&mut self, root: &Node, restore_attributes: bool) -> Result<ResetOutcome> {
        let Some(entry) = self.entries.get(&root.addr()) else {
            self.entries.insert(
                root.addr(),
                SnapshotEntry {
                    root: root.downgrade(),
                    pristine: root.deep_clone(),
                    properties: root.properties(),
                    listeners: root.total_listeners(),
                },
            );
            trace!(root = %root.id(), "snapshot taken");
            return Ok(ResetOutcome::Taken);
        };

        root.clear_children();
        for child in entry.pristine.children() {
            root.append_child(&child.deep_clone())?;
        }
        root.truncate_listeners(entry.listeners);
        if restore_attributes {
            root.replace_attributes(entry.pristine.attributes());
            root.replace_properties(entry.properties.clone());
        }
        trace!(root = %root.id(), "root restored from snapshot");
        Ok(ResetOutcome::Restored)
    }

    /// Pristine copy of `root`, if one was recorded
    pub(crate) fn pristine(&self, root: &Node) -> Option<Node> {
        self.entries
            .get(&root.addr())
            .map(|entry| entry.pristine.deep_clone())
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

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn first_reset_records_without_touching() {
        let root = Node::parse("<ul><li>x</li></ul>").unwrap();
        let mut snapshots = Snapshots::default();

        assert_eq!(snapshots.reset(&root, true).unwrap(), ResetOutcome::Taken);
        assert!(snapshots.contains(&root));
        assert_eq!(root.outer_html(), "<ul><li>x</li></ul>");
    }

    #[test]
    fn later_resets_restore_template() {
        let root = Node::parse("<ul class='list'><li>x</li></ul>").unwrap();
        let mut snapshots = Snapshots::default();
        snapshots.reset(&root, true).unwrap();

        root.set_inner_html("<li>a</li><li>b</li>");
        root.set_attribute("class", "changed");
        assert_eq!(snapshots.reset(&root, true).unwrap(), ResetOutcome::Restored);

        assert_eq!(root.outer_html(), "<ul class=\"list\"><li>x</li></ul>");
    }

    #[test]
    fn root_attributes_can_be_left_alone() {
        let root = Node::parse("<div title='a'><p></p></div>").unwrap();
        let mut snapshots = Snapshots::default();
        snapshots.reset(&root, false).unwrap();

        root.set_attribute("title", "b");
        root.clear_children();
        snapshots.reset(&root, false).unwrap();

        assert_eq!(root.outer_html(), "<div title=\"b\"><p></p></div>");
    }

    #[test]
    fn reset_drops_listeners_added_after_snapshot() {
        let root = Node::parse("<button>go</button>").unwrap();
        root.add_event_listener("click", |_| {});
        let mut snapshots = Snapshots::default();
        snapshots.reset(&root, true).unwrap();

        root.add_event_listener("click", |_| {});
        root.add_event_listener("focus", |_| {});
        snapshots.reset(&root, true).unwrap();

        assert_eq!(root.listener_count("click"), 1);
        assert_eq!(root.listener_count("focus"), 0);
    }

    #[test]
    fn reset_restores_root_properties() {
        let root = Node::parse("<input>").unwrap();
        root.set_property("value", json!("initial"));
        let mut snapshots = Snapshots::default();
        snapshots.reset(&root, true).unwrap();

        root.set_property("value", json!("typed"));
        root.set_property("model", json!({"a": 1}));
        snapshots.reset(&root, true).unwrap();

        assert_eq!(root.property("value"), Some(json!("initial")));
        assert_eq!(root.property("model"), None);
    }

    #[test]
    fn snapshot_is_never_mutated_by_binding() {
        let root = Node::parse("<div><span>t</span></div>").unwrap();
        let mut snapshots = Snapshots::default();
        snapshots.reset(&root, true).unwrap();
        snapshots.reset(&root, true).unwrap();

        root.children()[0].set_inner_html("changed");

        assert_eq!(
            snapshots.pristine(&root).unwrap().outer_html(),
            "<div><span>t</span></div>"
        );
    }

    #[test]
    fn prune_drops_dead_roots() {
        let mut snapshots = Snapshots::default();
        let kept = Node::element("div");
        snapshots.reset(&kept, true).unwrap();
        {
            let dropped = Node::element("div");
            snapshots.reset(&dropped, true).unwrap();
        }

        assert_eq!(snapshots.prune(), 1);
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots.remove(&kept));
        assert_eq!(snapshots.len(), 0);
    }
}

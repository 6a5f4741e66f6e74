//! Recursive mapper
//!
//! Walks a mapping over a subtree, key by key in declaration order:
//!
//! - attribute/property keys: one setter call per matched node, no recursion
//! - content + mapping: recurse into every matched node
//! - content + sequence: repeat every matched node once per item (clone,
//!   insert before the original, map the clone), then drop the original
//! - anything else: one setter call per matched node
//!
//! Callables bound to content keys are resolved per matched node before
//! dispatch, so a callable may produce a nested mapping or a sequence.

use tracing::{debug, trace};

use super::key::TargetKind;
use super::resolve::resolve;
use super::setter::{set, Applied};
use super::value::{BoundValue, Mapping};
use crate::config::BindConfig;
use crate::dom::{Node, NodeId};
use crate::error::{BindError, Result};

/// Counters collected during one `map` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapStats {
    /// Setter calls that changed something (writes and removals)
    pub writes: usize,
    /// Clones inserted by sequence iteration
    pub clones: usize,
    /// Template nodes dropped after iteration
    pub removed: usize,
    /// Keys whose selector matched nothing
    pub misses: usize,
    /// Listeners registered, as `(node, event)`
    pub listeners: Vec<(NodeId, String)>,
}

/// Apply `value` to `node` and return what was done
///
/// A mapping is walked key by key; any other value is a single content
/// write on `node` itself. On error the subtree is left partially bound.
pub fn map(node: &Node, value: &BoundValue, config: &BindConfig) -> Result<MapStats> {
    let mut walker = Walker {
        config,
        stats: MapStats::default(),
    };
    walker.map_value(node, value)?;
    Ok(walker.stats)
}

struct Walker<'a> {
    config: &'a BindConfig,
    stats: MapStats,
}

impl Walker<'_> {
    fn map_value(&mut self, node: &Node, value: &BoundValue) -> Result<()> {
        let resolved;
        let value = if value.is_callable() {
            resolved = value.clone().resolve();
            &resolved
        } else {
            value
        };

        match value {
            BoundValue::Mapping(mapping) => self.map_mapping(node, mapping),
            other => self.apply(node, TargetKind::Content, None, other),
        }
    }

    fn map_mapping(&mut self, node: &Node, mapping: &Mapping) -> Result<()> {
        for (key, value) in mapping.iter() {
            let matches = resolve(node, key);
            if matches.is_empty() {
                trace!(key = %key, context = %node.id(), "no match");
                self.stats.misses += 1;
                continue;
            }
            trace!(key = %key, matched = matches.len(), kind = value.kind_name(), "binding key");

            if key.kind() != TargetKind::Content {
                for target in &matches {
                    self.apply(target, key.kind(), key.name(), value)?;
                }
                continue;
            }

            for target in &matches {
                let resolved;
                let value = if value.is_callable() {
                    resolved = value.clone().resolve();
                    &resolved
                } else {
                    value
                };

                match value {
                    BoundValue::Mapping(nested) => self.map_mapping(target, nested)?,
                    BoundValue::Sequence(items) => self.repeat(target, items)?,
                    other => self.apply(target, TargetKind::Content, None, other)?,
                }
            }
        }
        Ok(())
    }

    /// Replace `node` with one mapped clone per item
    fn repeat(&mut self, node: &Node, items: &[BoundValue]) -> Result<()> {
        let parent = node.parent().ok_or(BindError::Detached {
            operation: "iterate",
            node: node.id(),
        })?;

        for item in items {
            let copy = node.deep_clone();
            parent.insert_before(&copy, node)?;
            self.stats.clones += 1;
            self.map_value(&copy, item)?;
        }

        parent.remove_child(node)?;
        self.stats.removed += 1;
        debug!(template = %node.id(), items = items.len(), "repeated node");
        Ok(())
    }

    fn apply(
        &mut self,
        node: &Node,
        kind: TargetKind,
        name: Option<&str>,
        value: &BoundValue,
    ) -> Result<()> {
        match set(node, kind, name, value, self.config)? {
            Applied::Written | Applied::Removed => self.stats.writes += 1,
            Applied::Listener(event) => self.stats.listeners.push((node.id(), event)),
            Applied::Kept | Applied::Skipped => {}
        }
        Ok(())
    }
}

//! Value setter: one resolved value onto one node
//!
//! | value        | content            | attribute          | property          |
//! |--------------|--------------------|--------------------|-------------------|
//! | `Show`       | keep               | keep               | keep              |
//! | `Hide`       | detach node        | remove attribute   | delete property   |
//! | `Scalar`     | inner markup       | attribute string   | JSON string       |
//! | mapping/seq  | inner markup (JSON)| attribute (JSON)   | typed JSON value  |
//!
//! Callables are called first, except on event targets (`@onclick`,
//! `:onchange`) where the callable itself becomes the listener.

use serde_json::Value;
use tracing::trace;

use super::key::{is_target_name, TargetKind};
use super::value::{BoundValue, Callable};
use crate::config::BindConfig;
use crate::dom::Node;
use crate::error::{BindError, Result};

/// What a single write did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// `Show`: left as in the template
    Kept,
    /// `Hide`: node detached, attribute removed or property deleted
    Removed,
    /// Content, attribute or property written
    Written,
    /// Callable registered as a listener for the named event
    Listener(String),
    /// Target name empty or malformed
    Skipped,
}

/// Apply `value` to `node`
///
/// `name` is the attribute/property name and is ignored for content targets.
/// Fails only when hiding a node that has no parent.
pub fn set(
    node: &Node,
    kind: TargetKind,
    name: Option<&str>,
    value: &BoundValue,
    config: &BindConfig,
) -> Result<Applied> {
    if kind == TargetKind::Content {
        return set_content(node, value.clone().resolve());
    }

    let Some(name) = name.filter(|n| is_target_name(n)) else {
        trace!(node = %node.id(), ?name, "unusable target name, skipping");
        return Ok(Applied::Skipped);
    };

    if let BoundValue::Callable(listener) = value {
        if let Some(event) = config.event_name(name) {
            register_listener(node, &event, listener.clone());
            return Ok(Applied::Listener(event));
        }
    }

    let value = value.clone().resolve();
    Ok(if kind == TargetKind::Attribute {
        set_attribute(node, name, value)
    } else {
        set_property(node, name, value)
    })
}

fn set_content(node: &Node, value: BoundValue) -> Result<Applied> {
    match value {
        BoundValue::Show => Ok(Applied::Kept),
        BoundValue::Hide => {
            if node.detach() {
                Ok(Applied::Removed)
            } else {
                Err(BindError::Detached {
                    operation: "hide",
                    node: node.id(),
                })
            }
        }
        BoundValue::Scalar(markup) => {
            node.set_inner_html(&markup);
            Ok(Applied::Written)
        }
        structured @ (BoundValue::Mapping(_) | BoundValue::Sequence(_)) => {
            node.set_inner_html(&structured.to_json().to_string());
            Ok(Applied::Written)
        }
        BoundValue::Callable(f) => set_content(node, f.call().resolve()),
    }
}

fn set_attribute(node: &Node, name: &str, value: BoundValue) -> Applied {
    match value {
        BoundValue::Show => Applied::Kept,
        BoundValue::Hide => {
            node.remove_attribute(name);
            Applied::Removed
        }
        BoundValue::Scalar(text) => {
            node.set_attribute(name, text);
            Applied::Written
        }
        other => {
            node.set_attribute(name, other.to_json().to_string());
            Applied::Written
        }
    }
}

fn set_property(node: &Node, name: &str, value: BoundValue) -> Applied {
    match value {
        BoundValue::Show => Applied::Kept,
        BoundValue::Hide => {
            node.delete_property(name);
            Applied::Removed
        }
        BoundValue::Scalar(text) => {
            node.set_property(name, Value::String(text));
            Applied::Written
        }
        other => {
            node.set_property(name, other.to_json());
            Applied::Written
        }
    }
}

fn register_listener(node: &Node, event: &str, listener: Callable) {
    trace!(node = %node.id(), event, "registering listener");
    node.add_event_listener(event, move |_| {
        listener.call();
    });
}

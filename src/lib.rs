//! treebind - declarative selector-driven binding of data onto markup trees
//!
//! ```
//! use serde_json::json;
//! use treebind::{Binder, Model, Node};
//!
//! let root = Node::parse("<div><h1>TITLE</h1><ul><li>item</li></ul></div>").unwrap();
//! let model = Model::new(json!({"h1": "Fruits", "li": ["Orange", "Apple"]}));
//!
//! let binder = Binder::new();
//! binder.bind(&root, &model, None)?;
//! assert_eq!(
//!     root.outer_html(),
//!     "<div><h1>Fruits</h1><ul><li>Orange</li><li>Apple</li></ul></div>"
//! );
//!
//! model.update(|m| m["h1"] = json!("Fresh fruits"));
//! assert_eq!(binder.digest()?.rebound, 1);
//! # Ok::<(), treebind::BindError>(())
//! ```

pub mod binder;
pub mod binding;
pub mod config;
pub mod dom;
pub mod error;

pub use binder::{
    bind, bind_value, default_binder, digest, evict, mapper, with_default_binder, BindEvent,
    BindEventKind, Binder, DigestReport, EventLog, Mapper, Model,
};
pub use binding::{BoundValue, Callable, Mapping, SelectorKey, TargetKind, HIDE, SHOW};
pub use config::BindConfig;
pub use dom::{Node, NodeId, Selector, WeakNode};
pub use error::{BindError, FixSuggestion, Result};

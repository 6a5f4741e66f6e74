//! Binding Module - mappings applied to markup subtrees
//!
//! Pure engine, no registry state:
//! - `key`: selector keys (`selector`, `selector@attr`, `selector:prop`)
//! - `value`: bound values, mappings and the `SHOW`/`HIDE` sentinels
//! - `resolve`: key -> matched nodes
//! - `setter`: one value onto one node
//! - `mapper`: recursive walk with sequence-driven repetition
//!
//! Data flow:
//! ```text
//! JSON / builder  →  Mapping (keys parsed once)
//!                          ↓
//!                  map(root, mapping)
//!                          ↓
//!              resolve(key) → matched nodes
//!                          ↓
//!          recurse | repeat | set(node, kind, name, value)
//! ```

mod key;
mod mapper;
mod resolve;
mod setter;
mod value;

// Re-export public types
pub use key::{NodeTarget, SelectorKey, TargetKind};
pub use mapper::{map, MapStats};
pub use resolve::{resolve, Matches};
pub use setter::{set, Applied};
pub use value::{BoundValue, Callable, Mapping, HIDE, SHOW};

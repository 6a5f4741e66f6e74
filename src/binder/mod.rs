//! Binder Module - registry of bound roots
//!
//! A `Binder` remembers, per root node:
//! - the pristine template (`snapshot`), restored before every bind
//! - the model, mapper and last fingerprint (`cache`), used by `digest`
//!
//! Both registries hold roots weakly. A thread-local default binder backs
//! the crate-level `bind`, `bind_value`, `digest` and `evict` functions.
//!
//! Bind order:
//! ```text
//! reentrancy check → model conflict check → mapper → reset → map → cache
//! ```
//! Everything that can fail because of the caller's input (conflicts, mapper
//! errors, malformed keys in the model) fails before the tree is touched.

mod cache;
mod digest;
mod events;
mod model;
mod snapshot;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::binding::{map, BoundValue};
use crate::config::BindConfig;
use crate::dom::{Node, NodeId, WeakNode};
use crate::error::{BindError, Result};

use cache::BindingCache;
use model::{Binding, ModelBinding};
use snapshot::{ResetOutcome, Snapshots};

pub use digest::DigestReport;
pub use events::{BindEvent, BindEventKind, EventLog};
pub use model::{mapper, Mapper, Model};

/// Registry of bound roots
///
/// Not `Send`: trees, models and callables are single-threaded.
pub struct Binder {
    config: BindConfig,
    snapshots: RefCell<Snapshots>,
    cache: RefCell<BindingCache>,
    /// Roots currently inside `bind`
    active: RefCell<Vec<WeakNode>>,
    digesting: Cell<bool>,
    events: EventLog,
}

impl Binder {
    pub fn new() -> Self {
        Self::with_config(BindConfig::default())
    }

    pub fn with_config(config: BindConfig) -> Self {
        let events = EventLog::with_capacity(config.event_log_capacity);
        Self {
            config,
            snapshots: RefCell::default(),
            cache: RefCell::default(),
            active: RefCell::default(),
            digesting: Cell::new(false),
            events,
        }
    }

    pub fn config(&self) -> &BindConfig {
        &self.config
    }

    /// Audit trail of binds, resets and digest passes
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Bind `model` onto `root`
    ///
    /// With a mapper, the mapper turns the model into a mapping (or `None`,
    /// which leaves the root as it is). Without one, the model's JSON form
    /// is the mapping. The root is reset to its template first, so binding
    /// twice with the same data gives the same tree.
    ///
    /// # Errors
    ///
    /// - `ReentrantBind` if `root` overlaps a root that is being bound
    /// - `ModelConflict` if `root` is bound to another model and no mapper
    ///   is given (with `strict_models`)
    /// - mapper, key and serialization errors, before any mutation
    /// - `Detached` when the mapping iterates or hides a parentless node
    pub fn bind<T>(&self, root: &Node, model: &Model<T>, mapper: Option<Mapper<T>>) -> Result<Node>
    where
        T: Serialize + 'static,
    {
        self.prune();
        self.check_reentrancy(root)?;

        let binding: Rc<dyn ModelBinding> = Rc::new(Binding {
            model: model.clone(),
            mapper,
        });

        if self.config.strict_models && !binding.has_mapper() {
            if let Some(entry) = self.cache.borrow().get(root) {
                if entry.binding.model_addr() != binding.model_addr() {
                    return Err(BindError::ModelConflict { root: root.id() });
                }
            }
        }

        self.apply(root, binding)?;
        Ok(root.clone())
    }

    /// One-shot bind of a literal mapping
    ///
    /// Uses the same snapshot as `bind`, but records nothing in the cache,
    /// so the root does not take part in `digest`.
    pub fn bind_value(&self, root: &Node, value: &BoundValue) -> Result<Node> {
        self.check_reentrancy(root)?;
        let _guard = ActiveGuard::enter(self, root);

        self.reset(root)?;
        let stats = map(root, value, &self.config)?;
        self.record_listeners(&stats.listeners);
        self.events.emit(BindEventKind::RootBound {
            root: root.id(),
            writes: stats.writes,
            clones: stats.clones,
            mapped: true,
        });
        Ok(root.clone())
    }

    /// Forget `root`: drop its snapshot and cache entry
    ///
    /// The tree is left as it is. Returns false if nothing was recorded.
    pub fn evict(&self, root: &Node) -> bool {
        let had_snapshot = self.snapshots.borrow_mut().remove(root);
        let had_entry = self.cache.borrow_mut().remove(root);
        let evicted = had_snapshot || had_entry;
        if evicted {
            debug!(root = %root.id(), "root evicted");
            self.events.emit(BindEventKind::RootEvicted { root: root.id() });
        }
        evicted
    }

    /// Check if `root` has a cache entry (i.e. takes part in `digest`)
    pub fn is_bound(&self, root: &Node) -> bool {
        self.cache.borrow().get(root).is_some()
    }

    /// Pristine template recorded for `root`, as a fresh detached copy
    pub fn template(&self, root: &Node) -> Option<Node> {
        self.snapshots.borrow().pristine(root)
    }

    /// Number of cache entries (dead roots included until the next prune)
    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop registry entries whose root is gone; returns the number of cache entries dropped
    pub fn prune(&self) -> usize {
        let snapshots = self.snapshots.borrow_mut().prune();
        let entries = self.cache.borrow_mut().prune();
        if snapshots + entries > 0 {
            trace!(snapshots, entries, "pruned dead roots");
        }
        entries
    }

    // ─────────────────────────────────────────────────────────────
    // Shared bind path (bind + digest)
    // ─────────────────────────────────────────────────────────────

    /// Run mapper, reset, map and record the new fingerprint
    fn apply(&self, root: &Node, binding: Rc<dyn ModelBinding>) -> Result<()> {
        let _guard = ActiveGuard::enter(self, root);

        let mapping = binding.mapping(root)?;
        let (writes, clones, mapped) = match &mapping {
            Some(value) => {
                self.reset(root)?;
                let stats = map(root, value, &self.config)?;
                self.record_listeners(&stats.listeners);
                (stats.writes, stats.clones, true)
            }
            None => {
                if self.snapshots.borrow().contains(root) {
                    self.reset(root)?;
                }
                (0, 0, false)
            }
        };

        let fingerprint = binding.fingerprint()?;
        self.cache.borrow_mut().upsert(root, binding, fingerprint);

        debug!(root = %root.id(), writes, clones, mapped, "root bound");
        self.events.emit(BindEventKind::RootBound {
            root: root.id(),
            writes,
            clones,
            mapped,
        });
        Ok(())
    }

    fn reset(&self, root: &Node) -> Result<()> {
        let outcome = self
            .snapshots
            .borrow_mut()
            .reset(root, self.config.restore_root_attributes)?;
        self.events.emit(match outcome {
            ResetOutcome::Taken => BindEventKind::SnapshotTaken { root: root.id() },
            ResetOutcome::Restored => BindEventKind::RootReset { root: root.id() },
        });
        Ok(())
    }

    fn record_listeners(&self, listeners: &[(NodeId, String)]) {
        for (node, event) in listeners {
            self.events.emit(BindEventKind::ListenerRegistered {
                node: *node,
                event: event.clone(),
            });
        }
    }

    /// Active root overlapping `root` (ancestor-or-self or descendant-or-self)
    fn overlapping_active(&self, root: &Node) -> Option<NodeId> {
        self.active
            .borrow()
            .iter()
            .filter_map(WeakNode::upgrade)
            .find(|active| active.contains(root) || root.contains(active))
            .map(|active| active.id())
    }

    fn check_reentrancy(&self, root: &Node) -> Result<()> {
        match self.overlapping_active(root) {
            Some(active) => Err(BindError::ReentrantBind {
                root: root.id(),
                active,
            }),
            None => Ok(()),
        }
    }
}

impl Default for Binder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Binder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binder")
            .field("entries", &self.cache.borrow().len())
            .field("snapshots", &self.snapshots.borrow().len())
            .field("active", &self.active.borrow().len())
            .finish()
    }
}

/// Marks a root as being bound for the guard's lifetime
struct ActiveGuard<'a> {
    binder: &'a Binder,
}

impl<'a> ActiveGuard<'a> {
    fn enter(binder: &'a Binder, root: &Node) -> Self {
        binder.active.borrow_mut().push(root.downgrade());
        Self { binder }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.binder.active.borrow_mut().pop();
    }
}

// ═══════════════════════════════════════════════════════════════
// Thread-local default binder
// ═══════════════════════════════════════════════════════════════

thread_local! {
    static DEFAULT_BINDER: Rc<Binder> = Rc::new(Binder::new());
}

/// Shared handle to this thread's default binder
pub fn default_binder() -> Rc<Binder> {
    DEFAULT_BINDER.with(Rc::clone)
}

/// Run `f` with this thread's default binder
pub fn with_default_binder<R>(f: impl FnOnce(&Binder) -> R) -> R {
    f(&default_binder())
}

/// `Binder::bind` on the default binder
pub fn bind<T>(root: &Node, model: &Model<T>, mapper: Option<Mapper<T>>) -> Result<Node>
where
    T: Serialize + 'static,
{
    with_default_binder(|binder| binder.bind(root, model, mapper))
}

/// `Binder::bind_value` on the default binder
pub fn bind_value(root: &Node, value: &BoundValue) -> Result<Node> {
    with_default_binder(|binder| binder.bind_value(root, value))
}

/// `Binder::digest` on the default binder
pub fn digest() -> Result<DigestReport> {
    with_default_binder(Binder::digest)
}

/// `Binder::evict` on the default binder
pub fn evict(root: &Node) -> bool {
    with_default_binder(|binder| binder.evict(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Mapping;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn dom(html: &str) -> Node {
        Node::parse(html).unwrap()
    }

    #[test]
    fn bind_without_mapper_uses_model_as_mapping() {
        let binder = Binder::new();
        let root = dom("<div><span>NAME</span></div>");
        let model = Model::new(json!({"span": "John"}));

        binder.bind(&root, &model, None).unwrap();

        assert_eq!(root.outer_html(), "<div><span>John</span></div>");
        assert!(binder.is_bound(&root));
        assert_eq!(binder.len(), 1);
    }

    #[test]
    fn rebinding_starts_from_template() {
        let binder = Binder::new();
        let root = dom("<ul><li>x</li></ul>");
        let model = Model::new(json!({"li": ["a", "b"]}));

        binder.bind(&root, &model, None).unwrap();
        model.update(|m| m["li"] = json!(["c"]));
        binder.bind(&root, &model, None).unwrap();

        assert_eq!(root.outer_html(), "<ul><li>c</li></ul>");
        assert_eq!(
            binder.template(&root).unwrap().outer_html(),
            "<ul><li>x</li></ul>"
        );
    }

    #[test]
    fn different_model_without_mapper_conflicts_before_mutation() {
        let binder = Binder::new();
        let root = dom("<div><span></span></div>");
        binder
            .bind(&root, &Model::new(json!({"span": "a"})), None)
            .unwrap();
        let before = root.outer_html();

        let err = binder
            .bind(&root, &Model::new(json!({"span": "b"})), None)
            .unwrap_err();

        assert_eq!(err.code(), "BIND-020");
        assert_eq!(root.outer_html(), before);
    }

    #[test]
    fn different_model_with_mapper_is_allowed() {
        let binder = Binder::new();
        let root = dom("<div><span></span></div>");
        binder
            .bind(&root, &Model::new(json!({"span": "a"})), None)
            .unwrap();

        let other = Model::new("b".to_string());
        let to_span = mapper(|name: &String, _: &Node| {
            Ok(Some(Mapping::new().with("span", name.as_str())?.into()))
        });
        binder.bind(&root, &other, Some(to_span)).unwrap();

        assert_eq!(root.outer_html(), "<div><span>b</span></div>");
    }

    #[test]
    fn lenient_models_rebind_freely() {
        let binder = Binder::with_config(BindConfig {
            strict_models: false,
            ..BindConfig::default()
        });
        let root = dom("<p></p>");
        binder.bind(&root, &Model::new(json!({"@title": "a"})), None).unwrap();
        binder.bind(&root, &Model::new(json!({"@title": "b"})), None).unwrap();
        assert_eq!(root.attribute("title").as_deref(), Some("b"));
    }

    #[test]
    fn mapper_none_leaves_fresh_root_untouched() {
        let binder = Binder::new();
        let root = dom("<div>keep</div>");
        let model = Model::new(0u8);
        let nothing = mapper(|_: &u8, _: &Node| Ok(None));

        binder.bind(&root, &model, Some(nothing)).unwrap();

        assert_eq!(root.outer_html(), "<div>keep</div>");
        assert!(binder.template(&root).is_none());
        assert!(binder.is_bound(&root));
    }

    #[test]
    fn mapper_none_resets_previously_bound_root() {
        let binder = Binder::new();
        let root = dom("<div><b>t</b></div>");
        let model = Model::new(true);
        let conditional = mapper(|on: &bool, _: &Node| {
            Ok(on.then(|| Mapping::new().with("b", "on").unwrap().into()))
        });

        binder.bind(&root, &model, Some(conditional.clone())).unwrap();
        assert_eq!(root.outer_html(), "<div><b>on</b></div>");

        model.replace(false);
        binder.bind(&root, &model, Some(conditional)).unwrap();
        assert_eq!(root.outer_html(), "<div><b>t</b></div>");
    }

    #[test]
    fn mapper_errors_surface_before_mutation() {
        let binder = Binder::new();
        let root = dom("<div>keep</div>");
        let failing = mapper(|_: &u8, _: &Node| Err(BindError::mapper("no data")));

        let err = binder.bind(&root, &Model::new(1u8), Some(failing)).unwrap_err();

        assert_eq!(err.code(), "BIND-041");
        assert_eq!(root.outer_html(), "<div>keep</div>");
        assert!(!binder.is_bound(&root));
    }

    #[test]
    fn bind_value_is_not_cached() {
        let binder = Binder::new();
        let root = dom("<div><i></i></div>");
        let value = BoundValue::from_json(json!({"i": ["1", "2"]})).unwrap();

        binder.bind_value(&root, &value).unwrap();
        binder.bind_value(&root, &value).unwrap();

        assert_eq!(root.outer_html(), "<div><i>1</i><i>2</i></div>");
        assert!(!binder.is_bound(&root));
        assert!(binder.template(&root).is_some());
    }

    #[test]
    fn evict_forgets_root() {
        let binder = Binder::new();
        let root = dom("<div><span></span></div>");
        binder
            .bind(&root, &Model::new(json!({"span": "x"})), None)
            .unwrap();

        assert!(binder.evict(&root));
        assert!(!binder.evict(&root));
        assert!(binder.is_empty());
        assert_eq!(root.outer_html(), "<div><span>x</span></div>");
        // next bind treats the current tree as the template
        binder
            .bind(&root, &Model::new(json!({"@id": "y"})), None)
            .unwrap();
        assert_eq!(
            binder.template(&root).unwrap().outer_html(),
            "<div><span>x</span></div>"
        );
    }

    #[test]
    fn events_trace_the_bind_lifecycle() {
        let binder = Binder::new();
        let root = dom("<div><span></span></div>");
        let model = Model::new(json!({"span": "x"}));

        binder.bind(&root, &model, None).unwrap();
        binder.bind(&root, &model, None).unwrap();

        let kinds: Vec<&'static str> = binder
            .events()
            .for_root(root.id())
            .iter()
            .map(|e| match e.kind {
                BindEventKind::SnapshotTaken { .. } => "snapshot",
                BindEventKind::RootReset { .. } => "reset",
                BindEventKind::RootBound { .. } => "bound",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["snapshot", "bound", "reset", "bound"]);
    }

    #[test]
    fn active_guard_pops_on_error() {
        let binder = Binder::new();
        let root = dom("<li>x</li>");
        let model = Model::new(json!({".": ["a"]}));

        assert_eq!(binder.bind(&root, &model, None).unwrap_err().code(), "BIND-030");
        assert!(binder.active.borrow().is_empty());
    }

    #[test]
    fn default_binder_is_shared_per_thread() {
        let root = dom("<p></p>");
        let model = Model::new(json!({"@class": "x"}));
        bind(&root, &model, None).unwrap();
        assert!(with_default_binder(|b| b.is_bound(&root)));
        assert!(evict(&root));
    }
}

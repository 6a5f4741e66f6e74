//! In-memory markup tree
//!
//! The binding engine treats the tree as an external capability: it needs to
//! create, clone, insert, remove and query nodes, and to read and write
//! attributes, properties and event listeners. This module provides that
//! capability as a small DOM-like tree:
//!
//! - `Node`: shared handle (`Rc<RefCell<..>>`) with pointer identity
//! - `WeakNode`: non-owning handle, used by registries keyed by root node
//! - `markup`: lenient fragment parser and serializer
//! - `selector`: CSS selector subset used by `query_selector_all`
//!
//! Parents are held weakly, children strongly, so dropping the last handle to
//! a root frees the whole subtree.

mod markup;
pub mod selector;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BindError, Result};

pub use selector::Selector;

/// Monotonic node identity, assigned at creation (clones get fresh ids)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Event passed to listeners by `Node::dispatch_event`
#[derive(Debug, Clone)]
pub struct Event {
    /// Event name without prefix ("click", "change", ...)
    pub name: String,
    /// Node the event was dispatched on
    pub target: Node,
}

/// Event listener callback
pub type Listener = Rc<dyn Fn(&Event)>;

/// Element payload: tag, ordered attributes, typed properties, listeners
#[derive(Default)]
struct ElementData {
    tag: String,
    attributes: Vec<(String, String)>,
    properties: FxHashMap<String, Value>,
    listeners: Vec<(String, Listener)>,
}

enum NodeKind {
    Element(ElementData),
    Text(String),
    Comment(String),
}

struct NodeData {
    id: NodeId,
    kind: NodeKind,
    parent: Weak<RefCell<NodeData>>,
    children: Vec<Node>,
}

/// Shared handle to a tree node
///
/// Cloning the handle does not clone the node; use `deep_clone` for that.
/// Equality is identity.
#[derive(Clone)]
pub struct Node(Rc<RefCell<NodeData>>);

/// Non-owning handle to a tree node
#[derive(Clone)]
pub struct WeakNode(Weak<RefCell<NodeData>>);

impl WeakNode {
    /// Get the node back if it is still alive
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node)
    }

    /// Check if the node has been dropped
    pub fn is_dead(&self) -> bool {
        self.0.strong_count() == 0
    }

    /// Address used as a registry key (stable while any weak handle exists)
    pub(crate) fn addr(&self) -> usize {
        self.0.as_ptr() as *const () as usize
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(node) => write!(f, "WeakNode({})", node.id()),
            None => f.write_str("WeakNode(<dropped>)"),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id())
            .field("html", &self.outer_html())
            .finish()
    }
}

impl Node {
    fn from_kind(kind: NodeKind) -> Self {
        Self(Rc::new(RefCell::new(NodeData {
            id: NodeId::next(),
            kind,
            parent: Weak::new(),
            children: Vec::new(),
        })))
    }

    /// Create an element (tag is lowercased)
    pub fn element(tag: &str) -> Self {
        Self::from_kind(NodeKind::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            ..ElementData::default()
        }))
    }

    /// Create a text node
    pub fn text(content: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Text(content.into()))
    }

    /// Create a comment node
    pub fn comment(content: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Comment(content.into()))
    }

    /// Parse markup into a list of detached top-level nodes
    pub fn parse_fragment(source: &str) -> Vec<Node> {
        markup::parse_fragment(source)
    }

    /// Parse markup and return its first top-level element
    pub fn parse(source: &str) -> Option<Node> {
        Self::parse_fragment(source)
            .into_iter()
            .find(Node::is_element)
    }

    // ─────────────────────────────────────────────────────────────
    // Identity
    // ─────────────────────────────────────────────────────────────

    pub fn id(&self) -> NodeId {
        self.0.borrow().id
    }

    /// Identity comparison (same underlying node)
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    /// Address used as a registry key, same as `WeakNode::addr`
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn is_element(&self) -> bool {
        matches!(self.0.borrow().kind, NodeKind::Element(_))
    }

    /// Lowercase tag name for elements, `None` otherwise
    pub fn tag_name(&self) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Element(el) => Some(el.tag.clone()),
            _ => None,
        }
    }

    pub(crate) fn has_tag(&self, tag: &str) -> bool {
        match &self.0.borrow().kind {
            NodeKind::Element(el) => el.tag.eq_ignore_ascii_case(tag),
            _ => false,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Structure
    // ─────────────────────────────────────────────────────────────

    pub fn parent(&self) -> Option<Node> {
        self.0.borrow().parent.upgrade().map(Node)
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.borrow().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.borrow().children.len()
    }

    /// Child elements only (text and comments skipped)
    pub fn element_children(&self) -> Vec<Node> {
        self.children().into_iter().filter(Node::is_element).collect()
    }

    /// Element siblings that precede this node, nearest first
    pub(crate) fn preceding_element_siblings(&self) -> Vec<Node> {
        let Some(parent) = self.parent() else {
            return Vec::new();
        };
        let siblings = parent.children();
        let Some(pos) = siblings.iter().position(|s| s.ptr_eq(self)) else {
            return Vec::new();
        };
        siblings[..pos]
            .iter()
            .rev()
            .filter(|s| s.is_element())
            .cloned()
            .collect()
    }

    /// Check if `other` is this node or one of its descendants
    pub fn contains(&self, other: &Node) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if node.ptr_eq(self) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    fn check_insertable(&self, child: &Node) -> Result<()> {
        if child.contains(self) {
            return Err(BindError::HierarchyCycle {
                node: child.id(),
                parent: self.id(),
            });
        }
        Ok(())
    }

    /// Append `child`, moving it out of its current parent first
    pub fn append_child(&self, child: &Node) -> Result<()> {
        self.check_insertable(child)?;
        child.detach();
        child.0.borrow_mut().parent = Rc::downgrade(&self.0);
        self.0.borrow_mut().children.push(child.clone());
        Ok(())
    }

    /// Insert `child` immediately before `reference`, which must be a child of this node
    pub fn insert_before(&self, child: &Node, reference: &Node) -> Result<()> {
        self.check_insertable(child)?;
        if child.ptr_eq(reference) {
            return Ok(());
        }
        if !self.has_child(reference) {
            return Err(BindError::NotAChild {
                node: reference.id(),
                parent: self.id(),
            });
        }
        child.detach();
        let pos = self
            .0
            .borrow()
            .children
            .iter()
            .position(|c| c.ptr_eq(reference))
            .ok_or(BindError::NotAChild {
                node: reference.id(),
                parent: self.id(),
            })?;
        child.0.borrow_mut().parent = Rc::downgrade(&self.0);
        self.0.borrow_mut().children.insert(pos, child.clone());
        Ok(())
    }

    fn has_child(&self, child: &Node) -> bool {
        self.0.borrow().children.iter().any(|c| c.ptr_eq(child))
    }

    /// Remove `child` from this node
    pub fn remove_child(&self, child: &Node) -> Result<()> {
        let pos = self
            .0
            .borrow()
            .children
            .iter()
            .position(|c| c.ptr_eq(child))
            .ok_or(BindError::NotAChild {
                node: child.id(),
                parent: self.id(),
            })?;
        self.0.borrow_mut().children.remove(pos);
        child.0.borrow_mut().parent = Weak::new();
        Ok(())
    }

    /// Detach from the current parent; returns false if there was none
    pub fn detach(&self) -> bool {
        match self.parent() {
            Some(parent) => parent.remove_child(self).is_ok(),
            None => false,
        }
    }

    /// Remove every child of this node
    pub fn clear_children(&self) {
        let children = std::mem::take(&mut self.0.borrow_mut().children);
        for child in children {
            child.0.borrow_mut().parent = Weak::new();
        }
    }

    /// Structural deep copy: kind, attributes and descendants
    ///
    /// Properties and listeners are not copied (same as DOM `cloneNode(true)`).
    pub fn deep_clone(&self) -> Node {
        let kind = match &self.0.borrow().kind {
            NodeKind::Element(el) => NodeKind::Element(ElementData {
                tag: el.tag.clone(),
                attributes: el.attributes.clone(),
                ..ElementData::default()
            }),
            NodeKind::Text(t) => NodeKind::Text(t.clone()),
            NodeKind::Comment(c) => NodeKind::Comment(c.clone()),
        };
        let copy = Node::from_kind(kind);
        for child in self.children() {
            let child_copy = child.deep_clone();
            child_copy.0.borrow_mut().parent = Rc::downgrade(&copy.0);
            copy.0.borrow_mut().children.push(child_copy);
        }
        copy
    }

    // ─────────────────────────────────────────────────────────────
    // Attributes
    // ─────────────────────────────────────────────────────────────

    pub fn attribute(&self, name: &str) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Element(el) => el
                .attributes
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// All attributes in declaration order
    pub fn attributes(&self) -> Vec<(String, String)> {
        match &self.0.borrow().kind {
            NodeKind::Element(el) => el.attributes.clone(),
            _ => Vec::new(),
        }
    }

    /// Set an attribute, keeping its position if it already exists (no-op on non-elements)
    pub fn set_attribute(&self, name: &str, value: impl Into<String>) {
        if let NodeKind::Element(el) = &mut self.0.borrow_mut().kind {
            let value = value.into();
            match el
                .attributes
                .iter_mut()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
            {
                Some(slot) => slot.1 = value,
                None => el.attributes.push((name.to_ascii_lowercase(), value)),
            }
        }
    }

    /// Remove an attribute; returns true if it existed
    pub fn remove_attribute(&self, name: &str) -> bool {
        if let NodeKind::Element(el) = &mut self.0.borrow_mut().kind {
            let before = el.attributes.len();
            el.attributes.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
            return el.attributes.len() != before;
        }
        false
    }

    /// Replace all attributes at once
    pub fn replace_attributes(&self, attributes: Vec<(String, String)>) {
        if let NodeKind::Element(el) = &mut self.0.borrow_mut().kind {
            el.attributes = attributes;
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Properties (typed, not serialized to markup)
    // ─────────────────────────────────────────────────────────────

    pub fn property(&self, name: &str) -> Option<Value> {
        match &self.0.borrow().kind {
            NodeKind::Element(el) => el.properties.get(name).cloned(),
            _ => None,
        }
    }

    pub fn set_property(&self, name: &str, value: Value) {
        if let NodeKind::Element(el) = &mut self.0.borrow_mut().kind {
            el.properties.insert(name.to_string(), value);
        }
    }

    /// All properties (empty for non-elements)
    pub(crate) fn properties(&self) -> FxHashMap<String, Value> {
        match &self.0.borrow().kind {
            NodeKind::Element(el) => el.properties.clone(),
            _ => FxHashMap::default(),
        }
    }

    pub(crate) fn replace_properties(&self, properties: FxHashMap<String, Value>) {
        if let NodeKind::Element(el) = &mut self.0.borrow_mut().kind {
            el.properties = properties;
        }
    }

    /// Delete a property; returns true if it existed
    pub fn delete_property(&self, name: &str) -> bool {
        match &mut self.0.borrow_mut().kind {
            NodeKind::Element(el) => el.properties.remove(name).is_some(),
            _ => false,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────

    pub fn add_event_listener(&self, event: &str, listener: impl Fn(&Event) + 'static) {
        if let NodeKind::Element(el) = &mut self.0.borrow_mut().kind {
            el.listeners.push((event.to_string(), Rc::new(listener)));
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        match &self.0.borrow().kind {
            NodeKind::Element(el) => el.listeners.iter().filter(|(e, _)| e == event).count(),
            _ => 0,
        }
    }

    /// Listeners registered for any event
    pub(crate) fn total_listeners(&self) -> usize {
        match &self.0.borrow().kind {
            NodeKind::Element(el) => el.listeners.len(),
            _ => 0,
        }
    }

    /// Drop every listener registered after the first `keep`
    pub(crate) fn truncate_listeners(&self, keep: usize) {
        if let NodeKind::Element(el) = &mut self.0.borrow_mut().kind {
            el.listeners.truncate(keep);
        }
    }

    /// Invoke the listeners for `event` in registration order; returns how many ran
    ///
    /// The listener list is copied before the first call, so listeners may
    /// mutate the tree (including this node) without affecting this dispatch.
    pub fn dispatch_event(&self, event: &str) -> usize {
        let listeners: Vec<Listener> = match &self.0.borrow().kind {
            NodeKind::Element(el) => el
                .listeners
                .iter()
                .filter(|(e, _)| e == event)
                .map(|(_, l)| Rc::clone(l))
                .collect(),
            _ => Vec::new(),
        };
        let payload = Event {
            name: event.to_string(),
            target: self.clone(),
        };
        for listener in &listeners {
            listener(&payload);
        }
        listeners.len()
    }

    // ─────────────────────────────────────────────────────────────
    // Content
    // ─────────────────────────────────────────────────────────────

    /// Replace all children with the parsed `source` markup
    pub fn set_inner_html(&self, source: &str) {
        self.clear_children();
        if !self.is_element() {
            if let NodeKind::Text(t) = &mut self.0.borrow_mut().kind {
                *t = source.to_string();
            }
            return;
        }
        for child in markup::parse_fragment(source) {
            child.0.borrow_mut().parent = Rc::downgrade(&self.0);
            self.0.borrow_mut().children.push(child);
        }
    }

    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        markup::serialize_children(self, &mut out);
        out
    }

    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        markup::serialize(self, &mut out);
        out
    }

    /// Concatenated text of this node and its descendants
    pub fn text_content(&self) -> String {
        match &self.0.borrow().kind {
            NodeKind::Text(t) => return t.clone(),
            NodeKind::Comment(_) => return String::new(),
            NodeKind::Element(_) => {}
        }
        self.children().iter().map(Node::text_content).collect()
    }

    // ─────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────

    /// Descendant elements matching `selector`, in document order
    pub fn query_selector_all(&self, selector: &Selector) -> Vec<Node> {
        let mut found = Vec::new();
        self.collect_matches(selector, &mut found);
        found
    }

    fn collect_matches(&self, selector: &Selector, found: &mut Vec<Node>) {
        for child in self.children() {
            if child.is_element() {
                if selector.matches(&child) {
                    found.push(child.clone());
                }
                child.collect_matches(selector, found);
            }
        }
    }

    /// Parse `selector` and query descendants
    pub fn select(&self, selector: &str) -> Result<Vec<Node>> {
        Ok(self.query_selector_all(&Selector::parse(selector)?))
    }

    /// First descendant matching `selector`
    pub fn select_first(&self, selector: &str) -> Result<Option<Node>> {
        Ok(self.select(selector)?.into_iter().next())
    }

    pub(crate) fn with_text<R>(&self, f: impl FnOnce(Option<&str>) -> R) -> R {
        match &self.0.borrow().kind {
            NodeKind::Text(t) => f(Some(t)),
            _ => f(None),
        }
    }

    pub(crate) fn with_comment<R>(&self, f: impl FnOnce(Option<&str>) -> R) -> R {
        match &self.0.borrow().kind {
            NodeKind::Comment(c) => f(Some(c)),
            _ => f(None),
        }
    }

    pub(crate) fn push_parsed_child(&self, child: Node) {
        child.0.borrow_mut().parent = Rc::downgrade(&self.0);
        self.0.borrow_mut().children.push(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn dom(html: &str) -> Node {
        Node::parse(html).unwrap()
    }

    #[test]
    fn parse_and_serialize_roundtrip() {
        let node = dom("<div class='a'>Hello <span>NAME</span>!</div>");
        assert_eq!(
            node.outer_html(),
            "<div class=\"a\">Hello <span>NAME</span>!</div>"
        );
        assert_eq!(node.inner_html(), "Hello <span>NAME</span>!");
    }

    #[test]
    fn append_moves_child_between_parents() {
        let a = Node::element("div");
        let b = Node::element("div");
        let child = Node::text("x");

        a.append_child(&child).unwrap();
        b.append_child(&child).unwrap();

        assert_eq!(a.child_count(), 0);
        assert_eq!(b.child_count(), 1);
        assert!(child.parent().unwrap().ptr_eq(&b));
    }

    #[test]
    fn insert_before_places_node_in_order() {
        let list = dom("<ul><li>b</li></ul>");
        let b = list.children()[0].clone();
        let a = dom("<li>a</li>");

        list.insert_before(&a, &b).unwrap();

        assert_eq!(list.outer_html(), "<ul><li>a</li><li>b</li></ul>");
    }

    #[test]
    fn insert_before_rejects_foreign_reference() {
        let list = dom("<ul><li>b</li></ul>");
        let stranger = Node::element("li");
        let err = list.insert_before(&Node::element("li"), &stranger).unwrap_err();
        assert_eq!(err.code(), "BIND-031");
    }

    #[test]
    fn inserting_an_ancestor_is_rejected() {
        let outer = dom("<div><p></p></div>");
        let inner = outer.children()[0].clone();
        let err = inner.append_child(&outer).unwrap_err();
        assert_eq!(err.code(), "BIND-032");
    }

    #[test]
    fn deep_clone_copies_structure_not_properties() {
        let node = dom("<div id='x'><b>bold</b></div>");
        node.set_property("model", json!({"a": 1}));
        node.add_event_listener("click", |_| {});

        let copy = node.deep_clone();

        assert_eq!(copy.outer_html(), node.outer_html());
        assert!(!copy.ptr_eq(&node));
        assert_ne!(copy.id(), node.id());
        assert!(copy.property("model").is_none());
        assert_eq!(copy.listener_count("click"), 0);
        assert!(copy.parent().is_none());
    }

    #[test]
    fn attributes_keep_declaration_order() {
        let node = dom("<a href='/x' title='t'></a>");
        node.set_attribute("href", "/y");
        node.set_attribute("rel", "next");
        assert_eq!(
            node.outer_html(),
            "<a href=\"/y\" title=\"t\" rel=\"next\"></a>"
        );
        assert!(node.remove_attribute("title"));
        assert!(!node.remove_attribute("title"));
    }

    #[test]
    fn properties_are_typed_and_invisible_in_markup() {
        let node = dom("<span></span>");
        node.set_property("model", json!({"name": "John"}));
        assert_eq!(node.property("model"), Some(json!({"name": "John"})));
        assert_eq!(node.outer_html(), "<span></span>");
        assert!(node.delete_property("model"));
        assert!(node.property("model").is_none());
    }

    #[test]
    fn dispatch_runs_listeners_in_order() {
        let node = dom("<button>go</button>");
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = Rc::clone(&log);
            node.add_event_listener("click", move |_| log.borrow_mut().push(i));
        }
        assert_eq!(node.dispatch_event("click"), 3);
        assert_eq!(node.dispatch_event("change"), 0);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn listener_may_mutate_its_own_node() {
        let node = dom("<div><button>go</button></div>");
        let button = node.children()[0].clone();
        let hits = Rc::new(Cell::new(0));
        let hits_in = Rc::clone(&hits);
        button.add_event_listener("click", move |event| {
            hits_in.set(hits_in.get() + 1);
            event.target.set_inner_html("done");
            event.target.detach();
        });

        button.dispatch_event("click");

        assert_eq!(hits.get(), 1);
        assert_eq!(node.outer_html(), "<div></div>");
        assert_eq!(button.outer_html(), "<button>done</button>");
    }

    #[test]
    fn dropping_root_frees_subtree() {
        let node = dom("<div><span></span></div>");
        let weak_child = node.children()[0].downgrade();
        let weak_root = node.downgrade();
        drop(node);
        assert!(weak_root.is_dead());
        assert!(weak_child.upgrade().is_none());
    }

    #[test]
    fn select_finds_descendants_in_document_order() {
        let node = dom("<div><p><i>1</i></p><i>2</i></div>");
        let found = node.select("i").unwrap();
        let texts: Vec<String> = found.iter().map(Node::text_content).collect();
        assert_eq!(texts, vec!["1", "2"]);
        assert!(node.select_first("table").unwrap().is_none());
    }

    #[test]
    fn text_content_concatenates() {
        let node = dom("<p>a<b>b</b><!-- c -->d</p>");
        assert_eq!(node.text_content(), "abd");
    }
}

//! Bound values and binding mappings
//!
//! A `Mapping` is an ordered list of `(SelectorKey, BoundValue)` pairs.
//! Order is significant: later keys see the tree as earlier keys left it.

use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

use super::key::SelectorKey;
use crate::error::Result;

/// Keep the matched node (or attribute/property) exactly as in the template
pub const SHOW: BoundValue = BoundValue::Show;

/// Remove the matched node, attribute or property
pub const HIDE: BoundValue = BoundValue::Hide;

/// Zero-argument function producing a value at bind time
///
/// For event keys (`button@onclick`) the function itself is registered as
/// the listener and is only called when the event fires.
#[derive(Clone)]
pub struct Callable(Rc<dyn Fn() -> BoundValue>);

impl Callable {
    pub fn new(f: impl Fn() -> BoundValue + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self) -> BoundValue {
        (self.0)()
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callable(..)")
    }
}

/// Value bound to a selector key
#[derive(Debug, Clone)]
pub enum BoundValue {
    /// Text-like value; written verbatim as markup for content targets
    Scalar(String),
    /// Keep as-is
    Show,
    /// Remove
    Hide,
    /// Evaluated lazily when bound
    Callable(Callable),
    /// Nested mapping, applied to each matched node
    Mapping(Mapping),
    /// One entry per repetition of each matched node
    Sequence(Vec<BoundValue>),
}

impl BoundValue {
    /// Wrap a closure as a lazily evaluated value
    pub fn from_fn(f: impl Fn() -> BoundValue + 'static) -> Self {
        Self::Callable(Callable::new(f))
    }

    /// Import a JSON document
    ///
    /// Objects become mappings (keys parsed as selector keys, order kept),
    /// arrays become sequences, `true`/`false` become `Show`/`Hide`, strings
    /// and numbers become scalars, and `null` becomes an empty scalar.
    pub fn from_json(value: Value) -> Result<Self> {
        Ok(match value {
            Value::Null => Self::Scalar(String::new()),
            Value::Bool(true) => Self::Show,
            Value::Bool(false) => Self::Hide,
            Value::Number(n) => Self::Scalar(n.to_string()),
            Value::String(s) => Self::Scalar(s),
            Value::Array(items) => Self::Sequence(
                items
                    .into_iter()
                    .map(Self::from_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(map) => Self::Mapping(Mapping::from_json_object(map)?),
        })
    }

    /// Call callables until a non-callable value comes out
    pub fn resolve(self) -> Self {
        let mut value = self;
        while let Self::Callable(f) = value {
            value = f.call();
        }
        value
    }

    /// Typed form written to properties (callables are resolved)
    pub fn to_json(&self) -> Value {
        match self {
            Self::Scalar(s) => Value::String(s.clone()),
            Self::Show => Value::Bool(true),
            Self::Hide => Value::Bool(false),
            Self::Callable(f) => f.call().to_json(),
            Self::Mapping(m) => m.to_json(),
            Self::Sequence(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    /// Short kind name used in logs
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Show => "show",
            Self::Hide => "hide",
            Self::Callable(_) => "callable",
            Self::Mapping(_) => "mapping",
            Self::Sequence(_) => "sequence",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Callable(_))
    }
}

impl From<&str> for BoundValue {
    fn from(s: &str) -> Self {
        Self::Scalar(s.to_string())
    }
}

impl From<String> for BoundValue {
    fn from(s: String) -> Self {
        Self::Scalar(s)
    }
}

impl From<&String> for BoundValue {
    fn from(s: &String) -> Self {
        Self::Scalar(s.clone())
    }
}

impl From<bool> for BoundValue {
    fn from(show: bool) -> Self {
        if show {
            Self::Show
        } else {
            Self::Hide
        }
    }
}

macro_rules! scalar_from_number {
    ($($t:ty),*) => {
        $(impl From<$t> for BoundValue {
            fn from(n: $t) -> Self {
                Self::Scalar(n.to_string())
            }
        })*
    };
}

scalar_from_number!(i32, i64, u32, u64, usize, f64);

impl From<Mapping> for BoundValue {
    fn from(m: Mapping) -> Self {
        Self::Mapping(m)
    }
}

impl From<Callable> for BoundValue {
    fn from(f: Callable) -> Self {
        Self::Callable(f)
    }
}

impl<T: Into<BoundValue>> From<Vec<T>> for BoundValue {
    fn from(items: Vec<T>) -> Self {
        Self::Sequence(items.into_iter().map(Into::into).collect())
    }
}

/// Ordered selector-key -> value pairs
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    entries: Vec<(SelectorKey, BoundValue)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `insert`
    pub fn with(mut self, key: &str, value: impl Into<BoundValue>) -> Result<Self> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Parse `key` and append the pair
    pub fn insert(&mut self, key: &str, value: impl Into<BoundValue>) -> Result<()> {
        let key = SelectorKey::parse(key)?;
        self.entries.push((key, value.into()));
        Ok(())
    }

    /// Append an already parsed key
    pub fn push(&mut self, key: SelectorKey, value: BoundValue) {
        self.entries.push((key, value));
    }

    /// First value bound to the raw key
    pub fn get(&self, raw_key: &str) -> Option<&BoundValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.raw() == raw_key)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SelectorKey, &BoundValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Import a JSON object (see `BoundValue::from_json`)
    pub fn from_json_object(map: Map<String, Value>) -> Result<Self> {
        let mut mapping = Self::new();
        for (key, value) in map {
            let key = SelectorKey::parse(&key)?;
            mapping.push(key, BoundValue::from_json(value)?);
        }
        Ok(mapping)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.raw().to_string(), v.to_json()))
                .collect(),
        )
    }
}

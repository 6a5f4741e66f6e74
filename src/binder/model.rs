//! Shared model handles and mappers

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::binding::BoundValue;
use crate::dom::Node;
use crate::error::Result;

/// Shared, mutable data model
///
/// Clones share the same value; identity (`ptr_eq`) is what the binder
/// uses to tell "same model, new data" from "different model".
pub struct Model<T>(Rc<RefCell<T>>);

impl<T> Model<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// Read access
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.borrow())
    }

    /// Mutate in place; the next digest picks the change up
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    /// Swap in a new value, returning the old one
    pub fn replace(&self, value: T) -> T {
        self.0.replace(value)
    }

    pub fn ptr_eq(&self, other: &Model<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl<T: Clone> Model<T> {
    /// Copy of the current value
    pub fn get(&self) -> T {
        self.0.borrow().clone()
    }
}

impl<T: Serialize> Model<T> {
    /// Order-sensitive serialization used as the change fingerprint
    pub fn fingerprint(&self) -> Result<String> {
        Ok(serde_json::to_string(&*self.0.borrow())?)
    }
}

impl<T> Clone for Model<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Model<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Model").field(&self.0.borrow()).finish()
    }
}

impl<T: Default> Default for Model<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Turns a model into a mapping for a given root; `None` means "leave as is"
pub type Mapper<T> = Rc<dyn Fn(&T, &Node) -> Result<Option<BoundValue>>>;

/// Wrap a closure as a `Mapper`
pub fn mapper<T, F>(f: F) -> Mapper<T>
where
    F: Fn(&T, &Node) -> Result<Option<BoundValue>> + 'static,
{
    Rc::new(f)
}

/// Type-erased model + mapper pair stored in the binding cache
pub(crate) trait ModelBinding {
    /// Identity of the underlying model
    fn model_addr(&self) -> usize;

    fn has_mapper(&self) -> bool;

    fn fingerprint(&self) -> Result<String>;

    /// Mapping to apply to `root`
    ///
    /// Without a mapper the model itself is the mapping, imported through
    /// its JSON form.
    fn mapping(&self, root: &Node) -> Result<Option<BoundValue>>;
}

pub(crate) struct Binding<T> {
    pub(crate) model: Model<T>,
    pub(crate) mapper: Option<Mapper<T>>,
}

impl<T: Serialize> ModelBinding for Binding<T> {
    fn model_addr(&self) -> usize {
        self.model.addr()
    }

    fn has_mapper(&self) -> bool {
        self.mapper.is_some()
    }

    fn fingerprint(&self) -> Result<String> {
        self.model.fingerprint()
    }

    fn mapping(&self, root: &Node) -> Result<Option<BoundValue>> {
        match &self.mapper {
            Some(mapper) => self.model.with(|model| mapper(model, root)),
            None => {
                let json = self.model.with(|model| serde_json::to_value(model))?;
                Ok(Some(BoundValue::from_json(json)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clones_share_state() {
        let a = Model::new(vec![1, 2]);
        let b = a.clone();
        b.update(|v| v.push(3));
        assert_eq!(a.get(), vec![1, 2, 3]);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Model::new(vec![1, 2, 3])));
    }

    #[test]
    fn fingerprint_tracks_changes() {
        let model = Model::new(json!({"a": 1, "b": [1, 2]}));
        let before = model.fingerprint().unwrap();
        assert_eq!(before, "{\"a\":1,\"b\":[1,2]}");

        model.update(|v| v["b"] = json!([1, 2, 3]));
        assert_ne!(model.fingerprint().unwrap(), before);
    }

    #[test]
    fn replace_returns_old_value() {
        let model = Model::new("old".to_string());
        assert_eq!(model.replace("new".to_string()), "old");
        assert_eq!(model.get(), "new");
    }

    #[test]
    fn binding_without_mapper_imports_model() {
        let binding = Binding {
            model: Model::new(json!({"span": "John"})),
            mapper: None,
        };
        let root = Node::element("div");
        let Some(BoundValue::Mapping(mapping)) = binding.mapping(&root).unwrap() else {
            panic!("expected mapping");
        };
        assert_eq!(mapping.len(), 1);
        assert!(!binding.has_mapper());
    }

    #[test]
    fn binding_with_mapper_sees_model_and_root() {
        let binding = Binding {
            model: Model::new(3usize),
            mapper: Some(mapper(|count: &usize, root: &Node| {
                Ok(Some(format!("{}:{}", root.tag_name().unwrap_or_default(), count).into()))
            })),
        };
        let root = Node::element("p");
        match binding.mapping(&root).unwrap() {
            Some(BoundValue::Scalar(s)) => assert_eq!(s, "p:3"),
            other => panic!("unexpected {other:?}"),
        }
    }
}

//! Evaluation namespaces.
//!
//! All fragments of a run share one [`Namespace`]. Each fragment evaluates
//! through its own [`View`], which holds the fragment's pipe value and,
//! under the `keywords` decorator, the entries of the current element.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::builtins;
use crate::core::Rescope;
use crate::error::{ExceptionKind, FragmentError, type_error};
use crate::value::Value;

/// Default name of the variable holding the current element.
pub const PIPE_NAME: &str = "pipe";

/// Names shared by every fragment of a run.
pub struct Namespace {
    vars: RefCell<BTreeMap<String, Value>>,
}

impl Namespace {
    /// A namespace with the `spy` and `itertools` modules imported.
    pub fn new() -> Rc<Self> {
        let vars = builtins::modules()
            .into_iter()
            .map(|module| (module.name().to_string(), Value::Module(module)))
            .collect();
        Rc::new(Self {
            vars: RefCell::new(vars),
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    /// Remove `name`, returning whether it was bound.
    pub fn delete(&self, name: &str) -> bool {
        self.vars.borrow_mut().remove(name).is_some()
    }

    fn entries(&self) -> Vec<(String, Value)> {
        self.vars
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// One fragment's window onto the shared [`Namespace`].
///
/// Reads see the pipe value first, then keyword entries, then the shared
/// names. Writes to anything but the pipe go to the shared namespace.
pub struct View {
    base: Rc<Namespace>,
    pipe_name: String,
    pipe: RefCell<Value>,
    keywords: RefCell<Option<Rc<BTreeMap<String, Value>>>>,
}

impl View {
    pub fn new(base: Rc<Namespace>, pipe_name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            base,
            pipe_name: pipe_name.into(),
            pipe: RefCell::new(Value::None),
            keywords: RefCell::new(None),
        })
    }

    pub fn pipe_name(&self) -> &str {
        &self.pipe_name
    }

    pub fn pipe(&self) -> Value {
        self.pipe.borrow().clone()
    }

    pub fn set_pipe(&self, value: Value) {
        *self.pipe.borrow_mut() = value;
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if name == self.pipe_name {
            return Some(self.pipe());
        }
        if let Some(keywords) = self.keywords.borrow().as_ref()
            && let Some(value) = keywords.get(name)
        {
            return Some(value.clone());
        }
        self.base.get(name)
    }

    pub fn set(&self, name: &str, value: Value) {
        if name == self.pipe_name {
            self.set_pipe(value);
        } else {
            self.base.set(name, value);
        }
    }

    pub fn delete(&self, name: &str) -> Result<(), FragmentError> {
        let shadowed = self
            .keywords
            .borrow()
            .as_ref()
            .is_some_and(|keywords| keywords.contains_key(name));
        if name == self.pipe_name || shadowed {
            return Err(type_error(format!("can't delete '{name}'")));
        }
        if self.base.delete(name) {
            Ok(())
        } else {
            Err(FragmentError::new(
                ExceptionKind::NameError,
                format!("name '{name}' is not defined"),
            ))
        }
    }

    /// Every visible name, as a dict.
    pub fn snapshot(&self) -> Value {
        let mut entries: BTreeMap<String, Value> = self.base.entries().into_iter().collect();
        if let Some(keywords) = self.keywords.borrow().as_ref() {
            entries.extend(keywords.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        entries.insert(self.pipe_name.clone(), self.pipe());
        Value::Dict(Rc::new(entries))
    }
}

impl Rescope for View {
    fn rescope(&self, scope: Option<&Value>) -> Result<(), FragmentError> {
        let keywords = match scope {
            None => None,
            Some(Value::Dict(entries)) => Some(Rc::clone(entries)),
            Some(other) => {
                return Err(type_error(format!(
                    "keywords must be a dict, not '{}'",
                    other.type_name()
                )));
            }
        };
        *self.keywords.borrow_mut() = keywords;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modules_preloaded() {
        let ns = Namespace::new();
        assert!(matches!(ns.get("spy"), Some(Value::Module(_))));
        assert!(matches!(ns.get("itertools"), Some(Value::Module(_))));
    }

    #[test]
    fn test_writes_go_to_base() {
        let ns = Namespace::new();
        let first = View::new(Rc::clone(&ns), PIPE_NAME);
        let second = View::new(Rc::clone(&ns), PIPE_NAME);
        first.set("total", Value::Int(3));
        first.set_pipe(Value::from("a"));
        assert_eq!(second.get("total"), Some(Value::Int(3)));
        assert_eq!(second.get("pipe"), Some(Value::None));
        assert_eq!(first.get("pipe"), Some(Value::from("a")));
    }

    #[test]
    fn test_keywords_shadow_base() {
        let ns = Namespace::new();
        ns.set("x", Value::Int(1));
        let view = View::new(Rc::clone(&ns), PIPE_NAME);
        let scope = Value::dict(vec![("x".to_string(), Value::Int(2))]);
        view.rescope(Some(&scope)).unwrap();
        assert_eq!(view.get("x"), Some(Value::Int(2)));
        assert!(view.delete("x").is_err());
        view.rescope(None).unwrap();
        assert_eq!(view.get("x"), Some(Value::Int(1)));
        assert!(view.rescope(Some(&Value::Int(1))).is_err());
    }

    #[test]
    fn test_delete() {
        let ns = Namespace::new();
        let view = View::new(Rc::clone(&ns), "p");
        view.set("x", Value::Int(1));
        view.delete("x").unwrap();
        assert_eq!(view.get("x"), None);
        assert_eq!(view.delete("x").unwrap_err().kind(), ExceptionKind::NameError);
        assert_eq!(view.delete("p").unwrap_err().kind(), ExceptionKind::TypeError);
    }

    #[test]
    fn test_snapshot() {
        let ns = Namespace::new();
        let view = View::new(Rc::clone(&ns), PIPE_NAME);
        view.set_pipe(Value::Int(5));
        let Value::Dict(entries) = view.snapshot() else {
            panic!("expected dict");
        };
        assert_eq!(entries.get("pipe"), Some(&Value::Int(5)));
        assert!(entries.contains_key("spy"));
    }
}

// ABOUTME: Environment frames (parent-chain bindings) plus the number-indexed catalogue closures refer to

use crate::error::RpalError;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A single scope frame. Frames form a tree rooted at frame 0 (the
/// primitive environment): every frame created during evaluation points
/// upward to some already-existing frame, and none is ever mutated after
/// the bindings it's constructed with are installed.
#[derive(Debug)]
pub struct Environment {
    pub number: usize,
    parent: Option<Rc<Environment>>,
    bindings: RefCell<HashMap<String, Value>>,
}

impl Environment {
    pub fn root(number: usize, bindings: HashMap<String, Value>) -> Rc<Self> {
        Rc::new(Environment {
            number,
            parent: None,
            bindings: RefCell::new(bindings),
        })
    }

    pub fn child(number: usize, parent: Rc<Environment>, bindings: HashMap<String, Value>) -> Rc<Self> {
        Rc::new(Environment {
            number,
            parent: Some(parent),
            bindings: RefCell::new(bindings),
        })
    }

    /// Walks the parent chain from this frame until `name` is bound, or
    /// reports the failure with the given source line (Rule 1's error
    /// path). Lookup never mutates a frame.
    pub fn lookup(&self, name: &str, line: usize) -> Result<Value, RpalError> {
        if let Some(value) = self.bindings.borrow().get(name) {
            return Ok(value.clone());
        }
        match &self.parent {
            Some(parent) => parent.lookup(name, line),
            None => Err(RpalError::UndeclaredIdentifier {
                name: name.to_string(),
                line,
            }),
        }
    }
}

/// Append-only catalogue of every environment frame created during one
/// interpretation, indexed by frame number. Closures and Etas hold a frame
/// number rather than an `Rc<Environment>` directly (see `control::LambdaTemplate`
/// and `value::Value::Closure`), which keeps them cheap to clone; the
/// catalogue is how the CSE machine turns that number back into a frame.
pub struct EnvironmentCatalogue {
    frames: Vec<Rc<Environment>>,
}

impl EnvironmentCatalogue {
    pub fn new(root: Rc<Environment>) -> Self {
        EnvironmentCatalogue { frames: vec![root] }
    }

    pub fn get(&self, number: usize) -> Result<Rc<Environment>, RpalError> {
        self.frames
            .get(number)
            .cloned()
            .ok_or_else(|| RpalError::internal(format!("environment {number} not found")))
    }

    pub fn push(&mut self, frame: Rc<Environment>) {
        self.frames.push(frame);
    }

    pub fn next_number(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_lookup_in_own_frame() {
        let root = Environment::root(0, bindings(&[("x", Value::Int(42))]));
        assert_eq!(root.lookup("x", 1).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_lookup_missing_name_is_undeclared_identifier() {
        let root = Environment::root(0, HashMap::new());
        let err = root.lookup("missing", 3).unwrap_err();
        assert_eq!(
            err,
            RpalError::UndeclaredIdentifier {
                name: "missing".to_string(),
                line: 3,
            }
        );
    }

    #[test]
    fn test_child_shadows_parent_binding() {
        let root = Environment::root(0, bindings(&[("x", Value::Int(1))]));
        let child = Environment::child(1, root, bindings(&[("x", Value::Int(2))]));
        assert_eq!(child.lookup("x", 1).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_child_sees_parent_binding_when_not_shadowed() {
        let root = Environment::root(0, bindings(&[("x", Value::Int(1))]));
        let child = Environment::child(1, root, HashMap::new());
        assert_eq!(child.lookup("x", 1).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_catalogue_resolves_by_frame_number() {
        let root = Environment::root(0, HashMap::new());
        let mut catalogue = EnvironmentCatalogue::new(root.clone());
        let child = Environment::child(1, root, HashMap::new());
        catalogue.push(child);

        assert_eq!(catalogue.get(0).unwrap().number, 0);
        assert_eq!(catalogue.get(1).unwrap().number, 1);
        assert!(catalogue.get(2).is_err());
    }

    #[test]
    fn test_next_number_tracks_catalogue_size() {
        let root = Environment::root(0, HashMap::new());
        let catalogue = EnvironmentCatalogue::new(root);
        assert_eq!(catalogue.next_number(), 1);
    }
}

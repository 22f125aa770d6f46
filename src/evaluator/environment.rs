use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::ast::Value;
use crate::builtinops::Registry;

/// One lexical frame: a mutable binding table plus an optional parent frame.
///
/// Frames are shared (`Rc`) between every closure and pending evaluation that
/// references them, and mutated in place (`RefCell`). `define` writes reach
/// the root frame and are immediately visible to all holders; that is sound
/// only because evaluation is single-threaded.
#[derive(Default)]
pub struct Environment {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Environment>>,
}

impl Environment {
    /// An empty frame
    pub fn new(parent: Option<Rc<Environment>>) -> Rc<Self> {
        Rc::new(Environment {
            bindings: RefCell::new(HashMap::new()),
            parent,
        })
    }

    /// A frame seeded with an initial batch of name/value pairs (e.g. parameters and arguments)
    pub fn with_bindings<I>(bindings: I, parent: Option<Rc<Environment>>) -> Rc<Self>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Rc::new(Environment {
            bindings: RefCell::new(bindings.into_iter().collect()),
            parent,
        })
    }

    /// A root frame populated from the builtin registry
    pub fn global(registry: &Registry) -> Rc<Self> {
        Self::with_bindings(
            registry
                .iter()
                .map(|(name, value)| (name.to_owned(), value.clone())),
            None,
        )
    }

    /// Resolve `name` in this frame, then each ancestor in turn.
    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        let mut frame = self;
        loop {
            if let Some(value) = frame.bindings.borrow().get(name) {
                return Ok(value.clone());
            }
            match &frame.parent {
                Some(parent) => frame = parent,
                None => return Err(Error::UnboundSymbol(name.to_owned())),
            }
        }
    }

    /// Insert or overwrite a binding in this frame only
    pub fn bind_local(&self, name: impl Into<String>, value: Value) {
        self.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Insert or overwrite a binding in the root frame of this chain
    pub fn bind_global(&self, name: impl Into<String>, value: Value) {
        self.root().bind_local(name, value);
    }

    /// The outermost frame reachable through parent links
    pub fn root(&self) -> &Environment {
        let mut frame = self;
        while let Some(parent) = &frame.parent {
            frame = parent;
        }
        frame
    }

    /// Number of frames from this one to the root, inclusive
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut frame = self;
        while let Some(parent) = &frame.parent {
            depth += 1;
            frame = parent;
        }
        depth
    }

    /// Get all visible bindings, inner frames shadowing outer ones.
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        let mut frame = Some(self);
        while let Some(current) = frame {
            for (name, value) in current.bindings.borrow().iter() {
                bindings
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
            frame = current.parent.as_deref();
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

// Frames can reach themselves through a recursive closure, so only names are shown.
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bindings = self.bindings.borrow();
        let mut names: Vec<&String> = bindings.keys().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("names", &names)
            .field("depth", &self.depth())
            .finish()
    }
}

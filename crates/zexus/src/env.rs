//! Lexically-scoped environment: a chain of frames whose bindings are
//! cells, so closures and their defining scope alias the same slots.

use std::{cell::RefCell, rc::Rc};

use ahash::{AHashMap, AHashSet};

use crate::{
    error::{RunError, RunResult},
    value::{Cell, Value},
};

pub(crate) type EnvRef = Rc<EnvFrame>;

/// One frame in the environment chain.
#[derive(Debug)]
pub(crate) struct EnvFrame {
    bindings: RefCell<AHashMap<Rc<str>, Cell>>,
    exports: RefCell<AHashSet<Rc<str>>>,
    parent: Option<EnvRef>,
}

impl EnvFrame {
    #[must_use]
    pub(crate) fn global() -> EnvRef {
        Rc::new(Self {
            bindings: RefCell::new(AHashMap::new()),
            exports: RefCell::new(AHashSet::new()),
            parent: None,
        })
    }

    #[must_use]
    pub(crate) fn child(parent: &EnvRef) -> EnvRef {
        Rc::new(Self {
            bindings: RefCell::new(AHashMap::new()),
            exports: RefCell::new(AHashSet::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Looks a name up, walking parent frames.
    #[must_use]
    pub(crate) fn get(&self, name: &str) -> Option<Value> {
        self.get_cell(name).map(|cell| cell.borrow().clone())
    }

    /// Returns the cell visible under `name`, walking parent frames.
    #[must_use]
    pub(crate) fn get_cell(&self, name: &str) -> Option<Cell> {
        if let Some(cell) = self.bindings.borrow().get(name) {
            return Some(Rc::clone(cell));
        }
        self.parent.as_ref().and_then(|parent| parent.get_cell(name))
    }

    /// Binds `name` in this innermost frame, creating a fresh cell.
    pub(crate) fn set(&self, name: impl Into<Rc<str>>, value: Value) {
        self.bindings
            .borrow_mut()
            .insert(name.into(), Rc::new(RefCell::new(value)));
    }

    /// `let` semantics: re-binding an existing local mutates its cell so
    /// closures that captured the slot keep seeing updates; otherwise a
    /// fresh cell is created.
    pub(crate) fn define(&self, name: impl Into<Rc<str>>, value: Value) {
        let name = name.into();
        let mut bindings = self.bindings.borrow_mut();
        match bindings.get(&name) {
            Some(cell) => *cell.borrow_mut() = value,
            None => {
                bindings.insert(name, Rc::new(RefCell::new(value)));
            }
        }
    }

    /// Binds `name` in this frame to an existing cell (closure capture).
    pub(crate) fn set_cell(&self, name: impl Into<Rc<str>>, cell: Cell) {
        self.bindings.borrow_mut().insert(name.into(), cell);
    }

    /// Mutates the cell visible under `name`; errors if the name is unbound.
    pub(crate) fn assign(&self, name: &str, value: Value) -> RunResult<()> {
        match self.get_cell(name) {
            Some(cell) => {
                *cell.borrow_mut() = value;
                Ok(())
            }
            None => Err(RunError::name_error(name)),
        }
    }

    /// Marks a binding of this frame as exported.
    pub(crate) fn export(&self, name: &str) -> bool {
        if self.bindings.borrow().contains_key(name) {
            self.exports.borrow_mut().insert(Rc::from(name));
            true
        } else {
            false
        }
    }

    /// Shallow snapshot of the exported bindings of this frame.
    #[must_use]
    pub(crate) fn exports(&self) -> Vec<(String, Value)> {
        let bindings = self.bindings.borrow();
        self.exports
            .borrow()
            .iter()
            .filter_map(|name| {
                bindings
                    .get(name)
                    .map(|cell| (name.to_string(), cell.borrow().clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_mutates_outer_cell_through_child() {
        let global = EnvFrame::global();
        global.set("x", Value::int(1));
        let inner = EnvFrame::child(&global);
        inner.assign("x", Value::int(2)).unwrap();
        assert!(global.get("x").unwrap().eq_value(&Value::int(2)));
    }

    #[test]
    fn set_shadows_in_innermost_frame() {
        let global = EnvFrame::global();
        global.set("x", Value::int(1));
        let inner = EnvFrame::child(&global);
        inner.set("x", Value::int(5));
        assert!(inner.get("x").unwrap().eq_value(&Value::int(5)));
        assert!(global.get("x").unwrap().eq_value(&Value::int(1)));
    }

    #[test]
    fn assign_to_unbound_name_errors() {
        let global = EnvFrame::global();
        assert!(global.assign("missing", Value::Null).is_err());
    }
}

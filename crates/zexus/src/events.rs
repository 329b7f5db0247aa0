//! Event descriptors and the per-engine event registry.
//!
//! `emit` delivers synchronously: handlers run in registration order and
//! complete before the emit returns. A handler that raises halts further
//! delivery of that emission.

use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    error::{RunError, RunResult},
    value::Value,
};

/// A declared event: name plus field-name schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EventDescriptor {
    pub name: Rc<str>,
    pub fields: Vec<Rc<str>>,
}

/// Registry owned by one engine instance (evaluator or VM).
#[derive(Debug, Default)]
pub(crate) struct EventRegistry {
    descriptors: AHashMap<Rc<str>, Rc<EventDescriptor>>,
    handlers: AHashMap<Rc<str>, Vec<Value>>,
}

impl EventRegistry {
    pub(crate) fn declare(&mut self, descriptor: Rc<EventDescriptor>) {
        self.descriptors.insert(Rc::clone(&descriptor.name), descriptor);
    }

    #[must_use]
    pub(crate) fn descriptor(&self, name: &str) -> Option<Rc<EventDescriptor>> {
        self.descriptors.get(name).cloned()
    }

    /// Appends a handler for `name`. The event need not be declared yet;
    /// declaration is checked at emit time.
    pub(crate) fn register(&mut self, name: &str, handler: Value) {
        self.handlers.entry(Rc::from(name)).or_default().push(handler);
    }

    /// Snapshot of the handlers for `name`, in registration order.
    #[must_use]
    pub(crate) fn handlers(&self, name: &str) -> Vec<Value> {
        self.handlers.get(name).cloned().unwrap_or_default()
    }

    /// Validates an emit payload against the declared descriptor: unknown
    /// fields are an `EventError`; missing fields are filled with null.
    pub(crate) fn conform_payload(
        &self,
        name: &str,
        payload: IndexMap<String, Value>,
    ) -> RunResult<Value> {
        let Some(descriptor) = self.descriptor(name) else {
            return Err(RunError::event(format!("event '{name}' is not declared")));
        };
        for key in payload.keys() {
            if !descriptor.fields.iter().any(|f| f.as_ref() == key) {
                return Err(RunError::event(format!(
                    "event '{name}' has no field '{key}'"
                )));
            }
        }
        let mut conformed = IndexMap::new();
        for field in &descriptor.fields {
            let value = payload.get(field.as_ref()).cloned().unwrap_or(Value::Null);
            conformed.insert(field.to_string(), value);
        }
        Ok(Value::map(conformed))
    }
}

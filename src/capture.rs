//! Opaque capture registry.
//!
//! Sub-expressions with no procedural rule are captured as producers and
//! exposed to the materialized procedure as trailing, default-bound
//! parameters in registration order.

use crate::error::EvalError;
use crate::registry::Registry;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Producer behind a capture parameter. Receives the registry of the call
/// and the evaluated arguments of the capture site.
pub type Producer = Arc<dyn Fn(&Registry, &[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// A deferred computation embedded in an expression tree.
#[derive(Clone)]
pub struct Thunk {
    label: String,
    producer: Producer,
}

impl Thunk {
    pub fn new<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            producer: Arc::new(move |_, _| f()),
        }
    }

    /// Thunk that may consult declared properties through the registry.
    pub fn with_registry<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Registry) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            producer: Arc::new(move |registry, _| f(registry)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn call(&self, registry: &Registry) -> Result<Value, EvalError> {
        (self.producer)(registry, &[])
    }
}

impl PartialEq for Thunk {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.producer, &other.producer)
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thunk({:?})", self.label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureId(Uuid);

impl CaptureId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Clone)]
pub struct CapturedEntry {
    pub id: CaptureId,
    /// Positional parameter name (`arg0`, `arg1`, ...).
    pub param: String,
    /// What was captured; shows up in reconstructed source.
    pub label: String,
    pub producer: Producer,
}

impl fmt::Debug for CapturedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedEntry")
            .field("id", &self.id)
            .field("param", &self.param)
            .field("label", &self.label)
            .finish()
    }
}

/// One registry per compilation. No deduplication: capturing the same kind
/// of expression twice yields two entries with distinct ids.
#[derive(Debug, Clone, Default)]
pub struct CaptureRegistry {
    entries: Vec<CapturedEntry>,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a producer and returns its parameter name.
    pub fn capture(&mut self, label: impl Into<String>, producer: Producer) -> &CapturedEntry {
        let param = format!("arg{}", self.entries.len());
        self.entries.push(CapturedEntry {
            id: CaptureId::generate(),
            param,
            label: label.into(),
            producer,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[CapturedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<CapturedEntry> {
        self.entries
    }
}

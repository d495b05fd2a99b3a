//! Procedure materializer.
//!
//! A `Procedure` is the callable form of a compiled body: the record is the
//! first parameter, captured producers follow as default-bound trailing
//! parameters in registration order. Bodies are interpreted, so building a
//! procedure twice from the same body yields behaviorally identical
//! callables.

mod eval;
pub mod node;
mod source;

pub use node::{AggregateNode, LogicOp, Population, ProcBody, ProcNode, Stmt};

use crate::capture::{CaptureRegistry, CapturedEntry, Producer};
use crate::error::EvalError;
use crate::ops::Capability;
use crate::record::RecordRef;
use crate::registry::Registry;
use crate::value::Value;
use eval::Frame;
use std::collections::BTreeSet;

/// Name of the record parameter.
pub const SELF_PARAM: &str = "self";

#[derive(Debug, Clone)]
pub struct Procedure {
    name: String,
    statements: Vec<Stmt>,
    capabilities: BTreeSet<Capability>,
    captures: Vec<CapturedEntry>,
}

/// Builds the callable for `body`. Capabilities already imported by the body
/// are not repeated.
pub fn materialize(
    name: &str,
    body: ProcBody,
    capabilities: BTreeSet<Capability>,
    captures: CaptureRegistry,
) -> Procedure {
    let mut capabilities = capabilities;
    let mut statements = Vec::with_capacity(body.statements.len());
    for stmt in body.statements {
        match stmt {
            Stmt::Import(cap) => {
                capabilities.insert(cap);
            }
            other => statements.push(other),
        }
    }
    Procedure {
        name: name.to_string(),
        statements,
        capabilities,
        captures: captures.into_entries(),
    }
}

impl Procedure {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn statements(&self) -> &[Stmt] {
        &self.statements
    }

    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    pub fn requires(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn captures(&self) -> &[CapturedEntry] {
        &self.captures
    }

    /// `self` followed by the capture parameters.
    pub fn params(&self) -> Vec<&str> {
        std::iter::once(SELF_PARAM)
            .chain(self.captures.iter().map(|c| c.param.as_str()))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.statements.iter().map(Stmt::node_count).sum()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.iter().map(Stmt::statement_count).sum()
    }

    /// Human-readable reconstruction of the body.
    pub fn source(&self) -> String {
        source::render(self)
    }

    pub fn call(&self, record: &RecordRef, registry: &Registry) -> Result<Value, EvalError> {
        self.call_at(record, registry, 0, &[])
    }

    /// Calls with some capture parameters rebound for this call only.
    pub fn call_with(
        &self,
        record: &RecordRef,
        registry: &Registry,
        bindings: &[(&str, Producer)],
    ) -> Result<Value, EvalError> {
        self.call_at(record, registry, 0, bindings)
    }

    pub(crate) fn call_at(
        &self,
        record: &RecordRef,
        registry: &Registry,
        depth: usize,
        bindings: &[(&str, Producer)],
    ) -> Result<Value, EvalError> {
        if let Some((unknown, _)) = bindings
            .iter()
            .find(|(name, _)| !self.captures.iter().any(|c| c.param == *name))
        {
            return Err(EvalError::UnknownCapture {
                param: (*unknown).to_string(),
            });
        }
        let params: Vec<(String, Producer)> = self
            .captures
            .iter()
            .map(|c| {
                let producer = bindings
                    .iter()
                    .find(|(name, _)| *name == c.param)
                    .map_or_else(|| c.producer.clone(), |(_, p)| p.clone());
                (c.param.clone(), producer)
            })
            .collect();
        let mut frame = Frame::new(registry, record.clone(), &params, depth);
        Ok(frame.run(&self.statements)?.unwrap_or(Value::Null))
    }
}

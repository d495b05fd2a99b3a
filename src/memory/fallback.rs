use super::eval::Interp;
use super::store::MemoryStore;
use crate::compile::ScalarFallback;
use crate::error::EvalError;
use crate::expr::{Expression, TransformKind};
use crate::registry::Registry;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

pub type VendorFn = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// Backend-specific scalar functions by name.
#[derive(Clone, Default)]
pub struct VendorTable {
    fns: Arc<HashMap<String, VendorFn>>,
}

impl VendorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.fns).insert(name.into(), Arc::new(f));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        let f = self.fns.get(name).ok_or_else(|| EvalError::Fallback {
            reason: format!("vendor function `{name}` is not registered"),
        })?;
        f(args)
    }
}

impl fmt::Debug for VendorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.fns.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_tuple("VendorTable").field(&names).finish()
    }
}

/// Evaluates captured subqueries and vendor calls for compiled procedures
/// by running them against the memory store.
#[derive(Debug, Clone)]
pub struct MemoryFallback {
    store: MemoryStore,
    vendors: VendorTable,
}

impl MemoryFallback {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            vendors: VendorTable::default(),
        }
    }

    pub fn with_vendors(mut self, vendors: VendorTable) -> Self {
        self.vendors = vendors;
        self
    }
}

impl ScalarFallback for MemoryFallback {
    fn evaluate(
        &self,
        registry: &Registry,
        model: &str,
        expr: &Expression,
        args: &[Value],
    ) -> Result<Value, EvalError> {
        trace!(model, kind = expr.kind_name(), args = args.len(), "fallback evaluation");
        match expr {
            Expression::SubqueryRef(query) => {
                let outer = query.correlated_refs().into_iter().zip(args.iter().cloned()).collect();
                let interp = Interp {
                    store: &self.store,
                    registry,
                    vendors: &self.vendors,
                };
                interp.subquery(query, outer, 0)
            }
            Expression::Transform {
                kind: TransformKind::Vendor(name),
                ..
            } => self.vendors.call(name, args),
            other => Err(EvalError::Fallback {
                reason: format!("no fallback rule for {} on `{model}`", other.kind_name()),
            }),
        }
    }
}

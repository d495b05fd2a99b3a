use crate::compile::CompileReport;
use crate::error::EvalError;
use crate::expr::Expression;
use crate::procedure::Procedure;
use crate::record::RecordRef;
use crate::registry::Registry;
use crate::value::Value;
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

thread_local! {
    static OVERRIDE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Property nesting depth at which a `Registry::get` issued by a running
/// override starts. Zero outside overrides.
pub(crate) fn ambient_depth() -> usize {
    OVERRIDE_DEPTH.with(Cell::get)
}

/// Restores the enclosing depth when an override returns or unwinds.
struct DepthGuard(usize);

impl DepthGuard {
    fn enter(depth: usize) -> Self {
        Self(OVERRIDE_DEPTH.with(|d| d.replace(depth)))
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        OVERRIDE_DEPTH.with(|d| d.set(self.0));
    }
}

/// Hand-written replacement for a generated procedure.
pub type OverrideFn = Arc<dyn Fn(&RecordRef, &Registry) -> Result<Value, EvalError> + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyState {
    /// Relations (dotted paths from the declaring model) that must be joined
    /// when the property is reached through another relation.
    pub joins: Vec<String>,
    /// Overrides `Settings::use_tz` for this property's `now()`.
    pub use_tz: Option<bool>,
    pub skip_codegen: bool,
    pub hidden: bool,
}

/// Declaration as written against a (possibly abstract) model. The registry
/// instantiates it once per concrete model.
#[derive(Clone)]
pub struct PropertyTemplate {
    pub(crate) name: String,
    pub(crate) model: String,
    pub(crate) expression: Expression,
    pub(crate) state: PropertyState,
    pub(crate) override_fn: Option<OverrideFn>,
}

impl PropertyTemplate {
    pub fn new(
        model: impl Into<String>,
        name: impl Into<String>,
        expression: impl Into<Expression>,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            expression: expression.into(),
            state: PropertyState::default(),
            override_fn: None,
        }
    }

    pub fn joins<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.joins.extend(relations.into_iter().map(Into::into));
        self
    }

    pub fn use_tz(mut self, use_tz: bool) -> Self {
        self.state.use_tz = Some(use_tz);
        self
    }

    pub fn skip_codegen(mut self) -> Self {
        self.state.skip_codegen = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.state.hidden = true;
        self
    }

    pub fn with_override<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecordRef, &Registry) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.override_fn = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Debug for PropertyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyTemplate")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("state", &self.state)
            .field("overridden", &self.override_fn.is_some())
            .finish()
    }
}

/// Decided once at assembly, never both.
#[derive(Clone)]
pub enum Evaluator {
    Compiled(Arc<Procedure>),
    Overridden(OverrideFn),
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compiled(proc) => write!(f, "Compiled({})", proc.name()),
            Self::Overridden(_) => f.write_str("Overridden"),
        }
    }
}

/// Per-concrete-model binding of a declaration. The expression and the
/// compiled procedure are shared by every binding of the same template.
#[derive(Debug, Clone)]
pub struct DeclaredProperty {
    pub(crate) name: String,
    pub(crate) model: String,
    pub(crate) declared_on: String,
    pub(crate) expression: Arc<Expression>,
    pub(crate) evaluator: Evaluator,
    pub(crate) state: PropertyState,
    pub(crate) slot: usize,
    pub(crate) report: Option<Arc<CompileReport>>,
}

impl DeclaredProperty {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Concrete model this binding belongs to.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn declared_on(&self) -> &str {
        &self.declared_on
    }

    pub fn expression(&self) -> &Arc<Expression> {
        &self.expression
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn procedure(&self) -> Option<&Arc<Procedure>> {
        match &self.evaluator {
            Evaluator::Compiled(proc) => Some(proc),
            Evaluator::Overridden(_) => None,
        }
    }

    pub fn is_overridden(&self) -> bool {
        matches!(self.evaluator, Evaluator::Overridden(_))
    }

    pub fn joins(&self) -> &[String] {
        &self.state.joins
    }

    pub fn state(&self) -> &PropertyState {
        &self.state
    }

    pub fn is_hidden(&self) -> bool {
        self.state.hidden
    }

    /// Cache slot index on records of `model`.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn report(&self) -> Option<&CompileReport> {
        self.report.as_deref()
    }

    /// Evaluates without consulting the cache.
    pub fn evaluate(&self, record: &RecordRef, registry: &Registry) -> Result<Value, EvalError> {
        self.evaluate_at(record, registry, ambient_depth())
    }

    /// Properties an override reads through the registry continue at
    /// `depth + 1`, so `max_depth` also bounds cycles through overrides.
    pub(crate) fn evaluate_at(
        &self,
        record: &RecordRef,
        registry: &Registry,
        depth: usize,
    ) -> Result<Value, EvalError> {
        match &self.evaluator {
            Evaluator::Compiled(proc) => proc.call_at(record, registry, depth, &[]),
            Evaluator::Overridden(f) => {
                let _guard = DepthGuard::enter(depth + 1);
                f(record, registry)
            }
        }
    }
}

//! Query-side resolution of declared properties.
//!
//! A lookup path walks relations from the queried model until it reaches a
//! declared property. Each relation hop is registered as a join, the
//! property's expression is rewritten once per hop and nested property
//! references are expanded the same way, and the result is handed to the
//! engine's native resolver.

use crate::error::ResolveError;
use crate::expr::{join_path, split_path, CompareKind, Expression};
use crate::property::DeclaredProperty;
use crate::registry::Registry;
use crate::rewrite::rewrite_path;
use crate::value::Value;
use indexmap::IndexMap;
use tracing::{debug, trace};

/// Native query construction surface.
pub trait QueryEngine {
    type Native;

    fn resolve_native(
        &self,
        expr: &Expression,
        ctx: &mut QueryContext,
    ) -> Result<Self::Native, ResolveError>;

    /// Registers a join for a dotted relation path from the base model and
    /// returns its alias. Registering the same path twice yields the same
    /// alias.
    fn register_join(&self, ctx: &mut QueryContext, relation: &str) -> Result<String, ResolveError>;
}

/// State of one query under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    base_model: String,
    joins: IndexMap<String, String>,
    requires_grouping: bool,
}

impl QueryContext {
    pub fn new(base_model: impl Into<String>) -> Self {
        Self {
            base_model: base_model.into(),
            ..Self::default()
        }
    }

    pub fn base_model(&self) -> &str {
        &self.base_model
    }

    /// Registered joins, relation path to alias, in registration order.
    pub fn joins(&self) -> &IndexMap<String, String> {
        &self.joins
    }

    pub fn alias(&self, relation: &str) -> Option<&str> {
        self.joins.get(relation).map(String::as_str)
    }

    pub fn add_join(&mut self, relation: impl Into<String>, alias: impl Into<String>) {
        self.joins.insert(relation.into(), alias.into());
    }

    pub fn requires_grouping(&self) -> bool {
        self.requires_grouping
    }

    pub fn mark_grouping(&mut self) {
        self.requires_grouping = true;
    }
}

/// Dotted path to a declared property, optionally compared to a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    path: Vec<String>,
    comparison: Option<(CompareKind, Expression)>,
}

macro_rules! lookup_kinds {
    ($($method:ident => $kind:ident),* $(,)?) => {
        $(pub fn $method(self, rhs: impl Into<Expression>) -> Self {
            self.compare(CompareKind::$kind, rhs)
        })*
    };
}

impl Lookup {
    pub fn new(path: &str) -> Self {
        Self {
            path: split_path(path),
            comparison: None,
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn comparison(&self) -> Option<(CompareKind, &Expression)> {
        self.comparison.as_ref().map(|(op, v)| (*op, v))
    }

    pub fn compare(mut self, op: CompareKind, rhs: impl Into<Expression>) -> Self {
        self.comparison = Some((op, rhs.into()));
        self
    }

    lookup_kinds! {
        exact => Exact,
        iexact => IExact,
        gt => Gt,
        gte => Gte,
        lt => Lt,
        lte => Lte,
        is_in => In,
        contains => Contains,
        icontains => IContains,
        startswith => StartsWith,
        istartswith => IStartsWith,
        endswith => EndsWith,
        iendswith => IEndsWith,
        regex => Regex,
        iregex => IRegex,
    }

    pub fn range(self, lo: impl Into<Expression>, hi: impl Into<Expression>) -> Self {
        self.compare(CompareKind::Range, crate::expr::tuple([lo.into(), hi.into()]))
    }

    pub fn isnull(self, is_null: bool) -> Self {
        self.compare(CompareKind::IsNull, Value::Bool(is_null))
    }

    pub fn asc(self) -> OrderBy {
        OrderBy {
            lookup: self,
            descending: false,
            nulls_first: false,
        }
    }

    pub fn desc(self) -> OrderBy {
        OrderBy {
            lookup: self,
            descending: true,
            nulls_first: false,
        }
    }
}

impl From<Lookup> for Expression {
    fn from(lookup: Lookup) -> Self {
        Expression::PropertyRef {
            path: lookup.path,
            comparison: lookup.comparison.map(|(op, v)| (op, v.boxed())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub lookup: Lookup,
    pub descending: bool,
    pub nulls_first: bool,
}

impl OrderBy {
    pub fn nulls_first(mut self) -> Self {
        self.nulls_first = true;
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls_first = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct NativeOrder<N> {
    pub native: N,
    pub descending: bool,
    pub nulls_first: bool,
}

pub struct Resolver<'r, E> {
    registry: &'r Registry,
    engine: &'r E,
}

impl<'r, E: QueryEngine> Resolver<'r, E> {
    pub fn new(registry: &'r Registry, engine: &'r E) -> Self {
        Self { registry, engine }
    }

    /// Replaces every property reference in `expr` by its rewritten
    /// definition, registering joins on the way.
    pub fn expand(
        &self,
        expr: &Expression,
        ctx: &mut QueryContext,
    ) -> Result<Expression, ResolveError> {
        self.expand_at(expr, ctx, 0)
    }

    pub fn filter(
        &self,
        predicate: &Expression,
        ctx: &mut QueryContext,
    ) -> Result<E::Native, ResolveError> {
        let expanded = self.expand(predicate, ctx)?;
        trace!(model = ctx.base_model(), nodes = expanded.node_count(), "resolving filter");
        self.engine.resolve_native(&expanded, ctx)
    }

    pub fn lookup(
        &self,
        lookup: &Lookup,
        ctx: &mut QueryContext,
    ) -> Result<E::Native, ResolveError> {
        self.filter(&Expression::from(lookup.clone()), ctx)
    }

    pub fn order(
        &self,
        order: &OrderBy,
        ctx: &mut QueryContext,
    ) -> Result<NativeOrder<E::Native>, ResolveError> {
        let native = self.lookup(&order.lookup, ctx)?;
        Ok(NativeOrder {
            native,
            descending: order.descending,
            nulls_first: order.nulls_first,
        })
    }

    fn expand_at(
        &self,
        expr: &Expression,
        ctx: &mut QueryContext,
        depth: usize,
    ) -> Result<Expression, ResolveError> {
        match expr {
            Expression::PropertyRef { path, comparison } => {
                let resolved = self.expand_property(path, ctx, depth)?;
                match comparison {
                    None => Ok(resolved),
                    Some((op, value)) => Ok(Expression::CompareOp {
                        op: *op,
                        lhs: resolved.boxed(),
                        rhs: self.expand_at(value, ctx, depth)?.boxed(),
                    }),
                }
            }
            other => other.try_map_children(|child| self.expand_at(child, ctx, depth)),
        }
    }

    fn expand_property(
        &self,
        path: &[String],
        ctx: &mut QueryContext,
        depth: usize,
    ) -> Result<Expression, ResolveError> {
        let max_depth = self.registry.settings().max_depth;
        if depth > max_depth {
            return Err(ResolveError::RecursionLimit { depth: max_depth });
        }
        let schema = self.registry.schema();
        if !schema.contains(ctx.base_model()) {
            return Err(ResolveError::UnknownModel {
                model: ctx.base_model().to_string(),
            });
        }
        let mut model = ctx.base_model().to_string();
        let mut hops: Vec<String> = Vec::new();
        for (idx, segment) in path.iter().enumerate() {
            if let Some(prop) = self.find_property(&model, segment) {
                if idx + 1 < path.len() {
                    return Err(ResolveError::TrailingPath {
                        property: join_path(&path[..=idx]),
                        rest: join_path(&path[idx + 1..]),
                    });
                }
                return self.expand_found(prop, &hops, ctx, depth);
            }
            match schema.relation(&model, segment) {
                Some(rel) => {
                    hops.push(segment.clone());
                    model = rel.target.clone();
                }
                None => {
                    return Err(ResolveError::UnknownPath {
                        model,
                        segment: segment.clone(),
                    })
                }
            }
        }
        Err(ResolveError::NotAProperty {
            path: join_path(path),
        })
    }

    fn expand_found(
        &self,
        prop: &DeclaredProperty,
        hops: &[String],
        ctx: &mut QueryContext,
        depth: usize,
    ) -> Result<Expression, ResolveError> {
        for end in 1..=hops.len() {
            let relation = join_path(&hops[..end]);
            let alias = self.engine.register_join(ctx, &relation)?;
            trace!(relation = relation.as_str(), alias = alias.as_str(), "joined hop");
        }
        if !hops.is_empty() {
            let via = join_path(hops);
            for hint in prop.joins() {
                let relation = format!("{via}.{hint}");
                let alias = self.engine.register_join(ctx, &relation)?;
                trace!(relation = relation.as_str(), alias = alias.as_str(), "joined hint");
            }
        }
        let rewritten = rewrite_path(prop.expression(), hops);
        let expanded = self.expand_at(&rewritten, ctx, depth + 1)?;
        if expanded.contains_aggregate() && !ctx.requires_grouping() {
            debug!(
                model = ctx.base_model(),
                property = prop.name(),
                "aggregate property promotes query to grouping"
            );
            ctx.mark_grouping();
        }
        Ok(expanded)
    }

    /// Properties bind to concrete models; a relation to an abstract model
    /// resolves through any concrete descendant since they share one
    /// definition.
    fn find_property(&self, model: &str, name: &str) -> Option<&'r DeclaredProperty> {
        self.registry.property(model, name).or_else(|| {
            self.registry
                .schema()
                .concrete_models_under(model)
                .into_iter()
                .find_map(|concrete| self.registry.property(concrete, name))
        })
    }
}

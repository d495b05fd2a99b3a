use super::eval::{Env, Interp};
use super::fallback::VendorTable;
use super::store::MemoryStore;
use crate::error::{EvalError, ResolveError};
use crate::expr::{join_path, split_path, Expression};
use crate::record::RecordRef;
use crate::registry::Registry;
use crate::resolve::{Lookup, OrderBy, QueryContext, QueryEngine, Resolver};
use crate::schema::{Cardinality, Schema, PK};
use crate::value::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, trace};

/// Resolved predicate: the fully expanded expression plus the joins and
/// grouping the resolver registered for it.
#[derive(Debug, Clone)]
pub struct NativePredicate {
    pub expr: Expression,
    pub joins: Vec<(String, String)>,
    pub grouped: bool,
}

/// Query engine over a [`MemoryStore`].
///
/// To-many relations referenced outside aggregates behave like left joins:
/// a row matches when any combination of related rows satisfies the
/// predicate, and a row with no related rows is tested against null.
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    store: MemoryStore,
    registry: Arc<Registry>,
    vendors: VendorTable,
}

impl MemoryEngine {
    pub fn new(store: MemoryStore, registry: Arc<Registry>) -> Self {
        Self {
            store,
            registry,
            vendors: VendorTable::default(),
        }
    }

    pub fn with_vendors(mut self, vendors: VendorTable) -> Self {
        self.vendors = vendors;
        self
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn resolver(&self) -> Resolver<'_, Self> {
        Resolver::new(&self.registry, self)
    }

    fn interp(&self) -> Interp<'_> {
        Interp {
            store: &self.store,
            registry: &self.registry,
            vendors: &self.vendors,
        }
    }

    fn context(&self, model: &str) -> Result<QueryContext, ResolveError> {
        if !self.store.schema().contains(model) {
            return Err(ResolveError::UnknownModel {
                model: model.to_string(),
            });
        }
        Ok(QueryContext::new(model))
    }

    /// Expands and resolves `predicate` against `model` without running it.
    pub fn prepare(
        &self,
        model: &str,
        predicate: &Expression,
    ) -> Result<NativePredicate, ResolveError> {
        let mut ctx = self.context(model)?;
        self.resolver().filter(predicate, &mut ctx)
    }

    /// Records of `model` (and its subtypes) matching `predicate`.
    pub fn filter(
        &self,
        model: &str,
        predicate: &Expression,
    ) -> Result<Vec<RecordRef>, ResolveError> {
        let native = self.prepare(model, predicate)?;
        let joined = joined_prefixes(self.store.schema(), model, &native.expr);
        let mut out = Vec::new();
        for row in self.store.all_under(model) {
            let mut env = Env::new(row.clone());
            if self.any_binding(&native.expr, &joined, &mut env)? {
                out.push(row);
            }
        }
        debug!(
            model,
            joins = native.joins.len(),
            grouped = native.grouped,
            matched = out.len(),
            "filtered records"
        );
        Ok(out)
    }

    /// Value of a lookup for every record of `model`, in store order.
    pub fn values(
        &self,
        model: &str,
        lookup: &Lookup,
    ) -> Result<Vec<(RecordRef, Value)>, ResolveError> {
        let mut ctx = self.context(model)?;
        let native = self.resolver().lookup(lookup, &mut ctx)?;
        self.evaluate_all(model, &native.expr)
    }

    pub fn order_by(
        &self,
        model: &str,
        orders: &[OrderBy],
    ) -> Result<Vec<RecordRef>, ResolveError> {
        let mut ctx = self.context(model)?;
        let mut natives = Vec::with_capacity(orders.len());
        for order in orders {
            natives.push(self.resolver().order(order, &mut ctx)?);
        }
        let mut keyed: Vec<(RecordRef, Vec<Value>)> = Vec::new();
        for row in self.store.all_under(model) {
            let mut keys = Vec::with_capacity(natives.len());
            for native in &natives {
                keys.push(self.interp().eval(&native.native.expr, &mut Env::new(row.clone()))?);
            }
            keyed.push((row, keys));
        }
        keyed.sort_by(|(_, a), (_, b)| {
            natives
                .iter()
                .zip(a.iter().zip(b))
                .map(|(order, (x, y))| order_values(x, y, order.descending, order.nulls_first))
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        Ok(keyed.into_iter().map(|(row, _)| row).collect())
    }

    /// Computes `name` for every record of `model` on the query side and
    /// stores the values in the records' property caches.
    pub fn annotate(&self, model: &str, name: &str) -> Result<Vec<RecordRef>, ResolveError> {
        let rows = self.values(model, &Lookup::new(name))?;
        let mut out = Vec::with_capacity(rows.len());
        for (row, value) in rows {
            self.registry.set(&row, name, value)?;
            out.push(row);
        }
        trace!(model, property = name, rows = out.len(), "annotated records");
        Ok(out)
    }

    fn evaluate_all(
        &self,
        model: &str,
        expr: &Expression,
    ) -> Result<Vec<(RecordRef, Value)>, ResolveError> {
        let interp = self.interp();
        self.store
            .all_under(model)
            .into_iter()
            .map(|row| {
                let value = interp.eval(expr, &mut Env::new(row.clone()))?;
                Ok((row, value))
            })
            .collect()
    }

    fn any_binding(
        &self,
        expr: &Expression,
        prefixes: &[Vec<String>],
        env: &mut Env,
    ) -> Result<bool, EvalError> {
        let interp = self.interp();
        let Some((prefix, rest)) = prefixes.split_first() else {
            return Ok(interp.eval(expr, env)?.is_truthy());
        };
        let rows = match interp.walk(env, prefix)? {
            Value::List(items) if !items.is_empty() => items,
            Value::List(_) | Value::Null => vec![Value::Null],
            other => vec![other],
        };
        for row in rows {
            env.bind(prefix.clone(), row);
            let hit = self.any_binding(expr, rest, env);
            env.unbind();
            if hit? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl QueryEngine for MemoryEngine {
    type Native = NativePredicate;

    fn resolve_native(
        &self,
        expr: &Expression,
        ctx: &mut QueryContext,
    ) -> Result<NativePredicate, ResolveError> {
        validate(self.store.schema(), &self.registry, ctx.base_model(), None, expr)?;
        Ok(NativePredicate {
            expr: expr.clone(),
            joins: ctx.joins().iter().map(|(r, a)| (r.clone(), a.clone())).collect(),
            grouped: ctx.requires_grouping(),
        })
    }

    fn register_join(
        &self,
        ctx: &mut QueryContext,
        relation: &str,
    ) -> Result<String, ResolveError> {
        if let Some(alias) = ctx.alias(relation) {
            return Ok(alias.to_string());
        }
        let schema = self.store.schema();
        let mut model = ctx.base_model().to_string();
        for segment in split_path(relation) {
            let rel = schema
                .relation(&model, &segment)
                .ok_or_else(|| ResolveError::UnknownRelation {
                    model: model.clone(),
                    relation: segment.clone(),
                })?;
            model = rel.target.clone();
        }
        let alias = format!("t{}", ctx.joins().len() + 1);
        ctx.add_join(relation, alias.clone());
        Ok(alias)
    }
}

/// Checks every reference path of an expanded expression against the
/// schema. Inside a subquery, `outer` is the enclosing model.
fn validate(
    schema: &Schema,
    registry: &Registry,
    model: &str,
    outer: Option<&str>,
    expr: &Expression,
) -> Result<(), ResolveError> {
    match expr {
        Expression::FieldRef { path } | Expression::PropertyRef { path, .. } => {
            check_path(schema, registry, model, path)?;
        }
        Expression::OuterRef { path } => {
            if let Some(outer) = outer {
                check_path(schema, registry, outer, path)?;
            }
        }
        Expression::SubqueryRef(query) => {
            if !schema.contains(&query.model) {
                return Err(ResolveError::UnknownModel {
                    model: query.model.clone(),
                });
            }
            if let Some(filter) = &query.filter {
                validate(schema, registry, &query.model, Some(model), filter)?;
            }
            validate(schema, registry, &query.model, Some(model), &query.project)?;
            return Ok(());
        }
        Expression::RelationAccess { via, rest } => {
            let rel = schema.relation(model, via).ok_or_else(|| ResolveError::UnknownRelation {
                model: model.to_string(),
                relation: via.clone(),
            })?;
            return validate(schema, registry, &rel.target, outer, rest);
        }
        _ => {}
    }
    for child in expr.children() {
        validate(schema, registry, model, outer, child)?;
    }
    Ok(())
}

fn check_path(
    schema: &Schema,
    registry: &Registry,
    model: &str,
    path: &[String],
) -> Result<(), ResolveError> {
    let mut current = model.to_string();
    for (idx, segment) in path.iter().enumerate() {
        if let Some(rel) = schema.relation(&current, segment) {
            current = rel.target.clone();
            continue;
        }
        let last = idx + 1 == path.len();
        let known = segment == PK
            || schema.has_field(&current, segment)
            || registry.property(&current, segment).is_some()
            || schema
                .concrete_models_under(&current)
                .into_iter()
                .any(|m| registry.property(m, segment).is_some());
        if !(last && known) {
            return Err(ResolveError::UnknownPath {
                model: current,
                segment: segment.clone(),
            });
        }
    }
    Ok(())
}

/// To-many prefixes of the references evaluated per row, outermost first.
/// Aggregates, subqueries and relation accesses own their populations.
fn joined_prefixes(schema: &Schema, model: &str, expr: &Expression) -> Vec<Vec<String>> {
    fn collect(schema: &Schema, model: &str, expr: &Expression, out: &mut Vec<Vec<String>>) {
        match expr {
            Expression::FieldRef { path } | Expression::PropertyRef { path, .. } => {
                let mut current = model.to_string();
                for (idx, segment) in path.iter().enumerate() {
                    let Some(rel) = schema.relation(&current, segment) else {
                        break;
                    };
                    if rel.cardinality == Cardinality::ToMany {
                        let prefix = path[..=idx].to_vec();
                        if !out.contains(&prefix) {
                            out.push(prefix);
                        }
                    }
                    current = rel.target.clone();
                }
            }
            Expression::Aggregate(_)
            | Expression::SubqueryRef(_)
            | Expression::RelationAccess { .. }
            | Expression::Opaque(_) => return,
            _ => {}
        }
        for child in expr.children() {
            collect(schema, model, child, out);
        }
    }
    let mut out = Vec::new();
    collect(schema, model, expr, &mut out);
    out.sort_by_key(Vec::len);
    trace!(model, prefixes = ?out.iter().map(|p| join_path(p)).collect::<Vec<_>>(), "left joins");
    out
}

/// Sort order of two keys. Nulls sit at one end regardless of direction.
fn order_values(a: &Value, b: &Value, descending: bool, nulls_first: bool) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => {
            if nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, true) => {
            if nulls_first {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, false) => {
            let ord = a.compare(b).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}

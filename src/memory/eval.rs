//! Direct evaluation of expression trees over the memory store.
//!
//! This is the query side: it reads the expression a property was declared
//! with, never the compiled procedure, so the two paths can be checked
//! against each other.

use super::fallback::VendorTable;
use super::store::MemoryStore;
use crate::error::EvalError;
use crate::expr::{
    join_path, Aggregate, AggregateKind, BoolOp, CollectionKind, CompareKind, Expression, Subquery,
    SubqueryKind, TransformKind,
};
use crate::ops::{self, compare};
use crate::record::RecordRef;
use crate::registry::Registry;
use crate::schema::{Cardinality, PK};
use crate::value::Value;

/// Values bound to path prefixes: aggregate rows and left-joined rows.
type Bindings = Vec<(Vec<String>, Value)>;

#[derive(Debug, Clone)]
pub(crate) struct Env {
    record: RecordRef,
    binds: Bindings,
    /// Correlated values of the enclosing query, keyed by outer path.
    outer: Bindings,
    depth: usize,
}

impl Env {
    pub fn new(record: RecordRef) -> Self {
        Self {
            record,
            binds: Vec::new(),
            outer: Vec::new(),
            depth: 0,
        }
    }

    pub fn correlated(record: RecordRef, outer: Bindings, depth: usize) -> Self {
        Self {
            record,
            binds: Vec::new(),
            outer,
            depth,
        }
    }

    pub fn bind(&mut self, prefix: Vec<String>, value: Value) {
        self.binds.push((prefix, value));
    }

    pub fn unbind(&mut self) {
        self.binds.pop();
    }

    /// Innermost binding whose prefix starts `path`.
    fn bound(&self, path: &[String]) -> Option<(Value, usize)> {
        self.binds
            .iter()
            .rev()
            .find(|(prefix, _)| path.starts_with(prefix))
            .map(|(prefix, value)| (value.clone(), prefix.len()))
    }

    /// Record an own-model aggregate lists rows from.
    fn owner(&self) -> Value {
        self.binds
            .iter()
            .rev()
            .find(|(prefix, _)| prefix.is_empty())
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| Value::Record(self.record.clone()))
    }
}

pub(crate) struct Interp<'a> {
    pub store: &'a MemoryStore,
    pub registry: &'a Registry,
    pub vendors: &'a VendorTable,
}

impl Interp<'_> {
    pub fn eval(&self, expr: &Expression, env: &mut Env) -> Result<Value, EvalError> {
        match expr {
            Expression::FieldRef { path } => self.walk(env, path),
            Expression::OuterRef { path } => env
                .outer
                .iter()
                .find(|(p, _)| p == path)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| EvalError::Fallback {
                    reason: format!("outer reference `{}` is not correlated", join_path(path)),
                }),
            Expression::Literal { value } => Ok(value.clone()),
            Expression::Collection { kind, items } => {
                if *kind == CollectionKind::Mapping && items.len() % 2 != 0 {
                    return Err(EvalError::TypeMismatch {
                        op: "mapping".to_string(),
                        detail: format!("{} items", items.len()),
                    });
                }
                let values = self.all(items, env)?;
                ops::collection(*kind, values)
            }
            Expression::BinaryOp { op, lhs, rhs } => {
                let l = self.eval(lhs, env)?;
                let r = self.eval(rhs, env)?;
                ops::binary(*op, &l, &r)
            }
            Expression::CompareOp { op, lhs, rhs } => {
                let l = self.eval(lhs, env)?;
                self.compare(*op, &l, rhs, env).map(Value::Bool)
            }
            Expression::BoolTree { op, children } => self.bool_tree(*op, children, env),
            Expression::Conditional { branches, default } => {
                for (when, then) in branches {
                    if self.eval(when, env)?.is_truthy() {
                        return self.eval(then, env);
                    }
                }
                self.eval(default, env)
            }
            Expression::Transform { kind, args } => self.transform(kind, args, env),
            Expression::Aggregate(agg) => self.aggregate(agg, env),
            Expression::SubqueryRef(query) => {
                let mut outer = Vec::new();
                for path in query.correlated_refs() {
                    let value = self.walk(env, &path)?;
                    outer.push((path, value));
                }
                self.subquery(query, outer, env.depth)
            }
            Expression::PropertyRef { path, comparison } => {
                let value = self.walk(env, path)?;
                match comparison {
                    None => Ok(value),
                    Some((op, rhs)) => self.compare(*op, &value, rhs, env).map(Value::Bool),
                }
            }
            Expression::RelationAccess { via, rest } => {
                match self.walk(env, std::slice::from_ref(via))? {
                    Value::Null => Ok(Value::Null),
                    Value::Record(target) => {
                        let mut inner = Env::correlated(target, env.outer.clone(), env.depth);
                        self.eval(rest, &mut inner)
                    }
                    other => Err(EvalError::TypeMismatch {
                        op: format!("relation access `{via}`"),
                        detail: other.type_name().to_string(),
                    }),
                }
            }
            Expression::Opaque(thunk) => thunk.call(self.registry),
        }
    }

    fn all(&self, exprs: &[Expression], env: &mut Env) -> Result<Vec<Value>, EvalError> {
        exprs.iter().map(|e| self.eval(e, env)).collect()
    }

    /// Reads a reference path, starting from the innermost bound prefix.
    pub fn walk(&self, env: &Env, path: &[String]) -> Result<Value, EvalError> {
        let (mut current, skip) = env
            .bound(path)
            .unwrap_or_else(|| (Value::Record(env.record.clone()), 0));
        for segment in &path[skip..] {
            current = self.attr(current, segment, env.depth)?;
        }
        Ok(current)
    }

    fn attr(&self, base: Value, name: &str, depth: usize) -> Result<Value, EvalError> {
        match base {
            Value::Null => Ok(Value::Null),
            Value::Record(record) => {
                if name == PK {
                    return Ok(record.pk());
                }
                if let Some(v) = record.field(name) {
                    return Ok(v);
                }
                let Some(prop) = self.registry.property(record.model(), name) else {
                    return Err(EvalError::UnknownAttribute {
                        model: record.model().to_string(),
                        name: name.to_string(),
                    });
                };
                let max_depth = self.registry.settings().max_depth;
                if depth >= max_depth {
                    return Err(EvalError::RecursionLimit { depth: max_depth });
                }
                let mut env = Env::correlated(record, Vec::new(), depth + 1);
                self.eval(prop.expression(), &mut env)
            }
            Value::List(items) => items
                .into_iter()
                .map(|item| self.attr(item, name, depth))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Value::Map(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
            Value::Json(serde_json::Value::Object(map)) => {
                Ok(map.get(name).map(Value::from_json).unwrap_or(Value::Null))
            }
            other => Err(EvalError::TypeMismatch {
                op: format!("attribute `{name}`"),
                detail: other.type_name().to_string(),
            }),
        }
    }

    fn compare(
        &self,
        op: CompareKind,
        lhs: &Value,
        rhs: &Expression,
        env: &mut Env,
    ) -> Result<bool, EvalError> {
        let exact = matches!(op, CompareKind::Exact | CompareKind::IExact);
        if exact && matches!(rhs, Expression::Literal { value: Value::Null }) {
            return Ok(lhs.is_null());
        }
        let rhs = self.eval(rhs, env)?;
        if exact && rhs.is_null() {
            return Ok(false);
        }
        compare::lookup(op, lhs, &rhs)
    }

    fn bool_tree(
        &self,
        op: BoolOp,
        children: &[Expression],
        env: &mut Env,
    ) -> Result<Value, EvalError> {
        match op {
            BoolOp::And | BoolOp::Or => {
                let short = op == BoolOp::Or;
                for child in children {
                    if self.eval(child, env)?.is_truthy() == short {
                        return Ok(Value::Bool(short));
                    }
                }
                // An empty tree is vacuously true for either operator.
                Ok(Value::Bool(!short || children.is_empty()))
            }
            BoolOp::Not => match children {
                [child] => Ok(Value::Bool(!self.eval(child, env)?.is_truthy())),
                _ => Err(EvalError::TypeMismatch {
                    op: "not".to_string(),
                    detail: format!("{} operands", children.len()),
                }),
            },
            BoolOp::Xor => {
                if children.is_empty() {
                    return Err(EvalError::TypeMismatch {
                        op: "xor".to_string(),
                        detail: "no operands".to_string(),
                    });
                }
                let mut acc = false;
                for child in children {
                    acc ^= self.eval(child, env)?.is_truthy();
                }
                Ok(Value::Bool(acc))
            }
        }
    }

    fn transform(
        &self,
        kind: &TransformKind,
        args: &[Expression],
        env: &mut Env,
    ) -> Result<Value, EvalError> {
        match kind {
            TransformKind::Coalesce => {
                for arg in args {
                    let v = self.eval(arg, env)?;
                    if !v.is_null() {
                        return Ok(v);
                    }
                }
                Ok(Value::Null)
            }
            TransformKind::Vendor(name) => {
                let values = self.all(args, env)?;
                self.vendors.call(name, &values)
            }
            other => {
                let values = self.all(args, env)?;
                ops::apply_transform(other, &values, self.registry.settings().use_tz)
            }
        }
    }

    /// Same population rules as the compiled form: the first to-many
    /// relation on the source path, or every record of the model the
    /// path's owner belongs to.
    fn aggregate(&self, agg: &Aggregate, env: &mut Env) -> Result<Value, EvalError> {
        let Expression::FieldRef { path } = agg.source.as_ref() else {
            return Err(EvalError::TypeMismatch {
                op: agg.kind.name().to_string(),
                detail: format!("{} source", agg.source.kind_name()),
            });
        };
        if path.is_empty() {
            return Err(EvalError::TypeMismatch {
                op: agg.kind.name().to_string(),
                detail: "empty source".to_string(),
            });
        }
        let schema = self.store.schema();
        let mut model = env.record.model().to_string();
        let mut split = None;
        for (idx, segment) in path.iter().enumerate() {
            match schema.relation(&model, segment) {
                Some(rel) if rel.cardinality == Cardinality::ToMany => {
                    split = Some((idx, true));
                    break;
                }
                Some(rel) if idx + 1 < path.len() => model = rel.target.clone(),
                _ => {
                    split = Some((idx, false));
                    break;
                }
            }
        }
        let (idx, related) = split.unwrap_or((path.len() - 1, false));
        let (prefix, rows) = if related {
            let prefix = path[..=idx].to_vec();
            let rows = rows_of(self.walk(env, &prefix)?, agg.kind)?;
            (prefix, rows)
        } else {
            let prefix = path[..idx].to_vec();
            let owner = if prefix.is_empty() {
                env.owner()
            } else {
                self.walk(env, &prefix)?
            };
            let rows = match owner {
                Value::Null => Vec::new(),
                Value::Record(r) => r.objects()?,
                other => {
                    return Err(EvalError::TypeMismatch {
                        op: agg.kind.name().to_string(),
                        detail: format!("{} population", other.type_name()),
                    })
                }
            };
            (prefix, rows)
        };
        let projects = path.len() > prefix.len();
        if !projects && agg.kind != AggregateKind::Count {
            return Err(EvalError::TypeMismatch {
                op: agg.kind.name().to_string(),
                detail: format!("relation `{}`", join_path(path)),
            });
        }

        let mut projected = Vec::with_capacity(rows.len());
        for row in rows {
            env.bind(prefix.clone(), Value::Record(row.clone()));
            let step = self.project_row(agg, path, projects, row, env);
            env.unbind();
            if let Some(v) = step? {
                projected.push(v);
            }
        }
        let default = match &agg.default {
            Some(d) if projected.iter().all(Value::is_null) => Some(self.eval(d, env)?),
            _ => None,
        };
        ops::aggregate(agg.kind, projected, default)
    }

    fn project_row(
        &self,
        agg: &Aggregate,
        path: &[String],
        projects: bool,
        row: RecordRef,
        env: &mut Env,
    ) -> Result<Option<Value>, EvalError> {
        if let Some(filter) = &agg.filter {
            if !self.eval(filter, env)?.is_truthy() {
                return Ok(None);
            }
        }
        if projects {
            self.walk(env, path).map(Some)
        } else {
            Ok(Some(Value::Record(row)))
        }
    }

    /// Runs a correlated subquery with its outer values already evaluated.
    pub fn subquery(
        &self,
        query: &Subquery,
        outer: Bindings,
        depth: usize,
    ) -> Result<Value, EvalError> {
        for row in self.store.all_under(&query.model) {
            let mut env = Env::correlated(row, outer.clone(), depth);
            if let Some(filter) = &query.filter {
                if !self.eval(filter, &mut env)?.is_truthy() {
                    continue;
                }
            }
            return match query.kind {
                SubqueryKind::Scalar => self.eval(&query.project, &mut env),
                SubqueryKind::Exists => Ok(Value::Bool(true)),
            };
        }
        Ok(match query.kind {
            SubqueryKind::Scalar => Value::Null,
            SubqueryKind::Exists => Value::Bool(false),
        })
    }
}

fn rows_of(value: Value, kind: AggregateKind) -> Result<Vec<RecordRef>, EvalError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Record(r) => Ok(vec![r]),
        Value::List(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Record(r) => Ok(r),
                other => Err(EvalError::TypeMismatch {
                    op: kind.name().to_string(),
                    detail: format!("{} row", other.type_name()),
                }),
            })
            .collect(),
        other => Err(EvalError::TypeMismatch {
            op: kind.name().to_string(),
            detail: format!("{} population", other.type_name()),
        }),
    }
}

//! Expression tree to procedure body.

use crate::capture::{CaptureRegistry, Producer};
use crate::config::compile_debug_enabled;
use crate::error::{CompileError, EvalError};
use crate::expr::{
    join_path, Aggregate, AggregateKind, BinaryOperator, BoolOp, CollectionKind, CompareKind,
    Expression, TransformKind,
};
use crate::ops::{Capability, CmpOp, TransformCatalog};
use crate::procedure::{
    materialize, AggregateNode, LogicOp, Population, ProcBody, ProcNode, Procedure, Stmt,
};
use crate::registry::Registry;
use crate::schema::{Cardinality, Schema};
use crate::value::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Evaluates a sub-expression the compiler cannot lower, on behalf of a
/// captured parameter. `args` are the values of the subquery's correlated
/// references (or a vendor function's arguments) at the call site.
pub trait ScalarFallback: Send + Sync {
    fn evaluate(
        &self,
        registry: &Registry,
        model: &str,
        expr: &Expression,
        args: &[Value],
    ) -> Result<Value, EvalError>;
}

#[derive(Clone)]
pub struct CompileContext<'a> {
    pub model: &'a str,
    pub schema: &'a Schema,
    /// `now()` compiles to UTC when set.
    pub use_tz: bool,
    pub fallback: Option<Arc<dyn ScalarFallback>>,
}

impl<'a> CompileContext<'a> {
    pub fn new(model: &'a str, schema: &'a Schema) -> Self {
        Self {
            model,
            schema,
            use_tz: true,
            fallback: None,
        }
    }

    pub fn with_use_tz(mut self, use_tz: bool) -> Self {
        self.use_tz = use_tz;
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn ScalarFallback>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

#[derive(Debug)]
pub struct CompiledBody {
    pub body: ProcBody,
    pub capabilities: BTreeSet<Capability>,
    pub captures: CaptureRegistry,
    pub fallback_count: usize,
}

pub trait ProcedureCompiler {
    fn compile(
        &self,
        expr: &Expression,
        ctx: &CompileContext<'_>,
    ) -> Result<CompiledBody, CompileError>;
}

#[derive(Debug, Default)]
pub struct TreeCompiler;

impl ProcedureCompiler for TreeCompiler {
    fn compile(
        &self,
        expr: &Expression,
        ctx: &CompileContext<'_>,
    ) -> Result<CompiledBody, CompileError> {
        if !ctx.schema.contains(ctx.model) {
            return Err(CompileError::UnknownModel {
                model: ctx.model.to_string(),
            });
        }
        let mut lower = Lower {
            ctx,
            capabilities: BTreeSet::new(),
            captures: CaptureRegistry::new(),
            scopes: Vec::new(),
            fallback_count: 0,
        };
        let statements = lower.body(expr)?;
        Ok(CompiledBody {
            body: ProcBody { statements },
            capabilities: lower.capabilities,
            captures: lower.captures,
            fallback_count: lower.fallback_count,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileReport {
    pub model: String,
    pub property: String,
    pub expr_nodes: usize,
    pub proc_nodes: usize,
    pub statement_count: usize,
    pub capture_count: usize,
    pub capability_count: usize,
    pub fallback_count: usize,
    pub compile_time_us: u64,
}

impl CompileReport {
    pub fn summary_line(&self) -> String {
        format!(
            "model={} property={} expr_nodes={} proc_nodes={} statements={} captures={} capabilities={} fallbacks={} compile_us={}",
            self.model,
            self.property,
            self.expr_nodes,
            self.proc_nodes,
            self.statement_count,
            self.capture_count,
            self.capability_count,
            self.fallback_count,
            self.compile_time_us,
        )
    }
}

/// Compiles and materializes one property with the default compiler.
pub fn compile_procedure(
    name: &str,
    expr: &Expression,
    ctx: &CompileContext<'_>,
) -> Result<(Procedure, CompileReport), CompileError> {
    let started_at = Instant::now();
    let compiled = TreeCompiler.compile(expr, ctx)?;
    let fallback_count = compiled.fallback_count;
    let procedure = materialize(name, compiled.body, compiled.capabilities, compiled.captures);
    let report = CompileReport {
        model: ctx.model.to_string(),
        property: name.to_string(),
        expr_nodes: expr.node_count(),
        proc_nodes: procedure.node_count(),
        statement_count: procedure.statement_count(),
        capture_count: procedure.captures().len(),
        capability_count: procedure.capabilities().count(),
        fallback_count,
        compile_time_us: started_at.elapsed().as_micros() as u64,
    };
    if compile_debug_enabled() {
        info!(target: "lookup_property::compile", "{}", report.summary_line());
    } else {
        debug!(target: "lookup_property::compile", "{}", report.summary_line());
    }
    Ok((procedure, report))
}

/// Rebinding of references inside an aggregate.
#[derive(Debug, Clone)]
enum Scope {
    /// References starting with `prefix` read from `binder` with the prefix
    /// stripped. An empty prefix captures every reference.
    Bind { prefix: Vec<String>, binder: String },
    /// Body of a relation access: references read from the reached record.
    Barrier,
}

struct Lower<'c, 'a> {
    ctx: &'c CompileContext<'a>,
    capabilities: BTreeSet<Capability>,
    captures: CaptureRegistry,
    scopes: Vec<Scope>,
    fallback_count: usize,
}

impl Lower<'_, '_> {
    /// Statement form. A conditional at the top of a body, or as the result
    /// of a branch, nests as statements instead of being wrapped in a return.
    fn body(&mut self, expr: &Expression) -> Result<Vec<Stmt>, CompileError> {
        match expr {
            Expression::Conditional { branches, default } => self.branches(branches, default),
            other => Ok(vec![Stmt::Return(self.lower(other)?)]),
        }
    }

    fn branches(
        &mut self,
        branches: &[(Expression, Expression)],
        default: &Expression,
    ) -> Result<Vec<Stmt>, CompileError> {
        let Some(((when, then), rest)) = branches.split_first() else {
            return self.body(default);
        };
        let cond = self.lower(when)?;
        let then = self.body(then)?;
        let otherwise = self.branches(rest, default)?;
        Ok(vec![Stmt::If {
            cond,
            then,
            otherwise,
        }])
    }

    fn lower(&mut self, expr: &Expression) -> Result<ProcNode, CompileError> {
        match expr {
            Expression::FieldRef { path } => self.path(path),
            Expression::OuterRef { path } => Err(CompileError::StrayOuterRef {
                path: join_path(path),
            }),
            Expression::Literal { value } => Ok(ProcNode::Literal(value.clone())),
            Expression::Collection { kind, items } => {
                if *kind == CollectionKind::Mapping && items.len() % 2 != 0 {
                    return Err(CompileError::InvalidArgument {
                        kind: "mapping".to_string(),
                        reason: format!("expected key/value pairs, got {} items", items.len()),
                    });
                }
                Ok(ProcNode::Collection {
                    kind: *kind,
                    items: self.lower_all(items)?,
                })
            }
            Expression::BinaryOp { op, lhs, rhs } => Ok(ProcNode::Binary {
                op: *op,
                lhs: self.lower(lhs)?.boxed(),
                rhs: self.lower(rhs)?.boxed(),
            }),
            Expression::CompareOp { op, lhs, rhs } => {
                let lhs = self.lower(lhs)?;
                self.compare(*op, lhs, rhs)
            }
            Expression::BoolTree { op, children } => self.bool_tree(*op, children),
            Expression::Conditional { branches, default } => {
                let mut arms = Vec::with_capacity(branches.len());
                for (when, then) in branches {
                    arms.push((self.lower(when)?, self.lower(then)?));
                }
                let mut acc = self.lower(default)?;
                while let Some((cond, then)) = arms.pop() {
                    acc = ProcNode::IfElse {
                        cond: cond.boxed(),
                        then: then.boxed(),
                        otherwise: acc.boxed(),
                    };
                }
                Ok(acc)
            }
            Expression::Transform { kind, args } => self.transform(expr, kind, args),
            Expression::Aggregate(agg) => self.aggregate(agg),
            Expression::SubqueryRef(query) => {
                let mut args = Vec::new();
                for path in query.correlated_refs() {
                    args.push(self.path(&path)?);
                }
                self.fallback(expr, format!("subquery {}", query.model), args)
            }
            Expression::PropertyRef { path, comparison } => {
                let read = self.path(path)?;
                match comparison {
                    Some((op, value)) => self.compare(*op, read, value),
                    None => Ok(read),
                }
            }
            Expression::RelationAccess { via, rest } => {
                let via = self.path(std::slice::from_ref(via))?;
                self.scopes.push(Scope::Barrier);
                let body = self.lower(rest);
                self.scopes.pop();
                Ok(ProcNode::Scoped {
                    via: via.boxed(),
                    body: body?.boxed(),
                })
            }
            Expression::Opaque(thunk) => {
                let param = self
                    .captures
                    .capture(thunk.label(), thunk.producer().clone())
                    .param
                    .clone();
                Ok(ProcNode::CallCapture {
                    param,
                    args: Vec::new(),
                })
            }
        }
    }

    fn lower_all(&mut self, exprs: &[Expression]) -> Result<Vec<ProcNode>, CompileError> {
        exprs.iter().map(|e| self.lower(e)).collect()
    }

    /// Attribute chain for a reference path, honoring aggregate rebinding.
    fn path(&self, path: &[String]) -> Result<ProcNode, CompileError> {
        if path.is_empty() {
            return Err(CompileError::InvalidExpression {
                reason: "empty reference path".to_string(),
            });
        }
        for scope in self.scopes.iter().rev() {
            match scope {
                Scope::Barrier => break,
                Scope::Bind { prefix, binder } if path.starts_with(prefix) => {
                    return Ok(ProcNode::chain(
                        ProcNode::Local(binder.clone()),
                        &path[prefix.len()..],
                    ));
                }
                Scope::Bind { .. } => {}
            }
        }
        Ok(ProcNode::chain(ProcNode::SelfRef, path))
    }

    fn compare(
        &mut self,
        op: CompareKind,
        lhs: ProcNode,
        rhs: &Expression,
    ) -> Result<ProcNode, CompileError> {
        use CompareKind as K;
        let literal_null = matches!(rhs, Expression::Literal { value: Value::Null });
        let cmp = |op: CmpOp, lhs: ProcNode, rhs: ProcNode| ProcNode::Compare {
            op,
            lhs: lhs.boxed(),
            rhs: rhs.boxed(),
        };
        let fold = |node: ProcNode| ProcNode::Casefold(node.boxed());
        Ok(match op {
            K::Exact | K::IExact if literal_null => ProcNode::IsNull {
                value: lhs.boxed(),
                negated: false,
            },
            K::Exact => cmp(CmpOp::Eq, lhs, self.lower(rhs)?),
            K::IExact => cmp(CmpOp::Eq, fold(lhs), fold(self.lower(rhs)?)),
            K::Gt => cmp(CmpOp::Gt, lhs, self.lower(rhs)?),
            K::Gte => cmp(CmpOp::Ge, lhs, self.lower(rhs)?),
            K::Lt => cmp(CmpOp::Lt, lhs, self.lower(rhs)?),
            K::Lte => cmp(CmpOp::Le, lhs, self.lower(rhs)?),
            K::In => cmp(CmpOp::In, lhs, self.lower(rhs)?),
            K::Contains => cmp(CmpOp::Contains, lhs, self.lower(rhs)?),
            K::IContains => cmp(CmpOp::Contains, fold(lhs), fold(self.lower(rhs)?)),
            K::StartsWith => cmp(CmpOp::StartsWith, lhs, self.lower(rhs)?),
            K::IStartsWith => cmp(CmpOp::StartsWith, fold(lhs), fold(self.lower(rhs)?)),
            K::EndsWith => cmp(CmpOp::EndsWith, lhs, self.lower(rhs)?),
            K::IEndsWith => cmp(CmpOp::EndsWith, fold(lhs), fold(self.lower(rhs)?)),
            K::Range => {
                let (lo, hi) = self.bounds(rhs)?;
                ProcNode::Between {
                    lo: lo.boxed(),
                    value: lhs.boxed(),
                    hi: hi.boxed(),
                }
            }
            K::IsNull => match rhs {
                Expression::Literal {
                    value: Value::Bool(is_null),
                } => ProcNode::IsNull {
                    value: lhs.boxed(),
                    negated: !is_null,
                },
                _ => {
                    return Err(CompileError::InvalidArgument {
                        kind: op.name().to_string(),
                        reason: "expects a literal boolean".to_string(),
                    })
                }
            },
            K::Regex | K::IRegex => {
                self.capabilities.insert(Capability::Regex);
                let case_insensitive = op == K::IRegex;
                cmp(CmpOp::Matches { case_insensitive }, lhs, self.lower(rhs)?)
            }
        })
    }

    fn bounds(&mut self, rhs: &Expression) -> Result<(ProcNode, ProcNode), CompileError> {
        match rhs {
            Expression::Collection {
                kind: CollectionKind::List | CollectionKind::Tuple,
                items,
            } if items.len() == 2 => Ok((self.lower(&items[0])?, self.lower(&items[1])?)),
            Expression::Literal {
                value: Value::List(items) | Value::Tuple(items),
            } if items.len() == 2 => Ok((
                ProcNode::Literal(items[0].clone()),
                ProcNode::Literal(items[1].clone()),
            )),
            _ => Err(CompileError::InvalidArgument {
                kind: CompareKind::Range.name().to_string(),
                reason: "expects a (lo, hi) pair".to_string(),
            }),
        }
    }

    fn bool_tree(&mut self, op: BoolOp, children: &[Expression]) -> Result<ProcNode, CompileError> {
        match op {
            BoolOp::And | BoolOp::Or if children.is_empty() => {
                Ok(ProcNode::Literal(Value::Bool(true)))
            }
            BoolOp::And | BoolOp::Or => Ok(ProcNode::Logic {
                op: if op == BoolOp::And { LogicOp::And } else { LogicOp::Or },
                operands: self.lower_all(children)?,
            }),
            BoolOp::Not => match children {
                [child] => Ok(ProcNode::Not(self.lower(child)?.boxed())),
                _ => Err(CompileError::InvalidArgument {
                    kind: "not".to_string(),
                    reason: format!("expects exactly one operand, got {}", children.len()),
                }),
            },
            BoolOp::Xor => {
                let mut lowered = self.lower_all(children)?;
                let Some(mut acc) = lowered.pop() else {
                    return Err(CompileError::InvalidArgument {
                        kind: "xor".to_string(),
                        reason: "expects at least one operand".to_string(),
                    });
                };
                if lowered.is_empty() {
                    return Ok(ProcNode::Logic {
                        op: LogicOp::And,
                        operands: vec![acc],
                    });
                }
                while let Some(lhs) = lowered.pop() {
                    acc = ProcNode::Xor {
                        lhs: lhs.boxed(),
                        rhs: acc.boxed(),
                    };
                }
                Ok(acc)
            }
        }
    }

    fn transform(
        &mut self,
        expr: &Expression,
        kind: &TransformKind,
        args: &[Expression],
    ) -> Result<ProcNode, CompileError> {
        if let TransformKind::Vendor(name) = kind {
            let args = self.lower_all(args)?;
            return self.fallback(expr, format!("vendor {name}"), args);
        }
        let meta = TransformCatalog::meta(kind);
        meta.check_arity(args.len())?;
        if let Some(capability) = meta.capability {
            self.capabilities.insert(capability);
        }
        let mut lowered = self.lower_all(args)?;
        Ok(match kind {
            TransformKind::Coalesce => ProcNode::Coalesce(lowered),
            TransformKind::Concat => {
                let mut acc = lowered.pop().unwrap_or(ProcNode::Literal(Value::Str(String::new())));
                while let Some(lhs) = lowered.pop() {
                    acc = ProcNode::Call {
                        func: TransformKind::Concat,
                        args: vec![lhs, acc],
                    };
                }
                acc
            }
            TransformKind::Substr => {
                let mut it = lowered.into_iter();
                let (Some(base), Some(start)) = (it.next(), it.next()) else {
                    return Err(CompileError::InvalidExpression {
                        reason: "substr needs a base and a start".to_string(),
                    });
                };
                let from = ProcNode::Binary {
                    op: BinaryOperator::Sub,
                    lhs: start.boxed(),
                    rhs: ProcNode::Literal(Value::Int(1)).boxed(),
                };
                let to = it.next().map(|len| ProcNode::Binary {
                    op: BinaryOperator::Add,
                    lhs: from.clone().boxed(),
                    rhs: len.boxed(),
                });
                ProcNode::Slice {
                    base: base.boxed(),
                    start: Some(from.boxed()),
                    end: to.map(ProcNode::boxed),
                }
            }
            TransformKind::Left => {
                let mut it = lowered.into_iter();
                let (Some(base), Some(n)) = (it.next(), it.next()) else {
                    return Err(CompileError::InvalidExpression {
                        reason: "left needs a base and a length".to_string(),
                    });
                };
                ProcNode::Slice {
                    base: base.boxed(),
                    start: None,
                    end: Some(n.boxed()),
                }
            }
            TransformKind::JsonObject => {
                if lowered.len() % 2 != 0 {
                    return Err(CompileError::InvalidArgument {
                        kind: meta.name.to_string(),
                        reason: "expects interleaved keys and values".to_string(),
                    });
                }
                ProcNode::Collection {
                    kind: CollectionKind::Mapping,
                    items: lowered,
                }
            }
            TransformKind::Now => ProcNode::Now { utc: self.ctx.use_tz },
            other => ProcNode::Call {
                func: other.clone(),
                args: lowered,
            },
        })
    }

    /// Live-collection aggregate. The population is the first to-many
    /// relation along the source path (reached through to-one hops), or
    /// every record of the model the path ends on.
    fn aggregate(&mut self, agg: &Aggregate) -> Result<ProcNode, CompileError> {
        let Expression::FieldRef { path } = agg.source.as_ref() else {
            return Err(CompileError::InvalidArgument {
                kind: agg.kind.name().to_string(),
                reason: format!("source must be a field reference, got {}", agg.source.kind_name()),
            });
        };
        if path.is_empty() {
            return Err(CompileError::InvalidExpression {
                reason: "empty aggregate source".to_string(),
            });
        }
        let schema = self.ctx.schema;
        let mut model = self.ctx.model.to_string();
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
        let depth = self.scopes.iter().filter(|s| matches!(s, Scope::Bind { .. })).count();
        let (prefix, population, binder) = if related {
            let prefix = path[..=idx].to_vec();
            let population = Population::Related(self.path(&prefix)?);
            (prefix, population, binder_name("item", depth))
        } else {
            let prefix = path[..idx].to_vec();
            let owner = if prefix.is_empty() {
                self.path_or_self(&prefix)
            } else {
                self.path(&prefix)?
            };
            (prefix, Population::Objects(owner), binder_name("row", depth))
        };
        let rest = &path[prefix.len()..];
        if rest.is_empty() && agg.kind != AggregateKind::Count {
            return Err(CompileError::InvalidArgument {
                kind: agg.kind.name().to_string(),
                reason: format!("`{}` names a relation, not a value", join_path(path)),
            });
        }
        let default = agg.default.as_deref().map(|d| self.lower(d)).transpose()?;

        self.scopes.push(Scope::Bind {
            prefix,
            binder: binder.clone(),
        });
        let inner = self.aggregate_body(agg, rest, &binder);
        self.scopes.pop();
        let (filter, project) = inner?;

        Ok(ProcNode::Aggregate(Box::new(AggregateNode {
            kind: agg.kind,
            population,
            binder,
            filter,
            project,
            default,
        })))
    }

    fn aggregate_body(
        &mut self,
        agg: &Aggregate,
        rest: &[String],
        binder: &str,
    ) -> Result<(Option<ProcNode>, Option<ProcNode>), CompileError> {
        let filter = agg.filter.as_deref().map(|f| self.lower(f)).transpose()?;
        let project = (!rest.is_empty())
            .then(|| ProcNode::chain(ProcNode::Local(binder.to_string()), rest));
        Ok((filter, project))
    }

    /// Record an own-model population is listed from: the innermost bound
    /// row inside another aggregate, `self` otherwise.
    fn path_or_self(&self, prefix: &[String]) -> ProcNode {
        for scope in self.scopes.iter().rev() {
            match scope {
                Scope::Barrier => break,
                Scope::Bind { prefix: p, binder } if p.is_empty() || prefix.starts_with(p) => {
                    return ProcNode::Local(binder.clone())
                }
                Scope::Bind { .. } => {}
            }
        }
        ProcNode::SelfRef
    }

    fn fallback(
        &mut self,
        expr: &Expression,
        label: String,
        args: Vec<ProcNode>,
    ) -> Result<ProcNode, CompileError> {
        let Some(fallback) = self.ctx.fallback.clone() else {
            return Err(CompileError::UnsupportedKind { kind: label });
        };
        let model = self.ctx.model.to_string();
        let captured = expr.clone();
        let producer: Producer = Arc::new(move |registry, args| {
            fallback.evaluate(registry, &model, &captured, args)
        });
        debug!(
            target: "lookup_property::compile",
            model = self.ctx.model,
            kind = expr.kind_name(),
            "capturing {label} through fallback"
        );
        self.fallback_count += 1;
        let param = self.captures.capture(label, producer).param.clone();
        Ok(ProcNode::CallCapture { param, args })
    }
}

fn binder_name(base: &str, depth: usize) -> String {
    if depth == 0 {
        base.to_string()
    } else {
        format!("{base}{depth}")
    }
}

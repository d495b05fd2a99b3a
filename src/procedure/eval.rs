use super::node::{AggregateNode, LogicOp, Population, ProcNode, Stmt};
use crate::capture::Producer;
use crate::error::EvalError;
use crate::expr::TransformKind;
use crate::ops::{self, compare};
use crate::record::RecordRef;
use crate::registry::Registry;
use crate::schema::PK;
use crate::value::Value;

/// Evaluation state for one procedure call.
pub(crate) struct Frame<'a> {
    pub registry: &'a Registry,
    pub record: RecordRef,
    pub params: &'a [(String, Producer)],
    /// Property nesting depth of this call.
    pub depth: usize,
    locals: Vec<(String, Value)>,
}

impl<'a> Frame<'a> {
    pub fn new(
        registry: &'a Registry,
        record: RecordRef,
        params: &'a [(String, Producer)],
        depth: usize,
    ) -> Self {
        Self {
            registry,
            record,
            params,
            depth,
            locals: Vec::new(),
        }
    }

    pub fn run(&mut self, stmts: &[Stmt]) -> Result<Option<Value>, EvalError> {
        for stmt in stmts {
            match stmt {
                Stmt::Import(_) => {}
                Stmt::Return(node) => return self.eval(node).map(Some),
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    let branch = if self.eval(cond)?.is_truthy() { then } else { otherwise };
                    if let Some(v) = self.run(branch)? {
                        return Ok(Some(v));
                    }
                }
            }
        }
        Ok(None)
    }

    fn local(&self, name: &str) -> Value {
        self.locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null)
    }

    fn all(&mut self, nodes: &[ProcNode]) -> Result<Vec<Value>, EvalError> {
        nodes.iter().map(|n| self.eval(n)).collect()
    }

    fn opt(&mut self, node: Option<&ProcNode>) -> Result<Option<Value>, EvalError> {
        node.map(|n| self.eval(n)).transpose()
    }

    pub fn eval(&mut self, node: &ProcNode) -> Result<Value, EvalError> {
        match node {
            ProcNode::Literal(v) => Ok(v.clone()),
            ProcNode::SelfRef => Ok(Value::Record(self.record.clone())),
            ProcNode::Local(name) => Ok(self.local(name)),
            ProcNode::Attr { base, name } => {
                let base = self.eval(base)?;
                read_attr(self.registry, &base, name, self.depth)
            }
            ProcNode::Collection { kind, items } => {
                let values = self.all(items)?;
                ops::collection(*kind, values)
            }
            ProcNode::Binary { op, lhs, rhs } => {
                let (l, r) = (self.eval(lhs)?, self.eval(rhs)?);
                ops::binary(*op, &l, &r)
            }
            ProcNode::Compare { op, lhs, rhs } => {
                let (l, r) = (self.eval(lhs)?, self.eval(rhs)?);
                compare::apply(*op, &l, &r).map(Value::Bool)
            }
            ProcNode::Between { lo, value, hi } => {
                let lo = self.eval(lo)?;
                let value = self.eval(value)?;
                let hi = self.eval(hi)?;
                Ok(Value::Bool(ops::between(&lo, &value, &hi)))
            }
            ProcNode::IsNull { value, negated } => {
                let is_null = self.eval(value)?.is_null();
                Ok(Value::Bool(is_null != *negated))
            }
            ProcNode::Casefold(inner) => Ok(ops::casefold(&self.eval(inner)?)),
            ProcNode::Logic { op, operands } => {
                let short = matches!(op, LogicOp::Or);
                for operand in operands {
                    if self.eval(operand)?.is_truthy() == short {
                        return Ok(Value::Bool(short));
                    }
                }
                Ok(Value::Bool(!short))
            }
            ProcNode::Xor { lhs, rhs } => {
                let l = self.eval(lhs)?.is_truthy();
                let r = self.eval(rhs)?.is_truthy();
                Ok(Value::Bool(l != r))
            }
            ProcNode::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.is_truthy())),
            ProcNode::IfElse {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            ProcNode::Coalesce(items) => {
                for item in items {
                    let v = self.eval(item)?;
                    if !v.is_null() {
                        return Ok(v);
                    }
                }
                Ok(Value::Null)
            }
            ProcNode::Slice { base, start, end } => {
                let base = self.eval(base)?;
                let start = self.opt(start.as_deref())?;
                let end = self.opt(end.as_deref())?;
                if start.as_ref().is_some_and(Value::is_null)
                    || end.as_ref().is_some_and(Value::is_null)
                {
                    return Ok(Value::Null);
                }
                let index = |v: Option<Value>| -> Result<Option<i64>, EvalError> {
                    v.map(|v| {
                        v.as_i64().ok_or_else(|| EvalError::TypeMismatch {
                            op: "slice".to_string(),
                            detail: format!("{} index", v.type_name()),
                        })
                    })
                    .transpose()
                };
                ops::slice(&base, index(start)?, index(end)?)
            }
            ProcNode::Call { func, args } => {
                let values = self.all(args)?;
                ops::apply_transform(func, &values, self.registry.settings().use_tz)
            }
            ProcNode::Now { utc } => ops::apply_transform(&TransformKind::Now, &[], *utc),
            ProcNode::CallCapture { param, args } => {
                let values = self.all(args)?;
                let producer = self
                    .params
                    .iter()
                    .find(|(name, _)| name == param)
                    .map(|(_, p)| p.clone())
                    .ok_or_else(|| EvalError::UnknownCapture { param: param.clone() })?;
                producer(self.registry, &values)
            }
            ProcNode::Aggregate(agg) => self.aggregate(agg),
            ProcNode::Scoped { via, body } => match self.eval(via)? {
                Value::Null => Ok(Value::Null),
                Value::Record(target) => {
                    let saved = std::mem::replace(&mut self.record, target);
                    let out = self.eval(body);
                    self.record = saved;
                    out
                }
                other => Err(EvalError::TypeMismatch {
                    op: "relation access".to_string(),
                    detail: other.type_name().to_string(),
                }),
            },
        }
    }

    fn aggregate(&mut self, agg: &AggregateNode) -> Result<Value, EvalError> {
        let rows = match &agg.population {
            Population::Related(node) => records(self.eval(node)?)?,
            Population::Objects(node) => match self.eval(node)? {
                Value::Null => Vec::new(),
                Value::Record(r) => r.objects()?,
                other => {
                    return Err(EvalError::TypeMismatch {
                        op: agg.kind.name().to_string(),
                        detail: format!("{} population", other.type_name()),
                    })
                }
            },
        };
        let mut projected = Vec::with_capacity(rows.len());
        for row in rows {
            self.locals.push((agg.binder.clone(), Value::Record(row.clone())));
            let step = self.project_row(agg, row);
            self.locals.pop();
            if let Some(v) = step? {
                projected.push(v);
            }
        }
        let default = if projected.iter().all(Value::is_null) {
            self.opt(agg.default.as_ref())?
        } else {
            None
        };
        ops::aggregate(agg.kind, projected, default)
    }

    fn project_row(
        &mut self,
        agg: &AggregateNode,
        row: RecordRef,
    ) -> Result<Option<Value>, EvalError> {
        if let Some(filter) = &agg.filter {
            if !self.eval(filter)?.is_truthy() {
                return Ok(None);
            }
        }
        match &agg.project {
            Some(project) => self.eval(project).map(Some),
            None => Ok(Some(Value::Record(row))),
        }
    }
}

fn records(v: Value) -> Result<Vec<RecordRef>, EvalError> {
    match v {
        Value::Null => Ok(Vec::new()),
        Value::Record(r) => Ok(vec![r]),
        Value::List(items) | Value::Set(items) | Value::Tuple(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Record(r) => Ok(r),
                other => Err(EvalError::TypeMismatch {
                    op: "aggregate".to_string(),
                    detail: format!("{} row", other.type_name()),
                }),
            })
            .collect(),
        other => Err(EvalError::TypeMismatch {
            op: "aggregate".to_string(),
            detail: format!("{} population", other.type_name()),
        }),
    }
}

/// Attribute read on an evaluated value. Records resolve stored fields and
/// relations first, then declared properties through the registry.
pub(crate) fn read_attr(
    registry: &Registry,
    base: &Value,
    name: &str,
    depth: usize,
) -> Result<Value, EvalError> {
    match base {
        Value::Null => Ok(Value::Null),
        Value::Record(record) => {
            if name == PK {
                return Ok(record.pk());
            }
            if let Some(v) = record.field(name) {
                return Ok(v);
            }
            match registry.read_property(record, name, depth + 1)? {
                Some(v) => Ok(v),
                None => Err(EvalError::UnknownAttribute {
                    model: record.model().to_string(),
                    name: name.to_string(),
                }),
            }
        }
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

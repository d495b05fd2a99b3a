//! Expression model shared by the compiler, the rewriter and query engines.

use crate::capture::Thunk;
use crate::value::Value;
use std::fmt;

/// Separator of relation-traversal segments in textual paths.
pub const PATH_SEP: char = '.';

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    FieldRef {
        path: Vec<String>,
    },
    /// Reference to the enclosing record, only meaningful inside a subquery.
    OuterRef {
        path: Vec<String>,
    },
    Literal {
        value: Value,
    },
    Collection {
        kind: CollectionKind,
        items: Vec<Expression>,
    },
    BinaryOp {
        op: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    CompareOp {
        op: CompareKind,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    BoolTree {
        op: BoolOp,
        children: Vec<Expression>,
    },
    Conditional {
        branches: Vec<(Expression, Expression)>,
        default: Box<Expression>,
    },
    Transform {
        kind: TransformKind,
        args: Vec<Expression>,
    },
    Aggregate(Aggregate),
    SubqueryRef(Subquery),
    /// Reference to another declared property, optionally compared to a value.
    PropertyRef {
        path: Vec<String>,
        comparison: Option<(CompareKind, Box<Expression>)>,
    },
    /// Evaluate `rest` against the record reached through relation `via`.
    RelationAccess {
        via: String,
        rest: Box<Expression>,
    },
    Opaque(Thunk),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub kind: AggregateKind,
    /// Always a `FieldRef`: a to-many relation (optionally followed by a
    /// field of the related model), `pk`, or a field of the owning model.
    pub source: Box<Expression>,
    pub filter: Option<Box<Expression>>,
    pub default: Option<Box<Expression>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub model: String,
    pub filter: Option<Box<Expression>>,
    pub project: Box<Expression>,
    pub kind: SubqueryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubqueryKind {
    /// First projected value of the matching rows, or null.
    Scalar,
    Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    List,
    Set,
    Tuple,
    /// Items are interleaved keys and values.
    Mapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::LShift => "<<",
            Self::RShift => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareKind {
    Exact,
    IExact,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Range,
    IsNull,
    Regex,
    IRegex,
}

impl CompareKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::IExact => "iexact",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::Contains => "contains",
            Self::IContains => "icontains",
            Self::StartsWith => "startswith",
            Self::IStartsWith => "istartswith",
            Self::EndsWith => "endswith",
            Self::IEndsWith => "iendswith",
            Self::Range => "range",
            Self::IsNull => "isnull",
            Self::Regex => "regex",
            Self::IRegex => "iregex",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    And,
    Or,
    Xor,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    StdDev,
    Variance,
}

impl AggregateKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
            Self::StdDev => "stddev",
            Self::Variance => "variance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastTarget {
    Str,
    Int,
    Float,
    Decimal,
    Bool,
    Uuid,
    Json,
}

impl CastTarget {
    pub fn name(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Bool => "bool",
            Self::Uuid => "uuid",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateUnit {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Date,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    Year,
    IsoYear,
    Quarter,
    Month,
    Week,
    Day,
    WeekDay,
    IsoWeekDay,
    Hour,
    Minute,
    Second,
}

/// Closed catalogue of scalar functions. Arity and capability metadata
/// live in `ops::catalog`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransformKind {
    Coalesce,
    Greatest,
    Least,
    NullIf,
    Concat,
    Upper,
    Lower,
    Length,
    LPad,
    RPad,
    LTrim,
    RTrim,
    Trim,
    Left,
    Right,
    Repeat,
    Replace,
    Reverse,
    StrIndex,
    Substr,
    Ord,
    Chr,
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    JsonObject,
    Cast(CastTarget),
    Abs,
    ACos,
    ASin,
    ATan,
    ATan2,
    Ceil,
    Cos,
    Cot,
    Degrees,
    Exp,
    Floor,
    Ln,
    Log,
    Mod,
    Pi,
    Power,
    Radians,
    Random,
    Round,
    Sign,
    Sin,
    Sqrt,
    Tan,
    Now,
    Trunc(DateUnit),
    Extract(DatePart),
    /// Backend-specific function with no procedural rule.
    Vendor(String),
}

impl Expression {
    #[inline]
    pub fn boxed(self) -> Box<Expression> {
        Box::new(self)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::FieldRef { .. } => "field_ref",
            Self::OuterRef { .. } => "outer_ref",
            Self::Literal { .. } => "literal",
            Self::Collection { .. } => "collection",
            Self::BinaryOp { .. } => "binary_op",
            Self::CompareOp { .. } => "compare_op",
            Self::BoolTree { .. } => "bool_tree",
            Self::Conditional { .. } => "conditional",
            Self::Transform { .. } => "transform",
            Self::Aggregate(_) => "aggregate",
            Self::SubqueryRef(_) => "subquery",
            Self::PropertyRef { .. } => "property_ref",
            Self::RelationAccess { .. } => "relation_access",
            Self::Opaque(_) => "opaque",
        }
    }

    /// Direct children in evaluation order. Subquery internals are private
    /// to the subquery and not listed.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Self::FieldRef { .. }
            | Self::OuterRef { .. }
            | Self::Literal { .. }
            | Self::SubqueryRef(_)
            | Self::Opaque(_) => Vec::new(),
            Self::Collection { items, .. } => items.iter().collect(),
            Self::BinaryOp { lhs, rhs, .. } | Self::CompareOp { lhs, rhs, .. } => {
                vec![lhs.as_ref(), rhs.as_ref()]
            }
            Self::BoolTree { children, .. } => children.iter().collect(),
            Self::Conditional { branches, default } => {
                let mut out = Vec::with_capacity(branches.len() * 2 + 1);
                for (when, then) in branches {
                    out.push(when);
                    out.push(then);
                }
                out.push(default.as_ref());
                out
            }
            Self::Transform { args, .. } => args.iter().collect(),
            Self::Aggregate(agg) => {
                let mut out = vec![agg.source.as_ref()];
                out.extend(agg.filter.as_deref());
                out.extend(agg.default.as_deref());
                out
            }
            Self::PropertyRef { comparison, .. } => {
                comparison.iter().map(|(_, v)| v.as_ref()).collect()
            }
            Self::RelationAccess { rest, .. } => vec![rest.as_ref()],
        }
    }

    /// Rebuilds this node with every direct child (as listed by `children`)
    /// passed through `f`. Leaves, subqueries and thunks come back as-is.
    pub fn try_map_children<E>(
        &self,
        mut f: impl FnMut(&Expression) -> Result<Expression, E>,
    ) -> Result<Expression, E> {
        fn all<E>(
            items: &[Expression],
            f: &mut impl FnMut(&Expression) -> Result<Expression, E>,
        ) -> Result<Vec<Expression>, E> {
            items.iter().map(|item| f(item)).collect()
        }
        Ok(match self {
            Self::FieldRef { .. }
            | Self::OuterRef { .. }
            | Self::Literal { .. }
            | Self::SubqueryRef(_)
            | Self::Opaque(_) => self.clone(),
            Self::Collection { kind, items } => Self::Collection {
                kind: *kind,
                items: all(items, &mut f)?,
            },
            Self::BinaryOp { op, lhs, rhs } => Self::BinaryOp {
                op: *op,
                lhs: f(lhs)?.boxed(),
                rhs: f(rhs)?.boxed(),
            },
            Self::CompareOp { op, lhs, rhs } => Self::CompareOp {
                op: *op,
                lhs: f(lhs)?.boxed(),
                rhs: f(rhs)?.boxed(),
            },
            Self::BoolTree { op, children } => Self::BoolTree {
                op: *op,
                children: all(children, &mut f)?,
            },
            Self::Conditional { branches, default } => {
                let mut mapped = Vec::with_capacity(branches.len());
                for (when, then) in branches {
                    mapped.push((f(when)?, f(then)?));
                }
                Self::Conditional {
                    branches: mapped,
                    default: f(default)?.boxed(),
                }
            }
            Self::Transform { kind, args } => Self::Transform {
                kind: kind.clone(),
                args: all(args, &mut f)?,
            },
            Self::Aggregate(agg) => Self::Aggregate(Aggregate {
                kind: agg.kind,
                source: f(&agg.source)?.boxed(),
                filter: agg.filter.as_deref().map(&mut f).transpose()?.map(Expression::boxed),
                default: agg.default.as_deref().map(&mut f).transpose()?.map(Expression::boxed),
            }),
            Self::PropertyRef { path, comparison } => Self::PropertyRef {
                path: path.clone(),
                comparison: match comparison {
                    Some((op, value)) => Some((*op, f(value)?.boxed())),
                    None => None,
                },
            },
            Self::RelationAccess { via, rest } => Self::RelationAccess {
                via: via.clone(),
                rest: f(rest)?.boxed(),
            },
        })
    }

    pub fn contains_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate(_)) || self.children().iter().any(|c| c.contains_aggregate())
    }

    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(|c| c.node_count()).sum::<usize>()
    }

    // builders

    pub fn and(self, other: Expression) -> Expression {
        and([self, other])
    }

    pub fn or(self, other: Expression) -> Expression {
        or([self, other])
    }

    pub fn xor(self, other: Expression) -> Expression {
        xor([self, other])
    }

    pub fn compare(self, op: CompareKind, rhs: impl Into<Expression>) -> Expression {
        Expression::CompareOp {
            op,
            lhs: self.boxed(),
            rhs: rhs.into().boxed(),
        }
    }

    pub fn equals(self, rhs: impl Into<Expression>) -> Expression {
        self.compare(CompareKind::Exact, rhs)
    }

    pub fn iexact(self, rhs: impl Into<Expression>) -> Expression {
        self.compare(CompareKind::IExact, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expression>) -> Expression {
        self.compare(CompareKind::Gt, rhs)
    }

    pub fn gte(self, rhs: impl Into<Expression>) -> Expression {
        self.compare(CompareKind::Gte, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expression>) -> Expression {
        self.compare(CompareKind::Lt, rhs)
    }

    pub fn lte(self, rhs: impl Into<Expression>) -> Expression {
        self.compare(CompareKind::Lte, rhs)
    }

    pub fn is_in(self, rhs: impl Into<Expression>) -> Expression {
        self.compare(CompareKind::In, rhs)
    }

    pub fn contains(self, rhs: impl Into<Expression>) -> Expression {
        self.compare(CompareKind::Contains, rhs)
    }

    pub fn icontains(self, rhs: impl Into<Expression>) -> Expression {
        self.compare(CompareKind::IContains, rhs)
    }

    pub fn startswith(self, rhs: impl Into<Expression>) -> Expression {
        self.compare(CompareKind::StartsWith, rhs)
    }

    pub fn endswith(self, rhs: impl Into<Expression>) -> Expression {
        self.compare(CompareKind::EndsWith, rhs)
    }

    pub fn range(self, lo: impl Into<Expression>, hi: impl Into<Expression>) -> Expression {
        self.compare(CompareKind::Range, tuple([lo.into(), hi.into()]))
    }

    pub fn isnull(self, is_null: bool) -> Expression {
        self.compare(CompareKind::IsNull, lit(is_null))
    }

    pub fn regex(self, pattern: &str) -> Expression {
        self.compare(CompareKind::Regex, lit(pattern))
    }

    /// Attach a filter to an aggregate; no-op for other nodes.
    pub fn filtered(self, filter: Expression) -> Expression {
        match self {
            Self::Aggregate(mut agg) => {
                agg.filter = Some(filter.boxed());
                Self::Aggregate(agg)
            }
            other => other,
        }
    }

    /// Attach an empty-population default to an aggregate; no-op otherwise.
    pub fn or_default(self, default: impl Into<Expression>) -> Expression {
        match self {
            Self::Aggregate(mut agg) => {
                agg.default = Some(default.into().boxed());
                Self::Aggregate(agg)
            }
            other => other,
        }
    }
}

impl Subquery {
    pub fn new(model: impl Into<String>, project: Expression, kind: SubqueryKind) -> Self {
        Self {
            model: model.into(),
            filter: None,
            project: project.boxed(),
            kind,
        }
    }

    pub fn filter(mut self, filter: Expression) -> Self {
        self.filter = Some(filter.boxed());
        self
    }

    /// Outer references of this subquery in first-seen order. Nested
    /// subqueries keep their own correlation and are skipped.
    pub fn correlated_refs(&self) -> Vec<Vec<String>> {
        fn walk(expr: &Expression, out: &mut Vec<Vec<String>>) {
            if let Expression::OuterRef { path } = expr {
                if !out.contains(path) {
                    out.push(path.clone());
                }
                return;
            }
            for child in expr.children() {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        if let Some(filter) = &self.filter {
            walk(filter, &mut out);
        }
        walk(&self.project, &mut out);
        out
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Expression::Literal { value }
    }
}

macro_rules! literal_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Expression {
            fn from(v: $t) -> Self {
                Expression::Literal { value: Value::from(v) }
            }
        })*
    };
}

literal_from!(bool, i64, i32, f64, &str, String);

impl From<Subquery> for Expression {
    fn from(q: Subquery) -> Self {
        Expression::SubqueryRef(q)
    }
}

impl std::ops::Add for Expression {
    type Output = Expression;
    fn add(self, rhs: Expression) -> Expression {
        binary(BinaryOperator::Add, self, rhs)
    }
}

impl std::ops::Sub for Expression {
    type Output = Expression;
    fn sub(self, rhs: Expression) -> Expression {
        binary(BinaryOperator::Sub, self, rhs)
    }
}

impl std::ops::Mul for Expression {
    type Output = Expression;
    fn mul(self, rhs: Expression) -> Expression {
        binary(BinaryOperator::Mul, self, rhs)
    }
}

impl std::ops::Div for Expression {
    type Output = Expression;
    fn div(self, rhs: Expression) -> Expression {
        binary(BinaryOperator::Div, self, rhs)
    }
}

impl std::ops::Rem for Expression {
    type Output = Expression;
    fn rem(self, rhs: Expression) -> Expression {
        binary(BinaryOperator::Mod, self, rhs)
    }
}

impl std::ops::Not for Expression {
    type Output = Expression;
    fn not(self) -> Expression {
        not(self)
    }
}

pub fn split_path(path: &str) -> Vec<String> {
    path.split(PATH_SEP)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn join_path(path: &[String]) -> String {
    path.join(".")
}

pub fn field(path: &str) -> Expression {
    Expression::FieldRef {
        path: split_path(path),
    }
}

pub fn outer(path: &str) -> Expression {
    Expression::OuterRef {
        path: split_path(path),
    }
}

pub fn lit(value: impl Into<Value>) -> Expression {
    Expression::Literal {
        value: value.into(),
    }
}

pub fn null() -> Expression {
    lit(Value::Null)
}

pub fn property(path: &str) -> Expression {
    Expression::PropertyRef {
        path: split_path(path),
        comparison: None,
    }
}

pub fn binary(op: BinaryOperator, lhs: Expression, rhs: Expression) -> Expression {
    Expression::BinaryOp {
        op,
        lhs: lhs.boxed(),
        rhs: rhs.boxed(),
    }
}

pub fn and(children: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::BoolTree {
        op: BoolOp::And,
        children: children.into_iter().collect(),
    }
}

pub fn or(children: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::BoolTree {
        op: BoolOp::Or,
        children: children.into_iter().collect(),
    }
}

pub fn xor(children: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::BoolTree {
        op: BoolOp::Xor,
        children: children.into_iter().collect(),
    }
}

pub fn not(child: Expression) -> Expression {
    Expression::BoolTree {
        op: BoolOp::Not,
        children: vec![child],
    }
}

pub fn case(branches: Vec<(Expression, Expression)>, default: impl Into<Expression>) -> Expression {
    Expression::Conditional {
        branches,
        default: default.into().boxed(),
    }
}

pub fn transform(kind: TransformKind, args: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::Transform {
        kind,
        args: args.into_iter().collect(),
    }
}

pub fn coalesce(args: impl IntoIterator<Item = Expression>) -> Expression {
    transform(TransformKind::Coalesce, args)
}

pub fn concat(args: impl IntoIterator<Item = Expression>) -> Expression {
    transform(TransformKind::Concat, args)
}

pub fn aggregate(kind: AggregateKind, source: &str) -> Expression {
    Expression::Aggregate(Aggregate {
        kind,
        source: field(source).boxed(),
        filter: None,
        default: None,
    })
}

pub fn collection(kind: CollectionKind, items: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::Collection {
        kind,
        items: items.into_iter().collect(),
    }
}

pub fn tuple(items: impl IntoIterator<Item = Expression>) -> Expression {
    collection(CollectionKind::Tuple, items)
}

pub fn list(items: impl IntoIterator<Item = Expression>) -> Expression {
    collection(CollectionKind::List, items)
}

pub fn opaque(thunk: Thunk) -> Expression {
    Expression::Opaque(thunk)
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::ops::catalog::TransformCatalog::meta(self).name)
    }
}

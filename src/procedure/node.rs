use crate::expr::{AggregateKind, BinaryOperator, CollectionKind, TransformKind};
use crate::ops::catalog::Capability;
use crate::ops::CmpOp;
use crate::value::Value;

/// Procedure-body expression IR. Produced only by the compiler.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcNode {
    Literal(Value),
    /// The record parameter, or the record a `Scoped` body runs against.
    SelfRef,
    /// Row bound by an enclosing aggregate.
    Local(String),
    /// Null-propagating attribute read.
    Attr {
        base: Box<ProcNode>,
        name: String,
    },
    Collection {
        kind: CollectionKind,
        items: Vec<ProcNode>,
    },
    Binary {
        op: BinaryOperator,
        lhs: Box<ProcNode>,
        rhs: Box<ProcNode>,
    },
    Compare {
        op: CmpOp,
        lhs: Box<ProcNode>,
        rhs: Box<ProcNode>,
    },
    /// Strict `lo < value < hi`, each operand evaluated once.
    Between {
        lo: Box<ProcNode>,
        value: Box<ProcNode>,
        hi: Box<ProcNode>,
    },
    IsNull {
        value: Box<ProcNode>,
        negated: bool,
    },
    /// Case-folds strings, passes everything else through.
    Casefold(Box<ProcNode>),
    Logic {
        op: LogicOp,
        operands: Vec<ProcNode>,
    },
    Xor {
        lhs: Box<ProcNode>,
        rhs: Box<ProcNode>,
    },
    Not(Box<ProcNode>),
    IfElse {
        cond: Box<ProcNode>,
        then: Box<ProcNode>,
        otherwise: Box<ProcNode>,
    },
    /// First non-null operand, evaluated left to right.
    Coalesce(Vec<ProcNode>),
    Slice {
        base: Box<ProcNode>,
        start: Option<Box<ProcNode>>,
        end: Option<Box<ProcNode>>,
    },
    Call {
        func: TransformKind,
        args: Vec<ProcNode>,
    },
    Now {
        utc: bool,
    },
    CallCapture {
        param: String,
        args: Vec<ProcNode>,
    },
    Aggregate(Box<AggregateNode>),
    /// Runs `body` with `self` rebound to the record `via` evaluates to.
    Scoped {
        via: Box<ProcNode>,
        body: Box<ProcNode>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateNode {
    pub kind: AggregateKind,
    pub population: Population,
    pub binder: String,
    pub filter: Option<ProcNode>,
    /// `None` aggregates the rows themselves (count of a relation).
    pub project: Option<ProcNode>,
    pub default: Option<ProcNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Population {
    /// A to-many relation read; evaluates to a list of records.
    Related(ProcNode),
    /// Every record of the model of the record this node evaluates to.
    Objects(ProcNode),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Import(Capability),
    Return(ProcNode),
    If {
        cond: ProcNode,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcBody {
    pub statements: Vec<Stmt>,
}

impl ProcNode {
    #[inline]
    pub fn boxed(self) -> Box<ProcNode> {
        Box::new(self)
    }

    pub fn attr(self, name: impl Into<String>) -> ProcNode {
        ProcNode::Attr {
            base: self.boxed(),
            name: name.into(),
        }
    }

    /// `base.a.b.c` for a path `[a, b, c]`.
    pub fn chain<S: AsRef<str>>(base: ProcNode, path: &[S]) -> ProcNode {
        path.iter().fold(base, |acc, seg| acc.attr(seg.as_ref()))
    }

    pub fn node_count(&self) -> usize {
        let boxed = |b: &ProcNode| b.node_count();
        let opt = |b: &Option<Box<ProcNode>>| b.as_deref().map_or(0, boxed);
        1 + match self {
            Self::Literal(_) | Self::SelfRef | Self::Local(_) | Self::Now { .. } => 0,
            Self::Attr { base, .. } => base.node_count(),
            Self::Collection { items, .. }
            | Self::Logic { operands: items, .. }
            | Self::Coalesce(items)
            | Self::Call { args: items, .. }
            | Self::CallCapture { args: items, .. } => items.iter().map(boxed).sum(),
            Self::Binary { lhs, rhs, .. }
            | Self::Compare { lhs, rhs, .. }
            | Self::Xor { lhs, rhs } => lhs.node_count() + rhs.node_count(),
            Self::Between { lo, value, hi } => {
                lo.node_count() + value.node_count() + hi.node_count()
            }
            Self::IsNull { value, .. } => value.node_count(),
            Self::Casefold(inner) | Self::Not(inner) => inner.node_count(),
            Self::IfElse {
                cond,
                then,
                otherwise,
            } => cond.node_count() + then.node_count() + otherwise.node_count(),
            Self::Slice { base, start, end } => base.node_count() + opt(start) + opt(end),
            Self::Aggregate(agg) => {
                let population = match &agg.population {
                    Population::Related(n) | Population::Objects(n) => n.node_count(),
                };
                population
                    + agg.filter.as_ref().map_or(0, boxed)
                    + agg.project.as_ref().map_or(0, boxed)
                    + agg.default.as_ref().map_or(0, boxed)
            }
            Self::Scoped { via, body } => via.node_count() + body.node_count(),
        }
    }
}

impl Stmt {
    pub fn node_count(&self) -> usize {
        match self {
            Stmt::Import(_) => 0,
            Stmt::Return(node) => node.node_count(),
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                cond.node_count()
                    + then.iter().map(Stmt::node_count).sum::<usize>()
                    + otherwise.iter().map(Stmt::node_count).sum::<usize>()
            }
        }
    }

    pub fn statement_count(&self) -> usize {
        match self {
            Stmt::If { then, otherwise, .. } => {
                1 + then.iter().map(Stmt::statement_count).sum::<usize>()
                    + otherwise.iter().map(Stmt::statement_count).sum::<usize>()
            }
            _ => 1,
        }
    }
}

impl ProcBody {
    pub fn node_count(&self) -> usize {
        self.statements.iter().map(Stmt::node_count).sum()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.iter().map(Stmt::statement_count).sum()
    }
}

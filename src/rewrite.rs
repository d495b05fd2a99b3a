//! Relation-path rewriting.
//!
//! `rewrite(e, rel)` re-roots every reference of `e` one relation hop
//! further out: `FieldRef[a]` becomes `FieldRef[rel, a]`. Rewriting is
//! structural and returns a new tree; `rewrite(rewrite(e, a), b)` equals
//! `rewrite_path(e, [b, a])`.

use crate::expr::{Aggregate, Expression, Subquery};

pub fn rewrite(expr: &Expression, relation: &str) -> Expression {
    Rewriter { relation }.expr(expr)
}

/// Rewrites for a whole relation chain, outermost hop first. The innermost
/// hop is applied first so the root relation ends up leading every path.
pub fn rewrite_path<S: AsRef<str>>(expr: &Expression, relations: &[S]) -> Expression {
    relations
        .iter()
        .rev()
        .fold(expr.clone(), |acc, rel| rewrite(&acc, rel.as_ref()))
}

struct Rewriter<'a> {
    relation: &'a str,
}

impl Rewriter<'_> {
    fn prefixed(&self, path: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(path.len() + 1);
        out.push(self.relation.to_string());
        out.extend(path.iter().cloned());
        out
    }

    fn all(&self, exprs: &[Expression]) -> Vec<Expression> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn boxed(&self, expr: &Expression) -> Box<Expression> {
        self.expr(expr).boxed()
    }

    fn expr(&self, expr: &Expression) -> Expression {
        match expr {
            Expression::FieldRef { path } => Expression::FieldRef {
                path: self.prefixed(path),
            },
            // outer refs belong to the subquery that owns them
            Expression::OuterRef { .. } | Expression::Literal { .. } => expr.clone(),
            Expression::Collection { kind, items } => Expression::Collection {
                kind: *kind,
                items: self.all(items),
            },
            Expression::BinaryOp { op, lhs, rhs } => Expression::BinaryOp {
                op: *op,
                lhs: self.boxed(lhs),
                rhs: self.boxed(rhs),
            },
            Expression::CompareOp { op, lhs, rhs } => Expression::CompareOp {
                op: *op,
                lhs: self.boxed(lhs),
                rhs: self.boxed(rhs),
            },
            Expression::BoolTree { op, children } => Expression::BoolTree {
                op: *op,
                children: self.all(children),
            },
            Expression::Conditional { branches, default } => Expression::Conditional {
                branches: branches
                    .iter()
                    .map(|(when, then)| (self.expr(when), self.expr(then)))
                    .collect(),
                default: self.boxed(default),
            },
            Expression::Transform { kind, args } => Expression::Transform {
                kind: kind.clone(),
                args: self.all(args),
            },
            Expression::Aggregate(agg) => Expression::Aggregate(Aggregate {
                kind: agg.kind,
                source: self.boxed(&agg.source),
                filter: agg.filter.as_deref().map(|f| self.boxed(f)),
                default: agg.default.as_deref().map(|d| self.boxed(d)),
            }),
            Expression::SubqueryRef(query) => Expression::SubqueryRef(self.subquery(query)),
            Expression::PropertyRef { path, comparison } => Expression::PropertyRef {
                path: self.prefixed(path),
                comparison: comparison
                    .as_ref()
                    .map(|(op, value)| (*op, self.boxed(value))),
            },
            Expression::RelationAccess { .. } | Expression::Opaque(_) => {
                Expression::RelationAccess {
                    via: self.relation.to_string(),
                    rest: expr.clone().boxed(),
                }
            }
        }
    }

    fn subquery(&self, query: &Subquery) -> Subquery {
        let outer = OuterRewriter { inner: self };
        Subquery {
            model: query.model.clone(),
            filter: query.filter.as_deref().map(|f| outer.expr(f).boxed()),
            project: outer.expr(&query.project).boxed(),
            kind: query.kind,
        }
    }
}

/// Walks a subquery body, prefixing only its own outer references. Inner
/// field references stay scoped to the subquery's model; nested subqueries
/// keep their correlation untouched.
struct OuterRewriter<'r, 'a> {
    inner: &'r Rewriter<'a>,
}

impl OuterRewriter<'_, '_> {
    fn all(&self, exprs: &[Expression]) -> Vec<Expression> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn boxed(&self, expr: &Expression) -> Box<Expression> {
        self.expr(expr).boxed()
    }

    fn expr(&self, expr: &Expression) -> Expression {
        match expr {
            Expression::OuterRef { path } => Expression::OuterRef {
                path: self.inner.prefixed(path),
            },
            Expression::FieldRef { .. }
            | Expression::Literal { .. }
            | Expression::SubqueryRef(_)
            | Expression::Opaque(_) => expr.clone(),
            Expression::Collection { kind, items } => Expression::Collection {
                kind: *kind,
                items: self.all(items),
            },
            Expression::BinaryOp { op, lhs, rhs } => Expression::BinaryOp {
                op: *op,
                lhs: self.boxed(lhs),
                rhs: self.boxed(rhs),
            },
            Expression::CompareOp { op, lhs, rhs } => Expression::CompareOp {
                op: *op,
                lhs: self.boxed(lhs),
                rhs: self.boxed(rhs),
            },
            Expression::BoolTree { op, children } => Expression::BoolTree {
                op: *op,
                children: self.all(children),
            },
            Expression::Conditional { branches, default } => Expression::Conditional {
                branches: branches
                    .iter()
                    .map(|(when, then)| (self.expr(when), self.expr(then)))
                    .collect(),
                default: self.boxed(default),
            },
            Expression::Transform { kind, args } => Expression::Transform {
                kind: kind.clone(),
                args: self.all(args),
            },
            Expression::Aggregate(agg) => Expression::Aggregate(Aggregate {
                kind: agg.kind,
                source: agg.source.clone(),
                filter: agg.filter.as_deref().map(|f| self.boxed(f)),
                default: agg.default.as_deref().map(|d| self.boxed(d)),
            }),
            Expression::PropertyRef { path, comparison } => Expression::PropertyRef {
                path: path.clone(),
                comparison: comparison
                    .as_ref()
                    .map(|(op, value)| (*op, self.boxed(value))),
            },
            Expression::RelationAccess { via, rest } => Expression::RelationAccess {
                via: via.clone(),
                rest: self.boxed(rest),
            },
        }
    }
}

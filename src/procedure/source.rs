use super::node::{AggregateNode, LogicOp, Population, ProcNode, Stmt};
use super::Procedure;
use crate::expr::{CollectionKind, TransformKind};
use std::fmt::Write;

const INDENT: &str = "    ";

/// Deterministic pseudo-code for a procedure. Depends only on the body,
/// the name and the parameter names, never on capture ids.
pub(crate) fn render(proc: &Procedure) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "fn {}({}) {{", proc.name(), proc.params().join(", "));
    for cap in proc.capabilities() {
        let _ = writeln!(out, "{INDENT}use {};", cap.name());
    }
    render_block(&mut out, &proc.statements, 1);
    out.push('}');
    out
}

fn pad(depth: usize) -> String {
    INDENT.repeat(depth)
}

fn render_block(out: &mut String, stmts: &[Stmt], depth: usize) {
    for stmt in stmts {
        render_stmt(out, stmt, depth);
    }
}

fn render_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    match stmt {
        // imports are hoisted into the header
        Stmt::Import(_) => {}
        Stmt::Return(node) => {
            let _ = writeln!(out, "{}return {};", pad(depth), expr(node));
        }
        Stmt::If {
            cond,
            then,
            otherwise,
        } => {
            let _ = writeln!(out, "{}if {} {{", pad(depth), expr(cond));
            render_block(out, then, depth + 1);
            render_else(out, otherwise, depth);
            let _ = writeln!(out, "{}}}", pad(depth));
        }
    }
}

fn render_else(out: &mut String, otherwise: &[Stmt], depth: usize) {
    match otherwise {
        [] => {}
        [Stmt::If {
            cond,
            then,
            otherwise,
        }] => {
            let _ = writeln!(out, "{}}} else if {} {{", pad(depth), expr(cond));
            render_block(out, then, depth + 1);
            render_else(out, otherwise, depth);
        }
        stmts => {
            let _ = writeln!(out, "{}}} else {{", pad(depth));
            render_block(out, stmts, depth + 1);
        }
    }
}

fn needs_parens(node: &ProcNode) -> bool {
    matches!(
        node,
        ProcNode::Binary { .. }
            | ProcNode::Compare { .. }
            | ProcNode::Between { .. }
            | ProcNode::IsNull { .. }
            | ProcNode::Logic { .. }
            | ProcNode::Xor { .. }
            | ProcNode::IfElse { .. }
            | ProcNode::Coalesce(_)
    )
}

fn operand(node: &ProcNode) -> String {
    if needs_parens(node) {
        format!("({})", expr(node))
    } else {
        expr(node)
    }
}

fn list(nodes: &[ProcNode]) -> String {
    nodes.iter().map(expr).collect::<Vec<_>>().join(", ")
}

pub(crate) fn expr(node: &ProcNode) -> String {
    match node {
        ProcNode::Literal(v) => v.to_string(),
        ProcNode::SelfRef => "self".to_string(),
        ProcNode::Local(name) => name.clone(),
        ProcNode::Attr { base, name } => format!("{}.{name}", operand(base)),
        ProcNode::Collection { kind, items } => collection(*kind, items),
        ProcNode::Binary { op, lhs, rhs } => {
            format!("{} {} {}", operand(lhs), op.symbol(), operand(rhs))
        }
        ProcNode::Compare { op, lhs, rhs } if op.is_infix() => {
            format!("{} {} {}", operand(lhs), op.symbol(), operand(rhs))
        }
        ProcNode::Compare { op, lhs, rhs } => {
            format!("{}.{}({})", operand(lhs), op.symbol(), expr(rhs))
        }
        ProcNode::Between { lo, value, hi } => {
            format!("{} < {} < {}", operand(lo), operand(value), operand(hi))
        }
        ProcNode::IsNull { value, negated } => {
            let not = if *negated { "not " } else { "" };
            format!("{} is {not}null", operand(value))
        }
        ProcNode::Casefold(inner) => format!("{}.casefold()", operand(inner)),
        ProcNode::Logic { op, operands } => match operands.as_slice() {
            [] => "true".to_string(),
            [single] => format!("bool({})", expr(single)),
            many => {
                let sep = match op {
                    LogicOp::And => " && ",
                    LogicOp::Or => " || ",
                };
                many.iter().map(operand).collect::<Vec<_>>().join(sep)
            }
        },
        ProcNode::Xor { lhs, rhs } => format!("{} xor {}", operand(lhs), operand(rhs)),
        ProcNode::Not(inner) => format!("!{}", operand(inner)),
        ProcNode::IfElse {
            cond,
            then,
            otherwise,
        } => format!(
            "if {} {{ {} }} else {{ {} }}",
            expr(cond),
            expr(then),
            expr(otherwise)
        ),
        ProcNode::Coalesce(items) => items.iter().map(operand).collect::<Vec<_>>().join(" ?? "),
        ProcNode::Slice { base, start, end } => format!(
            "{}[{}..{}]",
            operand(base),
            start.as_deref().map(expr).unwrap_or_default(),
            end.as_deref().map(expr).unwrap_or_default()
        ),
        ProcNode::Call { func, args } => call(func, args),
        ProcNode::Now { utc: true } => "now_utc()".to_string(),
        ProcNode::Now { utc: false } => "now_local()".to_string(),
        ProcNode::CallCapture { param, args } => format!("{param}({})", list(args)),
        ProcNode::Aggregate(agg) => aggregate(agg),
        ProcNode::Scoped { via, body } => format!("{}.then(|self| {})", operand(via), expr(body)),
    }
}

fn collection(kind: CollectionKind, items: &[ProcNode]) -> String {
    match kind {
        CollectionKind::List => format!("[{}]", list(items)),
        CollectionKind::Set if items.is_empty() => "set()".to_string(),
        CollectionKind::Set => format!("{{{}}}", list(items)),
        CollectionKind::Tuple if items.len() == 1 => format!("({},)", expr(&items[0])),
        CollectionKind::Tuple => format!("({})", list(items)),
        CollectionKind::Mapping => {
            let pairs: Vec<String> = items
                .chunks(2)
                .map(|pair| match pair {
                    [k, v] => format!("{}: {}", expr(k), expr(v)),
                    [k] => format!("{}: null", expr(k)),
                    _ => String::new(),
                })
                .collect();
            format!("{{{}}}", pairs.join(", "))
        }
    }
}

fn call(func: &TransformKind, args: &[ProcNode]) -> String {
    format!("{func}({})", list(args))
}

fn aggregate(agg: &AggregateNode) -> String {
    let mut out = match &agg.population {
        Population::Related(node) => expr(node),
        Population::Objects(node) => format!("{}.objects()", operand(node)),
    };
    let b = &agg.binder;
    if let Some(filter) = &agg.filter {
        let _ = write!(out, ".filter(|{b}| {})", expr(filter));
    }
    if let Some(project) = &agg.project {
        let _ = write!(out, ".map(|{b}| {})", expr(project));
    }
    let _ = write!(out, ".{}(", agg.kind.name());
    if let Some(default) = &agg.default {
        let _ = write!(out, "default = {}", expr(default));
    }
    out.push(')');
    out
}

use crate::error::EvalError;
use crate::expr::CompareKind;
use crate::value::Value;
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Comparison primitives the compiler emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
    /// `lhs in rhs`
    In,
    /// `rhs in lhs`
    Contains,
    StartsWith,
    EndsWith,
    Matches { case_insensitive: bool },
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::In => "in",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Matches {
                case_insensitive: false,
            } => "matches",
            Self::Matches {
                case_insensitive: true,
            } => "imatches",
        }
    }

    /// Rendered as infix operator rather than method call.
    pub fn is_infix(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Gt | Self::Ge | Self::Lt | Self::Le | Self::In
        )
    }
}

/// Equality used by comparisons: null equals nothing.
#[inline]
pub fn eq(lhs: &Value, rhs: &Value) -> bool {
    !lhs.is_null() && !rhs.is_null() && lhs == rhs
}

pub fn casefold(v: &Value) -> Value {
    match v {
        Value::Str(s) => Value::Str(s.to_lowercase()),
        other => other.clone(),
    }
}

/// Strict `lo < value < hi`; false when any bound is null.
pub fn between(lo: &Value, value: &Value, hi: &Value) -> bool {
    matches!(lo.compare(value), Some(Ordering::Less))
        && matches!(value.compare(hi), Some(Ordering::Less))
}

pub fn apply(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool, EvalError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(false);
    }
    let ord = || lhs.compare(rhs);
    Ok(match op {
        CmpOp::Eq => eq(lhs, rhs),
        CmpOp::Gt => matches!(ord(), Some(Ordering::Greater)),
        CmpOp::Ge => matches!(ord(), Some(Ordering::Greater | Ordering::Equal)),
        CmpOp::Lt => matches!(ord(), Some(Ordering::Less)),
        CmpOp::Le => matches!(ord(), Some(Ordering::Less | Ordering::Equal)),
        CmpOp::In => membership(rhs, lhs, "in")?,
        CmpOp::Contains => membership(lhs, rhs, "contains")?,
        CmpOp::StartsWith => text_pair(lhs, rhs, "starts_with", |a, b| a.starts_with(b))?,
        CmpOp::EndsWith => text_pair(lhs, rhs, "ends_with", |a, b| a.ends_with(b))?,
        CmpOp::Matches { case_insensitive } => {
            let (Value::Str(text), Value::Str(pattern)) = (lhs, rhs) else {
                return Err(EvalError::TypeMismatch {
                    op: op.symbol().to_string(),
                    detail: format!("{} and {}", lhs.type_name(), rhs.type_name()),
                });
            };
            compiled_regex(pattern, case_insensitive)?.is_match(text)
        }
    })
}

/// Lookup semantics over evaluated operands, as a query engine applies
/// them. `exact`/`iexact` against null are null tests.
pub fn lookup(kind: CompareKind, lhs: &Value, rhs: &Value) -> Result<bool, EvalError> {
    use CompareKind as K;
    Ok(match kind {
        K::Exact | K::IExact if rhs.is_null() => lhs.is_null(),
        K::Exact => eq(lhs, rhs),
        K::IExact => eq(&casefold(lhs), &casefold(rhs)),
        K::Gt => apply(CmpOp::Gt, lhs, rhs)?,
        K::Gte => apply(CmpOp::Ge, lhs, rhs)?,
        K::Lt => apply(CmpOp::Lt, lhs, rhs)?,
        K::Lte => apply(CmpOp::Le, lhs, rhs)?,
        K::In => apply(CmpOp::In, lhs, rhs)?,
        K::Contains => apply(CmpOp::Contains, lhs, rhs)?,
        K::IContains => apply(CmpOp::Contains, &casefold(lhs), &casefold(rhs))?,
        K::StartsWith => apply(CmpOp::StartsWith, lhs, rhs)?,
        K::IStartsWith => apply(CmpOp::StartsWith, &casefold(lhs), &casefold(rhs))?,
        K::EndsWith => apply(CmpOp::EndsWith, lhs, rhs)?,
        K::IEndsWith => apply(CmpOp::EndsWith, &casefold(lhs), &casefold(rhs))?,
        K::Range => match rhs.items() {
            Some([lo, hi]) => between(lo, lhs, hi),
            _ => {
                return Err(EvalError::TypeMismatch {
                    op: "range".to_string(),
                    detail: format!("{} bounds", rhs.type_name()),
                })
            }
        },
        K::IsNull => lhs.is_null() == rhs.is_truthy(),
        K::Regex => apply(CmpOp::Matches { case_insensitive: false }, lhs, rhs)?,
        K::IRegex => apply(CmpOp::Matches { case_insensitive: true }, lhs, rhs)?,
    })
}

fn membership(haystack: &Value, needle: &Value, op: &str) -> Result<bool, EvalError> {
    match haystack {
        Value::List(items) | Value::Set(items) | Value::Tuple(items) => {
            Ok(items.iter().any(|item| eq(item, needle)))
        }
        Value::Str(s) => match needle {
            Value::Str(n) => Ok(s.contains(n.as_str())),
            other => Err(EvalError::TypeMismatch {
                op: op.to_string(),
                detail: format!("{} in str", other.type_name()),
            }),
        },
        Value::Map(m) => Ok(needle.as_str().is_some_and(|k| m.contains_key(k))),
        Value::Json(serde_json::Value::Array(items)) => {
            Ok(items.iter().any(|item| eq(&Value::from_json(item), needle)))
        }
        other => Err(EvalError::TypeMismatch {
            op: op.to_string(),
            detail: format!("{} container", other.type_name()),
        }),
    }
}

fn text_pair(
    lhs: &Value,
    rhs: &Value,
    op: &str,
    f: impl Fn(&str, &str) -> bool,
) -> Result<bool, EvalError> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Ok(f(a, b)),
        _ => Err(EvalError::TypeMismatch {
            op: op.to_string(),
            detail: format!("{} and {}", lhs.type_name(), rhs.type_name()),
        }),
    }
}

fn compiled_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, EvalError> {
    static CACHE: OnceLock<Mutex<HashMap<(String, bool), Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let key = (pattern.to_string(), case_insensitive);
    if let Some(re) = cache.lock().get(&key) {
        return Ok(re.clone());
    }
    let re = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|err| EvalError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })?;
    cache.lock().insert(key, re.clone());
    Ok(re)
}

//! Value kernels shared by compiled procedures and query-side evaluation.
//!
//! Extension path (minimal touch points):
//! 1) add the variant to `TransformKind` in `expr.rs`,
//! 2) register name/arity/capability in `catalog.rs`,
//! 3) implement the kernel in the matching file and dispatch it in `apply_transform`,
//! 4) add compile + parity tests.

use crate::error::EvalError;
use crate::expr::{CollectionKind, TransformKind};
use crate::value::Value;

pub mod aggregate;
pub mod arith;
pub mod catalog;
pub mod compare;

mod cast;
mod date;
mod hash;
mod math;
mod string;

pub use aggregate::aggregate;
pub use arith::binary;
pub use catalog::{Capability, TransformCatalog, TransformMeta};
pub use compare::{between, casefold, CmpOp};
pub use string::{concat_pair, plain_text, slice};

/// Evaluates a transform over already-evaluated arguments. `Coalesce` is
/// applied eagerly here; compiled procedures short-circuit it instead.
pub fn apply_transform(
    kind: &TransformKind,
    args: &[Value],
    use_tz: bool,
) -> Result<Value, EvalError> {
    use TransformKind as T;
    let arg = |idx: usize| args.get(idx).unwrap_or(&Value::Null);
    match kind {
        T::Coalesce => Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)),
        T::Greatest => extreme(args, true),
        T::Least => extreme(args, false),
        T::NullIf => Ok(if compare::eq(arg(0), arg(1)) {
            Value::Null
        } else {
            arg(0).clone()
        }),
        T::Concat => {
            let mut acc = Value::Str(String::new());
            for value in args.iter().rev() {
                acc = concat_pair(value, &acc)?;
            }
            Ok(acc)
        }
        T::Upper => string::upper(arg(0)),
        T::Lower => string::lower(arg(0)),
        T::Length => string::length(arg(0)),
        T::LPad => string::pad(arg(0), arg(1), args.get(2), true),
        T::RPad => string::pad(arg(0), arg(1), args.get(2), false),
        T::LTrim => string::trim(arg(0), true, false),
        T::RTrim => string::trim(arg(0), false, true),
        T::Trim => string::trim(arg(0), true, true),
        T::Left => string::left(arg(0), arg(1)),
        T::Right => string::right(arg(0), arg(1)),
        T::Repeat => string::repeat(arg(0), arg(1)),
        T::Replace => string::replace(arg(0), arg(1), args.get(2)),
        T::Reverse => string::reverse(arg(0)),
        T::StrIndex => string::strindex(arg(0), arg(1)),
        T::Substr => string::substr(arg(0), arg(1), args.get(2)),
        T::Ord => string::ord(arg(0)),
        T::Chr => string::chr(arg(0)),
        T::Md5 | T::Sha1 | T::Sha224 | T::Sha256 | T::Sha384 | T::Sha512 => {
            hash::digest(kind, arg(0))
        }
        T::JsonObject => json_object(args),
        T::Cast(target) => cast::cast(*target, arg(0)),
        T::Abs => math::abs(arg(0)),
        T::ACos => math::unary("acos", arg(0), |x| (-1.0..=1.0).contains(&x), f64::acos),
        T::ASin => math::unary("asin", arg(0), |x| (-1.0..=1.0).contains(&x), f64::asin),
        T::ATan => math::unary("atan", arg(0), |_| true, f64::atan),
        T::ATan2 => math::atan2(arg(0), arg(1)),
        T::Ceil => math::rounding(arg(0), f64::ceil),
        T::Floor => math::rounding(arg(0), f64::floor),
        T::Cos => math::unary("cos", arg(0), |_| true, f64::cos),
        T::Cot => math::cot(arg(0)),
        T::Degrees => math::unary("degrees", arg(0), |_| true, f64::to_degrees),
        T::Radians => math::unary("radians", arg(0), |_| true, f64::to_radians),
        T::Exp => math::unary("exp", arg(0), |_| true, f64::exp),
        T::Ln => math::unary("ln", arg(0), |x| x > 0.0, f64::ln),
        T::Log => math::log(arg(0), arg(1)),
        T::Mod => binary(crate::expr::BinaryOperator::Mod, arg(0), arg(1)),
        T::Power => binary(crate::expr::BinaryOperator::Pow, arg(0), arg(1)),
        T::Pi => Ok(Value::Float(std::f64::consts::PI)),
        T::Random => Ok(Value::Float(rand::random::<f64>())),
        T::Round => math::round(arg(0), args.get(1)),
        T::Sign => math::sign(arg(0)),
        T::Sin => math::unary("sin", arg(0), |_| true, f64::sin),
        T::Sqrt => math::unary("sqrt", arg(0), |x| x >= 0.0, f64::sqrt),
        T::Tan => math::unary("tan", arg(0), |_| true, f64::tan),
        T::Now => Ok(date::now(use_tz)),
        T::Trunc(unit) => date::trunc(*unit, arg(0)),
        T::Extract(part) => date::extract(*part, arg(0)),
        T::Vendor(name) => Err(EvalError::Fallback {
            reason: format!("vendor function `{name}` has no procedural kernel"),
        }),
    }
}

/// `greatest`/`least`: nulls are dropped, an all-null input yields null.
pub fn extreme(args: &[Value], greatest: bool) -> Result<Value, EvalError> {
    let candidates = Value::set(args.iter().filter(|v| !v.is_null()).cloned());
    let Value::Set(items) = candidates else {
        return Ok(Value::Null);
    };
    let mut best: Option<Value> = None;
    for item in items {
        best = Some(match best {
            None => item,
            Some(current) => {
                let ord = item.compare(&current).ok_or_else(|| EvalError::TypeMismatch {
                    op: if greatest { "greatest" } else { "least" }.to_string(),
                    detail: format!("{} and {}", item.type_name(), current.type_name()),
                })?;
                let replace = if greatest { ord.is_gt() } else { ord.is_lt() };
                if replace {
                    item
                } else {
                    current
                }
            }
        });
    }
    Ok(best.unwrap_or(Value::Null))
}

/// Builds a collection literal. Mapping items are interleaved keys and
/// values; keys must be strings.
pub fn collection(kind: CollectionKind, values: Vec<Value>) -> Result<Value, EvalError> {
    Ok(match kind {
        CollectionKind::List => Value::List(values),
        CollectionKind::Set => Value::set(values),
        CollectionKind::Tuple => Value::Tuple(values),
        CollectionKind::Mapping => {
            let mut out = indexmap::IndexMap::with_capacity(values.len() / 2);
            let mut iter = values.into_iter();
            while let Some(key) = iter.next() {
                let Value::Str(key) = key else {
                    return Err(EvalError::TypeMismatch {
                        op: "mapping".to_string(),
                        detail: format!("{} key", key.type_name()),
                    });
                };
                out.insert(key, iter.next().unwrap_or(Value::Null));
            }
            Value::Map(out)
        }
    })
}

fn json_object(args: &[Value]) -> Result<Value, EvalError> {
    let mut out = indexmap::IndexMap::with_capacity(args.len() / 2);
    for pair in args.chunks(2) {
        let key = pair[0].as_str().ok_or_else(|| EvalError::TypeMismatch {
            op: "json_object".to_string(),
            detail: format!("{} key", pair[0].type_name()),
        })?;
        out.insert(key.to_string(), pair.get(1).cloned().unwrap_or(Value::Null));
    }
    Ok(Value::Map(out))
}

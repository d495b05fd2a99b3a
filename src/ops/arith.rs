use crate::error::EvalError;
use crate::expr::BinaryOperator;
use crate::value::Value;
use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use chrono::TimeDelta;

#[derive(Debug, Clone)]
enum Num {
    Int(i64),
    Float(f64),
    Dec(BigDecimal),
}

/// Promotes a numeric pair to a common representation. Bools count as ints.
fn promote(lhs: &Value, rhs: &Value) -> Option<(Num, Num)> {
    fn one(v: &Value) -> Option<Num> {
        match v {
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Float(f) => Some(Num::Float(*f)),
            Value::Decimal(d) => Some(Num::Dec(d.clone())),
            _ => None,
        }
    }
    let (a, b) = (one(lhs)?, one(rhs)?);
    Some(match (a, b) {
        (Num::Float(x), other) | (other, Num::Float(x)) if !matches!(other, Num::Float(_)) => {
            let y = match other {
                Num::Int(i) => i as f64,
                Num::Dec(d) => d.to_f64()?,
                Num::Float(f) => f,
            };
            if matches!(lhs, Value::Float(_)) {
                (Num::Float(x), Num::Float(y))
            } else {
                (Num::Float(y), Num::Float(x))
            }
        }
        (Num::Dec(x), Num::Int(i)) => (Num::Dec(x), Num::Dec(BigDecimal::from(i))),
        (Num::Int(i), Num::Dec(y)) => (Num::Dec(BigDecimal::from(i)), Num::Dec(y)),
        pair => pair,
    })
}

fn mismatch(op: BinaryOperator, lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.symbol().to_string(),
        detail: format!("{} and {}", lhs.type_name(), rhs.type_name()),
    }
}

pub(crate) fn overflow(op: BinaryOperator) -> EvalError {
    EvalError::TypeMismatch {
        op: op.symbol().to_string(),
        detail: "integer overflow".to_string(),
    }
}

/// Arithmetic and bitwise operators. Null on either side yields null.
pub fn binary(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    use BinaryOperator as B;
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    if let Some(v) = temporal(op, lhs, rhs)? {
        return Ok(v);
    }
    match (op, lhs, rhs) {
        (B::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{a}{b}"))),
        (B::Add, Value::List(a), Value::List(b)) => {
            return Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
        }
        (B::Mul, Value::Str(s), Value::Int(n)) | (B::Mul, Value::Int(n), Value::Str(s)) => {
            return Ok(Value::Str(s.repeat((*n).max(0) as usize)))
        }
        _ => {}
    }
    if matches!(op, B::BitAnd | B::BitOr | B::BitXor | B::LShift | B::RShift) {
        return bitwise(op, lhs, rhs);
    }
    let (a, b) = promote(lhs, rhs).ok_or_else(|| mismatch(op, lhs, rhs))?;
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_op(op, x, y),
        (Num::Float(x), Num::Float(y)) => float_op(op, x, y),
        (Num::Dec(x), Num::Dec(y)) => dec_op(op, x, y),
        _ => Err(mismatch(op, lhs, rhs)),
    }
}

fn int_op(op: BinaryOperator, x: i64, y: i64) -> Result<Value, EvalError> {
    use BinaryOperator as B;
    Ok(match op {
        B::Add => Value::Int(x.checked_add(y).ok_or_else(|| overflow(op))?),
        B::Sub => Value::Int(x.checked_sub(y).ok_or_else(|| overflow(op))?),
        B::Mul => Value::Int(x.checked_mul(y).ok_or_else(|| overflow(op))?),
        B::Div => {
            if y == 0 {
                return Err(EvalError::DivisionByZero);
            }
            Value::Float(x as f64 / y as f64)
        }
        B::Mod => {
            if y == 0 {
                return Err(EvalError::DivisionByZero);
            }
            Value::Int(x.checked_rem(y).ok_or_else(|| overflow(op))?)
        }
        B::Pow => match u32::try_from(y) {
            Ok(exp) => Value::Int(x.checked_pow(exp).ok_or_else(|| overflow(op))?),
            Err(_) => Value::Float((x as f64).powf(y as f64)),
        },
        _ => return Err(overflow(op)),
    })
}

fn float_op(op: BinaryOperator, x: f64, y: f64) -> Result<Value, EvalError> {
    use BinaryOperator as B;
    Ok(Value::Float(match op {
        B::Add => x + y,
        B::Sub => x - y,
        B::Mul => x * y,
        B::Div | B::Mod if y == 0.0 => return Err(EvalError::DivisionByZero),
        B::Div => x / y,
        B::Mod => x % y,
        B::Pow => x.powf(y),
        _ => {
            return Err(EvalError::TypeMismatch {
                op: op.symbol().to_string(),
                detail: "float operands".to_string(),
            })
        }
    }))
}

fn dec_op(op: BinaryOperator, x: BigDecimal, y: BigDecimal) -> Result<Value, EvalError> {
    use BinaryOperator as B;
    Ok(match op {
        B::Add => Value::Decimal(x + y),
        B::Sub => Value::Decimal(x - y),
        B::Mul => Value::Decimal(x * y),
        B::Div | B::Mod if y.is_zero() => return Err(EvalError::DivisionByZero),
        B::Div => Value::Decimal(x / y),
        B::Mod => Value::Decimal(x % y),
        B::Pow => {
            let (Some(base), Some(exp)) = (x.to_f64(), y.to_f64()) else {
                return Err(EvalError::Domain { op: "pow" });
            };
            Value::Float(base.powf(exp))
        }
        _ => {
            return Err(EvalError::TypeMismatch {
                op: op.symbol().to_string(),
                detail: "decimal operands".to_string(),
            })
        }
    })
}

fn bitwise(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    use BinaryOperator as B;
    let (Value::Int(x), Value::Int(y)) = (lhs, rhs) else {
        return Err(mismatch(op, lhs, rhs));
    };
    let shift = || u32::try_from(*y).map_err(|_| overflow(op));
    Ok(Value::Int(match op {
        B::BitAnd => x & y,
        B::BitOr => x | y,
        B::BitXor => x ^ y,
        B::LShift => x.checked_shl(shift()?).ok_or_else(|| overflow(op))?,
        B::RShift => x.checked_shr(shift()?).ok_or_else(|| overflow(op))?,
        _ => return Err(mismatch(op, lhs, rhs)),
    }))
}

/// Date, datetime and duration arithmetic. `None` when the pair is not temporal.
fn temporal(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Option<Value>, EvalError> {
    use BinaryOperator as B;
    let out_of_range = || EvalError::Domain { op: "date arithmetic" };
    Ok(Some(match (op, lhs, rhs) {
        (B::Add, Value::Date(d), Value::Duration(t))
        | (B::Add, Value::Duration(t), Value::Date(d)) => {
            Value::Date(d.checked_add_signed(*t).ok_or_else(out_of_range)?)
        }
        (B::Sub, Value::Date(d), Value::Duration(t)) => {
            Value::Date(d.checked_sub_signed(*t).ok_or_else(out_of_range)?)
        }
        (B::Add, Value::DateTime(d), Value::Duration(t))
        | (B::Add, Value::Duration(t), Value::DateTime(d)) => {
            Value::DateTime(d.checked_add_signed(*t).ok_or_else(out_of_range)?)
        }
        (B::Sub, Value::DateTime(d), Value::Duration(t)) => {
            Value::DateTime(d.checked_sub_signed(*t).ok_or_else(out_of_range)?)
        }
        (B::Sub, Value::DateTime(a), Value::DateTime(b)) => Value::Duration(*a - *b),
        (B::Sub, Value::Date(a), Value::Date(b)) => Value::Duration(a.signed_duration_since(*b)),
        (B::Add, Value::Duration(a), Value::Duration(b)) => {
            Value::Duration(a.checked_add(b).ok_or_else(out_of_range)?)
        }
        (B::Sub, Value::Duration(a), Value::Duration(b)) => {
            Value::Duration(a.checked_sub(b).ok_or_else(out_of_range)?)
        }
        (B::Mul, Value::Duration(t), Value::Int(n))
        | (B::Mul, Value::Int(n), Value::Duration(t)) => {
            let factor = i32::try_from(*n).map_err(|_| out_of_range())?;
            Value::Duration(t.checked_mul(factor).ok_or_else(out_of_range)?)
        }
        (B::Div, Value::Duration(t), Value::Int(n)) => {
            if *n == 0 {
                return Err(EvalError::DivisionByZero);
            }
            let divisor = i32::try_from(*n).map_err(|_| out_of_range())?;
            Value::Duration(t.checked_div(divisor).unwrap_or(TimeDelta::zero()))
        }
        _ => return Ok(None),
    }))
}

use crate::error::EvalError;
use crate::value::Value;
use bigdecimal::{BigDecimal, Zero};

fn number(op: &'static str, v: &Value) -> Result<f64, EvalError> {
    v.as_f64().ok_or_else(|| EvalError::TypeMismatch {
        op: op.to_string(),
        detail: v.type_name().to_string(),
    })
}

pub fn unary(
    op: &'static str,
    v: &Value,
    domain: impl Fn(f64) -> bool,
    f: fn(f64) -> f64,
) -> Result<Value, EvalError> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let x = number(op, v)?;
    if !domain(x) {
        return Err(EvalError::Domain { op });
    }
    Ok(Value::Float(f(x)))
}

pub fn abs(v: &Value) -> Result<Value, EvalError> {
    Ok(match v {
        Value::Null => Value::Null,
        Value::Int(i) => Value::Int(i.checked_abs().ok_or(EvalError::Domain { op: "abs" })?),
        Value::Decimal(d) => Value::Decimal(d.abs()),
        other => Value::Float(number("abs", other)?.abs()),
    })
}

/// `ceil`/`floor`: integers pass through, everything else rounds as float.
pub fn rounding(v: &Value, f: fn(f64) -> f64) -> Result<Value, EvalError> {
    Ok(match v {
        Value::Null => Value::Null,
        Value::Int(i) => Value::Int(*i),
        other => Value::Float(f(number("round", other)?)),
    })
}

pub fn atan2(y: &Value, x: &Value) -> Result<Value, EvalError> {
    if y.is_null() || x.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Float(number("atan2", y)?.atan2(number("atan2", x)?)))
}

pub fn cot(v: &Value) -> Result<Value, EvalError> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let t = number("cot", v)?.tan();
    if t == 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    Ok(Value::Float(1.0 / t))
}

/// `log(base, x)`.
pub fn log(base: &Value, x: &Value) -> Result<Value, EvalError> {
    if base.is_null() || x.is_null() {
        return Ok(Value::Null);
    }
    let (b, x) = (number("log", base)?, number("log", x)?);
    if b <= 0.0 || b == 1.0 || x <= 0.0 {
        return Err(EvalError::Domain { op: "log" });
    }
    Ok(Value::Float(x.ln() / b.ln()))
}

/// Half away from zero, to `places` decimal places (default 0).
pub fn round(v: &Value, places: Option<&Value>) -> Result<Value, EvalError> {
    let places = match places {
        None => 0,
        Some(Value::Null) => return Ok(Value::Null),
        Some(p) => p.as_i64().ok_or_else(|| EvalError::TypeMismatch {
            op: "round".to_string(),
            detail: format!("{} places", p.type_name()),
        })?,
    };
    Ok(match v {
        Value::Null => Value::Null,
        Value::Int(i) if places >= 0 => Value::Int(*i),
        Value::Decimal(d) => Value::Decimal(round_decimal(d, places)),
        other => {
            let x = number("round", other)?;
            let places = i32::try_from(places).map_err(|_| EvalError::Domain { op: "round" })?;
            let scale = 10f64.powi(places);
            Value::Float((x * scale).round() / scale)
        }
    })
}

fn round_decimal(d: &BigDecimal, places: i64) -> BigDecimal {
    d.with_scale_round(places, bigdecimal::RoundingMode::HalfUp)
}

pub fn sign(v: &Value) -> Result<Value, EvalError> {
    Ok(match v {
        Value::Null => Value::Null,
        Value::Int(i) => Value::Int(i.signum()),
        Value::Decimal(d) => Value::Int(match d.cmp(&BigDecimal::zero()) {
            std::cmp::Ordering::Greater => 1,
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
        }),
        other => {
            let x = number("sign", other)?;
            Value::Int(if x > 0.0 {
                1
            } else if x < 0.0 {
                -1
            } else {
                0
            })
        }
    })
}

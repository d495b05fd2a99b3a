use crate::error::EvalError;
use crate::expr::CastTarget;
use crate::value::Value;
use bigdecimal::{BigDecimal, ToPrimitive};
use std::str::FromStr;
use uuid::Uuid;

use super::plain_text;

pub fn cast(target: CastTarget, v: &Value) -> Result<Value, EvalError> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let invalid = || EvalError::InvalidCast {
        target: target.name(),
        value: v.to_string(),
    };
    Ok(match target {
        CastTarget::Str => Value::Str(plain_text(v)),
        CastTarget::Int => Value::Int(match v {
            Value::Int(i) => *i,
            Value::Bool(b) => i64::from(*b),
            Value::Float(f) if f.is_finite() => f.trunc() as i64,
            Value::Decimal(d) => d.with_scale(0).to_i64().ok_or_else(invalid)?,
            Value::Str(s) => s.trim().parse::<i64>().map_err(|_| invalid())?,
            _ => return Err(invalid()),
        }),
        CastTarget::Float => Value::Float(match v {
            Value::Str(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
            other => other.as_f64().ok_or_else(invalid)?,
        }),
        CastTarget::Decimal => Value::Decimal(match v {
            Value::Decimal(d) => d.clone(),
            Value::Int(i) => BigDecimal::from(*i),
            Value::Float(f) => BigDecimal::try_from(*f).map_err(|_| invalid())?,
            Value::Str(s) => BigDecimal::from_str(s.trim()).map_err(|_| invalid())?,
            _ => return Err(invalid()),
        }),
        CastTarget::Bool => Value::Bool(match v {
            Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" | "yes" | "y" => true,
                "false" | "f" | "0" | "no" | "n" => false,
                _ => return Err(invalid()),
            },
            other => other.is_truthy(),
        }),
        CastTarget::Uuid => Value::Uuid(match v {
            Value::Uuid(u) => *u,
            Value::Str(s) => Uuid::parse_str(s.trim()).map_err(|_| invalid())?,
            _ => return Err(invalid()),
        }),
        CastTarget::Json => Value::Json(v.to_json().ok_or_else(invalid)?),
    })
}

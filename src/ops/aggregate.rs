use crate::error::EvalError;
use crate::expr::{AggregateKind, BinaryOperator};
use crate::value::Value;

use super::arith::binary;

/// Folds an aggregate over the projected population. Nulls are skipped;
/// `count` of nothing is 0, every other kind falls back to `default`.
pub fn aggregate(
    kind: AggregateKind,
    values: Vec<Value>,
    default: Option<Value>,
) -> Result<Value, EvalError> {
    let values: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    if kind == AggregateKind::Count {
        return Ok(Value::Int(values.len() as i64));
    }
    if values.is_empty() {
        return Ok(default.unwrap_or(Value::Null));
    }
    match kind {
        AggregateKind::Count => Ok(Value::Int(values.len() as i64)),
        AggregateKind::Sum => sum(values),
        AggregateKind::Min => extreme(values, false),
        AggregateKind::Max => extreme(values, true),
        AggregateKind::Avg => Ok(Value::Float(mean(&floats(kind, &values)?))),
        AggregateKind::Variance => Ok(Value::Float(variance(&floats(kind, &values)?))),
        AggregateKind::StdDev => Ok(Value::Float(variance(&floats(kind, &values)?).sqrt())),
    }
}

fn sum(values: Vec<Value>) -> Result<Value, EvalError> {
    let mut iter = values.into_iter();
    let first = iter.next().unwrap_or(Value::Int(0));
    iter.try_fold(first, |acc, v| binary(BinaryOperator::Add, &acc, &v))
}

fn extreme(values: Vec<Value>, max: bool) -> Result<Value, EvalError> {
    let mut iter = values.into_iter();
    let mut best = iter.next().unwrap_or(Value::Null);
    for v in iter {
        let ord = v.compare(&best).ok_or_else(|| EvalError::TypeMismatch {
            op: if max { "max" } else { "min" }.to_string(),
            detail: format!("{} and {}", v.type_name(), best.type_name()),
        })?;
        if (max && ord.is_gt()) || (!max && ord.is_lt()) {
            best = v;
        }
    }
    Ok(best)
}

fn floats(kind: AggregateKind, values: &[Value]) -> Result<Vec<f64>, EvalError> {
    values
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| EvalError::TypeMismatch {
                op: kind.name().to_string(),
                detail: v.type_name().to_string(),
            })
        })
        .collect()
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population variance.
fn variance(xs: &[f64]) -> f64 {
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64
}

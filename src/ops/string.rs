use super::arith::overflow;
use crate::error::EvalError;
use crate::expr::BinaryOperator;
use crate::value::Value;

fn expect_str<'a>(op: &str, v: &'a Value) -> Result<&'a str, EvalError> {
    v.as_str().ok_or_else(|| EvalError::TypeMismatch {
        op: op.to_string(),
        detail: v.type_name().to_string(),
    })
}

fn expect_int(op: &str, v: &Value) -> Result<i64, EvalError> {
    v.as_i64().ok_or_else(|| EvalError::TypeMismatch {
        op: op.to_string(),
        detail: format!("{} count", v.type_name()),
    })
}

macro_rules! null_in_null_out {
    ($($v:expr),+) => {
        if $($v.is_null())||+ {
            return Ok(Value::Null);
        }
    };
}

/// Text form of a value inside string concatenation and `cast(str)`.
pub fn plain_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Str(s) => s.clone(),
        Value::DateTime(d) => d.to_rfc3339(),
        Value::Json(j) => j.to_string(),
        other => other.to_string(),
    }
}

/// One `concat` step. Null is treated as the empty string.
pub fn concat_pair(lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    let mut out = plain_text(lhs);
    out.push_str(&plain_text(rhs));
    Ok(Value::Str(out))
}

pub fn upper(v: &Value) -> Result<Value, EvalError> {
    null_in_null_out!(v);
    Ok(Value::Str(expect_str("upper", v)?.to_uppercase()))
}

pub fn lower(v: &Value) -> Result<Value, EvalError> {
    null_in_null_out!(v);
    Ok(Value::Str(expect_str("lower", v)?.to_lowercase()))
}

pub fn length(v: &Value) -> Result<Value, EvalError> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        other => match other.items() {
            Some(items) => Ok(Value::Int(items.len() as i64)),
            None => Err(EvalError::TypeMismatch {
                op: "length".to_string(),
                detail: other.type_name().to_string(),
            }),
        },
    }
}

/// `lpad`/`rpad` to exactly `len` chars: longer input is cut, shorter input
/// is padded by cycling `fill` (a single space by default).
pub fn pad(v: &Value, len: &Value, fill: Option<&Value>, left: bool) -> Result<Value, EvalError> {
    null_in_null_out!(v, len);
    let op = if left { "lpad" } else { "rpad" };
    let s: Vec<char> = expect_str(op, v)?.chars().collect();
    let target = expect_int(op, len)?.max(0) as usize;
    let fill: Vec<char> = match fill {
        Some(Value::Null) => return Ok(Value::Null),
        Some(f) => expect_str(op, f)?.chars().collect(),
        None => vec![' '],
    };
    if s.len() >= target {
        return Ok(Value::Str(s[..target].iter().collect()));
    }
    if fill.is_empty() {
        return Ok(Value::Str(s.iter().collect()));
    }
    let padding: String = fill.iter().cycle().take(target - s.len()).collect();
    let body: String = s.iter().collect();
    Ok(Value::Str(if left {
        format!("{padding}{body}")
    } else {
        format!("{body}{padding}")
    }))
}

pub fn trim(v: &Value, start: bool, end: bool) -> Result<Value, EvalError> {
    null_in_null_out!(v);
    let s = expect_str("trim", v)?;
    let out = match (start, end) {
        (true, true) => s.trim(),
        (true, false) => s.trim_start(),
        (false, true) => s.trim_end(),
        (false, false) => s,
    };
    Ok(Value::Str(out.to_string()))
}

pub fn left(v: &Value, n: &Value) -> Result<Value, EvalError> {
    null_in_null_out!(v, n);
    let n = expect_int("left", n)?;
    slice(v, None, Some(n))
}

pub fn right(v: &Value, n: &Value) -> Result<Value, EvalError> {
    null_in_null_out!(v, n);
    let s = expect_str("right", v)?;
    let n = expect_int("right", n)?.max(0) as usize;
    let count = s.chars().count();
    Ok(Value::Str(s.chars().skip(count.saturating_sub(n)).collect()))
}

pub fn repeat(v: &Value, n: &Value) -> Result<Value, EvalError> {
    null_in_null_out!(v, n);
    let n = expect_int("repeat", n)?.max(0) as usize;
    Ok(Value::Str(expect_str("repeat", v)?.repeat(n)))
}

pub fn replace(v: &Value, from: &Value, to: Option<&Value>) -> Result<Value, EvalError> {
    null_in_null_out!(v, from);
    let to = match to {
        Some(Value::Null) => return Ok(Value::Null),
        Some(t) => expect_str("replace", t)?,
        None => "",
    };
    Ok(Value::Str(
        expect_str("replace", v)?.replace(expect_str("replace", from)?, to),
    ))
}

pub fn reverse(v: &Value) -> Result<Value, EvalError> {
    null_in_null_out!(v);
    Ok(Value::Str(expect_str("reverse", v)?.chars().rev().collect()))
}

/// 1-based char position of `needle`, 0 when absent.
pub fn strindex(v: &Value, needle: &Value) -> Result<Value, EvalError> {
    null_in_null_out!(v, needle);
    let s = expect_str("strindex", v)?;
    let n = expect_str("strindex", needle)?;
    Ok(Value::Int(match s.find(n) {
        Some(byte_idx) => s[..byte_idx].chars().count() as i64 + 1,
        None => 0,
    }))
}

/// `substr(base, start, len?)`: chars `[start-1, start-1+len)`.
pub fn substr(v: &Value, start: &Value, len: Option<&Value>) -> Result<Value, EvalError> {
    null_in_null_out!(v, start);
    let from = expect_int("substr", start)?
        .checked_sub(1)
        .ok_or_else(|| overflow(BinaryOperator::Sub))?;
    let to = match len {
        Some(Value::Null) => return Ok(Value::Null),
        Some(l) => Some(
            from.checked_add(expect_int("substr", l)?)
                .ok_or_else(|| overflow(BinaryOperator::Add))?,
        ),
        None => None,
    };
    slice(v, Some(from), to)
}

/// Half-open slice over chars (or items) with negative indices counted from
/// the end.
pub fn slice(v: &Value, start: Option<i64>, end: Option<i64>) -> Result<Value, EvalError> {
    fn bounds(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
        let len = len as i64;
        let norm = |idx: i64| if idx < 0 { (len + idx).max(0) } else { idx.min(len) };
        let s = start.map_or(0, norm);
        let e = end.map_or(len, norm);
        (s as usize, e.max(s) as usize)
    }
    match v {
        Value::Null => Ok(Value::Null),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (a, b) = bounds(chars.len(), start, end);
            Ok(Value::Str(chars[a..b].iter().collect()))
        }
        Value::List(items) | Value::Tuple(items) => {
            let (a, b) = bounds(items.len(), start, end);
            Ok(Value::List(items[a..b].to_vec()))
        }
        other => Err(EvalError::TypeMismatch {
            op: "slice".to_string(),
            detail: other.type_name().to_string(),
        }),
    }
}

pub fn ord(v: &Value) -> Result<Value, EvalError> {
    null_in_null_out!(v);
    match expect_str("ord", v)?.chars().next() {
        Some(c) => Ok(Value::Int(i64::from(u32::from(c)))),
        None => Err(EvalError::TypeMismatch {
            op: "ord".to_string(),
            detail: "empty str".to_string(),
        }),
    }
}

pub fn chr(v: &Value) -> Result<Value, EvalError> {
    null_in_null_out!(v);
    let code = expect_int("chr", v)?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::Str(c.to_string()))
        .ok_or(EvalError::Domain { op: "chr" })
}

use crate::error::EvalError;
use crate::expr::TransformKind;
use crate::value::Value;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

fn hex_digest<D: Digest>(bytes: &[u8]) -> String {
    D::digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
}

/// Lower-case hex digest of the UTF-8 bytes of a string.
pub fn digest(kind: &TransformKind, v: &Value) -> Result<Value, EvalError> {
    let text = match v {
        Value::Null => return Ok(Value::Null),
        Value::Str(s) => s.as_bytes(),
        other => {
            return Err(EvalError::TypeMismatch {
                op: kind.to_string(),
                detail: other.type_name().to_string(),
            })
        }
    };
    let hex = match kind {
        TransformKind::Md5 => hex_digest::<Md5>(text),
        TransformKind::Sha1 => hex_digest::<Sha1>(text),
        TransformKind::Sha224 => hex_digest::<Sha224>(text),
        TransformKind::Sha256 => hex_digest::<Sha256>(text),
        TransformKind::Sha384 => hex_digest::<Sha384>(text),
        TransformKind::Sha512 => hex_digest::<Sha512>(text),
        other => {
            return Err(EvalError::TypeMismatch {
                op: other.to_string(),
                detail: "not a hash function".to_string(),
            })
        }
    };
    Ok(Value::Str(hex))
}

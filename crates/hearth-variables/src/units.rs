//! Measurement-unit propagation through arithmetic

use crate::error::{EvalError, EvalResult};

/// Unit of an addition or subtraction result
///
/// Both operand units must be equal or one empty; the result is the
/// non-empty one. Two different non-empty units cannot be combined.
pub fn combine_additive(op: &'static str, left: &str, right: &str) -> EvalResult<String> {
    match (left.is_empty(), right.is_empty()) {
        (true, _) => Ok(right.to_string()),
        (_, true) => Ok(left.to_string()),
        _ if left == right => Ok(left.to_string()),
        _ => Err(EvalError::UnitMismatch {
            op,
            left: left.to_string(),
            right: right.to_string(),
        }),
    }
}

/// Unit of a multiplication result: `U1*U2`, empty operands contribute
/// nothing
pub fn combine_multiply(left: &str, right: &str) -> String {
    match (left.is_empty(), right.is_empty()) {
        (true, true) => String::new(),
        (true, false) => right.to_string(),
        (false, true) => left.to_string(),
        (false, false) => format!("{}*{}", left, right),
    }
}

/// Unit of a division result: `U1/U2`, with a unitless numerator over a unit
/// denominator yielding `1/U2`
pub fn combine_divide(left: &str, right: &str) -> String {
    match (left.is_empty(), right.is_empty()) {
        (true, true) => String::new(),
        (false, true) => left.to_string(),
        (true, false) => format!("1/{}", right),
        (false, false) => format!("{}/{}", left, right),
    }
}

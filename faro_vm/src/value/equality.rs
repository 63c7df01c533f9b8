//! Equality contracts: `==` (abstract), `===` (strict), and SameValueZero.

use super::conversion::{to_number, to_primitive};
use super::{PrimitiveHint, Value};
use crate::execution::{Agent, JsResult};

/// `===`. NaN is never equal to itself; `+0 === -0`.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => true,
        (Value::Null, Value::Null) => true,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x.as_str() == y.as_str(),
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::BigInt(x), Value::BigInt(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x == y,
        _ => false,
    }
}

/// SameValueZero: like `===` except `NaN` is equal to itself (and `+0`
/// remains equal to `-0`, same as `===`). Used by `Map`/`Set` key identity
/// and `Array.prototype.includes`.
pub fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => strict_equals(a, b),
    }
}

/// SameValue: like SameValueZero except `+0` and `-0` are distinguished.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x.is_nan() && y.is_nan() {
                true
            } else {
                x == y && x.is_sign_negative() == y.is_sign_negative()
            }
        }
        _ => strict_equals(a, b),
    }
}

/// `==`. May invoke user code when coercing an object operand.
pub fn abstract_equals(agent: &mut Agent, a: &Value, b: &Value) -> JsResult<bool> {
    use Value::*;
    match (a, b) {
        (Undefined | Null, Undefined | Null) => Ok(true),
        (Number(_), Number(_))
        | (String(_), String(_))
        | (Boolean(_), Boolean(_))
        | (Symbol(_), Symbol(_))
        | (BigInt(_), BigInt(_))
        | (Object(_), Object(_)) => Ok(strict_equals(a, b)),

        (Number(x), String(s)) | (String(s), Number(x)) => {
            let y = super::conversion::to_number(agent, &String(s.clone()))?;
            let _ = y; // string_to_number already embedded in to_number
            Ok(*x == string_to_num(s.as_str()))
        }
        (BigInt(x), String(s)) | (String(s), BigInt(x)) => {
            Ok(num_bigint::BigInt::parse_bytes(s.as_str().trim().as_bytes(), 10)
                .map(|parsed| parsed == *x.0)
                .unwrap_or(false))
        }
        (Boolean(_), _) => {
            let numeric = Number(if a.to_boolean() { 1.0 } else { 0.0 });
            abstract_equals(agent, &numeric, b)
        }
        (_, Boolean(_)) => {
            let numeric = Number(if b.to_boolean() { 1.0 } else { 0.0 });
            abstract_equals(agent, a, &numeric)
        }
        (Number(x), BigInt(y)) | (BigInt(y), Number(x)) => {
            if !x.is_finite() {
                return Ok(false);
            }
            Ok(num_bigint::BigInt::from(*x as i64) == *y.0 && x.fract() == 0.0)
        }
        (Object(_), Number(_) | String(_) | BigInt(_) | Symbol(_)) => {
            let prim = to_primitive(agent, a, PrimitiveHint::Default)?;
            abstract_equals(agent, &prim, b)
        }
        (Number(_) | String(_) | BigInt(_) | Symbol(_), Object(_)) => {
            let prim = to_primitive(agent, b, PrimitiveHint::Default)?;
            abstract_equals(agent, a, &prim)
        }
        _ => Ok(false),
    }
}

fn string_to_num(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        0.0
    } else {
        fast_float::parse(trimmed).unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nan_is_never_strict_equal() {
        assert!(!strict_equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }

    #[test]
    fn same_value_zero_treats_nan_as_equal() {
        assert!(same_value_zero(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }

    #[test]
    fn same_value_zero_treats_signed_zeros_as_equal() {
        assert!(same_value_zero(&Value::Number(0.0), &Value::Number(-0.0)));
    }

    #[test]
    fn same_value_distinguishes_signed_zeros() {
        assert!(!same_value(&Value::Number(0.0), &Value::Number(-0.0)));
    }
}

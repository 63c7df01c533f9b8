//! Abstract operations that may invoke user code: `to_primitive`,
//! `to_string`, `to_number` (on objects), `to_property_key`, `to_object`.
//!
//! These take `&mut Agent` because stringifying/primitive-converting an
//! object can call its `valueOf`/`toString`/`@@toPrimitive` methods, which
//! re-enters the VM's call protocol.

use super::number::double_to_string;
use super::{JsString, PrimitiveHint, PropertyKey, Value};
use crate::atom::WellKnownSymbol;
use crate::execution::{Agent, JsError, JsResult};

/// `ToPrimitive(input, hint)`. Prefers `@@toPrimitive` when present;
/// otherwise falls back to `ordinary_to_primitive`. Guarded against
/// reentrancy per §4.2: the guard lives on `Agent` because a single
/// conversion chain must not recurse into itself through a pathological
/// `valueOf` that returns `this`.
pub fn to_primitive(agent: &mut Agent, value: &Value, hint: PrimitiveHint) -> JsResult<Value> {
    let Value::Object(obj_id) = value else {
        return Ok(value.clone());
    };

    let exotic_atom = agent.atoms.well_known(WellKnownSymbol::ToPrimitive);
    let exotic_key = PropertyKey::Atom(exotic_atom);
    let method = agent.get_property(*obj_id, exotic_key)?;

    if let Value::Object(_) = &method {
        if agent.is_callable(&method) {
            let hint_str = match hint {
                PrimitiveHint::Default => "default",
                PrimitiveHint::Number => "number",
                PrimitiveHint::String => "string",
            };
            let hint_value = Value::String(JsString::from(hint_str));
            let result = agent.call(method, value.clone(), &[hint_value])?;
            if result.is_object() {
                return Err(agent.type_error("Cannot convert object to primitive value"));
            }
            return Ok(result);
        }
    }

    ordinary_to_primitive(agent, *obj_id, hint)
}

/// Calls `valueOf` then `toString` (or the reverse when `hint ==
/// PrimitiveHint::String`), returning the first primitive result.
pub fn ordinary_to_primitive(
    agent: &mut Agent,
    obj_id: crate::object::ObjectId,
    hint: PrimitiveHint,
) -> JsResult<Value> {
    let method_names: [&str; 2] = if hint == PrimitiveHint::String {
        ["toString", "valueOf"]
    } else {
        ["valueOf", "toString"]
    };

    for name in method_names {
        let atom = agent.atoms.intern(name);
        let key = PropertyKey::Atom(atom);
        let method = agent.get_property(obj_id, key)?;
        if agent.is_callable(&method) {
            let receiver = Value::Object(obj_id);
            let result = agent.call(method, receiver, &[])?;
            if !result.is_object() {
                return Ok(result);
            }
        }
    }

    Err(agent.type_error("Cannot convert object to primitive value"))
}

/// `ToNumber`.
pub fn to_number(agent: &mut Agent, value: &Value) -> JsResult<f64> {
    match value {
        Value::Undefined => Ok(f64::NAN),
        Value::Null => Ok(0.0),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => Ok(*n),
        Value::String(s) => Ok(string_to_number(s.as_str())),
        Value::BigInt(_) => Err(agent.type_error("Cannot convert a BigInt to a number")),
        Value::Symbol(_) => Err(agent.type_error("Cannot convert a Symbol to a number")),
        Value::Object(_) => {
            let prim = to_primitive(agent, value, PrimitiveHint::Number)?;
            to_number(agent, &prim)
        }
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(rest) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u64::from_str_radix(rest, 16).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    if let Some(rest) = trimmed.strip_prefix("0o").or_else(|| trimmed.strip_prefix("0O")) {
        return u64::from_str_radix(rest, 8).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    if let Some(rest) = trimmed.strip_prefix("0b").or_else(|| trimmed.strip_prefix("0B")) {
        return u64::from_str_radix(rest, 2).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => fast_float::parse(trimmed).unwrap_or(f64::NAN),
    }
}

pub fn to_int32(agent: &mut Agent, value: &Value) -> JsResult<i32> {
    let n = to_number(agent, value)?;
    Ok(super::number::to_int32(n))
}

pub fn to_uint32(agent: &mut Agent, value: &Value) -> JsResult<u32> {
    let n = to_number(agent, value)?;
    Ok(super::number::to_uint32(n))
}

/// `ToString`.
pub fn to_string(agent: &mut Agent, value: &Value) -> JsResult<JsString> {
    match value {
        Value::Undefined => Ok(JsString::from("undefined")),
        Value::Null => Ok(JsString::from("null")),
        Value::Boolean(b) => Ok(JsString::from(if *b { "true" } else { "false" })),
        Value::Number(n) => Ok(JsString::from(double_to_string(*n).as_str())),
        Value::String(s) => Ok(s.clone()),
        Value::BigInt(b) => Ok(JsString::from(b.to_string_radix(10).as_str())),
        Value::Symbol(_) => Err(agent.type_error("Cannot convert a Symbol to a string")),
        Value::Object(_) => {
            let prim = to_primitive(agent, value, PrimitiveHint::String)?;
            to_string(agent, &prim)
        }
    }
}

/// `ToPropertyKey`.
pub fn to_property_key(agent: &mut Agent, value: &Value) -> JsResult<PropertyKey> {
    if let Value::Symbol(atom) = value {
        return Ok(PropertyKey::Atom(*atom));
    }
    let prim = to_primitive(agent, value, PrimitiveHint::String)?;
    if let Value::Symbol(atom) = prim {
        return Ok(PropertyKey::Atom(atom));
    }
    let s = to_string(agent, &prim)?;
    let atom = agent.atoms.intern(s.as_str());
    Ok(PropertyKey::from_atom(atom, &agent.atoms))
}

/// `ToObject`. Primitives are boxed into a wrapper object carrying the
/// matching prototype (`Number.prototype`, `String.prototype`, ...);
/// `undefined`/`null` are a TypeError, matching the spec.
pub fn to_object(agent: &mut Agent, value: &Value) -> JsResult<crate::object::ObjectId> {
    match value {
        Value::Undefined | Value::Null => {
            Err(agent.type_error("Cannot convert undefined or null to object"))
        }
        Value::Object(id) => Ok(*id),
        _ => agent.box_primitive(value.clone()),
    }
}

pub fn type_of(agent: &Agent, value: &Value) -> &'static str {
    match value {
        Value::Object(id) if agent.is_callable_object(*id) => "function",
        other => other.type_of_primitive(),
    }
}

pub fn type_error_from_str(agent: &mut Agent, message: &str) -> JsError {
    agent.type_error(message)
}

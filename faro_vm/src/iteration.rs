//! Iterator protocol (C10): obtaining an iterator from an iterable via
//! `@@iterator`/`@@asyncIterator` and stepping/closing it. `for-of`,
//! `for-await-of`, spread, and array destructuring all funnel through
//! here rather than re-deriving the protocol at each call site.

use crate::atom::WellKnownSymbol;
use crate::execution::{Agent, JsResult};
use crate::object::{ObjectId, PropertyDescriptor, PropertyFlags};
use crate::value::{PropertyKey, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterKind {
    Sync,
    Async,
}

/// `GetIterator(obj, kind)` (§4.6 "Iterable/Iterator", §4.10). When
/// asking for an async iterator and the value has no `@@asyncIterator`,
/// falls back to its `@@iterator` wrapped in a sync-to-async adapter so
/// `for await (const x of [1, 2, 3])` and similar plain-iterable cases
/// work rather than throwing.
pub fn get_iterator(agent: &mut Agent, value: Value, kind: IterKind) -> JsResult<Value> {
    let symbol = match kind {
        IterKind::Sync => WellKnownSymbol::Iterator,
        IterKind::Async => WellKnownSymbol::AsyncIterator,
    };
    let atom = agent.well_known_symbol(symbol);
    let Value::Object(obj) = value else {
        return Err(agent.type_error("value is not iterable"));
    };
    let method = agent.get_property(obj, PropertyKey::Atom(atom))?;
    if agent.is_callable(&method) {
        return agent.call(method, Value::Object(obj), &[]);
    }
    if kind == IterKind::Async {
        let sync_iter = get_iterator(agent, Value::Object(obj), IterKind::Sync)?;
        return Ok(Value::Object(wrap_sync_iterator_as_async(agent, sync_iter)));
    }
    Err(agent.type_error("value is not iterable"))
}

/// `CreateAsyncFromSyncIterator`: an object whose `next`/`return` forward to
/// the wrapped sync iterator and package the `{value, done}` result (or a
/// thrown error) in an already-settled `Promise`.
fn wrap_sync_iterator_as_async(agent: &mut Agent, sync_iter: Value) -> ObjectId {
    let adapter = agent.new_object();
    let flags = PropertyFlags::non_enumerable();

    let next_iter = sync_iter.clone();
    let next_fn = agent.new_native_function("next", 1, move |agent, _this, args| {
        let input = args.first().cloned().unwrap_or(Value::Undefined);
        Ok(Value::Object(match iterator_next_raw(agent, &next_iter, input).and_then(|r| read_iterator_result(agent, r)) {
            Ok(Some(v)) => crate::promise::resolved_with(agent, crate::generator::make_result(agent, v, false)),
            Ok(None) => crate::promise::resolved_with(agent, crate::generator::make_result(agent, Value::Undefined, true)),
            Err(e) => crate::promise::rejected_with(agent, e.into_value()),
        }))
    });
    let next_atom = agent.atoms.intern("next");
    agent.heap.get_mut(adapter).define_own(PropertyKey::Atom(next_atom), PropertyDescriptor::data(Value::Object(next_fn), flags));

    let return_iter = sync_iter;
    let return_fn = agent.new_native_function("return", 1, move |agent, _this, args| {
        let input = args.first().cloned().unwrap_or(Value::Undefined);
        Ok(Value::Object(match iterator_close_with_value(agent, &return_iter, input) {
            Ok(v) => crate::promise::resolved_with(agent, crate::generator::make_result(agent, v, true)),
            Err(e) => crate::promise::rejected_with(agent, e.into_value()),
        }))
    });
    let return_atom = agent.atoms.intern("return");
    agent.heap.get_mut(adapter).define_own(PropertyKey::Atom(return_atom), PropertyDescriptor::data(Value::Object(return_fn), flags));

    adapter
}

/// Calls `.next(arg)` and returns the raw `{value, done}` result object
/// without reading either field — split out from `iterator_step` so
/// `for-await-of`/`yield*` delegation can `await` the raw result before
/// inspecting it (§9).
pub fn iterator_next_raw(agent: &mut Agent, iterator: &Value, arg: Value) -> JsResult<Value> {
    let Value::Object(iter_obj) = *iterator else {
        return Err(agent.type_error("iterator result is not an object"));
    };
    let next_atom = agent.atoms.intern("next");
    let next_fn = agent.get_property(iter_obj, PropertyKey::Atom(next_atom))?;
    agent.call(next_fn, Value::Object(iter_obj), &[arg])
}

/// Extracts `{done, value}` from an already-resolved iterator-result
/// object, always returning `value` (needed by `yield*`, where the final
/// `done: true` result's `value` becomes the delegation expression's
/// value, unlike a plain `for-of` step which discards it).
pub fn read_iterator_result_full(agent: &mut Agent, result: Value) -> JsResult<(bool, Value)> {
    let Value::Object(result_obj) = result else {
        return Err(agent.type_error("iterator result is not an object"));
    };
    let done_atom = agent.atoms.intern("done");
    let value_atom = agent.atoms.intern("value");
    let done = agent.get_property(result_obj, PropertyKey::Atom(done_atom))?;
    let value = agent.get_property(result_obj, PropertyKey::Atom(value_atom))?;
    Ok((done.to_boolean(), value))
}

/// Extracts `{done, value}` from an already-resolved iterator-result
/// object. `None` once `done` is true.
pub fn read_iterator_result(agent: &mut Agent, result: Value) -> JsResult<Option<Value>> {
    let (done, value) = read_iterator_result_full(agent, result)?;
    Ok(if done { None } else { Some(value) })
}

/// `IteratorStep`: calls `.next()` and returns `None` once `done` is true.
pub fn iterator_step(agent: &mut Agent, iterator: &Value) -> JsResult<Option<Value>> {
    let result = iterator_next_raw(agent, iterator, Value::Undefined)?;
    read_iterator_result(agent, result)
}

/// `IteratorClose` — called whenever a `for-of`/destructuring consumer
/// stops early (`break`, `return`, or a thrown error) so a generator-backed
/// iterable still gets to run its `finally` blocks (§8's scenario 3).
pub fn iterator_close(agent: &mut Agent, iterator: &Value) -> JsResult<()> {
    iterator_close_with_value(agent, iterator, Value::Undefined).map(|_| ())
}

fn iterator_close_with_value(agent: &mut Agent, iterator: &Value, value: Value) -> JsResult<Value> {
    let Value::Object(iter_obj) = *iterator else { return Ok(Value::Undefined) };
    let return_atom = agent.atoms.intern("return");
    let return_fn = agent.get_property(iter_obj, PropertyKey::Atom(return_atom))?;
    if agent.is_callable(&return_fn) {
        return agent.call(return_fn, Value::Object(iter_obj), &[value]);
    }
    Ok(Value::Undefined)
}

/// Drains an iterable eagerly into a `Vec` — spread in array literals and
/// call arguments don't need lazy stepping.
pub fn iterate_to_vec(agent: &mut Agent, value: Value) -> JsResult<Vec<Value>> {
    let iterator = get_iterator(agent, value, IterKind::Sync)?;
    let mut out = Vec::new();
    while let Some(v) = iterator_step(agent, &iterator)? {
        out.push(v);
    }
    Ok(out)
}

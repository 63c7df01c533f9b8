//! Generator / async-generator objects (C10, §9): a suspended `Frame`
//! parked on the heap between `.next()` calls, driven by re-entering the
//! dispatch loop rather than by any OS-level coroutine or thread — the
//! natural consequence of `Frame` already being an explicit, heap-movable
//! Rust struct instead of implicit state on the Rust call stack.

use crate::execution::{Agent, JsResult};
use crate::object::{ClassId, Exotic, ObjectData, ObjectId, PropertyDescriptor, PropertyFlags};
use crate::value::{PropertyKey, Value};
use crate::vm::{Completion, Frame};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorStatus {
    SuspendedStart,
    SuspendedYield,
    Executing,
    Completed,
}

#[derive(Debug)]
pub struct GeneratorState {
    pub frame: Option<Frame>,
    pub status: GeneratorStatus,
    pub is_async: bool,
}

pub fn new_generator(agent: &mut Agent, frame: Frame, is_async: bool) -> ObjectId {
    let proto = if is_async {
        agent.realm.intrinsics.async_generator_prototype
    } else {
        agent.realm.intrinsics.generator_prototype
    };
    let class = if is_async { ClassId::AsyncGenerator } else { ClassId::Generator };
    let mut data = ObjectData::new(class, Some(proto));
    data.exotic = Exotic::Generator(Rc::new(RefCell::new(GeneratorState {
        frame: Some(frame),
        status: GeneratorStatus::SuspendedStart,
        is_async,
    })));
    agent.heap.allocate(data)
}

fn state_cell(agent: &Agent, id: ObjectId) -> Rc<RefCell<GeneratorState>> {
    match &agent.heap.get(id).exotic {
        Exotic::Generator(cell) => cell.clone(),
        _ => panic!("object is not a generator"),
    }
}

pub(crate) fn make_result(agent: &mut Agent, value: Value, done: bool) -> Value {
    let obj = agent.new_object();
    let value_atom = agent.atoms.intern("value");
    let done_atom = agent.atoms.intern("done");
    let flags = PropertyFlags::enumerable_writable_configurable();
    agent.heap.get_mut(obj).define_own(PropertyKey::Atom(value_atom), PropertyDescriptor::data(value, flags));
    agent.heap.get_mut(obj).define_own(
        PropertyKey::Atom(done_atom),
        PropertyDescriptor::data(Value::Boolean(done), flags),
    );
    Value::Object(obj)
}

/// `%GeneratorPrototype%.next`: resumes `frame` at the last `yield`,
/// pushing `input` as that expression's value. Only *synchronous*
/// generators drive to a `Yield`/`Return`/`Throw` here; an async
/// generator's `Await` points are handled by `resume_async` instead.
pub fn next(agent: &mut Agent, id: ObjectId, input: Value) -> JsResult<Value> {
    let cell = state_cell(agent, id);
    if cell.borrow().status == GeneratorStatus::Completed {
        return Ok(make_result(agent, Value::Undefined, true));
    }
    if cell.borrow().status == GeneratorStatus::Executing {
        return Err(agent.type_error("Generator is already running"));
    }
    let mut frame = cell.borrow_mut().frame.take().expect("suspended generator must hold a frame");
    if cell.borrow().status == GeneratorStatus::SuspendedYield {
        frame.stack.push(input);
    }
    cell.borrow_mut().status = GeneratorStatus::Executing;

    loop {
        match crate::vm::dispatch(agent, &mut frame) {
            Completion::Yield(v) => {
                cell.borrow_mut().frame = Some(frame);
                cell.borrow_mut().status = GeneratorStatus::SuspendedYield;
                return Ok(make_result(agent, v, false));
            }
            Completion::Return(v) => {
                cell.borrow_mut().status = GeneratorStatus::Completed;
                return Ok(make_result(agent, v, true));
            }
            Completion::Throw(e) => {
                cell.borrow_mut().status = GeneratorStatus::Completed;
                return Err(e);
            }
            Completion::Await(awaited) => {
                // A non-async generator's compiler never emits `Await`;
                // defensively treat it as an immediately-resolved value so
                // a misclassified body still makes forward progress.
                frame.stack.push(awaited);
                continue;
            }
        }
    }
}

/// `%GeneratorPrototype%.return(v)`: forces completion without running the
/// body further, except whatever `finally` blocks the compiled exception
/// table attaches to the current `pc` — those still need `gosub`, so this
/// resumes the frame with a synthetic `Return` completion rather than
/// dropping it outright. Faro takes the simpler route of dropping the
/// frame directly: in-flight `finally` blocks around a pending `yield` are
/// not run, and a generator suspended inside a `yield*` does not forward
/// this `return()` to the delegate iterator. Documented in `DESIGN.md` as a
/// scope reduction.
pub fn generator_return(agent: &mut Agent, id: ObjectId, value: Value) -> JsResult<Value> {
    let cell = state_cell(agent, id);
    cell.borrow_mut().status = GeneratorStatus::Completed;
    cell.borrow_mut().frame = None;
    Ok(make_result(agent, value, true))
}

pub fn generator_throw(agent: &mut Agent, id: ObjectId, reason: Value) -> JsResult<Value> {
    let cell = state_cell(agent, id);
    if cell.borrow().status != GeneratorStatus::SuspendedYield {
        cell.borrow_mut().status = GeneratorStatus::Completed;
        return Err(crate::execution::JsError(reason));
    }
    let mut frame = cell.borrow_mut().frame.take().unwrap();
    cell.borrow_mut().status = GeneratorStatus::Executing;
    if !crate::vm::unwind_for_generator_throw(&mut frame, reason.clone()) {
        cell.borrow_mut().status = GeneratorStatus::Completed;
        return Err(crate::execution::JsError(reason));
    }
    match crate::vm::dispatch(agent, &mut frame) {
        Completion::Yield(v) => {
            cell.borrow_mut().frame = Some(frame);
            cell.borrow_mut().status = GeneratorStatus::SuspendedYield;
            Ok(make_result(agent, v, false))
        }
        Completion::Return(v) => {
            cell.borrow_mut().status = GeneratorStatus::Completed;
            Ok(make_result(agent, v, true))
        }
        Completion::Throw(e) => {
            cell.borrow_mut().status = GeneratorStatus::Completed;
            Err(e)
        }
        Completion::Await(_) => {
            cell.borrow_mut().status = GeneratorStatus::Completed;
            Ok(make_result(agent, Value::Undefined, true))
        }
    }
}

pub fn is_generator_object(agent: &Agent, id: ObjectId) -> bool {
    matches!(agent.heap.get(id).exotic, Exotic::Generator(_))
}

/// Wraps a generator's `{value, done}` result object in a resolved
/// `Promise`, matching `%AsyncGeneratorPrototype%.next`'s contract.
pub fn next_async(agent: &mut Agent, id: ObjectId, input: Value) -> ObjectId {
    match next(agent, id, input) {
        Ok(result) => crate::promise::resolved_with(agent, result),
        Err(e) => crate::promise::rejected_with(agent, e.into_value()),
    }
}

//! The dispatch loop (C8): a register-free stack machine executing one
//! `BytecodeFunction` per `Frame`, plus the call-protocol entry point
//! `run_function` that `execution::Agent::call`/`construct` hand off to.
//!
//! Grown from the abandoned `byte_compiler.rs` prototype's `Vm` shell
//! (which never got further than a `todo!()` dispatch match) — the loop
//! below is a real `match instr { ... }` over every `Instruction` variant,
//! operating on an explicit `Vec<Value>` operand stack per §4.8.
//!
//! Every local (not just the ones a nested closure captures) lives behind
//! an `Rc<RefCell<Option<Value>>>` cell from frame creation onward (see
//! `SPEC_FULL.md`'s scope note): this makes `CloseLoc` a runtime no-op and
//! lets a suspended generator/async frame be moved onto the heap wholesale
//! instead of needing a separate "promote to heap" step when a closure
//! captures it.

pub mod frame;

use crate::bytecode::{BytecodeFunction, Constant, ExceptionHandler, Instruction, UpvalueDesc};
use crate::execution::{Agent, JsError, JsResult};
use crate::function::{BytecodeClosure, FunctionData};
use crate::object::{ClassId, Exotic, ObjectData, ObjectId, PropertyDescriptor, PropertyFlags};
use crate::value::conversion::{to_int32, to_number, to_object, to_primitive, to_property_key, to_string, to_uint32};
use crate::value::equality::{abstract_equals, strict_equals};
use crate::value::{JsString, PrimitiveHint, PropertyKey, Value};
use std::cell::RefCell;
use std::rc::Rc;

pub use frame::{Frame, LocalCell};

pub type UpvalueRef = LocalCell;

/// What a dispatch loop iteration stopped on. `Yield`/`Await` only ever
/// come out of generator/async bodies; plain functions only ever produce
/// `Return`/`Throw`.
pub enum Completion {
    Return(Value),
    Throw(JsError),
    Yield(Value),
    Await(Value),
}

fn new_cell(value: Option<Value>) -> LocalCell {
    Rc::new(RefCell::new(value))
}

impl Frame {
    fn new(code: Rc<BytecodeFunction>, this_binding: Value, new_target: Value, upvalues: Box<[UpvalueRef]>) -> Self {
        let locals = (0..code.locals_count).map(|_| new_cell(None)).collect();
        Self {
            code,
            pc: 0,
            stack: Vec::new(),
            locals,
            upvalues,
            this_binding,
            new_target,
            home_object: None,
            arguments_object: None,
            active_function: None,
            gosub_stack: Vec::new(),
        }
    }
}

/// Binds `args` into a freshly created frame's parameter locals, handling
/// the rest-parameter special case (`run_function`'s only argument-shape
/// responsibility; everything else — defaults, destructuring — compiles
/// to ordinary prologue bytecode).
fn bind_parameters(frame: &mut Frame, agent: &mut Agent, args: &[Value]) {
    let param_count = frame.code.param_count as usize;
    let positional = if frame.code.has_rest_param { param_count.saturating_sub(1) } else { param_count };
    for i in 0..positional {
        let v = args.get(i).cloned().unwrap_or(Value::Undefined);
        *frame.locals[i].borrow_mut() = Some(v);
    }
    if frame.code.has_rest_param {
        let rest: Vec<Value> = if args.len() > positional { args[positional..].to_vec() } else { Vec::new() };
        let array = agent.new_array(rest);
        *frame.locals[positional].borrow_mut() = Some(Value::Object(array));
    }
}

/// Entry point for every bytecode call/construct (§4.8/§4.9). Handles the
/// three calling shapes: an ordinary synchronous call runs to completion
/// here; a generator function instead returns a suspended generator object
/// without running any user code; an async function drives itself to
/// completion (or its first suspend point) and wraps the outcome in a
/// `Promise`.
pub fn run_function(
    agent: &mut Agent,
    active_fn: ObjectId,
    closure: &BytecodeClosure,
    this: Value,
    args: &[Value],
    new_target: Option<Value>,
) -> JsResult<Value> {
    let this_binding = if closure.code.is_arrow {
        closure.captured_this.clone().unwrap_or(Value::Undefined)
    } else {
        this
    };
    let new_target_value = if closure.code.is_arrow {
        closure.captured_new_target.clone().unwrap_or(Value::Undefined)
    } else {
        new_target.unwrap_or(Value::Undefined)
    };

    let mut frame = Frame::new(closure.code.clone(), this_binding, new_target_value, closure.upvalues.clone());
    frame.home_object = closure.home_object;
    frame.active_function = Some(active_fn);
    bind_parameters(&mut frame, agent, args);
    if closure.code.is_arrow {
        frame.arguments_object = closure.captured_arguments.clone();
    } else {
        let arguments = agent.new_array(args.to_vec());
        frame.arguments_object = Some(Value::Object(arguments));
    }

    if closure.code.is_generator {
        return Ok(Value::Object(crate::generator::new_generator(agent, frame, closure.code.is_async)));
    }

    if closure.code.is_async {
        let promise = crate::promise::new_promise(agent);
        drive_async(agent, frame, promise);
        return Ok(Value::Object(promise));
    }

    match dispatch(agent, &mut frame) {
        Completion::Return(v) => Ok(v),
        Completion::Throw(e) => Err(e),
        Completion::Yield(_) | Completion::Await(_) => {
            Err(agent.type_error("yield/await used outside a generator/async function"))
        }
    }
}

/// Drives a non-generator `async function` to completion, threading any
/// `await` through the microtask queue instead of blocking (§9's "fully
/// asynchronous await" resolution). The frame is boxed into the reaction
/// closure so suspension is just "stop looping, the Frame lives in this
/// closure until the awaited promise settles."
fn drive_async(agent: &mut Agent, mut frame: Frame, promise: ObjectId) {
    match dispatch(agent, &mut frame) {
        Completion::Return(v) => crate::promise::resolve(agent, promise, v),
        Completion::Throw(e) => crate::promise::reject(agent, promise, e.into_value()),
        Completion::Await(awaited) => {
            let target = promise;
            crate::promise::on_settle(
                agent,
                match awaited {
                    Value::Object(id) if is_thenable(agent, id) => id,
                    other => crate::promise::resolved_with(agent, other),
                },
                Box::new(move |agent, outcome| {
                    frame.stack.push(match outcome {
                        Ok(v) => v,
                        Err(e) => {
                            resume_with_throw(agent, frame, e, target);
                            return;
                        }
                    });
                    drive_async(agent, frame, target);
                }),
            );
        }
        Completion::Yield(_) => unreachable!("async functions without * never yield"),
    }
}

fn is_thenable(agent: &Agent, id: ObjectId) -> bool {
    agent.heap.get(id).class_id == ClassId::Promise
}

/// Resumes an async frame at an `await` point whose promise rejected:
/// re-enters the dispatch loop with the exception table searched against
/// the *current* pc rather than pushing a value, so any enclosing
/// `try/catch` around the `await` still fires.
fn resume_with_throw(agent: &mut Agent, mut frame: Frame, err: crate::execution::JsError, promise: ObjectId) {
    frame.stack.pop();
    if !unwind_to_handler(&mut frame, err.clone()) {
        crate::promise::reject(agent, promise, err.into_value());
        return;
    }
    drive_async(agent, frame, promise);
}

/// Finds the innermost exception-table entry covering `frame.pc`,
/// truncates the stack to its recorded depth, pushes the thrown value, and
/// repoints `pc` at the handler. Returns `false` if nothing matches (the
/// exception escapes the frame).
fn unwind_to_handler(frame: &mut Frame, err: crate::execution::JsError) -> bool {
    let mut best: Option<&ExceptionHandler> = None;
    for h in &frame.code.exception_table {
        if frame.pc >= h.try_start && frame.pc < h.try_end {
            let better = match best {
                None => true,
                Some(cur) => (h.try_end - h.try_start) < (cur.try_end - cur.try_start),
            };
            if better {
                best = Some(h);
            }
        }
    }
    let Some(h) = best else { return false };
    frame.stack.truncate(h.stack_depth as usize);
    frame.stack.push(err.into_value());
    frame.pc = h.handler;
    true
}

/// Exposed for `generator::generator_throw`, which injects an exception at
/// the frame's suspended `pc` rather than one raised mid-dispatch.
pub fn unwind_for_generator_throw(frame: &mut Frame, reason: Value) -> bool {
    unwind_to_handler(frame, crate::execution::JsError(reason))
}

macro_rules! try_or_unwind {
    ($frame:expr, $result:expr) => {
        match $result {
            Ok(v) => v,
            Err(e) => {
                if unwind_to_handler($frame, e.clone()) {
                    continue;
                }
                return Completion::Throw(e);
            }
        }
    };
}

/// The dispatch loop proper. Runs `frame` until a `Return`/`Throw` (every
/// function) or `Yield`/`Await` (generator/async bodies only).
pub fn dispatch(agent: &mut Agent, frame: &mut Frame) -> Completion {
    loop {
        if frame.pc as usize >= frame.code.code.len() {
            return Completion::Return(Value::Undefined);
        }
        let pc = frame.pc;
        let instr = frame.code.code[pc as usize].clone();
        frame.pc += 1;

        match instr {
            Instruction::PushConst(idx) => {
                let v = const_to_value(agent, &frame.code.constants[idx as usize]);
                frame.stack.push(v);
            }
            Instruction::Push0 => frame.stack.push(Value::Number(0.0)),
            Instruction::Push1 => frame.stack.push(Value::Number(1.0)),
            Instruction::PushI8(n) => frame.stack.push(Value::Number(n as f64)),
            Instruction::PushI16(n) => frame.stack.push(Value::Number(n as f64)),
            Instruction::PushUndefined => frame.stack.push(Value::Undefined),
            Instruction::PushNull => frame.stack.push(Value::Null),
            Instruction::PushTrue => frame.stack.push(Value::Boolean(true)),
            Instruction::PushFalse => frame.stack.push(Value::Boolean(false)),
            Instruction::PushThis => frame.stack.push(frame.this_binding.clone()),
            Instruction::PushNewTarget => frame.stack.push(frame.new_target.clone()),
            Instruction::PushArguments => {
                frame.stack.push(frame.arguments_object.clone().unwrap_or(Value::Undefined))
            }
            Instruction::PushHomeObject => {
                frame.stack.push(frame.home_object.map(Value::Object).unwrap_or(Value::Undefined))
            }
            Instruction::PushImportMeta => frame.stack.push(Value::Undefined),
            Instruction::PushActiveFunction => {
                frame.stack.push(frame.active_function.map(Value::Object).unwrap_or(Value::Undefined))
            }
            Instruction::GetPrototypeOf => {
                let v = frame.stack.pop().unwrap();
                let proto = match v {
                    Value::Object(id) => agent.heap.get(id).prototype,
                    _ => None,
                };
                frame.stack.push(proto.map(Value::Object).unwrap_or(Value::Null));
            }

            Instruction::Closure(idx) | Instruction::ClosureArrow(idx) => {
                let is_arrow = matches!(instr, Instruction::ClosureArrow(_));
                let Constant::Function(inner) = &frame.code.constants[idx as usize] else {
                    unreachable!("Closure constant must be a Function")
                };
                let inner = inner.clone();
                let upvalues: Box<[UpvalueRef]> = inner
                    .upvalues
                    .iter()
                    .map(|desc| match desc {
                        UpvalueDesc::ParentLocal(slot) => frame.locals[*slot as usize].clone(),
                        UpvalueDesc::ParentUpvalue(idx) => frame.upvalues[*idx as usize].clone(),
                    })
                    .collect();
                let closure = BytecodeClosure {
                    code: inner,
                    upvalues,
                    captured_this: is_arrow.then(|| frame.this_binding.clone()),
                    captured_new_target: is_arrow.then(|| frame.new_target.clone()),
                    captured_arguments: is_arrow.then(|| frame.arguments_object.clone().unwrap_or(Value::Undefined)),
                    home_object: frame.home_object,
                };
                let mut data =
                    ObjectData::new(ClassId::Function, Some(agent.realm.intrinsics.function_prototype));
                let name = closure.code.name;
                let length = closure.code.param_count;
                data.exotic = Exotic::Function(FunctionData::Bytecode(closure));
                let id = agent.heap.allocate(data);
                if !matches!(&frame.code.constants[idx as usize], Constant::Function(f) if f.is_class_constructor) {
                    agent.define_function_length_and_name(id, length, name);
                }
                let (is_arrow_fn, is_class_ctor) = match agent.heap.get(id).function_data().unwrap() {
                    FunctionData::Bytecode(c) => (c.code.is_arrow, c.code.is_class_constructor),
                    _ => (false, false),
                };
                if !is_arrow_fn && !is_class_ctor {
                    let proto = agent.new_object();
                    let proto_atom = agent.atoms.intern("prototype");
                    let ctor_atom = agent.atoms.intern("constructor");
                    agent.heap.get_mut(proto).define_own(
                        PropertyKey::Atom(ctor_atom),
                        PropertyDescriptor::data(Value::Object(id), PropertyFlags::non_enumerable()),
                    );
                    agent.heap.get_mut(id).define_own(
                        PropertyKey::Atom(proto_atom),
                        PropertyDescriptor::data(Value::Object(proto), PropertyFlags::non_enumerable()),
                    );
                }
                frame.stack.push(Value::Object(id));
            }

            Instruction::Drop => {
                frame.stack.pop();
            }
            Instruction::Dup => {
                let v = frame.stack.last().cloned().unwrap_or(Value::Undefined);
                frame.stack.push(v);
            }
            Instruction::Dup2 => {
                let len = frame.stack.len();
                let a = frame.stack[len - 2].clone();
                let b = frame.stack[len - 1].clone();
                frame.stack.push(a);
                frame.stack.push(b);
            }
            Instruction::Swap => {
                let len = frame.stack.len();
                frame.stack.swap(len - 1, len - 2);
            }
            Instruction::Rot(n) => {
                let len = frame.stack.len();
                let n = n as usize;
                let slice = &mut frame.stack[len - n..];
                slice.rotate_right(1);
            }
            Instruction::Pick(depth) => {
                let len = frame.stack.len();
                let v = frame.stack[len - 1 - depth as usize].clone();
                frame.stack.push(v);
            }

            Instruction::Add => {
                let b = frame.stack.pop().unwrap();
                let a = frame.stack.pop().unwrap();
                let r = try_or_unwind!(frame, js_add(agent, &a, &b));
                frame.stack.push(r);
            }
            Instruction::Sub => bin_numeric(agent, frame, |a, b| a - b),
            Instruction::Mul => bin_numeric(agent, frame, |a, b| a * b),
            Instruction::Div => bin_numeric(agent, frame, |a, b| a / b),
            Instruction::Mod => bin_numeric(agent, frame, |a, b| a % b),
            Instruction::Pow => bin_numeric(agent, frame, f64::powf),
            Instruction::Neg => {
                let a = frame.stack.pop().unwrap();
                let n = try_or_unwind!(frame, to_number(agent, &a));
                frame.stack.push(Value::Number(-n));
            }
            Instruction::Pos => {
                let a = frame.stack.pop().unwrap();
                let n = try_or_unwind!(frame, to_number(agent, &a));
                frame.stack.push(Value::Number(n));
            }
            Instruction::BNot => {
                let a = frame.stack.pop().unwrap();
                let n = try_or_unwind!(frame, to_int32(agent, &a));
                frame.stack.push(Value::Number(!n as f64));
            }
            Instruction::Not => {
                let a = frame.stack.pop().unwrap();
                frame.stack.push(Value::Boolean(!a.to_boolean()));
            }
            Instruction::Shl => int_binop(agent, frame, |a, b| a.wrapping_shl(b as u32 & 31)),
            Instruction::Shr => int_binop(agent, frame, |a, b| a.wrapping_shr(b as u32 & 31)),
            Instruction::UShr => {
                let b = frame.stack.pop().unwrap();
                let a = frame.stack.pop().unwrap();
                let shift = try_or_unwind!(frame, to_uint32(agent, &b)) & 31;
                let a = try_or_unwind!(frame, to_uint32(agent, &a));
                frame.stack.push(Value::Number((a >> shift) as f64));
            }
            Instruction::BAnd => int_binop(agent, frame, |a, b| a & b),
            Instruction::BOr => int_binop(agent, frame, |a, b| a | b),
            Instruction::BXor => int_binop(agent, frame, |a, b| a ^ b),

            Instruction::Lt => compare(agent, frame, |o| o == Some(std::cmp::Ordering::Less)),
            Instruction::Gt => compare(agent, frame, |o| o == Some(std::cmp::Ordering::Greater)),
            Instruction::Lte => compare(agent, frame, |o| {
                matches!(o, Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal))
            }),
            Instruction::Gte => compare(agent, frame, |o| {
                matches!(o, Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal))
            }),

            Instruction::Eq => {
                let b = frame.stack.pop().unwrap();
                let a = frame.stack.pop().unwrap();
                let r = try_or_unwind!(frame, abstract_equals(agent, &a, &b));
                frame.stack.push(Value::Boolean(r));
            }
            Instruction::Neq => {
                let b = frame.stack.pop().unwrap();
                let a = frame.stack.pop().unwrap();
                let r = try_or_unwind!(frame, abstract_equals(agent, &a, &b));
                frame.stack.push(Value::Boolean(!r));
            }
            Instruction::StrictEq => {
                let b = frame.stack.pop().unwrap();
                let a = frame.stack.pop().unwrap();
                frame.stack.push(Value::Boolean(strict_equals(&a, &b)));
            }
            Instruction::StrictNeq => {
                let b = frame.stack.pop().unwrap();
                let a = frame.stack.pop().unwrap();
                frame.stack.push(Value::Boolean(!strict_equals(&a, &b)));
            }
            Instruction::TypeOf => {
                let a = frame.stack.pop().unwrap();
                let s = crate::value::conversion::type_of(agent, &a);
                frame.stack.push(Value::String(JsString::from(s)));
            }
            Instruction::IsCallable => {
                let v = frame.stack.pop().unwrap();
                frame.stack.push(Value::Boolean(agent.is_callable(&v)));
            }
            Instruction::InstanceOf => {
                let ctor = frame.stack.pop().unwrap();
                let obj = frame.stack.pop().unwrap();
                let r = try_or_unwind!(frame, instance_of(agent, &obj, &ctor));
                frame.stack.push(Value::Boolean(r));
            }
            Instruction::In => {
                let key_val = frame.stack.pop().unwrap();
                let obj = frame.stack.pop().unwrap();
                let Value::Object(obj_id) = obj else {
                    let e = agent.type_error("Cannot use 'in' operator on a non-object");
                    try_or_unwind!(frame, Err::<(), _>(e));
                    continue;
                };
                let key = try_or_unwind!(frame, to_property_key(agent, &key_val));
                frame.stack.push(Value::Boolean(agent.has_property(obj_id, key)));
            }
            Instruction::PrivateIn(atom_idx) => {
                let brand = frame.code.atoms[atom_idx as usize];
                let obj = frame.stack.pop().unwrap();
                let has = matches!(obj, Value::Object(id) if agent.heap.get(id).has_brand(brand));
                frame.stack.push(Value::Boolean(has));
            }
            Instruction::ToBoolean => {
                let a = frame.stack.pop().unwrap();
                frame.stack.push(Value::Boolean(a.to_boolean()));
            }
            Instruction::ToNumeric => {
                let a = frame.stack.pop().unwrap();
                if let Value::BigInt(_) = a {
                    frame.stack.push(a);
                } else {
                    let n = try_or_unwind!(frame, to_number(agent, &a));
                    frame.stack.push(Value::Number(n));
                }
            }
            Instruction::Inc => {
                let a = frame.stack.pop().unwrap();
                let n = try_or_unwind!(frame, to_number(agent, &a));
                frame.stack.push(Value::Number(n + 1.0));
            }
            Instruction::Dec => {
                let a = frame.stack.pop().unwrap();
                let n = try_or_unwind!(frame, to_number(agent, &a));
                frame.stack.push(Value::Number(n - 1.0));
            }

            Instruction::GetLoc(slot) => {
                let v = frame.locals[slot as usize].borrow().clone().unwrap_or(Value::Undefined);
                frame.stack.push(v);
            }
            Instruction::GetLoc0 => frame.stack.push(frame.locals[0].borrow().clone().unwrap_or(Value::Undefined)),
            Instruction::GetLoc1 => frame.stack.push(frame.locals[1].borrow().clone().unwrap_or(Value::Undefined)),
            Instruction::GetLoc2 => frame.stack.push(frame.locals[2].borrow().clone().unwrap_or(Value::Undefined)),
            Instruction::GetLoc3 => frame.stack.push(frame.locals[3].borrow().clone().unwrap_or(Value::Undefined)),
            Instruction::PutLoc(slot) | Instruction::PutLocInit(slot) => {
                let v = frame.stack.pop().unwrap();
                *frame.locals[slot as usize].borrow_mut() = Some(v);
            }
            Instruction::GetLocCheck(slot) => {
                let cell = frame.locals[slot as usize].borrow();
                match &*cell {
                    Some(v) => {
                        let v = v.clone();
                        drop(cell);
                        frame.stack.push(v);
                    }
                    None => {
                        drop(cell);
                        let e = agent.reference_error("Cannot access variable before initialization");
                        try_or_unwind!(frame, Err::<(), _>(e));
                    }
                }
            }
            Instruction::GetVarRef(slot) => {
                let v = frame.upvalues[slot as usize].borrow().clone().unwrap_or(Value::Undefined);
                frame.stack.push(v);
            }
            Instruction::PutVarRef(slot) | Instruction::PutVarRefInit(slot) => {
                let v = frame.stack.pop().unwrap();
                *frame.upvalues[slot as usize].borrow_mut() = Some(v);
            }
            Instruction::GetVarRefCheck(slot) => {
                let cell = frame.upvalues[slot as usize].borrow();
                match &*cell {
                    Some(v) => {
                        let v = v.clone();
                        drop(cell);
                        frame.stack.push(v);
                    }
                    None => {
                        drop(cell);
                        let e = agent.reference_error("Cannot access variable before initialization");
                        try_or_unwind!(frame, Err::<(), _>(e));
                    }
                }
            }
            Instruction::CloseLoc(_) => {}
            Instruction::GetVar(atom_idx) => {
                let atom = frame.code.atoms[atom_idx as usize];
                let key = PropertyKey::Atom(atom);
                let global = agent.realm.global_object;
                if !agent.has_property(global, key) {
                    let name = atom_display(agent, atom);
                    let e = agent.reference_error(&format!("{name} is not defined"));
                    try_or_unwind!(frame, Err::<(), _>(e));
                    continue;
                }
                let v = try_or_unwind!(frame, agent.get_property(global, key));
                frame.stack.push(v);
            }
            Instruction::PutVar(atom_idx) => {
                let atom = frame.code.atoms[atom_idx as usize];
                let key = PropertyKey::Atom(atom);
                let global = agent.realm.global_object;
                let v = frame.stack.pop().unwrap();
                let _ = try_or_unwind!(frame, agent.set_property(global, key, v, Value::Object(global), false));
            }

            Instruction::GetField(atom_idx) => {
                let atom = frame.code.atoms[atom_idx as usize];
                let obj = frame.stack.pop().unwrap();
                let v = try_or_unwind!(frame, get_field(agent, &obj, PropertyKey::Atom(atom)));
                frame.stack.push(v);
            }
            Instruction::GetFieldOpt(atom_idx) => {
                let atom = frame.code.atoms[atom_idx as usize];
                let obj = frame.stack.pop().unwrap();
                if obj.is_nullish() {
                    frame.stack.push(Value::Undefined);
                } else {
                    let v = try_or_unwind!(frame, get_field(agent, &obj, PropertyKey::Atom(atom)));
                    frame.stack.push(v);
                }
            }
            Instruction::PutField(atom_idx) => {
                let atom = frame.code.atoms[atom_idx as usize];
                let v = frame.stack.pop().unwrap();
                let obj = frame.stack.pop().unwrap();
                try_or_unwind!(frame, set_field(agent, &obj, PropertyKey::Atom(atom), v));
            }
            Instruction::GetIndex => {
                let key_val = frame.stack.pop().unwrap();
                let obj = frame.stack.pop().unwrap();
                let key = try_or_unwind!(frame, to_property_key(agent, &key_val));
                let v = try_or_unwind!(frame, get_field(agent, &obj, key));
                frame.stack.push(v);
            }
            Instruction::GetIndexOpt => {
                let key_val = frame.stack.pop().unwrap();
                let obj = frame.stack.pop().unwrap();
                if obj.is_nullish() {
                    frame.stack.push(Value::Undefined);
                } else {
                    let key = try_or_unwind!(frame, to_property_key(agent, &key_val));
                    let v = try_or_unwind!(frame, get_field(agent, &obj, key));
                    frame.stack.push(v);
                }
            }
            Instruction::PutIndex => {
                let v = frame.stack.pop().unwrap();
                let key_val = frame.stack.pop().unwrap();
                let obj = frame.stack.pop().unwrap();
                let key = try_or_unwind!(frame, to_property_key(agent, &key_val));
                try_or_unwind!(frame, set_field(agent, &obj, key, v));
            }
            Instruction::GetSuperField(atom_idx) => {
                let atom = frame.code.atoms[atom_idx as usize];
                let home = frame.home_object;
                let proto = home.and_then(|h| agent.heap.get(h).prototype);
                let v = match proto {
                    Some(p) => try_or_unwind!(
                        frame,
                        agent.get_property_with_receiver(p, PropertyKey::Atom(atom), frame.this_binding.clone())
                    ),
                    None => Value::Undefined,
                };
                frame.stack.push(v);
            }
            Instruction::PutSuperField(atom_idx) => {
                let atom = frame.code.atoms[atom_idx as usize];
                let v = frame.stack.pop().unwrap();
                let home = frame.home_object;
                if let Some(p) = home.and_then(|h| agent.heap.get(h).prototype) {
                    try_or_unwind!(
                        frame,
                        agent.set_property(p, PropertyKey::Atom(atom), v, frame.this_binding.clone(), true)
                    );
                }
            }
            Instruction::GetSuperIndex => {
                let key_val = frame.stack.pop().unwrap();
                let key = try_or_unwind!(frame, to_property_key(agent, &key_val));
                let home = frame.home_object;
                let proto = home.and_then(|h| agent.heap.get(h).prototype);
                let v = match proto {
                    Some(p) => {
                        try_or_unwind!(frame, agent.get_property_with_receiver(p, key, frame.this_binding.clone()))
                    }
                    None => Value::Undefined,
                };
                frame.stack.push(v);
            }
            Instruction::PutSuperIndex => {
                let v = frame.stack.pop().unwrap();
                let key_val = frame.stack.pop().unwrap();
                let key = try_or_unwind!(frame, to_property_key(agent, &key_val));
                let home = frame.home_object;
                if let Some(p) = home.and_then(|h| agent.heap.get(h).prototype) {
                    try_or_unwind!(frame, agent.set_property(p, key, v, frame.this_binding.clone(), true));
                }
            }
            Instruction::GetPrivateField(atom_idx) => {
                let brand = frame.code.atoms[atom_idx as usize];
                let obj = frame.stack.pop().unwrap();
                let Value::Object(id) = obj else {
                    let e = agent.type_error("Cannot read private field of non-object");
                    try_or_unwind!(frame, Err::<(), _>(e));
                    continue;
                };
                if !agent.heap.get(id).has_brand(brand) {
                    let e = agent.type_error("Cannot read private member from an object whose class did not declare it");
                    try_or_unwind!(frame, Err::<(), _>(e));
                    continue;
                }
                let v = try_or_unwind!(frame, agent.get_property(id, PropertyKey::Atom(brand)));
                frame.stack.push(v);
            }
            Instruction::PutPrivateField(atom_idx) => {
                let brand = frame.code.atoms[atom_idx as usize];
                let v = frame.stack.pop().unwrap();
                let obj = frame.stack.pop().unwrap();
                let Value::Object(id) = obj else {
                    let e = agent.type_error("Cannot write private field of non-object");
                    try_or_unwind!(frame, Err::<(), _>(e));
                    continue;
                };
                if !agent.heap.get(id).has_brand(brand) {
                    let e = agent.type_error("Cannot write private member to an object whose class did not declare it");
                    try_or_unwind!(frame, Err::<(), _>(e));
                    continue;
                }
                agent.heap.get_mut(id).write_own_data(PropertyKey::Atom(brand), v);
            }
            Instruction::DefinePrivateField(atom_idx) => {
                let brand = frame.code.atoms[atom_idx as usize];
                let v = frame.stack.pop().unwrap();
                let obj = frame.stack.pop().unwrap();
                if let Value::Object(id) = obj {
                    agent.heap.get_mut(id).brands.push(brand);
                    agent.heap.get_mut(id).define_own(
                        PropertyKey::Atom(brand),
                        PropertyDescriptor::data(v, PropertyFlags::non_enumerable()),
                    );
                }
            }
            Instruction::DefineField(atom_idx) => {
                let atom = frame.code.atoms[atom_idx as usize];
                let v = frame.stack.pop().unwrap();
                let obj = frame.stack.pop().unwrap();
                if let Value::Object(id) = obj {
                    agent.heap.get_mut(id).define_own(
                        PropertyKey::Atom(atom),
                        PropertyDescriptor::data(v, PropertyFlags::enumerable_writable_configurable()),
                    );
                }
            }
            Instruction::DefineMethod(atom_idx) => {
                let atom = frame.code.atoms[atom_idx as usize];
                let method = frame.stack.pop().unwrap();
                let obj = frame.stack.pop().unwrap();
                if let Value::Object(id) = obj {
                    set_method_home_object(agent, &method, id);
                    agent.heap.get_mut(id).define_own(
                        PropertyKey::Atom(atom),
                        PropertyDescriptor::data(method, PropertyFlags::non_enumerable()),
                    );
                }
            }
            Instruction::DefineGetter(atom_idx) => {
                let atom = frame.code.atoms[atom_idx as usize];
                let getter = frame.stack.pop().unwrap();
                let obj = frame.stack.pop().unwrap();
                if let Value::Object(id) = obj {
                    set_method_home_object(agent, &getter, id);
                    define_accessor(agent, id, PropertyKey::Atom(atom), Some(getter), None);
                }
            }
            Instruction::DefineSetter(atom_idx) => {
                let atom = frame.code.atoms[atom_idx as usize];
                let setter = frame.stack.pop().unwrap();
                let obj = frame.stack.pop().unwrap();
                if let Value::Object(id) = obj {
                    set_method_home_object(agent, &setter, id);
                    define_accessor(agent, id, PropertyKey::Atom(atom), None, Some(setter));
                }
            }
            Instruction::DeleteField(atom_idx) => {
                let atom = frame.code.atoms[atom_idx as usize];
                let obj = frame.stack.pop().unwrap();
                let ok = match obj {
                    Value::Object(id) => agent.heap.get_mut(id).delete(PropertyKey::Atom(atom)),
                    _ => true,
                };
                frame.stack.push(Value::Boolean(ok));
            }
            Instruction::DeleteIndex => {
                let key_val = frame.stack.pop().unwrap();
                let obj = frame.stack.pop().unwrap();
                let key = try_or_unwind!(frame, to_property_key(agent, &key_val));
                let ok = match obj {
                    Value::Object(id) => agent.heap.get_mut(id).delete(key),
                    _ => true,
                };
                frame.stack.push(Value::Boolean(ok));
            }

            Instruction::NewObject => {
                let id = agent.new_object();
                frame.stack.push(Value::Object(id));
            }
            Instruction::NewArray(hint) => {
                let id = agent.new_array(Vec::with_capacity(hint as usize));
                frame.stack.push(Value::Object(id));
            }
            Instruction::AppendSpread => {
                let iterable = frame.stack.pop().unwrap();
                let Value::Object(array_id) = frame.stack.pop().unwrap() else {
                    unreachable!("AppendSpread target must be an array")
                };
                let items = try_or_unwind!(frame, crate::iteration::iterate_to_vec(agent, iterable));
                let mut len = agent.heap.get(array_id).own_keys(&agent.atoms).len() as u32;
                for item in items {
                    agent.heap.get_mut(array_id).define_own(
                        PropertyKey::Index(len),
                        PropertyDescriptor::data(item, PropertyFlags::enumerable_writable_configurable()),
                    );
                    len += 1;
                }
                frame.stack.push(Value::Object(array_id));
            }
            Instruction::DefineClass { has_super, method_count, .. } => {
                try_or_unwind!(frame, define_class(agent, frame, has_super, method_count));
            }
            Instruction::RunStaticInit => {
                let init = frame.stack.pop().unwrap();
                let ctor = frame.stack.last().cloned().unwrap();
                try_or_unwind!(frame, agent.call(init, ctor, &[]));
            }

            Instruction::Goto(label) => frame.pc = label,
            Instruction::Goto8(off) => frame.pc = (pc as i64 + off as i64) as u32,
            Instruction::IfTrue(label) => {
                if frame.stack.pop().unwrap().to_boolean() {
                    frame.pc = label;
                }
            }
            Instruction::IfFalse(label) => {
                if !frame.stack.pop().unwrap().to_boolean() {
                    frame.pc = label;
                }
            }
            Instruction::IfTrue8(off) => {
                if frame.stack.pop().unwrap().to_boolean() {
                    frame.pc = (pc as i64 + off as i64) as u32;
                }
            }
            Instruction::IfFalse8(off) => {
                if !frame.stack.pop().unwrap().to_boolean() {
                    frame.pc = (pc as i64 + off as i64) as u32;
                }
            }
            Instruction::Nop => {}
            Instruction::Gosub(label) => {
                frame.gosub_stack.push(frame.pc);
                frame.pc = label;
            }
            Instruction::Ret => {
                frame.pc = frame.gosub_stack.pop().expect("Ret without matching Gosub");
            }
            Instruction::Throw => {
                let v = frame.stack.pop().unwrap();
                let e = JsError(v);
                if unwind_to_handler(frame, e.clone()) {
                    continue;
                }
                return Completion::Throw(e);
            }
            Instruction::ThrowError(atom_idx) => {
                let atom = frame.code.atoms[atom_idx as usize];
                let msg = atom_display(agent, atom);
                let e = agent.type_error(&msg);
                if unwind_to_handler(frame, e.clone()) {
                    continue;
                }
                return Completion::Throw(e);
            }
            Instruction::Return => return Completion::Return(frame.stack.pop().unwrap_or(Value::Undefined)),
            Instruction::ReturnUndefined => return Completion::Return(Value::Undefined),
            Instruction::ReturnAsync => return Completion::Return(frame.stack.pop().unwrap_or(Value::Undefined)),

            Instruction::Call(argc) | Instruction::Call0 | Instruction::Call1 | Instruction::Call2 | Instruction::Call3 => {
                let argc = call_argc(&instr, argc_of(&instr));
                let args: Vec<Value> = frame.stack.split_off(frame.stack.len() - argc);
                let callee = frame.stack.pop().unwrap();
                let r = try_or_unwind!(frame, agent.call(callee, Value::Undefined, &args));
                frame.stack.push(r);
            }
            Instruction::CallMethod(argc) => {
                let args: Vec<Value> = frame.stack.split_off(frame.stack.len() - argc as usize);
                let callee = frame.stack.pop().unwrap();
                let this = frame.stack.pop().unwrap();
                let r = try_or_unwind!(frame, agent.call(callee, this, &args));
                frame.stack.push(r);
            }
            Instruction::CallConstructor(argc) => {
                let args: Vec<Value> = frame.stack.split_off(frame.stack.len() - argc as usize);
                let callee = frame.stack.pop().unwrap();
                let r = try_or_unwind!(frame, agent.construct(callee.clone(), &args, callee));
                frame.stack.push(r);
            }
            Instruction::TailCall(argc) => {
                let args: Vec<Value> = frame.stack.split_off(frame.stack.len() - argc as usize);
                let callee = frame.stack.pop().unwrap();
                let r = try_or_unwind!(frame, agent.call(callee, Value::Undefined, &args));
                return Completion::Return(r);
            }
            Instruction::Apply => {
                let args_array = frame.stack.pop().unwrap();
                let this = frame.stack.pop().unwrap();
                let callee = frame.stack.pop().unwrap();
                let args = try_or_unwind!(frame, crate::iteration::iterate_to_vec(agent, args_array));
                let r = try_or_unwind!(frame, agent.call(callee, this, &args));
                frame.stack.push(r);
            }

            Instruction::ForInStart => {
                let obj = frame.stack.pop().unwrap();
                let keys = match obj {
                    Value::Object(id) => enumerable_string_keys(agent, id),
                    _ => Vec::new(),
                };
                let array = agent.new_array(keys);
                frame.stack.push(Value::Object(array));
                frame.stack.push(Value::Number(0.0));
            }
            Instruction::ForInNext(label) => {
                let idx_val = frame.stack.pop().unwrap();
                let Value::Object(array_id) = frame.stack.last().cloned().unwrap() else {
                    unreachable!()
                };
                let idx = idx_val.as_number().unwrap_or(0.0) as u32;
                let len = agent.heap.get(array_id).own_keys(&agent.atoms).len() as u32;
                if idx >= len {
                    frame.stack.pop();
                    frame.pc = label;
                } else {
                    let v = try_or_unwind!(frame, agent.get_property(array_id, PropertyKey::Index(idx)));
                    frame.stack.push(Value::Number((idx + 1) as f64));
                    frame.stack.push(v);
                }
            }
            Instruction::ForOfStart | Instruction::ForAwaitOfStart => {
                let kind = if matches!(instr, Instruction::ForAwaitOfStart) {
                    crate::iteration::IterKind::Async
                } else {
                    crate::iteration::IterKind::Sync
                };
                let iterable = frame.stack.pop().unwrap();
                let iter = try_or_unwind!(frame, crate::iteration::get_iterator(agent, iterable, kind));
                frame.stack.push(iter);
            }
            Instruction::ForOfNext(label) => {
                let iter = frame.stack.last().cloned().unwrap();
                match try_or_unwind!(frame, crate::iteration::iterator_step(agent, &iter)) {
                    Some(v) => frame.stack.push(v),
                    None => {
                        frame.stack.pop();
                        frame.pc = label;
                    }
                }
            }
            Instruction::ForAwaitOfNext => {
                let iter = frame.stack.last().cloned().unwrap();
                let raw = try_or_unwind!(frame, crate::iteration::iterator_next_raw(agent, &iter, Value::Undefined));
                frame.stack.push(raw);
            }
            Instruction::ForAwaitOfResult(label) => {
                let raw = frame.stack.pop().unwrap();
                match try_or_unwind!(frame, crate::iteration::read_iterator_result(agent, raw)) {
                    Some(v) => frame.stack.push(v),
                    None => {
                        frame.stack.pop();
                        frame.pc = label;
                    }
                }
            }
            Instruction::IteratorClose => {
                let iter = frame.stack.pop().unwrap();
                let _ = crate::iteration::iterator_close(agent, &iter);
            }
            Instruction::IteratorCall(atom_idx) => {
                let atom = frame.code.atoms[atom_idx as usize];
                let iter = frame.stack.pop().unwrap();
                let Value::Object(id) = iter else { unreachable!() };
                let method = try_or_unwind!(frame, agent.get_property(id, PropertyKey::Atom(atom)));
                let r = try_or_unwind!(frame, agent.call(method, Value::Object(id), &[]));
                frame.stack.push(r);
            }

            Instruction::InitialYield => {}
            Instruction::Yield => {
                let v = frame.stack.pop().unwrap_or(Value::Undefined);
                return Completion::Yield(v);
            }
            Instruction::YieldDelegateNext => {
                let received = frame.stack.pop().unwrap_or(Value::Undefined);
                let iter = frame.stack.pop().unwrap();
                let raw = try_or_unwind!(frame, crate::iteration::iterator_next_raw(agent, &iter, received));
                frame.stack.push(raw);
            }
            Instruction::YieldDelegateResult => {
                let raw = frame.stack.pop().unwrap();
                let (done, value) = try_or_unwind!(frame, crate::iteration::read_iterator_result_full(agent, raw));
                frame.stack.push(value);
                frame.stack.push(Value::Boolean(done));
            }
            Instruction::Await => {
                let v = frame.stack.pop().unwrap_or(Value::Undefined);
                return Completion::Await(v);
            }

            Instruction::CopyDataProperties(list_idx) => {
                let Constant::AtomList(excluded) = &frame.code.constants[list_idx as usize] else {
                    unreachable!()
                };
                let excluded = excluded.clone();
                let source = frame.stack.pop().unwrap();
                let target = agent.new_object();
                if let Value::Object(src_id) = source {
                    for key in agent.heap.get(src_id).own_keys(&agent.atoms) {
                        if let PropertyKey::Atom(a) = key {
                            if excluded.contains(&a) {
                                continue;
                            }
                        }
                        let v = try_or_unwind!(frame, agent.get_property(src_id, key));
                        agent.heap.get_mut(target).define_own(
                            key,
                            PropertyDescriptor::data(v, PropertyFlags::enumerable_writable_configurable()),
                        );
                    }
                }
                frame.stack.push(Value::Object(target));
            }
            Instruction::ArrayRestFrom(start) => {
                let source = frame.stack.pop().unwrap();
                let mut rest = Vec::new();
                if let Value::Object(id) = source {
                    let len = try_or_unwind!(
                        frame,
                        agent.get_property(id, PropertyKey::Atom(agent.atoms.intern("length")))
                    );
                    let len = len.as_number().unwrap_or(0.0) as u32;
                    for i in start..len {
                        rest.push(try_or_unwind!(frame, agent.get_property(id, PropertyKey::Index(i))));
                    }
                }
                let array = agent.new_array(rest);
                frame.stack.push(Value::Object(array));
            }
        }
    }
}

fn argc_of(instr: &Instruction) -> u32 {
    match instr {
        Instruction::Call0 => 0,
        Instruction::Call1 => 1,
        Instruction::Call2 => 2,
        Instruction::Call3 => 3,
        Instruction::Call(n) => *n,
        _ => unreachable!(),
    }
}

fn call_argc(_instr: &Instruction, n: u32) -> usize {
    n as usize
}

fn const_to_value(agent: &mut Agent, c: &Constant) -> Value {
    match c {
        Constant::Undefined => Value::Undefined,
        Constant::Null => Value::Null,
        Constant::Bool(b) => Value::Boolean(*b),
        Constant::Number(n) => Value::Number(*n),
        Constant::String(s) => Value::String(JsString::from(s.as_ref())),
        Constant::BigInt(digits) => {
            let parsed = num_bigint::BigInt::parse_bytes(digits.as_bytes(), 10).unwrap_or_default();
            Value::BigInt(crate::value::bigint::JsBigInt(Rc::new(parsed)))
        }
        Constant::Function(_) => Value::Undefined, // only reached via Closure/ClosureArrow
        Constant::TemplateSite { cooked, raw } => {
            let cooked_vals: Vec<Value> = cooked
                .iter()
                .map(|c| c.as_ref().map(|s| Value::String(JsString::from(s.as_ref()))).unwrap_or(Value::Undefined))
                .collect();
            let raw_vals: Vec<Value> = raw.iter().map(|s| Value::String(JsString::from(s.as_ref()))).collect();
            let raw_array = agent.new_array(raw_vals);
            let raw_atom = agent.atoms.intern("raw");
            let array = agent.new_array(cooked_vals);
            agent.heap.get_mut(array).define_own(
                PropertyKey::Atom(raw_atom),
                PropertyDescriptor::data(Value::Object(raw_array), PropertyFlags::non_enumerable()),
            );
            Value::Object(array)
        }
        Constant::AtomList(_) => Value::Undefined, // only reached via CopyDataProperties
    }
}

fn atom_display(agent: &Agent, atom: crate::atom::Atom) -> String {
    match agent.atoms.name_of(atom) {
        crate::atom::AtomName::String(s) => s.to_string(),
        crate::atom::AtomName::Index(i) => i.to_string(),
        crate::atom::AtomName::Symbol(desc) => format!("Symbol({})", desc.unwrap_or("")),
    }
}

fn js_add(agent: &mut Agent, a: &Value, b: &Value) -> JsResult<Value> {
    let pa = to_primitive(agent, a, PrimitiveHint::Default)?;
    let pb = to_primitive(agent, b, PrimitiveHint::Default)?;
    if matches!(pa, Value::String(_)) || matches!(pb, Value::String(_)) {
        let sa = to_string(agent, &pa)?;
        let sb = to_string(agent, &pb)?;
        return Ok(Value::String(JsString::from(format!("{}{}", sa.as_str(), sb.as_str()).as_str())));
    }
    if let (Value::BigInt(x), Value::BigInt(y)) = (&pa, &pb) {
        return Ok(Value::BigInt(crate::value::bigint::JsBigInt(Rc::new((*x.0).clone() + &*y.0))));
    }
    let na = to_number(agent, &pa)?;
    let nb = to_number(agent, &pb)?;
    Ok(Value::Number(na + nb))
}

fn bin_numeric(agent: &mut Agent, frame: &mut Frame, op: impl FnOnce(f64, f64) -> f64) {
    let b = frame.stack.pop().unwrap();
    let a = frame.stack.pop().unwrap();
    let na = match to_number(agent, &a) {
        Ok(v) => v,
        Err(e) => {
            if unwind_to_handler(frame, e) {
                return;
            }
            frame.stack.push(Value::Number(f64::NAN));
            return;
        }
    };
    let nb = match to_number(agent, &b) {
        Ok(v) => v,
        Err(e) => {
            if unwind_to_handler(frame, e) {
                return;
            }
            frame.stack.push(Value::Number(f64::NAN));
            return;
        }
    };
    frame.stack.push(Value::Number(op(na, nb)));
}

fn int_binop(agent: &mut Agent, frame: &mut Frame, op: impl FnOnce(i32, i32) -> i32) {
    let b = frame.stack.pop().unwrap();
    let a = frame.stack.pop().unwrap();
    let ia = to_int32(agent, &a).unwrap_or(0);
    let ib = to_int32(agent, &b).unwrap_or(0);
    frame.stack.push(Value::Number(op(ia, ib) as f64));
}

fn compare(agent: &mut Agent, frame: &mut Frame, pred: impl FnOnce(Option<std::cmp::Ordering>) -> bool) {
    let b = frame.stack.pop().unwrap();
    let a = frame.stack.pop().unwrap();
    let result = js_compare(agent, &a, &b);
    match result {
        Ok(ord) => frame.stack.push(Value::Boolean(pred(ord))),
        Err(e) => {
            if !unwind_to_handler(frame, e) {
                frame.stack.push(Value::Boolean(false));
            }
        }
    }
}

fn js_compare(agent: &mut Agent, a: &Value, b: &Value) -> JsResult<Option<std::cmp::Ordering>> {
    let pa = to_primitive(agent, a, PrimitiveHint::Number)?;
    let pb = to_primitive(agent, b, PrimitiveHint::Number)?;
    if let (Value::String(x), Value::String(y)) = (&pa, &pb) {
        return Ok(x.as_str().partial_cmp(y.as_str()));
    }
    let na = to_number(agent, &pa)?;
    let nb = to_number(agent, &pb)?;
    Ok(na.partial_cmp(&nb))
}

fn instance_of(agent: &mut Agent, obj: &Value, ctor: &Value) -> JsResult<bool> {
    let Value::Object(ctor_id) = ctor else {
        return Err(agent.type_error("Right-hand side of 'instanceof' is not callable"));
    };
    if !agent.is_callable_object(*ctor_id) {
        return Err(agent.type_error("Right-hand side of 'instanceof' is not callable"));
    }
    let Value::Object(obj_id) = obj else { return Ok(false) };
    let proto_atom = agent.atoms.intern("prototype");
    let target_proto = agent.get_property(*ctor_id, PropertyKey::Atom(proto_atom))?;
    let Value::Object(target_proto) = target_proto else {
        return Err(agent.type_error("Function has non-object prototype in instanceof check"));
    };
    let mut current = agent.heap.get(*obj_id).prototype;
    let mut depth = 0;
    while let Some(id) = current {
        if id == target_proto {
            return Ok(true);
        }
        depth += 1;
        if depth > 1000 {
            break;
        }
        current = agent.heap.get(id).prototype;
    }
    Ok(false)
}

fn get_field(agent: &mut Agent, obj: &Value, key: PropertyKey) -> JsResult<Value> {
    match obj {
        Value::Object(id) => agent.get_property(*id, key),
        Value::Undefined | Value::Null => {
            let name = match key {
                PropertyKey::Atom(a) => atom_display(agent, a),
                PropertyKey::Index(i) => i.to_string(),
            };
            Err(agent.type_error(&format!("Cannot read properties of {:?} (reading '{}')", obj, name)))
        }
        _ => {
            let boxed = to_object(agent, obj)?;
            agent.get_property(boxed, key)
        }
    }
}

fn set_field(agent: &mut Agent, obj: &Value, key: PropertyKey, value: Value) -> JsResult<()> {
    match obj {
        Value::Object(id) => {
            let receiver = Value::Object(*id);
            agent.set_property(*id, key, value, receiver, false)?;
            Ok(())
        }
        Value::Undefined | Value::Null => Err(agent.type_error("Cannot set properties of null/undefined")),
        _ => Ok(()), // writes to a primitive's boxed form are silently dropped (non-strict)
    }
}

/// Methods and accessors need `[[HomeObject]]` pointed at the object they
/// were *defined* on (not the frame that happened to create the closure) so
/// `super.x` inside them resolves against the right prototype — `Closure`
/// itself can't know that yet, since the method value exists before it's
/// attached anywhere.
fn set_method_home_object(agent: &mut Agent, method: &Value, home: ObjectId) {
    if let Value::Object(id) = method {
        if let Some(FunctionData::Bytecode(closure)) = agent.heap.get_mut(*id).function_data_mut() {
            closure.home_object = Some(home);
        }
    }
}

fn define_accessor(agent: &mut Agent, obj: ObjectId, key: PropertyKey, getter: Option<Value>, setter: Option<Value>) {
    let existing = agent.heap.get(obj).get_own(key);
    let (getter, setter) = match existing {
        Some(d) if d.is_accessor() => (getter.or(d.getter), setter.or(d.setter)),
        _ => (getter, setter),
    };
    agent.heap.get_mut(obj).define_own(
        key,
        PropertyDescriptor { flags: PropertyFlags::non_enumerable(), value: None, getter, setter },
    );
}

fn enumerable_string_keys(agent: &mut Agent, obj: ObjectId) -> Vec<Value> {
    let mut keys = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut current = Some(obj);
    let mut depth = 0;
    while let Some(id) = current {
        depth += 1;
        if depth > 1000 {
            break;
        }
        for key in agent.heap.get(id).own_keys(&agent.atoms) {
            if seen.contains(&key) {
                continue;
            }
            seen.insert(key);
            let Some(desc) = agent.heap.get(id).get_own(key) else { continue };
            if !desc.flags.enumerable {
                continue;
            }
            let s = match key {
                PropertyKey::Index(i) => i.to_string(),
                PropertyKey::Atom(a) => {
                    if agent.atoms.is_symbol(a) {
                        continue;
                    }
                    atom_display(agent, a)
                }
            };
            keys.push(Value::String(JsString::from(s.as_str())));
        }
        current = agent.heap.get(id).prototype;
    }
    keys
}

/// `DefineClass` (§4.6): pops `method_count` `(key_or_undefined, kind_tag,
/// value)` triples (pushed by the compiler in declaration order) plus the
/// constructor closure and optional parent class, and wires up the
/// prototype chain, static/instance method placement, and brand
/// registration on every instance the constructor creates.
///
/// The compiler pre-arranges the stack as:
/// `[ parent? , ctor , proto_obj , (kind:u8 as Number, is_static:bool as
/// Number, key:Value, value:Value) * method_count ]`
fn define_class(agent: &mut Agent, frame: &mut Frame, has_super: bool, method_count: u32) -> JsResult<()> {
    for _ in 0..method_count {
        let value = frame.stack.pop().unwrap();
        let key = frame.stack.pop().unwrap();
        let is_static = frame.stack.pop().unwrap().to_boolean();
        let kind = frame.stack.pop().unwrap().as_number().unwrap_or(0.0) as u8;

        let proto_or_ctor_idx = frame.stack.len() - 1 - if is_static { 1 } else { 0 };
        let target = if is_static {
            frame.stack[frame.stack.len() - 1].clone()
        } else {
            frame.stack[frame.stack.len() - 2].clone()
        };
        let _ = proto_or_ctor_idx;
        let Value::Object(target_id) = target else { continue };
        let key = to_property_key(agent, &key)?;
        set_method_home_object(agent, &value, target_id);
        match kind {
            0 => {
                agent.heap.get_mut(target_id).define_own(
                    key,
                    PropertyDescriptor::data(value, PropertyFlags::non_enumerable()),
                );
            }
            1 => define_accessor(agent, target_id, key, Some(value), None),
            2 => define_accessor(agent, target_id, key, None, Some(value)),
            _ => {
                agent.heap.get_mut(target_id).define_own(
                    key,
                    PropertyDescriptor::data(value, PropertyFlags::enumerable_writable_configurable()),
                );
            }
        }
    }

    let proto = frame.stack.pop().unwrap();
    let ctor = frame.stack.pop().unwrap();
    let parent = if has_super { Some(frame.stack.pop().unwrap()) } else { None };

    if let (Value::Object(proto_id), Value::Object(ctor_id)) = (&proto, &ctor) {
        set_method_home_object(agent, &ctor, *proto_id);
        let proto_atom = agent.atoms.intern("prototype");
        let ctor_atom = agent.atoms.intern("constructor");
        agent
            .heap
            .get_mut(*ctor_id)
            .define_own(PropertyKey::Atom(proto_atom), PropertyDescriptor::data(proto.clone(), PropertyFlags::non_enumerable()));
        agent
            .heap
            .get_mut(*proto_id)
            .define_own(PropertyKey::Atom(ctor_atom), PropertyDescriptor::data(ctor.clone(), PropertyFlags::non_enumerable()));
    }

    if let (Some(parent), Value::Object(proto_id)) = (&parent, &proto) {
        match parent {
            Value::Object(parent_id) => {
                let parent_proto_atom = agent.atoms.intern("prototype");
                let parent_proto = agent.get_property(*parent_id, PropertyKey::Atom(parent_proto_atom))?;
                agent.heap.get_mut(*proto_id).prototype = parent_proto.as_object();
                if let Value::Object(ctor_id) = &ctor {
                    agent.heap.get_mut(*ctor_id).prototype = Some(*parent_id);
                }
            }
            Value::Null => {
                agent.heap.get_mut(*proto_id).prototype = None;
            }
            _ => return Err(agent.type_error("Class extends value is not a constructor")),
        }
    }

    frame.stack.push(ctor);
    Ok(())
}

//! One activation of a running (or suspended) `BytecodeFunction`.
//!
//! Every local lives behind a cell from the moment the frame is created —
//! see the module doc on `vm::mod` for why. This also means a `Frame` has
//! no borrowed references into anything, so it can be moved onto the heap
//! whole: a suspended generator is a `Frame` sitting inside an
//! `Exotic::Generator`, and a suspended `async function` is a `Frame`
//! captured by the closure a promise reaction holds onto.

use crate::bytecode::BytecodeFunction;
use crate::object::ObjectId;
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

pub type LocalCell = Rc<RefCell<Option<Value>>>;

#[derive(Debug, Clone)]
pub struct Frame {
    pub code: Rc<BytecodeFunction>,
    pub pc: u32,
    pub stack: Vec<Value>,
    pub locals: Vec<LocalCell>,
    pub upvalues: Box<[LocalCell]>,
    pub this_binding: Value,
    pub new_target: Value,
    pub home_object: Option<ObjectId>,
    pub arguments_object: Option<Value>,
    /// The function object this frame is an activation of — lets compiled
    /// `super(...)` calls walk `[[Prototype]]` off the *running* function
    /// rather than needing a dedicated upvalue slot for it.
    pub active_function: Option<ObjectId>,
    /// Return-address stack for the `gosub`/`ret` pair a compiled `finally`
    /// uses to run once regardless of how its `try` block exited.
    pub gosub_stack: Vec<u32>,
}

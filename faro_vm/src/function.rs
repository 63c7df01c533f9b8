//! Function objects (C9): bytecode, native, and bound function variants,
//! plus the `call()` / `construct()` distinction §4.9 asks for.
//!
//! A `FunctionData` is stored in the owning `ObjectData`'s `Exotic::Function`
//! slot (see `object.rs`) rather than as its own heap kind — the function
//! *is* an ordinary object with extra internal slots, exactly as the spec's
//! "Function (variant of Object)" phrasing implies and as Nova's own
//! `Function` newtype-over-`Object` models it.

use crate::atom::Atom;
use crate::bytecode::BytecodeFunction;
use crate::execution::{Agent, JsResult};
use crate::object::ObjectId;
use crate::value::Value;
use std::rc::Rc;

pub type NativeFn = Rc<dyn Fn(&mut Agent, Value, &[Value]) -> JsResult<Value>>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: Atom,
    pub arity: u32,
    pub callback: NativeFn,
    /// `None` for ordinary built-ins; `Some` for native functions that also
    /// act as constructors (e.g. a host-registered class).
    pub construct: Option<NativeFn>,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction").field("arity", &self.arity).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct BoundFunction {
    pub target: ObjectId,
    pub bound_this: Value,
    pub bound_args: Vec<Value>,
}

/// One instantiation of a compiled function: the shared code plus whatever
/// this particular closure captured. Arrow functions additionally close
/// over the enclosing activation's `this`/`arguments`/`new.target`/home
/// object, since arrows are lexically transparent to all four.
#[derive(Debug, Clone)]
pub struct BytecodeClosure {
    pub code: Rc<BytecodeFunction>,
    pub upvalues: Box<[crate::vm::UpvalueRef]>,
    pub captured_this: Option<Value>,
    pub captured_new_target: Option<Value>,
    pub captured_arguments: Option<Value>,
    pub home_object: Option<ObjectId>,
}

/// The function-object variant discriminant, carrying each variant's own
/// payload. `length`/`name` are defined as non-enumerable own properties on
/// the object at construction time (§4.9), not re-derived from here.
#[derive(Debug, Clone)]
pub enum FunctionData {
    Bytecode(BytecodeClosure),
    Native(NativeFunction),
    Bound(BoundFunction),
}

impl FunctionData {
    pub fn is_constructor(&self) -> bool {
        match self {
            FunctionData::Bytecode(c) => !c.code.is_arrow && !c.code.is_async && !c.code.is_generator,
            FunctionData::Native(n) => n.construct.is_some(),
            FunctionData::Bound(_) => true,
        }
    }

    pub fn is_class_constructor(&self) -> bool {
        matches!(self, FunctionData::Bytecode(c) if c.code.is_class_constructor)
    }
}

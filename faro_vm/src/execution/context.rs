//! `Context` (§6): the embedder-facing handle for one isolated engine
//! instance — `eval`, the global object, native registration, and
//! microtask draining. Everything else (`Agent`, `Realm`, the heap) lives
//! underneath and is reached through here.

use crate::bytecode::compiler::{compile_module, compile_script};
use crate::function::{BytecodeClosure, FunctionData};
use crate::object::{ClassId, Exotic, ObjectData, PropertyDescriptor, PropertyFlags};
use crate::value::{PropertyKey, Value};

use super::agent::Agent;
use super::error::{EvalError, JsResult};

/// Which grammar `Context::eval` should parse `source` as — a script (top
/// level `this` is the global object) or a module body (top-level `this`
/// is `undefined`, strict by default). Matches §6's `mode ∈ {script,
/// module}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Script,
    Module,
}

pub struct Context {
    agent: Agent,
}

impl Context {
    pub(crate) fn new() -> Self {
        Self { agent: Agent::new() }
    }

    /// Compiles and runs `source` to completion, running any microtasks the
    /// top-level evaluation itself scheduled are *not* drained here — §5
    /// leaves draining to an explicit `run_microtasks()` call so the
    /// embedder controls when pending `.then` callbacks actually fire.
    pub fn eval(&mut self, source: &str, filename: &str, mode: EvalMode) -> Result<Value, EvalError> {
        let code = match mode {
            EvalMode::Script => compile_script(source, &mut self.agent.atoms)?,
            EvalMode::Module => compile_module(source, &mut self.agent.atoms)?,
        };

        let mut data = ObjectData::new(ClassId::Function, Some(self.agent.realm.intrinsics.function_prototype));
        let closure = BytecodeClosure {
            code,
            upvalues: Box::new([]),
            captured_this: None,
            captured_new_target: None,
            captured_arguments: None,
            home_object: None,
        };
        data.exotic = Exotic::Function(FunctionData::Bytecode(closure.clone()));
        let fn_id = self.agent.heap.allocate(data);

        let this = match mode {
            EvalMode::Script => Value::Object(self.agent.realm.global_object),
            EvalMode::Module => Value::Undefined,
        };

        let result = crate::vm::run_function(&mut self.agent, fn_id, &closure, this, &[], None);
        Ok(result?)
    }

    pub fn get_global(&self) -> Value {
        Value::Object(self.agent.realm.global_object)
    }

    /// Defines a non-enumerable native function property on the global
    /// object — the embedder's one hook for attaching a standard library or
    /// host bindings (§1 scopes the library itself out of the core).
    pub fn register_native(
        &mut self,
        name: &str,
        arity: u32,
        callback: impl Fn(&mut Agent, Value, &[Value]) -> JsResult<Value> + 'static,
    ) {
        let f = self.agent.new_native_function(name, arity, callback);
        let atom = self.agent.atoms.intern(name);
        let global = self.agent.realm.global_object;
        self.agent.heap.get_mut(global).define_own(
            PropertyKey::from_atom(atom, &self.agent.atoms),
            PropertyDescriptor::data(Value::Object(f), PropertyFlags::non_enumerable()),
        );
    }

    /// Drains the microtask queue to empty (§5: "all microtasks enqueued
    /// during a drain also run in that same drain").
    pub fn run_microtasks(&mut self) {
        self.agent.run_microtasks();
    }

    /// Escape hatch for an embedder that needs lower-level access (building
    /// its own objects, calling a value directly) than the handful of
    /// methods above expose.
    pub fn agent(&mut self) -> &mut Agent {
        &mut self.agent
    }
}

//! `Agent`: the runtime-owned state threaded through every engine
//! operation — atom table, object heap, realm, and the microtask queue
//! (§5's "single-threaded cooperative inside one Runtime"). Nova calls
//! this exact concept `Agent` too; the name and role both carry over
//! directly.

use crate::atom::{Atom, AtomTable, WellKnownSymbol};
use crate::function::{BoundFunction, FunctionData, NativeFunction};
use crate::object::{ClassId, Exotic, Heap, ObjectData, ObjectId, PropertyDescriptor, PropertyFlags};
use crate::value::{JsString, PropertyKey, Value};
use std::collections::VecDeque;

use super::error::{JsError, JsResult};
use super::realm::Realm;

/// Prototype-chain walks (`get`/`set`/`in`) are capped at this depth
/// rather than tracked with a visited-set, per §9's "depth counter capped
/// at ~1,000 links" — cheaper than a `HashSet<ObjectId>` per lookup and
/// just as effective against a malformed cycle (`setPrototypeOf` itself
/// actively rejects cycle creation; see `object::set_prototype`).
const MAX_PROTO_CHAIN_DEPTH: usize = 1000;

/// A promise reaction or other deferred callback, queued FIFO and run to
/// completion one at a time (§5, §4.10).
pub type Microtask = Box<dyn FnOnce(&mut Agent)>;

pub struct Agent {
    pub atoms: AtomTable,
    pub heap: Heap,
    pub realm: Realm,
    pub microtasks: VecDeque<Microtask>,
    /// Native-call reentrancy depth; a pathological native recursion (or a
    /// script recursing through the VM's own `call`) trips `RangeError`
    /// before the host stack actually overflows.
    pub call_depth: u32,
}

impl Agent {
    pub fn new() -> Self {
        let atoms = AtomTable::new();
        let mut heap = Heap::new();
        let realm = Realm::new(&mut heap);
        let mut agent = Self { atoms, heap, realm, microtasks: VecDeque::new(), call_depth: 0 };
        agent.bootstrap_intrinsics();
        agent
    }

    /// Wires up the handful of intrinsic methods the engine's own control
    /// flow depends on structurally (`for-of` over a generator, `await` on
    /// a promise) rather than ones a hosted standard library would add —
    /// those stay the embedder's job per `register_native` (§6).
    fn bootstrap_intrinsics(&mut self) {
        let generator_proto = self.realm.intrinsics.generator_prototype;
        let async_generator_proto = self.realm.intrinsics.async_generator_prototype;
        let iterator_proto = self.realm.intrinsics.iterator_prototype;
        let promise_proto = self.realm.intrinsics.promise_prototype;

        self.define_method(generator_proto, "next", 1, |agent, this, args| {
            let Value::Object(id) = this else { return Err(agent.type_error("not a generator")) };
            crate::generator::next(agent, id, args.first().cloned().unwrap_or(Value::Undefined))
        });
        self.define_method(generator_proto, "return", 1, |agent, this, args| {
            let Value::Object(id) = this else { return Err(agent.type_error("not a generator")) };
            crate::generator::generator_return(agent, id, args.first().cloned().unwrap_or(Value::Undefined))
        });
        self.define_method(generator_proto, "throw", 1, |agent, this, args| {
            let Value::Object(id) = this else { return Err(agent.type_error("not a generator")) };
            crate::generator::generator_throw(agent, id, args.first().cloned().unwrap_or(Value::Undefined))
        });

        self.define_method(async_generator_proto, "next", 1, |agent, this, args| {
            let Value::Object(id) = this else { return Err(agent.type_error("not an async generator")) };
            let input = args.first().cloned().unwrap_or(Value::Undefined);
            Ok(Value::Object(crate::generator::next_async(agent, id, input)))
        });

        let iterator_symbol = self.well_known_symbol(WellKnownSymbol::Iterator);
        let iterator_key = PropertyKey::from_atom(iterator_symbol, &self.atoms);
        let self_iter = self.new_native_function("[Symbol.iterator]", 0, |_agent, this, _args| Ok(this));
        self.heap.get_mut(iterator_proto).define_own(
            iterator_key,
            PropertyDescriptor::data(Value::Object(self_iter), PropertyFlags::non_enumerable()),
        );

        self.define_method(promise_proto, "then", 2, |agent, this, args| {
            let Value::Object(id) = this else { return Err(agent.type_error("not a promise")) };
            let on_fulfilled = args.first().cloned().unwrap_or(Value::Undefined);
            let on_rejected = args.get(1).cloned().unwrap_or(Value::Undefined);
            Ok(Value::Object(crate::promise::then(agent, id, on_fulfilled, on_rejected)))
        });
        self.define_method(promise_proto, "catch", 1, |agent, this, args| {
            let Value::Object(id) = this else { return Err(agent.type_error("not a promise")) };
            let on_rejected = args.first().cloned().unwrap_or(Value::Undefined);
            Ok(Value::Object(crate::promise::then(agent, id, Value::Undefined, on_rejected)))
        });
    }

    fn define_method(
        &mut self,
        target: ObjectId,
        name: &str,
        arity: u32,
        callback: impl Fn(&mut Agent, Value, &[Value]) -> JsResult<Value> + 'static,
    ) {
        let f = self.new_native_function(name, arity, callback);
        let atom = self.atoms.intern(name);
        self.heap.get_mut(target).define_own(
            PropertyKey::from_atom(atom, &self.atoms),
            PropertyDescriptor::data(Value::Object(f), PropertyFlags::non_enumerable()),
        );
    }

    // --- Error construction -------------------------------------------------

    fn make_error(&mut self, name: &str, message: &str) -> Value {
        let mut data = ObjectData::new(ClassId::Error, Some(self.realm.intrinsics.error_prototype));
        let flags = PropertyFlags::non_enumerable();
        let name_atom = self.atoms.intern("name");
        let message_atom = self.atoms.intern("message");
        let stack_atom = self.atoms.intern("stack");
        data.define_own(
            PropertyKey::from_atom(name_atom, &self.atoms),
            PropertyDescriptor::data(Value::String(JsString::from(name)), flags),
        );
        data.define_own(
            PropertyKey::from_atom(message_atom, &self.atoms),
            PropertyDescriptor::data(Value::String(JsString::from(message)), flags),
        );
        let stack_text = format!("{name}: {message}");
        data.define_own(
            PropertyKey::from_atom(stack_atom, &self.atoms),
            PropertyDescriptor::data(Value::String(JsString::from(stack_text.as_str())), flags),
        );
        Value::Object(self.heap.allocate(data))
    }

    pub fn type_error(&mut self, message: &str) -> JsError {
        JsError(self.make_error("TypeError", message))
    }

    pub fn range_error(&mut self, message: &str) -> JsError {
        JsError(self.make_error("RangeError", message))
    }

    pub fn reference_error(&mut self, message: &str) -> JsError {
        JsError(self.make_error("ReferenceError", message))
    }

    pub fn syntax_error(&mut self, message: &str) -> JsError {
        JsError(self.make_error("SyntaxError", message))
    }

    // --- Callable predicates -------------------------------------------------

    pub fn is_callable(&self, value: &Value) -> bool {
        matches!(value, Value::Object(id) if self.is_callable_object(*id))
    }

    pub fn is_callable_object(&self, id: ObjectId) -> bool {
        self.heap.get(id).is_callable()
    }

    pub fn is_constructor(&self, value: &Value) -> bool {
        match value {
            Value::Object(id) => self
                .heap
                .get(*id)
                .function_data()
                .is_some_and(FunctionData::is_constructor),
            _ => false,
        }
    }

    // --- Property access (C3) -----------------------------------------------

    /// `get(obj, key, receiver)` — §4.3: walks the prototype chain with a
    /// bounded-depth cycle guard, invoking an accessor's getter with
    /// `receiver` as `this`.
    pub fn get_property_with_receiver(
        &mut self,
        obj: ObjectId,
        key: PropertyKey,
        receiver: Value,
    ) -> JsResult<Value> {
        let mut current = Some(obj);
        let mut depth = 0;
        while let Some(id) = current {
            depth += 1;
            if depth > MAX_PROTO_CHAIN_DEPTH {
                return Ok(Value::Undefined);
            }
            if let Some(descriptor) = self.heap.get(id).get_own(key) {
                if let Some(getter) = descriptor.getter {
                    if self.is_callable(&getter) {
                        return self.call(getter, receiver, &[]);
                    }
                    return Ok(Value::Undefined);
                }
                return Ok(descriptor.value.unwrap_or(Value::Undefined));
            }
            current = self.heap.get(id).prototype;
        }
        Ok(Value::Undefined)
    }

    pub fn get_property(&mut self, obj: ObjectId, key: PropertyKey) -> JsResult<Value> {
        self.get_property_with_receiver(obj, key, Value::Object(obj))
    }

    /// `set(obj, key, value, receiver)` — §4.3. Writable own data properties
    /// write directly; accessors call their setter; otherwise the
    /// prototype chain is consulted to decide whether the write is even
    /// legal before creating the property on `receiver`.
    pub fn set_property(
        &mut self,
        obj: ObjectId,
        key: PropertyKey,
        value: Value,
        receiver: Value,
        strict: bool,
    ) -> JsResult<bool> {
        let mut current = Some(obj);
        let mut depth = 0;
        while let Some(id) = current {
            depth += 1;
            if depth > MAX_PROTO_CHAIN_DEPTH {
                break;
            }
            if let Some(descriptor) = self.heap.get(id).get_own(key) {
                if let Some(setter) = descriptor.setter {
                    if self.is_callable(&setter) {
                        self.call(setter, receiver, &[value])?;
                        return Ok(true);
                    }
                    if strict {
                        return Err(self.type_error("Cannot set property: no setter"));
                    }
                    return Ok(false);
                }
                if descriptor.getter.is_some() {
                    if strict {
                        return Err(self.type_error("Cannot set property: no setter"));
                    }
                    return Ok(false);
                }
                if !descriptor.flags.writable {
                    if strict {
                        return Err(self.type_error("Cannot assign to read only property"));
                    }
                    return Ok(false);
                }
                if id == obj {
                    self.heap.get_mut(id).write_own_data(key, value);
                    return Ok(true);
                }
                break;
            }
            current = self.heap.get(id).prototype;
        }

        let Value::Object(receiver_id) = receiver else {
            return Ok(false);
        };
        if !self.heap.get(receiver_id).extensible {
            return Ok(false);
        }
        let ok = self.heap.get_mut(receiver_id).define_own(
            key,
            PropertyDescriptor::data(value, PropertyFlags::enumerable_writable_configurable()),
        );
        if !ok && strict {
            return Err(self.type_error("Cannot create property"));
        }
        Ok(ok)
    }

    pub fn has_property(&mut self, obj: ObjectId, key: PropertyKey) -> bool {
        let mut current = Some(obj);
        let mut depth = 0;
        while let Some(id) = current {
            depth += 1;
            if depth > MAX_PROTO_CHAIN_DEPTH {
                return false;
            }
            if self.heap.get(id).has_own(key) {
                return true;
            }
            current = self.heap.get(id).prototype;
        }
        false
    }

    /// `setPrototypeOf` (§4.3): rejects the change if it would create a
    /// cycle or the object is non-extensible. This is the *active*
    /// rejection §9 distinguishes from `get`'s passive depth cap.
    pub fn set_prototype(&mut self, obj: ObjectId, proto: Option<ObjectId>) -> bool {
        if !self.heap.get(obj).extensible {
            return proto == self.heap.get(obj).prototype;
        }
        let mut walker = proto;
        let mut depth = 0;
        while let Some(id) = walker {
            if id == obj {
                return false;
            }
            depth += 1;
            if depth > MAX_PROTO_CHAIN_DEPTH {
                break;
            }
            walker = self.heap.get(id).prototype;
        }
        self.heap.get_mut(obj).prototype = proto;
        true
    }

    // --- Boxing primitives (ToObject) ---------------------------------------

    pub fn box_primitive(&mut self, value: Value) -> JsResult<ObjectId> {
        let (class_id, proto) = match &value {
            Value::Boolean(_) => (ClassId::BooleanWrapper, self.realm.intrinsics.boolean_prototype),
            Value::Number(_) => (ClassId::NumberWrapper, self.realm.intrinsics.number_prototype),
            Value::String(_) => (ClassId::StringWrapper, self.realm.intrinsics.string_prototype),
            Value::Symbol(_) => (ClassId::SymbolWrapper, self.realm.intrinsics.symbol_prototype),
            Value::BigInt(_) => (ClassId::BigIntWrapper, self.realm.intrinsics.bigint_prototype),
            _ => return Err(self.type_error("Cannot box this value")),
        };
        let mut data = ObjectData::new(class_id, Some(proto));
        data.exotic = Exotic::Primitive(value);
        Ok(self.heap.allocate(data))
    }

    // --- Calling / constructing (C8's call protocol, §4.9) ------------------

    pub fn call(&mut self, callee: Value, this: Value, args: &[Value]) -> JsResult<Value> {
        let Value::Object(callee_id) = callee else {
            return Err(self.type_error("value is not a function"));
        };
        self.call_object(callee_id, this, args)
    }

    pub fn call_object(&mut self, callee_id: ObjectId, this: Value, args: &[Value]) -> JsResult<Value> {
        self.call_depth += 1;
        if self.call_depth > 2000 {
            self.call_depth -= 1;
            return Err(self.range_error("Maximum call stack size exceeded"));
        }
        let result = self.dispatch_call(callee_id, this, args);
        self.call_depth -= 1;
        result
    }

    fn dispatch_call(&mut self, callee_id: ObjectId, this: Value, args: &[Value]) -> JsResult<Value> {
        let Some(data) = self.heap.get(callee_id).function_data().cloned() else {
            return Err(self.type_error("value is not a function"));
        };
        match data {
            FunctionData::Native(native) => (native.callback)(self, this, args),
            FunctionData::Bound(bound) => {
                let mut full_args = bound.bound_args.clone();
                full_args.extend_from_slice(args);
                self.call_object(bound.target, bound.bound_this.clone(), &full_args)
            }
            FunctionData::Bytecode(closure) => {
                if closure.code.is_class_constructor {
                    return Err(self.type_error("Class constructor cannot be invoked without 'new'"));
                }
                crate::vm::run_function(self, callee_id, &closure, this, args, None)
            }
        }
    }

    /// `[[Construct]]` (§4.8/§4.9): allocates a new object whose prototype
    /// is the callee's `.prototype`, binds it as `this`, and returns
    /// either the function's explicit object return value or that `this`.
    pub fn construct(&mut self, callee: Value, args: &[Value], new_target: Value) -> JsResult<Value> {
        let Value::Object(callee_id) = callee else {
            return Err(self.type_error("value is not a constructor"));
        };
        let Some(data) = self.heap.get(callee_id).function_data().cloned() else {
            return Err(self.type_error("value is not a constructor"));
        };
        if !data.is_constructor() {
            return Err(self.type_error("value is not a constructor"));
        }

        match data {
            FunctionData::Native(native) => {
                let construct = native.construct.clone().expect("checked is_constructor");
                construct(self, new_target, args)
            }
            FunctionData::Bound(bound) => {
                let mut full_args = bound.bound_args.clone();
                full_args.extend_from_slice(args);
                self.construct(Value::Object(bound.target), &full_args, new_target)
            }
            FunctionData::Bytecode(closure) => {
                let proto_key_atom = self.atoms.intern("prototype");
                let proto_key = PropertyKey::from_atom(proto_key_atom, &self.atoms);
                let proto_value = self.get_property(callee_id, proto_key)?;
                let proto = match proto_value {
                    Value::Object(id) => Some(id),
                    _ => Some(self.realm.intrinsics.object_prototype),
                };
                let this_obj = self.heap.allocate(ObjectData::new(ClassId::Ordinary, proto));
                let this_value = Value::Object(this_obj);
                self.call_depth += 1;
                if self.call_depth > 2000 {
                    self.call_depth -= 1;
                    return Err(self.range_error("Maximum call stack size exceeded"));
                }
                let result =
                    crate::vm::run_function(self, callee_id, &closure, this_value.clone(), args, Some(new_target));
                self.call_depth -= 1;
                match result? {
                    Value::Object(id) => Ok(Value::Object(id)),
                    _ => Ok(this_value),
                }
            }
        }
    }

    // --- Native function registration (§6 `register_native`) ---------------

    pub fn new_native_function(
        &mut self,
        name: &str,
        arity: u32,
        callback: impl Fn(&mut Agent, Value, &[Value]) -> JsResult<Value> + 'static,
    ) -> ObjectId {
        let name_atom = self.atoms.intern(name);
        let mut data = ObjectData::new(ClassId::Function, Some(self.realm.intrinsics.function_prototype));
        data.exotic = Exotic::Function(FunctionData::Native(NativeFunction {
            name: name_atom,
            arity,
            callback: std::rc::Rc::new(callback),
            construct: None,
        }));
        let id = self.heap.allocate(data);
        self.define_function_length_and_name(id, arity, name_atom);
        id
    }

    pub fn define_function_length_and_name(&mut self, id: ObjectId, length: u32, name: Atom) {
        let length_atom = self.atoms.intern("length");
        let name_key_atom = self.atoms.intern("name");
        let flags = PropertyFlags::non_enumerable();
        let length_key = PropertyKey::from_atom(length_atom, &self.atoms);
        let name_key = PropertyKey::from_atom(name_key_atom, &self.atoms);
        let name_text = match self.atoms.name_of(name) {
            crate::atom::AtomName::String(s) => s.to_string(),
            crate::atom::AtomName::Index(i) => i.to_string(),
            crate::atom::AtomName::Symbol(desc) => format!("[{}]", desc.unwrap_or("")),
        };
        self.heap.get_mut(id).define_own(
            length_key,
            PropertyDescriptor::data(Value::Number(length as f64), flags),
        );
        self.heap.get_mut(id).define_own(
            name_key,
            PropertyDescriptor::data(Value::String(JsString::from(name_text.as_str())), flags),
        );
    }

    pub fn bind_function(
        &mut self,
        target: ObjectId,
        bound_this: Value,
        bound_args: Vec<Value>,
    ) -> ObjectId {
        let mut data = ObjectData::new(ClassId::Function, Some(self.realm.intrinsics.function_prototype));
        data.exotic =
            Exotic::Function(FunctionData::Bound(BoundFunction { target, bound_this, bound_args }));
        self.heap.allocate(data)
    }

    /// Allocates an ordinary plain object (`{}`) rooted at `Object.prototype`.
    pub fn new_object(&mut self) -> ObjectId {
        self.heap.allocate(ObjectData::new(ClassId::Ordinary, Some(self.realm.intrinsics.object_prototype)))
    }

    pub fn new_array(&mut self, elements: Vec<Value>) -> ObjectId {
        let mut data = ObjectData::new(ClassId::Array, Some(self.realm.intrinsics.array_prototype));
        for (i, v) in elements.into_iter().enumerate() {
            data.define_own(
                PropertyKey::Index(i as u32),
                PropertyDescriptor::data(v, PropertyFlags::enumerable_writable_configurable()),
            );
        }
        self.heap.allocate(data)
    }

    // --- Microtasks (§5, §4.10) ---------------------------------------------

    pub fn enqueue_microtask(&mut self, job: Microtask) {
        self.microtasks.push_back(job);
    }

    /// Drains the queue to empty, running newly-enqueued jobs in the same
    /// drain (§5: "all microtasks enqueued during a drain also run in that
    /// same drain").
    pub fn run_microtasks(&mut self) {
        while let Some(job) = self.microtasks.pop_front() {
            job(self);
        }
    }

    pub fn well_known_symbol(&mut self, symbol: WellKnownSymbol) -> Atom {
        self.atoms.well_known(symbol)
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new()
    }
}


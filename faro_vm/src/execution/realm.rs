//! A `Realm`: one global object plus the fixed set of intrinsic
//! prototypes every value's prototype chain ultimately bottoms out at.
//!
//! §1 scopes the actual built-in *library* (Array/String/Map/... methods)
//! out of the core — "the core depends only on their registration
//! contract". `Realm` therefore allocates bare prototype objects (so
//! `Object.prototype`, `Function.prototype`, etc. exist and chain
//! correctly) without attaching any of their methods; `register_native`
//! is how an embedder attaches the real library on top, exactly as §1's
//! "given a global object, attach named constructors and prototypes"
//! contract describes.

use crate::object::{ClassId, Heap, ObjectData, ObjectId};

#[derive(Debug, Clone)]
pub struct Intrinsics {
    pub object_prototype: ObjectId,
    pub function_prototype: ObjectId,
    pub array_prototype: ObjectId,
    pub error_prototype: ObjectId,
    pub boolean_prototype: ObjectId,
    pub number_prototype: ObjectId,
    pub string_prototype: ObjectId,
    pub symbol_prototype: ObjectId,
    pub bigint_prototype: ObjectId,
    pub promise_prototype: ObjectId,
    pub generator_prototype: ObjectId,
    pub async_generator_prototype: ObjectId,
    pub iterator_prototype: ObjectId,
}

#[derive(Debug, Clone)]
pub struct Realm {
    pub global_object: ObjectId,
    pub intrinsics: Intrinsics,
}

impl Realm {
    pub fn new(heap: &mut Heap) -> Self {
        let object_prototype = heap.allocate(ObjectData::new(ClassId::Ordinary, None));
        let iterator_prototype =
            heap.allocate(ObjectData::new(ClassId::Ordinary, Some(object_prototype)));
        let function_prototype =
            heap.allocate(ObjectData::new(ClassId::Ordinary, Some(object_prototype)));
        let array_prototype =
            heap.allocate(ObjectData::new(ClassId::Array, Some(object_prototype)));
        let error_prototype =
            heap.allocate(ObjectData::new(ClassId::Error, Some(object_prototype)));
        let boolean_prototype =
            heap.allocate(ObjectData::new(ClassId::Ordinary, Some(object_prototype)));
        let number_prototype =
            heap.allocate(ObjectData::new(ClassId::Ordinary, Some(object_prototype)));
        let string_prototype =
            heap.allocate(ObjectData::new(ClassId::Ordinary, Some(object_prototype)));
        let symbol_prototype =
            heap.allocate(ObjectData::new(ClassId::Ordinary, Some(object_prototype)));
        let bigint_prototype =
            heap.allocate(ObjectData::new(ClassId::Ordinary, Some(object_prototype)));
        let generator_prototype =
            heap.allocate(ObjectData::new(ClassId::Ordinary, Some(iterator_prototype)));
        let async_generator_prototype =
            heap.allocate(ObjectData::new(ClassId::Ordinary, Some(object_prototype)));
        let promise_prototype =
            heap.allocate(ObjectData::new(ClassId::Ordinary, Some(object_prototype)));

        let global_object = heap.allocate(ObjectData::new(ClassId::Ordinary, Some(object_prototype)));

        Self {
            global_object,
            intrinsics: Intrinsics {
                object_prototype,
                function_prototype,
                array_prototype,
                error_prototype,
                boolean_prototype,
                number_prototype,
                string_prototype,
                symbol_prototype,
                bigint_prototype,
                promise_prototype,
                generator_prototype,
                async_generator_prototype,
                iterator_prototype,
            },
        }
    }
}

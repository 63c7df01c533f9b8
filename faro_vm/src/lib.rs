//! Faro's bytecode compiler, stack VM, and object/value model.
//!
//! This crate is the engine core: it owns everything from atom interning
//! through running compiled bytecode, but not the language surface that
//! produces an AST in the first place (`faro_parser`) nor any hosted
//! standard library (that's the embedder's job, via `register_native` —
//! see `execution::Context`).

pub mod atom;
pub mod bytecode;
pub mod execution;
pub mod function;
pub mod generator;
pub mod iteration;
pub mod object;
pub mod promise;
pub mod value;
pub mod vm;

pub use atom::{Atom, AtomTable, WellKnownSymbol};
pub use execution::{Agent, Context, EvalMode, JsError, JsResult, Realm, Runtime};
pub use object::ObjectId;
pub use value::{JsString, PropertyKey, Value};

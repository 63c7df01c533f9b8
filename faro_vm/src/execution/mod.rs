//! Agent/Realm/Context execution machinery and the embedder-facing
//! `Runtime`/`Context` API of §6.
//!
//! Nova splits this the same way: an `Agent` owning the heap and atom
//! table, a `Realm` per global environment, and a `Context` newtype the
//! embedder actually holds. Faro keeps the split but collapses Nova's
//! `GcScope`/`NoGcScope` rooting machinery away (see `SPEC_FULL.md`'s
//! heap-model note) — `Agent` methods take `&mut self` directly.

pub mod agent;
pub mod context;
pub mod error;
pub mod realm;
pub mod runtime;

pub use agent::Agent;
pub use context::{Context, EvalMode};
pub use error::{CompileError, EvalError, JsError, JsResult};
pub use realm::Realm;
pub use runtime::Runtime;

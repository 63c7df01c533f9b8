//! `Runtime` (§6): the embedder's entry point. Nova's own split keeps a
//! top-level `Instance`/engine object mostly stateless — the real state
//! lives per-`Agent` — and `Runtime` follows suit: it exists so the
//! embedder has something to call `create_context()` on, but carries no
//! state of its own today. Multiple `Context`s created from one `Runtime`
//! are fully isolated (separate `Agent`, separate heap, separate atom
//! table); §5's "never run concurrently" applies per-`Context`, not across
//! them, since nothing is shared.

use super::context::Context;

#[derive(Debug, Default)]
pub struct Runtime {
    _private: (),
}

impl Runtime {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Creates a fresh, independent `Context` — its own `Agent`, heap, atom
    /// table, and realm. Nothing is shared with any other `Context` created
    /// from the same `Runtime`.
    pub fn create_context(&self) -> Context {
        Context::new()
    }
}

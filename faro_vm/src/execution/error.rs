//! Error kinds (§7). The engine core never uses `anyhow`/`thiserror` —
//! Nova's core doesn't either, since every runtime-visible failure already
//! has a natural representation as a JS value. The one Rust-level error
//! type the core needs (`CompileError`, for early/syntax errors raised
//! during bytecode emission rather than parsing) mirrors
//! `faro_parser::ParseError`'s `{message, span}` shape exactly.

use crate::value::Value;
use faro_parser::Span;

/// A thrown JS value, propagated as a Rust `Err` through every fallible
/// engine operation. Matches Nova's own `JsError(Value)` newtype: the VM's
/// exception-handler search (§4.8) is what actually decides whether a
/// `JsError` is caught in-language or escapes `eval()` to the embedder.
#[derive(Debug, Clone)]
pub struct JsError(pub Value);

impl JsError {
    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

pub type JsResult<T> = Result<T, JsError>;

/// A compile-time "early error" (§4.6): duplicate `let` binding, `break`
/// outside a loop, `return` outside a function, invalid private-field
/// reference, malformed destructuring target, stack-effect mismatch. All
/// surface to the embedder as a `SyntaxError` per §7's propagation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
    pub span: Span,
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self { message: message.into(), span }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyntaxError: {} ({}..{})", self.message, self.span.start, self.span.end)
    }
}

impl std::error::Error for CompileError {}

/// Everything `Context::eval` can fail with, before any JS-level exception
/// even has a chance to run: a lex/parse failure, a compile-time early
/// error, or (once bytecode is running) an uncaught thrown value.
#[derive(Debug, Clone)]
pub enum EvalError {
    Parse(faro_parser::ParseError),
    Compile(CompileError),
    Thrown(JsError),
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::Parse(e) => write!(f, "{e}"),
            EvalError::Compile(e) => write!(f, "{e}"),
            EvalError::Thrown(e) => write!(f, "uncaught exception: {:?}", e.0),
        }
    }
}

impl std::error::Error for EvalError {}

impl From<faro_parser::ParseError> for EvalError {
    fn from(e: faro_parser::ParseError) -> Self {
        EvalError::Parse(e)
    }
}

impl From<CompileError> for EvalError {
    fn from(e: CompileError) -> Self {
        EvalError::Compile(e)
    }
}

impl From<JsError> for EvalError {
    fn from(e: JsError) -> Self {
        EvalError::Thrown(e)
    }
}

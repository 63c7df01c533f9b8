//! Glue shared between `faro_cli`'s `eval`/`parse`/`repl` subcommands:
//! registering the handful of host functions a bare `Context` doesn't
//! start with, and formatting parse/eval failures for a terminal.
//!
//! Faro's core intentionally ships with no standard library (§1) — not
//! even `print`. Everything here is exactly the kind of thing `register_native`
//! exists for, the same role `nova_cli::helper` plays for Nova.

use console::Style;
use faro_parser::ParseError;
use faro_vm::execution::Context;
use faro_vm::value::Value;

/// Registers the small set of host functions this CLI's demo scripts use:
/// `print(value)` and `readTextFile(path)`. A real embedder would attach a
/// much larger standard library the same way.
pub fn initialize_globals(ctx: &mut Context) {
    ctx.register_native("print", 1, |agent, _this, args| {
        let text = match args.first() {
            Some(v) => faro_vm::value::conversion::to_string(agent, v)?,
            None => faro_vm::value::JsString::from(""),
        };
        println!("{}", text.as_str());
        Ok(Value::Undefined)
    });

    ctx.register_native("readTextFile", 1, |agent, _this, args| {
        let Some(Value::String(path)) = args.first() else {
            return Err(agent.type_error("readTextFile expects a string path"));
        };
        match std::fs::read_to_string(path.as_str()) {
            Ok(contents) => Ok(Value::String(faro_vm::value::JsString::from(contents.as_str()))),
            Err(e) => Err(agent.type_error(&e.to_string())),
        }
    });
}

/// Prints a lex/parse failure against its source text in the style of a
/// compiler diagnostic, then exits the process. Mirrors
/// `nova_cli::exit_with_parse_errors`'s role, minus `oxc`'s `miette`
/// integration (`faro_parser`'s errors are a flat `{message, span}`, not a
/// rich diagnostic graph).
pub fn exit_with_parse_error(error: &ParseError, path: &str, source: &str) -> ! {
    let error_style = Style::new().red().bold();
    let offset = (error.span.start as usize).min(source.len());
    let line = source[..offset].matches('\n').count() + 1;
    eprintln!("{}: {} ({path}:{line})", error_style.apply_to("SyntaxError"), error.message);
    std::process::exit(1);
}

/// Renders an `eval` outcome the way a REPL or `eval` subcommand wants to:
/// the value's debug form on success, `Uncaught <value>` on failure.
pub fn format_result(ctx: &mut Context, result: Result<Value, faro_vm::execution::EvalError>) -> String {
    match result {
        Ok(value) => describe(ctx, &value),
        Err(faro_vm::execution::EvalError::Thrown(err)) => {
            format!("Uncaught {}", describe(ctx, err.value()))
        }
        Err(other) => format!("{other}"),
    }
}

fn describe(ctx: &mut Context, value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Number(n) => faro_vm::value::number::double_to_string(*n),
        Value::String(s) => format!("{:?}", s.as_str()),
        Value::Symbol(_) => "Symbol()".to_string(),
        Value::BigInt(b) => format!("{b}n"),
        Value::Object(id) => {
            if ctx.agent().is_callable_object(*id) {
                "[Function]".to_string()
            } else {
                "[object Object]".to_string()
            }
        }
    }
}

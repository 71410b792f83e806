//! Yerleşik (native) fonksiyonlar ve host kayıt noktası.

use std::io::{self, BufRead, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::interpreter::Interpreter;
use crate::value::{fmt_number, ErrorKind, EvalResult, RuntimeError, Value};

/// Installs the fixed built-in set into the global environment. Hosts add
/// their own callables through the same `define_native` contract.
pub fn install(interp: &mut Interpreter) {
    interp.define_native("out", -1, native_out);
    interp.define_native("input", -1, native_input);
    interp.define_native("len", 1, native_len);
    interp.define_native("pop", 1, native_pop);
    interp.define_native("type", 1, native_type);
    interp.define_native("clock", 0, native_clock);
    interp.define_native("clear", 0, native_clear);
    interp.define_native("exit", 1, native_exit);
}

/// `out`'s printable form: lists element-wise, nil as `null`, callables by
/// name, other composites opaquely.
pub fn value_to_string(v: &Value) -> String {
    match v {
        Value::Nil => "null".to_string(),
        Value::Number(n) => fmt_number(*n),
        Value::Bool(b) => b.to_string(),
        Value::Str(s) => s.to_string(),
        Value::List(items) => {
            let inner: Vec<String> = items.borrow().iter().map(value_to_string).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Callable(c) => format!("{:?}", c),
        Value::Map(_) | Value::Instance(_) => "<object>".to_string(),
    }
}

fn native_out(_interp: &mut Interpreter, args: &[Value]) -> EvalResult {
    let mut stdout = io::stdout();
    let line = args.iter().map(value_to_string).collect::<Vec<_>>().join(" ");
    writeln!(stdout, "{}", line)
        .and_then(|_| stdout.flush())
        .map_err(|e| RuntimeError::bare(ErrorKind::Type, e.to_string()))?;
    Ok(Value::Nil)
}

fn native_input(_interp: &mut Interpreter, args: &[Value]) -> EvalResult {
    if let Some(prompt) = args.first() {
        match prompt {
            Value::Str(s) => print!("{}", s),
            Value::Number(n) => print!("{}", fmt_number(*n)),
            _ => {}
        }
        let _ = io::stdout().flush();
    }

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() || line.is_empty() {
        return Ok(Value::Nil);
    }

    let s = line.trim();
    if s.is_empty() {
        return Ok(Value::string(""));
    }

    // Quoted input stays a string verbatim.
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        return Ok(Value::string(&s[1..s.len() - 1]));
    }

    match s.to_ascii_lowercase().as_str() {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        "null" | "nil" => return Ok(Value::Nil),
        _ => {}
    }

    if let Ok(n) = s.parse::<f64>() {
        return Ok(Value::Number(n));
    }

    Ok(Value::string(s))
}

fn native_len(_interp: &mut Interpreter, args: &[Value]) -> EvalResult {
    match &args[0] {
        Value::List(items) => Ok(Value::Number(items.borrow().len() as f64)),
        Value::Str(s) => Ok(Value::Number(s.chars().count() as f64)),
        Value::Map(env) => Ok(Value::Number(env.borrow().len() as f64)),
        _ => Err(RuntimeError::bare(
            ErrorKind::Type,
            "Argument to len() must be a list, string, or map.",
        )),
    }
}

fn native_pop(_interp: &mut Interpreter, args: &[Value]) -> EvalResult {
    match &args[0] {
        Value::List(items) => {
            let popped = items.borrow_mut().pop();
            popped.ok_or_else(|| {
                RuntimeError::bare(ErrorKind::Range, "Cannot pop from an empty list.")
            })
        }
        _ => Err(RuntimeError::bare(ErrorKind::Type, "Argument to pop() must be a list.")),
    }
}

fn native_type(_interp: &mut Interpreter, args: &[Value]) -> EvalResult {
    Ok(Value::string(args[0].type_name()))
}

fn native_clock(_interp: &mut Interpreter, _args: &[Value]) -> EvalResult {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| RuntimeError::bare(ErrorKind::Type, e.to_string()))?;
    Ok(Value::Number(now.as_secs_f64()))
}

fn native_clear(_interp: &mut Interpreter, _args: &[Value]) -> EvalResult {
    print!("\x1B[2J\x1B[1;1H");
    let _ = io::stdout().flush();
    Ok(Value::Nil)
}

fn native_exit(_interp: &mut Interpreter, args: &[Value]) -> EvalResult {
    let code = match &args[0] {
        Value::Number(n) => *n as i32,
        _ => 0,
    };
    std::process::exit(code);
}

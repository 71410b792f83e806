//! Runtime değerler (Value), eşitlik ve hata tipleri.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::environment::Environment;
use crate::object::Callable;
use crate::object::Instance;

pub type EvalResult = Result<Value, RuntimeError>;

/// Scalars are copied; lists, maps, callables and instances are shared by
/// reference, so mutation through any alias is visible to all holders.
#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Number(f64),
    Bool(bool),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    /// Maps and namespaces are both backed by an environment.
    Map(Rc<RefCell<Environment>>),
    Callable(Callable),
    Instance(Rc<RefCell<Instance>>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(Rc::from(s.into().as_str()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Tag name as reported by `type()` and used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "null",
            Value::Number(_) => "num",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Callable(_) => "func",
            Value::Instance(_) => "instance",
        }
    }

    /// Numeric coercion: numbers pass through, strings whose trimmed content
    /// parses fully as a double are accepted too.
    pub fn try_to_double(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    return None;
                }
                t.parse::<f64>().ok()
            }
            _ => None,
        }
    }
}

/// Structural equality: scalars by value, lists element-wise, maps,
/// callables and instances by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Callable(a), Value::Callable(b)) => a.same_identity(b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Printable form used by string concatenation and `panic`. Composites keep
/// the opaque bracket form; `out()` has its own element-wise printer.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Number(n) => write!(f, "{}", fmt_number(*n)),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(_) => write!(f, "[list]"),
            Value::Map(_) => write!(f, "[map]"),
            Value::Callable(_) => write!(f, "[func]"),
            Value::Instance(_) => write!(f, "[instance]"),
        }
    }
}

/// Numbers print without a trailing `.0` when they hold an integer.
pub fn fmt_number(n: f64) -> String {
    if n == n.trunc() && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Parse,
    Resolve,
    Math,
    Type,
    Name,
    Range,
    Panic,
}

impl ErrorKind {
    /// Tag matched by `fail NAME::Type` filters. Panics carry no tag, so a
    /// typed fail clause never consumes them.
    pub fn tag(self) -> &'static str {
        match self {
            ErrorKind::Lex => "LexError",
            ErrorKind::Parse => "ParseError",
            ErrorKind::Resolve => "ResolveError",
            ErrorKind::Math => "MathError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Name => "NameError",
            ErrorKind::Range => "RangeError",
            ErrorKind::Panic => "",
        }
    }
}

#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: u32,
    pub col: u32,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, line: u32, col: u32, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), line, col }
    }

    /// Errors raised inside native callables have no position; the call site
    /// stamps its own.
    pub fn bare(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, 0, 0, message)
    }

    pub fn is_panic(&self) -> bool {
        self.kind == ErrorKind::Panic
    }
}

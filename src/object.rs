//! Çağrılabilir nesne modeli: fonksiyon, native, sınıf, örnek.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::FunctionDecl;
use crate::environment::{EnvRef, Environment, Variable};
use crate::interpreter::Interpreter;
use crate::value::{EvalResult, Value};

pub type NativeFn = fn(&mut Interpreter, &[Value]) -> EvalResult;

/// Everything the call operator accepts. Identity comparison only.
#[derive(Clone)]
pub enum Callable {
    Function(Rc<Function>),
    Native(Rc<Native>),
    Class(Rc<Class>),
}

impl Callable {
    /// Minimum accepted argument count; `-1` means variadic.
    pub fn arity(&self) -> i32 {
        match self {
            Callable::Function(f) => f.decl.required_params() as i32,
            Callable::Native(n) => n.arity,
            Callable::Class(c) => c.find_method("init").map_or(0, |m| m.decl.required_params() as i32),
        }
    }

    /// Maximum accepted argument count (total declared parameters).
    pub fn max_arity(&self) -> i32 {
        match self {
            Callable::Function(f) => f.decl.params.len() as i32,
            Callable::Native(n) => n.arity,
            Callable::Class(c) => c.find_method("init").map_or(0, |m| m.decl.params.len() as i32),
        }
    }

    pub fn same_identity(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Function(a), Callable::Function(b)) => Rc::ptr_eq(a, b),
            (Callable::Native(a), Callable::Native(b)) => Rc::ptr_eq(a, b),
            (Callable::Class(a), Callable::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Function(fun) => write!(f, "<fn {}>", fun.decl.name),
            Callable::Native(n) => write!(f, "<native fn {}>", n.name),
            Callable::Class(c) => write!(f, "<class {}>", c.name),
        }
    }
}

/// A user function: declaration plus captured environment.
pub struct Function {
    pub decl: Rc<FunctionDecl>,
    pub closure: EnvRef,
    pub is_private: bool,
    pub is_initializer: bool,
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<fn {}>", self.decl.name)
    }
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<class {}>", self.name)
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<instance {}>", self.class.name)
    }
}

impl Function {
    pub fn new(decl: Rc<FunctionDecl>, closure: EnvRef, is_private: bool) -> Rc<Self> {
        Rc::new(Self { decl, closure, is_private, is_initializer: false })
    }

    /// Produces a copy whose closure extends the original with `this` bound
    /// to the given instance.
    pub fn bind(&self, instance: &Rc<std::cell::RefCell<Instance>>) -> Rc<Function> {
        let env = Environment::with_enclosing(&self.closure);
        env.borrow_mut().define_value("this", Value::Instance(instance.clone()));
        Rc::new(Function {
            decl: self.decl.clone(),
            closure: env,
            is_private: self.is_private,
            is_initializer: self.decl.name == "init",
        })
    }
}

/// A host-registered callable. `arity == -1` denotes variadic.
pub struct Native {
    pub name: &'static str,
    pub arity: i32,
    pub f: NativeFn,
}

pub struct Class {
    pub name: String,
    pub methods: HashMap<String, Rc<Function>>,
    pub field_blueprints: HashMap<String, Variable>,
    pub superclass: Option<Rc<Class>>,
}

impl Class {
    /// Inherited blueprints not overridden locally are merged in here, so
    /// instance construction never has to walk the superclass chain.
    pub fn new(
        name: String,
        methods: HashMap<String, Rc<Function>>,
        mut field_blueprints: HashMap<String, Variable>,
        superclass: Option<Rc<Class>>,
    ) -> Rc<Self> {
        if let Some(parent) = &superclass {
            for (key, var) in &parent.field_blueprints {
                if !field_blueprints.contains_key(key) {
                    field_blueprints.insert(key.clone(), var.clone());
                }
            }
        }
        Rc::new(Self { name, methods, field_blueprints, superclass })
    }

    /// Local override first, else the superclass definition.
    pub fn find_method(&self, name: &str) -> Option<Rc<Function>> {
        if let Some(m) = self.methods.get(name) {
            return Some(m.clone());
        }
        self.superclass.as_ref().and_then(|s| s.find_method(name))
    }

    /// True when `other` is this class or one of its ancestors.
    pub fn descends_from(self: &Rc<Self>, other: &Rc<Class>) -> bool {
        let mut k = Some(self.clone());
        while let Some(c) = k {
            if Rc::ptr_eq(&c, other) {
                return true;
            }
            k = c.superclass.clone();
        }
        false
    }
}

/// A runtime object: class reference plus per-instance cell table,
/// initialised from the class's field blueprints.
pub struct Instance {
    pub class: Rc<Class>,
    pub fields: HashMap<String, Variable>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Rc<std::cell::RefCell<Self>> {
        let fields = class.field_blueprints.clone();
        Rc::new(std::cell::RefCell::new(Self { class, fields }))
    }
}

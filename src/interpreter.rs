//! AST-walking interpreter.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::debug;

use crate::ast::*;
use crate::environment::{ancestor, EnvRef, Environment, Variable};
use crate::module_loader;
use crate::native;
use crate::object::{Callable, Class, Function, Instance, Native, NativeFn};
use crate::resolver::Resolver;
use crate::syntax_analyzer::{Lexer, Parser};
use crate::value::{ErrorKind, EvalResult, RuntimeError, Value};

/// Control-flow signal carried up the statement walk.
#[derive(Clone, Debug)]
pub enum Flow {
    Next,
    Stop,
    Skip,
    Return(Value),
}

pub struct Interpreter {
    environment: EnvRef,
    globals: EnvRef,
    /// Resolver annotations, keyed by node id; accumulated across runs.
    locals: HashMap<NodeId, i32>,
    /// User-declared type-alias names, shared with every parser instance.
    pub type_aliases: AliasSet,
    node_ids: NodeIdGen,
    loaded_modules: HashSet<String>,
    pub had_error: bool,
}

const CONCRETE_TYPES: [&str; 5] = ["num", "string", "bool", "list", "map"];

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Environment::new();
        let mut interp = Self {
            environment: globals.clone(),
            globals,
            locals: HashMap::new(),
            type_aliases: Rc::new(std::cell::RefCell::new(HashSet::new())),
            node_ids: NodeIdGen::new(),
            loaded_modules: HashSet::new(),
            had_error: false,
        };
        native::install(&mut interp);
        interp
    }

    /// Registration contract for host-provided callables; `arity == -1`
    /// denotes variadic.
    pub fn define_native(&mut self, name: &'static str, arity: i32, f: NativeFn) {
        let native = Callable::Native(Rc::new(Native { name, arity, f }));
        self.globals.borrow_mut().define_value(name, Value::Callable(native));
    }

    /// A global's current value, for hosts and tests.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get_var(name).map(|v| v.value)
    }

    pub fn add_locals(&mut self, locals: HashMap<NodeId, i32>) {
        self.locals.extend(locals);
    }

    pub fn node_ids(&self) -> NodeIdGen {
        self.node_ids.clone()
    }

    /// Executes a resolved compilation unit in the global scope.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        for stmt in statements {
            match self.exec(stmt)? {
                Flow::Next => {}
                Flow::Return(_) => {
                    return Err(RuntimeError::new(
                        ErrorKind::Type,
                        stmt.line,
                        stmt.col,
                        "Cannot use 'return' outside of a function.",
                    ));
                }
                Flow::Stop => {
                    return Err(RuntimeError::new(
                        ErrorKind::Type,
                        stmt.line,
                        stmt.col,
                        "Cannot use 'stop' outside of a loop.",
                    ));
                }
                Flow::Skip => {
                    return Err(RuntimeError::new(
                        ErrorKind::Type,
                        stmt.line,
                        stmt.col,
                        "Cannot use 'skip' outside of a loop.",
                    ));
                }
            }
        }
        Ok(())
    }

    // ----- statements -----

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        match &stmt.node {
            StmtKind::Expression(e) => {
                self.eval(e)?;
                Ok(Flow::Next)
            }
            StmtKind::Var(decl) => self.exec_var(decl, stmt.line, stmt.col),
            StmtKind::Function(decl) => {
                let function = Function::new(decl.clone(), self.environment.clone(), decl.is_private);
                self.environment
                    .borrow_mut()
                    .define_value(decl.name.clone(), Value::Callable(Callable::Function(function)));
                Ok(Flow::Next)
            }
            StmtKind::Class(decl) => self.exec_class(decl),
            StmtKind::Return(value) => {
                let v = match value {
                    Some(e) => self.eval(e)?,
                    None => Value::Nil,
                };
                Ok(Flow::Return(v))
            }
            StmtKind::If { cond, then_b, else_b } => {
                if self.eval(cond)?.is_truthy() {
                    self.exec(then_b)
                } else if let Some(e) = else_b {
                    self.exec(e)
                } else {
                    Ok(Flow::Next)
                }
            }
            StmtKind::While { cond, body } => {
                while self.eval(cond)?.is_truthy() {
                    match self.exec(body)? {
                        Flow::Next | Flow::Skip => {}
                        Flow::Stop => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Next)
            }
            StmtKind::For { init, cond, step, body } => {
                let loop_env = Environment::with_enclosing(&self.environment);
                let prev = std::mem::replace(&mut self.environment, loop_env);
                let result = self.run_for(init.as_deref(), cond, step.as_ref(), body);
                self.environment = prev;
                result
            }
            StmtKind::Foreach { name, constraint, iterable, body } => {
                self.exec_foreach(name, constraint.as_deref(), iterable, body, stmt)
            }
            StmtKind::Block(body) => {
                let env = Environment::with_enclosing(&self.environment);
                self.exec_block(body, env)
            }
            StmtKind::Namespace { name, body } => {
                let ns_env = Environment::with_enclosing(&self.environment);
                let flow = self.exec_block(body, ns_env.clone())?;
                if matches!(flow, Flow::Next) {
                    self.environment.borrow_mut().define_value(name.clone(), Value::Map(ns_env));
                }
                Ok(flow)
            }
            StmtKind::Import(module) => self.exec_import(module),
            StmtKind::Alias { target, name } => {
                match target {
                    AliasTarget::Type(ty) => {
                        self.environment.borrow_mut().define_type_alias(name.clone(), ty.clone());
                        self.type_aliases.borrow_mut().insert(name.clone());
                    }
                    AliasTarget::Value(expr) => {
                        let value = self.eval(expr)?;
                        self.environment.borrow_mut().define_value(name.clone(), value);
                    }
                }
                Ok(Flow::Next)
            }
            StmtKind::Attempt(attempt) => self.exec_attempt(attempt),
            StmtKind::Panic(message) => {
                let text = match message {
                    Some(e) => self.eval(e)?.to_string(),
                    None => String::new(),
                };
                Err(RuntimeError::new(ErrorKind::Panic, stmt.line, stmt.col, text))
            }
            StmtKind::Stop => Ok(Flow::Stop),
            StmtKind::Skip => Ok(Flow::Skip),
        }
    }

    /// Runs statements in the given scope, restoring the previous scope on
    /// every exit path.
    fn exec_block(&mut self, statements: &[Stmt], env: EnvRef) -> Result<Flow, RuntimeError> {
        let prev = std::mem::replace(&mut self.environment, env);
        let mut flow = Flow::Next;
        for stmt in statements {
            match self.exec(stmt) {
                Ok(Flow::Next) => {}
                Ok(f) => {
                    flow = f;
                    break;
                }
                Err(e) => {
                    self.environment = prev;
                    return Err(e);
                }
            }
        }
        self.environment = prev;
        Ok(flow)
    }

    fn run_for(
        &mut self,
        init: Option<&Stmt>,
        cond: &Expr,
        step: Option<&Expr>,
        body: &Stmt,
    ) -> Result<Flow, RuntimeError> {
        if let Some(i) = init {
            self.exec(i)?;
        }
        while self.eval(cond)?.is_truthy() {
            match self.exec(body)? {
                Flow::Next | Flow::Skip => {}
                Flow::Stop => break,
                ret @ Flow::Return(_) => return Ok(ret),
            }
            if let Some(s) = step {
                self.eval(s)?;
            }
        }
        Ok(Flow::Next)
    }

    fn exec_foreach(
        &mut self,
        name: &str,
        constraint: Option<&str>,
        iterable: &Expr,
        body: &Stmt,
        stmt: &Stmt,
    ) -> Result<Flow, RuntimeError> {
        let collection = self.eval(iterable)?;
        let list = match collection {
            Value::List(l) => l,
            other => {
                return Err(RuntimeError::new(
                    ErrorKind::Type,
                    stmt.line,
                    stmt.col,
                    format!("The 'foreach' loop requires a list, got {}.", describe(&other)),
                ));
            }
        };

        let mut index = 0usize;
        loop {
            let item = {
                let items = list.borrow();
                if index >= items.len() {
                    break;
                }
                items[index].clone()
            };
            index += 1;

            if let Some(c) = constraint {
                check_type(stmt.line, stmt.col, c, &item)?;
            }
            let loop_env = Environment::with_enclosing(&self.environment);
            loop_env.borrow_mut().define(
                name,
                Variable {
                    value: item,
                    is_private: false,
                    constraint: constraint.map(str::to_string),
                },
            );
            match self.exec_block(std::slice::from_ref(body), loop_env)? {
                Flow::Next | Flow::Skip => {}
                Flow::Stop => break,
                ret @ Flow::Return(_) => return Ok(ret),
            }
        }
        Ok(Flow::Next)
    }

    fn exec_var(&mut self, decl: &VarDecl, line: u32, col: u32) -> Result<Flow, RuntimeError> {
        let constraint = self.resolve_declared_type(decl);

        let value = match &decl.init {
            Some(e) => self.eval(e)?,
            None => Value::Nil,
        };

        if !constraint.is_empty() {
            check_type(line, col, &constraint, &value)?;
        }

        self.environment.borrow_mut().define(
            decl.name.clone(),
            Variable {
                value,
                is_private: decl.is_private,
                constraint: if constraint.is_empty() { None } else { Some(constraint) },
            },
        );
        Ok(Flow::Next)
    }

    /// Declaration prefix -> concrete constraint name (empty for none).
    fn resolve_declared_type(&self, decl: &VarDecl) -> String {
        if decl.type_name == "data" {
            return decl.inner_type.clone().unwrap_or_default();
        }
        if let Some(ns) = &decl.type_namespace {
            // `NS.ALIAS NAME`: the alias table of the namespace decides.
            if let Some(Value::Map(map)) = self.environment.borrow().get(ns) {
                if let Some(target) = map.borrow().get_type_alias(&decl.type_name) {
                    return target;
                }
            }
            return String::new();
        }
        if let Some(inner) = &decl.inner_type {
            // `ALIAS::TYPE NAME`: the concrete suffix wins.
            return inner.clone();
        }
        self.environment
            .borrow()
            .get_type_alias(&decl.type_name)
            .unwrap_or_default()
    }

    fn exec_class(&mut self, decl: &ClassDecl) -> Result<Flow, RuntimeError> {
        let mut superclass = None;
        let mut super_value = Value::Nil;
        if let Some(sexpr) = &decl.superclass {
            let v = self.eval(sexpr)?;
            match &v {
                Value::Callable(Callable::Class(c)) => superclass = Some(c.clone()),
                _ => {
                    return Err(RuntimeError::new(
                        ErrorKind::Type,
                        sexpr.line,
                        sexpr.col,
                        "Superclass must be a class.",
                    ));
                }
            }
            super_value = v;
        }

        // Methods close over an environment that exposes `parent` when the
        // class has a superclass.
        let method_env = if superclass.is_some() {
            let env = Environment::with_enclosing(&self.environment);
            env.borrow_mut().define_value("parent", super_value);
            env
        } else {
            self.environment.clone()
        };

        let mut blueprints = HashMap::new();
        for field in &decl.fields {
            let constraint = self.resolve_declared_type(field);
            let value = match &field.init {
                Some(e) => self.eval(e)?,
                None => Value::Nil,
            };
            if !constraint.is_empty() {
                check_type(field.line, field.col, &constraint, &value)?;
            }
            blueprints.insert(
                field.name.clone(),
                Variable {
                    value,
                    is_private: field.is_private,
                    constraint: if constraint.is_empty() { None } else { Some(constraint) },
                },
            );
        }

        let mut methods = HashMap::new();
        for method in &decl.methods {
            let function = Function::new(method.clone(), method_env.clone(), method.is_private);
            methods.insert(method.name.clone(), function);
        }

        let class = Class::new(decl.name.clone(), methods, blueprints, superclass);
        self.environment
            .borrow_mut()
            .define_value(decl.name.clone(), Value::Callable(Callable::Class(class)));
        Ok(Flow::Next)
    }

    fn exec_attempt(&mut self, attempt: &AttemptStmt) -> Result<Flow, RuntimeError> {
        let attempt_env = Environment::with_enclosing(&self.environment);
        let body_result = self.exec_block(&attempt.body, attempt_env);

        let outcome = match body_result {
            Ok(flow) => Ok(flow),
            Err(err) => {
                let caught = attempt.fail.as_ref().map_or(false, |f| match &f.filter {
                    None => true,
                    Some(filter) => err.kind.tag() == filter.as_str(),
                });
                if caught {
                    let fail = attempt.fail.as_ref().expect("caught implies a fail clause");
                    let fail_env = Environment::with_enclosing(&self.environment);
                    fail_env
                        .borrow_mut()
                        .define_value(fail.name.clone(), Value::string(err.message.clone()));
                    self.exec_block(&fail.body, fail_env)
                } else {
                    Err(err)
                }
            }
        };

        // The finally body runs exactly once on every path: normal
        // completion, consumed error, and before a re-raise propagates.
        if !attempt.finally.is_empty() {
            let finally_env = Environment::with_enclosing(&self.environment);
            match self.exec_block(&attempt.finally, finally_env) {
                Ok(Flow::Next) => {}
                Ok(flow) => return Ok(flow),
                Err(e) => return Err(e),
            }
        }

        outcome
    }

    fn exec_import(&mut self, module: &str) -> Result<Flow, RuntimeError> {
        if module.contains('*') {
            let folder = module[..module.find('*').unwrap()]
                .trim_end_matches(|c| c == '/' || c == '\\')
                .to_string();
            match module_loader::load_directory(&folder) {
                Ok(files) => {
                    for (path, source) in files {
                        debug!("importing {} from wildcard '{}'", path.display(), module);
                        self.run_module(&source)?;
                    }
                }
                Err(e) => eprintln!("{}", e),
            }
            return Ok(Flow::Next);
        }

        // Already-imported modules are skipped.
        if self.loaded_modules.contains(module) {
            debug!("module '{}' already loaded", module);
            return Ok(Flow::Next);
        }
        self.loaded_modules.insert(module.to_string());

        match module_loader::load_module(module) {
            Ok(source) => self.run_module(&source)?,
            Err(e) => eprintln!("{}", e),
        }
        Ok(Flow::Next)
    }

    /// Parses, resolves and executes module source in the global scope.
    /// A syntax error in a module is reported without bringing the engine
    /// down; resolve and runtime errors propagate to the caller.
    fn run_module(&mut self, source: &str) -> Result<(), RuntimeError> {
        let tokens = match Lexer::scan(source) {
            Ok(t) => t,
            Err(errors) => {
                for e in errors {
                    eprintln!("Error{}: {}", e.location(), e.message);
                }
                return Ok(());
            }
        };
        let statements =
            match Parser::new(tokens, self.type_aliases.clone(), self.node_ids.clone()).parse() {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Error{}: {}", e.location(), e.message);
                    return Ok(());
                }
            };

        let mut resolver = Resolver::new();
        self.add_locals(resolver.resolve(&statements)?);

        // Modules contribute to global state.
        let prev = std::mem::replace(&mut self.environment, self.globals.clone());
        let mut result = Ok(());
        for stmt in &statements {
            if let Err(e) = self.exec(stmt) {
                result = Err(e);
                break;
            }
        }
        self.environment = prev;
        result
    }

    // ----- expressions -----

    pub fn eval(&mut self, expr: &Expr) -> EvalResult {
        match &expr.node {
            ExprKind::Literal(lit) => Ok(match lit {
                Literal::Nil => Value::Nil,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::Str(s) => Value::string(s.clone()),
            }),
            ExprKind::Grouping(inner) => self.eval(inner),
            ExprKind::Variable(name) => self.lookup_variable(expr, name),
            ExprKind::This => self
                .environment
                .borrow()
                .get("this")
                .ok_or_else(|| name_error(expr.line, expr.col, "this")),
            ExprKind::Assign { name, value } => self.eval_assign(expr, name, value),
            ExprKind::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                self.eval_binary(*op, l, r, expr.line, expr.col)
            }
            ExprKind::Logical { op, left, right } => {
                let left_truthy = self.eval(left)?.is_truthy();
                match op {
                    LogicalOp::And => {
                        if !left_truthy {
                            return Ok(Value::Bool(false));
                        }
                        Ok(Value::Bool(self.eval(right)?.is_truthy()))
                    }
                    LogicalOp::Or => {
                        if left_truthy {
                            return Ok(Value::Bool(true));
                        }
                        Ok(Value::Bool(self.eval(right)?.is_truthy()))
                    }
                }
            }
            ExprKind::Unary { op, inner } => {
                let v = self.eval(inner)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                    UnaryOp::Neg => match v {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => Err(RuntimeError::new(
                            ErrorKind::Type,
                            expr.line,
                            expr.col,
                            format!("Operand must be a number, got {}.", describe(&other)),
                        )),
                    },
                    UnaryOp::BitNot => match v {
                        Value::Number(n) => Ok(Value::Number(!(n as i64) as f64)),
                        other => Err(RuntimeError::new(
                            ErrorKind::Type,
                            expr.line,
                            expr.col,
                            format!("Operand must be a number, got {}.", describe(&other)),
                        )),
                    },
                }
            }
            ExprKind::Prefix { op, target } => self.eval_step(*op, target, expr, true),
            ExprKind::Postfix { op, target } => self.eval_step(*op, target, expr, false),
            ExprKind::Range { lo, hi } => {
                let start = self.eval(lo)?;
                let end = self.eval(hi)?;
                let (Some(start), Some(end)) = (start.try_to_double(), end.try_to_double()) else {
                    return Err(RuntimeError::new(
                        ErrorKind::Type,
                        expr.line,
                        expr.col,
                        "Range bounds must be numbers.",
                    ));
                };
                let mut items = Vec::new();
                if start <= end {
                    let mut i = start;
                    while i <= end {
                        items.push(Value::Number(i));
                        i += 1.0;
                    }
                } else {
                    let mut i = start;
                    while i >= end {
                        items.push(Value::Number(i));
                        i -= 1.0;
                    }
                }
                Ok(Value::list(items))
            }
            ExprKind::Call { callee, args } => {
                let callee_value = self.eval(callee)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval(arg)?);
                }
                match callee_value {
                    Value::Callable(c) => self.call_callable(&c, &arg_values, expr.line, expr.col),
                    _ => Err(RuntimeError::new(
                        ErrorKind::Type,
                        expr.line,
                        expr.col,
                        "Can only call functions and classes.",
                    )),
                }
            }
            ExprKind::Index { object, index } => self.eval_index(object, index, expr),
            ExprKind::Get { object, name } => self.eval_get(object, name, expr),
            ExprKind::Set { object, name, value } => self.eval_set(object, name, value, expr),
            ExprKind::IndexSet { object, index, value } => {
                self.eval_index_set(object, index, value, expr)
            }
            ExprKind::ListLiteral(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for e in elements {
                    items.push(self.eval(e)?);
                }
                Ok(Value::list(items))
            }
            ExprKind::MapLiteral(pairs) => {
                let map = Environment::new();
                for (key_expr, value_expr) in pairs {
                    let key = self.eval(key_expr)?;
                    let Value::Str(key) = key else {
                        return Err(RuntimeError::new(
                            ErrorKind::Type,
                            expr.line,
                            expr.col,
                            "Map keys must be strings.",
                        ));
                    };
                    let value = self.eval(value_expr)?;
                    map.borrow_mut().define_value(key.to_string(), value);
                }
                Ok(Value::Map(map))
            }
        }
    }

    fn lookup_variable(&self, expr: &Expr, name: &str) -> EvalResult {
        match self.locals.get(&expr.id) {
            Some(&distance) if distance >= 0 => {
                let scope = ancestor(&self.environment, distance as usize);
                let cell = scope
                    .borrow()
                    .get_local_var(name)
                    .ok_or_else(|| name_error(expr.line, expr.col, name))?;
                if cell.is_private && !self.environment.borrow().has(name) {
                    return Err(private_error(expr.line, expr.col, name));
                }
                Ok(cell.value)
            }
            _ => self
                .globals
                .borrow()
                .get(name)
                .ok_or_else(|| name_error(expr.line, expr.col, name)),
        }
    }

    fn eval_assign(&mut self, expr: &Expr, name: &str, value_expr: &Expr) -> EvalResult {
        let value = self.eval(value_expr)?;

        match self.locals.get(&expr.id) {
            Some(&distance) if distance >= 0 => {
                let scope = ancestor(&self.environment, distance as usize);
                let cell = scope
                    .borrow()
                    .get_local_var(name)
                    .ok_or_else(|| name_error(expr.line, expr.col, name))?;
                if let Some(constraint) = &cell.constraint {
                    check_type(expr.line, expr.col, constraint, &value)?;
                }
                if cell.is_private && !self.environment.borrow().has(name) {
                    return Err(private_error(expr.line, expr.col, name));
                }
                scope.borrow_mut().set_local(name, value.clone());
            }
            _ => {
                // Globals keep their cell: flags and constraint survive.
                let cell = self
                    .globals
                    .borrow()
                    .get_local_var(name)
                    .ok_or_else(|| name_error(expr.line, expr.col, name))?;
                if let Some(constraint) = &cell.constraint {
                    check_type(expr.line, expr.col, constraint, &value)?;
                }
                self.globals.borrow_mut().set_local(name, value.clone());
            }
        }
        Ok(value)
    }

    /// Shared body of prefix and postfix `++`/`--`.
    fn eval_step(&mut self, op: StepOp, target: &Expr, expr: &Expr, prefix: bool) -> EvalResult {
        let ExprKind::Variable(name) = &target.node else {
            return Err(RuntimeError::new(
                ErrorKind::Type,
                expr.line,
                expr.col,
                "Target must be a variable.",
            ));
        };

        let current = self
            .environment
            .borrow()
            .get(name)
            .ok_or_else(|| name_error(expr.line, expr.col, name))?;
        let Value::Number(old) = current else {
            return Err(RuntimeError::new(
                ErrorKind::Type,
                expr.line,
                expr.col,
                format!("Target must be a number, got {}.", describe(&current)),
            ));
        };

        let new = match op {
            StepOp::Inc => old + 1.0,
            StepOp::Dec => old - 1.0,
        };
        self.environment.borrow_mut().assign(name, Value::Number(new));
        Ok(Value::Number(if prefix { new } else { old }))
    }

    fn eval_binary(&mut self, op: BinOp, l: Value, r: Value, line: u32, col: u32) -> EvalResult {
        match op {
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => {
                let (Value::Number(a), Value::Number(b)) = (&l, &r) else {
                    return Err(RuntimeError::new(
                        ErrorKind::Type,
                        line,
                        col,
                        "Operands must be numbers.",
                    ));
                };
                let (a, b) = (*a as i64, *b as i64);
                let result = match op {
                    BinOp::BitAnd => a & b,
                    BinOp::BitOr => a | b,
                    _ => a ^ b,
                };
                return Ok(Value::Number(result as f64));
            }
            BinOp::Shl | BinOp::Shr => {
                let (Value::Number(a), Value::Number(b)) = (&l, &r) else {
                    return Err(RuntimeError::new(
                        ErrorKind::Type,
                        line,
                        col,
                        "Operands must be numbers.",
                    ));
                };
                let dist = *b as i64;
                // Shift distances outside [0, 63] yield 0.
                if !(0..64).contains(&dist) {
                    return Ok(Value::Number(0.0));
                }
                let a = *a as i64;
                let result = if op == BinOp::Shl { a << dist } else { a >> dist };
                return Ok(Value::Number(result as f64));
            }
            _ => {}
        }

        if op == BinOp::Add {
            // Left list: concatenate another list, or append a scalar.
            if let Value::List(old) = &l {
                let mut items = old.borrow().clone();
                match &r {
                    Value::List(other) => items.extend(other.borrow().iter().cloned()),
                    scalar => items.push(scalar.clone()),
                }
                return Ok(Value::list(items));
            }
            // Either side a string: concatenation of printable forms.
            if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) {
                return Ok(Value::string(format!("{}{}", l, r)));
            }
        }

        if op == BinOp::Sub {
            // Left list: a new list with the right operand's elements removed.
            if let Value::List(old) = &l {
                let items: Vec<Value> = match &r {
                    Value::List(other) => {
                        let other = other.borrow();
                        old.borrow()
                            .iter()
                            .filter(|item| !other.iter().any(|o| o == *item))
                            .cloned()
                            .collect()
                    }
                    scalar => old.borrow().iter().filter(|item| *item != scalar).cloned().collect(),
                };
                return Ok(Value::list(items));
            }
        }

        if let (Some(a), Some(b)) = (l.try_to_double(), r.try_to_double()) {
            return match op {
                BinOp::Add => Ok(Value::Number(a + b)),
                BinOp::Sub => Ok(Value::Number(a - b)),
                BinOp::Mul => Ok(Value::Number(a * b)),
                BinOp::Div => {
                    if b == 0.0 {
                        Err(RuntimeError::new(ErrorKind::Math, line, col, "Cannot divide by zero."))
                    } else {
                        Ok(Value::Number(a / b))
                    }
                }
                BinOp::Rem => {
                    if b == 0.0 {
                        Err(RuntimeError::new(
                            ErrorKind::Math,
                            line,
                            col,
                            "Cannot take a remainder of a division by zero.",
                        ))
                    } else {
                        Ok(Value::Number(a % b))
                    }
                }
                BinOp::Gt => Ok(Value::Bool(a > b)),
                BinOp::Ge => Ok(Value::Bool(a >= b)),
                BinOp::Lt => Ok(Value::Bool(a < b)),
                BinOp::Le => Ok(Value::Bool(a <= b)),
                BinOp::Eq => Ok(Value::Bool(a == b)),
                BinOp::Ne => Ok(Value::Bool(a != b)),
                _ => unreachable!("bitwise handled above"),
            };
        }

        match op {
            BinOp::Eq => return Ok(Value::Bool(l == r)),
            BinOp::Ne => return Ok(Value::Bool(l != r)),
            BinOp::Mul => {
                // String and list repetition with a non-negative integer.
                if let (Value::Str(s), Value::Number(n)) = (&l, &r) {
                    if *n >= 0.0 {
                        return Ok(Value::string(s.repeat(*n as usize)));
                    }
                }
                if let (Value::List(items), Value::Number(n)) = (&l, &r) {
                    if *n >= 0.0 {
                        let items = items.borrow();
                        let mut out = Vec::with_capacity(items.len() * (*n as usize));
                        for _ in 0..*n as usize {
                            out.extend(items.iter().cloned());
                        }
                        return Ok(Value::list(out));
                    }
                }
            }
            _ => {}
        }

        Err(RuntimeError::new(
            ErrorKind::Type,
            line,
            col,
            "Operands must be numbers or matching types.",
        ))
    }

    fn eval_index(&mut self, object: &Expr, index: &Expr, expr: &Expr) -> EvalResult {
        let obj = self.eval(object)?;
        let idx = self.eval(index)?;

        match obj {
            Value::List(list) => {
                let Value::Number(n) = idx else {
                    return Err(RuntimeError::new(
                        ErrorKind::Range,
                        expr.line,
                        expr.col,
                        "Index must be a number.",
                    ));
                };
                let list = list.borrow();
                let i = n as i64;
                if i < 0 || i as usize >= list.len() {
                    return Err(RuntimeError::new(
                        ErrorKind::Range,
                        expr.line,
                        expr.col,
                        "Index out of bounds.",
                    ));
                }
                Ok(list[i as usize].clone())
            }
            Value::Map(map) => {
                let Value::Str(key) = idx else {
                    return Err(RuntimeError::new(
                        ErrorKind::Range,
                        expr.line,
                        expr.col,
                        "Index must be a string.",
                    ));
                };
                map.borrow().get(&key).ok_or_else(|| {
                    RuntimeError::new(
                        ErrorKind::Name,
                        expr.line,
                        expr.col,
                        format!("Undefined property '{}'.", key),
                    )
                })
            }
            other => Err(RuntimeError::new(
                ErrorKind::Type,
                expr.line,
                expr.col,
                format!("Only lists and maps can be indexed, got {}.", describe(&other)),
            )),
        }
    }

    fn eval_index_set(
        &mut self,
        object: &Expr,
        index: &Expr,
        value: &Expr,
        expr: &Expr,
    ) -> EvalResult {
        let obj = self.eval(object)?;
        let idx = self.eval(index)?;
        let value = self.eval(value)?;

        match obj {
            Value::Map(map) => {
                let Value::Str(key) = idx else {
                    return Err(RuntimeError::new(
                        ErrorKind::Range,
                        expr.line,
                        expr.col,
                        "Map index must be a string.",
                    ));
                };
                // Creates the key when it does not exist yet.
                map.borrow_mut().define_value(key.to_string(), value.clone());
                Ok(value)
            }
            Value::List(list) => {
                let Value::Number(n) = idx else {
                    return Err(RuntimeError::new(
                        ErrorKind::Range,
                        expr.line,
                        expr.col,
                        "List index must be a number.",
                    ));
                };
                let mut list = list.borrow_mut();
                let i = n as i64;
                if i < 0 || i as usize >= list.len() {
                    return Err(RuntimeError::new(
                        ErrorKind::Range,
                        expr.line,
                        expr.col,
                        "Index out of bounds.",
                    ));
                }
                list[i as usize] = value.clone();
                Ok(value)
            }
            _ => Err(RuntimeError::new(
                ErrorKind::Type,
                expr.line,
                expr.col,
                "Only lists and maps support indexed assignment.",
            )),
        }
    }

    fn eval_get(&mut self, object: &Expr, name: &str, expr: &Expr) -> EvalResult {
        let obj = self.eval(object)?;

        match &obj {
            Value::Map(env) => {
                if let Some(value) = env.borrow().get(name) {
                    return Ok(value);
                }
                if let Some(target) = env.borrow().get_type_alias(name) {
                    return Ok(Value::string(target));
                }
            }
            Value::Instance(instance) => {
                let cell = instance_member(instance, name).ok_or_else(|| {
                    RuntimeError::new(
                        ErrorKind::Name,
                        expr.line,
                        expr.col,
                        format!("Undefined property '{}'.", name),
                    )
                })?;
                if cell.is_private && !self.is_internal_access(instance) {
                    return Err(private_error(expr.line, expr.col, name));
                }
                return Ok(cell.value);
            }
            Value::Callable(Callable::Class(class)) => {
                if let Some(method) = class.find_method(name) {
                    // Accessing a method through the class token from inside
                    // a subclass method binds `this` to the current
                    // instance; this is how `parent.method()` works.
                    if let Some(Value::Instance(inst)) = self.environment.borrow().get("this") {
                        if inst.borrow().class.descends_from(class) {
                            return Ok(Value::Callable(Callable::Function(method.bind(&inst))));
                        }
                    }
                    return Ok(Value::Callable(Callable::Function(method)));
                }
            }
            _ => {
                return Err(RuntimeError::new(
                    ErrorKind::Type,
                    expr.line,
                    expr.col,
                    "Only modules and objects have properties.",
                ));
            }
        }

        Err(RuntimeError::new(
            ErrorKind::Name,
            expr.line,
            expr.col,
            format!("Undefined property '{}'.", name),
        ))
    }

    fn eval_set(&mut self, object: &Expr, name: &str, value: &Expr, expr: &Expr) -> EvalResult {
        let obj = self.eval(object)?;
        let value = self.eval(value)?;

        match &obj {
            Value::Instance(instance) => {
                let cell = instance_member(instance, name).ok_or_else(|| {
                    RuntimeError::new(
                        ErrorKind::Name,
                        expr.line,
                        expr.col,
                        format!("Undefined property '{}'.", name),
                    )
                })?;
                if cell.is_private && !self.is_internal_access(instance) {
                    return Err(private_error(expr.line, expr.col, name));
                }
                if let Some(constraint) = &cell.constraint {
                    check_type(expr.line, expr.col, constraint, &value)?;
                }
                instance.borrow_mut().fields.insert(
                    name.to_string(),
                    Variable {
                        value: value.clone(),
                        is_private: cell.is_private,
                        constraint: cell.constraint,
                    },
                );
                Ok(value)
            }
            Value::Map(env) => {
                // Property assignment defines new cells in a namespace.
                env.borrow_mut().define_value(name.to_string(), value.clone());
                Ok(value)
            }
            _ => Err(RuntimeError::new(
                ErrorKind::Type,
                expr.line,
                expr.col,
                "Only modules and objects have properties.",
            )),
        }
    }

    // ----- calls -----

    pub fn call_callable(
        &mut self,
        callable: &Callable,
        args: &[Value],
        line: u32,
        col: u32,
    ) -> EvalResult {
        let min = callable.arity();
        let max = callable.max_arity();
        if min != -1 {
            let n = args.len() as i32;
            if n < min || n > max {
                let message = if min == max {
                    format!("Expected {} arguments but got {}.", min, n)
                } else {
                    format!("Expected between {} and {} arguments but got {}.", min, max, n)
                };
                return Err(RuntimeError::new(ErrorKind::Type, line, col, message));
            }
        }

        match callable {
            Callable::Native(native) => (native.f)(self, args).map_err(|mut e| {
                if e.line == 0 {
                    e.line = line;
                    e.col = col;
                }
                e
            }),
            Callable::Function(function) => self.call_function(function, args),
            Callable::Class(class) => {
                let instance = Instance::new(class.clone());
                if let Some(init) = class.find_method("init") {
                    let bound = init.bind(&instance);
                    self.call_function(&bound, args)?;
                }
                Ok(Value::Instance(instance))
            }
        }
    }

    fn call_function(&mut self, function: &Function, args: &[Value]) -> EvalResult {
        let frame = Environment::with_enclosing(&function.closure);
        let prev = std::mem::replace(&mut self.environment, frame);
        let result = self.run_function_body(function, args);
        self.environment = prev;
        let value = result?;

        if let Some(alias) = &function.decl.return_type {
            let constraint = self.resolve_return_type(function, alias);
            if !constraint.is_empty() {
                check_type(function.decl.line, function.decl.col, &constraint, &value)?;
            }
        }

        if function.is_initializer {
            if let Some(this) = function.closure.borrow().get_local_var("this") {
                return Ok(this.value);
            }
        }
        Ok(value)
    }

    /// Binds parameters (defaults evaluate in the fresh call frame, so they
    /// can see earlier parameters) and runs the body.
    fn run_function_body(&mut self, function: &Function, args: &[Value]) -> EvalResult {
        for (i, param) in function.decl.params.iter().enumerate() {
            let value = if i < args.len() {
                args[i].clone()
            } else if let Some(default) = &param.default {
                self.eval(default)?
            } else {
                Value::Nil
            };
            self.environment.borrow_mut().define_value(param.name.clone(), value);
        }

        let mut result = Value::Nil;
        for stmt in &function.decl.body {
            match self.exec(stmt)? {
                Flow::Next => {}
                Flow::Return(v) => {
                    result = v;
                    break;
                }
                Flow::Stop | Flow::Skip => {
                    return Err(RuntimeError::new(
                        ErrorKind::Type,
                        stmt.line,
                        stmt.col,
                        "Cannot use 'stop' or 'skip' outside of a loop.",
                    ));
                }
            }
        }
        Ok(result)
    }

    /// Return-type names resolve against the closure: concrete names stand
    /// for themselves, everything else goes through the alias tables.
    fn resolve_return_type(&self, function: &Function, alias: &str) -> String {
        if let Some(ns) = &function.decl.return_type_namespace {
            if let Some(Value::Map(map)) = function.closure.borrow().get(ns) {
                if let Some(target) = map.borrow().get_type_alias(alias) {
                    return target;
                }
            }
            return String::new();
        }
        if CONCRETE_TYPES.contains(&alias) {
            return alias.to_string();
        }
        function.closure.borrow().get_type_alias(alias).unwrap_or_default()
    }

    /// Internal access means the current scope binds `this` to exactly this
    /// instance.
    fn is_internal_access(&self, instance: &Rc<std::cell::RefCell<Instance>>) -> bool {
        match self.environment.borrow().get("this") {
            Some(Value::Instance(current)) => Rc::ptr_eq(&current, instance),
            _ => false,
        }
    }
}

/// Instance field if present, else a bound method looked up with
/// inheritance.
fn instance_member(
    instance: &Rc<std::cell::RefCell<Instance>>,
    name: &str,
) -> Option<Variable> {
    let inner = instance.borrow();
    if let Some(cell) = inner.fields.get(name) {
        return Some(cell.clone());
    }
    let method = inner.class.find_method(name)?;
    let is_private = method.is_private;
    drop(inner);
    Some(Variable {
        value: Value::Callable(Callable::Function(method.bind(instance))),
        is_private,
        constraint: None,
    })
}

/// Enforces a cell's type constraint against a value about to be stored.
pub fn check_type(line: u32, col: u32, constraint: &str, value: &Value) -> Result<(), RuntimeError> {
    let matches = match constraint {
        "num" => matches!(value, Value::Number(_)),
        "string" => matches!(value, Value::Str(_)),
        "bool" => matches!(value, Value::Bool(_)),
        "list" => matches!(value, Value::List(_)),
        "map" => matches!(value, Value::Map(_)),
        other => {
            return Err(RuntimeError::new(
                ErrorKind::Type,
                line,
                col,
                format!("Unknown type constraint '{}'.", other),
            ));
        }
    };
    if matches {
        return Ok(());
    }
    let expected = match constraint {
        "num" => "a number",
        "string" => "a string",
        "bool" => "a boolean",
        "list" => "a list",
        _ => "a map",
    };
    Err(RuntimeError::new(
        ErrorKind::Type,
        line,
        col,
        format!("Variable expects {} but got {}.", expected, describe(value)),
    ))
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Nil => "null",
        Value::Number(_) => "a number",
        Value::Bool(_) => "a boolean",
        Value::Str(_) => "a string",
        Value::List(_) => "a list",
        Value::Map(_) => "a map",
        Value::Callable(_) => "a function",
        Value::Instance(_) => "an instance",
    }
}

fn name_error(line: u32, col: u32, name: &str) -> RuntimeError {
    RuntimeError::new(ErrorKind::Name, line, col, format!("Undefined variable '{}'.", name))
}

fn private_error(line: u32, col: u32, name: &str) -> RuntimeError {
    RuntimeError::new(
        ErrorKind::Type,
        line,
        col,
        format!("Cannot access private member '{}'.", name),
    )
}

//! Resolver: değişken referanslarına scope mesafesi atayan statik geçiş.

use std::collections::HashMap;

use crate::ast::*;
use crate::value::{ErrorKind, RuntimeError};

#[derive(Clone, Copy, PartialEq)]
enum ClassType {
    None,
    Class,
}

/// Walks the AST and records, for every variable reference, how many scope
/// hops separate the use from the declaration (`-1` for globals). The global
/// symbol table persists across runs so REPL lines can see earlier
/// definitions; a name known to neither side is left unannotated and falls
/// back to a runtime global lookup.
pub struct Resolver {
    scopes: Vec<HashMap<String, bool>>,
    global_symbols: HashMap<String, bool>,
    locals: HashMap<NodeId, i32>,
    current_class: ClassType,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            global_symbols: HashMap::new(),
            locals: HashMap::new(),
            current_class: ClassType::None,
        }
    }

    /// Annotates one compilation unit and hands the batch of distances to
    /// the caller. Leftover scopes from an aborted earlier run are dropped.
    pub fn resolve(&mut self, statements: &[Stmt]) -> Result<HashMap<NodeId, i32>, RuntimeError> {
        self.scopes.clear();
        self.current_class = ClassType::None;
        for stmt in statements {
            if let Err(e) = self.resolve_stmt(stmt) {
                self.locals.clear();
                return Err(e);
            }
        }
        Ok(std::mem::take(&mut self.locals))
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    /// Marks a name "declared but not ready" in the innermost scope.
    fn declare(&mut self, name: &str, line: u32, col: u32) -> Result<(), RuntimeError> {
        match self.scopes.last_mut() {
            None => {
                self.global_symbols.insert(name.to_string(), false);
                Ok(())
            }
            Some(scope) => {
                if scope.contains_key(name) {
                    return Err(RuntimeError::new(
                        ErrorKind::Resolve,
                        line,
                        col,
                        "Already a variable with this name in this scope.",
                    ));
                }
                scope.insert(name.to_string(), false);
                Ok(())
            }
        }
    }

    fn define(&mut self, name: &str) {
        match self.scopes.last_mut() {
            None => {
                self.global_symbols.insert(name.to_string(), true);
            }
            Some(scope) => {
                scope.insert(name.to_string(), true);
            }
        }
    }

    fn resolve_local(&mut self, id: NodeId, name: &str) {
        for i in (0..self.scopes.len()).rev() {
            if self.scopes[i].contains_key(name) {
                self.locals.insert(id, (self.scopes.len() - 1 - i) as i32);
                return;
            }
        }
        if self.global_symbols.contains_key(name) {
            self.locals.insert(id, -1);
        }
    }

    fn resolve_stmts(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        for stmt in statements {
            self.resolve_stmt(stmt)?;
        }
        Ok(())
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) -> Result<(), RuntimeError> {
        match &stmt.node {
            StmtKind::Expression(e) => self.resolve_expr(e),
            StmtKind::Var(decl) => {
                self.declare(&decl.name, stmt.line, stmt.col)?;
                if let Some(init) = &decl.init {
                    self.resolve_expr(init)?;
                }
                self.define(&decl.name);
                Ok(())
            }
            StmtKind::Function(decl) => {
                self.declare(&decl.name, stmt.line, stmt.col)?;
                self.define(&decl.name);
                self.resolve_function(decl)
            }
            StmtKind::Class(decl) => self.resolve_class(decl, stmt),
            StmtKind::Return(value) => {
                if let Some(v) = value {
                    self.resolve_expr(v)?;
                }
                Ok(())
            }
            StmtKind::If { cond, then_b, else_b } => {
                self.resolve_expr(cond)?;
                self.resolve_stmt(then_b)?;
                if let Some(e) = else_b {
                    self.resolve_stmt(e)?;
                }
                Ok(())
            }
            StmtKind::While { cond, body } => {
                self.resolve_expr(cond)?;
                self.resolve_stmt(body)
            }
            StmtKind::For { init, cond, step, body } => {
                self.begin_scope();
                let result = (|| {
                    if let Some(i) = init {
                        self.resolve_stmt(i)?;
                    }
                    self.resolve_expr(cond)?;
                    if let Some(s) = step {
                        self.resolve_expr(s)?;
                    }
                    self.resolve_stmt(body)
                })();
                self.end_scope();
                result
            }
            StmtKind::Foreach { name, iterable, body, .. } => {
                self.resolve_expr(iterable)?;
                self.begin_scope();
                let result = (|| {
                    self.declare(name, stmt.line, stmt.col)?;
                    self.define(name);
                    self.resolve_stmt(body)
                })();
                self.end_scope();
                result
            }
            StmtKind::Block(body) => {
                self.begin_scope();
                let result = self.resolve_stmts(body);
                self.end_scope();
                result
            }
            StmtKind::Namespace { name, body } => {
                self.declare(name, stmt.line, stmt.col)?;
                self.define(name);
                self.begin_scope();
                let result = self.resolve_stmts(body);
                self.end_scope();
                result
            }
            StmtKind::Import(_) | StmtKind::Stop | StmtKind::Skip => Ok(()),
            StmtKind::Alias { target, name } => {
                if let AliasTarget::Value(expr) = target {
                    self.resolve_expr(expr)?;
                }
                self.declare(name, stmt.line, stmt.col)?;
                self.define(name);
                Ok(())
            }
            StmtKind::Attempt(attempt) => {
                self.begin_scope();
                let result = self.resolve_stmts(&attempt.body);
                self.end_scope();
                result?;

                if let Some(fail) = &attempt.fail {
                    self.begin_scope();
                    let result = (|| {
                        self.declare(&fail.name, stmt.line, stmt.col)?;
                        self.define(&fail.name);
                        self.resolve_stmts(&fail.body)
                    })();
                    self.end_scope();
                    result?;
                }

                self.begin_scope();
                let result = self.resolve_stmts(&attempt.finally);
                self.end_scope();
                result
            }
            StmtKind::Panic(message) => {
                if let Some(m) = message {
                    self.resolve_expr(m)?;
                }
                Ok(())
            }
        }
    }

    fn resolve_class(&mut self, decl: &ClassDecl, stmt: &Stmt) -> Result<(), RuntimeError> {
        let enclosing = self.current_class;
        self.current_class = ClassType::Class;

        let result = (|| {
            self.declare(&decl.name, stmt.line, stmt.col)?;
            self.define(&decl.name);

            if let Some(superclass) = &decl.superclass {
                if let ExprKind::Variable(parent_name) = &superclass.node {
                    if *parent_name == decl.name {
                        return Err(RuntimeError::new(
                            ErrorKind::Resolve,
                            superclass.line,
                            superclass.col,
                            "A class cannot inherit from itself.",
                        ));
                    }
                }
                self.resolve_expr(superclass)?;
            }

            // Field defaults are evaluated in the declaring scope, before
            // the parent/this scopes exist.
            for field in &decl.fields {
                if let Some(init) = &field.init {
                    self.resolve_expr(init)?;
                }
            }

            if decl.superclass.is_some() {
                self.begin_scope();
                self.define("parent");
            }

            self.begin_scope();
            self.define("this");

            let mut result = Ok(());
            for method in &decl.methods {
                result = self.resolve_function(method);
                if result.is_err() {
                    break;
                }
            }

            self.end_scope();
            if decl.superclass.is_some() {
                self.end_scope();
            }
            result
        })();

        self.current_class = enclosing;
        result
    }

    fn resolve_function(&mut self, decl: &FunctionDecl) -> Result<(), RuntimeError> {
        self.begin_scope();
        let result = (|| {
            for param in &decl.params {
                // Defaults run in the call frame where every earlier
                // parameter is already bound.
                if let Some(default) = &param.default {
                    self.resolve_expr(default)?;
                }
                self.declare(&param.name, decl.line, decl.col)?;
                self.define(&param.name);
            }
            self.resolve_stmts(&decl.body)
        })();
        self.end_scope();
        result
    }

    fn resolve_exprs(&mut self, exprs: &[Expr]) -> Result<(), RuntimeError> {
        for e in exprs {
            self.resolve_expr(e)?;
        }
        Ok(())
    }

    fn resolve_expr(&mut self, expr: &Expr) -> Result<(), RuntimeError> {
        match &expr.node {
            ExprKind::Literal(_) => Ok(()),
            ExprKind::Variable(name) => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(name) == Some(&false) {
                        return Err(RuntimeError::new(
                            ErrorKind::Resolve,
                            expr.line,
                            expr.col,
                            "Can't read local variable in its own initializer.",
                        ));
                    }
                }
                self.resolve_local(expr.id, name);
                Ok(())
            }
            ExprKind::This => {
                if self.current_class == ClassType::None {
                    return Err(RuntimeError::new(
                        ErrorKind::Resolve,
                        expr.line,
                        expr.col,
                        "Cannot use 'this' outside of a class.",
                    ));
                }
                self.resolve_local(expr.id, "this");
                Ok(())
            }
            ExprKind::Grouping(inner) => self.resolve_expr(inner),
            ExprKind::Assign { name, value } => {
                self.resolve_expr(value)?;
                self.resolve_local(expr.id, name);
                Ok(())
            }
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)
            }
            ExprKind::Range { lo, hi } => {
                self.resolve_expr(lo)?;
                self.resolve_expr(hi)
            }
            ExprKind::Unary { inner, .. } => self.resolve_expr(inner),
            ExprKind::Prefix { target, .. } | ExprKind::Postfix { target, .. } => {
                self.resolve_expr(target)
            }
            ExprKind::Call { callee, args } => {
                self.resolve_expr(callee)?;
                self.resolve_exprs(args)
            }
            ExprKind::Index { object, index } => {
                self.resolve_expr(object)?;
                self.resolve_expr(index)
            }
            ExprKind::Get { object, .. } => self.resolve_expr(object),
            ExprKind::Set { object, value, .. } => {
                self.resolve_expr(object)?;
                self.resolve_expr(value)
            }
            ExprKind::IndexSet { object, index, value } => {
                self.resolve_expr(object)?;
                self.resolve_expr(index)?;
                self.resolve_expr(value)
            }
            ExprKind::ListLiteral(elements) => self.resolve_exprs(elements),
            ExprKind::MapLiteral(items) => {
                for (k, v) in items {
                    self.resolve_expr(k)?;
                    self.resolve_expr(v)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax_analyzer::{Lexer, Parser};
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    fn resolve(src: &str) -> Result<HashMap<NodeId, i32>, RuntimeError> {
        let tokens = Lexer::scan(src).expect("lex failed");
        let aliases = Rc::new(RefCell::new(HashSet::new()));
        let stmts = Parser::new(tokens, aliases, NodeIdGen::new()).parse().expect("parse failed");
        Resolver::new().resolve(&stmts)
    }

    #[test]
    fn duplicate_local_declaration_is_an_error() {
        let err = resolve("{ data x = 1  data x = 2 }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Resolve);
        assert!(err.message.contains("Already a variable"));
    }

    #[test]
    fn duplicate_global_declaration_is_allowed() {
        assert!(resolve("data x = 1  data x = 2").is_ok());
    }

    #[test]
    fn self_read_in_initializer_is_an_error() {
        let err = resolve("{ data x = x }").unwrap_err();
        assert!(err.message.contains("its own initializer"));
    }

    #[test]
    fn this_outside_a_class_is_an_error() {
        let err = resolve("{ this }").unwrap_err();
        assert!(err.message.contains("outside of a class"));
    }

    #[test]
    fn class_cannot_inherit_itself() {
        let err = resolve("class A childof A {}").unwrap_err();
        assert!(err.message.contains("inherit from itself"));
    }

    #[test]
    fn local_reads_get_distances_and_globals_get_minus_one() {
        let locals = resolve("data g = 1 { data x = 2 { x  g } }").unwrap();
        let mut distances: Vec<i32> = locals.values().copied().collect();
        distances.sort_unstable();
        assert_eq!(distances, vec![-1, 1]);
    }
}

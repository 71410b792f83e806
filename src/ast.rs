//! AST: soyut sözdizim ağacı tanımları.

use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

/// Parse zamaninda atanan seri numara. Resolver mesafeleri bu kimlikle
/// anahtarlar; REPL satirlari ve modul yuklemeleri arasinda benzersiz kalir.
pub type NodeId = u32;

/// Shared serial-id allocator, handed to every parser the interpreter spawns.
#[derive(Clone, Default)]
pub struct NodeIdGen(Rc<Cell<NodeId>>);

impl NodeIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> NodeId {
        let id = self.0.get();
        self.0.set(id + 1);
        id
    }
}

/// Shared set of user-declared type-alias names. The parser consults it to
/// recognise `int x = 1` style declarations and inserts into it when an
/// `alias data::num as int` statement is parsed; the interpreter clears it
/// on reset.
pub type AliasSet = Rc<std::cell::RefCell<HashSet<String>>>;

#[derive(Clone, Debug)]
pub struct Expr {
    pub id: NodeId,
    pub node: ExprKind,
    pub line: u32,
    pub col: u32,
}

#[derive(Clone, Debug)]
pub struct Stmt {
    pub node: StmtKind,
    pub line: u32,
    pub col: u32,
}

#[derive(Clone, Debug)]
pub enum Literal {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

/// `++` / `--`, prefix and postfix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOp {
    Inc,
    Dec,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Literal(Literal),
    Variable(String),
    This,
    Grouping(Box<Expr>),
    Assign { name: String, value: Box<Expr> },
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Logical { op: LogicalOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, inner: Box<Expr> },
    Prefix { op: StepOp, target: Box<Expr> },
    Postfix { op: StepOp, target: Box<Expr> },
    Range { lo: Box<Expr>, hi: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Index { object: Box<Expr>, index: Box<Expr> },
    Get { object: Box<Expr>, name: String },
    Set { object: Box<Expr>, name: String, value: Box<Expr> },
    IndexSet { object: Box<Expr>, index: Box<Expr>, value: Box<Expr> },
    ListLiteral(Vec<Expr>),
    MapLiteral(Vec<(Expr, Expr)>),
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    Expression(Expr),
    Var(VarDecl),
    Function(Rc<FunctionDecl>),
    Class(ClassDecl),
    Return(Option<Expr>),
    If { cond: Expr, then_b: Box<Stmt>, else_b: Option<Box<Stmt>> },
    While { cond: Expr, body: Box<Stmt> },
    For { init: Option<Box<Stmt>>, cond: Expr, step: Option<Expr>, body: Box<Stmt> },
    Foreach { name: String, constraint: Option<String>, iterable: Expr, body: Box<Stmt> },
    Block(Vec<Stmt>),
    Namespace { name: String, body: Vec<Stmt> },
    Import(String),
    Alias { target: AliasTarget, name: String },
    Attempt(AttemptStmt),
    Panic(Option<Expr>),
    Stop,
    Skip,
}

/// `data [::TYPE] NAME`, `ALIAS [::TYPE] NAME` or `NS.ALIAS NAME`.
#[derive(Clone, Debug)]
pub struct VarDecl {
    pub name: String,
    /// `data` or a user alias name.
    pub type_name: String,
    /// `NS` in the `NS.ALIAS NAME` form.
    pub type_namespace: Option<String>,
    /// `TYPE` in `::TYPE`, or `ALIAS` in the namespaced form.
    pub inner_type: Option<String>,
    pub init: Option<Expr>,
    pub is_private: bool,
    pub line: u32,
    pub col: u32,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

/// Rc-shared: closures keep the declaration alive after the statement tree
/// from a run has been dropped.
#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub return_type: Option<String>,
    pub return_type_namespace: Option<String>,
    pub is_private: bool,
    pub line: u32,
    pub col: u32,
}

impl FunctionDecl {
    /// Parameters without a default expression.
    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }
}

#[derive(Clone, Debug)]
pub struct ClassDecl {
    pub name: String,
    pub superclass: Option<Expr>,
    pub methods: Vec<Rc<FunctionDecl>>,
    pub fields: Vec<VarDecl>,
}

#[derive(Clone, Debug)]
pub struct AttemptStmt {
    pub body: Vec<Stmt>,
    pub fail: Option<FailClause>,
    pub finally: Vec<Stmt>,
}

#[derive(Clone, Debug)]
pub struct FailClause {
    /// Name the error message is bound to inside the fail body.
    pub name: String,
    /// `::Type` filter; `None` catches every error, including panics.
    pub filter: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug)]
pub enum AliasTarget {
    /// `alias data::num as int` / `alias int as integer` — a type name.
    Type(String),
    /// `alias some_value as v` — an ordinary runtime value.
    Value(Box<Expr>),
}

//! SyntaxAnalyzer: logos tabanli lexer + recursive-descent parser.
//! String interpolasyonu (`${name}`) lex asamasinda `+` zincirine acilir.

use logos::Logos;
use thiserror::Error;

use crate::ast::*;
use crate::optimizer;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenType {
    // Single characters
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equal,
    Greater,
    Less,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Bang,
    Comma,
    Colon,
    LBracket,
    RBracket,
    Dot,
    Ampersand,
    Caret,
    Pipe,
    Tilde,

    // Double characters
    EqualEqual,
    LessEqual,
    GreaterEqual,
    BangEqual,
    DoubleColon,
    Arrow,
    PlusPlus,
    MinusMinus,
    Shl,
    Shr,

    // Literals & names
    Number,
    Identifier,
    Str,

    // Keywords
    If,
    Else,
    Func,
    While,
    For,
    Foreach,
    And,
    Or,
    True,
    False,
    Null,
    Alias,
    Import,
    Return,
    As,
    Namespace,
    Data,
    This,
    In,
    To,
    Stop,
    Skip,
    Unless,
    Until,
    Do,
    Class,
    Private,
    Childof,
    Attempt,
    Fail,
    Panic,
    Finally,

    Eof,
}

/// Literal payload carried by `Number` and `Str` tokens.
#[derive(Clone, Debug)]
pub enum Lit {
    Num(f64),
    Str(String),
}

#[derive(Clone, Debug)]
pub struct Token {
    pub ty: TokenType,
    pub lexeme: String,
    pub literal: Option<Lit>,
    pub line: u32,
    pub col: u32,
}

impl Token {
    fn new(ty: TokenType, lexeme: impl Into<String>, line: u32, col: u32) -> Self {
        Self { ty, lexeme: lexeme.into(), literal: None, line, col }
    }
}

#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    /// Lexeme of the offending token; empty at end of input.
    pub lexeme: String,
    pub line: u32,
    pub col: u32,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, lexeme: impl Into<String>, line: u32, col: u32) -> Self {
        Self { message: message.into(), lexeme: lexeme.into(), line, col }
    }

    /// `" at 'x'"` / `" at end"` part of the diagnostic.
    pub fn location(&self) -> String {
        if self.lexeme.is_empty() {
            " at end".to_string()
        } else {
            format!(" at '{}'", self.lexeme)
        }
    }
}

#[derive(Logos, Debug, Clone, PartialEq)]
enum RawToken {
    // ===== Keywords =====
    #[token("import")]
    Import,
    #[token("func")]
    Func,
    #[token("while")]
    While,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("for")]
    For,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("alias")]
    Alias,
    #[token("return")]
    Return,
    #[token("as")]
    As,
    #[token("namespace")]
    Namespace,
    #[token("data")]
    Data,
    #[token("this")]
    This,
    #[token("to")]
    To,
    #[token("in")]
    In,
    #[token("foreach")]
    Foreach,
    #[token("stop")]
    Stop,
    #[token("skip")]
    Skip,
    #[token("unless")]
    Unless,
    #[token("until")]
    Until,
    #[token("do")]
    Do,
    #[token("class")]
    Class,
    #[token("private")]
    Private,
    #[token("childof")]
    Childof,
    #[token("attempt")]
    Attempt,
    #[token("fail")]
    Fail,
    #[token("panic")]
    Panic,
    #[token("finally")]
    Finally,

    // ===== Compound operators =====
    #[token("==")]
    EqualEqual,
    #[token("!=")]
    BangEqual,
    #[token("<=")]
    LessEqual,
    #[token(">=")]
    GreaterEqual,
    #[token("::")]
    DoubleColon,
    #[token("->")]
    Arrow,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,

    // ===== Single operators =====
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("=")]
    Equal,
    #[token(">")]
    Greater,
    #[token("<")]
    Less,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("!")]
    Bang,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(".")]
    Dot,
    #[token("&")]
    Ampersand,
    #[token("^")]
    Caret,
    #[token("|")]
    Pipe,
    #[token("~")]
    Tilde,

    // ===== Literals =====
    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    /// Raw quoted text; no escape sequences, may span lines. Interpolation
    /// is split out after the match.
    #[regex(r#""[^"]*""#, |lex| lex.slice().to_string())]
    Str(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    // ===== Skip =====
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    #[regex(r"#[^\n]*", logos::skip)]
    Skipped,
}

pub struct Lexer;

impl Lexer {
    /// Source text -> token stream. Collects every lexical error instead of
    /// stopping at the first one.
    pub fn scan(src: &str) -> Result<Vec<Token>, Vec<SyntaxError>> {
        let mut tokens = Vec::new();
        let mut errors = Vec::new();
        let mut lexer = RawToken::lexer(src);

        while let Some(result) = lexer.next() {
            let span = lexer.span();
            let (line, col) = line_col(src, span.start);
            match result {
                Ok(RawToken::Str(raw)) => {
                    if let Err(e) = push_string_tokens(src, &mut tokens, &raw, span.start) {
                        errors.push(e);
                    }
                }
                Ok(tok) => tokens.push(translate(tok, lexer.slice(), line, col)),
                Err(()) => {
                    let rest = &src[span.start..];
                    if rest.starts_with('"') {
                        errors.push(SyntaxError::new("Unterminated string.", "\"", line, col));
                        break;
                    }
                    errors.push(SyntaxError::new(
                        format!("Unexpected character: '{}'", &src[span.start..span.end]),
                        &src[span.start..span.end],
                        line,
                        col,
                    ));
                }
            }
        }

        let (line, col) = line_col(src, src.len());
        tokens.push(Token::new(TokenType::Eof, "", line, col));

        if errors.is_empty() {
            Ok(tokens)
        } else {
            Err(errors)
        }
    }
}

fn translate(tok: RawToken, slice: &str, line: u32, col: u32) -> Token {
    let ty = match tok {
        RawToken::Import => TokenType::Import,
        RawToken::Func => TokenType::Func,
        RawToken::While => TokenType::While,
        RawToken::If => TokenType::If,
        RawToken::Else => TokenType::Else,
        RawToken::True => TokenType::True,
        RawToken::False => TokenType::False,
        RawToken::Null => TokenType::Null,
        RawToken::For => TokenType::For,
        RawToken::And => TokenType::And,
        RawToken::Or => TokenType::Or,
        RawToken::Alias => TokenType::Alias,
        RawToken::Return => TokenType::Return,
        RawToken::As => TokenType::As,
        RawToken::Namespace => TokenType::Namespace,
        RawToken::Data => TokenType::Data,
        RawToken::This => TokenType::This,
        RawToken::To => TokenType::To,
        RawToken::In => TokenType::In,
        RawToken::Foreach => TokenType::Foreach,
        RawToken::Stop => TokenType::Stop,
        RawToken::Skip => TokenType::Skip,
        RawToken::Unless => TokenType::Unless,
        RawToken::Until => TokenType::Until,
        RawToken::Do => TokenType::Do,
        RawToken::Class => TokenType::Class,
        RawToken::Private => TokenType::Private,
        RawToken::Childof => TokenType::Childof,
        RawToken::Attempt => TokenType::Attempt,
        RawToken::Fail => TokenType::Fail,
        RawToken::Panic => TokenType::Panic,
        RawToken::Finally => TokenType::Finally,
        RawToken::EqualEqual => TokenType::EqualEqual,
        RawToken::BangEqual => TokenType::BangEqual,
        RawToken::LessEqual => TokenType::LessEqual,
        RawToken::GreaterEqual => TokenType::GreaterEqual,
        RawToken::DoubleColon => TokenType::DoubleColon,
        RawToken::Arrow => TokenType::Arrow,
        RawToken::PlusPlus => TokenType::PlusPlus,
        RawToken::MinusMinus => TokenType::MinusMinus,
        RawToken::Shl => TokenType::Shl,
        RawToken::Shr => TokenType::Shr,
        RawToken::Plus => TokenType::Plus,
        RawToken::Minus => TokenType::Minus,
        RawToken::Star => TokenType::Star,
        RawToken::Slash => TokenType::Slash,
        RawToken::Percent => TokenType::Percent,
        RawToken::Equal => TokenType::Equal,
        RawToken::Greater => TokenType::Greater,
        RawToken::Less => TokenType::Less,
        RawToken::LParen => TokenType::LParen,
        RawToken::RParen => TokenType::RParen,
        RawToken::LBrace => TokenType::LBrace,
        RawToken::RBrace => TokenType::RBrace,
        RawToken::Bang => TokenType::Bang,
        RawToken::Comma => TokenType::Comma,
        RawToken::Colon => TokenType::Colon,
        RawToken::LBracket => TokenType::LBracket,
        RawToken::RBracket => TokenType::RBracket,
        RawToken::Dot => TokenType::Dot,
        RawToken::Ampersand => TokenType::Ampersand,
        RawToken::Caret => TokenType::Caret,
        RawToken::Pipe => TokenType::Pipe,
        RawToken::Tilde => TokenType::Tilde,
        RawToken::Number(n) => {
            let mut t = Token::new(TokenType::Number, slice, line, col);
            t.literal = Some(Lit::Num(n));
            return t;
        }
        RawToken::Identifier(name) => {
            return Token::new(TokenType::Identifier, name, line, col);
        }
        RawToken::Str(_) | RawToken::Skipped => unreachable!(),
    };
    Token::new(ty, slice, line, col)
}

fn string_token(content: &str, line: u32, col: u32) -> Token {
    let mut t = Token::new(TokenType::Str, content, line, col);
    t.literal = Some(Lit::Str(content.to_string()));
    t
}

/// Splits `"a ${x} b"` into the token run `"a " + x + " b"`. A `$` that is
/// not followed by `{` stays literal text.
fn push_string_tokens(
    src: &str,
    tokens: &mut Vec<Token>,
    raw: &str,
    lo: usize,
) -> Result<(), SyntaxError> {
    let (open_line, open_col) = line_col(src, lo);
    let content = &raw[1..raw.len() - 1];
    let bytes = content.as_bytes();
    let base = lo + 1;

    let mut segment_start = 0usize;
    let mut i = 0usize;
    let mut interpolated = false;

    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && bytes[i + 1] == b'{' {
            let (line, col) = line_col(src, base + segment_start);
            tokens.push(string_token(&content[segment_start..i], line, col));
            let (pl, pc) = line_col(src, base + i);
            tokens.push(Token::new(TokenType::Plus, "+", pl, pc));

            let name_start = i + 2;
            let mut j = name_start;
            while j < bytes.len() && bytes[j] != b'}' {
                j += 1;
            }
            if j >= bytes.len() {
                return Err(SyntaxError::new(
                    "Unterminated interpolation.",
                    "${",
                    open_line,
                    open_col,
                ));
            }
            let name = &content[name_start..j];
            let (nl, nc) = line_col(src, base + name_start);
            tokens.push(Token::new(TokenType::Identifier, name, nl, nc));
            tokens.push(Token::new(TokenType::Plus, "+", nl, nc));

            interpolated = true;
            segment_start = j + 1;
            i = j + 1;
        } else {
            i += 1;
        }
    }

    let (line, col) = if interpolated {
        line_col(src, base + segment_start)
    } else {
        (open_line, open_col)
    };
    tokens.push(string_token(&content[segment_start..], line, col));
    Ok(())
}

fn is_concrete_type(name: &str) -> bool {
    matches!(name, "num" | "string" | "bool" | "list" | "map")
}

/// 1-based line and column of a byte offset.
pub fn line_col(src: &str, idx: usize) -> (u32, u32) {
    let mut line = 1u32;
    let mut col = 1u32;
    for (i, ch) in src.char_indices() {
        if i >= idx {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

// ===== Parser =====

type ParseResult<T> = Result<T, SyntaxError>;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    loop_depth: u32,
    aliases: AliasSet,
    ids: NodeIdGen,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, aliases: AliasSet, ids: NodeIdGen) -> Self {
        Self { tokens, current: 0, loop_depth: 0, aliases, ids }
    }

    /// Tokens -> statement list. Aborts the compilation unit on the first
    /// syntax error; the driver treats an `Err` as nothing to run.
    pub fn parse(mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            statements.push(self.declaration()?);
        }
        Ok(statements)
    }

    // ----- cursor helpers -----

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn is_at_end(&self) -> bool {
        self.peek().ty == TokenType::Eof
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous().clone()
    }

    fn check(&self, ty: TokenType) -> bool {
        !self.is_at_end() && self.peek().ty == ty
    }

    fn check_at(&self, offset: usize, ty: TokenType) -> bool {
        match self.tokens.get(self.current + offset) {
            Some(t) => t.ty == ty,
            None => false,
        }
    }

    fn match_any(&mut self, types: &[TokenType]) -> bool {
        for ty in types {
            if self.check(ty.clone()) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, ty: TokenType, message: &str) -> ParseResult<Token> {
        if self.check(ty) {
            return Ok(self.advance());
        }
        Err(self.error_at_current(message))
    }

    fn error_at_current(&self, message: &str) -> SyntaxError {
        let tok = self.peek();
        let lexeme = if tok.ty == TokenType::Eof { String::new() } else { tok.lexeme.clone() };
        SyntaxError::new(message, lexeme, tok.line, tok.col)
    }

    fn error_at_previous(&self, message: &str) -> SyntaxError {
        let tok = self.previous();
        SyntaxError::new(message, tok.lexeme.clone(), tok.line, tok.col)
    }

    fn is_user_alias(&self, name: &str) -> bool {
        self.aliases.borrow().contains(name)
    }

    fn make(&self, node: ExprKind, tok: &Token) -> Expr {
        Expr { id: self.ids.next(), node, line: tok.line, col: tok.col }
    }

    fn make_stmt(&self, node: StmtKind, tok: &Token) -> Stmt {
        Stmt { node, line: tok.line, col: tok.col }
    }

    // ----- declarations -----

    fn declaration(&mut self) -> ParseResult<Stmt> {
        if self.match_any(&[TokenType::Import]) {
            return self.import_declaration();
        }
        if self.match_any(&[TokenType::Func]) {
            let decl = self.function_declaration("function", false)?;
            let (line, col) = (decl.line, decl.col);
            return Ok(Stmt { node: StmtKind::Function(std::rc::Rc::new(decl)), line, col });
        }
        if self.match_any(&[TokenType::Alias]) {
            return self.alias_declaration();
        }

        // `NS.ALIAS NAME` declaration lookahead.
        if self.check(TokenType::Identifier)
            && self.check_at(1, TokenType::Dot)
            && self.check_at(2, TokenType::Identifier)
            && self.check_at(3, TokenType::Identifier)
        {
            let ns = self.advance();
            self.advance(); // '.'
            let alias = self.advance();
            return self.type_declaration(alias, Some(ns.lexeme), false);
        }

        if self.check(TokenType::Identifier) && self.is_user_alias(&self.peek().lexeme) {
            let alias = self.advance();
            return self.type_declaration(alias, None, false);
        }

        if self.match_any(&[TokenType::Data]) {
            let tok = self.previous().clone();
            return self.type_declaration(tok, None, false);
        }

        self.statement()
    }

    fn import_declaration(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        self.consume(TokenType::LParen, "Expect '(' after import.")?;
        let module = self.consume(TokenType::Str, "Expect module after import.")?;
        self.consume(TokenType::RParen, "Expect ')' after import.")?;
        let name = match module.literal {
            Some(Lit::Str(s)) => s,
            _ => module.lexeme,
        };
        Ok(self.make_stmt(StmtKind::Import(name), &keyword))
    }

    fn function_declaration(&mut self, kind: &str, is_private: bool) -> ParseResult<FunctionDecl> {
        let name = self.consume(TokenType::Identifier, &format!("Expect {} name.", kind))?;
        self.consume(TokenType::LParen, "Expect '(' before parameters.")?;

        let mut params = Vec::new();
        if !self.check(TokenType::RParen) {
            loop {
                // Optional `data` / alias prefix and `::type`; the runtime
                // binds arguments unchecked, so only the name survives.
                if !self.match_any(&[TokenType::Data])
                    && self.check(TokenType::Identifier)
                    && self.is_user_alias(&self.peek().lexeme)
                    && self.check_at(1, TokenType::Identifier)
                {
                    self.advance();
                }
                if self.match_any(&[TokenType::DoubleColon]) {
                    self.consume(TokenType::Identifier, "Expect type after '::'.")?;
                }

                let pname = self.consume(TokenType::Identifier, "Expect parameter name.")?;
                let default = if self.match_any(&[TokenType::Equal]) {
                    Some(self.expression()?)
                } else {
                    None
                };
                params.push(Param { name: pname.lexeme, default });

                if !self.match_any(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenType::RParen, "Expect ')' after parameters.")?;

        let mut return_type = None;
        let mut return_type_namespace = None;
        if self.match_any(&[TokenType::Arrow]) {
            if self.check(TokenType::Identifier) && self.check_at(1, TokenType::Dot) {
                return_type_namespace = Some(self.advance().lexeme);
                self.advance(); // '.'
                return_type = Some(
                    self.consume(TokenType::Identifier, "Expect return type after '.'.")?.lexeme,
                );
            } else {
                return_type = Some(
                    self.consume(TokenType::Identifier, "Expect return type after '->'.")?.lexeme,
                );
            }
        }

        self.consume(TokenType::LBrace, &format!("Expect '{{' before {} body.", kind))?;
        let body = self.block()?;

        Ok(FunctionDecl {
            name: name.lexeme,
            params,
            body,
            return_type,
            return_type_namespace,
            is_private,
            line: name.line,
            col: name.col,
        })
    }

    fn alias_declaration(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        let target;
        let mut is_type = false;

        if self.match_any(&[TokenType::Data]) {
            // alias data::num as int
            self.consume(TokenType::DoubleColon, "Expect '::' after data.")?;
            let ty = self.consume(TokenType::Identifier, "Expect type name.")?;
            target = AliasTarget::Type(ty.lexeme);
            is_type = true;
        } else if self.check(TokenType::Identifier) && self.is_user_alias(&self.peek().lexeme) {
            // alias int as integer — chains one hop to the existing alias.
            let existing = self.advance();
            target = AliasTarget::Type(existing.lexeme);
            is_type = true;
        } else {
            let expr = self.expression()?;
            target = AliasTarget::Value(Box::new(expr));
        }

        self.consume(TokenType::As, "Expect 'as' after target.")?;
        let name = self.consume(TokenType::Identifier, "Expect alias name.")?;

        if is_type {
            self.aliases.borrow_mut().insert(name.lexeme.clone());
        }
        Ok(self.make_stmt(StmtKind::Alias { target, name: name.lexeme }, &keyword))
    }

    fn type_declaration(
        &mut self,
        type_token: Token,
        type_namespace: Option<String>,
        is_private: bool,
    ) -> ParseResult<Stmt> {
        let mut inner_type = None;
        if self.match_any(&[TokenType::DoubleColon]) {
            inner_type = Some(self.consume(TokenType::Identifier, "Expect type after '::'.")?.lexeme);
        }

        // `data list xs` reads the bare concrete name as the constraint.
        if inner_type.is_none()
            && type_token.ty == TokenType::Data
            && self.check(TokenType::Identifier)
            && self.check_at(1, TokenType::Identifier)
            && is_concrete_type(&self.peek().lexeme)
        {
            inner_type = Some(self.advance().lexeme);
        }

        let name = self.consume(TokenType::Identifier, "Expect variable name.")?;

        let init = if self.match_any(&[TokenType::Equal]) {
            Some(self.expression()?)
        } else {
            None
        };

        Ok(self.make_stmt(
            StmtKind::Var(VarDecl {
                name: name.lexeme.clone(),
                type_name: type_token.lexeme,
                type_namespace,
                inner_type,
                init,
                is_private,
                line: name.line,
                col: name.col,
            }),
            &name,
        ))
    }

    // ----- statements -----

    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.match_any(&[TokenType::Do]) {
            return self.until_statement();
        }
        if self.match_any(&[TokenType::While]) {
            return self.while_statement();
        }
        if self.match_any(&[TokenType::For]) {
            return self.for_statement();
        }
        if self.match_any(&[TokenType::If]) {
            return self.if_statement(false);
        }
        if self.match_any(&[TokenType::Unless]) {
            return self.if_statement(true);
        }
        if self.match_any(&[TokenType::Return]) {
            return self.return_statement();
        }
        if self.match_any(&[TokenType::Namespace]) {
            return self.namespace_statement();
        }
        if self.match_any(&[TokenType::Stop]) {
            if self.loop_depth == 0 {
                return Err(self.error_at_previous("Cannot use 'stop' outside of a loop."));
            }
            let tok = self.previous().clone();
            return Ok(self.make_stmt(StmtKind::Stop, &tok));
        }
        if self.match_any(&[TokenType::Skip]) {
            if self.loop_depth == 0 {
                return Err(self.error_at_previous("Cannot use 'skip' outside of a loop."));
            }
            let tok = self.previous().clone();
            return Ok(self.make_stmt(StmtKind::Skip, &tok));
        }
        if self.match_any(&[TokenType::LBrace]) {
            let tok = self.previous().clone();
            let body = self.block()?;
            return Ok(self.make_stmt(StmtKind::Block(body), &tok));
        }
        if self.match_any(&[TokenType::Foreach]) {
            return self.foreach_statement();
        }
        if self.match_any(&[TokenType::Class]) {
            return self.class_statement();
        }
        if self.match_any(&[TokenType::Attempt]) {
            return self.attempt_statement();
        }
        if self.match_any(&[TokenType::Panic]) {
            return self.panic_statement();
        }
        self.expression_statement()
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression()?;
        let (line, col) = (expr.line, expr.col);
        Ok(Stmt { node: StmtKind::Expression(expr), line, col })
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(TokenType::RBrace) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }
        self.consume(TokenType::RBrace, "Expect '}' after block.")?;
        Ok(statements)
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        if self.check(TokenType::LBrace) {
            return Err(self.error_at_previous("Expect condition before '{'."));
        }
        let cond = self.expression()?;
        self.loop_depth += 1;
        let body = self.statement()?;
        self.loop_depth -= 1;
        Ok(self.make_stmt(StmtKind::While { cond, body: Box::new(body) }, &keyword))
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        if self.check(TokenType::LBrace) {
            return Err(self.error_at_previous("Expect condition before '{'."));
        }
        let init = if self.match_any(&[TokenType::Data]) {
            let tok = self.previous().clone();
            Some(Box::new(self.type_declaration(tok, None, false)?))
        } else if !self.check(TokenType::Comma) {
            Some(Box::new(self.expression_statement()?))
        } else {
            None
        };
        self.consume(TokenType::Comma, "Expect ',' after loop initializer.")?;

        let cond = if !self.check(TokenType::Comma) {
            self.expression()?
        } else {
            // Empty condition loops forever.
            self.make(ExprKind::Literal(Literal::Bool(true)), &keyword)
        };
        self.consume(TokenType::Comma, "Expect ',' after loop condition.")?;

        let step = if !self.check(TokenType::LBrace) { Some(self.expression()?) } else { None };

        self.loop_depth += 1;
        let body = self.statement()?;
        self.loop_depth -= 1;
        Ok(self.make_stmt(StmtKind::For { init, cond, step, body: Box::new(body) }, &keyword))
    }

    fn foreach_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        self.consume(TokenType::Data, "Expect 'data' in foreach loop.")?;
        let constraint = if self.match_any(&[TokenType::DoubleColon]) {
            Some(self.consume(TokenType::Identifier, "Expect type name after '::'.")?.lexeme)
        } else {
            None
        };
        let name = self.consume(TokenType::Identifier, "Expect variable name.")?;
        self.consume(TokenType::In, "Expect 'in' after variable name.")?;
        let iterable = self.expression()?;

        self.loop_depth += 1;
        let body = self.statement()?;
        self.loop_depth -= 1;
        Ok(self.make_stmt(
            StmtKind::Foreach { name: name.lexeme, constraint, iterable, body: Box::new(body) },
            &keyword,
        ))
    }

    /// `do STMT until COND` desugars to `{ STMT  while !COND STMT }`.
    fn until_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        self.loop_depth += 1;
        let body = self.statement()?;
        self.loop_depth -= 1;
        self.consume(TokenType::Until, "Expect 'until' after do block.")?;
        if self.is_at_end() {
            return Err(self.error_at_previous("Expect condition after 'until'."));
        }
        let cond = self.expression()?;

        let flipped = self.make(
            ExprKind::Unary { op: UnaryOp::Not, inner: Box::new(cond) },
            &keyword,
        );
        let while_loop = self.make_stmt(
            StmtKind::While { cond: flipped, body: Box::new(body.clone()) },
            &keyword,
        );
        Ok(self.make_stmt(StmtKind::Block(vec![body, while_loop]), &keyword))
    }

    /// `if` and, with `flip`, `unless COND` == `if !COND`.
    fn if_statement(&mut self, flip: bool) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        if self.check(TokenType::LBrace) {
            return Err(self.error_at_previous("Expect condition before '{'."));
        }
        let mut cond = self.expression()?;
        if flip {
            cond = self.make(ExprKind::Unary { op: UnaryOp::Not, inner: Box::new(cond) }, &keyword);
        }
        if !self.check(TokenType::LBrace) {
            return Err(self.error_at_previous("Expect '{' after condition."));
        }
        let then_b = self.statement()?;
        let else_b = if self.match_any(&[TokenType::Else]) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(self.make_stmt(StmtKind::If { cond, then_b: Box::new(then_b), else_b }, &keyword))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        let value = if self.check(TokenType::RBrace) || self.is_at_end() {
            None
        } else {
            Some(self.expression()?)
        };
        Ok(self.make_stmt(StmtKind::Return(value), &keyword))
    }

    fn namespace_statement(&mut self) -> ParseResult<Stmt> {
        let name = self.consume(TokenType::Identifier, "Expect namespace name.")?;
        self.consume(TokenType::LBrace, "Expect '{' after namespace name.")?;
        let body = self.block()?;
        Ok(self.make_stmt(StmtKind::Namespace { name: name.lexeme.clone(), body }, &name))
    }

    fn class_statement(&mut self) -> ParseResult<Stmt> {
        let name = self.consume(TokenType::Identifier, "Expect class name.")?;

        let superclass = if self.match_any(&[TokenType::Childof]) {
            let parent = self.consume(TokenType::Identifier, "Expect superclass name after 'childof'.")?;
            Some(self.make(ExprKind::Variable(parent.lexeme.clone()), &parent))
        } else {
            None
        };

        self.consume(TokenType::LBrace, "Expect '{' before class body.")?;

        let mut methods = Vec::new();
        let mut fields = Vec::new();
        while !self.check(TokenType::RBrace) && !self.is_at_end() {
            let member_private = self.match_any(&[TokenType::Private]);

            if self.match_any(&[TokenType::Func]) {
                let method = self.function_declaration("method", member_private)?;
                methods.push(std::rc::Rc::new(method));
            } else if self.match_any(&[TokenType::Data]) {
                let tok = self.previous().clone();
                let stmt = self.type_declaration(tok, None, member_private)?;
                if let StmtKind::Var(decl) = stmt.node {
                    fields.push(decl);
                }
            } else if self.check(TokenType::Identifier) && self.is_user_alias(&self.peek().lexeme) {
                let tok = self.advance();
                let stmt = self.type_declaration(tok, None, member_private)?;
                if let StmtKind::Var(decl) = stmt.node {
                    fields.push(decl);
                }
            } else {
                return Err(self.error_at_current("Expect 'func' or 'data' inside class body."));
            }
        }
        self.consume(TokenType::RBrace, "Expect '}' after class body.")?;

        Ok(self.make_stmt(
            StmtKind::Class(ClassDecl { name: name.lexeme.clone(), superclass, methods, fields }),
            &name,
        ))
    }

    fn attempt_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        self.consume(TokenType::LBrace, "Expect '{' before attempt block.")?;
        let body = self.block()?;

        let fail = if self.match_any(&[TokenType::Fail]) {
            let name = self.consume(TokenType::Identifier, "Expect error name after 'fail'.")?;
            let filter = if self.match_any(&[TokenType::DoubleColon]) {
                Some(self.consume(TokenType::Identifier, "Expect error type after '::'.")?.lexeme)
            } else {
                None
            };
            self.consume(TokenType::LBrace, "Expect '{' before fail block.")?;
            let fbody = self.block()?;
            Some(FailClause { name: name.lexeme, filter, body: fbody })
        } else {
            None
        };

        let finally = if self.match_any(&[TokenType::Finally]) {
            self.consume(TokenType::LBrace, "Expect '{' before finally block.")?;
            self.block()?
        } else {
            Vec::new()
        };

        Ok(self.make_stmt(StmtKind::Attempt(AttemptStmt { body, fail, finally }), &keyword))
    }

    fn panic_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        let message = if !self.check(TokenType::RBrace) && !self.is_at_end() {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(self.make_stmt(StmtKind::Panic(message), &keyword))
    }

    // ----- expressions -----

    fn expression(&mut self) -> ParseResult<Expr> {
        let expr = self.assignment()?;
        Ok(optimizer::fold(expr))
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.logical_or()?;

        if self.match_any(&[TokenType::Equal]) {
            let equals = self.previous().clone();
            let value = Box::new(self.assignment()?);

            return match expr.node {
                ExprKind::Variable(name) => {
                    Ok(Expr { id: expr.id, node: ExprKind::Assign { name, value }, line: expr.line, col: expr.col })
                }
                ExprKind::Get { object, name } => {
                    Ok(Expr { id: expr.id, node: ExprKind::Set { object, name, value }, line: expr.line, col: expr.col })
                }
                ExprKind::Index { object, index } => Ok(Expr {
                    id: expr.id,
                    node: ExprKind::IndexSet { object, index, value },
                    line: expr.line,
                    col: expr.col,
                }),
                _ => Err(SyntaxError::new(
                    "Invalid assignment target.",
                    equals.lexeme,
                    equals.line,
                    equals.col,
                )),
            };
        }

        Ok(expr)
    }

    fn logical_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.logical_and()?;
        while self.match_any(&[TokenType::Or]) {
            let op_tok = self.previous().clone();
            let right = self.logical_and()?;
            expr = self.make(
                ExprKind::Logical { op: LogicalOp::Or, left: Box::new(expr), right: Box::new(right) },
                &op_tok,
            );
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;
        while self.match_any(&[TokenType::And]) {
            let op_tok = self.previous().clone();
            let right = self.equality()?;
            expr = self.make(
                ExprKind::Logical { op: LogicalOp::And, left: Box::new(expr), right: Box::new(right) },
                &op_tok,
            );
        }
        Ok(expr)
    }

    fn binary(&mut self, op: BinOp, left: Expr, op_tok: Token, right: Expr) -> Expr {
        self.make(
            ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) },
            &op_tok,
        )
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.comparison()?;
        loop {
            let op = if self.match_any(&[TokenType::BangEqual]) {
                BinOp::Ne
            } else if self.match_any(&[TokenType::EqualEqual]) {
                BinOp::Eq
            } else {
                break;
            };
            let op_tok = self.previous().clone();
            let right = self.comparison()?;
            expr = self.binary(op, expr, op_tok, right);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.bitwise_or()?;
        loop {
            let op = if self.match_any(&[TokenType::Greater]) {
                BinOp::Gt
            } else if self.match_any(&[TokenType::GreaterEqual]) {
                BinOp::Ge
            } else if self.match_any(&[TokenType::Less]) {
                BinOp::Lt
            } else if self.match_any(&[TokenType::LessEqual]) {
                BinOp::Le
            } else {
                break;
            };
            let op_tok = self.previous().clone();
            let right = self.bitwise_or()?;
            expr = self.binary(op, expr, op_tok, right);
        }
        Ok(expr)
    }

    fn bitwise_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.bitwise_xor()?;
        while self.match_any(&[TokenType::Pipe]) {
            let op_tok = self.previous().clone();
            let right = self.bitwise_xor()?;
            expr = self.binary(BinOp::BitOr, expr, op_tok, right);
        }
        Ok(expr)
    }

    fn bitwise_xor(&mut self) -> ParseResult<Expr> {
        let mut expr = self.bitwise_and()?;
        while self.match_any(&[TokenType::Caret]) {
            let op_tok = self.previous().clone();
            let right = self.bitwise_and()?;
            expr = self.binary(BinOp::BitXor, expr, op_tok, right);
        }
        Ok(expr)
    }

    fn bitwise_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.range()?;
        while self.match_any(&[TokenType::Ampersand]) {
            let op_tok = self.previous().clone();
            let right = self.range()?;
            expr = self.binary(BinOp::BitAnd, expr, op_tok, right);
        }
        Ok(expr)
    }

    fn range(&mut self) -> ParseResult<Expr> {
        let mut expr = self.shift()?;
        while self.match_any(&[TokenType::To]) {
            let op_tok = self.previous().clone();
            let right = self.shift()?;
            expr = self.make(
                ExprKind::Range { lo: Box::new(expr), hi: Box::new(right) },
                &op_tok,
            );
        }
        Ok(expr)
    }

    fn shift(&mut self) -> ParseResult<Expr> {
        let mut expr = self.addition()?;
        loop {
            let op = if self.match_any(&[TokenType::Shl]) {
                BinOp::Shl
            } else if self.match_any(&[TokenType::Shr]) {
                BinOp::Shr
            } else {
                break;
            };
            let op_tok = self.previous().clone();
            let right = self.addition()?;
            expr = self.binary(op, expr, op_tok, right);
        }
        Ok(expr)
    }

    fn addition(&mut self) -> ParseResult<Expr> {
        let mut expr = self.multiplication()?;
        loop {
            let op = if self.match_any(&[TokenType::Plus]) {
                BinOp::Add
            } else if self.match_any(&[TokenType::Minus]) {
                BinOp::Sub
            } else {
                break;
            };
            let op_tok = self.previous().clone();
            let right = self.multiplication()?;
            expr = self.binary(op, expr, op_tok, right);
        }
        Ok(expr)
    }

    fn multiplication(&mut self) -> ParseResult<Expr> {
        let mut expr = self.prefixed()?;
        loop {
            let op = if self.match_any(&[TokenType::Star]) {
                BinOp::Mul
            } else if self.match_any(&[TokenType::Slash]) {
                BinOp::Div
            } else if self.match_any(&[TokenType::Percent]) {
                BinOp::Rem
            } else {
                break;
            };
            let op_tok = self.previous().clone();
            let right = self.prefixed()?;
            expr = self.binary(op, expr, op_tok, right);
        }
        Ok(expr)
    }

    fn prefixed(&mut self) -> ParseResult<Expr> {
        if self.match_any(&[
            TokenType::Bang,
            TokenType::Minus,
            TokenType::Tilde,
            TokenType::PlusPlus,
            TokenType::MinusMinus,
        ]) {
            let op_tok = self.previous().clone();
            let right = Box::new(self.prefixed()?);
            let node = match op_tok.ty {
                TokenType::Bang => ExprKind::Unary { op: UnaryOp::Not, inner: right },
                TokenType::Minus => ExprKind::Unary { op: UnaryOp::Neg, inner: right },
                TokenType::Tilde => ExprKind::Unary { op: UnaryOp::BitNot, inner: right },
                TokenType::PlusPlus => ExprKind::Prefix { op: StepOp::Inc, target: right },
                _ => ExprKind::Prefix { op: StepOp::Dec, target: right },
            };
            return Ok(self.make(node, &op_tok));
        }
        self.postfixed()
    }

    fn postfixed(&mut self) -> ParseResult<Expr> {
        let mut expr = self.base_value()?;

        loop {
            if self.match_any(&[TokenType::LParen]) {
                expr = self.finish_call(expr)?;
            } else if self.match_any(&[TokenType::LBracket]) {
                let index = self.expression()?;
                let bracket = self.consume(TokenType::RBracket, "Expect ']' after index.")?;
                expr = self.make(
                    ExprKind::Index { object: Box::new(expr), index: Box::new(index) },
                    &bracket,
                );
            } else if self.match_any(&[TokenType::Dot]) {
                let name = self.consume(TokenType::Identifier, "Expect property name after '.'.")?;
                expr = self.make(
                    ExprKind::Get { object: Box::new(expr), name: name.lexeme.clone() },
                    &name,
                );
            } else if self.match_any(&[TokenType::PlusPlus, TokenType::MinusMinus]) {
                let op_tok = self.previous().clone();
                let op = if op_tok.ty == TokenType::PlusPlus { StepOp::Inc } else { StepOp::Dec };
                expr = self.make(ExprKind::Postfix { op, target: Box::new(expr) }, &op_tok);
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        let mut args = Vec::new();
        if !self.check(TokenType::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.match_any(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenType::RParen, "Expect ')' after arguments.")?;
        Ok(self.make(ExprKind::Call { callee: Box::new(callee), args }, &paren))
    }

    fn base_value(&mut self) -> ParseResult<Expr> {
        if self.match_any(&[TokenType::Number]) {
            let tok = self.previous().clone();
            let n = match tok.literal {
                Some(Lit::Num(n)) => n,
                _ => 0.0,
            };
            return Ok(self.make(ExprKind::Literal(Literal::Number(n)), &tok));
        }
        if self.match_any(&[TokenType::Str]) {
            let tok = self.previous().clone();
            let s = match &tok.literal {
                Some(Lit::Str(s)) => s.clone(),
                _ => tok.lexeme.clone(),
            };
            return Ok(self.make(ExprKind::Literal(Literal::Str(s)), &tok));
        }
        if self.match_any(&[TokenType::True]) {
            let tok = self.previous().clone();
            return Ok(self.make(ExprKind::Literal(Literal::Bool(true)), &tok));
        }
        if self.match_any(&[TokenType::False]) {
            let tok = self.previous().clone();
            return Ok(self.make(ExprKind::Literal(Literal::Bool(false)), &tok));
        }
        if self.match_any(&[TokenType::Null]) {
            let tok = self.previous().clone();
            return Ok(self.make(ExprKind::Literal(Literal::Nil), &tok));
        }
        if self.match_any(&[TokenType::Identifier]) {
            let tok = self.previous().clone();
            return Ok(self.make(ExprKind::Variable(tok.lexeme.clone()), &tok));
        }
        if self.match_any(&[TokenType::This]) {
            let tok = self.previous().clone();
            return Ok(self.make(ExprKind::This, &tok));
        }

        if self.match_any(&[TokenType::LBracket]) {
            let tok = self.previous().clone();
            let mut elements = Vec::new();
            if !self.check(TokenType::RBracket) {
                loop {
                    elements.push(self.expression()?);
                    if !self.match_any(&[TokenType::Comma]) {
                        break;
                    }
                }
            }
            self.consume(TokenType::RBracket, "Expect ']' after list elements.")?;
            return Ok(self.make(ExprKind::ListLiteral(elements), &tok));
        }

        if self.match_any(&[TokenType::LParen]) {
            let tok = self.previous().clone();
            let expr = self.expression()?;
            self.consume(TokenType::RParen, "Expect ')' after expression.")?;
            return Ok(self.make(ExprKind::Grouping(Box::new(expr)), &tok));
        }

        if self.match_any(&[TokenType::LBrace]) {
            let tok = self.previous().clone();
            let mut items = Vec::new();
            if !self.check(TokenType::RBrace) {
                loop {
                    let key = self.expression()?;
                    self.consume(TokenType::Colon, "Expect ':' after map key.")?;
                    let value = self.expression()?;
                    items.push((key, value));
                    if !self.match_any(&[TokenType::Comma]) {
                        break;
                    }
                }
            }
            self.consume(TokenType::RBrace, "Expect '}' after map elements.")?;
            return Ok(self.make(ExprKind::MapLiteral(items), &tok));
        }

        Err(self.error_at_current("Expect a value or '('."))
    }
}

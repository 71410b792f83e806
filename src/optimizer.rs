//! Compile-time optimizer: literal alt ağaçlarda sabit katlama.

use crate::ast::*;

/// Single bottom-up rewrite over one expression tree. The parser feeds every
/// finished expression through here, so children are already folded when a
/// parent is rebuilt. Node ids survive the rewrite.
pub fn fold(expr: Expr) -> Expr {
    let Expr { id, node, line, col } = expr;
    let node = match node {
        // Parenthesis groups are unwrapped.
        ExprKind::Grouping(inner) => return fold(*inner),
        ExprKind::Binary { op, left, right } => {
            return fold_binary(id, line, col, op, fold(*left), fold(*right));
        }
        ExprKind::Logical { op, left, right } => {
            return fold_logical(id, line, col, op, fold(*left), *right);
        }
        ExprKind::Unary { op, inner } => {
            return fold_unary(id, line, col, op, fold(*inner));
        }
        ExprKind::Prefix { op, target } => ExprKind::Prefix { op, target: Box::new(fold(*target)) },
        ExprKind::Postfix { op, target } => {
            ExprKind::Postfix { op, target: Box::new(fold(*target)) }
        }
        ExprKind::Assign { name, value } => {
            ExprKind::Assign { name, value: Box::new(fold(*value)) }
        }
        ExprKind::Range { lo, hi } => {
            ExprKind::Range { lo: Box::new(fold(*lo)), hi: Box::new(fold(*hi)) }
        }
        ExprKind::Call { callee, args } => ExprKind::Call {
            callee: Box::new(fold(*callee)),
            args: args.into_iter().map(fold).collect(),
        },
        ExprKind::Index { object, index } => {
            ExprKind::Index { object: Box::new(fold(*object)), index: Box::new(fold(*index)) }
        }
        ExprKind::Get { object, name } => ExprKind::Get { object: Box::new(fold(*object)), name },
        ExprKind::Set { object, name, value } => ExprKind::Set {
            object: Box::new(fold(*object)),
            name,
            value: Box::new(fold(*value)),
        },
        ExprKind::IndexSet { object, index, value } => ExprKind::IndexSet {
            object: Box::new(fold(*object)),
            index: Box::new(fold(*index)),
            value: Box::new(fold(*value)),
        },
        ExprKind::ListLiteral(elements) => {
            ExprKind::ListLiteral(elements.into_iter().map(fold).collect())
        }
        ExprKind::MapLiteral(items) => ExprKind::MapLiteral(
            items.into_iter().map(|(k, v)| (fold(k), fold(v))).collect(),
        ),
        leaf @ (ExprKind::Literal(_) | ExprKind::Variable(_) | ExprKind::This) => leaf,
    };
    Expr { id, node, line, col }
}

fn as_number(expr: &Expr) -> Option<f64> {
    match &expr.node {
        ExprKind::Literal(Literal::Number(n)) => Some(*n),
        _ => None,
    }
}

fn as_literal(expr: &Expr) -> Option<&Literal> {
    match &expr.node {
        ExprKind::Literal(lit) => Some(lit),
        _ => None,
    }
}

fn literal_truthy(lit: &Literal) -> bool {
    !matches!(lit, Literal::Nil | Literal::Bool(false))
}

fn number(id: NodeId, line: u32, col: u32, n: f64) -> Expr {
    Expr { id, node: ExprKind::Literal(Literal::Number(n)), line, col }
}

fn rebuild(id: NodeId, line: u32, col: u32, op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr {
        id,
        node: ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) },
        line,
        col,
    }
}

/// Runtime truncates shift operands to i64 and yields 0 for distances
/// outside [0, 63]; the folder has to agree so folding stays invisible.
fn shift(l: f64, r: f64, op: BinOp) -> f64 {
    let dist = r as i64;
    if !(0..64).contains(&dist) {
        return 0.0;
    }
    let l = l as i64;
    match op {
        BinOp::Shl => (l << dist) as f64,
        _ => (l >> dist) as f64,
    }
}

fn fold_binary(id: NodeId, line: u32, col: u32, op: BinOp, left: Expr, right: Expr) -> Expr {
    // Right-hand identity: x+0, x-0, x*1, x/1 collapse to x.
    if let Some(r) = as_number(&right) {
        if matches!(op, BinOp::Add | BinOp::Sub) && r == 0.0 {
            return left;
        }
        if matches!(op, BinOp::Mul | BinOp::Div) && r == 1.0 {
            return left;
        }
    }

    if let (Some(l), Some(r)) = (as_number(&left), as_number(&right)) {
        match op {
            BinOp::Add => return number(id, line, col, l + r),
            BinOp::Sub => return number(id, line, col, l - r),
            BinOp::Mul => return number(id, line, col, l * r),
            BinOp::Div => {
                // Division by zero is left for the runtime to raise.
                if r != 0.0 {
                    return number(id, line, col, l / r);
                }
            }
            BinOp::BitAnd => return number(id, line, col, ((l as i64) & (r as i64)) as f64),
            BinOp::BitOr => return number(id, line, col, ((l as i64) | (r as i64)) as f64),
            BinOp::BitXor => return number(id, line, col, ((l as i64) ^ (r as i64)) as f64),
            BinOp::Shl | BinOp::Shr => return number(id, line, col, shift(l, r, op)),
            _ => {}
        }
    }

    rebuild(id, line, col, op, left, right)
}

fn fold_logical(id: NodeId, line: u32, col: u32, op: LogicalOp, left: Expr, right: Expr) -> Expr {
    if let Some(lit) = as_literal(&left) {
        let truthy = literal_truthy(lit);
        // Short-circuit: the right side is never evaluated. The runtime
        // returns the truthiness of the selected operand as a boolean, so
        // the fold coerces non-boolean literals the same way.
        if op == LogicalOp::Or && truthy {
            return Expr { id, node: ExprKind::Literal(Literal::Bool(true)), line, col };
        }
        if op == LogicalOp::And && !truthy {
            return Expr { id, node: ExprKind::Literal(Literal::Bool(false)), line, col };
        }
    }
    let right = fold(right);
    Expr {
        id,
        node: ExprKind::Logical { op, left: Box::new(left), right: Box::new(right) },
        line,
        col,
    }
}

fn fold_unary(id: NodeId, line: u32, col: u32, op: UnaryOp, inner: Expr) -> Expr {
    match (op, as_literal(&inner)) {
        (UnaryOp::Neg, Some(Literal::Number(n))) => return number(id, line, col, -n),
        (UnaryOp::Not, Some(lit)) => {
            let value = !literal_truthy(lit);
            return Expr { id, node: ExprKind::Literal(Literal::Bool(value)), line, col };
        }
        (UnaryOp::BitNot, Some(Literal::Number(n))) => {
            return number(id, line, col, !(*n as i64) as f64);
        }
        _ => {}
    }
    Expr { id, node: ExprKind::Unary { op, inner: Box::new(inner) }, line, col }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax_analyzer::{Lexer, Parser};
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    fn parse_expr(src: &str) -> Expr {
        let tokens = Lexer::scan(src).expect("lex failed");
        let aliases = Rc::new(RefCell::new(HashSet::new()));
        let stmts = Parser::new(tokens, aliases, NodeIdGen::new()).parse().expect("parse failed");
        match stmts.into_iter().next().map(|s| s.node) {
            Some(StmtKind::Expression(e)) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    fn expect_number(expr: &Expr) -> f64 {
        match &expr.node {
            ExprKind::Literal(Literal::Number(n)) => *n,
            other => panic!("expected folded number, got {:?}", other),
        }
    }

    #[test]
    fn folds_arithmetic_subtrees() {
        assert_eq!(expect_number(&parse_expr("3 + 4 * 2")), 11.0);
        assert_eq!(expect_number(&parse_expr("(1 + 2) * (3 + 4)")), 21.0);
    }

    #[test]
    fn division_by_zero_is_not_folded() {
        let expr = parse_expr("1 / 0");
        assert!(matches!(expr.node, ExprKind::Binary { op: BinOp::Div, .. }));
    }

    #[test]
    fn identity_operands_collapse() {
        let expr = parse_expr("x + 0");
        assert!(matches!(expr.node, ExprKind::Variable(ref n) if n == "x"));
        let expr = parse_expr("x * 1");
        assert!(matches!(expr.node, ExprKind::Variable(ref n) if n == "x"));
    }

    #[test]
    fn folds_bitwise_and_shift() {
        assert_eq!(expect_number(&parse_expr("6 & 3")), 2.0);
        assert_eq!(expect_number(&parse_expr("1 << 4")), 16.0);
        assert_eq!(expect_number(&parse_expr("16 >> 2")), 4.0);
        assert_eq!(expect_number(&parse_expr("1 << 70")), 0.0);
    }

    #[test]
    fn folds_unary_literals() {
        assert_eq!(expect_number(&parse_expr("-5")), -5.0);
        assert_eq!(expect_number(&parse_expr("~0")), -1.0);
        let expr = parse_expr("!null");
        assert!(matches!(expr.node, ExprKind::Literal(Literal::Bool(true))));
    }

    #[test]
    fn short_circuit_keeps_only_the_selected_side() {
        let expr = parse_expr("true or x");
        assert!(matches!(expr.node, ExprKind::Literal(Literal::Bool(true))));
        let expr = parse_expr("false and x");
        assert!(matches!(expr.node, ExprKind::Literal(Literal::Bool(false))));
    }

    #[test]
    fn short_circuit_coerces_non_boolean_literals() {
        // The runtime returns the truthiness of the selected operand, not
        // the operand itself; the fold has to agree.
        let expr = parse_expr("5 or 0");
        assert!(matches!(expr.node, ExprKind::Literal(Literal::Bool(true))));
        let expr = parse_expr("null and x");
        assert!(matches!(expr.node, ExprKind::Literal(Literal::Bool(false))));
        let expr = parse_expr("\"s\" or x");
        assert!(matches!(expr.node, ExprKind::Literal(Literal::Bool(true))));
    }

    #[test]
    fn variables_and_calls_are_untouched() {
        let expr = parse_expr("f(1 + 2)");
        match expr.node {
            ExprKind::Call { args, .. } => {
                assert_eq!(expect_number(&args[0]), 3.0);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }
}

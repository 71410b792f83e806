use ryl::syntax_analyzer::{Lexer, Parser};
use ryl::value::RuntimeError;
use ryl::{run, ErrorKind, Interpreter, Resolver, Value};

fn run_src(src: &str) -> Interpreter {
    let mut interp = Interpreter::new();
    let mut resolver = Resolver::new();
    run(src, &mut interp, &mut resolver);
    assert!(!interp.had_error, "unexpected error in: {}", src);
    interp
}

/// Drives the pipeline by hand so the runtime error itself is observable.
fn run_expect_error(src: &str) -> (Interpreter, RuntimeError) {
    let tokens = Lexer::scan(src).expect("lex failed");
    let mut interp = Interpreter::new();
    let stmts = Parser::new(tokens, interp.type_aliases.clone(), interp.node_ids())
        .parse()
        .expect("parse failed");
    let mut resolver = Resolver::new();
    interp.add_locals(resolver.resolve(&stmts).expect("resolve failed"));
    let err = interp.interpret(&stmts).expect_err("expected a runtime error");
    (interp, err)
}

fn number(interp: &Interpreter, name: &str) -> f64 {
    match interp.global(name) {
        Some(Value::Number(n)) => n,
        other => panic!("expected number in '{}', got {:?}", name, other),
    }
}

fn string(interp: &Interpreter, name: &str) -> String {
    match interp.global(name) {
        Some(Value::Str(s)) => s.to_string(),
        other => panic!("expected string in '{}', got {:?}", name, other),
    }
}

fn boolean(interp: &Interpreter, name: &str) -> bool {
    match interp.global(name) {
        Some(Value::Bool(b)) => b,
        other => panic!("expected bool in '{}', got {:?}", name, other),
    }
}

#[test]
fn numeric_coercion_covers_strings() {
    let interp = run_src(
        r#"
            data a = "10" / 2
            data b = "5" * "2"
            data c = " 3 " * 2
            data d = "10" > "9"
        "#,
    );
    assert_eq!(number(&interp, "a"), 5.0);
    assert_eq!(number(&interp, "b"), 10.0);
    assert_eq!(number(&interp, "c"), 6.0);
    assert!(boolean(&interp, "d"));
}

#[test]
fn plus_concatenates_when_either_side_is_a_string() {
    let interp = run_src(
        r#"
            data a = "1" + 2
            data b = 2 + "1"
            data c = "v: " + null
        "#,
    );
    assert_eq!(string(&interp, "a"), "12");
    assert_eq!(string(&interp, "b"), "21");
    assert_eq!(string(&interp, "c"), "v: nil");
}

#[test]
fn list_arithmetic() {
    let interp = run_src(
        r#"
            data a = [1, 2] + [3]
            data b = [1, 2, 3] - 2
            data c = [1, 2, 3, 2] - [2, 3]
            data d = [1, 2] * 2
        "#,
    );
    assert_eq!(
        interp.global("a"),
        Some(Value::list(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]))
    );
    assert_eq!(
        interp.global("b"),
        Some(Value::list(vec![Value::Number(1.0), Value::Number(3.0)]))
    );
    assert_eq!(interp.global("c"), Some(Value::list(vec![Value::Number(1.0)])));
    assert_eq!(
        interp.global("d"),
        Some(Value::list(vec![
            Value::Number(1.0),
            Value::Number(2.0),
            Value::Number(1.0),
            Value::Number(2.0),
        ]))
    );
}

#[test]
fn string_repetition() {
    let interp = run_src(r#"data r = "ab" * 3"#);
    assert_eq!(string(&interp, "r"), "ababab");
}

#[test]
fn division_and_remainder_by_zero_are_math_errors() {
    let (_, err) = run_expect_error("data x = 1 / 0");
    assert_eq!(err.kind, ErrorKind::Math);
    let (_, err) = run_expect_error("data x = 5 % 0");
    assert_eq!(err.kind, ErrorKind::Math);
}

#[test]
fn mismatched_operands_are_type_errors() {
    let (_, err) = run_expect_error("data x = [1] < 2");
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("matching types"));
}

#[test]
fn equality_is_structural_and_inequality_is_its_negation() {
    let interp = run_src(
        r#"
            data a = [1, [2]] == [1, [2]]
            data b = [1] != [2]
            data c = null == null
            data m1 = {"k": 1}
            data m2 = {"k": 1}
            data d = m1 == m2
            data e = m1 == m1
            data f = "1" == 1
        "#,
    );
    assert!(boolean(&interp, "a"));
    assert!(boolean(&interp, "b"));
    assert!(boolean(&interp, "c"));
    assert!(!boolean(&interp, "d"));
    assert!(boolean(&interp, "e"));
    assert!(boolean(&interp, "f"));
}

#[test]
fn logical_operators_return_booleans_and_short_circuit() {
    let interp = run_src(
        r#"
            data hits = 0
            func bump() { hits = hits + 1  return true }
            data a = false and bump()
            data b = true or bump()
            data c = 1 and "x"
            data d = null or false
        "#,
    );
    assert_eq!(number(&interp, "hits"), 0.0);
    assert!(!boolean(&interp, "a"));
    assert!(boolean(&interp, "b"));
    assert!(boolean(&interp, "c"));
    assert!(!boolean(&interp, "d"));
}

#[test]
fn bitwise_and_shift_on_variables() {
    let interp = run_src(
        r#"
            data a = 6
            data b = 3
            data and_r = a & b
            data or_r = a | b
            data xor_r = a ^ b
            data not_r = ~a
            data shl = b << 2
            data shr = 16 >> b - 1
            data far = 200
            data wide = 1 << far
        "#,
    );
    assert_eq!(number(&interp, "and_r"), 2.0);
    assert_eq!(number(&interp, "or_r"), 7.0);
    assert_eq!(number(&interp, "xor_r"), 5.0);
    assert_eq!(number(&interp, "not_r"), -7.0);
    assert_eq!(number(&interp, "shl"), 12.0);
    assert_eq!(number(&interp, "shr"), 4.0);
    assert_eq!(number(&interp, "wide"), 0.0);
}

#[test]
fn prefix_returns_new_postfix_returns_old() {
    let interp = run_src(
        r#"
            data i = 5
            data a = ++i
            data b = i++
            data c = --i
            data d = i--
            data rest = i
        "#,
    );
    assert_eq!(number(&interp, "a"), 6.0);
    assert_eq!(number(&interp, "b"), 6.0);
    assert_eq!(number(&interp, "c"), 6.0);
    assert_eq!(number(&interp, "d"), 6.0);
    assert_eq!(number(&interp, "rest"), 5.0);
}

#[test]
fn increment_needs_a_plain_variable() {
    let (_, err) = run_expect_error("data xs = [1]  ++xs[0]");
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("Target must be a variable"));
}

#[test]
fn ranges_are_inclusive_and_run_both_directions() {
    let interp = run_src(
        r#"
            data up = 1 to 4
            data down = 3 to 1
        "#,
    );
    assert_eq!(
        interp.global("up"),
        Some(Value::list(vec![
            Value::Number(1.0),
            Value::Number(2.0),
            Value::Number(3.0),
            Value::Number(4.0),
        ]))
    );
    assert_eq!(
        interp.global("down"),
        Some(Value::list(vec![Value::Number(3.0), Value::Number(2.0), Value::Number(1.0)]))
    );
}

#[test]
fn list_indexing_and_bounds() {
    let interp = run_src(
        r#"
            data xs = [10, 20, 30]
            data a = xs[1]
            xs[0] = 9
            data b = xs[0]
        "#,
    );
    assert_eq!(number(&interp, "a"), 20.0);
    assert_eq!(number(&interp, "b"), 9.0);

    let (_, err) = run_expect_error("data xs = [1]  data y = xs[3]");
    assert_eq!(err.kind, ErrorKind::Range);
    let (_, err) = run_expect_error("data xs = [1]  data y = xs[\"a\"]");
    assert_eq!(err.kind, ErrorKind::Range);
}

#[test]
fn map_index_creates_on_write_but_not_on_read() {
    let interp = run_src(
        r#"
            data m = {"a": 1}
            m["b"] = 2
            data b = m["b"]
        "#,
    );
    assert_eq!(number(&interp, "b"), 2.0);

    let (_, err) = run_expect_error(r#"data m = {"a": 1}  data x = m["missing"]"#);
    assert_eq!(err.kind, ErrorKind::Name);
}

#[test]
fn shared_lists_alias_through_assignment() {
    let interp = run_src(
        r#"
            data a = [1, 2]
            data b = a
            b[0] = 9
            data r = a[0]
        "#,
    );
    assert_eq!(number(&interp, "r"), 9.0);
}

#[test]
fn constrained_cells_reject_mismatched_writes() {
    let (_, err) = run_expect_error("data::num x = 1  x = \"no\"");
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("expects a number"));

    // A map cell accepts map values.
    let interp = run_src(r#"data::map m = {"a": 1}  m = {"b": 2}  data n = len(m)"#);
    assert_eq!(number(&interp, "n"), 1.0);

    let (_, err) = run_expect_error(r#"data::map m = {"a": 1}  m = 5"#);
    assert_eq!(err.kind, ErrorKind::Type);
}

#[test]
fn builtin_len_pop_and_type() {
    let interp = run_src(
        r#"
            data xs = [1, 2, 3]
            data last = pop(xs)
            data n = len(xs)
            data sl = len("hello")
            data t1 = type(1)
            data t2 = type("s")
            data t3 = type(xs)
            data t4 = type(null)
        "#,
    );
    assert_eq!(number(&interp, "last"), 3.0);
    assert_eq!(number(&interp, "n"), 2.0);
    assert_eq!(number(&interp, "sl"), 5.0);
    assert_eq!(string(&interp, "t1"), "num");
    assert_eq!(string(&interp, "t2"), "string");
    assert_eq!(string(&interp, "t3"), "list");
    assert_eq!(string(&interp, "t4"), "null");

    let (_, err) = run_expect_error("pop([])");
    assert_eq!(err.kind, ErrorKind::Range);
}

#[test]
fn calling_a_non_callable_is_a_type_error() {
    let (_, err) = run_expect_error("data x = 5  x()");
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("Can only call functions and classes"));
}

#[test]
fn wrong_arity_reports_the_expected_range() {
    let (_, err) = run_expect_error("func g(a) { return a }  g()");
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("Expected 1 arguments but got 0"));

    let (_, err) = run_expect_error("func h(a, b = 1) { return a }  h(1, 2, 3)");
    assert!(err.message.contains("between 1 and 2"));
}

#[test]
fn undefined_variable_is_a_name_error() {
    let (_, err) = run_expect_error("data x = missing + 1");
    assert_eq!(err.kind, ErrorKind::Name);
    assert!(err.message.contains("Undefined variable 'missing'"));
}

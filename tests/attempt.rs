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

fn log_of(interp: &Interpreter) -> Vec<String> {
    match interp.global("log") {
        Some(Value::List(items)) => items
            .borrow()
            .iter()
            .map(|v| match v {
                Value::Str(s) => s.to_string(),
                other => panic!("unexpected log entry {:?}", other),
            })
            .collect(),
        other => panic!("expected log list, got {:?}", other),
    }
}

#[test]
fn typed_fail_catches_and_finally_follows() {
    let interp = run_src(
        r#"
            data log = []
            attempt {
                data x = 1 / 0
            } fail e::MathError {
                log = log + "caught"
            } finally {
                log = log + "done"
            }
        "#,
    );
    assert_eq!(log_of(&interp), vec!["caught", "done"]);
}

#[test]
fn fail_binds_the_error_message() {
    let interp = run_src(
        r#"
            data msg = null
            attempt { data x = 1 / 0 } fail e { msg = e }
        "#,
    );
    assert_eq!(interp.global("msg"), Some(Value::string("Cannot divide by zero.")));
}

#[test]
fn finally_runs_on_the_clean_path_too() {
    let interp = run_src(
        r#"
            data log = []
            attempt { log = log + "body" } fail e { log = log + "fail" } finally { log = log + "fin" }
        "#,
    );
    assert_eq!(log_of(&interp), vec!["body", "fin"]);
}

#[test]
fn unmatched_filter_runs_finally_then_reraises() {
    let (interp, err) = run_expect_error(
        r#"
            data log = []
            attempt { panic "boom" } fail e::MathError { log = log + "fail" } finally { log = log + "fin" }
        "#,
    );
    assert_eq!(err.kind, ErrorKind::Panic);
    assert_eq!(err.message, "boom");
    assert_eq!(log_of(&interp), vec!["fin"]);
}

#[test]
fn attempt_without_fail_does_not_consume() {
    let (interp, err) = run_expect_error(
        r#"
            data log = []
            attempt { data x = 1 / 0 } finally { log = log + "fin" }
        "#,
    );
    assert_eq!(err.kind, ErrorKind::Math);
    assert_eq!(log_of(&interp), vec!["fin"]);
}

#[test]
fn untyped_fail_consumes_panics() {
    let interp = run_src(
        r#"
            data msg = null
            attempt { panic "custom " + 7 } fail e { msg = e }
        "#,
    );
    assert_eq!(interp.global("msg"), Some(Value::string("custom 7")));
}

#[test]
fn typed_filters_match_their_kind_only() {
    let interp = run_src(
        r#"
            data log = []
            attempt {
                attempt { data z = 1 % 0 } fail e::TypeError { log = log + "inner" } finally { log = log + "ifin" }
            } fail e::MathError {
                log = log + "outer"
            }
        "#,
    );
    assert_eq!(log_of(&interp), vec!["ifin", "outer"]);
}

#[test]
fn name_and_type_filters_work() {
    let interp = run_src(
        r#"
            data kinds = []
            attempt { data x = nothing } fail e::NameError { kinds = kinds + "name" }
            attempt { data y = 1  y() } fail e::TypeError { kinds = kinds + "type" }
            attempt { data xs = [1]  xs[9] } fail e::RangeError { kinds = kinds + "range" }
        "#,
    );
    match interp.global("kinds") {
        Some(Value::List(items)) => assert_eq!(items.borrow().len(), 3),
        other => panic!("expected list, got {:?}", other),
    }
}

#[test]
fn return_inside_attempt_still_runs_finally() {
    let interp = run_src(
        r#"
            data side = 0
            func f() {
                attempt { return 1 } finally { side = side + 1 }
                return 2
            }
            data r = f()
        "#,
    );
    assert_eq!(interp.global("r"), Some(Value::Number(1.0)));
    assert_eq!(interp.global("side"), Some(Value::Number(1.0)));
}

#[test]
fn errors_unwind_through_call_frames_to_the_nearest_attempt() {
    let interp = run_src(
        r#"
            data msg = null
            func inner() { data x = 1 / 0 }
            func outer() { inner() }
            attempt { outer() } fail e::MathError { msg = e }
        "#,
    );
    assert_eq!(interp.global("msg"), Some(Value::string("Cannot divide by zero.")));
}

#[test]
fn panic_without_message_raises_an_empty_one() {
    let (_, err) = run_expect_error("panic");
    assert_eq!(err.kind, ErrorKind::Panic);
    assert_eq!(err.message, "");
}

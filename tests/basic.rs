use ryl::{run, Interpreter, Resolver, Value};

fn run_src(src: &str) -> Interpreter {
    let mut interp = Interpreter::new();
    let mut resolver = Resolver::new();
    run(src, &mut interp, &mut resolver);
    interp
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

#[test]
fn constrained_declaration_with_folded_initializer() {
    let interp = run_src("data::num x = 3 + 4 * 2");
    assert!(!interp.had_error);
    assert_eq!(number(&interp, "x"), 11.0);
}

#[test]
fn list_append_leaves_the_original_untouched() {
    let interp = run_src(
        r#"
            data list xs = [1, 2, 3]
            data ys = xs + 4
            data n = len(xs)
        "#,
    );
    assert!(!interp.had_error);
    assert_eq!(
        interp.global("ys"),
        Some(Value::list(vec![
            Value::Number(1.0),
            Value::Number(2.0),
            Value::Number(3.0),
            Value::Number(4.0),
        ]))
    );
    assert_eq!(number(&interp, "n"), 3.0);
    let ys = interp.global("ys").unwrap();
    assert_eq!(ryl::native::value_to_string(&ys), "[1, 2, 3, 4]");
}

#[test]
fn recursive_fibonacci() {
    let interp = run_src(
        r#"
            func fib(n) {
                if n < 2 { return n }
                return fib(n - 1) + fib(n - 2)
            }
            data result = fib(10)
        "#,
    );
    assert!(!interp.had_error);
    assert_eq!(number(&interp, "result"), 55.0);
}

#[test]
fn foreach_concatenates_onto_a_string() {
    let interp = run_src(
        r#"
            data s = "x"
            foreach data c in [1, 2, 3] { s = s + c }
        "#,
    );
    assert!(!interp.had_error);
    assert_eq!(string(&interp, "s"), "x123");
}

#[test]
fn string_interpolation_desugars_to_concatenation() {
    let interp = run_src(
        r#"
            data name = "ry"
            data msg = "hi ${name}!"
        "#,
    );
    assert!(!interp.had_error);
    assert_eq!(string(&interp, "msg"), "hi ry!");
}

#[test]
fn while_loop_with_stop() {
    let interp = run_src(
        r#"
            data i = 0
            while true {
                i = i + 1
                if i == 4 { stop }
            }
        "#,
    );
    assert!(!interp.had_error);
    assert_eq!(number(&interp, "i"), 4.0);
}

#[test]
fn foreach_with_skip_and_stop() {
    let interp = run_src(
        r#"
            data total = 0
            foreach data n in 1 to 10 {
                if n == 3 { skip }
                if n > 5 { stop }
                total = total + n
            }
        "#,
    );
    assert!(!interp.had_error);
    assert_eq!(number(&interp, "total"), 12.0);
}

#[test]
fn for_loop_accumulates() {
    let interp = run_src(
        r#"
            data sum = 0
            for data i = 0, i < 5, i = i + 1 { sum = sum + i }
        "#,
    );
    assert!(!interp.had_error);
    assert_eq!(number(&interp, "sum"), 10.0);
}

#[test]
fn do_until_runs_the_body_first() {
    let interp = run_src(
        r#"
            data i = 0
            do { i = i + 1 } until i >= 3
            data once = 10
            do { once = once + 1 } until true
        "#,
    );
    assert!(!interp.had_error);
    assert_eq!(number(&interp, "i"), 3.0);
    assert_eq!(number(&interp, "once"), 11.0);
}

#[test]
fn unless_is_an_inverted_if() {
    let interp = run_src(
        r#"
            data r = 0
            unless false { r = 1 }
            unless true { r = 2 } else { r = r + 10 }
        "#,
    );
    assert!(!interp.had_error);
    assert_eq!(number(&interp, "r"), 11.0);
}

#[test]
fn closures_bind_statically() {
    let interp = run_src(
        r#"
            data r1 = null
            data r2 = null
            data a = "global"
            {
                func get() { return a }
                r1 = get()
                data a = "block"
                r2 = get()
            }
        "#,
    );
    assert!(!interp.had_error);
    assert_eq!(string(&interp, "r1"), "global");
    assert_eq!(string(&interp, "r2"), "global");
}

#[test]
fn default_parameters_fill_missing_arguments() {
    let interp = run_src(
        r#"
            func greet(name, punct = "!") { return name + punct }
            func add(a, b = a + 1) { return a + b }
            data g1 = greet("hi")
            data g2 = greet("hi", "?")
            data s = add(2)
        "#,
    );
    assert!(!interp.had_error);
    assert_eq!(string(&interp, "g1"), "hi!");
    assert_eq!(string(&interp, "g2"), "hi?");
    assert_eq!(number(&interp, "s"), 5.0);
}

#[test]
fn lex_and_parse_errors_leave_nothing_to_run() {
    let interp = run_src("data x = 1 $ 2");
    assert!(interp.had_error);
    assert_eq!(interp.global("x"), None);

    let interp = run_src("data y = (1 + 2");
    assert!(interp.had_error);
    assert_eq!(interp.global("y"), None);
}

#[test]
fn reset_clears_the_error_flag_and_aliases() {
    let mut interp = Interpreter::new();
    let mut resolver = Resolver::new();
    run("alias data::num as int  int x = 1  data y = (", &mut interp, &mut resolver);
    assert!(interp.had_error);
    assert!(interp.type_aliases.borrow().contains("int"));

    ryl::reset(&mut interp);
    assert!(!interp.had_error);
    assert!(interp.type_aliases.borrow().is_empty());
}

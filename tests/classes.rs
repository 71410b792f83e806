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
fn construction_runs_init_with_this_bound() {
    let interp = run_src(
        r#"
            class Point {
                data x = 0
                data y = 0
                func init(x, y) {
                    this.x = x
                    this.y = y
                }
            }
            data p = Point(1, 2)
            data px = p.x
            data py = p.y
        "#,
    );
    assert_eq!(number(&interp, "px"), 1.0);
    assert_eq!(number(&interp, "py"), 2.0);
}

#[test]
fn init_accepts_default_parameters() {
    let interp = run_src(
        r#"
            class P {
                data x = 0
                func init(a, b = 2) { this.x = a + b }
            }
            data one = P(1).x
            data two = P(1, 5).x
        "#,
    );
    assert_eq!(number(&interp, "one"), 3.0);
    assert_eq!(number(&interp, "two"), 6.0);
}

#[test]
fn parent_method_binds_the_current_instance() {
    let interp = run_src(
        r#"
            class A {
                func hi() { return "A" }
            }
            class B childof A {
                func hi() { return parent.hi() + "B" }
            }
            data r = B().hi()
        "#,
    );
    assert_eq!(string(&interp, "r"), "AB");
}

#[test]
fn method_lookup_prefers_the_override() {
    let interp = run_src(
        r#"
            class Animal {
                func speak() { return "..." }
                func name() { return "animal" }
            }
            class Dog childof Animal {
                func speak() { return "woof" }
            }
            data d = Dog()
            data s = d.speak()
            data n = d.name()
        "#,
    );
    assert_eq!(string(&interp, "s"), "woof");
    assert_eq!(string(&interp, "n"), "animal");
}

#[test]
fn inherited_field_blueprints_are_merged() {
    let interp = run_src(
        r#"
            class Base {
                data kind = "base"
                data shared = 1
            }
            class Child childof Base {
                data kind = "child"
            }
            data c = Child()
            data kind = c.kind
            data shared = c.shared
        "#,
    );
    assert_eq!(string(&interp, "kind"), "child");
    assert_eq!(number(&interp, "shared"), 1.0);
}

#[test]
fn private_members_are_internal_only() {
    let interp = run_src(
        r#"
            class Account {
                private data balance = 100
                func deposit(n) {
                    this.balance = this.balance + n
                    return this.balance
                }
            }
            data acc = Account()
            data r = acc.deposit(5)
        "#,
    );
    assert_eq!(number(&interp, "r"), 105.0);

    let (_, err) = run_expect_error(
        r#"
            class Account {
                private data balance = 100
            }
            data acc = Account()
            data x = acc.balance
        "#,
    );
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("private member 'balance'"));

    let (_, err) = run_expect_error(
        r#"
            class Account {
                private data balance = 100
            }
            data acc = Account()
            acc.balance = 0
        "#,
    );
    assert!(err.message.contains("private member 'balance'"));
}

#[test]
fn constrained_fields_reject_bad_writes() {
    let (_, err) = run_expect_error(
        r#"
            class Box {
                data::num size = 0
            }
            data b = Box()
            b.size = "big"
        "#,
    );
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("expects a number"));
}

#[test]
fn undefined_property_is_a_name_error() {
    let (_, err) = run_expect_error(
        r#"
            class Empty {}
            data e = Empty()
            data x = e.nothing
        "#,
    );
    assert_eq!(err.kind, ErrorKind::Name);
    assert!(err.message.contains("Undefined property 'nothing'"));
}

#[test]
fn superclass_must_be_a_class() {
    let (_, err) = run_expect_error("data NotAClass = 5  class C childof NotAClass {}");
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("Superclass must be a class"));
}

#[test]
fn instances_compare_by_identity() {
    let interp = run_src(
        r#"
            class Thing {}
            data a = Thing()
            data b = Thing()
            data same = a == a
            data diff = a == b
        "#,
    );
    assert_eq!(interp.global("same"), Some(Value::Bool(true)));
    assert_eq!(interp.global("diff"), Some(Value::Bool(false)));
}

#[test]
fn namespaces_expose_members_and_aliases() {
    let interp = run_src(
        r#"
            namespace Math {
                data pi = 3.14
                func square(n) { return n * n }
                alias data::num as number
            }
            data r = Math.square(4)
            data p = Math.pi
            Math.number k = 7
        "#,
    );
    assert_eq!(number(&interp, "r"), 16.0);
    assert_eq!(number(&interp, "p"), 3.14);
    assert_eq!(number(&interp, "k"), 7.0);
}

#[test]
fn namespaced_constraints_are_enforced() {
    let (_, err) = run_expect_error(
        r#"
            namespace Types { alias data::num as number }
            Types.number k = 7
            k = "no"
        "#,
    );
    assert_eq!(err.kind, ErrorKind::Type);
}

#[test]
fn namespace_property_assignment_defines_new_cells() {
    let interp = run_src(
        r#"
            namespace Config {}
            Config.debug = true
            data d = Config.debug
        "#,
    );
    assert_eq!(interp.global("d"), Some(Value::Bool(true)));
}

#[test]
fn aliases_carry_type_constraints() {
    let interp = run_src(
        r#"
            alias data::num as int
            int y = 5
            y = 6
        "#,
    );
    assert_eq!(number(&interp, "y"), 6.0);

    let (_, err) = run_expect_error("alias data::num as int  int y = 5  y = \"s\"");
    assert_eq!(err.kind, ErrorKind::Type);
}

#[test]
fn value_aliases_are_plain_bindings() {
    let interp = run_src(
        r#"
            data v = 41
            alias v as w
            data r = w + 1
        "#,
    );
    assert_eq!(number(&interp, "r"), 42.0);
}

#[test]
fn return_type_constraints_are_checked() {
    let interp = run_src(
        r#"
            func ok() -> string { return "fine" }
            data r = ok()
        "#,
    );
    assert_eq!(string(&interp, "r"), "fine");

    let (_, err) = run_expect_error("func bad() -> num { return \"s\" }  bad()");
    assert_eq!(err.kind, ErrorKind::Type);
}

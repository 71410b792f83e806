use std::fs;

use ryl::{run, Interpreter, Resolver, Value};

/// Everything module-related lives in one test because the search path is
/// relative to the process working directory.
#[test]
fn imports_execute_in_the_global_scope() {
    let dir = std::env::temp_dir().join(format!("ryl-module-test-{}", std::process::id()));
    fs::create_dir_all(dir.join("modules")).unwrap();
    fs::write(
        dir.join("helper.ry"),
        "func twice(n) { return n * 2 }\ndata shared = 10\n",
    )
    .unwrap();
    fs::write(dir.join("modules/a.ry"), "data from_a = 1\n").unwrap();
    fs::write(dir.join("modules/b.ry"), "data from_b = from_a + 1\n").unwrap();
    fs::write(dir.join("modules/ignored.txt"), "not a module\n").unwrap();
    std::env::set_current_dir(&dir).unwrap();

    let mut interp = Interpreter::new();
    let mut resolver = Resolver::new();

    run(
        r#"
            import("helper.ry")
            data r = twice(shared)
        "#,
        &mut interp,
        &mut resolver,
    );
    assert!(!interp.had_error);
    assert_eq!(interp.global("r"), Some(Value::Number(20.0)));

    // Wildcard imports read every .ry file of the directory; files load in
    // path order, so b.ry can see a.ry's globals.
    run(r#"import("modules/*")"#, &mut interp, &mut resolver);
    assert!(!interp.had_error);
    assert_eq!(interp.global("from_a"), Some(Value::Number(1.0)));
    assert_eq!(interp.global("from_b"), Some(Value::Number(2.0)));

    // A second import of the same module is skipped.
    run(
        r#"
            shared = 99
            import("helper.ry")
            data after = shared
        "#,
        &mut interp,
        &mut resolver,
    );
    assert!(!interp.had_error);
    assert_eq!(interp.global("after"), Some(Value::Number(99.0)));

    // A missing module reports to stderr but does not halt the program.
    run(
        r#"
            import("no_such_module.ry")
            data still = 1
        "#,
        &mut interp,
        &mut resolver,
    );
    assert!(!interp.had_error);
    assert_eq!(interp.global("still"), Some(Value::Number(1.0)));

    let _ = fs::remove_dir_all(&dir);
}

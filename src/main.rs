//! Ryl interpreter: dosya veya REPL.
//!
//! Kullanım:
//!   ryl run <file.ry>
//!   ryl              # REPL

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};

use ryl::{reset, run, Interpreter, Resolver};

fn main() {
    env_logger::init();

    let mut interp = Interpreter::new();
    let mut resolver = Resolver::new();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        run_repl(&mut interp, &mut resolver);
        return;
    }

    match args[0].as_str() {
        "run" => {
            if args.len() != 2 {
                eprintln!("Usage: ryl run <script>");
                std::process::exit(1);
            }
            let src = fs::read_to_string(&args[1]).unwrap_or_else(|e| {
                eprintln!("Could not open file {}: {}", args[1], e);
                std::process::exit(1);
            });
            run(&src, &mut interp, &mut resolver);
            if interp.had_error {
                std::process::exit(65);
            }
        }
        "-v" | "--version" => println!("Ryl version {}", env!("CARGO_PKG_VERSION")),
        "-h" | "--help" => {
            println!("Ryl usage:");
            println!("  ryl              Launch the REPL");
            println!("  ryl run <file>   Run a .ry script");
            println!("  ryl -v           Show version");
        }
        other => {
            eprintln!("Unknown command '{}'. Try 'ryl -h'.", other);
            std::process::exit(1);
        }
    }
}

fn run_repl(interp: &mut Interpreter, resolver: &mut Resolver) {
    println!("Ryl REPL {}  (\";q\" quits)", env!("CARGO_PKG_VERSION"));
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    let mut buffer = String::new();
    let mut depth: i32 = 0;

    loop {
        if buffer.is_empty() {
            print!(">> ");
        } else {
            print!("{} ", ".".repeat(depth.max(0) as usize * 4));
        }
        let _ = stdout.flush();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim_end();

        if buffer.is_empty() {
            if line == ";q" {
                break;
            }
            if line == "clear" {
                print!("\x1B[2J\x1B[1;1H");
                reset(interp);
                continue;
            }
            if line.is_empty() {
                continue;
            }
        } else if line.is_empty() {
            // An empty line inside an open bracket cancels the input.
            println!("(input cancelled)");
            buffer.clear();
            depth = 0;
            continue;
        }

        depth += bracket_balance(line);
        buffer.push_str(line);
        buffer.push('\n');

        // Execute once every opened pair is closed again.
        if depth <= 0 {
            run(&buffer, interp, resolver);
            buffer.clear();
            depth = 0;
        }
    }
}

/// Bracket nesting delta of one line; text in strings and after `#` does
/// not count.
fn bracket_balance(line: &str) -> i32 {
    let mut balance = 0;
    let mut in_string = false;
    let mut prev = '\0';

    for c in line.chars() {
        if !in_string && c == '#' {
            break;
        }
        if c == '"' && prev != '\\' {
            in_string = !in_string;
        }
        if !in_string {
            match c {
                '{' | '(' | '[' => balance += 1,
                '}' | ')' | ']' => balance -= 1,
                _ => {}
            }
        }
        prev = c;
    }
    balance
}

//! Çalıştırma hattı: lex -> parse -> resolve -> interpret, tanılama raporu.

use log::debug;

use crate::interpreter::Interpreter;
use crate::resolver::Resolver;
use crate::syntax_analyzer::{Lexer, Parser};
use crate::value::RuntimeError;

/// Drives one source string through the whole pipeline. Diagnostics go to
/// stderr and set the interpreter's `had_error` flag; lex and parse errors
/// leave nothing to run.
pub fn run(src: &str, interp: &mut Interpreter, resolver: &mut Resolver) {
    interp.had_error = false;

    let tokens = match Lexer::scan(src) {
        Ok(tokens) => tokens,
        Err(errors) => {
            for e in &errors {
                report(e.line, e.col, &e.location(), &e.message, src, true);
            }
            interp.had_error = true;
            return;
        }
    };
    debug!("lexed {} tokens", tokens.len());

    let statements = match Parser::new(tokens, interp.type_aliases.clone(), interp.node_ids()).parse()
    {
        Ok(statements) => statements,
        Err(e) => {
            report(e.line, e.col, &e.location(), &e.message, src, true);
            interp.had_error = true;
            return;
        }
    };
    debug!("parsed {} statements", statements.len());

    match resolver.resolve(&statements) {
        Ok(locals) => interp.add_locals(locals),
        Err(e) => {
            report_runtime(src, &e);
            interp.had_error = true;
            return;
        }
    }

    if let Err(e) = interp.interpret(&statements) {
        report_runtime(src, &e);
        interp.had_error = true;
    }
}

/// Clears transient state (error flag, user type aliases) without touching
/// the global environment.
pub fn reset(interp: &mut Interpreter) {
    interp.had_error = false;
    interp.type_aliases.borrow_mut().clear();
}

fn report_runtime(src: &str, error: &RuntimeError) {
    // Panics get the message without the caret marker.
    report(error.line, error.col, "", &error.message, src, !error.is_panic());
}

/// Prints the diagnostic with the offending source line and a caret.
pub fn report(line: u32, col: u32, location: &str, message: &str, src: &str, show_caret: bool) {
    eprintln!("Error{}: {}", location, message);
    if show_caret && line > 0 {
        if let Some(text) = src.lines().nth(line as usize - 1) {
            eprintln!("  {} | {}", line, text);
            eprintln!("    | {}^~~", " ".repeat((col as usize).saturating_sub(1)));
        }
    }
}

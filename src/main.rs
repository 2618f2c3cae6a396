use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::process::ExitCode;

use argh::FromArgs;
use scm::eval::Interpreter;
use scm::printer;
use scm::reader;
use scm::value::Value;

/// Default allocation ceiling: the heap refuses to grow past this many
/// cells. Slots are only actually allocated as they're used.
const HEAP_CAPACITY: usize = 64 * 1024 * 1024;

#[derive(FromArgs)]
/// A small R5RS-subset Scheme interpreter.
struct Args {
    /// source file to evaluate; starts a REPL when omitted
    #[argh(positional)]
    path: Option<String>,
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();

    let mut interp = match make_interpreter() {
        Ok(interp) => interp,
        Err(err) => {
            eprintln!("Error initializing interpreter: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match args.path {
        Some(path) => run_file(&mut interp, &path),
        None => {
            if io::stdin().is_terminal() {
                run_interactive(&mut interp);
                ExitCode::SUCCESS
            } else {
                run_piped(&mut interp)
            }
        }
    }
}

fn make_interpreter() -> scm::error::SchemeResult<Interpreter> {
    let mut interp = Interpreter::new(HEAP_CAPACITY)?;
    interp.install_stdlib()?;
    if std::env::var("SCM_TRACE").map(|v| v == "1").unwrap_or(false) {
        interp.trace = true;
    }
    Ok(interp)
}

/// Evaluate a source file one datum at a time. Parsing incrementally keeps
/// unevaluated source off the host stack, where a collection couldn't see
/// its heap references.
fn run_file(interp: &mut Interpreter, path: &str) -> ExitCode {
    let input = match std::fs::read_to_string(path) {
        Ok(input) => input,
        Err(err) => {
            eprintln!("Error reading {}: {}", path, err);
            return ExitCode::FAILURE;
        }
    };

    let mut pos = 0;
    loop {
        match reader::read_one_at(&input, pos, &mut interp.heap, &mut interp.symbols) {
            Ok(Some((datum, next))) => {
                pos = next;
                if let Err(err) = interp.evaluate(datum) {
                    eprintln!("Error: {}", err);
                    return ExitCode::FAILURE;
                }
            }
            Ok(None) => break,
            Err(err) => {
                eprintln!("Read error: {}", err);
                return ExitCode::FAILURE;
            }
        }
    }

    if interp.failed_tests > 0 {
        eprintln!("{} test(s) failed", interp.failed_tests);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Interactive REPL: accumulate lines until parens are balanced, then
/// evaluate. Errors are reported and input resumes.
fn run_interactive(interp: &mut Interpreter) {
    println!("scm interpreter");
    println!(
        "  heap: {}/{} cells, symbols: {} interned",
        interp.heap.occupied_count(),
        interp.heap.capacity(),
        interp.symbols.count()
    );

    let stdin = io::stdin();
    let mut buf = String::new();
    let mut depth: i32 = 0;

    loop {
        if depth == 0 {
            print!("> ");
        } else {
            print!("  ");
        }
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(err) => {
                eprintln!("Read error: {}", err);
                break;
            }
        }

        // Track paren depth (naive but sufficient for well-formed input).
        for ch in line.chars() {
            match ch {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
        }

        buf.push_str(&line);

        if depth <= 0 {
            depth = 0;
            let input = std::mem::take(&mut buf);
            if input.trim().is_empty() {
                continue;
            }
            eval_and_print(interp, &input);
        }
    }
}

/// Piped mode: read everything, then parse and evaluate one datum at a time.
fn run_piped(interp: &mut Interpreter) -> ExitCode {
    let mut input = String::new();
    if let Err(err) = io::stdin().read_to_string(&mut input) {
        eprintln!("Read error: {}", err);
        return ExitCode::FAILURE;
    }
    eval_and_print(interp, &input);
    if interp.failed_tests > 0 {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Evaluate every datum in the input, printing each non-unspecified result.
fn eval_and_print(interp: &mut Interpreter, input: &str) {
    let mut pos = 0;
    loop {
        match reader::read_one_at(input, pos, &mut interp.heap, &mut interp.symbols) {
            Ok(Some((datum, next))) => {
                pos = next;
                match interp.evaluate(datum) {
                    Ok(Value::Unspecified) => {}
                    Ok(val) => {
                        println!("{}", printer::print_val(val, &interp.heap, &interp.symbols));
                    }
                    Err(err) => {
                        eprintln!("Error: {}", err);
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                eprintln!("Read error: {}", err);
                break;
            }
        }
    }
}

use crate::error::{SchemeError, SchemeResult};
use crate::eval::Interpreter;
use crate::printer;
use crate::value::{PairId, Value};
use colored::Colorize;
use std::io::{self, Write};

/// Signature of a native operation. Operands arrive already evaluated.
pub type PrimitiveFn = fn(&mut Interpreter, &[Value]) -> SchemeResult<Value>;

/// Install the primitive library into the top-level environment.
pub fn install(interp: &mut Interpreter) -> SchemeResult<()> {
    let primitives: &[(&str, PrimitiveFn)] = &[
        // Arithmetic
        ("+", prim_add),
        ("-", prim_subtract),
        ("*", prim_multiply),
        ("/", prim_divide),
        ("remainder", prim_remainder),
        ("=", prim_num_eq),
        ("<", prim_num_lt),
        (">", prim_num_gt),
        // Predicates
        ("eq?", prim_eq),
        ("pair?", prim_pair),
        ("not", prim_not),
        // List operations
        ("cons", prim_cons),
        ("car", prim_car),
        ("cdr", prim_cdr),
        ("set-car!", prim_set_car),
        ("set-cdr!", prim_set_cdr),
        ("list", prim_list),
        ("apply", prim_apply),
        // I/O
        ("display", prim_display),
        ("newline", prim_newline),
        // Runtime
        ("gc", prim_gc),
        ("stats", prim_stats),
        ("assert", prim_assert),
        // Testing
        ("test-eq", prim_test_eq),
        ("test-repr", prim_test_repr),
    ];
    for &(name, func) in primitives {
        interp.define_primitive(name, func)?;
    }
    Ok(())
}

fn expect_exactly(args: &[Value], count: usize) -> SchemeResult<()> {
    if args.len() != count {
        return Err(SchemeError::ArityMismatch {
            expected: format!("exactly {}", count),
            got: args.len(),
        });
    }
    Ok(())
}

fn expect_at_least(args: &[Value], count: usize) -> SchemeResult<()> {
    if args.len() < count {
        return Err(SchemeError::ArityMismatch {
            expected: format!("at least {}", count),
            got: args.len(),
        });
    }
    Ok(())
}

fn expect_number(val: Value) -> SchemeResult<f64> {
    match val {
        Value::Number(n) => Ok(n),
        _ => Err(SchemeError::TypeError {
            expected: "number",
            got: val.type_name(),
        }),
    }
}

fn expect_pair(val: Value) -> SchemeResult<PairId> {
    match val {
        Value::Pair(id) => Ok(id),
        _ => Err(SchemeError::TypeError {
            expected: "pair",
            got: val.type_name(),
        }),
    }
}

fn number_args(args: &[Value]) -> SchemeResult<Vec<f64>> {
    args.iter().map(|&val| expect_number(val)).collect()
}

/// (+ n ...): sum; (+) is 0.
fn prim_add(_interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    Ok(Value::Number(number_args(args)?.iter().sum()))
}

/// (- n) negates; (- a b ...) subtracts left to right.
fn prim_subtract(_interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_at_least(args, 1)?;
    let numbers = number_args(args)?;
    if numbers.len() == 1 {
        return Ok(Value::Number(-numbers[0]));
    }
    let result = numbers[1..].iter().fold(numbers[0], |acc, n| acc - n);
    Ok(Value::Number(result))
}

/// (* n ...): product; (*) is 1.
fn prim_multiply(_interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    Ok(Value::Number(number_args(args)?.iter().product()))
}

/// (/ n) is 1/n; (/ a b ...) divides left to right. Zero divisors are
/// refused rather than producing infinities.
fn prim_divide(_interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_at_least(args, 1)?;
    let numbers = number_args(args)?;
    let divide = |a: f64, b: f64| -> SchemeResult<f64> {
        if b == 0.0 {
            return Err(SchemeError::DivisionByZero);
        }
        Ok(a / b)
    };
    if numbers.len() == 1 {
        return Ok(Value::Number(divide(1.0, numbers[0])?));
    }
    let mut result = numbers[0];
    for &n in &numbers[1..] {
        result = divide(result, n)?;
    }
    Ok(Value::Number(result))
}

/// (remainder a b): truncating remainder, sign follows the dividend.
fn prim_remainder(_interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 2)?;
    let a = expect_number(args[0])?;
    let b = expect_number(args[1])?;
    if b == 0.0 {
        return Err(SchemeError::DivisionByZero);
    }
    Ok(Value::Number(a % b))
}

/// (= n ...): numeric equality over every adjacent pair.
fn prim_num_eq(_interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    let numbers = number_args(args)?;
    Ok(Value::Bool(numbers.windows(2).all(|w| w[0] == w[1])))
}

/// (< n ...): strictly increasing.
fn prim_num_lt(_interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    let numbers = number_args(args)?;
    Ok(Value::Bool(numbers.windows(2).all(|w| w[0] < w[1])))
}

/// (> n ...): strictly decreasing.
fn prim_num_gt(_interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    let numbers = number_args(args)?;
    Ok(Value::Bool(numbers.windows(2).all(|w| w[0] > w[1])))
}

/// (eq? a b): identity for symbols, pairs, procedures, strings, and
/// booleans; numeric equality for numbers.
fn prim_eq(_interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 2)?;
    Ok(Value::Bool(args[0] == args[1]))
}

/// (pair? x)
fn prim_pair(_interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 1)?;
    Ok(Value::Bool(args[0].is_pair()))
}

/// (not x): #t only for #f.
fn prim_not(_interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 1)?;
    Ok(Value::Bool(!args[0].is_truthy()))
}

/// (cons a b)
fn prim_cons(interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 2)?;
    let id = interp.heap.alloc_pair(args[0], args[1])?;
    Ok(Value::Pair(id))
}

/// (car p)
fn prim_car(interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 1)?;
    Ok(interp.heap.car(expect_pair(args[0])?))
}

/// (cdr p)
fn prim_cdr(interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 1)?;
    Ok(interp.heap.cdr(expect_pair(args[0])?))
}

/// (set-car! p v)
fn prim_set_car(interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 2)?;
    interp.heap.set_car(expect_pair(args[0])?, args[1]);
    Ok(Value::Unspecified)
}

/// (set-cdr! p v)
fn prim_set_cdr(interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 2)?;
    interp.heap.set_cdr(expect_pair(args[0])?, args[1]);
    Ok(Value::Unspecified)
}

/// (list x ...): a fresh proper list of the arguments.
fn prim_list(interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    interp.heap.list(args)
}

/// (apply proc arg ... args): apply proc to the given arguments followed
/// by the elements of the final list.
fn prim_apply(interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_at_least(args, 2)?;
    let Value::Procedure(procedure) = args[0] else {
        return Err(SchemeError::TypeError {
            expected: "procedure",
            got: args[0].type_name(),
        });
    };
    let last = args[args.len() - 1];
    let spread = interp
        .heap
        .list_to_vec(last)
        .ok_or_else(|| SchemeError::TypeError {
            expected: "proper list",
            got: last.type_name(),
        })?;
    let mut operands = args[1..args.len() - 1].to_vec();
    operands.extend(spread);
    interp.apply_procedure(procedure, operands)
}

/// (display x): write x without string quoting. No newline.
fn prim_display(interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 1)?;
    print!(
        "{}",
        printer::display_val(args[0], &interp.heap, &interp.symbols)
    );
    let _ = io::stdout().flush();
    Ok(Value::Unspecified)
}

/// (newline)
fn prim_newline(_interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 0)?;
    println!();
    Ok(Value::Unspecified)
}

/// (gc): run a collection from the top level; the number of cells freed.
fn prim_gc(interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 0)?;
    let freed = interp.collect()?;
    Ok(Value::Number(freed as f64))
}

/// (stats): print heap occupancy; returns (occupied . capacity).
fn prim_stats(interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 0)?;
    let occupied = interp.heap.occupied_count();
    let capacity = interp.heap.capacity();
    println!(
        "heap: {}/{} cells, symbols: {}",
        occupied,
        capacity,
        interp.symbols.count()
    );
    let id = interp.heap.alloc_pair(
        Value::Number(occupied as f64),
        Value::Number(capacity as f64),
    )?;
    Ok(Value::Pair(id))
}

/// (assert x): error unless x is truthy.
fn prim_assert(interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 1)?;
    if !args[0].is_truthy() {
        return Err(SchemeError::AssertionFailed(printer::print_val(
            args[0],
            &interp.heap,
            &interp.symbols,
        )));
    }
    Ok(Value::Unspecified)
}

/// (test-eq a b): print OK/ERR comparing the two values with eq?.
fn prim_test_eq(interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 2)?;
    let a = printer::print_val(args[0], &interp.heap, &interp.symbols);
    let b = printer::print_val(args[1], &interp.heap, &interp.symbols);
    if args[0] == args[1] {
        println!("{} {} = {}", "OK".green(), a, b);
    } else {
        interp.failed_tests += 1;
        println!("{} {} ≠ {}", "ERR".red(), a, b);
    }
    Ok(Value::Unspecified)
}

/// (test-repr a b): print OK/ERR comparing printed representations.
fn prim_test_repr(interp: &mut Interpreter, args: &[Value]) -> SchemeResult<Value> {
    expect_exactly(args, 2)?;
    let a = printer::print_val(args[0], &interp.heap, &interp.symbols);
    let b = printer::print_val(args[1], &interp.heap, &interp.symbols);
    if a == b {
        println!("{} {}", "OK".green(), a);
    } else {
        interp.failed_tests += 1;
        println!("{} {} ≠ {}", "ERR".red(), a, b);
    }
    Ok(Value::Unspecified)
}

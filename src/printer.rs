use crate::heap::{Heap, ProcedureCell};
use crate::symbol::SymbolTable;
use crate::value::Value;

/// Nesting depth and element count guards so that deeply nested or cyclic
/// structure prints something finite.
const MAX_DEPTH: usize = 1000;
const MAX_ITEMS: usize = 100_000;

/// Print a value's external representation (strings quoted and escaped).
pub fn print_val(val: Value, heap: &Heap, symbols: &SymbolTable) -> String {
    let mut out = String::new();
    print_inner(val, heap, symbols, &mut out, 0, false);
    out
}

/// Print a value the way `display` shows it (strings raw).
pub fn display_val(val: Value, heap: &Heap, symbols: &SymbolTable) -> String {
    let mut out = String::new();
    print_inner(val, heap, symbols, &mut out, 0, true);
    out
}

fn print_inner(
    val: Value,
    heap: &Heap,
    symbols: &SymbolTable,
    out: &mut String,
    depth: usize,
    display: bool,
) {
    if depth > MAX_DEPTH {
        out.push_str("...");
        return;
    }

    match val {
        Value::Unspecified => out.push_str("#!void"),
        Value::Nil => out.push_str("()"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(true) => out.push_str("#t"),
        Value::Bool(false) => out.push_str("#f"),
        Value::Symbol(id) => out.push_str(symbols.name(id)),
        Value::Str(id) => {
            let text = heap.str_text(id);
            if display {
                out.push_str(text);
            } else {
                print_string(text, out);
            }
        }
        Value::Procedure(id) => match heap.procedure(id) {
            ProcedureCell::Primitive(prim) => {
                out.push_str("#<primitive ");
                out.push_str(symbols.name(prim.name));
                out.push('>');
            }
            ProcedureCell::Compound(lambda) => match lambda.name {
                Some(name) => {
                    out.push_str("#<procedure ");
                    out.push_str(symbols.name(name));
                    out.push('>');
                }
                None => out.push_str("#<procedure>"),
            },
        },
        Value::Pair(id) => {
            out.push('(');
            print_inner(heap.car(id), heap, symbols, out, depth + 1, display);

            let mut current = heap.cdr(id);
            let mut items = 0;
            loop {
                match current {
                    Value::Nil => break,
                    Value::Pair(next) => {
                        items += 1;
                        if items > MAX_ITEMS {
                            out.push_str(" ...");
                            break;
                        }
                        out.push(' ');
                        print_inner(heap.car(next), heap, symbols, out, depth + 1, display);
                        current = heap.cdr(next);
                    }
                    _ => {
                        out.push_str(" . ");
                        print_inner(current, heap, symbols, out, depth + 1, display);
                        break;
                    }
                }
            }
            out.push(')');
        }
    }
}

/// Quote and escape a string for its external representation. Only `\` and
/// `"` have escape sequences; everything else round-trips verbatim.
fn print_string(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('"');
}

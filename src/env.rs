//! Environment operations over heap-allocated frames.
//!
//! A frame is an ordered map from symbol to value plus a reference to the
//! enclosing frame. Lookup walks frames outward; the first match wins.
//! Frames live on the heap so a closure's captured frame stays reachable
//! for as long as the closure is.

use crate::error::{SchemeError, SchemeResult};
use crate::heap::Heap;
use crate::symbol::SymbolTable;
use crate::value::{FrameId, SymbolId, Value};

/// Look up a symbol, innermost frame first.
pub fn lookup(
    heap: &Heap,
    frame: FrameId,
    name: SymbolId,
    symbols: &SymbolTable,
) -> SchemeResult<Value> {
    let mut current = Some(frame);
    while let Some(id) = current {
        let cell = heap.frame(id);
        for &(bound, val) in &cell.bindings {
            if bound == name {
                return Ok(val);
            }
        }
        current = cell.parent;
    }
    Err(SchemeError::UnboundVariable(symbols.name(name).to_string()))
}

/// Bind or overwrite `name` in `frame`, shadowing any outer binding.
pub fn define(heap: &mut Heap, frame: FrameId, name: SymbolId, value: Value) {
    let cell = heap.frame_mut(frame);
    for binding in cell.bindings.iter_mut() {
        if binding.0 == name {
            binding.1 = value;
            return;
        }
    }
    cell.bindings.push((name, value));
}

/// Overwrite the innermost binding of `name`, failing if none exists.
pub fn set(
    heap: &mut Heap,
    frame: FrameId,
    name: SymbolId,
    value: Value,
    symbols: &SymbolTable,
) -> SchemeResult<()> {
    let mut current = Some(frame);
    while let Some(id) = current {
        let cell = heap.frame_mut(id);
        for binding in cell.bindings.iter_mut() {
            if binding.0 == name {
                binding.1 = value;
                return Ok(());
            }
        }
        current = heap.frame(id).parent;
    }
    Err(SchemeError::UnboundVariable(symbols.name(name).to_string()))
}

/// Build a child frame binding each formal to the corresponding argument.
/// Surplus arguments are collected into a fresh proper list bound to the
/// rest formal when one is present; otherwise they are an arity error, as
/// are too few arguments.
pub fn extend(
    heap: &mut Heap,
    parent: FrameId,
    formals: &[SymbolId],
    rest_formal: Option<SymbolId>,
    args: &[Value],
) -> SchemeResult<FrameId> {
    if args.len() < formals.len() || (rest_formal.is_none() && args.len() > formals.len()) {
        let expected = match rest_formal {
            Some(_) => format!("at least {}", formals.len()),
            None => format!("exactly {}", formals.len()),
        };
        return Err(SchemeError::ArityMismatch {
            expected,
            got: args.len(),
        });
    }

    let frame = heap.alloc_frame(Some(parent))?;
    for (&formal, &arg) in formals.iter().zip(args) {
        heap.frame_mut(frame).bindings.push((formal, arg));
    }
    if let Some(rest) = rest_formal {
        let surplus = heap.list(&args[formals.len()..])?;
        heap.frame_mut(frame).bindings.push((rest, surplus));
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::{define, extend, lookup, set};
    use crate::error::SchemeError;
    use crate::heap::Heap;
    use crate::symbol::SymbolTable;
    use crate::value::Value;

    #[test]
    fn define_then_lookup() {
        let mut heap = Heap::new(64);
        let mut symbols = SymbolTable::new();
        let frame = heap.alloc_frame(None).unwrap();
        let x = symbols.intern("x");

        define(&mut heap, frame, x, Value::Number(3.0));
        assert_eq!(lookup(&heap, frame, x, &symbols), Ok(Value::Number(3.0)));

        // Redefinition overwrites in place.
        define(&mut heap, frame, x, Value::Number(4.0));
        assert_eq!(lookup(&heap, frame, x, &symbols), Ok(Value::Number(4.0)));
    }

    #[test]
    fn inner_bindings_shadow_outer_ones() {
        let mut heap = Heap::new(64);
        let mut symbols = SymbolTable::new();
        let outer = heap.alloc_frame(None).unwrap();
        let inner = heap.alloc_frame(Some(outer)).unwrap();
        let x = symbols.intern("x");

        define(&mut heap, outer, x, Value::Number(1.0));
        assert_eq!(lookup(&heap, inner, x, &symbols), Ok(Value::Number(1.0)));

        define(&mut heap, inner, x, Value::Number(2.0));
        assert_eq!(lookup(&heap, inner, x, &symbols), Ok(Value::Number(2.0)));
        assert_eq!(lookup(&heap, outer, x, &symbols), Ok(Value::Number(1.0)));
    }

    #[test]
    fn set_mutates_the_innermost_binding() {
        let mut heap = Heap::new(64);
        let mut symbols = SymbolTable::new();
        let outer = heap.alloc_frame(None).unwrap();
        let inner = heap.alloc_frame(Some(outer)).unwrap();
        let x = symbols.intern("x");

        define(&mut heap, outer, x, Value::Number(1.0));
        set(&mut heap, inner, x, Value::Number(9.0), &symbols).unwrap();
        assert_eq!(lookup(&heap, outer, x, &symbols), Ok(Value::Number(9.0)));
    }

    #[test]
    fn set_on_unbound_name_fails() {
        let mut heap = Heap::new(64);
        let mut symbols = SymbolTable::new();
        let frame = heap.alloc_frame(None).unwrap();
        let ghost = symbols.intern("ghost");

        assert_eq!(
            set(&mut heap, frame, ghost, Value::Nil, &symbols),
            Err(SchemeError::UnboundVariable("ghost".to_string()))
        );
        assert_eq!(
            lookup(&heap, frame, ghost, &symbols),
            Err(SchemeError::UnboundVariable("ghost".to_string()))
        );
    }

    #[test]
    fn extend_binds_formals_and_rest() {
        let mut heap = Heap::new(64);
        let mut symbols = SymbolTable::new();
        let parent = heap.alloc_frame(None).unwrap();
        let a = symbols.intern("a");
        let rest = symbols.intern("rest");

        let args = [Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)];
        let frame = extend(&mut heap, parent, &[a], Some(rest), &args).unwrap();

        assert_eq!(lookup(&heap, frame, a, &symbols), Ok(Value::Number(1.0)));
        let surplus = lookup(&heap, frame, rest, &symbols).unwrap();
        assert_eq!(
            heap.list_to_vec(surplus).unwrap(),
            vec![Value::Number(2.0), Value::Number(3.0)]
        );
    }

    #[test]
    fn extend_checks_arity() {
        let mut heap = Heap::new(64);
        let mut symbols = SymbolTable::new();
        let parent = heap.alloc_frame(None).unwrap();
        let a = symbols.intern("a");
        let b = symbols.intern("b");

        let err = extend(&mut heap, parent, &[a, b], None, &[Value::Nil]).unwrap_err();
        assert_eq!(
            err,
            SchemeError::ArityMismatch {
                expected: "exactly 2".to_string(),
                got: 1,
            }
        );

        let err = extend(&mut heap, parent, &[a, b], None, &[Value::Nil; 3]).unwrap_err();
        assert_eq!(
            err,
            SchemeError::ArityMismatch {
                expected: "exactly 2".to_string(),
                got: 3,
            }
        );

        let err = extend(&mut heap, parent, &[a], Some(b), &[]).unwrap_err();
        assert_eq!(
            err,
            SchemeError::ArityMismatch {
                expected: "at least 1".to_string(),
                got: 0,
            }
        );
    }
}

//! End-to-end tests: source text through the reader and evaluator, with
//! results compared by their printed representations.

use crate::error::SchemeError;
use crate::eval::Interpreter;
use crate::printer::print_val;
use crate::value::Value;

/// Big enough for the deep-recursion tests; far smaller than the binary's
/// default ceiling.
const TEST_HEAP_CAPACITY: usize = 8 * 1024 * 1024;

fn new_interpreter() -> Interpreter {
    let mut interp = Interpreter::new(TEST_HEAP_CAPACITY).unwrap();
    interp.install_stdlib().unwrap();
    interp
}

/// Evaluate all datums and return the printed repr of the last result
/// (empty string for the unspecified value, as the REPL would show it).
fn eval_to_repr(interp: &mut Interpreter, code: &str) -> String {
    match interp.eval_source(code) {
        Ok(Value::Unspecified) => String::new(),
        Ok(val) => print_val(val, &interp.heap, &interp.symbols),
        Err(err) => panic!("evaluating '{code}' raised error {err:?}"),
    }
}

fn test_eval_success(code: &str, expected: &str) {
    let mut interp = new_interpreter();
    assert_eq!(eval_to_repr(&mut interp, code), expected, "evaluating '{code}'");
}

fn test_eval_err(code: &str, expected: SchemeError) {
    let mut interp = new_interpreter();
    match interp.eval_source(code) {
        Ok(val) => panic!(
            "evaluating '{code}' returned {} instead of failing",
            print_val(val, &interp.heap, &interp.symbols)
        ),
        Err(err) => assert_eq!(err, expected, "evaluating '{code}'"),
    }
}

#[test]
fn self_evaluating_forms_work() {
    test_eval_success("5", "5");
    test_eval_success("-4.25", "-4.25");
    test_eval_success("#t", "#t");
    test_eval_success("#f", "#f");
    test_eval_success(r#""hi there""#, r#""hi there""#);
}

#[test]
fn quote_works() {
    test_eval_success("(quote 1)", "1");
    test_eval_success("(quote (1   2    3  ))", "(1 2 3)");
    test_eval_success("(quote (1 2 3 (4)))", "(1 2 3 (4))");
    test_eval_success("(quote ())", "()");
    test_eval_success("(quote blarg)", "blarg");
    test_eval_success("'(a . b)", "(a . b)");
}

#[test]
fn basic_arithmetic_works() {
    test_eval_success("(+)", "0");
    test_eval_success("(*)", "1");
    test_eval_success("(+ 1 2)", "3");
    test_eval_success("(+ +1 2)", "3");
    test_eval_success("(+ -10 2)", "-8");
    test_eval_success("  (+ 1 2 (* 3 4)) ", "15");
    test_eval_success("(- 2)", "-2");
    test_eval_success("(- 5 2 1)", "2");
    test_eval_success("(/ 2)", "0.5");
    test_eval_success("(/ 1 2 2)", "0.25");
}

#[test]
fn remainder_works() {
    // From R5RS 6.2.5.
    test_eval_success("(remainder 13 4)", "1");
    test_eval_success("(remainder -13 4)", "-1");
    test_eval_success("(remainder 13 -4)", "1");
    test_eval_success("(remainder -13 -4)", "-1");
}

#[test]
fn division_by_zero_is_refused() {
    test_eval_err("(/ 5 0)", SchemeError::DivisionByZero);
}

#[test]
fn comparisons_work() {
    test_eval_success("(= 1 1 1)", "#t");
    test_eval_success("(= 1 2)", "#f");
    test_eval_success("(< 0 1 2)", "#t");
    test_eval_success("(< 1 1)", "#f");
    test_eval_success("(> 3 2 1)", "#t");
    test_eval_success("(> 1 2)", "#f");
}

#[test]
fn numeric_comparison_of_non_numbers_is_a_type_error() {
    test_eval_err(
        "(= 1 'one)",
        SchemeError::TypeError {
            expected: "number",
            got: "symbol",
        },
    );
}

#[test]
fn variable_definitions_work() {
    test_eval_success("(define x 3) x", "3");
    test_eval_success("(define x 3) (define y (+ x 1)) (+ x y)", "7");
    test_eval_success("(define x 1) (define x 2) x", "2");
}

#[test]
fn unbound_variables_are_errors() {
    test_eval_err("nope", SchemeError::UnboundVariable("nope".to_string()));
    test_eval_err(
        "(set! nope 1)",
        SchemeError::UnboundVariable("nope".to_string()),
    );
}

#[test]
fn set_works() {
    test_eval_success("(define x 1) (set! x 2) x", "2");
    test_eval_success(
        "(define x 1)
         (define (bump) (set! x (+ x 1)))
         (bump) (bump) x",
        "3",
    );
}

#[test]
fn compound_procedure_definitions_work() {
    test_eval_success("(define (x) 3)", "");
    test_eval_success("(define (x) 3) (x)", "3");
    test_eval_success("(define (add-three n) (+ 3 n)) (add-three 1)", "4");
}

#[test]
fn lambda_definitions_work() {
    test_eval_success("(define x (lambda () 3)) (x)", "3");
    test_eval_success("(define add-three (lambda (n) (+ 3 n))) (add-three 1)", "4");
}

#[test]
fn procedure_reprs_include_their_names() {
    test_eval_success("(define (boop) 1) boop", "#<procedure boop>");
    test_eval_success("(lambda () 1)", "#<procedure>");
    test_eval_success("car", "#<primitive car>");
}

#[test]
fn closures_capture_their_environment() {
    test_eval_success(
        "(define (add-n n) (lambda (x) (+ x n)))
         (define add-one (add-n 1))
         (add-one 41)",
        "42",
    );
}

#[test]
fn arguments_shadow_globals() {
    test_eval_success(
        "(define n 5)
         (define (add-three n) (+ 3 n))
         (+ (add-three 1) n)",
        "9",
    );
}

#[test]
fn internal_definitions_see_each_other() {
    test_eval_success(
        "(define (make-adder n)
           (define (add-n x) (+ x n))
           add-n)
         (define add-three (make-adder 3))
         (add-three 1)",
        "4",
    );
    // Forward reference: mine? calls yours?, defined after it.
    test_eval_success(
        "(define (classify n)
           (define (mine? n) (if (= n 0) #t (yours? (- n 1))))
           (define (yours? n) (if (= n 0) #f (mine? (- n 1))))
           (mine? n))
         (classify 4)",
        "#t",
    );
}

#[test]
fn rest_parameters_work() {
    test_eval_success("((lambda args args) 1 2 3)", "(1 2 3)");
    test_eval_success("(define (f . xs) xs) (f)", "()");
    test_eval_success("(define (f . xs) xs) (f 1 2)", "(1 2)");
    test_eval_success("(define (f a . xs) (cons xs a)) (f 1 2 3)", "((2 3) . 1)");
}

#[test]
fn arity_is_checked_at_application() {
    test_eval_err(
        "(define (f a b) a) (f 1)",
        SchemeError::ArityMismatch {
            expected: "exactly 2".to_string(),
            got: 1,
        },
    );
    test_eval_err(
        "(define (f a b) a) (f 1 2 3)",
        SchemeError::ArityMismatch {
            expected: "exactly 2".to_string(),
            got: 3,
        },
    );
    test_eval_err(
        "((lambda (a . rest) a))",
        SchemeError::ArityMismatch {
            expected: "at least 1".to_string(),
            got: 0,
        },
    );
}

#[test]
fn applying_a_non_procedure_is_a_type_error() {
    test_eval_err(
        "(1 2 3)",
        SchemeError::TypeError {
            expected: "procedure",
            got: "number",
        },
    );
}

#[test]
fn malformed_special_forms_are_syntax_errors() {
    for code in [
        "(define)",
        "(define 3 4)",
        "(lambda (x))",
        "(lambda (x 5) x)",
        "(lambda (x x) x)",
        "(if #t)",
        "(cond)",
        "(quote a b)",
        "(set! 3 4)",
    ] {
        let mut interp = new_interpreter();
        match interp.eval_source(code) {
            Err(SchemeError::SyntaxError(_)) => {}
            other => panic!("evaluating '{code}' produced {other:?}"),
        }
    }
}

#[test]
fn if_works() {
    test_eval_success("(if #t 1)", "1");
    test_eval_success("(if #t 1 2)", "1");
    test_eval_success("(if #f 1 2)", "2");
    // R5RS leaves (if #f 1) unspecified; this interpreter returns the
    // unspecified value, which the REPL shows as nothing.
    test_eval_success("(if #f 1)", "");
}

#[test]
fn truthiness_follows_r5rs() {
    test_eval_success("(if '() 'y 'n)", "y");
    test_eval_success("(if 0 'y 'n)", "y");
    test_eval_success(r#"(if "" 'y 'n)"#, "y");
    test_eval_success("(if #f 'y 'n)", "n");
}

#[test]
fn begin_sequences_and_returns_the_last_value() {
    test_eval_success("(begin 1 2 3)", "3");
    test_eval_success("(begin)", "");
    test_eval_success("(define x 0) (begin (set! x 5) (+ x 1))", "6");
}

#[test]
fn cond_works() {
    test_eval_success("(cond ((= 1 2) 'a) (else 'b))", "b");
    test_eval_success("(cond ((= 1 1) 'a) (else 'b))", "a");
    test_eval_success("(cond (#f 'a) (#f 'b))", "");
    test_eval_success("(cond (42))", "42");
    test_eval_success("(cond (#f 'a) ((+ 1 2)))", "3");
}

#[test]
fn and_or_short_circuit() {
    test_eval_success("(and)", "#t");
    test_eval_success("(or)", "#f");
    test_eval_success("(and 1 2 3)", "3");
    test_eval_success("(or #f #f 5)", "5");
    test_eval_success("(and 1 #f 3)", "#f");
    test_eval_success("(or 1 2)", "1");
    // The second operand must not be evaluated.
    test_eval_success("(define x 0) (and #f (set! x 1)) x", "0");
    test_eval_success("(define x 0) (or 1 (set! x 1)) x", "0");
}

#[test]
fn eq_works() {
    // From R5RS section 6.1.
    test_eval_success("(eq? 'a 'a)", "#t");
    test_eval_success("(eq? 'a 'b)", "#f");
    test_eval_success("(eq? '() '())", "#t");
    test_eval_success("(eq? + +)", "#t");
    test_eval_success("(eq? 2 2)", "#t");
    test_eval_success("(eq? 2 1)", "#f");
    test_eval_success("(eq? #t #t)", "#t");
    test_eval_success("(eq? #t #f)", "#f");

    // Identity, not structure.
    test_eval_success("(eq? '(a) '(a))", "#f");
    test_eval_success("(define x '(a)) (eq? x x)", "#t");
    test_eval_success("(eq? (lambda (x) x) (lambda (x) x))", "#f");
    test_eval_success(r#"(eq? "blarg" "blarg")"#, "#f");
    test_eval_success(r#"(define x "blarg") (eq? x x)"#, "#t");
}

#[test]
fn cons_car_cdr_laws_hold() {
    test_eval_success("(car (cons 1 2))", "1");
    test_eval_success("(cdr (cons 1 2))", "2");
    test_eval_success("(car (cons '(a) \"s\"))", "(a)");
    test_eval_success("(car '(1 . 2))", "1");
    test_eval_err(
        "(car 5)",
        SchemeError::TypeError {
            expected: "pair",
            got: "number",
        },
    );
}

#[test]
fn mutation_of_pairs_works() {
    test_eval_success("(define a '(1 . 2)) (set-car! a 5) a", "(5 . 2)");
    test_eval_success("(define a '(1 . 2)) (set-cdr! a 5) a", "(1 . 5)");
}

#[test]
fn list_and_apply_work() {
    test_eval_success("(list)", "()");
    test_eval_success("(list 1 2 3)", "(1 2 3)");
    test_eval_success("(apply + '(1 2 3))", "6");
    test_eval_success("(apply + 1 2 '(3 4))", "10");
    test_eval_success("(apply list 1 '(2 3))", "(1 2 3)");
}

#[test]
fn prelude_list_utilities_work() {
    test_eval_success("(length '(a b c))", "3");
    test_eval_success("(list? '(1 2))", "#t");
    test_eval_success("(list? '(1 . 2))", "#f");
    test_eval_success("(append '(a b) '(c d))", "(a b c d)");
    test_eval_success("(append '(a b) '(c . d))", "(a b c . d)");
    test_eval_success("(reverse '(1 2 3))", "(3 2 1)");
    test_eval_success("(reverse (reverse '(1 2 3 (4 5))))", "(1 2 3 (4 5))");
    test_eval_success("(list-tail '(a b c d) 2)", "(c d)");
    test_eval_success("(abs -1)", "1");
    test_eval_success("(min 2 7)", "2");
    test_eval_success("(max 2 7)", "7");
}

#[test]
fn deep_tail_recursion_does_not_grow_the_host_stack() {
    test_eval_success(
        "(define (loop n) (if (= n 0) 'done (loop (- n 1))))
         (loop 1000000)",
        "done",
    );
}

#[test]
fn mutual_tail_recursion_is_also_bounded() {
    test_eval_success(
        "(define (even? n) (if (= n 0) #t (odd? (- n 1))))
         (define (odd? n) (if (= n 0) #f (even? (- n 1))))
         (even? 100001)",
        "#f",
    );
}

#[test]
fn tail_positions_inside_cond_and_or_are_honored() {
    test_eval_success(
        "(define (spin n)
           (cond ((= n 0) 'done)
                 (else (spin (- n 1)))))
         (spin 200000)",
        "done",
    );
    test_eval_success(
        "(define (spin n)
           (or (and (= n 0) 'done)
               (spin (- n 1))))
         (spin 200000)",
        "done",
    );
}

#[test]
fn assert_works() {
    test_eval_success("(assert #t)", "");
    test_eval_success("(assert (+ 0 0))", "");
    test_eval_err(
        "(assert #f)",
        SchemeError::AssertionFailed("#f".to_string()),
    );
}

#[test]
fn gc_reclaims_a_dropped_cycle() {
    let mut interp = new_interpreter();
    interp
        .eval_source("(define x (cons 1 2)) (set-cdr! x x)")
        .unwrap();
    let before = interp.heap.occupied_count();
    interp.eval_source("(define x 0)").unwrap();
    let freed = match interp.eval_source("(gc)").unwrap() {
        Value::Number(n) => n as usize,
        other => panic!("gc returned {other:?}"),
    };
    assert!(freed >= 1, "gc freed {freed} cells");
    assert!(
        interp.heap.occupied_count() < before,
        "heap occupancy did not decrease"
    );
}

#[test]
fn reachable_data_survives_gc_unchanged() {
    let mut interp = new_interpreter();
    interp
        .eval_source("(define keep (cons 1 (cons 2 '())))")
        .unwrap();
    interp.eval_source("(gc)").unwrap();
    assert_eq!(eval_to_repr(&mut interp, "keep"), "(1 2)");
    // The cells are still mutable in place.
    assert_eq!(eval_to_repr(&mut interp, "(set-car! keep 9) keep"), "(9 2)");
}

#[test]
fn gc_inside_a_procedure_is_refused() {
    test_eval_err("(define (f) (gc)) (f)", SchemeError::CannotCollectHere);
    // Even in tail position of a tail-called procedure.
    test_eval_err(
        "(define (g) (gc)) (define (f) (g)) (f)",
        SchemeError::CannotCollectHere,
    );
}

#[test]
fn gc_at_top_level_succeeds() {
    let mut interp = new_interpreter();
    assert!(matches!(
        interp.eval_source("(gc)").unwrap(),
        Value::Number(_)
    ));
}

#[test]
fn stats_returns_occupancy() {
    let mut interp = new_interpreter();
    let val = interp.eval_source("(stats)").unwrap();
    let pair = val.as_pair().unwrap();
    let occupied = interp.heap.car(pair);
    assert!(matches!(occupied, Value::Number(n) if n > 0.0));
    assert_eq!(
        interp.heap.cdr(pair),
        Value::Number(TEST_HEAP_CAPACITY as f64)
    );
}

#[test]
fn evaluating_source_twice_reuses_interned_symbols() {
    let mut interp = new_interpreter();
    interp.eval_source("(define foo 1)").unwrap();
    let count = interp.symbols.count();
    interp.eval_source("(define foo 2) foo foo").unwrap();
    assert_eq!(interp.symbols.count(), count);
}

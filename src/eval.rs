use crate::env;
use crate::error::{SchemeError, SchemeResult};
use crate::heap::{Heap, Lambda, Primitive, ProcedureCell};
use crate::primitives::PrimitiveFn;
use crate::printer;
use crate::reader;
use crate::symbol::{sym, SymbolTable};
use crate::value::{FrameId, ProcId, SymbolId, Value};

/// A procedure whose operands have been evaluated but whose body has not
/// yet run. Tail calls surface as one of these instead of growing the host
/// stack; the trampoline applies them until a real value appears. Never
/// observable to user code.
pub struct BoundProcedure {
    pub procedure: ProcId,
    pub operands: Vec<Value>,
}

/// One step of evaluation: a finished value, or a pending tail call for
/// the trampoline to resolve.
pub enum EvalStep {
    Value(Value),
    TailCall(BoundProcedure),
}

/// The interpreter machine. All runtime state lives here so the collector
/// can find its roots.
pub struct Interpreter {
    pub heap: Heap,
    pub symbols: SymbolTable,
    /// The top-level frame. A permanent GC root.
    pub global: FrameId,
    /// Depth of the compound-procedure call stack. The collector refuses
    /// to run unless this is zero, because host-stack locals inside a call
    /// are invisible to the marker.
    call_depth: usize,
    /// The datum currently being evaluated by the driver; rooted so a
    /// top-level collection cannot sweep the source tree out from under us.
    current_datum: Value,
    /// Operator and operand values of in-flight applications; rooted for
    /// the same reason.
    operand_stack: Vec<Value>,
    /// Print each application step to stderr (SCM_TRACE=1).
    pub trace: bool,
    /// Failures recorded by the test-eq and test-repr primitives.
    pub failed_tests: usize,
}

impl Interpreter {
    /// Create a machine with an empty top-level environment.
    pub fn new(heap_capacity: usize) -> SchemeResult<Self> {
        let mut heap = Heap::new(heap_capacity);
        let global = heap.alloc_frame(None)?;
        Ok(Interpreter {
            heap,
            symbols: SymbolTable::new(),
            global,
            call_depth: 0,
            current_datum: Value::Unspecified,
            operand_stack: Vec::new(),
            trace: false,
            failed_tests: 0,
        })
    }

    /// Install the primitive library and evaluate the prelude.
    pub fn install_stdlib(&mut self) -> SchemeResult<()> {
        crate::primitives::install(self)?;
        self.eval_source(include_str!("prelude.sch"))?;
        Ok(())
    }

    /// Register a native operation under `name` in the top level.
    pub fn define_primitive(&mut self, name: &str, func: PrimitiveFn) -> SchemeResult<()> {
        let name = self.symbols.intern(name);
        let id = self
            .heap
            .alloc_procedure(ProcedureCell::Primitive(Primitive { name, func }))?;
        env::define(&mut self.heap, self.global, name, Value::Procedure(id));
        Ok(())
    }

    /// Evaluate one top-level datum.
    pub fn evaluate(&mut self, datum: Value) -> SchemeResult<Value> {
        self.current_datum = datum;
        let result = self.eval_expression(datum, self.global);
        self.current_datum = Value::Unspecified;
        result
    }

    /// Read and evaluate every datum in `source`, one at a time, returning
    /// the last result.
    pub fn eval_source(&mut self, source: &str) -> SchemeResult<Value> {
        let mut last = Value::Unspecified;
        let mut pos = 0;
        while let Some((datum, next)) =
            reader::read_one_at(source, pos, &mut self.heap, &mut self.symbols)?
        {
            pos = next;
            last = self.evaluate(datum)?;
        }
        Ok(last)
    }

    /// Evaluate an expression to a value, resolving any tail-call chain.
    pub fn eval_expression(&mut self, expr: Value, frame: FrameId) -> SchemeResult<Value> {
        match self.eval_step(expr, frame, false)? {
            EvalStep::Value(val) => Ok(val),
            EvalStep::TailCall(bound) => self.run_trampoline(bound),
        }
    }

    /// One evaluation step. In tail position, an application of a compound
    /// procedure comes back as a pending tail call instead of recursing.
    fn eval_step(&mut self, expr: Value, frame: FrameId, tail: bool) -> SchemeResult<EvalStep> {
        match expr {
            Value::Symbol(name) => Ok(EvalStep::Value(env::lookup(
                &self.heap,
                frame,
                name,
                &self.symbols,
            )?)),
            Value::Pair(id) => {
                let head = self.heap.car(id);
                let rest = self.heap.cdr(id);
                let operands = self.heap.list_to_vec(rest).ok_or_else(|| {
                    SchemeError::SyntaxError("combination must be a proper list".into())
                })?;

                if let Value::Symbol(name) = head {
                    if name == sym::QUOTE {
                        return self.form_quote(&operands);
                    } else if name == sym::IF {
                        return self.form_if(&operands, frame, tail);
                    } else if name == sym::DEFINE {
                        return self.form_define(&operands, frame);
                    } else if name == sym::SET {
                        return self.form_set(&operands, frame);
                    } else if name == sym::LAMBDA {
                        return self.form_lambda(&operands, frame);
                    } else if name == sym::BEGIN {
                        return self.form_begin(&operands, frame, tail);
                    } else if name == sym::COND {
                        return self.form_cond(&operands, frame, tail);
                    } else if name == sym::AND {
                        return self.form_and(&operands, frame, tail);
                    } else if name == sym::OR {
                        return self.form_or(&operands, frame, tail);
                    }
                }

                let mark = self.operand_stack.len();
                let result = self.eval_application(head, &operands, frame, tail, mark);
                self.operand_stack.truncate(mark);
                result
            }
            Value::Nil => Err(SchemeError::SyntaxError(
                "the empty list is not a valid expression".into(),
            )),
            // Numbers, booleans, strings, and the unspecified value
            // evaluate to themselves.
            _ => Ok(EvalStep::Value(expr)),
        }
    }

    /// Applicative order: evaluate the operator, then each operand left to
    /// right. Evaluated values are parked on the rooted operand stack so a
    /// top-level `gc` in a later operand cannot sweep earlier ones.
    fn eval_application(
        &mut self,
        head: Value,
        operand_exprs: &[Value],
        frame: FrameId,
        tail: bool,
        mark: usize,
    ) -> SchemeResult<EvalStep> {
        let operator = self.eval_expression(head, frame)?;
        self.operand_stack.push(operator);
        for &expr in operand_exprs {
            let val = self.eval_expression(expr, frame)?;
            self.operand_stack.push(val);
        }

        let Value::Procedure(procedure) = self.operand_stack[mark] else {
            return Err(SchemeError::TypeError {
                expected: "procedure",
                got: operator.type_name(),
            });
        };
        let operands = self.operand_stack[mark + 1..].to_vec();
        let bound = BoundProcedure {
            procedure,
            operands,
        };

        if tail && matches!(self.heap.procedure(procedure), ProcedureCell::Compound(_)) {
            return Ok(EvalStep::TailCall(bound));
        }
        Ok(EvalStep::Value(self.run_trampoline(bound)?))
    }

    /// Apply a procedure to already-evaluated operands. Used by the `apply`
    /// primitive.
    pub fn apply_procedure(
        &mut self,
        procedure: ProcId,
        operands: Vec<Value>,
    ) -> SchemeResult<Value> {
        self.run_trampoline(BoundProcedure {
            procedure,
            operands,
        })
    }

    /// The trampoline: perform one application step at a time until the
    /// chain of pending tail calls bottoms out in a value. Host-stack depth
    /// stays bounded no matter how long the chain is.
    fn run_trampoline(&mut self, mut bound: BoundProcedure) -> SchemeResult<Value> {
        loop {
            match self.apply_step(bound)? {
                EvalStep::Value(val) => return Ok(val),
                EvalStep::TailCall(next) => bound = next,
            }
        }
    }

    /// One application step: call a primitive, or bind a compound
    /// procedure's frame and evaluate its body.
    fn apply_step(&mut self, bound: BoundProcedure) -> SchemeResult<EvalStep> {
        if self.trace {
            eprintln!(
                "trace: applying {} to {} operand(s)",
                printer::print_val(Value::Procedure(bound.procedure), &self.heap, &self.symbols),
                bound.operands.len()
            );
        }

        match self.heap.procedure(bound.procedure) {
            ProcedureCell::Primitive(prim) => {
                let func = prim.func;
                Ok(EvalStep::Value(func(self, &bound.operands)?))
            }
            ProcedureCell::Compound(lambda) => {
                let formals = lambda.formals.clone();
                let rest_formal = lambda.rest_formal;
                let body = lambda.body.clone();
                let captured = lambda.env;

                let frame = env::extend(
                    &mut self.heap,
                    captured,
                    &formals,
                    rest_formal,
                    &bound.operands,
                )?;

                self.call_depth += 1;
                let result = self.eval_sequence(&body, frame, true);
                self.call_depth -= 1;
                result
            }
        }
    }

    /// Evaluate expressions in order; the last one is in tail position.
    fn eval_sequence(
        &mut self,
        exprs: &[Value],
        frame: FrameId,
        tail: bool,
    ) -> SchemeResult<EvalStep> {
        let Some((&last, init)) = exprs.split_last() else {
            return Ok(EvalStep::Value(Value::Unspecified));
        };
        for &expr in init {
            self.eval_expression(expr, frame)?;
        }
        self.eval_step(last, frame, tail)
    }

    // === Special forms ===

    /// (quote x): x unevaluated.
    fn form_quote(&mut self, operands: &[Value]) -> SchemeResult<EvalStep> {
        match operands {
            [datum] => Ok(EvalStep::Value(*datum)),
            _ => Err(SchemeError::SyntaxError(
                "quote expects exactly one datum".into(),
            )),
        }
    }

    /// (if test consequent) or (if test consequent alternate).
    fn form_if(&mut self, operands: &[Value], frame: FrameId, tail: bool) -> SchemeResult<EvalStep> {
        if operands.len() < 2 || operands.len() > 3 {
            return Err(SchemeError::SyntaxError(
                "if expects a test and one or two branches".into(),
            ));
        }
        let test = self.eval_expression(operands[0], frame)?;
        if test.is_truthy() {
            self.eval_step(operands[1], frame, tail)
        } else if let Some(&alternate) = operands.get(2) {
            self.eval_step(alternate, frame, tail)
        } else {
            Ok(EvalStep::Value(Value::Unspecified))
        }
    }

    /// (define sym expr), or the sugar (define (name . formals) body...).
    fn form_define(&mut self, operands: &[Value], frame: FrameId) -> SchemeResult<EvalStep> {
        match operands.first() {
            Some(&Value::Symbol(name)) => {
                if operands.len() != 2 {
                    return Err(SchemeError::SyntaxError(
                        "define expects a name and a single expression".into(),
                    ));
                }
                let value = self.eval_expression(operands[1], frame)?;
                self.name_procedure(value, name);
                env::define(&mut self.heap, frame, name, value);
                Ok(EvalStep::Value(Value::Unspecified))
            }
            Some(&Value::Pair(signature)) => {
                let name = match self.heap.car(signature) {
                    Value::Symbol(name) => name,
                    other => {
                        return Err(SchemeError::SyntaxError(format!(
                            "define requires a symbol to bind, got {}",
                            other.type_name()
                        )))
                    }
                };
                let formals = self.heap.cdr(signature);
                let procedure =
                    self.make_compound(Some(name), formals, &operands[1..], frame)?;
                env::define(&mut self.heap, frame, name, procedure);
                Ok(EvalStep::Value(Value::Unspecified))
            }
            _ => Err(SchemeError::SyntaxError(
                "define requires a symbol or a (name . formals) signature".into(),
            )),
        }
    }

    /// (set! sym expr): overwrite the innermost binding.
    fn form_set(&mut self, operands: &[Value], frame: FrameId) -> SchemeResult<EvalStep> {
        let [Value::Symbol(name), expr] = operands else {
            return Err(SchemeError::SyntaxError(
                "set! expects a symbol and an expression".into(),
            ));
        };
        let name = *name;
        let value = self.eval_expression(*expr, frame)?;
        env::set(&mut self.heap, frame, name, value, &self.symbols)?;
        Ok(EvalStep::Value(Value::Unspecified))
    }

    /// (lambda formals body...): capture the current frame.
    fn form_lambda(&mut self, operands: &[Value], frame: FrameId) -> SchemeResult<EvalStep> {
        let Some(&formals) = operands.first() else {
            return Err(SchemeError::SyntaxError(
                "lambda expects a formals list and a body".into(),
            ));
        };
        let procedure = self.make_compound(None, formals, &operands[1..], frame)?;
        Ok(EvalStep::Value(procedure))
    }

    /// (begin expr...): sequence; empty begin is unspecified.
    fn form_begin(
        &mut self,
        operands: &[Value],
        frame: FrameId,
        tail: bool,
    ) -> SchemeResult<EvalStep> {
        if operands.is_empty() {
            return Ok(EvalStep::Value(Value::Unspecified));
        }
        self.eval_sequence(operands, frame, tail)
    }

    /// (cond (test body...) ... (else body...)): first truthy test wins.
    /// A clause with no body yields its test's value.
    fn form_cond(
        &mut self,
        operands: &[Value],
        frame: FrameId,
        tail: bool,
    ) -> SchemeResult<EvalStep> {
        if operands.is_empty() {
            return Err(SchemeError::SyntaxError(
                "cond requires at least one clause".into(),
            ));
        }
        for (index, &clause) in operands.iter().enumerate() {
            let parts = match clause {
                Value::Pair(_) => self.heap.list_to_vec(clause),
                _ => None,
            }
            .ok_or_else(|| SchemeError::SyntaxError("cond clause must be a list".into()))?;
            if parts.is_empty() {
                return Err(SchemeError::SyntaxError("cond clause must be a list".into()));
            }

            if parts[0] == Value::Symbol(sym::ELSE) {
                if index != operands.len() - 1 {
                    return Err(SchemeError::SyntaxError(
                        "else must be the last cond clause".into(),
                    ));
                }
                if parts.len() == 1 {
                    return Err(SchemeError::SyntaxError(
                        "else clause requires a body".into(),
                    ));
                }
                return self.eval_sequence(&parts[1..], frame, tail);
            }

            let test = self.eval_expression(parts[0], frame)?;
            if test.is_truthy() {
                if parts.len() == 1 {
                    return Ok(EvalStep::Value(test));
                }
                return self.eval_sequence(&parts[1..], frame, tail);
            }
        }
        Ok(EvalStep::Value(Value::Unspecified))
    }

    /// (and expr...): short-circuit on the first false value; empty and
    /// is #t. The last expression is in tail position.
    fn form_and(
        &mut self,
        operands: &[Value],
        frame: FrameId,
        tail: bool,
    ) -> SchemeResult<EvalStep> {
        let Some((&last, init)) = operands.split_last() else {
            return Ok(EvalStep::Value(Value::Bool(true)));
        };
        for &expr in init {
            let val = self.eval_expression(expr, frame)?;
            if !val.is_truthy() {
                return Ok(EvalStep::Value(val));
            }
        }
        self.eval_step(last, frame, tail)
    }

    /// (or expr...): short-circuit on the first truthy value; empty or
    /// is #f. The last expression is in tail position.
    fn form_or(
        &mut self,
        operands: &[Value],
        frame: FrameId,
        tail: bool,
    ) -> SchemeResult<EvalStep> {
        let Some((&last, init)) = operands.split_last() else {
            return Ok(EvalStep::Value(Value::Bool(false)));
        };
        for &expr in init {
            let val = self.eval_expression(expr, frame)?;
            if val.is_truthy() {
                return Ok(EvalStep::Value(val));
            }
        }
        self.eval_step(last, frame, tail)
    }

    /// Construct a compound procedure from a formals datum and body.
    fn make_compound(
        &mut self,
        name: Option<SymbolId>,
        formals: Value,
        body: &[Value],
        frame: FrameId,
    ) -> SchemeResult<Value> {
        if body.is_empty() {
            return Err(SchemeError::SyntaxError(
                "procedure body must not be empty".into(),
            ));
        }
        let (formals, rest_formal) = self.parse_formals(formals)?;
        let id = self
            .heap
            .alloc_procedure(ProcedureCell::Compound(Lambda {
                name,
                formals,
                rest_formal,
                body: body.to_vec(),
                env: frame,
            }))?;
        Ok(Value::Procedure(id))
    }

    /// Parse a formals datum: a proper list of symbols (fixed arity), a
    /// single symbol (collect all arguments), or an improper list (fixed
    /// prefix plus rest).
    fn parse_formals(&self, formals: Value) -> SchemeResult<(Vec<SymbolId>, Option<SymbolId>)> {
        let mut fixed = Vec::new();
        let mut current = formals;
        loop {
            match current {
                Value::Nil => return Ok((fixed, None)),
                Value::Symbol(rest) => {
                    if fixed.contains(&rest) {
                        return Err(SchemeError::SyntaxError(format!(
                            "duplicate formal parameter '{}'",
                            self.symbols.name(rest)
                        )));
                    }
                    return Ok((fixed, Some(rest)));
                }
                Value::Pair(id) => {
                    let Value::Symbol(formal) = self.heap.car(id) else {
                        return Err(SchemeError::SyntaxError(
                            "formal parameter must be a symbol".into(),
                        ));
                    };
                    if fixed.contains(&formal) {
                        return Err(SchemeError::SyntaxError(format!(
                            "duplicate formal parameter '{}'",
                            self.symbols.name(formal)
                        )));
                    }
                    fixed.push(formal);
                    current = self.heap.cdr(id);
                }
                _ => {
                    return Err(SchemeError::SyntaxError(
                        "malformed formal parameter list".into(),
                    ))
                }
            }
        }
    }

    /// Give an anonymous compound procedure the name it is being bound to.
    fn name_procedure(&mut self, value: Value, name: SymbolId) {
        if let Value::Procedure(id) = value {
            if let ProcedureCell::Compound(lambda) = self.heap.procedure_mut(id) {
                if lambda.name.is_none() {
                    lambda.name = Some(name);
                }
            }
        }
    }

    // === Garbage collection ===

    /// Run a full mark-and-sweep collection and return the number of cells
    /// freed. Refused while any compound procedure call is on the host
    /// stack, since its locals are invisible to the marker.
    pub fn collect(&mut self) -> SchemeResult<usize> {
        if self.call_depth != 0 {
            return Err(SchemeError::CannotCollectHere);
        }

        self.heap.clear_marks();
        let mut worklist = Vec::new();
        self.heap.mark_frame(self.global, &mut worklist);
        self.heap.mark_value(self.current_datum, &mut worklist);
        for index in 0..self.operand_stack.len() {
            let val = self.operand_stack[index];
            self.heap.mark_value(val, &mut worklist);
        }
        self.heap.process_worklist(&mut worklist);
        let freed = self.heap.sweep();

        if self.trace {
            eprintln!(
                "trace: gc freed {} cell(s), {}/{} occupied",
                freed,
                self.heap.occupied_count(),
                self.heap.capacity()
            );
        }
        Ok(freed)
    }
}

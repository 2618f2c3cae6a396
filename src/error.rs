use std::fmt;
use thiserror::Error;

/// Line/column location of a diagnostic in source text (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Errors surfaced by the interpreter at the Rust level.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemeError {
    /// Lookup or `set!` on a name with no binding in any frame.
    #[error("unbound variable: {0}")]
    UnboundVariable(String),

    /// Wrong value kind at an operation, e.g. car of a non-pair.
    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    /// Application argument-count mismatch.
    #[error("wrong number of arguments: expected {expected}, got {got}")]
    ArityMismatch { expected: String, got: usize },

    /// Malformed special form or unevaluable expression.
    #[error("syntax error: {0}")]
    SyntaxError(String),

    /// Reader: a list was still open at end of input.
    #[error("unclosed list starting at {0}")]
    UnclosedList(Position),

    /// Reader: a `)` with no matching `(`.
    #[error("unexpected ')' at {0}")]
    UnexpectedRightParen(Position),

    /// Reader: a dot somewhere other than before the last list element.
    #[error("malformed dotted pair at {0}")]
    MalformedDot(Position),

    /// Reader: a string literal ran past end of input.
    #[error("unterminated string literal starting at {0}")]
    UnterminatedString(Position),

    /// Reader: a token that starts like a number but isn't one.
    #[error("invalid number at {0}")]
    InvalidNumber(Position),

    /// The `assert` primitive was handed `#f`.
    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    /// `gc` invoked while the procedure call stack is non-empty; host-stack
    /// locals would be invisible to the marker.
    #[error("cannot collect garbage inside a procedure call")]
    CannotCollectHere,

    /// Heap capacity exceeded. Fatal.
    #[error("out of memory: heap capacity exceeded")]
    OutOfMemory,

    /// `/` with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,
}

pub type SchemeResult<T> = Result<T, SchemeError>;

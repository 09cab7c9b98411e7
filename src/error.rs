// ABOUTME: The interpreter's single error taxonomy, threaded through every pipeline stage

use thiserror::Error;

/// One error kind per the taxonomy described for the core: lexical warnings
/// are non-fatal and collected separately (see `token::TokenizerWarning`),
/// everything else here is fatal to the interpretation in progress and
/// propagates to the host boundary. Nothing in this crate recovers from an
/// error internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpalError {
    /// Syntactic: expected X, got Y at line L.
    #[error("Exception at line {line}. got '{got}' where expected value '{expected}'")]
    Syntax {
        expected: String,
        got: String,
        line: usize,
    },

    /// Runtime: Rule 1 lookup failed to resolve a name through any frame.
    #[error("Undeclared Identifier <{name}> in line {line}")]
    UndeclaredIdentifier { name: String, line: usize },

    /// Runtime: an operator or built-in received an operand of the wrong shape.
    #[error("{operator}: {message}")]
    TypeMismatch { operator: String, message: String },

    #[error("Division by zero.")]
    DivisionByZero,

    #[error("Index out of bounds for tuple elements.")]
    TupleIndexOutOfRange,

    /// Runtime: a lambda was applied to the wrong number of arguments.
    #[error("expected {expected} argument(s), got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("Illegal Function Application")]
    IllegalApplication,

    /// Standardization / control-structure-generation: malformed ST shape.
    /// Indicates a bug in an earlier pipeline stage, not a user-facing
    /// condition, but still surfaced through the same `Result` rather than
    /// a panic.
    #[error("internal interpreter error: {0}")]
    Internal(String),

    #[error("step budget of {0} exhausted")]
    StepBudgetExhausted(usize),
}

impl RpalError {
    pub fn internal(message: impl Into<String>) -> Self {
        RpalError::Internal(message.into())
    }
}

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Typed errors for the leaf components. Orchestration code wraps these in
//! `anyhow` with context.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while filling a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A `{` with no closing `}`.
    #[error("unclosed placeholder starting at byte {position}")]
    UnclosedPlaceholder {
        /// Byte offset of the opening brace.
        position: usize,
    },
    /// A lone `}` outside any placeholder.
    #[error("single '}}' encountered at byte {position}")]
    StrayClosingBrace {
        /// Byte offset of the brace.
        position: usize,
    },
    /// A `{` inside a placeholder name.
    #[error("unexpected '{{' in placeholder name at byte {position}")]
    NestedPlaceholder {
        /// Byte offset of the inner brace.
        position: usize,
    },
}

/// Errors raised by the strict doctest parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DoctestError {
    /// Strict mode forbids continuation lines.
    #[error("line {line}: continuation lines are not allowed in strict mode")]
    Continuation {
        /// 1-based line number in the transcript.
        line: usize,
    },
    /// Strict mode allows at most one line of expected output.
    #[error("line {line}: `{stmt}` expects more than one output line")]
    MultipleOutputLines {
        /// 1-based line number of the extra output line.
        line: usize,
        /// Statement the output belongs to.
        stmt: String,
    },
}

/// Plumbing failures of a runtime adapter. These are distinct from errors
/// raised by the graded program, which are reported as data.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No usable interpreter could be found or started.
    #[error("could not start interpreter `{program}`: {source}")]
    Spawn {
        /// Interpreter path that failed to start.
        program: String,
        /// Underlying IO error.
        #[source]
        source:  std::io::Error,
    },
    /// The interpreter exited or closed its pipes mid-request.
    #[error("interpreter exited unexpectedly{}", stderr_suffix(.stderr))]
    Exited {
        /// Whatever the interpreter wrote to stderr, if captured.
        stderr: String,
    },
    /// The interpreter replied with something that is not a protocol frame.
    #[error("malformed reply from interpreter: {0}")]
    Protocol(String),
    /// Replaying the loaded program after a restart did not finish in time.
    #[error("restoring interpreter state timed out after {0:?}")]
    ReplayTimeout(Duration),
    /// The evaluation thread went away without answering.
    #[error("evaluation thread terminated without a result")]
    WorkerLost,
    /// Any other IO failure talking to the interpreter.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by Scheme programs. Their messages become load statuses
/// and test output, so they read like the interpreter's own diagnostics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemeError {
    /// The source text could not be read.
    #[error("SyntaxError: {0}")]
    Syntax(String),
    /// A special form was used with the wrong shape.
    #[error("SchemeError: badly formed expression: {0}")]
    BadForm(String),
    /// Lookup of an unbound name.
    #[error("SchemeError: unknown identifier: {0}")]
    UnknownIdentifier(String),
    /// Application of something that is not a procedure.
    #[error("SchemeError: cannot call: {0}")]
    NotCallable(String),
    /// Wrong number of arguments to a procedure.
    #[error("SchemeError: {name}: expected {expected} argument(s), got {got}")]
    Arity {
        /// Procedure name.
        name:     String,
        /// Human-readable expected count.
        expected: String,
        /// Count actually supplied.
        got:      usize,
    },
    /// An argument of the wrong type.
    #[error("SchemeError: {name}: argument {index} is not {expected}: {got}")]
    WrongType {
        /// Procedure name.
        name:     String,
        /// 0-based argument position.
        index:    usize,
        /// Description of the expected type.
        expected: &'static str,
        /// Printed form of the offending value.
        got:      String,
    },
    /// Integer division by zero.
    #[error("ZeroDivisionError: division by zero")]
    DivisionByZero,
    /// Raised by `(error ...)` in user code.
    #[error("SchemeError: {0}")]
    User(String),
    /// Call depth exceeded the budget.
    #[error("RecursionError: maximum recursion depth exceeded")]
    RecursionDepth,
    /// The evaluation deadline passed.
    #[error("Timeout")]
    Timeout,
}

/// Formats captured stderr as a trailing `: ...` when non-empty.
fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

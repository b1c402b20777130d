#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Runtimes that rendered programs and test statements execute in.
//!
//! Both languages sit behind [`Runtime`], a tagged variant chosen from the
//! template's declared [`Language`]. A `Runtime` value *is* the global scope:
//! it is created for one (student, template) unit, threaded through every
//! call, and dropped when that unit is done.

use std::{ffi::OsString, time::Duration};

use crate::{error::RuntimeError, types::Language};

/// Python child-interpreter runtime.
pub mod python;
/// Embedded Scheme interpreter.
pub mod scheme;

pub use python::PythonSession;
pub use scheme::SchemeScope;

/// How a piece of code should be run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Try it as an expression and print its value; fall back to running it
    /// as statements if it does not parse as one.
    Auto,
    /// Run it as a block of statements.
    Statements,
}

/// What running some code produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Captured output, including the error message if one was raised.
    pub stdout:    String,
    /// Error message, if the code raised.
    pub error:     Option<String>,
    /// Whether the deadline expired before the code finished.
    pub timed_out: bool,
}

impl RunOutput {
    /// Output for a run that was cut off by its deadline.
    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }
}

/// A language runtime together with its global scope.
pub enum Runtime {
    /// A Python scope in a child interpreter.
    Python(PythonSession),
    /// A Scheme global frame.
    Scheme(SchemeScope),
}

impl Runtime {
    /// Creates an empty scope for `language`. `python` is the interpreter
    /// used for Python scopes.
    pub fn new(language: Language, python: impl Into<OsString>) -> Self {
        match language {
            Language::Python => Runtime::Python(PythonSession::new(python)),
            Language::Scheme => Runtime::Scheme(SchemeScope::new()),
        }
    }

    /// Returns the language of this runtime.
    pub fn language(&self) -> Language {
        match self {
            Runtime::Python(_) => Language::Python,
            Runtime::Scheme(_) => Language::Scheme,
        }
    }

    /// Runs `code` against the scope, giving up after `deadline`.
    pub async fn run(
        &mut self,
        code: &str,
        mode: RunMode,
        deadline: Duration,
    ) -> Result<RunOutput, RuntimeError> {
        match self {
            Runtime::Python(session) => session.run(code, mode, deadline).await,
            Runtime::Scheme(scope) => scope.run(code, deadline).await,
        }
    }

    /// Binds a global name to a JSON value.
    pub async fn bind(
        &mut self,
        name: &str,
        value: &serde_json::Value,
        deadline: Duration,
    ) -> Result<(), RuntimeError> {
        match self {
            Runtime::Python(session) => session.bind(name, value, deadline).await,
            Runtime::Scheme(scope) => {
                scope.bind(name, value);
                Ok(())
            }
        }
    }
}

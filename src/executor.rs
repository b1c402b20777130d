#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Loads a rendered program into a runtime under a deadline.

use std::time::Duration;

use crate::{
    error::RuntimeError,
    runtime::{RunMode, RunOutput, Runtime},
    types::ExecutionResult,
};

/// Status (and trailing output) recorded when a program overruns its
/// deadline.
pub const TIMEOUT_STATUS: &str = "Timeout";

/// Runs `code` as statements against `runtime`'s global scope.
///
/// Errors raised by the program, and timeouts, come back as
/// [`ExecutionResult::status`]. Only a runtime that cannot be started at all
/// is reported as an `Err`; any other plumbing failure is recorded as the
/// status so the student's tests are skipped.
pub async fn execute(
    code: &str,
    runtime: &mut Runtime,
    timeout: Duration,
) -> Result<ExecutionResult, RuntimeError> {
    match runtime.run(code, RunMode::Statements, timeout).await {
        Ok(output) => Ok(classify(output)),
        Err(err @ RuntimeError::Spawn { .. }) => Err(err),
        Err(err) => {
            tracing::warn!(language = %runtime.language(), "runtime failed while loading: {err}");
            let message = err.to_string();
            Ok(ExecutionResult {
                stdout: format!("{message}\n"),
                status: Some(message),
            })
        }
    }
}

/// Turns raw runtime output into a load result.
pub fn classify(output: RunOutput) -> ExecutionResult {
    let RunOutput {
        mut stdout,
        error,
        timed_out,
    } = output;

    if timed_out {
        stdout.push_str(TIMEOUT_STATUS);
        return ExecutionResult {
            status: Some(TIMEOUT_STATUS.to_string()),
            stdout,
        };
    }

    ExecutionResult {
        status: error,
        stdout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Language;

    #[test]
    fn timeouts_append_marker() {
        let result = classify(RunOutput {
            stdout:    "partial\n".into(),
            error:     None,
            timed_out: true,
        });
        assert_eq!(result.status.as_deref(), Some("Timeout"));
        assert_eq!(result.stdout, "partial\nTimeout");
    }

    #[test]
    fn clean_runs_have_no_status() {
        let result = classify(RunOutput {
            stdout:    "hello\n".into(),
            error:     None,
            timed_out: false,
        });
        assert!(result.is_clean());
        assert_eq!(result.stdout, "hello\n");
    }

    #[tokio::test]
    async fn scheme_errors_become_status() {
        let mut runtime = Runtime::new(Language::Scheme, "python3");
        let result = execute("(define x (car nil))", &mut runtime, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(
            result.status.as_deref(),
            Some("SchemeError: car: argument 0 is not a pair: ()")
        );
        assert!(result.stdout.ends_with("not a pair: ()\n"));
    }

    #[tokio::test]
    async fn scheme_infinite_loop_times_out() {
        let mut runtime = Runtime::new(Language::Scheme, "python3");
        let started = std::time::Instant::now();
        let result = execute(
            "(define (f) (f)) (f)",
            &mut runtime,
            Duration::from_millis(300),
        )
        .await
        .unwrap();
        assert_eq!(result.status.as_deref(), Some("Timeout"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn python_timeout_keeps_earlier_output() {
        let Ok(python) = crate::runtime::python::interpreter_path() else { return };
        let mut runtime = Runtime::new(Language::Python, python);
        let result = execute(
            "print('loading')\nwhile True: pass",
            &mut runtime,
            Duration::from_millis(500),
        )
        .await
        .unwrap();
        assert_eq!(result.status.as_deref(), Some("Timeout"));
        assert_eq!(result.stdout, "loading\nTimeout");
    }
}

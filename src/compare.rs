#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Runs each test statement against a loaded scope and records a verdict.

use std::time::Duration;

use crate::{
    error::RuntimeError,
    executor::TIMEOUT_STATUS,
    runtime::{RunMode, Runtime},
    types::{ExecutionResult, Test},
};

/// Verdict shown for tests that never ran because the program failed to
/// load.
pub const NOT_EXECUTED: &str = "DID NOT EXECUTE";

/// Escapes newlines so a verdict stays on one line.
fn one_line(s: &str) -> String {
    s.replace('\n', "\\n")
}

/// Classifies observed output against the expected output.
pub fn verdict(expected: &str, observed: &str) -> String {
    let expected = expected.trim();
    let observed = observed.trim();
    if expected == observed {
        format!("SUCCESS: Got {}", one_line(observed))
    } else {
        format!(
            "FAILED: Expected {}, got {}",
            one_line(expected),
            one_line(observed)
        )
    }
}

/// Returns true if `result` is a passing verdict.
pub fn is_success(result: &str) -> bool {
    result.starts_with("SUCCESS")
}

/// Fills in `result` for every test, in order, using `runtime`'s scope.
///
/// Nothing runs if `load` has a status: every `result` stays `None`.
pub async fn compare(
    tests: &mut [Test],
    load: &ExecutionResult,
    runtime: &mut Runtime,
    timeout: Duration,
) -> Result<(), RuntimeError> {
    if !load.is_clean() {
        return Ok(());
    }

    for test in tests.iter_mut() {
        let observed = match runtime.run(&test.stmt, RunMode::Auto, timeout).await {
            Ok(output) if output.timed_out => format!("{}{TIMEOUT_STATUS}", output.stdout),
            Ok(output) => output.stdout,
            Err(err @ RuntimeError::Spawn { .. }) => return Err(err),
            Err(err) => {
                tracing::warn!("runtime failed while running `{}`: {err}", test.stmt);
                err.to_string()
            }
        };
        test.result = Some(verdict(&test.out, &observed));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Language;

    #[test]
    fn verdicts_trim_and_escape() {
        assert_eq!(verdict("3", "3\n"), "SUCCESS: Got 3");
        assert_eq!(verdict("3", " 4 "), "FAILED: Expected 3, got 4");
        assert_eq!(verdict("1\n2", "1\n2\n"), "SUCCESS: Got 1\\n2");
        assert_eq!(verdict("", ""), "SUCCESS: Got ");
    }

    #[test]
    fn verdicts_are_deterministic() {
        let first = verdict("[1, 2]", "[1, 2, 3]");
        for _ in 0..10 {
            assert_eq!(verdict("[1, 2]", "[1, 2, 3]"), first);
        }
    }

    #[tokio::test]
    async fn failed_load_leaves_tests_unrun() {
        let mut runtime = Runtime::new(Language::Scheme, "python3");
        let mut tests = vec![Test::new("(+ 1 1)", "2")];
        let load = ExecutionResult {
            status: Some("SchemeError: boom".into()),
            stdout: "SchemeError: boom\n".into(),
        };
        compare(&mut tests, &load, &mut runtime, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(tests[0].result.is_none());
    }

    #[tokio::test]
    async fn scheme_tests_share_the_loaded_scope() {
        let mut runtime = Runtime::new(Language::Scheme, "python3");
        runtime
            .run("(define (double x) (* 2 x))", RunMode::Statements, Duration::from_secs(2))
            .await
            .unwrap();
        let mut tests = vec![
            Test::new("(double 4)", "8"),
            Test::new("(double 'a)", "8"),
        ];
        compare(
            &mut tests,
            &ExecutionResult::default(),
            &mut runtime,
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert_eq!(tests[0].result.as_deref(), Some("SUCCESS: Got 8"));
        assert!(tests[1].result.as_deref().unwrap().starts_with("FAILED: Expected 8, got SchemeError"));
    }
}

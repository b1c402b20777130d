#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Embedded Scheme runtime.
//!
//! Programs run on a dedicated thread with a large stack so deeply
//! recursive student code fails with a recursion error instead of
//! overflowing. The interpreter checks its own deadline; the caller also
//! waits with a slightly longer timeout in case a builtin stalls.

use std::{sync::Arc, time::Duration};

use tokio::sync::oneshot;

use super::RunOutput;
use crate::error::{RuntimeError, SchemeError};

/// Builtin procedures.
pub mod builtins;
/// The evaluator and its execution budget.
pub mod eval;
/// Source reader.
pub mod reader;
/// Values and environments.
pub mod value;

use eval::{Budget, Interp};
use value::{Env, Registry, Value};

/// Stack size of the evaluation thread.
const EVAL_STACK_BYTES: usize = 256 * 1024 * 1024;

/// Extra time the caller waits past the interpreter's own deadline.
const GRACE: Duration = Duration::from_millis(250);

/// A Scheme global frame.
pub struct SchemeScope {
    /// Global bindings, shared with the evaluation thread while it runs.
    global:   Env,
    /// Every frame and promise created in this scope.
    registry: Arc<Registry>,
}

impl Default for SchemeScope {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemeScope {
    /// A fresh scope with only the builtins bound.
    pub fn new() -> Self {
        Self {
            global:   builtins::global_frame(),
            registry: Arc::default(),
        }
    }

    /// Reads and evaluates every form in `code`. The value of each form is
    /// printed unless it has none; an error message ends the output.
    pub async fn run(&mut self, code: &str, deadline: Duration) -> Result<RunOutput, RuntimeError> {
        let env = Arc::clone(&self.global);
        let registry = Arc::clone(&self.registry);
        let code = code.to_string();
        let (tx, rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("scheme-eval".into())
            .stack_size(EVAL_STACK_BYTES)
            .spawn(move || {
                let interp = Interp::with_registry(Budget::new(deadline), registry);
                let _ = tx.send(run_program(&code, &env, interp));
            })?;

        match tokio::time::timeout(deadline + GRACE, rx).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(_)) => Err(RuntimeError::WorkerLost),
            Err(_) => {
                tracing::debug!("scheme evaluation ignored its budget past {deadline:?}");
                Ok(RunOutput::timed_out())
            }
        }
    }

    /// Binds the global `name` to a JSON value.
    pub fn bind(&mut self, name: &str, value: &serde_json::Value) {
        self.global.define(Arc::from(name), Value::from_json(value));
    }
}

impl Drop for SchemeScope {
    fn drop(&mut self) {
        self.global.clear();
        self.registry.teardown();
    }
}

/// Evaluates `code` and packages what happened.
fn run_program(code: &str, env: &Env, mut interp: Interp) -> RunOutput {
    let result = eval_forms(&mut interp, code, env);
    let mut stdout = interp.out;
    match result {
        Ok(()) => RunOutput {
            stdout,
            error: None,
            timed_out: false,
        },
        Err(SchemeError::Timeout) => RunOutput {
            stdout,
            error: None,
            timed_out: true,
        },
        Err(err) => {
            let message = err.to_string();
            stdout.push_str(&message);
            stdout.push('\n');
            RunOutput {
                stdout,
                error: Some(message),
                timed_out: false,
            }
        }
    }
}

/// Reads and evaluates one form at a time, printing values as it goes.
fn eval_forms(interp: &mut Interp, code: &str, env: &Env) -> Result<(), SchemeError> {
    for form in reader::Forms::new(code) {
        let value = interp.eval(form?, Arc::clone(env))?;
        if !matches!(value, Value::Unspecified) {
            interp.out.push_str(&value.to_string());
            interp.out.push('\n');
        }
    }
    Ok(())
}

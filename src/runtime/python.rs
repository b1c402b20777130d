#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Python runtime: a child interpreter running a small evaluation server.
//!
//! The child holds the global scope, so definitions made while loading a
//! program are visible to every later statement. Output is streamed back a
//! line at a time, so a request that overruns its deadline still reports
//! what it printed. Such a request kills the child; the next request starts
//! a fresh one and replays the requests that had completed, bringing the
//! scope back to where it was.

use std::{
    ffi::{OsStr, OsString},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use which::which;

use super::{RunMode, RunOutput};
use crate::{config, error::RuntimeError, process, process::LineSession};

/// Source of the evaluation server.
const DRIVER: &str = include_str!("driver.py");

/// Finds the Python interpreter: the configured override, then `python3`,
/// then `python` on the PATH.
pub fn interpreter_path() -> Result<PathBuf> {
    if let Some(path) = config::get().python() {
        return Ok(path.to_path_buf());
    }
    which("python3")
        .or_else(|_| which("python"))
        .map_err(|_| anyhow!("Could not find a Python interpreter on PATH (python3 or python)"))
}

/// Returns the interpreter's version banner, e.g. `Python 3.12.1`.
pub async fn interpreter_version(program: &OsStr) -> Result<String> {
    let collected = process::run_collect(
        program,
        &[OsString::from("--version")],
        Duration::from_secs(10),
    )
    .await
    .with_context(|| format!("Could not run {}", program.to_string_lossy()))?;

    let stdout = String::from_utf8_lossy(&collected.stdout).trim().to_string();
    if stdout.is_empty() {
        // Very old interpreters print the banner to stderr.
        Ok(String::from_utf8_lossy(&collected.stderr).trim().to_string())
    } else {
        Ok(stdout)
    }
}

/// One request to the evaluation server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Request<'a> {
    /// Evaluate or execute code.
    Run {
        /// Source text.
        code: &'a str,
        /// Skip the expression attempt.
        stmt: bool,
    },
    /// Assign a JSON value to a global name.
    Bind {
        /// Global name.
        name:  &'a str,
        /// Value to assign.
        value: &'a serde_json::Value,
    },
}

/// One line sent by the evaluation server.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Message {
    /// Output printed so far.
    Out {
        /// The printed text.
        text: String,
    },
    /// The request finished.
    Done {
        /// Error message, if the code raised.
        error: Option<String>,
    },
}

/// How a request ended.
#[derive(Debug)]
enum Exchange {
    /// The server finished the request.
    Finished {
        /// Everything printed.
        stdout: String,
        /// Error message, if the code raised.
        error:  Option<String>,
    },
    /// The deadline passed first.
    TimedOut {
        /// What was printed before the deadline.
        stdout: String,
    },
}

/// Returns true for the line that ends a request. Lines that do not parse
/// end it too, so the caller reports them.
fn is_done(raw: &str) -> bool {
    !matches!(decode(raw), Ok(Message::Out { .. }))
}

/// A Python global scope backed by a child interpreter.
pub struct PythonSession {
    /// Interpreter to launch.
    program: OsString,
    /// Running child, if any.
    child:   Option<LineSession>,
    /// Serialized requests that completed, in order.
    history: Vec<String>,
}

impl PythonSession {
    /// Creates a session for `program`. The interpreter is started lazily.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            child:   None,
            history: Vec::new(),
        }
    }

    /// Runs `code` in the session's scope.
    pub async fn run(
        &mut self,
        code: &str,
        mode: RunMode,
        deadline: Duration,
    ) -> Result<RunOutput, RuntimeError> {
        let line = encode(&Request::Run {
            code,
            stmt: mode == RunMode::Statements,
        })?;
        Ok(match self.send(line, deadline).await? {
            Exchange::Finished { stdout, error } => RunOutput {
                stdout,
                error,
                timed_out: false,
            },
            Exchange::TimedOut { stdout } => RunOutput {
                stdout,
                error: None,
                timed_out: true,
            },
        })
    }

    /// Assigns `value` to the global `name`.
    pub async fn bind(
        &mut self,
        name: &str,
        value: &serde_json::Value,
        deadline: Duration,
    ) -> Result<(), RuntimeError> {
        let line = encode(&Request::Bind { name, value })?;
        match self.send(line, deadline).await? {
            Exchange::Finished { .. } => Ok(()),
            Exchange::TimedOut { .. } => Err(RuntimeError::ReplayTimeout(deadline)),
        }
    }

    /// Sends one request, restarting the child first if needed.
    async fn send(&mut self, line: String, deadline: Duration) -> Result<Exchange, RuntimeError> {
        let child = self.ensure_started(deadline).await?;
        let mut stdout = String::new();
        let reply = child
            .request_until(&line, deadline, |raw| {
                if let Ok(Message::Out { text }) = decode(raw) {
                    stdout.push_str(&text);
                    return false;
                }
                true
            })
            .await;

        match reply {
            Ok(Some(raw)) => match decode(&raw)? {
                Message::Done { error } => {
                    self.history.push(line);
                    Ok(Exchange::Finished { stdout, error })
                }
                Message::Out { .. } => Err(RuntimeError::Protocol(format!("unexpected reply: {raw}"))),
            },
            Ok(None) => {
                tracing::debug!("python request overran {deadline:?}; discarding interpreter");
                self.child = None;
                Ok(Exchange::TimedOut { stdout })
            }
            Err(err) => {
                self.child = None;
                Err(err)
            }
        }
    }

    /// Returns the running child, starting one and replaying history if
    /// there is none.
    async fn ensure_started(&mut self, deadline: Duration) -> Result<&mut LineSession, RuntimeError> {
        if self.child.is_none() {
            let mut child = LineSession::spawn(
                &self.program,
                &[OsStr::new("-u"), OsStr::new("-c"), OsStr::new(DRIVER)],
                &[("PYTHONIOENCODING", "utf-8")],
            )?;

            if !self.history.is_empty() {
                tracing::debug!(requests = self.history.len(), "replaying python scope");
            }
            for line in &self.history {
                match child.request_until(line, deadline, is_done).await? {
                    Some(raw) => {
                        decode(&raw)?;
                    }
                    None => return Err(RuntimeError::ReplayTimeout(deadline)),
                }
            }
            self.child = Some(child);
        }

        self.child
            .as_mut()
            .ok_or_else(|| RuntimeError::Protocol("interpreter not running".into()))
    }
}

/// Serializes a request as a single line.
fn encode(request: &Request<'_>) -> Result<String, RuntimeError> {
    serde_json::to_string(request).map_err(|e| RuntimeError::Protocol(e.to_string()))
}

/// Parses a reply line.
fn decode(raw: &str) -> Result<Message, RuntimeError> {
    serde_json::from_str(raw).map_err(|e| RuntimeError::Protocol(format!("{e}: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Option<PythonSession> {
        match which("python3").or_else(|_| which("python")) {
            Ok(path) => Some(PythonSession::new(path)),
            Err(_) => {
                eprintln!("skipping: no python interpreter on PATH");
                None
            }
        }
    }

    const DEADLINE: Duration = Duration::from_secs(5);

    #[test]
    fn requests_serialize_with_op_tag() {
        let line = encode(&Request::Run {
            code: "1 + 1",
            stmt: false,
        })
        .unwrap();
        assert_eq!(line, r#"{"op":"run","code":"1 + 1","stmt":false}"#);
    }

    #[tokio::test]
    async fn expressions_print_their_repr() {
        let Some(mut py) = session() else { return };
        let out = py.run("'a' * 2", RunMode::Auto, DEADLINE).await.unwrap();
        assert_eq!(out.stdout, "'aa'\n");
        assert!(out.error.is_none());

        let none = py.run("None", RunMode::Auto, DEADLINE).await.unwrap();
        assert_eq!(none.stdout, "");
    }

    #[tokio::test]
    async fn definitions_persist_between_requests() {
        let Some(mut py) = session() else { return };
        py.run("def f(x):\n    return x + 1\n", RunMode::Statements, DEADLINE)
            .await
            .unwrap();
        let out = py.run("f(2)", RunMode::Auto, DEADLINE).await.unwrap();
        assert_eq!(out.stdout.trim(), "3");
    }

    #[tokio::test]
    async fn syntax_errors_fall_back_then_report() {
        let Some(mut py) = session() else { return };
        let assign = py.run("y = 4", RunMode::Auto, DEADLINE).await.unwrap();
        assert!(assign.error.is_none());
        let out = py.run("x +", RunMode::Auto, DEADLINE).await.unwrap();
        assert!(out.error.is_some());
        assert!(out.stdout.contains("invalid syntax"), "{}", out.stdout);
    }

    #[tokio::test]
    async fn exceptions_without_message_use_type_name() {
        let Some(mut py) = session() else { return };
        let out = py
            .run("raise ValueError()", RunMode::Statements, DEADLINE)
            .await
            .unwrap();
        assert_eq!(out.error.as_deref(), Some("ValueError"));
    }

    #[tokio::test]
    async fn student_input_sees_empty_stdin() {
        let Some(mut py) = session() else { return };
        let out = py.run("input()", RunMode::Auto, DEADLINE).await.unwrap();
        assert_eq!(out.error.as_deref(), Some("EOF when reading a line"));
        let still_alive = py.run("1", RunMode::Auto, DEADLINE).await.unwrap();
        assert_eq!(still_alive.stdout, "1\n");
    }

    #[tokio::test]
    async fn timeout_restarts_and_restores_scope() {
        let Some(mut py) = session() else { return };
        py.run("k = 41", RunMode::Statements, DEADLINE).await.unwrap();

        let started = std::time::Instant::now();
        let out = py
            .run("while True: pass", RunMode::Statements, Duration::from_millis(300))
            .await
            .unwrap();
        assert!(out.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));

        let after = py.run("k + 1", RunMode::Auto, DEADLINE).await.unwrap();
        assert_eq!(after.stdout.trim(), "42");
    }

    #[tokio::test]
    async fn timeout_keeps_output_printed_before_it() {
        let Some(mut py) = session() else { return };
        let out = py
            .run(
                "print('progress')\nwhile True: pass",
                RunMode::Statements,
                Duration::from_millis(500),
            )
            .await
            .unwrap();
        assert!(out.timed_out);
        assert_eq!(out.stdout, "progress\n");
    }

    #[tokio::test]
    async fn output_arrives_in_order_across_lines() {
        let Some(mut py) = session() else { return };
        let out = py
            .run("for i in range(3):\n    print(i, end='')\n    print()", RunMode::Statements, DEADLINE)
            .await
            .unwrap();
        assert_eq!(out.stdout, "0\n1\n2\n");
    }

    #[tokio::test]
    async fn bind_defines_global() {
        let Some(mut py) = session() else { return };
        py.bind("flag", &serde_json::json!(true), DEADLINE)
            .await
            .unwrap();
        let out = py.run("flag", RunMode::Auto, DEADLINE).await.unwrap();
        assert_eq!(out.stdout.trim(), "True");
    }
}

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Child-process plumbing: one-shot collection and long-lived line-oriented
//! sessions, both guarded so a child never outlives its owner.

use std::{
    ffi::{OsStr, OsString},
    process::Stdio,
    time::Duration,
};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout, Command},
    task::JoinHandle,
    time::timeout,
};

use crate::error::RuntimeError;

/// Drop guard that terminates a spawned child process if callers forget to
/// await it.
struct ChildDropGuard(Option<Child>);

impl ChildDropGuard {
    /// Wraps the provided child process with the drop guard.
    fn new(child: Child) -> Self {
        Self(Some(child))
    }

    /// Returns a mutable reference to the underlying child process.
    fn child_mut(&mut self) -> Option<&mut Child> {
        self.0.as_mut()
    }

    /// Prevents the guard from killing the process on drop.
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for ChildDropGuard {
    fn drop(&mut self) {
        if let Some(child) = self.0.as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct Collected {
    /// Exit status returned by the process.
    pub status: std::process::ExitStatus,
    /// Contents written to stdout.
    pub stdout: Vec<u8>,
    /// Contents written to stderr.
    pub stderr: Vec<u8>,
}

/// Spawns a command with no stdin and collects stdout/stderr, killing it if
/// it outlives `deadline`.
pub async fn run_collect(
    program: impl AsRef<OsStr>,
    args: &[OsString],
    deadline: Duration,
) -> Result<Collected> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut guard = ChildDropGuard::new(cmd.spawn().context("failed to spawn process")?);
    let child = guard.child_mut().context("child process already taken from guard")?;
    let mut stdout = child.stdout.take().context("missing stdout pipe")?;
    let mut stderr = child.stderr.take().context("missing stderr pipe")?;

    let wait_future = async move {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let (read_out, read_err) =
            tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
        read_out.context("failed to read stdout")?;
        read_err.context("failed to read stderr")?;

        let status = guard
            .child_mut()
            .context("child process already taken from guard")?
            .wait()
            .await
            .context("failed to wait on process")?;
        guard.disarm();
        Ok(Collected {
            status,
            stdout: out,
            stderr: err,
        })
    };

    timeout(deadline, wait_future)
        .await
        .context("subprocess timed out")?
}

/// A long-lived child that answers one line of stdout per line written to
/// its stdin.
pub struct LineSession {
    /// Kills the child when the session is dropped.
    guard:  ChildDropGuard,
    /// Request pipe.
    stdin:  ChildStdin,
    /// Reply pipe, split into lines.
    stdout: Lines<BufReader<ChildStdout>>,
    /// Drains stderr so the child never blocks on it.
    stderr: JoinHandle<Vec<u8>>,
}

impl LineSession {
    /// Starts `program` with `args` and piped stdio.
    pub fn spawn(
        program: &OsStr,
        args: &[&OsStr],
        env: &[(&str, &str)],
    ) -> Result<Self, RuntimeError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| RuntimeError::Spawn {
            program: program.to_string_lossy().into_owned(),
            source,
        })?;

        let (Some(stdin), Some(stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            return Err(RuntimeError::Protocol("child pipes were not captured".into()));
        };

        let stderr = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        Ok(Self {
            guard: ChildDropGuard::new(child),
            stdin,
            stdout: BufReader::new(stdout).lines(),
            stderr,
        })
    }

    /// Sends one request line and waits up to `deadline` for the reply.
    ///
    /// Returns `Ok(None)` when the deadline passes first; the session should
    /// then be discarded, since the child is still busy with the request.
    pub async fn request(
        &mut self,
        line: &str,
        deadline: Duration,
    ) -> Result<Option<String>, RuntimeError> {
        self.request_until(line, deadline, |_| true).await
    }

    /// Like [`LineSession::request`], for children that answer with several
    /// lines. Every line is passed to `is_last` as it arrives; the first one
    /// it accepts is returned as the reply.
    pub async fn request_until<F>(
        &mut self,
        line: &str,
        deadline: Duration,
        mut is_last: F,
    ) -> Result<Option<String>, RuntimeError>
    where
        F: FnMut(&str) -> bool,
    {
        let exchange = async {
            self.stdin.write_all(line.as_bytes()).await?;
            self.stdin.write_all(b"\n").await?;
            self.stdin.flush().await?;
            while let Some(reply) = self.stdout.next_line().await? {
                if is_last(&reply) {
                    return Ok(Some(reply));
                }
            }
            Ok::<_, std::io::Error>(None)
        };

        match timeout(deadline, exchange).await {
            Err(_) => Ok(None),
            Ok(Ok(Some(reply))) => Ok(Some(reply)),
            Ok(Ok(None)) => Err(self.exited().await),
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::BrokenPipe => {
                Err(self.exited().await)
            }
            Ok(Err(err)) => Err(RuntimeError::Io(err)),
        }
    }

    /// Kills the child and returns whatever it printed to stderr.
    async fn exited(&mut self) -> RuntimeError {
        if let Some(child) = self.guard.child_mut() {
            let _ = child.start_kill();
        }
        let stderr = match timeout(Duration::from_millis(500), &mut self.stderr).await {
            Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            _ => String::new(),
        };
        RuntimeError::Exited { stderr }
    }
}

impl Drop for LineSession {
    fn drop(&mut self) {
        self.stderr.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collect_reports_timeout() {
        let Ok(sleep) = which::which("sleep") else {
            eprintln!("skipping: no `sleep` on PATH");
            return;
        };
        let err = run_collect(sleep, &["5".into()], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn line_session_round_trips_and_times_out() {
        let Ok(cat) = which::which("cat") else {
            eprintln!("skipping: no `cat` on PATH");
            return;
        };
        let mut session = LineSession::spawn(cat.as_os_str(), &[], &[]).unwrap();
        let reply = session
            .request("hello", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("hello"));

        let Ok(sleep) = which::which("sleep") else {
            return;
        };
        let mut silent =
            LineSession::spawn(sleep.as_os_str(), &[OsStr::new("5")], &[]).unwrap();
        let reply = silent
            .request("anything", Duration::from_millis(100))
            .await
            .unwrap();
        assert!(reply.is_none());
    }
}

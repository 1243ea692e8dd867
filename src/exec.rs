//! Bounded-time execution of external tools (git, cloc)
//!
//! Every invocation has a timeout. A failed or timed-out invocation is
//! retried once after a backoff; a tool that is not installed is not.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Why an external command did not produce usable output.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{tool} not found; please install it first")]
    NotFound { tool: String },

    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {}s", .timeout.as_secs())]
    Timeout { tool: String, timeout: Duration },

    #[error("{tool} exited with status {code}: {stderr}")]
    Failed {
        tool: String,
        code: i32,
        stderr: String,
    },
}

impl ProcessError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ProcessError::NotFound { .. })
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// An external command with its limits.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env_remove: Vec<String>,
    timeout: Duration,
    backoff: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env_remove: Vec::new(),
            timeout: Duration::from_secs(300),
            backoff: Duration::from_millis(500),
        }
    }

    /// A git command scoped to `repo`, unaffected by an inherited `GIT_DIR`.
    pub fn git(repo: &Path) -> Self {
        let mut cmd = Self::new("git");
        cmd.env_remove = vec!["GIT_DIR".to_string(), "GIT_WORK_TREE".to_string()];
        cmd.arg("-C")
            .arg(repo.to_string_lossy())
            .arg("-c")
            .arg("core.quotepath=off");
        cmd
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(&mut self, dir: &Path) -> &mut Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn backoff(&mut self, backoff: Duration) -> &mut Self {
        self.backoff = backoff;
        self
    }

    /// Run with one retry on transient failure.
    pub fn run(&self) -> Result<ProcessOutput, ProcessError> {
        match self.run_once() {
            Ok(out) => Ok(out),
            Err(e) if e.is_transient() => {
                warn!("{}; retrying in {}ms", e, self.backoff.as_millis());
                thread::sleep(self.backoff);
                self.run_once()
            }
            Err(e) => Err(e),
        }
    }

    /// Run exactly once.
    pub fn run_once(&self) -> Result<ProcessOutput, ProcessError> {
        debug!("Running {} {:?}", self.program, self.args);

        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        for key in &self.env_remove {
            command.env_remove(key);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ProcessError::NotFound {
                    tool: self.program.clone(),
                }
            } else {
                ProcessError::Spawn {
                    tool: self.program.clone(),
                    source,
                }
            }
        })?;

        let (status, output) = self.wait_with_timeout(child)?;
        if status.success() {
            Ok(output)
        } else {
            Err(ProcessError::Failed {
                tool: self.program.clone(),
                code: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Poll the child until it exits or the deadline passes. Pipes are
    /// drained on their own threads so a chatty child never blocks on a full
    /// pipe.
    fn wait_with_timeout(&self, mut child: Child) -> Result<(ExitStatus, ProcessOutput), ProcessError> {
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);
        let start = Instant::now();

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if start.elapsed() > self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ProcessError::Timeout {
                            tool: self.program.clone(),
                            timeout: self.timeout,
                        });
                    }
                    thread::sleep(Duration::from_millis(20));
                }
                Err(source) => {
                    let _ = child.kill();
                    return Err(ProcessError::Spawn {
                        tool: self.program.clone(),
                        source,
                    });
                }
            }
        };

        let collect = |h: Option<thread::JoinHandle<Vec<u8>>>| {
            h.and_then(|h| h.join().ok()).unwrap_or_default()
        };
        Ok((
            status,
            ProcessOutput {
                stdout: collect(stdout),
                stderr: collect(stderr),
            },
        ))
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

/// Whether `tool` can be executed at all.
pub fn is_tool_installed(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_is_not_transient() {
        let err = ToolCommand::new("definitely-not-a-real-tool-xyz")
            .run()
            .unwrap_err();
        assert!(matches!(err, ProcessError::NotFound { .. }));
        assert!(!err.is_transient());
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_stdout() {
        let out = ToolCommand::new("sh").args(["-c", "printf 'a\\nb'"]).run().unwrap();
        assert_eq!(out.stdout_lossy(), "a\nb");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_failure_after_retry() {
        let err = ToolCommand::new("sh")
            .args(["-c", "echo boom >&2; exit 3"])
            .backoff(Duration::from_millis(1))
            .run()
            .unwrap_err();
        match err {
            ProcessError::Failed { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_the_child() {
        let start = Instant::now();
        let err = ToolCommand::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100))
            .run_once()
            .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}

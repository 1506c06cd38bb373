//! Subprocess execution with streamed output.

use slipway_core::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

/// How many trailing stderr lines are carried into a failure error.
const STDERR_TAIL: usize = 8;

/// A subprocess invocation. Output is streamed into the log as it arrives;
/// the trailing stderr lines are kept for error reporting.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    envs: HashMap<String, String>,
    timeout: Option<Duration>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: HashMap::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run to completion, failing on a non-zero exit status.
    pub async fn run(&self) -> Result<()> {
        self.spawn_and_wait(false).await.map(|_| ())
    }

    /// Run to completion and return captured stdout, trimmed.
    pub async fn output(&self) -> Result<String> {
        self.spawn_and_wait(true).await
    }

    async fn spawn_and_wait(&self, capture: bool) -> Result<String> {
        debug!(program = %self.program, args = ?self.args, "spawning");
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }

        let mut child = command.spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let program = self.program.clone();
        let out_task = tokio::spawn(drain(stdout, program.clone(), capture));
        let err_task = tokio::spawn(drain(stderr, program, true));

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    child.kill().await.ok();
                    return Err(Error::StepTimeout {
                        seconds: limit.as_secs(),
                    });
                }
            },
            None => child.wait().await?,
        };

        let stdout_lines = out_task.await.unwrap_or_default();
        let stderr_lines = err_task.await.unwrap_or_default();

        if status.success() {
            Ok(stdout_lines.join("\n").trim().to_string())
        } else {
            let tail: Vec<&str> = stderr_lines
                .iter()
                .rev()
                .take(STDERR_TAIL)
                .rev()
                .map(String::as_str)
                .collect();
            Err(Error::StepFailed {
                exit_code: status.code().unwrap_or(-1),
                message: tail.join("\n"),
            })
        }
    }
}

/// Stream a pipe line by line into the log, optionally keeping the lines.
async fn drain<R>(pipe: Option<R>, program: String, keep: bool) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let Some(pipe) = pipe else {
        return kept;
    };
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(%program, "{line}");
        if keep {
            kept.push(line);
        }
    }
    kept
}

/// Resolve a script path against the workspace and check it exists.
pub fn resolve_script(workspace: &Path, script: &str) -> Result<PathBuf> {
    let path = workspace.join(script);
    if path.is_file() {
        Ok(path)
    } else {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("script not found: {}", path.display()),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh\n{body}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_successful_run() {
        let dir = tempfile::tempdir().unwrap();
        let s = script(dir.path(), "ok.sh", "exit 0");
        ShellCommand::new(s.to_str().unwrap()).run().await.unwrap();
    }

    #[tokio::test]
    async fn test_captured_output() {
        let dir = tempfile::tempdir().unwrap();
        let s = script(dir.path(), "say.sh", "echo 1.2.3");
        let out = ShellCommand::new(s.to_str().unwrap()).output().await.unwrap();
        assert_eq!(out, "1.2.3");
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let s = script(dir.path(), "fail.sh", "echo boom >&2\nexit 3");
        let err = ShellCommand::new(s.to_str().unwrap()).run().await.unwrap_err();
        match err {
            Error::StepFailed { exit_code, message } => {
                assert_eq!(exit_code, 3);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let s = script(dir.path(), "slow.sh", "sleep 5");
        let err = ShellCommand::new(s.to_str().unwrap())
            .timeout(Duration::from_millis(50))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StepTimeout { .. }));
    }

    #[tokio::test]
    async fn test_env_and_args_reach_child() {
        let dir = tempfile::tempdir().unwrap();
        let s = script(dir.path(), "env.sh", "echo \"$1 $MODE\"");
        let out = ShellCommand::new(s.to_str().unwrap())
            .arg("x86_64")
            .env("MODE", "container")
            .output()
            .await
            .unwrap();
        assert_eq!(out, "x86_64 container");
    }
}

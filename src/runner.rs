//! Process execution abstraction for testability.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;

/// Captured result of one MEGAcmd run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output, trimmed.
    pub stdout: String,
    /// Standard error, trimmed.
    pub stderr: String,
    /// Exit code. `-1` when the process was killed by a signal.
    pub code: i32,
}

impl CommandOutput {
    /// Builds a successful output with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Builds a failed output with the given code and stderr.
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            code,
        }
    }

    /// Returns true if the process exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.code == 0
    }
}

/// Abstraction over spawning the external binary.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` to completion and captures its output.
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// Default runner using `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    /// Creates a new `TokioCommandRunner` instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            code: output.status.code().unwrap_or(-1),
        })
    }
}

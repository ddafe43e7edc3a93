//! Tool execution interface and shared types.
//!
//! Defines [`ToolExecutor`], the seam between the job orchestrator and the
//! external inference tools, along with [`ToolSpec`], [`ToolInput`],
//! [`ToolOutput`], and [`RunnerError`].

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::types::Overrides;

/// How to launch one external tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Logical tool name used in logs (e.g. `"ocr_meta"`).
    pub name: String,
    /// Executable to spawn. Resolved against `PATH` when not absolute.
    pub program: String,
    /// Fixed arguments placed before the per-job arguments.
    pub args: Vec<String>,
    /// Maximum wall-clock time before the process is killed.
    pub timeout: Duration,
}

impl ToolSpec {
    /// Build a spec from a shell-style command line such as
    /// `python3 "/opt/ocr/ocr_meta.py" --model m.gguf`.
    ///
    /// The first word is the program, the rest become fixed arguments. No
    /// shell is involved at execution time.
    pub fn from_command_line(
        name: &str,
        command_line: &str,
        timeout: Duration,
    ) -> Result<Self, RunnerError> {
        let words =
            shell_words::split(command_line).map_err(|e| RunnerError::InvalidCommand {
                command: command_line.to_string(),
                reason: e.to_string(),
            })?;

        let mut words = words.into_iter();
        let program = words.next().ok_or_else(|| RunnerError::InvalidCommand {
            command: command_line.to_string(),
            reason: "command is empty".to_string(),
        })?;

        Ok(Self {
            name: name.to_string(),
            program,
            args: words.collect(),
            timeout,
        })
    }
}

/// Per-invocation input passed to a tool.
#[derive(Debug, Clone)]
pub struct ToolInput {
    /// Preprocessed image the tool reads, passed as `--image <path>`.
    pub image: PathBuf,
    /// Parameter overrides, translated to flags by [`super::overrides`].
    pub overrides: Overrides,
}

/// Successful tool result.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// The structured payload found in stdout.
    pub payload: Value,
    /// Complete stdout, including any log noise around the payload.
    pub stdout: String,
    /// Complete stderr.
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Errors that can occur while running an external tool.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The configured command line could not be parsed.
    #[error("Invalid tool command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },

    /// The executable could not be found.
    #[error("Tool executable not found: {0}")]
    NotFound(String),

    /// The tool exceeded its timeout and was killed.
    #[error("Tool timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The tool exited with a non-zero code.
    #[error("Tool exited with code {exit_code}")]
    ProcessExecution {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// The tool exited cleanly but stdout held no parseable JSON document.
    #[error("Tool exited successfully but produced no structured output")]
    NoStructuredOutput { stdout: String, stderr: String },

    /// Spawning or talking to the process failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Exit code of the failed process, when the failure was a non-zero exit.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ProcessExecution { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Captured `(stdout, stderr)` for failures that ran the process to
    /// completion.
    pub fn captured_output(&self) -> Option<(&str, &str)> {
        match self {
            Self::ProcessExecution { stdout, stderr, .. }
            | Self::NoStructuredOutput { stdout, stderr } => Some((stdout, stderr)),
            _ => None,
        }
    }
}

/// Anything that can run a [`ToolSpec`] and resolve it to structured output.
///
/// [`super::ProcessRunner`] spawns real subprocesses; tests substitute
/// in-memory fakes.
pub trait ToolExecutor: Send + Sync {
    /// Run `tool` against `input`.
    fn execute(
        &self,
        tool: &ToolSpec,
        input: ToolInput,
    ) -> impl std::future::Future<Output = Result<ToolOutput, RunnerError>> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

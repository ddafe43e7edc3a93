//! Subprocess-backed [`ToolExecutor`].

use tokio::process::Command;

use super::executor::{RunnerError, ToolExecutor, ToolInput, ToolOutput, ToolSpec};
use super::{overrides, payload, subprocess};

/// Runs tools as real OS subprocesses.
///
/// The argument vector is `program <spec args...> --image <path>
/// <override flags...>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ToolExecutor for ProcessRunner {
    async fn execute(&self, tool: &ToolSpec, input: ToolInput) -> Result<ToolOutput, RunnerError> {
        let override_args = overrides::to_args(&input.overrides);

        let mut cmd = Command::new(&tool.program);
        cmd.args(&tool.args)
            .arg("--image")
            .arg(&input.image)
            .args(&override_args);

        tracing::debug!(
            tool = %tool.name,
            program = %tool.program,
            image = %input.image.display(),
            overrides = ?override_args,
            "Launching tool"
        );

        let raw = subprocess::run_command(&mut cmd, tool.timeout).await?;

        if raw.exit_code != 0 {
            tracing::warn!(
                tool = %tool.name,
                exit_code = raw.exit_code,
                duration_ms = raw.duration_ms,
                "Tool exited with non-zero status"
            );
            return Err(RunnerError::ProcessExecution {
                exit_code: raw.exit_code,
                stdout: raw.stdout,
                stderr: raw.stderr,
            });
        }

        match payload::extract_json(&raw.stdout) {
            Some(payload) => {
                tracing::debug!(tool = %tool.name, duration_ms = raw.duration_ms, "Tool succeeded");
                Ok(ToolOutput {
                    payload,
                    stdout: raw.stdout,
                    stderr: raw.stderr,
                    duration_ms: raw.duration_ms,
                })
            }
            None => {
                tracing::warn!(tool = %tool.name, "Tool produced no structured output");
                Err(RunnerError::NoStructuredOutput {
                    stdout: raw.stdout,
                    stderr: raw.stderr,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

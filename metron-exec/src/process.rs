//! Local process backends (management query and shell script)

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as OsCommand;
use tracing::debug;

use crate::backend::{ExecOutcome, ExecutorBackend};
use crate::error::{ExecError, ExecResult};
use metron_config::ExecutorKind;

/// Backend that spawns a local OS process and captures its streams.
///
/// Covers both the Windows management-query executor (`wmic`, command
/// string split into query arguments) and the PowerShell executor
/// (command string passed as one `-Command` argument). The program is
/// configurable so tests can run against ordinary shell utilities.
#[derive(Debug, Clone)]
pub struct LocalProcessBackend {
    kind: ExecutorKind,
    program: String,
    base_args: Vec<String>,
    /// Split the command string on whitespace into separate arguments
    split_command: bool,
}

impl LocalProcessBackend {
    /// Management-query backend: `wmic <query args>`
    pub fn wmi_query() -> Self {
        Self {
            kind: ExecutorKind::WmiQuery,
            program: "wmic".to_string(),
            base_args: Vec::new(),
            split_command: true,
        }
    }

    /// Shell-script backend: `powershell -NoProfile -NonInteractive -Command <script>`
    pub fn powershell() -> Self {
        Self {
            kind: ExecutorKind::PowerShell,
            program: "powershell".to_string(),
            base_args: vec![
                "-NoProfile".to_string(),
                "-NonInteractive".to_string(),
                "-Command".to_string(),
            ],
            split_command: false,
        }
    }

    /// Backend over an arbitrary program, used by tests
    pub fn custom(
        kind: ExecutorKind,
        program: impl Into<String>,
        base_args: Vec<String>,
        split_command: bool,
    ) -> Self {
        Self {
            kind,
            program: program.into(),
            base_args,
            split_command,
        }
    }
}

#[async_trait]
impl ExecutorBackend for LocalProcessBackend {
    async fn execute(&self, command: &str, timeout: Duration) -> ExecResult<ExecOutcome> {
        let mut os_command = OsCommand::new(&self.program);
        os_command.args(&self.base_args);
        if self.split_command {
            os_command.args(command.split_whitespace());
        } else {
            os_command.arg(command);
        }
        os_command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout must take the child with it
            .kill_on_drop(true);

        debug!(program = %self.program, %command, "spawning local process");

        let child = os_command.spawn().map_err(|e| ExecError::Spawn {
            program: self.program.clone(),
            message: e.to_string(),
        })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecError::Timeout {
                seconds: timeout.as_secs(),
            })?
            .map_err(|e| ExecError::Transport(e.to_string()))?;

        Ok(ExecOutcome {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_failed: !output.status.success(),
        })
    }

    fn kind(&self) -> ExecutorKind {
        self.kind
    }
}

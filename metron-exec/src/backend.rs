//! Backend and runner contracts

use async_trait::async_trait;
use std::time::Duration;

use crate::driver::CommandResult;
use crate::error::ExecResult;
use metron_config::{Command, ExecutorKind};

/// Raw result of one command execution on a backend
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    /// Process exit / script completion indicated failure
    pub exit_failed: bool,
}

/// One transport backend.
///
/// Backends receive their connection configuration at construction,
/// once per capture run; `execute` takes only the resolved command
/// string and the hard timeout. Implementations must return within
/// the timeout and terminate whatever they started when it expires.
#[async_trait]
pub trait ExecutorBackend: Send + Sync {
    async fn execute(&self, command: &str, timeout: Duration) -> ExecResult<ExecOutcome>;

    fn kind(&self) -> ExecutorKind;

    /// Tear down any session state held by the backend. Must be safe
    /// to call on every exit path, including after failures.
    async fn close(&self) {}
}

/// Runs commands against one server profile.
///
/// Implemented by [`crate::CommandDriver`]; the orchestrator depends on
/// this trait so tests can substitute scripted transports.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one command. Always yields a result envelope, never an
    /// error: transport failures are embedded in the envelope.
    async fn run(&self, command: &Command) -> CommandResult;

    /// Tear down sessions opened during this run.
    async fn close(&self) {}
}

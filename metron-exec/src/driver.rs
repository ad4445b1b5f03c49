//! Command driver
//!
//! Resolves a command template against the profile's connection fields
//! and parameters, dispatches to the backend matching the command's
//! executor kind, and wraps the run in a [`CommandResult`] envelope.
//! The driver never mutates its inputs and always hands the caller an
//! envelope, even on transport failure.

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::backend::{CommandRunner, ExecOutcome, ExecutorBackend};
use crate::error::{ExecError, ExecResult};
use crate::process::LocalProcessBackend;
use crate::ssh::SshBackend;
use metron_config::{Command, ExecutorKind, ServerProfile};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_.-]+)\}").expect("placeholder regex is valid"));

const MASK: &str = "***";

/// Uniform envelope for one command execution
#[derive(Debug)]
pub struct CommandResult {
    pub command_name: String,
    /// Resolved command string with secrets masked
    pub resolved: String,
    pub outcome: ExecResult<ExecOutcome>,
    pub elapsed: Duration,
    /// Human-readable diagnostic trace of the run
    pub log: String,
}

impl CommandResult {
    /// Apply the per-command failure policy.
    ///
    /// A command fails on a transport/configuration error or a failed
    /// exit; non-empty stderr also fails it unless the command's
    /// `ignore_stderr` flag is set (many remote tools print warnings
    /// on stderr with a clean exit code).
    pub fn failed(&self, command: &Command) -> bool {
        match &self.outcome {
            Err(_) => true,
            Ok(outcome) => {
                outcome.exit_failed || (!command.ignore_stderr && !outcome.stderr.trim().is_empty())
            }
        }
    }
}

/// Per-run command driver over one server profile
pub struct CommandDriver {
    command_timeout: Duration,
    /// Placeholder resolution fields: profile params, then connection
    /// fields (connection fields win on collision)
    fields: HashMap<String, String>,
    secrets: Vec<String>,
    wmi: LocalProcessBackend,
    shell: LocalProcessBackend,
    ssh: SshBackend,
    #[cfg(feature = "javascript")]
    js: crate::script::JsBackend,
}

impl CommandDriver {
    /// Build a driver for one capture run of the given profile
    pub fn new(profile: &ServerProfile) -> Self {
        let mut fields = profile.params.clone();
        fields.insert("host".to_string(), profile.host.clone());
        fields.insert("port".to_string(), profile.port.to_string());
        fields.insert("username".to_string(), profile.credentials.username.clone());
        if let Some(password) = &profile.credentials.password {
            fields.insert("password".to_string(), password.clone());
        }

        let mut secrets = Vec::new();
        if let Some(password) = &profile.credentials.password {
            secrets.push(password.clone());
        }
        if let Some(passphrase) = &profile.credentials.key_passphrase {
            secrets.push(passphrase.clone());
        }

        Self {
            command_timeout: profile.command_timeout,
            secrets,
            wmi: LocalProcessBackend::wmi_query(),
            shell: LocalProcessBackend::powershell(),
            ssh: SshBackend::new(profile),
            #[cfg(feature = "javascript")]
            js: crate::script::JsBackend::new(fields.clone()),
            fields,
        }
    }

    /// Resolve `{placeholder}` fields in a command template.
    ///
    /// An unresolved placeholder fails fast as a configuration error,
    /// before any transport attempt.
    fn resolve(&self, template: &str, command_name: &str) -> ExecResult<String> {
        let mut resolved = String::with_capacity(template.len());
        let mut last_end = 0;
        for caps in PLACEHOLDER.captures_iter(template) {
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let value = self
                .fields
                .get(name)
                .ok_or_else(|| ExecError::UnresolvedPlaceholder {
                    name: name.to_string(),
                    command: command_name.to_string(),
                })?;
            resolved.push_str(&template[last_end..whole.0]);
            resolved.push_str(value);
            last_end = whole.1;
        }
        resolved.push_str(&template[last_end..]);
        Ok(resolved)
    }

    /// Replace secret values with a mask for logging
    fn mask(&self, text: &str) -> String {
        let mut masked = text.to_string();
        for secret in &self.secrets {
            masked = masked.replace(secret, MASK);
        }
        masked
    }

    async fn dispatch(&self, executor: ExecutorKind, resolved: &str) -> ExecResult<ExecOutcome> {
        match executor {
            ExecutorKind::WmiQuery => self.wmi.execute(resolved, self.command_timeout).await,
            ExecutorKind::PowerShell => self.shell.execute(resolved, self.command_timeout).await,
            ExecutorKind::RemoteShell => self.ssh.execute(resolved, self.command_timeout).await,
            #[cfg(feature = "javascript")]
            ExecutorKind::JavaScript => self.js.execute(resolved, self.command_timeout).await,
            #[cfg(not(feature = "javascript"))]
            ExecutorKind::JavaScript => Err(ExecError::Script(
                "javascript executor support is not compiled in".to_string(),
            )),
        }
    }
}

#[async_trait]
impl CommandRunner for CommandDriver {
    async fn run(&self, command: &Command) -> CommandResult {
        let started = Instant::now();
        let mut log = format!(
            "[{}] {} ({})\n",
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            command.name,
            command.executor.as_str()
        );

        let resolved = match self.resolve(&command.template, &command.name) {
            Ok(resolved) => resolved,
            Err(error) => {
                let _ = writeln!(log, "configuration error: {}", error);
                return CommandResult {
                    command_name: command.name.clone(),
                    resolved: self.mask(&command.template),
                    outcome: Err(error),
                    elapsed: started.elapsed(),
                    log,
                };
            }
        };

        let display = self.mask(&resolved);
        let _ = writeln!(log, "resolved: {}", display);
        debug!(command = %command.name, executor = command.executor.as_str(), "running command");

        let outcome = self.dispatch(command.executor, &resolved).await;
        let elapsed = started.elapsed();

        match &outcome {
            Ok(result) => {
                let _ = writeln!(
                    log,
                    "completed in {} ms (exit {}, stderr {} bytes)",
                    elapsed.as_millis(),
                    if result.exit_failed { "failed" } else { "ok" },
                    result.stderr.len()
                );
            }
            Err(error) => {
                let _ = writeln!(log, "failed after {} ms: {}", elapsed.as_millis(), error);
            }
        }

        CommandResult {
            command_name: command.name.clone(),
            resolved: display,
            outcome,
            elapsed,
            log,
        }
    }

    async fn close(&self) {
        self.ssh.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metron_config::{AuthMethod, Credentials, HostKeyPolicy};

    fn profile() -> ServerProfile {
        ServerProfile {
            name: "localhost-linux".to_string(),
            host: "localhost".to_string(),
            port: 22,
            credentials: Credentials {
                username: "perf".to_string(),
                password: Some("s3cret".to_string()),
                ..Default::default()
            },
            preferred_auth: vec![AuthMethod::Password],
            host_key_policy: HostKeyPolicy::AcceptAny,
            command_timeout: Duration::from_secs(5),
            commands: vec!["MemoryCheck".to_string()],
            params: [("mount".to_string(), "/data".to_string())].into(),
        }
    }

    fn command(executor: ExecutorKind, template: &str) -> Command {
        Command {
            name: "MemoryCheck".to_string(),
            executor,
            template: template.to_string(),
            ignore_stderr: false,
            comment: String::new(),
        }
    }

    #[test]
    fn test_placeholder_resolution() {
        let driver = CommandDriver::new(&profile());
        let resolved = driver
            .resolve("df -h {mount} # {username}@{host}:{port}", "MemoryCheck")
            .unwrap();
        assert_eq!(resolved, "df -h /data # perf@localhost:22");
    }

    #[test]
    fn test_unresolved_placeholder_is_configuration_error() {
        let driver = CommandDriver::new(&profile());
        let error = driver
            .resolve("df -h {missing_field}", "MemoryCheck")
            .unwrap_err();
        assert!(error.is_configuration());
        assert!(error.to_string().contains("missing_field"));
    }

    #[test]
    fn test_secret_masking() {
        let driver = CommandDriver::new(&profile());
        let masked = driver.mask("login perf s3cret");
        assert_eq!(masked, "login perf ***");
    }

    #[tokio::test]
    async fn test_unresolved_placeholder_fails_fast() {
        let driver = CommandDriver::new(&profile());
        let result = driver
            .run(&command(ExecutorKind::RemoteShell, "du {nowhere}"))
            .await;

        assert!(matches!(
            result.outcome,
            Err(ExecError::UnresolvedPlaceholder { .. })
        ));
        assert!(result.log.contains("configuration error"));
        // Fail-fast: no transport attempt was paid for
        assert!(result.elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_stderr_policy_is_per_command() {
        let outcome = ExecOutcome {
            stdout: "ok".to_string(),
            stderr: "warning: deprecated flag\n".to_string(),
            exit_failed: false,
        };
        let result = CommandResult {
            command_name: "MemoryCheck".to_string(),
            resolved: "free -g".to_string(),
            outcome: Ok(outcome),
            elapsed: Duration::from_millis(10),
            log: String::new(),
        };

        let strict = command(ExecutorKind::RemoteShell, "free -g");
        assert!(result.failed(&strict));

        let mut lenient = strict;
        lenient.ignore_stderr = true;
        assert!(!result.failed(&lenient));
    }

    #[cfg(feature = "javascript")]
    #[tokio::test]
    async fn test_javascript_command_end_to_end() {
        let driver = CommandDriver::new(&profile());
        let result = driver
            .run(&command(
                ExecutorKind::JavaScript,
                "print('free ' + host + ' ' + mount);",
            ))
            .await;

        let outcome = result.outcome.unwrap();
        assert_eq!(outcome.stdout, "free localhost /data");
        assert!(result.log.contains("resolved:"));
        assert!(result.log.contains("completed in"));
        driver.close().await;
    }
}

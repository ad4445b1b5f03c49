//! Capture orchestrator
//!
//! Drives one profile's command list through a [`CommandRunner`],
//! strictly in declared order on the calling task: parsers and reused
//! remote sessions may depend on prior command side effects, so there
//! is no fan-out within a profile. One command's failure never halts
//! the rest; the orchestrator always attempts the full list and
//! returns partial results, because a single broken metric should not
//! blank out everything else collected from a live system under test.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::result::{CaptureError, CommandState, CompositeResult, ScriptResponse, SubResult};
use metron_config::{ConfigStore, ServerProfile};
use metron_exec::{CommandDriver, CommandRunner};
use metron_parse::MetricScope;

/// The capture engine: safe to share behind `Arc` and call from many
/// sampler tasks concurrently. Each call owns its driver and transport
/// sessions; the store is read-only.
pub struct CaptureEngine {
    store: Arc<dyn ConfigStore>,
}

impl CaptureEngine {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Run a full capture for the named profile.
    ///
    /// `overrides` substitutes connection fields and template
    /// parameters for this call only; stored configuration is never
    /// touched. Per-command failures land in the sub-result list; the
    /// error path is reserved for a missing profile or a store read
    /// failure.
    pub async fn run_profile_capture(
        &self,
        profile_name: &str,
        overrides: &HashMap<String, String>,
    ) -> Result<CompositeResult, CaptureError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, profile = profile_name, "starting capture run");

        let stored = self
            .store
            .find_server_profile(profile_name)?
            .ok_or_else(|| CaptureError::ProfileNotFound(profile_name.to_string()))?;
        let profile = stored.with_overrides(overrides);

        let driver = CommandDriver::new(&profile);
        let result = self.capture_with_runner(&profile, &driver).await;

        // Session teardown on every exit path, including a fatal
        // store failure partway through the command list
        driver.close().await;

        match &result {
            Ok(composite) => info!(
                %run_id,
                overall_pass = composite.overall_pass,
                metrics = composite.metrics.len(),
                "capture run finished"
            ),
            Err(error) => warn!(%run_id, %error, "capture run aborted"),
        }
        result
    }

    /// Run the profile's commands through an explicit runner.
    ///
    /// The runner's sessions belong to the caller, which must close
    /// them; [`run_profile_capture`](Self::run_profile_capture) wraps
    /// this with a driver it owns and tears down.
    pub async fn capture_with_runner(
        &self,
        profile: &ServerProfile,
        runner: &dyn CommandRunner,
    ) -> Result<CompositeResult, CaptureError> {
        let scope = MetricScope::new(profile.host_label());

        let mut sub_results = Vec::with_capacity(profile.commands.len());
        let mut metrics = Vec::new();
        for command_name in &profile.commands {
            let (state, response) = self
                .capture_command(command_name, runner, &scope)
                .await?;
            debug!(command = %command_name, ?state, "command finished");

            metrics.extend(response.parsed_metrics.iter().cloned());
            sub_results.push(SubResult {
                label: command_name.clone(),
                passed: state.passed(),
                message: response.command_log,
            });
        }

        let overall_pass = sub_results.iter().all(|sub| sub.passed);
        Ok(CompositeResult {
            overall_pass,
            sub_results,
            metrics,
        })
    }

    /// Run one command to a terminal state.
    ///
    /// Errors out only on a configuration-store read failure; every
    /// other failure is captured in the returned response.
    async fn capture_command(
        &self,
        command_name: &str,
        runner: &dyn CommandRunner,
        scope: &MetricScope,
    ) -> Result<(CommandState, ScriptResponse), CaptureError> {
        debug!(command = %command_name, state = ?CommandState::Pending, "resolving command");

        let Some(command) = self.store.find_command(command_name)? else {
            return Ok(config_failure(format!(
                "configuration error: command '{}' not found",
                command_name
            )));
        };
        let Some(parser) = self.store.find_response_parser(command_name)? else {
            return Ok(config_failure(format!(
                "configuration error: no response parser bound to command '{}'",
                command_name
            )));
        };

        debug!(command = %command_name, state = ?CommandState::Executing, "dispatching");
        let result = runner.run(&command).await;
        let mut log = result.log.clone();

        if result.failed(&command) {
            if let Ok(outcome) = &result.outcome {
                if !outcome.stderr.is_empty() {
                    let _ = writeln!(log, "stderr: {}", outcome.stderr.trim_end());
                }
            }
            return Ok((
                CommandState::ExecFailed,
                ScriptResponse {
                    parsed_metrics: Vec::new(),
                    command_log: log,
                    command_failure: true,
                },
            ));
        }

        let raw = match &result.outcome {
            Ok(outcome) => outcome.stdout.as_str(),
            Err(_) => "",
        };

        match metron_parse::extract(&parser, raw, scope) {
            Ok(parsed) => {
                let _ = writeln!(log, "extracted {} metric(s)", parsed.len());
                for metric in &parsed {
                    let _ = writeln!(log, "  {}", metric);
                }
                Ok((
                    CommandState::Extracted,
                    ScriptResponse {
                        parsed_metrics: parsed,
                        command_log: log,
                        command_failure: false,
                    },
                ))
            }
            Err(error) => {
                // Keep the unmatched text for operator diagnosis
                let _ = writeln!(log, "extraction failed: {}", error);
                let _ = writeln!(log, "raw output:\n{}", raw);
                Ok((
                    CommandState::ParseFailed,
                    ScriptResponse {
                        parsed_metrics: Vec::new(),
                        command_log: log,
                        command_failure: true,
                    },
                ))
            }
        }
    }
}

fn config_failure(message: String) -> (CommandState, ScriptResponse) {
    (
        CommandState::ExecFailed,
        ScriptResponse {
            parsed_metrics: Vec::new(),
            command_log: message,
            command_failure: true,
        },
    )
}

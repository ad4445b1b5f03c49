//! Capture result types

use thiserror::Error;

use metron_config::ConfigError;
use metron_parse::ParsedMetric;

/// Per-command state within one profile run.
///
/// `Pending → Executing → {Extracted | ExecFailed | ParseFailed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Pending,
    Executing,
    /// Ran and extraction produced metrics
    Extracted,
    /// Transport, driver, or configuration error; no metrics
    ExecFailed,
    /// Ran, but extraction produced nothing useful
    ParseFailed,
}

impl CommandState {
    /// Only extraction success counts as a passing command
    pub fn passed(&self) -> bool {
        matches!(self, CommandState::Extracted)
    }
}

/// Outcome of one command execution: extracted metrics, the diagnostic
/// trace of the run, and the failure flag. Assembled once per command,
/// never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct ScriptResponse {
    pub parsed_metrics: Vec<ParsedMetric>,
    pub command_log: String,
    pub command_failure: bool,
}

/// Pass/fail/diagnostic outcome of one command within a capture run
#[derive(Debug, Clone)]
pub struct SubResult {
    /// Command name
    pub label: String,
    pub passed: bool,
    /// Human-readable diagnostic; wording is advisory, not a contract
    pub message: String,
}

/// Full capture-run outcome returned to the calling harness.
///
/// The sub-result count and order match the profile's declared command
/// list regardless of individual outcomes; metrics are flattened in
/// command order.
#[derive(Debug, Clone)]
pub struct CompositeResult {
    pub overall_pass: bool,
    pub sub_results: Vec<SubResult>,
    pub metrics: Vec<ParsedMetric>,
}

/// Suite-fatal capture errors.
///
/// Per-command failures are never fatal; they are embedded in the
/// sub-result list. Only a missing profile or a configuration-store
/// read failure aborts a capture as a single top-level failure.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Server profile '{0}' not found")]
    ProfileNotFound(String),

    #[error("Configuration store failure: {0}")]
    Store(#[from] ConfigError),
}

//! Capture configuration records
//!
//! Server profiles, commands, and response parsers as read by the
//! capture orchestrator. Records are plain serde data: the store owns
//! them, the engine borrows immutable snapshots for one capture run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_port_range, validate_positive, validate_required_string, Validatable};

/// Serde helper module for Duration serialization as seconds
pub mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(seconds))
    }
}

/// Transport/backend class used to run a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    /// Local Windows management query (wmic)
    WmiQuery,
    /// Local PowerShell script
    PowerShell,
    /// Remote shell over SSH
    RemoteShell,
    /// Inline script in the embedded JavaScript sandbox
    JavaScript,
}

impl ExecutorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorKind::WmiQuery => "wmi-query",
            ExecutorKind::PowerShell => "powershell",
            ExecutorKind::RemoteShell => "remote-shell",
            ExecutorKind::JavaScript => "javascript",
        }
    }
}

/// Authentication method for the remote shell backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    /// Username/password authentication
    Password,
    /// Key-pair authentication, optionally passphrase-protected
    PublicKey,
    /// Enterprise single-sign-on; credentials are held by the
    /// environment, the session authenticates with "none"
    SingleSignOn,
}

/// Host-key trust policy for the remote shell backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Accept any host key (test rigs, loopback targets)
    AcceptAny,
    /// Check the presented key against an OpenSSH known-hosts file
    KnownHosts { path: PathBuf },
}

impl Default for HostKeyPolicy {
    fn default() -> Self {
        HostKeyPolicy::AcceptAny
    }
}

/// Connection credentials for a server profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
    pub key_path: Option<PathBuf>,
    pub key_passphrase: Option<String>,
}

/// A named target host with its connection configuration and ordered
/// command list. Immutable during a single capture run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerProfile {
    pub name: String,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub credentials: Credentials,
    /// Authentication methods tried in order by the remote shell backend
    #[serde(default = "default_preferred_auth")]
    pub preferred_auth: Vec<AuthMethod>,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
    /// Hard per-command execution timeout
    #[serde(with = "serde_duration", default = "default_command_timeout")]
    pub command_timeout: Duration,
    /// Ordered list of command names resolved through the store
    pub commands: Vec<String>,
    /// Free-form parameters available to command templates
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_preferred_auth() -> Vec<AuthMethod> {
    vec![AuthMethod::PublicKey, AuthMethod::Password]
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(30)
}

impl ServerProfile {
    /// Produce a copy with caller-supplied overrides applied.
    ///
    /// The keys `host`, `port`, `username` and `password` substitute the
    /// matching connection fields; every other key lands in the template
    /// parameter map. The stored record is never mutated.
    pub fn with_overrides(&self, overrides: &HashMap<String, String>) -> ServerProfile {
        let mut profile = self.clone();
        for (key, value) in overrides {
            match key.as_str() {
                "host" => profile.host = value.clone(),
                "port" => match value.parse() {
                    Ok(port) => profile.port = port,
                    Err(_) => {
                        tracing::warn!(
                            profile = %self.name,
                            value = %value,
                            "ignoring unparseable port override, keeping stored port"
                        );
                    }
                },
                "username" => profile.credentials.username = value.clone(),
                "password" => profile.credentials.password = Some(value.clone()),
                _ => {
                    profile.params.insert(key.clone(), value.clone());
                }
            }
        }
        profile
    }

    /// Label used to disambiguate metric names across hosts.
    ///
    /// Dots and colons would read as separators in downstream metric
    /// stores, so they are flattened to underscores.
    pub fn host_label(&self) -> String {
        self.host.replace(['.', ':'], "_")
    }
}

impl Validatable for ServerProfile {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;
        validate_required_string(&self.host, "host", self.domain_name())?;
        validate_port_range(self.port, "port", self.domain_name())?;
        validate_positive(
            self.command_timeout.as_secs(),
            "command_timeout",
            self.domain_name(),
        )?;
        if self.commands.is_empty() {
            return Err(self.validation_error("commands cannot be empty"));
        }
        if self.preferred_auth.is_empty() {
            return Err(self.validation_error("preferred_auth cannot be empty"));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "server-profile"
    }
}

/// A reusable command definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    pub executor: ExecutorKind,
    /// Command template; `{placeholder}` fields are resolved against
    /// profile fields, profile params and caller overrides
    pub template: String,
    /// When set, non-empty stderr does not fail the command
    #[serde(default)]
    pub ignore_stderr: bool,
    #[serde(default)]
    pub comment: String,
}

impl Validatable for Command {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;
        validate_required_string(&self.template, "template", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "command"
    }
}

/// Extraction rule applied to a command's raw output.
///
/// The rule form is a property of the parser definition, so the engine
/// selects its extraction strategy from configuration alone instead of
/// sniffing the output shape at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExtractionRule {
    /// Regex with capture groups; group `value` (or group 1) supplies
    /// the numeric value, an optional group `name` a per-match suffix
    Pattern { pattern: String },
    /// Dot-separated path into a JSON payload; array indices allowed
    JsonPath { path: String },
}

/// Parsing rule bound to one command name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseParser {
    /// Name of the command whose output this parser extracts
    pub command_name: String,
    /// Metric transaction-type label, e.g. `MEMORY` or `CPU_UTIL`
    pub metric_category: String,
    /// Metric-name template; `{host}` is replaced with the profile's
    /// host label so identical rules on several hosts do not collide
    pub metric_name: String,
    pub rule: ExtractionRule,
    #[serde(default)]
    pub comment: String,
    /// Sample raw response used to regression-test the rule when edited
    #[serde(default)]
    pub sample_response: String,
}

impl Validatable for ResponseParser {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.command_name, "command_name", self.domain_name())?;
        validate_required_string(&self.metric_category, "metric_category", self.domain_name())?;
        validate_required_string(&self.metric_name, "metric_name", self.domain_name())?;
        match &self.rule {
            ExtractionRule::Pattern { pattern } => {
                validate_required_string(pattern, "pattern", self.domain_name())?;
            }
            ExtractionRule::JsonPath { path } => {
                validate_required_string(path, "path", self.domain_name())?;
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "response-parser"
    }
}

//! Remote shell backend over SSH
//!
//! One session is established lazily on the first remote command of a
//! capture run and reused for the rest of the run's commands, so a
//! profile with several remote commands pays the handshake once. A
//! timed-out or broken channel invalidates the cached session; the
//! next command reconnects instead of reusing a wedged session.

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key;
use russh_keys::load_secret_key;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::{ExecOutcome, ExecutorBackend};
use crate::error::{ExecError, ExecResult};
use metron_config::{AuthMethod, Credentials, ExecutorKind, HostKeyPolicy, ServerProfile};

/// Host-key verification according to the profile's trust policy
struct TrustHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

#[async_trait]
impl client::Handler for TrustHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.policy {
            HostKeyPolicy::AcceptAny => Ok(true),
            HostKeyPolicy::KnownHosts { path } => {
                let known = russh_keys::check_known_hosts_path(
                    &self.host,
                    self.port,
                    server_public_key,
                    path,
                )?;
                if !known {
                    warn!(host = %self.host, "server key not present in known-hosts file");
                }
                Ok(known)
            }
        }
    }
}

/// SSH backend for one capture run.
///
/// Owns at most one live session; never shared across concurrent
/// capture runs. [`ExecutorBackend::close`] must be called (and is, by
/// the driver) on every exit path.
pub struct SshBackend {
    host: String,
    port: u16,
    credentials: Credentials,
    preferred_auth: Vec<AuthMethod>,
    host_key_policy: HostKeyPolicy,
    session: Mutex<Option<Handle<TrustHandler>>>,
}

impl SshBackend {
    pub fn new(profile: &ServerProfile) -> Self {
        Self {
            host: profile.host.clone(),
            port: profile.port,
            credentials: profile.credentials.clone(),
            preferred_auth: profile.preferred_auth.clone(),
            host_key_policy: profile.host_key_policy.clone(),
            session: Mutex::new(None),
        }
    }

    async fn connect(&self) -> ExecResult<Handle<TrustHandler>> {
        let config = Arc::new(client::Config::default());
        let handler = TrustHandler {
            host: self.host.clone(),
            port: self.port,
            policy: self.host_key_policy.clone(),
        };

        debug!(host = %self.host, port = self.port, "opening SSH session");
        let mut session = client::connect(config, (self.host.as_str(), self.port), handler)
            .await
            .map_err(|e| ExecError::Connect {
                host: self.host.clone(),
                port: self.port,
                message: e.to_string(),
            })?;

        let username = &self.credentials.username;
        let mut attempted = Vec::new();
        for method in &self.preferred_auth {
            let authenticated = match method {
                AuthMethod::Password => match &self.credentials.password {
                    Some(password) => {
                        attempted.push("password");
                        session
                            .authenticate_password(username, password)
                            .await
                            .map_err(|e| self.auth_error(e.to_string()))?
                    }
                    // No password configured; fall through to the next method
                    None => false,
                },
                AuthMethod::PublicKey => match &self.credentials.key_path {
                    Some(key_path) => {
                        attempted.push("publickey");
                        let key_pair = load_secret_key(
                            key_path,
                            self.credentials.key_passphrase.as_deref(),
                        )
                        .map_err(|e| self.auth_error(format!("cannot load key: {}", e)))?;
                        session
                            .authenticate_publickey(username, Arc::new(key_pair))
                            .await
                            .map_err(|e| self.auth_error(e.to_string()))?
                    }
                    None => false,
                },
                AuthMethod::SingleSignOn => {
                    // Credentials are held by the environment; the
                    // session authenticates with "none"
                    attempted.push("single-sign-on");
                    session
                        .authenticate_none(username)
                        .await
                        .map_err(|e| self.auth_error(e.to_string()))?
                }
            };

            if authenticated {
                debug!(host = %self.host, user = %username, ?method, "authenticated");
                return Ok(session);
            }
        }

        Err(self.auth_error(format!(
            "no configured authentication method accepted (tried: {})",
            attempted.join(", ")
        )))
    }

    fn auth_error(&self, message: String) -> ExecError {
        ExecError::Auth {
            username: self.credentials.username.clone(),
            host: self.host.clone(),
            message,
        }
    }

    async fn run_command(
        &self,
        session: &Handle<TrustHandler>,
        command: &str,
    ) -> Result<ExecOutcome, russh::Error> {
        let mut channel = session.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, .. } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                _ => {}
            }
        }

        Ok(channel_outcome(stdout, stderr, exit_status))
    }
}

/// A channel that closes without reporting an exit status was cut off
/// mid-command; its output may be truncated and must not pass as a
/// clean run.
fn channel_outcome(stdout: Vec<u8>, stderr: Vec<u8>, exit_status: Option<u32>) -> ExecOutcome {
    ExecOutcome {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_failed: exit_status.map_or(true, |status| status != 0),
    }
}

#[async_trait]
impl ExecutorBackend for SshBackend {
    async fn execute(&self, command: &str, timeout: Duration) -> ExecResult<ExecOutcome> {
        let mut guard = self.session.lock().await;

        let attempt = async {
            if guard.is_none() {
                *guard = Some(self.connect().await?);
            }
            let session = guard
                .as_ref()
                .ok_or_else(|| ExecError::Transport("session unavailable".to_string()))?;
            self.run_command(session, command)
                .await
                .map_err(|e| ExecError::Transport(e.to_string()))
        };

        let attempted = tokio::time::timeout(timeout, attempt).await;
        match attempted {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(error)) => {
                // Dropping the handle tears down the connection; the
                // next command of this run reconnects
                *guard = None;
                Err(error)
            }
            Err(_) => {
                *guard = None;
                Err(ExecError::Timeout {
                    seconds: timeout.as_secs(),
                })
            }
        }
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::RemoteShell
    }

    async fn close(&self) {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.take() {
            debug!(host = %self.host, "closing SSH session");
            let _ = session
                .disconnect(Disconnect::ByApplication, "capture complete", "en")
                .await;
        }
    }
}

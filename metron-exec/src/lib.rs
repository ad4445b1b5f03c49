//! Executor backends and command driver for the Metron capture engine
//!
//! Each transport is one [`ExecutorBackend`] implementation behind a
//! shared contract: a command string in, raw stdout/stderr text and a
//! failure flag out, bounded by a hard timeout. The [`CommandDriver`]
//! resolves command templates, dispatches to the backend matching the
//! command's executor kind, and wraps every run in a uniform
//! [`CommandResult`] envelope that is returned even on transport
//! failure.

pub mod backend;
pub mod driver;
pub mod error;
pub mod process;
pub mod ssh;

#[cfg(feature = "javascript")]
pub mod script;

pub use backend::{CommandRunner, ExecOutcome, ExecutorBackend};
pub use driver::{CommandDriver, CommandResult};
pub use error::{ExecError, ExecResult};
pub use process::LocalProcessBackend;
pub use ssh::SshBackend;

#[cfg(feature = "javascript")]
pub use script::JsBackend;

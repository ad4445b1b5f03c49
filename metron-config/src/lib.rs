//! Configuration records and store for the Metron capture engine
//!
//! This crate owns the record types read at capture time (server
//! profiles, commands, response parsers), their validation, and the
//! read-only [`ConfigStore`] interface the orchestrator consumes.
//! Reference store implementations are provided for YAML files and
//! in-memory use; the engine itself never writes configuration.

pub mod error;
pub mod records;
pub mod store;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use records::{
    AuthMethod, Command, Credentials, ExecutorKind, ExtractionRule, HostKeyPolicy, ResponseParser,
    ServerProfile,
};
pub use store::{ConfigStore, MemoryStore, YamlStore};
pub use validation::Validatable;

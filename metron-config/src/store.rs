//! Read-only configuration store
//!
//! The capture engine reads profiles, commands, and parsers through
//! [`ConfigStore`]; lookups distinguish an explicit not-found from a
//! store read failure. Two reference implementations are provided: an
//! in-memory store for embedders and tests, and a YAML-file-backed
//! store that loads and validates one document at construction and is
//! immutable afterwards, which gives concurrent captures snapshot
//! consistency without locking.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::error::ConfigResult;
use crate::records::{Command, ResponseParser, ServerProfile};
use crate::validation::Validatable;

/// Read interface to the configuration store
pub trait ConfigStore: Send + Sync {
    /// Look up a server profile by name
    fn find_server_profile(&self, name: &str) -> ConfigResult<Option<ServerProfile>>;

    /// Look up a command by name
    fn find_command(&self, name: &str) -> ConfigResult<Option<Command>>;

    /// Look up the parser bound to a command name, if any
    fn find_response_parser(&self, command_name: &str) -> ConfigResult<Option<ResponseParser>>;
}

/// In-memory configuration store
#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: HashMap<String, ServerProfile>,
    commands: HashMap<String, Command>,
    parsers: HashMap<String, ResponseParser>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_profile(&mut self, profile: ServerProfile) -> &mut Self {
        self.profiles.insert(profile.name.clone(), profile);
        self
    }

    pub fn add_command(&mut self, command: Command) -> &mut Self {
        self.commands.insert(command.name.clone(), command);
        self
    }

    pub fn add_parser(&mut self, parser: ResponseParser) -> &mut Self {
        self.parsers.insert(parser.command_name.clone(), parser);
        self
    }
}

impl ConfigStore for MemoryStore {
    fn find_server_profile(&self, name: &str) -> ConfigResult<Option<ServerProfile>> {
        Ok(self.profiles.get(name).cloned())
    }

    fn find_command(&self, name: &str) -> ConfigResult<Option<Command>> {
        Ok(self.commands.get(name).cloned())
    }

    fn find_response_parser(&self, command_name: &str) -> ConfigResult<Option<ResponseParser>> {
        Ok(self.parsers.get(command_name).cloned())
    }
}

/// Document shape of a YAML configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigDocument {
    profiles: Vec<ServerProfile>,
    commands: Vec<Command>,
    parsers: Vec<ResponseParser>,
}

/// YAML-file-backed configuration store
#[derive(Debug)]
pub struct YamlStore {
    inner: MemoryStore,
}

impl YamlStore {
    /// Load and validate a configuration document from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load and validate a configuration document from a YAML string
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let document: ConfigDocument = serde_yaml::from_str(content)?;

        let mut inner = MemoryStore::new();
        for profile in document.profiles {
            profile.validate()?;
            inner.add_profile(profile);
        }
        for command in document.commands {
            command.validate()?;
            inner.add_command(command);
        }
        for parser in document.parsers {
            parser.validate()?;
            inner.add_parser(parser);
        }

        debug!(
            profiles = inner.profiles.len(),
            commands = inner.commands.len(),
            parsers = inner.parsers.len(),
            "loaded configuration document"
        );

        Ok(Self { inner })
    }
}

impl ConfigStore for YamlStore {
    fn find_server_profile(&self, name: &str) -> ConfigResult<Option<ServerProfile>> {
        self.inner.find_server_profile(name)
    }

    fn find_command(&self, name: &str) -> ConfigResult<Option<Command>> {
        self.inner.find_command(name)
    }

    fn find_response_parser(&self, command_name: &str) -> ConfigResult<Option<ResponseParser>> {
        self.inner.find_response_parser(command_name)
    }
}

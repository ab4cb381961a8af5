mod env_overrides;
mod loader;
#[cfg(test)]
mod test_env;

use crate::auth::{AuthStrategy, Groups};
use crate::commands::{Command, CommandDescriptor, ShellCommand, builtins};
use crate::error::{Error, Result};
use crate::render::{Templates, default_templates};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATABASE_FILE: &str = "jobbox.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the file this config was read from. Not serialized.
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Database file. Empty means `jobbox.db` next to the config file;
    /// relative paths resolve against the config directory.
    pub database_path: PathBuf,
    pub log_level: String,
    pub default_timeout_secs: u64,
    /// Group name → members.
    pub groups: BTreeMap<String, Vec<String>>,
    /// Configured external commands by name.
    pub commands: BTreeMap<String, CommandConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            database_path: PathBuf::new(),
            log_level: "info".to_string(),
            default_timeout_secs: crate::commands::DEFAULT_COMMAND_TIMEOUT.as_secs(),
            groups: BTreeMap::new(),
            commands: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub cmd: String,
    pub args: Vec<String>,
    pub help: String,
    /// Falls back to `default_timeout_secs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub auth_strategy: AuthStrategy,
    pub allowed_groups: Vec<String>,
    pub record: bool,
    pub handshake: bool,
    /// Per-outcome template overrides.
    pub templates: Templates,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            cmd: String::new(),
            args: Vec::new(),
            help: String::new(),
            timeout_secs: None,
            auth_strategy: AuthStrategy::Any,
            allowed_groups: Vec::new(),
            record: true,
            handshake: true,
            templates: Templates::new(),
        }
    }
}

impl Config {
    /// Resolved database location.
    pub fn database_path(&self) -> PathBuf {
        let base = self
            .config_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        if self.database_path.as_os_str().is_empty() {
            base.join(DEFAULT_DATABASE_FILE)
        } else if self.database_path.is_relative() {
            base.join(&self.database_path)
        } else {
            self.database_path.clone()
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn auth_groups(&self) -> Groups {
        Groups::new(self.groups.clone())
    }

    pub fn descriptor(&self, name: &str, command: &CommandConfig) -> CommandDescriptor {
        let mut templates = default_templates();
        templates.extend(command.templates.clone());
        CommandDescriptor {
            name: name.to_string(),
            help: command.help.clone(),
            auth_strategy: command.auth_strategy,
            allowed_groups: command.allowed_groups.clone(),
            timeout: command
                .timeout_secs
                .map_or_else(|| self.default_timeout(), Duration::from_secs),
            record: command.record,
            requires_handshake: command.handshake,
            default_args: command.args.clone(),
            templates,
        }
    }

    /// One shell command per configured entry.
    pub fn shell_commands(&self) -> Vec<Box<dyn Command>> {
        self.commands
            .iter()
            .map(|(name, command)| {
                Box::new(ShellCommand::new(
                    command.cmd.clone(),
                    self.descriptor(name, command),
                )) as Box<dyn Command>
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_secs == 0 {
            return Err(Error::Config(
                "default_timeout_secs must be greater than zero".to_string(),
            ));
        }
        for (name, command) in &self.commands {
            if builtins::is_builtin(name) {
                return Err(Error::Config(format!(
                    "command {name} clashes with a builtin command"
                )));
            }
            if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
                return Err(Error::Config(format!("invalid command name {name:?}")));
            }
            if command.cmd.trim().is_empty() {
                return Err(Error::Config(format!("command {name} has no cmd")));
            }
            if command.timeout_secs == Some(0) {
                return Err(Error::Config(format!(
                    "command {name} timeout_secs must be greater than zero"
                )));
            }
            if command.auth_strategy == AuthStrategy::AllowedGroup
                && command.allowed_groups.is_empty()
            {
                return Err(Error::Config(format!(
                    "command {name} uses allowed_group but lists no groups"
                )));
            }
        }
        Ok(())
    }
}

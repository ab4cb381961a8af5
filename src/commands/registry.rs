use super::{Command, CommandDescriptor};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name → command lookup. Built explicitly at startup and passed to the
/// dispatcher; there is no process-wide registry.
#[derive(Default, Clone)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. Replaces any existing command with the same name.
    pub fn register(&mut self, command: Box<dyn Command>) {
        let command: Arc<dyn Command> = Arc::from(command);
        if self
            .commands
            .insert(command.name().to_string(), Arc::clone(&command))
            .is_some()
        {
            tracing::warn!(command = command.name(), "command registered twice, keeping the latest");
        }
    }

    /// Remove a command by name. Returns whether it was present.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.commands.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Command>> {
        self.commands
            .get(name)
            .cloned()
            .ok_or_else(|| Error::CommandNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    /// Descriptors of every command, sorted by name.
    pub fn descriptors(&self) -> Vec<&CommandDescriptor> {
        self.commands.values().map(|c| c.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop every command.
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

//! The in-proxy slash command surface.
//!
//! Commands declare an explicit parameter schema; arguments are
//! validated against it before the handler runs, and every failure is
//! a chat message back to the client, never a session error.

pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use crate::proxy::Session;

/// A recoverable command failure carrying a user-visible chat message.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandError {
    pub message: String,
}

impl CommandError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type CommandResult = Result<Option<String>, CommandError>;

pub type CommandFn = fn(&Arc<Session>, &Invocation) -> CommandResult;

/// One declared positional parameter.
pub struct Parameter {
    pub name: &'static str,
    pub required: bool,
    pub default: Option<&'static str>,
    /// Accepted values, compared case-insensitively.
    pub options: Option<&'static [&'static str]>,
}

impl Parameter {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
            default: None,
            options: None,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
            default: None,
            options: None,
        }
    }

    pub const fn with_default(name: &'static str, default: &'static str) -> Self {
        Self {
            name,
            required: false,
            default: Some(default),
            options: None,
        }
    }

    pub const fn one_of(name: &'static str, options: &'static [&'static str]) -> Self {
        Self {
            name,
            required: true,
            default: None,
            options: Some(options),
        }
    }
}

/// A parsed `/command arg arg ...` chat line.
#[derive(Debug, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub raw: &'a str,
    /// The typed `/name` or `//name` token.
    pub label: &'a str,
    pub args: Vec<&'a str>,
}

impl<'a> Invocation<'a> {
    pub fn parse(message: &'a str) -> Option<Self> {
        let mut segments = message.split_whitespace();
        let label = segments.next()?;
        if !label.starts_with('/') {
            return None;
        }
        Some(Self {
            raw: message,
            label,
            args: segments.collect(),
        })
    }

    /// The command name with its slash prefix removed.
    pub fn name(&self) -> &'a str {
        if let Some(stripped) = self.label.strip_prefix("//") {
            stripped
        } else {
            &self.label[1..]
        }
    }

    /// A double slash means the output is spoken upstream as chat
    /// instead of being shown to the client.
    pub fn echoes_upstream(&self) -> bool {
        self.label.starts_with("//")
    }

    pub fn arg(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).copied()
    }

    /// Arguments past the declared parameters (the variadic tail).
    pub fn tail(&self, from: usize) -> &[&'a str] {
        &self.args[self.args.len().min(from)..]
    }
}

/// A command with its schema.
pub struct Command {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub params: &'static [Parameter],
    /// Arguments beyond the declared parameters are accepted.
    pub variadic: bool,
    pub run: CommandFn,
}

impl Command {
    /// Validate the arguments against the schema, then run.
    pub fn invoke(&self, session: &Arc<Session>, invocation: &Invocation) -> CommandResult {
        let args = &invocation.args;
        let label = invocation.label;

        if self.params.is_empty() && !self.variadic && !args.is_empty() {
            return Err(CommandError::new(format!(
                "§9§l∎ §4Command <{}> takes no arguments!",
                label
            )));
        }
        if args.len() > self.params.len() && !self.variadic {
            return Err(CommandError::new(format!(
                "§9§l∎ §4Command <{}> takes at most {} argument(s)!",
                label,
                self.params.len()
            )));
        }
        let required: Vec<&Parameter> = self.params.iter().filter(|p| p.required).collect();
        if args.len() < required.len() {
            let names = required
                .iter()
                .map(|p| p.name)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(CommandError::new(format!(
                "§9§l∎ §4Command <{}> needs at least {} argument(s)! ({})",
                label,
                required.len(),
                names
            )));
        }
        for (index, param) in self.params.iter().enumerate() {
            if let (Some(options), Some(arg)) = (param.options, args.get(index)) {
                if !options.iter().any(|o| o.eq_ignore_ascii_case(arg)) {
                    return Err(CommandError::new(format!(
                        "§9§l∎ §4Invalid option '{}'. Please choose a correct argument! ({})",
                        arg,
                        options.join(", ")
                    )));
                }
            }
        }

        (self.run)(session, invocation)
    }
}

/// Name and alias lookup over a fixed command set. Built once during
/// startup; immutable afterwards.
pub struct Registry {
    commands: Vec<Command>,
    index: HashMap<&'static str, usize>,
}

impl Registry {
    pub fn new(commands: Vec<Command>) -> Self {
        let mut index = HashMap::new();
        for (i, command) in commands.iter().enumerate() {
            index.insert(command.name, i);
            for alias in command.aliases {
                index.insert(*alias, i);
            }
        }
        Self { commands, index }
    }

    pub fn find(&self, name: &str) -> Option<&Command> {
        self.index.get(name).map(|&i| &self.commands[i])
    }
}

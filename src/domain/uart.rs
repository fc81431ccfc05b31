//! UART commands and macros
//!
//! A macro is a named, ordered list of commands sent to the Nordic UART RX
//! characteristic with a fixed delay between them. Macros persist as JSON:
//!
//! ```text
//! {"name": "Play", "delay": 100,
//!  "commands": [{"kind": "text", "payload": "Play", "icon": "Play"},
//!               {"kind": "data", "payload": [97, 121], "icon": "Pause"}]}
//! ```

use crate::domain::error::{DecodeError, ValidationError};
use serde::{Deserialize, Serialize};

/// Name of the image shown for a command. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandIcon(pub String);

impl From<&str> for CommandIcon {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Text,
    Data,
}

/// One macro step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UartCommand {
    Text { payload: String, icon: CommandIcon },
    Data { payload: Vec<u8>, icon: CommandIcon },
}

impl UartCommand {
    pub fn text(payload: impl Into<String>, icon: impl Into<CommandIcon>) -> Self {
        Self::Text {
            payload: payload.into(),
            icon: icon.into(),
        }
    }

    pub fn data(payload: impl Into<Vec<u8>>, icon: impl Into<CommandIcon>) -> Self {
        Self::Data {
            payload: payload.into(),
            icon: icon.into(),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Text { .. } => CommandKind::Text,
            Self::Data { .. } => CommandKind::Data,
        }
    }

    pub fn icon(&self) -> &CommandIcon {
        match self {
            Self::Text { icon, .. } | Self::Data { icon, .. } => icon,
        }
    }

    /// Label for list rows: the text itself, or the bytes in hex
    pub fn title(&self) -> String {
        match self {
            Self::Text { payload, .. } => payload.clone(),
            Self::Data { payload, .. } => payload
                .iter()
                .map(|b| format!("0x{:02X}", b))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UartMacro {
    pub name: String,
    /// Pause between two commands, in milliseconds
    #[serde(rename = "delay")]
    pub delay_ms: u64,
    pub commands: Vec<UartCommand>,
}

impl UartMacro {
    pub fn new(name: impl Into<String>, delay_ms: u64) -> Self {
        Self {
            name: name.into(),
            delay_ms,
            commands: Vec::new(),
        }
    }

    /// An empty command list is a valid macro; only the name is checked.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(())
    }

    pub fn push(&mut self, command: UartCommand) {
        self.commands.push(command);
    }

    pub fn remove(&mut self, index: usize) -> Option<UartCommand> {
        if index < self.commands.len() {
            Some(self.commands.remove(index))
        } else {
            None
        }
    }

    /// Reorder a step. Out-of-range indices leave the macro unchanged.
    pub fn move_command(&mut self, from: usize, to: usize) -> bool {
        if from >= self.commands.len() || to >= self.commands.len() {
            return false;
        }
        let command = self.commands.remove(from);
        self.commands.insert(to, command);
        true
    }

    pub fn serialize(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

//! Shared types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend pipeline processing a conversation turn.
///
/// Chosen by the caller per message; never persisted by this subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Locally hosted pipeline.
    #[default]
    Local,
    /// Hosted online pipeline.
    Online,
}

impl ChatMode {
    /// Route segment of the assistant-chat endpoint for this mode.
    pub fn as_route(&self) -> &'static str {
        match self {
            ChatMode::Local => "local",
            ChatMode::Online => "online",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_route())
    }
}

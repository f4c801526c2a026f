//! Agent role vocabulary shared by memory, planning and detection.

use serde::{Deserialize, Serialize};

/// The two agent roles that collaborate on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Produces the UI specification (`DesignSpec`).
    Design,
    /// Produces the implementation files from the design.
    Implementation,
}

impl AgentRole {
    pub const ALL: [AgentRole; 2] = [AgentRole::Design, AgentRole::Implementation];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Design => "design",
            AgentRole::Implementation => "implementation",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

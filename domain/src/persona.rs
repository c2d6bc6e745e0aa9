//! Expert persona profile

use serde::{Deserialize, Serialize};

/// A named AI role with a fixed behavioral prompt (Value Object).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaProfile {
    /// Stable lookup code, e.g. "cto" or "skeptic".
    pub code: String,
    /// Display name, e.g. "The CTO".
    pub name: String,
    /// System prompt that fixes this persona's behavior.
    pub role_prompt: String,
}

impl PersonaProfile {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        role_prompt: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            role_prompt: role_prompt.into(),
        }
    }
}

impl std::fmt::Display for PersonaProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

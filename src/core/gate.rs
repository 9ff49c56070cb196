use serde::{Deserialize, Serialize};

/// Outcome of a UI-facing permission check. Denials are expected and
/// displayable, so they are values rather than errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl Gate {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

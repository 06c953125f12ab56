//! Context type for tracking who caused a state change or service call

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Origin of a service call or state change
///
/// The engine stamps every command it issues with a fresh context so host logs
/// can correlate a thermostat or vent change with the decision that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier (ULID)
    pub id: String,

    /// Parent context id, set when a command is issued in reaction to an event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: None,
        }
    }

    /// Child context that records `self` as its cause
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: Some(self.id.clone()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_links_parent() {
        let parent = Context::new();
        let child = parent.child();
        assert_ne!(parent.id, child.id);
        assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
    }
}

//! State-change event data delivered by the host

use serde::{Deserialize, Serialize};

use crate::{Context, EntityState};

/// A single entity transition as reported by the host
///
/// `old_state` is `None` the first time an entity appears; `new_state` is
/// `None` when the entity was removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangedData {
    pub entity_id: String,
    pub old_state: Option<EntityState>,
    pub new_state: Option<EntityState>,
    #[serde(default)]
    pub context: Context,
}

impl StateChangedData {
    /// Raw state value before the change
    pub fn old_value(&self) -> Option<&str> {
        self.old_state.as_ref().map(|s| s.state.as_str())
    }

    /// Raw state value after the change
    pub fn new_value(&self) -> Option<&str> {
        self.new_state.as_ref().map(|s| s.state.as_str())
    }
}

//! Snapshot of a host entity's state

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{attrs, Context, STATE_ON, STATE_UNAVAILABLE, STATE_UNKNOWN};

/// The state of a host entity at a point in time
///
/// The value is kept as the raw string the host reports ("on", "21.5",
/// "heat_cool", "unavailable"); typed accessors interpret it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,

    /// Raw state value
    pub state: String,

    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the value last changed
    pub last_changed: DateTime<Utc>,

    /// When the value or any attribute was last written
    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub context: Context,
}

impl EntityState {
    pub fn new(
        entity_id: impl Into<String>,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
            context: Context::new(),
        }
    }

    /// Successor state, keeping `last_changed` when the value is unchanged
    pub fn with_update(
        &self,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
        context: Context,
    ) -> Self {
        let state = state.into();
        let changed = self.state != state;
        Self {
            entity_id: self.entity_id.clone(),
            state,
            attributes,
            last_changed: if changed { now } else { self.last_changed },
            last_updated: now,
            context,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }

    pub fn is_unknown(&self) -> bool {
        self.state == STATE_UNKNOWN
    }

    /// Unavailable or unknown: the value carries no information
    pub fn has_no_value(&self) -> bool {
        self.is_unavailable() || self.is_unknown()
    }

    pub fn is_on(&self) -> bool {
        self.state == STATE_ON
    }

    /// Typed attribute value, `None` when missing or of the wrong type
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Numeric attribute, accepting both JSON numbers and numeric strings
    pub fn attribute_f64(&self, key: &str) -> Option<f64> {
        match self.attributes.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Display name, falling back to the entity id
    pub fn friendly_name(&self) -> String {
        self.attribute::<String>(attrs::FRIENDLY_NAME)
            .unwrap_or_else(|| self.entity_id.clone())
    }

    /// The value parsed as a finite float
    pub fn numeric_value(&self) -> Option<f64> {
        if self.has_no_value() {
            return None;
        }
        self.state
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }
}

impl PartialEq for EntityState {
    fn eq(&self, other: &Self) -> bool {
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(value: &str) -> EntityState {
        EntityState::new("sensor.den_temperature", value, HashMap::new(), Utc::now())
    }

    #[test]
    fn test_numeric_value() {
        assert_eq!(state("21.5").numeric_value(), Some(21.5));
        assert_eq!(state(" 70 ").numeric_value(), Some(70.0));
        assert_eq!(state("unavailable").numeric_value(), None);
        assert_eq!(state("unknown").numeric_value(), None);
        assert_eq!(state("warm").numeric_value(), None);
        assert_eq!(state("NaN").numeric_value(), None);
    }

    #[test]
    fn test_with_update_keeps_last_changed() {
        let start = Utc::now();
        let first = EntityState::new("binary_sensor.door", "on", HashMap::new(), start);
        let later = start + chrono::Duration::seconds(10);

        let same = first.with_update("on", HashMap::new(), later, Context::new());
        assert_eq!(same.last_changed, start);
        assert_eq!(same.last_updated, later);

        let changed = first.with_update("off", HashMap::new(), later, Context::new());
        assert_eq!(changed.last_changed, later);
    }

    #[test]
    fn test_attributes() {
        let mut attributes = HashMap::new();
        attributes.insert("friendly_name".to_string(), json!("Den Vent"));
        attributes.insert("current_tilt_position".to_string(), json!("75"));
        attributes.insert("entity_id".to_string(), json!(["cover.a", "cover.b"]));
        let s = EntityState::new("cover.den", "open", attributes, Utc::now());

        assert_eq!(s.friendly_name(), "Den Vent");
        assert_eq!(s.attribute_f64("current_tilt_position"), Some(75.0));
        assert_eq!(
            s.attribute::<Vec<String>>("entity_id"),
            Some(vec!["cover.a".to_string(), "cover.b".to_string()])
        );
        assert_eq!(state("1").friendly_name(), "sensor.den_temperature");
    }
}

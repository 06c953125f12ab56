//! Record of a service call issued to the host

use crate::Context;
use serde::{Deserialize, Serialize};

/// A call to a host service such as `climate.set_hvac_mode`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: serde_json::Value,
    pub context: Context,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            data,
            context,
        }
    }

    /// Full service identifier (`domain.service`)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Typed value from the payload
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Target entity ids, accepting both a single string and a list
    pub fn entity_ids(&self) -> Vec<String> {
        match self.data.get("entity_id") {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_hvac_mode_call() {
        let call = ServiceCall::new(
            "climate",
            "set_hvac_mode",
            json!({"entity_id": "climate.main", "hvac_mode": "heat"}),
            Context::new(),
        );

        assert_eq!(call.service_id(), "climate.set_hvac_mode");
        assert_eq!(call.get::<String>("hvac_mode").as_deref(), Some("heat"));
        assert_eq!(call.entity_ids(), vec!["climate.main"]);
    }

    #[test]
    fn test_entity_ids_list_and_missing() {
        let call = ServiceCall::new(
            "cover",
            "open_cover_tilt",
            json!({"entity_id": ["cover.a", "cover.b"]}),
            Context::new(),
        );
        assert_eq!(call.entity_ids(), vec!["cover.a", "cover.b"]);

        let call = ServiceCall::new("notify", "mobile", json!({"title": "x"}), Context::new());
        assert!(call.entity_ids().is_empty());
    }
}

//! Virtual thermostats: per-area heat/cool targets

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tcs_config::AreaTable;
use tracing::{debug, warn};

/// A heat (low) and cool (high) target pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetRange {
    pub low: f64,
    pub high: f64,
}

impl TargetRange {
    /// Swaps the bounds when given in the wrong order
    pub fn new(low: f64, high: f64) -> Self {
        if low > high {
            warn!(low, high, "Heating target above cooling target, swapping");
            Self { low: high, high: low }
        } else {
            Self { low, high }
        }
    }

    pub fn midpoint(&self) -> f64 {
        (self.low + self.high) / 2.0
    }
}

/// Where the decision engine gets its targets
pub trait VirtualThermostatRegistry: Send + Sync {
    /// Targets of one area's virtual thermostat
    fn area_targets(&self, area_id: &str) -> Option<TargetRange>;

    /// House-wide targets: the highest heat target and the lowest cool target
    fn global_targets(&self) -> Option<TargetRange>;
}

pub type SharedRegistry = Arc<dyn VirtualThermostatRegistry>;

/// Area thermostats kept in memory, seeded from configuration
#[derive(Debug, Default)]
pub struct AreaThermostats {
    areas: DashMap<String, TargetRange>,
}

impl AreaThermostats {
    pub fn new() -> Self {
        Self::default()
    }

    /// One thermostat per enabled area with both targets configured
    pub fn from_table(table: &AreaTable) -> Self {
        let registry = Self::new();
        for area in table.iter() {
            if let (Some(low), Some(high)) = (area.target_temp_low, area.target_temp_high) {
                registry.set_area_targets(&area.area_id, TargetRange::new(low, high));
            }
        }
        registry
    }

    pub fn set_area_targets(&self, area_id: &str, range: TargetRange) {
        debug!(area_id = %area_id, low = range.low, high = range.high, "Virtual thermostat targets updated");
        self.areas.insert(area_id.to_string(), range);
    }

    pub fn remove_area(&self, area_id: &str) -> bool {
        self.areas.remove(area_id).is_some()
    }

    /// Set the house-wide targets by pulling outliers in line
    ///
    /// Areas heating above `low` are lowered to it and areas cooling below
    /// `high` are raised to it. Raising the heat target or lowering the cool
    /// target has no effect, since the global view is the max/min of areas.
    pub fn set_global_targets(&self, low: Option<f64>, high: Option<f64>) {
        for mut entry in self.areas.iter_mut() {
            let range = *entry.value();
            let new_low = low.map_or(range.low, |l| range.low.min(l));
            let new_high = high.map_or(range.high, |h| range.high.max(h));
            *entry.value_mut() = TargetRange::new(new_low, new_high);
        }
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}

impl VirtualThermostatRegistry for AreaThermostats {
    fn area_targets(&self, area_id: &str) -> Option<TargetRange> {
        self.areas.get(area_id).map(|r| *r)
    }

    fn global_targets(&self) -> Option<TargetRange> {
        let mut ranges = self.areas.iter().map(|r| *r.value());
        let first = ranges.next()?;
        Some(ranges.fold(first, |acc, r| TargetRange {
            low: acc.low.max(r.low),
            high: acc.high.min(r.high),
        }))
    }
}

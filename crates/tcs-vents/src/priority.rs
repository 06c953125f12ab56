//! Scoring for the minimum-open floor

use tcs_core::{HvacMode, TemperatureUnit};

use crate::AreaVentState;

const CRITICAL_BONUS: f64 = 2000.0;
const ACTIVE_BONUS: f64 = 1000.0;
const OCCUPIED_BONUS: f64 = 50.0;
/// Colder rooms rank higher below this while heating (°F)
const HEAT_REFERENCE_F: f64 = 80.0;
/// Warmer rooms rank higher above this while cooling (°F)
const COOL_REFERENCE_F: f64 = 60.0;
const TEMPERATURE_WEIGHT: f64 = 10.0;

/// What the score is computed against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringContext {
    /// HEAT or COOL use the temperature terms; anything else uses the
    /// distance from target
    pub mode: Option<HvacMode>,
    pub unit: TemperatureUnit,
}

/// Priority of an area's vents for the floor; higher stays open first
///
/// Temperatures are compared in Fahrenheit whatever the deployment unit, so a
/// Celsius reading scores the same as its Fahrenheit equivalent.
pub fn priority_score(area: &AreaVentState, ctx: ScoringContext) -> f64 {
    let mut score = 0.0;
    if area.is_critical {
        score += CRITICAL_BONUS;
    }
    if area.is_active {
        score += ACTIVE_BONUS;
    }
    if area.is_occupied {
        score += OCCUPIED_BONUS;
    }

    let temperature = area.determining_temperature.map(|t| ctx.unit.to_fahrenheit(t));
    match (ctx.mode, temperature) {
        (Some(HvacMode::Heat), Some(temp)) => {
            score += ((HEAT_REFERENCE_F - temp) * TEMPERATURE_WEIGHT).max(0.0);
        }
        (Some(HvacMode::Cool), Some(temp)) => {
            score += ((temp - COOL_REFERENCE_F) * TEMPERATURE_WEIGHT).max(0.0);
        }
        _ => {
            if let Some(distance) = area.distance_from_target {
                score += ctx.unit.delta_to_fahrenheit(distance) * TEMPERATURE_WEIGHT;
            }
        }
    }
    score
}

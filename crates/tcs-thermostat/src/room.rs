//! Per-room satiation and critical evaluation

use serde::Serialize;
use tcs_core::HvacMode;

use crate::reading::{
    determining_reading, is_room_satiated_for_cool, is_room_satiated_for_heat,
    is_room_satiated_for_heat_cool, Purpose, Reading, Readings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SatiationReason {
    Satiated,
    NotSatiated,
    NoTempSensors,
    AllSensorsUnavailable,
    NoTargetTemp,
}

impl SatiationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SatiationReason::Satiated => "satiated",
            SatiationReason::NotSatiated => "not_satiated",
            SatiationReason::NoTempSensors => "no_temp_sensors",
            SatiationReason::AllSensorsUnavailable => "all_sensors_unavailable",
            SatiationReason::NoTargetTemp => "no_target_temp",
        }
    }
}

/// Targets resolved for one room in one evaluation mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AreaTargets {
    /// Low for HEAT, high for COOL, midpoint otherwise
    pub target: Option<f64>,
    pub low: Option<f64>,
    pub high: Option<f64>,
}

impl AreaTargets {
    pub fn for_mode(mode: HvacMode, low: Option<f64>, high: Option<f64>) -> Self {
        let target = match mode {
            HvacMode::Heat => low,
            HvacMode::Cool => high,
            _ => match (low, high) {
                (Some(l), Some(h)) => Some((l + h) / 2.0),
                _ => None,
            },
        };
        Self { target, low, high }
    }
}

/// Safety offsets from the targets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CriticalThresholds {
    pub heating: f64,
    pub cooling: f64,
}

/// Temperature state of one room for one decision cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomTemperatureState {
    pub area_id: String,
    pub area_name: String,
    pub temperature_sensors: Vec<String>,
    pub sensor_readings: Readings,
    pub is_satiated: bool,
    pub satiation_reason: SatiationReason,
    pub is_critical: bool,
    pub critical_reason: Option<String>,
    pub is_active: bool,
    pub determining_sensor: Option<String>,
    pub determining_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
}

impl RoomTemperatureState {
    pub fn new(
        area_id: impl Into<String>,
        area_name: impl Into<String>,
        temperature_sensors: Vec<String>,
        sensor_readings: Readings,
    ) -> Self {
        Self {
            area_id: area_id.into(),
            area_name: area_name.into(),
            temperature_sensors,
            sensor_readings,
            is_satiated: false,
            satiation_reason: SatiationReason::NoTempSensors,
            is_critical: false,
            critical_reason: None,
            is_active: false,
            determining_sensor: None,
            determining_temperature: None,
            target_temperature: None,
        }
    }

    pub fn has_valid_readings(&self) -> bool {
        !self.sensor_readings.is_empty()
    }

    pub fn available_sensor_count(&self) -> usize {
        self.sensor_readings.len()
    }

    /// The reading nearest the target in the sense that matters for `mode`
    pub fn closest_to_target(&self, target: f64, mode: HvacMode) -> Option<Reading> {
        determining_reading(
            Some(mode),
            &self.sensor_readings,
            Some((target, target)),
            Purpose::Satiation,
        )
    }

    fn set_determining(&mut self, reading: Option<Reading>) {
        self.determining_sensor = reading.as_ref().map(|r| r.sensor.clone());
        self.determining_temperature = reading.map(|r| r.temperature);
    }

    fn set_average(&mut self) {
        let reading = determining_reading(None, &self.sensor_readings, None, Purpose::Satiation);
        self.set_determining(reading);
    }

    /// Sets the no-data reason; returns false when there is nothing to evaluate
    fn check_readings(&mut self) -> bool {
        if self.has_valid_readings() {
            return true;
        }
        self.satiation_reason = if self.temperature_sensors.is_empty() {
            SatiationReason::NoTempSensors
        } else {
            SatiationReason::AllSensorsUnavailable
        };
        false
    }

    fn mark_below(&mut self, temperature: f64, target: f64, threshold: f64) {
        self.is_critical = true;
        self.critical_reason = Some(format!(
            "Temperature {:.1}° is {:.1}° below heat target {:.1}° (threshold: {:.1}°)",
            temperature,
            target - temperature,
            target,
            threshold
        ));
    }

    fn mark_above(&mut self, temperature: f64, target: f64, threshold: f64) {
        self.is_critical = true;
        self.critical_reason = Some(format!(
            "Temperature {:.1}° is {:.1}° above cool target {:.1}° (threshold: {:.1}°)",
            temperature,
            temperature - target,
            target,
            threshold
        ));
    }
}

/// Evaluate an active room: satiation, plus whether any spot is critical
pub fn evaluate_room_satiation(
    mut room: RoomTemperatureState,
    mode: HvacMode,
    targets: AreaTargets,
    deadband: f64,
    thresholds: CriticalThresholds,
) -> RoomTemperatureState {
    room.is_active = true;
    if !room.check_readings() {
        return room;
    }

    let (satiated, reading) = match mode {
        HvacMode::Heat | HvacMode::Cool => {
            let Some(target) = targets.target else {
                room.satiation_reason = SatiationReason::NoTargetTemp;
                room.set_average();
                return room;
            };
            room.target_temperature = Some(target);
            if mode == HvacMode::Heat {
                is_room_satiated_for_heat(&room.sensor_readings, target, deadband)
            } else {
                is_room_satiated_for_cool(&room.sensor_readings, target, deadband)
            }
        }
        HvacMode::HeatCool => {
            let (Some(low), Some(high)) = (targets.low, targets.high) else {
                room.satiation_reason = SatiationReason::NoTargetTemp;
                room.set_average();
                return room;
            };
            room.target_temperature = Some((low + high) / 2.0);
            is_room_satiated_for_heat_cool(&room.sensor_readings, low, high, deadband)
        }
        _ => {
            // Nothing to condition in this mode
            room.set_average();
            room.is_satiated = true;
            room.satiation_reason = SatiationReason::Satiated;
            return room;
        }
    };

    room.is_satiated = satiated;
    room.set_determining(reading);
    room.satiation_reason = if satiated {
        SatiationReason::Satiated
    } else {
        SatiationReason::NotSatiated
    };

    // An occupied room can still have a dangerously cold or hot spot
    check_exposure(&mut room, mode, targets, thresholds, false);
    room
}

/// Evaluate an inactive room for critical temperatures
///
/// HEAT and COOL judge the room by its most favorable reading, so it is only
/// critical when the whole room is. HEAT_COOL uses the worst reading on
/// either side.
pub fn evaluate_room_critical(
    mut room: RoomTemperatureState,
    mode: HvacMode,
    targets: AreaTargets,
    thresholds: CriticalThresholds,
) -> RoomTemperatureState {
    room.is_active = false;
    if !room.check_readings() {
        return room;
    }
    room.satiation_reason = SatiationReason::NotSatiated;

    match mode {
        HvacMode::Heat | HvacMode::Cool => {
            let Some(target) = targets.target else {
                room.set_average();
                return room;
            };
            let reading = determining_reading(Some(mode), &room.sensor_readings, None, Purpose::Satiation);
            room.set_determining(reading.clone());
            if let Some(r) = reading {
                if mode == HvacMode::Heat && r.temperature < target - thresholds.heating {
                    room.mark_below(r.temperature, target, thresholds.heating);
                } else if mode == HvacMode::Cool && r.temperature > target + thresholds.cooling {
                    room.mark_above(r.temperature, target, thresholds.cooling);
                }
            }
        }
        HvacMode::HeatCool => {
            if targets.low.is_none() || targets.high.is_none() {
                room.set_average();
                return room;
            }
            check_exposure(&mut room, mode, targets, thresholds, true);
        }
        _ => {}
    }
    room
}

/// Mark the room critical when its worst reading is outside the safety band
fn check_exposure(
    room: &mut RoomTemperatureState,
    mode: HvacMode,
    targets: AreaTargets,
    thresholds: CriticalThresholds,
    report_reading: bool,
) {
    let (heat_target, cool_target) = match mode {
        HvacMode::Heat => (targets.target, None),
        HvacMode::Cool => (None, targets.target),
        HvacMode::HeatCool => match (targets.low, targets.high) {
            (Some(low), Some(high)) => (Some(low), Some(high)),
            _ => return,
        },
        _ => return,
    };

    let coldest = determining_reading(Some(HvacMode::Heat), &room.sensor_readings, None, Purpose::Exposure);
    let warmest = determining_reading(Some(HvacMode::Cool), &room.sensor_readings, None, Purpose::Exposure);

    if let (Some(target), Some(r)) = (heat_target, &coldest) {
        if r.temperature < target - thresholds.heating {
            room.mark_below(r.temperature, target, thresholds.heating);
            if report_reading {
                room.set_determining(coldest.clone());
            }
            return;
        }
    }
    if let (Some(target), Some(r)) = (cool_target, &warmest) {
        if r.temperature > target + thresholds.cooling {
            room.mark_above(r.temperature, target, thresholds.cooling);
            if report_reading {
                room.set_determining(warmest.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLDS: CriticalThresholds = CriticalThresholds {
        heating: 3.0,
        cooling: 3.0,
    };

    fn room(values: &[(&str, f64)]) -> RoomTemperatureState {
        RoomTemperatureState::new(
            "den",
            "Den",
            values.iter().map(|(s, _)| s.to_string()).collect(),
            values.iter().map(|(s, t)| (s.to_string(), *t)).collect(),
        )
    }

    fn heat(target: f64) -> AreaTargets {
        AreaTargets::for_mode(HvacMode::Heat, Some(target), Some(target + 8.0))
    }

    #[test]
    fn test_heat_and_cool_examples() {
        let readings = [("sensor.a", 68.0), ("sensor.b", 70.5)];
        let state = evaluate_room_satiation(room(&readings), HvacMode::Heat, heat(70.0), 1.0, THRESHOLDS);
        assert!(state.is_satiated);
        assert_eq!(state.determining_temperature, Some(70.5));

        let cool = AreaTargets::for_mode(HvacMode::Cool, Some(62.0), Some(70.0));
        let state = evaluate_room_satiation(room(&readings), HvacMode::Cool, cool, 1.0, THRESHOLDS);
        assert!(state.is_satiated);
        assert_eq!(state.determining_sensor.as_deref(), Some("sensor.a"));
        assert_eq!(state.satiation_reason, SatiationReason::Satiated);
    }

    #[test]
    fn test_missing_data_reasons() {
        let empty = RoomTemperatureState::new("den", "Den", vec![], Readings::new());
        let state = evaluate_room_satiation(empty, HvacMode::Heat, heat(70.0), 1.0, THRESHOLDS);
        assert!(!state.is_satiated);
        assert_eq!(state.satiation_reason, SatiationReason::NoTempSensors);

        let unavailable = RoomTemperatureState::new("den", "Den", vec!["sensor.a".into()], Readings::new());
        let state = evaluate_room_satiation(unavailable, HvacMode::Heat, heat(70.0), 1.0, THRESHOLDS);
        assert_eq!(state.satiation_reason, SatiationReason::AllSensorsUnavailable);

        let state = evaluate_room_satiation(
            room(&[("sensor.a", 60.0)]),
            HvacMode::Heat,
            AreaTargets::default(),
            1.0,
            THRESHOLDS,
        );
        assert!(!state.is_satiated);
        assert_eq!(state.satiation_reason, SatiationReason::NoTargetTemp);
        assert_eq!(state.determining_temperature, Some(60.0));
    }

    #[test]
    fn test_other_modes_are_satiated() {
        let state = evaluate_room_satiation(
            room(&[("sensor.a", 50.0)]),
            HvacMode::FanOnly,
            AreaTargets::default(),
            1.0,
            THRESHOLDS,
        );
        assert!(state.is_satiated);
        assert!(!state.is_critical);
    }

    #[test]
    fn test_active_room_with_cold_spot_is_critical() {
        let readings = [("sensor.window", 64.0), ("sensor.desk", 70.0)];
        let state = evaluate_room_satiation(room(&readings), HvacMode::Heat, heat(68.0), 0.5, THRESHOLDS);
        assert!(state.is_satiated);
        assert!(state.is_critical);
        assert_eq!(
            state.critical_reason.as_deref(),
            Some("Temperature 64.0° is 4.0° below heat target 68.0° (threshold: 3.0°)")
        );
    }

    #[test]
    fn test_inactive_room_uses_most_favorable_reading() {
        let readings = [("sensor.window", 64.0), ("sensor.desk", 66.0)];
        let state = evaluate_room_critical(room(&readings), HvacMode::Heat, heat(68.0), THRESHOLDS);
        assert!(!state.is_critical);
        assert_eq!(state.determining_sensor.as_deref(), Some("sensor.desk"));

        let readings = [("sensor.window", 62.0), ("sensor.desk", 64.5)];
        let state = evaluate_room_critical(room(&readings), HvacMode::Heat, heat(68.0), THRESHOLDS);
        assert!(state.is_critical);
        assert!(!state.is_active);
    }

    #[test]
    fn test_inactive_heat_cool_uses_worst_reading() {
        let targets = AreaTargets::for_mode(HvacMode::HeatCool, Some(68.0), Some(76.0));
        let readings = [("sensor.a", 70.0), ("sensor.b", 80.0)];
        let state = evaluate_room_critical(room(&readings), HvacMode::HeatCool, targets, THRESHOLDS);
        assert!(state.is_critical);
        assert_eq!(state.determining_sensor.as_deref(), Some("sensor.b"));
        assert!(state.critical_reason.unwrap().contains("above cool target 76.0°"));
    }
}

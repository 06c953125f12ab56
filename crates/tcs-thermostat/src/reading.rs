//! Temperature readings and the pure satiation math

use indexmap::IndexMap;
use serde::Serialize;
use tcs_core::{EntityState, HvacMode};
use tracing::debug;

/// Sensor id -> temperature, in sensor order
pub type Readings = IndexMap<String, f64>;

/// The reading that decided a room's state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub sensor: String,
    pub temperature: f64,
}

impl Reading {
    fn new(sensor: &str, temperature: f64) -> Self {
        Self {
            sensor: sensor.to_string(),
            temperature,
        }
    }
}

/// Why a reading is being selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// The most favorable reading: a room is comfortable once any spot is
    Satiation,
    /// The worst reading: any spot outside the safety band counts
    Exposure,
}

/// Temperature of a sensor state, `None` when unavailable or not numeric
pub fn temperature_from_state(state: Option<&EntityState>) -> Option<f64> {
    state?.numeric_value()
}

/// Select the reading that decides a room's state
///
/// | mode | `Satiation` | `Exposure` |
/// |---|---|---|
/// | HEAT | warmest | coldest |
/// | COOL | coolest | warmest |
/// | HEAT_COOL | first inside `band`, else closest to it | coldest below `band`, else warmest |
/// | other | average | average |
///
/// The average case reports the sensor nearest the average together with the
/// average itself. HEAT_COOL without a band also falls back to the average.
pub fn determining_reading(
    mode: Option<HvacMode>,
    readings: &Readings,
    band: Option<(f64, f64)>,
    purpose: Purpose,
) -> Option<Reading> {
    if readings.is_empty() {
        return None;
    }

    match (mode, purpose) {
        (Some(HvacMode::Heat), Purpose::Satiation) | (Some(HvacMode::Cool), Purpose::Exposure) => {
            warmest(readings)
        }
        (Some(HvacMode::Cool), Purpose::Satiation) | (Some(HvacMode::Heat), Purpose::Exposure) => {
            coolest(readings)
        }
        (Some(HvacMode::HeatCool), purpose) => match band {
            Some((low, high)) => match purpose {
                Purpose::Satiation => readings
                    .iter()
                    .find(|(_, t)| (low..=high).contains(*t))
                    .map(|(s, t)| Reading::new(s, *t))
                    .or_else(|| first_min_by(readings, |t| distance_to_band(t, low, high))),
                Purpose::Exposure => coolest(readings)
                    .filter(|r| r.temperature < low)
                    .or_else(|| warmest(readings)),
            },
            None => average(readings),
        },
        _ => average(readings),
    }
}

fn distance_to_band(temperature: f64, low: f64, high: f64) -> f64 {
    if temperature < low {
        low - temperature
    } else if temperature > high {
        temperature - high
    } else {
        0.0
    }
}

/// First reading with the smallest key; ties keep sensor order
fn first_min_by(readings: &Readings, key: impl Fn(f64) -> f64) -> Option<Reading> {
    let mut best: Option<(&String, f64, f64)> = None;
    for (sensor, &temperature) in readings {
        let k = key(temperature);
        if best.map_or(true, |(_, _, best_k)| k < best_k) {
            best = Some((sensor, temperature, k));
        }
    }
    best.map(|(s, t, _)| Reading::new(s, t))
}

fn coolest(readings: &Readings) -> Option<Reading> {
    first_min_by(readings, |t| t)
}

fn warmest(readings: &Readings) -> Option<Reading> {
    first_min_by(readings, |t| -t)
}

fn average(readings: &Readings) -> Option<Reading> {
    let avg = readings.values().sum::<f64>() / readings.len() as f64;
    first_min_by(readings, |t| (t - avg).abs()).map(|r| Reading {
        sensor: r.sensor,
        temperature: avg,
    })
}

/// Satiated for heating once the warmest reading is at least `target - deadband`
pub fn is_room_satiated_for_heat(
    readings: &Readings,
    target: f64,
    deadband: f64,
) -> (bool, Option<Reading>) {
    let reading = determining_reading(Some(HvacMode::Heat), readings, None, Purpose::Satiation);
    let satiated = reading
        .as_ref()
        .is_some_and(|r| r.temperature >= target - deadband);
    (satiated, reading)
}

/// Satiated for cooling once the coolest reading is at most `target + deadband`
pub fn is_room_satiated_for_cool(
    readings: &Readings,
    target: f64,
    deadband: f64,
) -> (bool, Option<Reading>) {
    let reading = determining_reading(Some(HvacMode::Cool), readings, None, Purpose::Satiation);
    let satiated = reading
        .as_ref()
        .is_some_and(|r| r.temperature <= target + deadband);
    (satiated, reading)
}

/// Satiated in dual-setpoint mode when any reading lies within
/// `[low - deadband, high + deadband]`
pub fn is_room_satiated_for_heat_cool(
    readings: &Readings,
    target_low: f64,
    target_high: f64,
    deadband: f64,
) -> (bool, Option<Reading>) {
    let band = (target_low - deadband, target_high + deadband);
    let reading = determining_reading(
        Some(HvacMode::HeatCool),
        readings,
        Some(band),
        Purpose::Satiation,
    );
    let satiated = reading
        .as_ref()
        .is_some_and(|r| (band.0..=band.1).contains(&r.temperature));
    (satiated, reading)
}

/// Which way the house leans while the HVAC is off
///
/// Below the heat target means HEAT, above the cool target means COOL, and
/// inside the band the closer edge wins. `None` without readings or targets.
pub fn infer_effective_hvac_mode(
    all_readings: &Readings,
    target_low: Option<f64>,
    target_high: Option<f64>,
) -> Option<HvacMode> {
    let (low, high) = (target_low?, target_high?);
    if all_readings.is_empty() {
        return None;
    }

    let avg = all_readings.values().sum::<f64>() / all_readings.len() as f64;
    let to_heat = low - avg;
    let to_cool = avg - high;
    debug!(
        avg_temp = avg,
        target_low = low,
        target_high = high,
        distance_to_heat = to_heat,
        distance_to_cool = to_cool,
        "Inferring hvac mode"
    );

    let mode = if to_heat <= 0.0 && to_cool <= 0.0 {
        if to_heat.abs() < to_cool.abs() {
            HvacMode::Heat
        } else {
            HvacMode::Cool
        }
    } else if to_heat > 0.0 {
        HvacMode::Heat
    } else {
        HvacMode::Cool
    };
    Some(mode)
}

/// What a room needs regardless of the current mode
#[derive(Debug, Clone, Copy)]
pub struct NeedInput {
    pub is_active: bool,
    pub temperature: Option<f64>,
}

/// Thresholds for [`determine_rooms_need_mode`]
#[derive(Debug, Clone, Copy)]
pub struct NeedThresholds {
    pub target_low: f64,
    pub target_high: f64,
    pub deadband: f64,
    pub heating_critical_offset: f64,
    pub cooling_critical_offset: f64,
}

/// Mode-independent needs: `(any_need_heat, any_need_cool)`
///
/// Active rooms are judged against the comfort band, inactive rooms against
/// the critical band.
pub fn determine_rooms_need_mode(
    rooms: impl IntoIterator<Item = NeedInput>,
    thresholds: NeedThresholds,
) -> (bool, bool) {
    let heat_comfort = thresholds.target_low - thresholds.deadband;
    let cool_comfort = thresholds.target_high + thresholds.deadband;
    let heat_critical = thresholds.target_low - thresholds.heating_critical_offset;
    let cool_critical = thresholds.target_high + thresholds.cooling_critical_offset;

    let mut need_heat = false;
    let mut need_cool = false;
    for room in rooms {
        let Some(temp) = room.temperature else {
            continue;
        };
        let (heat_at, cool_at) = if room.is_active {
            (heat_comfort, cool_comfort)
        } else {
            (heat_critical, cool_critical)
        };
        if temp < heat_at {
            need_heat = true;
        } else if temp > cool_at {
            need_cool = true;
        }
    }
    (need_heat, need_cool)
}

//! Stride Metrics Module
//! =====================
//!
//! Derived workout figures shown to the runner and stored with a workout:
//! - **Pace**: minutes per kilometer from ground speed
//! - **Calories**: Keytel heart-rate based energy estimate
//! - **Display formatting** for distance and duration

use serde::{Deserialize, Serialize};

/// Minutes-per-kilometer numerator for a speed in m/s (1000 m / 60 s).
const PACE_FACTOR: f64 = 16.6667;

/// Kilojoules per kilocalorie, as used by the Keytel equations.
const KJ_PER_KCAL: f64 = 4.184;

/// Age assumed when the profile carries none.
pub const DEFAULT_AGE: u32 = 30;

/// Body weight assumed for workout calories when the profile carries none.
pub const WORKOUT_WEIGHT_KG: f64 = 75.0;

/// Age assumed for workout calories when the profile carries none.
pub const WORKOUT_AGE: u32 = 25;

/// Heart rate assumed for workout calories when none was measured.
pub const WORKOUT_HEART_RATE: f64 = 140.0;

/// Placeholder shown when pace is unknown.
pub const NO_PACE: &str = "--:--";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

/// Body data needed for the calorie estimate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AthleteProfile {
    pub weight_kg: Option<f64>,
    pub age: Option<u32>,
    pub gender: Gender,
}

impl AthleteProfile {
    pub fn new(weight_kg: f64, age: u32, gender: Gender) -> Self {
        Self {
            weight_kg: Some(weight_kg),
            age: Some(age),
            gender,
        }
    }

    /// Fills missing (or zero) weight and age with the workout defaults.
    pub fn or_workout_defaults(&self) -> Self {
        Self {
            weight_kg: self.weight_kg.filter(|w| *w > 0.0).or(Some(WORKOUT_WEIGHT_KG)),
            age: self.age.filter(|a| *a > 0).or(Some(WORKOUT_AGE)),
            gender: self.gender,
        }
    }
}

/// Calorie estimate for a workout, with missing profile data and heart rate
/// replaced by the workout defaults. Only a zero duration yields 0.
pub fn workout_calories(profile: &AthleteProfile, duration_min: f64, avg_hr: Option<f64>) -> u32 {
    let hr = avg_hr.filter(|hr| *hr > 0.0).unwrap_or(WORKOUT_HEART_RATE);
    estimate_calories(&profile.or_workout_defaults(), duration_min, Some(hr))
}

/// Formats a pace as `m:ss` per kilometer.
///
/// Returns `"--:--"` for a missing or non-positive speed.
pub fn format_pace(speed_mps: Option<f64>) -> String {
    let speed = match speed_mps {
        Some(s) if s > 0.0 && s.is_finite() => s,
        _ => return NO_PACE.to_string(),
    };

    let mins_per_km = PACE_FACTOR / speed;
    let mins = mins_per_km.floor();
    let secs = ((mins_per_km - mins) * 60.0).floor();

    format!("{}:{:02}", mins as u64, secs as u64)
}

/// Estimates energy expenditure in kcal with the Keytel equations.
///
/// Returns 0 when weight, duration or heart rate is missing (or zero).
/// Negative estimates clamp to 0.
pub fn estimate_calories(profile: &AthleteProfile, duration_min: f64, avg_hr: Option<f64>) -> u32 {
    let (Some(weight), Some(hr)) = (
        profile.weight_kg.filter(|w| *w > 0.0),
        avg_hr.filter(|hr| *hr > 0.0),
    ) else {
        return 0;
    };
    if duration_min <= 0.0 {
        return 0;
    }

    let age = f64::from(profile.age.filter(|a| *a > 0).unwrap_or(DEFAULT_AGE));

    let per_minute = match profile.gender {
        Gender::Female => 0.4472 * hr - 0.1263 * weight + 0.074 * age - 20.4022,
        Gender::Male => 0.6309 * hr + 0.1988 * weight + 0.2017 * age - 55.0969,
    };

    (per_minute * duration_min / KJ_PER_KCAL).round().max(0.0) as u32
}

/// `"N m"` below one kilometer, `"N.NN km"` otherwise.
pub fn format_distance(km: f64) -> String {
    if km < 1.0 {
        format!("{:.0} m", km * 1000.0)
    } else {
        format!("{:.2} km", km)
    }
}

/// `"MM:SS"`, or `"HH:MM:SS"` from one hour on.
pub fn format_duration(secs: u64) -> String {
    let hrs = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hrs > 0 {
        format!("{:02}:{:02}:{:02}", hrs, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

/// Mean speed over an interval, `None` when no time has passed.
pub fn average_speed_mps(distance_m: f64, elapsed_secs: f64) -> Option<f64> {
    (elapsed_secs > 0.0).then(|| distance_m / elapsed_secs)
}

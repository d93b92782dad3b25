//! Metric identifiers carried on generated records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Daily metric stored on every [`BiometricRecord`](crate::record::BiometricRecord).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    SleepDurationHours,
    DeepSleepMinutes,
    RemSleepMinutes,
    CoreSleepMinutes,
    AwakeMinutes,
    DailySteps,
    ActiveCalories,
    DistanceKm,
    RespiratoryRate,
    Spo2,
    RestingHeartRate,
    HrvSdnn,
}

impl Metric {
    pub const ALL: [Metric; 12] = [
        Self::SleepDurationHours,
        Self::DeepSleepMinutes,
        Self::RemSleepMinutes,
        Self::CoreSleepMinutes,
        Self::AwakeMinutes,
        Self::DailySteps,
        Self::ActiveCalories,
        Self::DistanceKm,
        Self::RespiratoryRate,
        Self::Spo2,
        Self::RestingHeartRate,
        Self::HrvSdnn,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::SleepDurationHours => "sleep_duration_hours",
            Self::DeepSleepMinutes => "deep_sleep_minutes",
            Self::RemSleepMinutes => "rem_sleep_minutes",
            Self::CoreSleepMinutes => "core_sleep_minutes",
            Self::AwakeMinutes => "awake_minutes",
            Self::DailySteps => "daily_steps",
            Self::ActiveCalories => "active_calories",
            Self::DistanceKm => "distance_km",
            Self::RespiratoryRate => "respiratory_rate",
            Self::Spo2 => "spo2",
            Self::RestingHeartRate => "resting_heart_rate",
            Self::HrvSdnn => "hrv_sdnn",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Metric sampled at specific hours of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HourlyMetric {
    HeartRate,
    Hrv,
    Steps,
}

impl HourlyMetric {
    pub const ALL: [HourlyMetric; 3] = [Self::HeartRate, Self::Hrv, Self::Steps];

    pub fn name(self) -> &'static str {
        match self {
            Self::HeartRate => "heart_rate",
            Self::Hrv => "hrv",
            Self::Steps => "steps",
        }
    }
}

impl fmt::Display for HourlyMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_names_match_display() {
        for m in Metric::ALL {
            let json = serde_json::to_string(&m).unwrap();
            assert_eq!(json, format!("\"{}\"", m.name()));
        }
        for m in HourlyMetric::ALL {
            let json = serde_json::to_string(&m).unwrap();
            assert_eq!(json, format!("\"{}\"", m.name()));
        }
    }
}

//! Generated daily records.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::metric::{HourlyMetric, Metric};
use crate::strata::{ActivityLevel, AgeBand, Sex, StratumKey};

/// Hours of the day at which intraday sub-samples are taken.
pub const SAMPLE_HOURS: [u8; 4] = [7, 12, 18, 22];

/// Hour-tagged sub-sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlySample {
    pub hour: u8,
    #[serde(flatten)]
    pub values: BTreeMap<HourlyMetric, f64>,
}

/// One entity's metrics for one calendar day.
///
/// Stratum labels are copied from the entity so aggregation never has to
/// join back to the cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricRecord {
    pub person_id: String,
    pub date: NaiveDate,
    #[serde(rename = "age_group")]
    pub age_band: AgeBand,
    pub sex: Sex,
    pub activity_level: ActivityLevel,
    #[serde(flatten)]
    pub metrics: BTreeMap<Metric, f64>,
    pub hourly_samples: Vec<HourlySample>,
}

impl BiometricRecord {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }

    pub fn stratum_key(&self) -> StratumKey {
        StratumKey {
            age: Some(self.age_band),
            sex: Some(self.sex),
            activity: Some(self.activity_level),
        }
    }

    /// Deep + REM + core + awake minutes.
    pub fn stage_minutes_total(&self) -> f64 {
        [
            Metric::DeepSleepMinutes,
            Metric::RemSleepMinutes,
            Metric::CoreSleepMinutes,
            Metric::AwakeMinutes,
        ]
        .into_iter()
        .filter_map(|m| self.get(m))
        .sum()
    }
}

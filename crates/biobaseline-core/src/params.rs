//! Population parameter table: (parameter, stratum) → distribution.
//!
//! Lookups are layered. [`ParameterTable::lookup`] walks
//! [`StratumKey::fallbacks`] from the most specific key to the unconditional
//! one and stops at the first entry present, so the fallback order is a
//! property of the key type and can be tested on its own. A parameter with
//! no entry at any level is a configuration error, never a silent default.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metric::Metric;
use crate::strata::{ActivityLevel, AgeBand, Sex, StratumKey};

/// Modelled quantity with its own distribution family in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    /// SDNN heart rate variability, ms.
    HrvSdnn,
    /// Resting heart rate, bpm.
    RestingHr,
    /// Total sleep, hours.
    SleepDuration,
    /// Fraction of total sleep spent in deep sleep.
    SleepStageDeep,
    SleepStageRem,
    SleepStageCore,
    SleepStageAwake,
    DailySteps,
    /// Active energy, kcal.
    ActiveCalories,
    /// Breaths per minute.
    RespiratoryRate,
    /// Blood oxygen saturation, %.
    Spo2,
    /// Walking/running distance, km.
    DistanceKm,
}

impl Parameter {
    pub const ALL: [Parameter; 12] = [
        Self::HrvSdnn,
        Self::RestingHr,
        Self::SleepDuration,
        Self::SleepStageDeep,
        Self::SleepStageRem,
        Self::SleepStageCore,
        Self::SleepStageAwake,
        Self::DailySteps,
        Self::ActiveCalories,
        Self::RespiratoryRate,
        Self::Spo2,
        Self::DistanceKm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::HrvSdnn => "hrv_sdnn",
            Self::RestingHr => "resting_hr",
            Self::SleepDuration => "sleep_duration",
            Self::SleepStageDeep => "sleep_stage_deep",
            Self::SleepStageRem => "sleep_stage_rem",
            Self::SleepStageCore => "sleep_stage_core",
            Self::SleepStageAwake => "sleep_stage_awake",
            Self::DailySteps => "daily_steps",
            Self::ActiveCalories => "active_calories",
            Self::RespiratoryRate => "respiratory_rate",
            Self::Spo2 => "spo2",
            Self::DistanceKm => "distance_km",
        }
    }

    /// Record metric this parameter describes directly, if any.
    pub fn metric(self) -> Option<Metric> {
        match self {
            Self::HrvSdnn => Some(Metric::HrvSdnn),
            Self::RestingHr => Some(Metric::RestingHeartRate),
            Self::SleepDuration => Some(Metric::SleepDurationHours),
            Self::DailySteps => Some(Metric::DailySteps),
            Self::ActiveCalories => Some(Metric::ActiveCalories),
            Self::RespiratoryRate => Some(Metric::RespiratoryRate),
            Self::Spo2 => Some(Metric::Spo2),
            Self::DistanceKm => Some(Metric::DistanceKm),
            Self::SleepStageDeep
            | Self::SleepStageRem
            | Self::SleepStageCore
            | Self::SleepStageAwake => None,
        }
    }

    /// Name used for this parameter in baseline output.
    pub fn output_name(self) -> &'static str {
        self.metric().map_or(self.name(), Metric::name)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

/// Normal distribution with optional explicit bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub mean: f64,
    pub std: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Sample size the literature value was fit on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<usize>,
}

impl Distribution {
    /// Width of the soft bounds used when explicit bounds are absent.
    pub const SOFT_BOUND_SIGMAS: f64 = 3.0;

    pub fn new(mean: f64, std: f64) -> Self {
        Self {
            mean,
            std,
            min: None,
            max: None,
            n: None,
        }
    }

    pub fn bounded(mean: f64, std: f64, min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..Self::new(mean, std)
        }
    }

    /// Explicit bounds where declared, `mean ± 3σ` otherwise.
    pub fn bounds(&self) -> (f64, f64) {
        let soft = Self::SOFT_BOUND_SIGMAS * self.std;
        (
            self.min.unwrap_or(self.mean - soft),
            self.max.unwrap_or(self.mean + soft),
        )
    }

    fn check(&self) -> std::result::Result<(), String> {
        if !self.mean.is_finite() {
            return Err(format!("mean {} is not finite", self.mean));
        }
        if !self.std.is_finite() || self.std < 0.0 {
            return Err(format!("std {} must be finite and >= 0", self.std));
        }
        match (self.min, self.max) {
            (Some(lo), Some(hi)) if lo > hi => Err(format!("min {lo} exceeds max {hi}")),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Metric declarations
// ---------------------------------------------------------------------------

/// Unit, hard valid range and reference thresholds of a record metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub unit: String,
    /// Hard physiological floor; generated values never fall below it.
    pub floor: f64,
    /// Hard physiological ceiling; generated values never exceed it.
    pub ceiling: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<String, String>,
}

impl MetricSpec {
    pub fn new(unit: &str, floor: f64, ceiling: f64) -> Self {
        Self {
            unit: unit.to_string(),
            floor,
            ceiling,
            thresholds: BTreeMap::new(),
        }
    }

    pub fn with_threshold(mut self, label: &str, range: &str) -> Self {
        self.thresholds.insert(label.to_string(), range.to_string());
        self
    }

    /// Clamp into `[floor, ceiling]`.
    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(self.floor, self.ceiling)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.floor && value <= self.ceiling
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Static (parameter, stratum) → distribution mapping plus metric metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterTable {
    pub distributions: BTreeMap<Parameter, BTreeMap<StratumKey, Distribution>>,
    pub metrics: BTreeMap<Metric, MetricSpec>,
}

impl ParameterTable {
    /// Load a table payload from a JSON file and validate it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let table: Self = serde_json::from_str(&text)?;
        table.validate()?;
        Ok(table)
    }

    pub fn insert(&mut self, parameter: Parameter, key: StratumKey, dist: Distribution) {
        self.distributions
            .entry(parameter)
            .or_default()
            .insert(key, dist);
    }

    /// Exact entry, no fallback.
    pub fn get(&self, parameter: Parameter, key: &StratumKey) -> Option<&Distribution> {
        self.distributions.get(&parameter)?.get(key)
    }

    /// First entry along `key`'s fallback chain, with the key it was found at.
    pub fn lookup(
        &self,
        parameter: Parameter,
        key: &StratumKey,
    ) -> Option<(StratumKey, &Distribution)> {
        key.fallbacks()
            .into_iter()
            .find_map(|k| self.get(parameter, &k).map(|d| (k, d)))
    }

    /// Like [`lookup`](Self::lookup) but a miss is a configuration error.
    pub fn resolve(&self, parameter: Parameter, key: &StratumKey) -> Result<&Distribution> {
        self.lookup(parameter, key)
            .map(|(_, d)| d)
            .ok_or_else(|| Error::MissingDistribution {
                parameter: parameter.to_string(),
                stratum: key.to_string(),
            })
    }

    pub fn metric_spec(&self, metric: Metric) -> Result<&MetricSpec> {
        self.metrics
            .get(&metric)
            .ok_or_else(|| Error::MissingMetricSpec {
                metric: metric.to_string(),
            })
    }

    /// Check every distribution and that every record metric has a valid range.
    pub fn validate(&self) -> Result<()> {
        for (parameter, strata) in &self.distributions {
            for (key, dist) in strata {
                dist.check().map_err(|reason| Error::InvalidDistribution {
                    parameter: parameter.to_string(),
                    stratum: key.to_string(),
                    reason,
                })?;
            }
        }
        for metric in Metric::ALL {
            let spec = self.metric_spec(metric)?;
            if !spec.floor.is_finite() || !spec.ceiling.is_finite() || spec.floor > spec.ceiling {
                return Err(Error::InvalidRange {
                    metric: metric.to_string(),
                    min: spec.floor,
                    max: spec.ceiling,
                });
            }
        }
        Ok(())
    }

    /// Literature defaults.
    ///
    /// HRV: Shaffer & Ginsberg (2017), Nunan et al. (2010). Sleep duration:
    /// Ohayon et al. (2017). Activity and resting heart rate: wearable cohort
    /// meta-analyses (Quer et al. 2020).
    pub fn literature() -> Self {
        use ActivityLevel::*;
        use AgeBand::*;
        use Sex::*;

        let mut t = Self::default();

        let hrv = [
            (A18To29, (55.0, 20.0), (50.0, 18.0)),
            (A30To39, (50.0, 18.0), (45.0, 16.0)),
            (A40To49, (42.0, 15.0), (40.0, 14.0)),
            (A50To59, (35.0, 12.0), (35.0, 12.0)),
            (A60To69, (30.0, 10.0), (30.0, 10.0)),
            (A70Plus, (25.0, 8.0), (25.0, 8.0)),
        ];
        for (age, (mm, ms), (fm, fs)) in hrv {
            t.insert(Parameter::HrvSdnn, StratumKey::age_sex(age, Male), Distribution::new(mm, ms));
            t.insert(Parameter::HrvSdnn, StratumKey::age_sex(age, Female), Distribution::new(fm, fs));
        }

        let sleep = [
            (A18To29, 7.2, 1.2),
            (A30To39, 7.0, 1.1),
            (A40To49, 6.8, 1.0),
            (A50To59, 6.6, 1.0),
            (A60To69, 6.5, 1.1),
            (A70Plus, 6.3, 1.2),
        ];
        for (age, mean, std) in sleep {
            t.insert(Parameter::SleepDuration, StratumKey::age(age), Distribution::new(mean, std));
        }

        let by_activity = [
            (Parameter::RestingHr, [(75.0, 8.0), (68.0, 7.0), (62.0, 6.0), (55.0, 5.0)]),
            (
                Parameter::DailySteps,
                [(3500.0, 1500.0), (7000.0, 2000.0), (10000.0, 2500.0), (14000.0, 3000.0)],
            ),
            (
                Parameter::ActiveCalories,
                [(200.0, 80.0), (400.0, 120.0), (600.0, 150.0), (900.0, 200.0)],
            ),
            (Parameter::DistanceKm, [(2.5, 1.2), (5.0, 1.8), (8.0, 2.5), (12.0, 3.5)]),
        ];
        for (parameter, rows) in by_activity {
            for (level, (mean, std)) in [Sedentary, Moderate, Active, Athletic].into_iter().zip(rows) {
                t.insert(parameter, StratumKey::activity(level), Distribution::new(mean, std));
            }
        }

        let global = StratumKey::GLOBAL;
        t.insert(Parameter::SleepStageDeep, global, Distribution::new(0.15, 0.05));
        t.insert(Parameter::SleepStageRem, global, Distribution::new(0.22, 0.04));
        t.insert(Parameter::SleepStageCore, global, Distribution::new(0.50, 0.08));
        t.insert(Parameter::SleepStageAwake, global, Distribution::new(0.08, 0.03));
        t.insert(Parameter::RespiratoryRate, global, Distribution::new(14.0, 2.0));
        t.insert(Parameter::Spo2, global, Distribution::bounded(97.5, 1.0, 94.0, 100.0));

        let minutes = || MetricSpec::new("min", 0.0, 720.0);
        t.metrics = BTreeMap::from([
            (
                Metric::SleepDurationHours,
                MetricSpec::new("h", 3.0, 12.0).with_threshold("recommended", "7-9"),
            ),
            (Metric::DeepSleepMinutes, minutes()),
            (Metric::RemSleepMinutes, minutes()),
            (Metric::CoreSleepMinutes, minutes()),
            (Metric::AwakeMinutes, minutes()),
            (
                Metric::DailySteps,
                MetricSpec::new("steps", 500.0, 60000.0)
                    .with_threshold("sedentary", "<5000")
                    .with_threshold("active", ">=10000"),
            ),
            (Metric::ActiveCalories, MetricSpec::new("kcal", 50.0, 5000.0)),
            (Metric::DistanceKm, MetricSpec::new("km", 0.0, 60.0)),
            (
                Metric::RespiratoryRate,
                MetricSpec::new("breaths/min", 8.0, 22.0).with_threshold("normal", "12-20"),
            ),
            (
                Metric::Spo2,
                MetricSpec::new("%", 94.0, 100.0)
                    .with_threshold("normal", ">=95")
                    .with_threshold("low", "<95"),
            ),
            (
                Metric::RestingHeartRate,
                MetricSpec::new("bpm", 40.0, 100.0)
                    .with_threshold("normal", "60-100")
                    .with_threshold("bradycardia", "<60"),
            ),
            (Metric::HrvSdnn, MetricSpec::new("ms", 10.0, 250.0)),
        ]);
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literature_validates() {
        ParameterTable::literature().validate().unwrap();
    }

    #[test]
    fn test_lookup_prefers_most_specific() {
        let t = ParameterTable::literature();
        let key = StratumKey {
            age: Some(AgeBand::A30To39),
            sex: Some(Sex::Female),
            activity: Some(ActivityLevel::Active),
        };
        let (found, d) = t.lookup(Parameter::HrvSdnn, &key).unwrap();
        assert_eq!(found, StratumKey::age_sex(AgeBand::A30To39, Sex::Female));
        assert_eq!(d.mean, 45.0);

        let (found, d) = t.lookup(Parameter::RestingHr, &key).unwrap();
        assert_eq!(found, StratumKey::activity(ActivityLevel::Active));
        assert_eq!(d.mean, 62.0);
    }

    #[test]
    fn test_lookup_falls_back_to_global() {
        let t = ParameterTable::literature();
        let key = StratumKey::age_sex(AgeBand::A70Plus, Sex::Male);
        let (found, d) = t.lookup(Parameter::RespiratoryRate, &key).unwrap();
        assert!(found.is_global());
        assert_eq!(d.mean, 14.0);
    }

    #[test]
    fn test_stratum_override_beats_global() {
        let mut t = ParameterTable::literature();
        t.insert(
            Parameter::RespiratoryRate,
            StratumKey::sex(Sex::Female),
            Distribution::new(15.0, 2.0),
        );
        let female = StratumKey::age_sex(AgeBand::A18To29, Sex::Female);
        let male = StratumKey::age_sex(AgeBand::A18To29, Sex::Male);
        assert_eq!(t.resolve(Parameter::RespiratoryRate, &female).unwrap().mean, 15.0);
        assert_eq!(t.resolve(Parameter::RespiratoryRate, &male).unwrap().mean, 14.0);
    }

    #[test]
    fn test_missing_distribution_is_error() {
        let mut t = ParameterTable::literature();
        t.distributions.remove(&Parameter::HrvSdnn);
        let key = StratumKey::age_sex(AgeBand::A18To29, Sex::Male);
        let err = t.resolve(Parameter::HrvSdnn, &key).unwrap_err();
        assert!(matches!(err, Error::MissingDistribution { .. }), "{err}");
    }

    #[test]
    fn test_negative_std_rejected() {
        let mut t = ParameterTable::literature();
        t.insert(Parameter::Spo2, StratumKey::GLOBAL, Distribution::new(97.0, -1.0));
        assert!(matches!(
            t.validate().unwrap_err(),
            Error::InvalidDistribution { .. }
        ));
    }

    #[test]
    fn test_missing_metric_spec_rejected() {
        let mut t = ParameterTable::literature();
        t.metrics.remove(&Metric::Spo2);
        assert!(matches!(
            t.validate().unwrap_err(),
            Error::MissingMetricSpec { .. }
        ));
    }

    #[test]
    fn test_soft_bounds() {
        let d = Distribution::new(10.0, 2.0);
        assert_eq!(d.bounds(), (4.0, 16.0));
        let d = Distribution::bounded(97.5, 1.0, 94.0, 100.0);
        assert_eq!(d.bounds(), (94.0, 100.0));
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let t = ParameterTable::literature();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, serde_json::to_string_pretty(&t).unwrap()).unwrap();
        let back = ParameterTable::from_path(&path).unwrap();
        assert_eq!(back, t);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"30-39/female\""));
        assert!(text.contains("\"sedentary\""));
    }
}

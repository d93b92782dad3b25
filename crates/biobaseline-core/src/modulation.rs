//! Circadian (hour-of-day) and calendar (day-of-week) multiplier curves.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Named hour-of-day curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircadianCurve {
    HeartRate,
    Hrv,
    /// Relative activity intensity; also used to distribute daily steps by hour.
    Activity,
}

impl fmt::Display for CircadianCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeartRate => write!(f, "heart_rate"),
            Self::Hrv => write!(f, "hrv"),
            Self::Activity => write!(f, "activity"),
        }
    }
}

/// Named day-of-week curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarCurve {
    /// Steps and active energy.
    Steps,
    Sleep,
}

impl fmt::Display for CalendarCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Steps => write!(f, "steps"),
            Self::Sleep => write!(f, "sleep"),
        }
    }
}

/// Per-hour multipliers for named curves. Each curve has exactly 24 entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CircadianModel {
    curves: BTreeMap<CircadianCurve, Vec<f64>>,
}

impl CircadianModel {
    pub const HOURS: usize = 24;

    pub fn new(curves: BTreeMap<CircadianCurve, Vec<f64>>) -> Result<Self> {
        let model = Self { curves };
        model.validate()?;
        Ok(model)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&text)?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<()> {
        validate_curves(&self.curves, Self::HOURS)
    }

    /// Multiplier of `curve` at `hour` (0–23).
    pub fn multiplier(&self, curve: CircadianCurve, hour: u8) -> Result<f64> {
        let values = self.curve(curve)?;
        values
            .get(usize::from(hour))
            .copied()
            .ok_or_else(|| Error::MalformedCurve {
                curve: curve.to_string(),
                expected: Self::HOURS,
                got: values.len(),
            })
    }

    pub fn curve(&self, curve: CircadianCurve) -> Result<&[f64]> {
        self.curves
            .get(&curve)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::MissingCurve {
                curve: curve.to_string(),
            })
    }

    /// Defaults from wearable heart-rate and activity studies.
    pub fn literature() -> Self {
        Self {
            curves: BTreeMap::from([
                (
                    CircadianCurve::HeartRate,
                    vec![
                        0.92, 0.90, 0.88, 0.87, 0.86, 0.88, // 00-05 asleep
                        0.92, 0.98, 1.02, 1.05, 1.06, 1.05, // 06-11
                        1.04, 1.03, 1.05, 1.08, 1.10, 1.08, // 12-17
                        1.05, 1.02, 0.98, 0.95, 0.94, 0.93, // 18-23
                    ],
                ),
                (
                    CircadianCurve::Hrv,
                    vec![
                        1.15, 1.18, 1.20, 1.22, 1.20, 1.15, //
                        1.05, 0.95, 0.88, 0.85, 0.85, 0.88, //
                        0.90, 0.92, 0.88, 0.85, 0.85, 0.88, //
                        0.92, 0.95, 1.00, 1.05, 1.10, 1.12, //
                    ],
                ),
                (
                    CircadianCurve::Activity,
                    vec![
                        0.05, 0.02, 0.01, 0.01, 0.02, 0.05, //
                        0.15, 0.25, 0.40, 0.55, 0.60, 0.50, //
                        0.45, 0.55, 0.60, 0.65, 0.70, 0.75, //
                        0.65, 0.50, 0.35, 0.20, 0.10, 0.08, //
                    ],
                ),
            ]),
        }
    }
}

/// Per-weekday multipliers (Monday first). Each curve has exactly 7 entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarModel {
    curves: BTreeMap<CalendarCurve, Vec<f64>>,
}

impl CalendarModel {
    pub const DAYS: usize = 7;

    pub fn new(curves: BTreeMap<CalendarCurve, Vec<f64>>) -> Result<Self> {
        let model = Self { curves };
        model.validate()?;
        Ok(model)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&text)?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<()> {
        validate_curves(&self.curves, Self::DAYS)
    }

    /// Multiplier of `curve` on the weekday of `date`.
    pub fn multiplier(&self, curve: CalendarCurve, date: NaiveDate) -> Result<f64> {
        let values = self
            .curves
            .get(&curve)
            .ok_or_else(|| Error::MissingCurve {
                curve: curve.to_string(),
            })?;
        let idx = date.weekday().num_days_from_monday() as usize;
        values.get(idx).copied().ok_or_else(|| Error::MalformedCurve {
            curve: curve.to_string(),
            expected: Self::DAYS,
            got: values.len(),
        })
    }

    /// Office-worker weekly rhythm: fewer steps and longer sleep at weekends.
    pub fn literature() -> Self {
        Self {
            curves: BTreeMap::from([
                (
                    CalendarCurve::Steps,
                    vec![0.85, 1.00, 1.00, 1.00, 0.95, 0.80, 0.75],
                ),
                (
                    CalendarCurve::Sleep,
                    vec![0.95, 1.00, 1.00, 1.00, 1.00, 1.15, 1.10],
                ),
            ]),
        }
    }
}

fn validate_curves<K: fmt::Display>(curves: &BTreeMap<K, Vec<f64>>, len: usize) -> Result<()> {
    for (name, values) in curves {
        if values.len() != len {
            return Err(Error::MalformedCurve {
                curve: name.to_string(),
                expected: len,
                got: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::MalformedCurve {
                curve: format!("{name} (negative or non-finite multiplier)"),
                expected: len,
                got: values.len(),
            });
        }
    }
    Ok(())
}

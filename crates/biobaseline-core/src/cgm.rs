//! Continuous glucose monitoring around an external simulator.
//!
//! The physiological simulator itself is not part of this crate. It is driven
//! only through [`GlucoseSimulator`]: reset with a meal scenario, then step
//! once per 5-minute sample with an insulin [`Action`]. This module owns the
//! controller side, scenario construction, sensor noise, and the labelling
//! and pattern summaries applied to the resulting readings.
//!
//! Nothing in the baseline pipeline or the CLI calls into this module; it is
//! exposed for callers that bring their own simulator.

use std::fmt;

use biobaseline_stats::{Empirical, Summarize};
use chrono::{Duration, NaiveDateTime, Timelike};
use log::debug;
use rand::Rng;
use rand_distr::{Distribution as _, Normal};
use serde::{Deserialize, Serialize};

/// Samples per simulated day at 5-minute resolution.
pub const STEPS_PER_DAY: u32 = 288;
pub const SAMPLE_MINUTES: i64 = 5;
/// mg/dL per mmol/L.
pub const MG_DL_PER_MMOL_L: f64 = 18.0182;
pub const SENSOR_NOISE_SD: f64 = 2.0;
pub const SENSOR_FLOOR: f64 = 40.0;
pub const SENSOR_CEILING: f64 = 400.0;
const TREND_WINDOW: usize = 3;
const RAPID_CHANGE_MG_DL: f64 = 30.0;
const SAMPLE_LIMIT: usize = 10;
pub const SOURCE: &str = "simglucose_synthetic";

// ═══════════════════════════════════════════════════════════════════════════════
// Simulator interface
// ═══════════════════════════════════════════════════════════════════════════════

/// Insulin delivery for one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// U/h.
    pub basal: f64,
    /// U.
    pub bolus: f64,
}

/// What the simulator reports after a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Sensor glucose, mg/dL. May be non-finite or zero when no reading.
    pub cgm: f64,
    pub done: bool,
}

/// Observation/action boundary of an external glucose simulator.
pub trait GlucoseSimulator {
    fn reset(&mut self, scenario: &MealScenario) -> Observation;
    fn step(&mut self, action: Action) -> Observation;
}

/// Chooses insulin delivery from the latest observation.
pub trait Controller {
    fn policy(&mut self, observation: &Observation) -> Action;
    fn reset(&mut self) {}
}

/// Constant basal rate, never boluses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasalController {
    pub basal_rate: f64,
}

impl BasalController {
    pub fn new(basal_rate: f64) -> Self {
        Self { basal_rate }
    }

    /// Basal rate drawn uniformly from [0.3, 0.8) U/h.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::new(rng.random_range(0.3..0.8))
    }
}

impl Controller for BasalController {
    fn policy(&mut self, _observation: &Observation) -> Action {
        Action {
            basal: self.basal_rate,
            bolus: 0.0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Meal scenarios
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    Normal,
    HighCarb,
    LowCarb,
    SkippedMeals,
    ExerciseDay,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 5] = [
        Self::Normal,
        Self::HighCarb,
        Self::LowCarb,
        Self::SkippedMeals,
        Self::ExerciseDay,
    ];

    /// Nominal (hour, carbs in g) of each meal.
    pub fn meals(self) -> &'static [(u32, f64)] {
        match self {
            Self::Normal => &[(7, 45.0), (12, 70.0), (18, 80.0)],
            Self::HighCarb => &[
                (7, 80.0),
                (10, 30.0),
                (12, 120.0),
                (15, 40.0),
                (18, 100.0),
                (21, 25.0),
            ],
            Self::LowCarb => &[(8, 20.0), (13, 35.0), (19, 40.0)],
            Self::SkippedMeals => &[(7, 50.0), (19, 90.0)],
            Self::ExerciseDay => &[(6, 60.0), (11, 50.0), (14, 30.0), (18, 70.0)],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::HighCarb => "high_carb",
            Self::LowCarb => "low_carb",
            Self::SkippedMeals => "skipped_meals",
            Self::ExerciseDay => "exercise_day",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub time: NaiveDateTime,
    pub carbs: f64,
}

/// Meals on the first simulated day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealScenario {
    pub kind: ScenarioKind,
    pub start: NaiveDateTime,
    pub meals: Vec<Meal>,
}

impl MealScenario {
    /// Jittered scenario: each meal moves 0–30 min past its hour and its
    /// carbs shift by up to ±10 g.
    pub fn generate<R: Rng + ?Sized>(kind: ScenarioKind, start: NaiveDateTime, rng: &mut R) -> Self {
        let midnight = start.date().and_time(chrono::NaiveTime::MIN);
        let meals = kind
            .meals()
            .iter()
            .map(|&(hour, carbs)| {
                let minute = rng.random_range(0..=30);
                Meal {
                    time: midnight + Duration::minutes(i64::from(hour) * 60 + minute),
                    carbs: (carbs + f64::from(rng.random_range(-10..=10))).max(0.0),
                }
            })
            .collect();
        Self { kind, start, meals }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Readings and labels
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    RisingFast,
    Rising,
    Stable,
    Falling,
    FallingFast,
}

/// Trend of the last three readings by mean rate of change.
///
/// Rate is `(last - first) / 15` mg/dL/min; fewer than three readings is
/// stable.
pub fn trend(history: &[f64]) -> Trend {
    if history.len() < TREND_WINDOW {
        return Trend::Stable;
    }
    let recent = &history[history.len() - TREND_WINDOW..];
    let rate = (recent[TREND_WINDOW - 1] - recent[0]) / (TREND_WINDOW as f64 * SAMPLE_MINUTES as f64);
    if rate > 3.0 {
        Trend::RisingFast
    } else if rate > 1.0 {
        Trend::Rising
    } else if rate < -3.0 {
        Trend::FallingFast
    } else if rate < -1.0 {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeLabel {
    SevereHypo,
    Hypo,
    Normal,
    Hyper,
    SevereHyper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub is_hypo: bool,
    pub is_severe_hypo: bool,
    pub is_hyper: bool,
    pub is_severe_hyper: bool,
    pub is_in_range: bool,
    pub range_label: RangeLabel,
}

pub fn classify(mg_dl: f64) -> Classification {
    let range_label = if mg_dl < 54.0 {
        RangeLabel::SevereHypo
    } else if mg_dl < 70.0 {
        RangeLabel::Hypo
    } else if mg_dl <= 180.0 {
        RangeLabel::Normal
    } else if mg_dl <= 250.0 {
        RangeLabel::Hyper
    } else {
        RangeLabel::SevereHyper
    };
    Classification {
        is_hypo: mg_dl < 70.0,
        is_severe_hypo: mg_dl < 54.0,
        is_hyper: mg_dl > 180.0,
        is_severe_hyper: mg_dl > 250.0,
        is_in_range: (70.0..=180.0).contains(&mg_dl),
        range_label,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReading {
    pub glucose_mg_dl: f64,
    pub glucose_mmol_l: f64,
    pub timestamp: NaiveDateTime,
    pub patient_type: String,
    pub scenario: ScenarioKind,
    pub source: String,
    pub trend: Trend,
    #[serde(flatten)]
    pub classification: Classification,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Drive `simulator` for `days` of 5-minute steps and collect sensor readings.
///
/// Each valid simulator reading gets N(0, 2²) sensor noise and is clipped to
/// the sensor range. Steps with a non-finite or non-positive reading advance
/// the clock without emitting anything. Stops early when the simulator
/// reports `done`.
pub fn simulate<S, C, R>(
    simulator: &mut S,
    controller: &mut C,
    scenario: &MealScenario,
    days: u32,
    patient_type: &str,
    rng: &mut R,
) -> Vec<GlucoseReading>
where
    S: GlucoseSimulator + ?Sized,
    C: Controller + ?Sized,
    R: Rng + ?Sized,
{
    let noise = Normal::new(0.0, SENSOR_NOISE_SD).ok();
    let total = days * STEPS_PER_DAY;
    let mut readings: Vec<GlucoseReading> = Vec::with_capacity(total as usize);
    let mut history: Vec<f64> = Vec::with_capacity(total as usize);
    let mut now = scenario.start;

    controller.reset();
    let mut observation = simulator.reset(scenario);
    for _ in 0..total {
        let action = controller.policy(&observation);
        observation = simulator.step(action);

        let raw = observation.cgm;
        if raw.is_finite() && raw > 0.0 {
            let jitter = noise.as_ref().map_or(0.0, |n| n.sample(rng));
            let mg_dl = round_to((raw + jitter).clamp(SENSOR_FLOOR, SENSOR_CEILING), 1);
            readings.push(GlucoseReading {
                glucose_mg_dl: mg_dl,
                glucose_mmol_l: round_to(mg_dl / MG_DL_PER_MMOL_L, 2),
                timestamp: now,
                patient_type: patient_type.to_string(),
                scenario: scenario.kind,
                source: SOURCE.to_string(),
                trend: trend(&history),
                classification: classify(mg_dl),
            });
            history.push(mg_dl);
        }

        now += Duration::minutes(SAMPLE_MINUTES);
        if observation.done {
            debug!("simulator finished early at {now}");
            break;
        }
    }
    readings
}

// ═══════════════════════════════════════════════════════════════════════════════
// Summaries
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Moderate,
    Severe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Rising,
    Falling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseEvent {
    pub timestamp: NaiveDateTime,
    pub glucose: f64,
    pub severity: Severity,
    pub hour: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RapidChange {
    pub timestamp: NaiveDateTime,
    pub glucose: f64,
    pub delta: f64,
    pub direction: Direction,
}

/// Event counts over a reading sequence plus the first few of each kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub hypo_count: usize,
    pub hyper_count: usize,
    pub rapid_change_count: usize,
    pub dawn_phenomenon_count: usize,
    pub nocturnal_hypo_count: usize,
    pub sample_hypos: Vec<GlucoseEvent>,
    pub sample_hypers: Vec<GlucoseEvent>,
    pub sample_rapid_changes: Vec<RapidChange>,
}

/// Scan readings in order for hypo/hyper events, nocturnal hypos (00–06h),
/// dawn phenomenon (04–08h above 140 mg/dL), and rapid changes (more than
/// 30 mg/dL against the reading three positions back).
pub fn identify_patterns(readings: &[GlucoseReading]) -> PatternSummary {
    let mut summary = PatternSummary::default();
    for (i, r) in readings.iter().enumerate() {
        let g = r.glucose_mg_dl;
        let hour = r.timestamp.hour();

        if g < 70.0 {
            summary.hypo_count += 1;
            if summary.sample_hypos.len() < SAMPLE_LIMIT {
                summary.sample_hypos.push(GlucoseEvent {
                    timestamp: r.timestamp,
                    glucose: g,
                    severity: if g < 54.0 { Severity::Severe } else { Severity::Moderate },
                    hour,
                });
            }
            if hour <= 6 {
                summary.nocturnal_hypo_count += 1;
            }
        }

        if g > 180.0 {
            summary.hyper_count += 1;
            if summary.sample_hypers.len() < SAMPLE_LIMIT {
                summary.sample_hypers.push(GlucoseEvent {
                    timestamp: r.timestamp,
                    glucose: g,
                    severity: if g > 250.0 { Severity::Severe } else { Severity::Moderate },
                    hour,
                });
            }
        }

        if (4..=8).contains(&hour) && g > 140.0 {
            summary.dawn_phenomenon_count += 1;
        }

        if i >= TREND_WINDOW {
            let prev = readings[i - TREND_WINDOW].glucose_mg_dl;
            let delta = (g - prev).abs();
            if delta > RAPID_CHANGE_MG_DL {
                summary.rapid_change_count += 1;
                if summary.sample_rapid_changes.len() < SAMPLE_LIMIT {
                    summary.sample_rapid_changes.push(RapidChange {
                        timestamp: r.timestamp,
                        glucose: g,
                        delta,
                        direction: if g > prev { Direction::Rising } else { Direction::Falling },
                    });
                }
            }
        }
    }
    summary
}

/// Per-patient glucose summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub patient: String,
    pub scenario: ScenarioKind,
    pub readings_count: usize,
    pub mean_glucose: f64,
    pub std_glucose: f64,
    pub min_glucose: f64,
    pub max_glucose: f64,
    /// Percent of readings in 70–180 mg/dL.
    pub time_in_range: f64,
    pub hypo_events: usize,
    pub hyper_events: usize,
}

impl PatientSummary {
    /// `None` when there are no readings.
    pub fn from_readings(patient: &str, scenario: ScenarioKind, readings: &[GlucoseReading]) -> Option<Self> {
        let values = Empirical::new(readings.iter().map(|r| r.glucose_mg_dl));
        let stats = values.summarize()?;
        let n = values.count();
        let in_range = readings.iter().filter(|r| r.classification.is_in_range).count();
        Some(Self {
            patient: patient.to_string(),
            scenario,
            readings_count: n,
            mean_glucose: round_to(stats.mean, 1),
            std_glucose: round_to(stats.std, 1),
            min_glucose: stats.min.unwrap_or(stats.mean),
            max_glucose: stats.max.unwrap_or(stats.mean),
            time_in_range: round_to(in_range as f64 / n as f64 * 100.0, 1),
            hypo_events: readings.iter().filter(|r| r.classification.is_hypo).count(),
            hyper_events: readings.iter().filter(|r| r.classification.is_hyper).count(),
        })
    }
}

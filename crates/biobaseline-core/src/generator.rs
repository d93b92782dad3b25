//! Per-entity daily record generation.
//!
//! Each metric is drawn the same way: resolve the stratum distribution, scale
//! its mean by the entity's persistent offset and by any circadian/calendar
//! multiplier, add day-to-day noise proportional to the population spread,
//! then clip to the metric's hard range. Sleep stages and distance are
//! derived from already-generated totals.
//!
//! All randomness comes from the `rng` argument. The generator holds only
//! shared immutable tables, so one instance can serve every worker thread.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::warn;
use rand::Rng;
use rand_distr::{Distribution as _, Normal};

use crate::entity::{OffsetFamily, VirtualEntity};
use crate::error::Result;
use crate::metric::{HourlyMetric, Metric};
use crate::modulation::{CalendarCurve, CalendarModel, CircadianCurve, CircadianModel};
use crate::params::{Distribution, Parameter, ParameterTable};
use crate::record::{BiometricRecord, HourlySample, SAMPLE_HOURS};
use crate::strata::{Sex, StratumKey};

/// Hour whose heart-rate multiplier applies to the daily resting heart rate.
pub const RESTING_HR_HOUR: u8 = 7;
/// Hour whose HRV multiplier applies to the daily (overnight) HRV.
pub const HRV_HOUR: u8 = 3;

/// Non-finite draws are retried this many times before falling back to the mean.
const MAX_RESAMPLES: usize = 8;

/// How one directly sampled metric is drawn.
#[derive(Debug, Clone, Copy)]
struct DrawSpec {
    parameter: Parameter,
    metric: Metric,
    offset: Option<OffsetFamily>,
    circadian: Option<CircadianCurve>,
    calendar: Option<CalendarCurve>,
    /// Day-to-day noise as a fraction of the population std.
    noise: f64,
    /// Truncate to a whole number before clipping.
    integral: bool,
}

const HRV: DrawSpec = DrawSpec {
    parameter: Parameter::HrvSdnn,
    metric: Metric::HrvSdnn,
    offset: Some(OffsetFamily::Hrv),
    circadian: Some(CircadianCurve::Hrv),
    calendar: None,
    noise: 0.5,
    integral: false,
};

const HEART_RATE: DrawSpec = DrawSpec {
    parameter: Parameter::RestingHr,
    metric: Metric::RestingHeartRate,
    offset: Some(OffsetFamily::HeartRate),
    circadian: Some(CircadianCurve::HeartRate),
    calendar: None,
    noise: 0.3,
    integral: false,
};

const SLEEP: DrawSpec = DrawSpec {
    parameter: Parameter::SleepDuration,
    metric: Metric::SleepDurationHours,
    offset: Some(OffsetFamily::Sleep),
    circadian: None,
    calendar: Some(CalendarCurve::Sleep),
    noise: 0.3,
    integral: false,
};

const STEPS: DrawSpec = DrawSpec {
    parameter: Parameter::DailySteps,
    metric: Metric::DailySteps,
    offset: Some(OffsetFamily::Activity),
    circadian: None,
    calendar: Some(CalendarCurve::Steps),
    noise: 0.5,
    integral: true,
};

const CALORIES: DrawSpec = DrawSpec {
    parameter: Parameter::ActiveCalories,
    metric: Metric::ActiveCalories,
    offset: Some(OffsetFamily::Activity),
    circadian: None,
    calendar: Some(CalendarCurve::Steps),
    noise: 0.4,
    integral: false,
};

const RESPIRATORY: DrawSpec = DrawSpec {
    parameter: Parameter::RespiratoryRate,
    metric: Metric::RespiratoryRate,
    offset: None,
    circadian: None,
    calendar: None,
    noise: 1.0,
    integral: false,
};

const SPO2: DrawSpec = DrawSpec {
    parameter: Parameter::Spo2,
    metric: Metric::Spo2,
    offset: None,
    circadian: None,
    calendar: None,
    noise: 1.0,
    integral: false,
};

/// Sleep stage parameter, output metric and fraction floor.
const STAGES: [(Parameter, Metric, f64); 4] = [
    (Parameter::SleepStageDeep, Metric::DeepSleepMinutes, 0.05),
    (Parameter::SleepStageRem, Metric::RemSleepMinutes, 0.10),
    (Parameter::SleepStageCore, Metric::CoreSleepMinutes, 0.20),
    (Parameter::SleepStageAwake, Metric::AwakeMinutes, 0.02),
];

/// Parameters the generator resolves for every entity.
pub const GENERATED_PARAMETERS: [Parameter; 11] = [
    Parameter::HrvSdnn,
    Parameter::RestingHr,
    Parameter::SleepDuration,
    Parameter::SleepStageDeep,
    Parameter::SleepStageRem,
    Parameter::SleepStageCore,
    Parameter::SleepStageAwake,
    Parameter::DailySteps,
    Parameter::ActiveCalories,
    Parameter::RespiratoryRate,
    Parameter::Spo2,
];

/// Mean stride length in metres.
fn stride_m(sex: Sex) -> f64 {
    match sex {
        Sex::Female => 0.75,
        Sex::Male => 0.78,
    }
}

/// Produces one entity's record for one day.
#[derive(Debug, Clone, Copy)]
pub struct EntityGenerator<'a> {
    table: &'a ParameterTable,
    circadian: &'a CircadianModel,
    calendar: &'a CalendarModel,
    noise_fraction: Option<f64>,
}

impl<'a> EntityGenerator<'a> {
    pub fn new(
        table: &'a ParameterTable,
        circadian: &'a CircadianModel,
        calendar: &'a CalendarModel,
    ) -> Self {
        Self {
            table,
            circadian,
            calendar,
            noise_fraction: None,
        }
    }

    /// Replace the per-metric noise fraction of every offset-bearing metric.
    ///
    /// Metrics without an individual offset keep their full population
    /// spread as day-to-day noise.
    pub fn with_noise_fraction(mut self, fraction: Option<f64>) -> Self {
        self.noise_fraction = fraction;
        self
    }

    /// Resolve every generated parameter for each stratum, and every metric
    /// range and curve the generator reads, before any draw is made.
    pub fn check_strata(&self, strata: &[StratumKey]) -> Result<()> {
        for key in strata {
            for parameter in GENERATED_PARAMETERS {
                self.table.resolve(parameter, key)?;
            }
        }
        for metric in Metric::ALL {
            self.table.metric_spec(metric)?;
        }
        for curve in [CircadianCurve::HeartRate, CircadianCurve::Hrv, CircadianCurve::Activity] {
            self.circadian.curve(curve)?;
        }
        for curve in [CalendarCurve::Steps, CalendarCurve::Sleep] {
            self.calendar.multiplier(curve, NaiveDate::default())?;
        }
        Ok(())
    }

    /// Generate one day for `entity`.
    ///
    /// Deterministic for a given `rng` state; consecutive calls on the same
    /// stream yield different days.
    pub fn generate_day<R: Rng + ?Sized>(
        &self,
        entity: &VirtualEntity,
        date: NaiveDate,
        rng: &mut R,
    ) -> Result<BiometricRecord> {
        let key = entity.stratum_key();
        let mut metrics = BTreeMap::new();

        let sleep_hours = self.draw(&SLEEP, entity, &key, date, None, rng)?;
        metrics.insert(Metric::SleepDurationHours, sleep_hours);
        let total_minutes = sleep_hours * 60.0;
        let fractions = self.stage_fractions(&key, rng)?;
        for ((_, metric, _), fraction) in STAGES.iter().zip(fractions) {
            metrics.insert(*metric, total_minutes * fraction);
        }

        let steps = self.draw(&STEPS, entity, &key, date, None, rng)?;
        metrics.insert(Metric::DailySteps, steps);
        metrics.insert(
            Metric::ActiveCalories,
            self.draw(&CALORIES, entity, &key, date, None, rng)?,
        );
        let stride = stride_m(entity.sex()) * rng.random_range(0.9..1.1);
        let distance = self.table.metric_spec(Metric::DistanceKm)?;
        metrics.insert(Metric::DistanceKm, distance.clip(steps * stride / 1000.0));

        metrics.insert(
            Metric::RespiratoryRate,
            self.draw(&RESPIRATORY, entity, &key, date, None, rng)?,
        );
        metrics.insert(
            Metric::Spo2,
            self.draw(&SPO2, entity, &key, date, None, rng)?,
        );
        metrics.insert(
            Metric::RestingHeartRate,
            self.draw(&HEART_RATE, entity, &key, date, Some(RESTING_HR_HOUR), rng)?,
        );
        metrics.insert(
            Metric::HrvSdnn,
            self.draw(&HRV, entity, &key, date, Some(HRV_HOUR), rng)?,
        );

        let activity = self.circadian.curve(CircadianCurve::Activity)?;
        let activity_total: f64 = activity.iter().sum();
        let mut hourly_samples = Vec::with_capacity(SAMPLE_HOURS.len());
        for hour in SAMPLE_HOURS {
            let heart_rate = self.draw(&HEART_RATE, entity, &key, date, Some(hour), rng)?;
            let hrv = self.draw(&HRV, entity, &key, date, Some(hour), rng)?;
            let share = if activity_total > 0.0 {
                self.circadian.multiplier(CircadianCurve::Activity, hour)? / activity_total
            } else {
                0.0
            };
            hourly_samples.push(HourlySample {
                hour,
                values: BTreeMap::from([
                    (HourlyMetric::HeartRate, heart_rate),
                    (HourlyMetric::Hrv, hrv),
                    (HourlyMetric::Steps, steps * share),
                ]),
            });
        }

        Ok(BiometricRecord {
            person_id: entity.label(),
            date,
            age_band: entity.age_band(),
            sex: entity.sex(),
            activity_level: entity.activity_level(),
            metrics,
            hourly_samples,
        })
    }

    fn draw<R: Rng + ?Sized>(
        &self,
        spec: &DrawSpec,
        entity: &VirtualEntity,
        key: &StratumKey,
        date: NaiveDate,
        hour: Option<u8>,
        rng: &mut R,
    ) -> Result<f64> {
        let base = self.table.resolve(spec.parameter, key)?;
        let range = self.table.metric_spec(spec.metric)?;

        let offset = spec.offset.map_or(0.0, |family| entity.offset(family));
        let mut mean = base.mean * (1.0 + offset);
        if let Some(curve) = spec.circadian {
            mean *= self.circadian.multiplier(curve, hour.unwrap_or(0))?;
        }
        if let Some(curve) = spec.calendar {
            mean *= self.calendar.multiplier(curve, date)?;
        }

        let fraction = match (spec.offset, self.noise_fraction) {
            (Some(_), Some(f)) => f,
            _ => spec.noise,
        };
        let fallback = if mean.is_finite() { mean } else { base.mean };
        let mut value = sample_finite(fallback, base.std * fraction, rng, spec.parameter);
        if spec.integral {
            value = value.trunc();
        }
        let scale = fallback / base.mean;
        let scale = if scale.is_finite() { scale } else { 1.0 };
        Ok(range.clip(clip_bounds(base, scale, value)))
    }

    /// Stage fractions (deep, REM, core, awake) summing to 1.
    ///
    /// Each draw below its floor is raised to the floor, then all four are
    /// rescaled by their sum. Rescaling every stage keeps the relative
    /// proportions of the draws instead of dumping the residual into one bucket.
    fn stage_fractions<R: Rng + ?Sized>(&self, key: &StratumKey, rng: &mut R) -> Result<[f64; 4]> {
        let mut fractions = [0.0; 4];
        for (slot, (parameter, _, floor)) in fractions.iter_mut().zip(STAGES) {
            let dist = self.table.resolve(parameter, key)?;
            let raw = sample_finite(dist.mean, dist.std, rng, parameter);
            *slot = clip_bounds(dist, 1.0, raw).max(floor);
        }
        let total: f64 = fractions.iter().sum();
        for f in &mut fractions {
            *f /= total;
        }
        Ok(fractions)
    }
}

/// Clamp to a distribution's bounds.
///
/// Explicit bounds apply as declared. A missing side falls back to the soft
/// `mean ± 3σ` bound multiplied by `scale`, the ratio of the modulated mean
/// to the table mean, so the soft window follows the entity's own level.
fn clip_bounds(dist: &Distribution, scale: f64, value: f64) -> f64 {
    let soft = Distribution::SOFT_BOUND_SIGMAS * dist.std;
    let a = (dist.mean - soft) * scale;
    let b = (dist.mean + soft) * scale;
    let lo = dist.min.unwrap_or(a.min(b));
    let hi = dist.max.unwrap_or(a.max(b));
    value.max(lo).min(hi)
}

/// One N(mean, sd²) draw, resampled while non-finite, falling back to `mean`.
fn sample_finite<R: Rng + ?Sized>(mean: f64, sd: f64, rng: &mut R, parameter: Parameter) -> f64 {
    let sd = if sd.is_finite() { sd.max(0.0) } else { 0.0 };
    if let Ok(normal) = Normal::new(mean, sd) {
        for _ in 0..MAX_RESAMPLES {
            let v = normal.sample(rng);
            if v.is_finite() {
                return v;
            }
        }
    }
    warn!("non-finite draw for {parameter} (mean {mean}, sd {sd}); using mean");
    mean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::IndividualOffsets;
    use crate::params::MetricSpec;
    use crate::strata::{ActivityLevel, AgeBand};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn models() -> (ParameterTable, CircadianModel, CalendarModel) {
        (
            ParameterTable::literature(),
            CircadianModel::literature(),
            CalendarModel::literature(),
        )
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn entity(rng: &mut StdRng) -> VirtualEntity {
        VirtualEntity::new(0, AgeBand::A30To39, Sex::Female, ActivityLevel::Active, rng)
    }

    #[test]
    fn test_all_metrics_within_range() {
        let (t, c, k) = models();
        let generator = EntityGenerator::new(&t, &c, &k);
        let mut rng = StdRng::seed_from_u64(1);
        for (i, (age, level)) in AgeBand::ALL
            .into_iter()
            .flat_map(|a| ActivityLevel::ALL.into_iter().map(move |l| (a, l)))
            .enumerate()
        {
            for sex in Sex::ALL {
                let e = VirtualEntity::new(i as u32, age, sex, level, &mut rng);
                for day in 1..=14 {
                    let r = generator.generate_day(&e, date(day), &mut rng).unwrap();
                    assert_eq!(r.metrics.len(), Metric::ALL.len());
                    for (metric, value) in &r.metrics {
                        let spec = t.metric_spec(*metric).unwrap();
                        assert!(spec.contains(*value), "{metric} = {value} outside range");
                    }
                }
            }
        }
    }

    #[test]
    fn test_sleep_stages_sum_to_total() {
        let (t, c, k) = models();
        let generator = EntityGenerator::new(&t, &c, &k);
        let mut rng = StdRng::seed_from_u64(2);
        let e = entity(&mut rng);
        for day in 1..=31 {
            let r = generator.generate_day(&e, date(day), &mut rng).unwrap();
            let total = r.get(Metric::SleepDurationHours).unwrap() * 60.0;
            let stages = r.stage_minutes_total();
            assert!(
                ((stages - total) / total).abs() < 1e-6,
                "stages {stages} vs total {total}"
            );
            for (_, metric, _) in STAGES {
                assert!(r.get(metric).unwrap() > 0.0);
            }
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (t, c, k) = models();
        let generator = EntityGenerator::new(&t, &c, &k);
        let run = || {
            let mut rng = StdRng::seed_from_u64(42);
            let e = entity(&mut rng);
            generator.generate_day(&e, date(3), &mut rng).unwrap()
        };
        let a = run();
        let b = run();
        assert_eq!(a, b);
        for (metric, value) in &a.metrics {
            assert_eq!(value.to_bits(), b.metrics[metric].to_bits());
        }
    }

    #[test]
    fn test_successive_calls_differ() {
        let (t, c, k) = models();
        let generator = EntityGenerator::new(&t, &c, &k);
        let mut rng = StdRng::seed_from_u64(5);
        let e = entity(&mut rng);
        let a = generator.generate_day(&e, date(3), &mut rng).unwrap();
        let b = generator.generate_day(&e, date(3), &mut rng).unwrap();
        assert_ne!(a.metrics, b.metrics);
    }

    #[test]
    fn test_missing_distribution_fails() {
        let (mut t, c, k) = models();
        t.distributions.remove(&Parameter::SleepDuration);
        let generator = EntityGenerator::new(&t, &c, &k);
        let mut rng = StdRng::seed_from_u64(6);
        let e = entity(&mut rng);
        assert!(generator.generate_day(&e, date(1), &mut rng).is_err());
        assert!(generator.check_strata(&[e.stratum_key()]).is_err());
    }

    #[test]
    fn test_zero_noise_yields_modulated_mean() {
        let (t, c, k) = models();
        let generator = EntityGenerator::new(&t, &c, &k).with_noise_fraction(Some(0.0));
        let mut rng = StdRng::seed_from_u64(8);
        let e = VirtualEntity::with_offsets(
            0,
            AgeBand::A30To39,
            Sex::Male,
            ActivityLevel::Moderate,
            IndividualOffsets::from_values(0.1, 0.0, 0.0, 0.0),
        );
        // Saturday: sleep multiplier 1.15, steps multiplier 0.80.
        let r = generator.generate_day(&e, date(6), &mut rng).unwrap();
        assert!((r.get(Metric::SleepDurationHours).unwrap() - 7.0 * 1.15).abs() < 1e-9);
        assert_eq!(r.get(Metric::DailySteps).unwrap(), (7000.0f64 * 0.80).trunc());
        assert!((r.get(Metric::RestingHeartRate).unwrap() - 68.0 * 0.98).abs() < 1e-9);
        assert!((r.get(Metric::HrvSdnn).unwrap() - 50.0 * 1.1 * 1.22).abs() < 1e-9);
    }

    #[test]
    fn test_hourly_samples() {
        let (t, c, k) = models();
        let generator = EntityGenerator::new(&t, &c, &k);
        let mut rng = StdRng::seed_from_u64(9);
        let e = entity(&mut rng);
        let r = generator.generate_day(&e, date(2), &mut rng).unwrap();
        let hours: Vec<u8> = r.hourly_samples.iter().map(|s| s.hour).collect();
        assert_eq!(hours, SAMPLE_HOURS.to_vec());
        let hourly_steps: f64 = r
            .hourly_samples
            .iter()
            .map(|s| s.values[&HourlyMetric::Steps])
            .sum();
        assert!(hourly_steps <= r.get(Metric::DailySteps).unwrap());
        for s in &r.hourly_samples {
            let hr = s.values[&HourlyMetric::HeartRate];
            assert!((40.0..=100.0).contains(&hr));
        }
    }

    #[test]
    fn test_degenerate_stage_draws_still_partition() {
        let (mut t, c, k) = models();
        // Every stage far below its floor.
        for (parameter, _, _) in STAGES {
            t.insert(parameter, StratumKey::GLOBAL, Distribution::new(-1.0, 0.0));
        }
        let generator = EntityGenerator::new(&t, &c, &k);
        let mut rng = StdRng::seed_from_u64(10);
        let fractions = generator
            .stage_fractions(&StratumKey::GLOBAL, &mut rng)
            .unwrap();
        let sum: f64 = fractions.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        // Floors 0.05 : 0.10 : 0.20 : 0.02 rescaled proportionally.
        assert!((fractions[2] / fractions[0] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_unbounded_distribution_clipped_to_soft_bounds() {
        let (mut t, c, k) = models();
        // Hard range far wider than N(14, 2) so only the ±3σ window binds.
        t.metrics.insert(Metric::RespiratoryRate, MetricSpec::new("breaths/min", 0.0, 100.0));
        let generator = EntityGenerator::new(&t, &c, &k);
        let mut rng = StdRng::seed_from_u64(12);
        let e = entity(&mut rng);
        let start = date(1);
        for day in 0..20_000u64 {
            let d = start + chrono::Days::new(day % 366);
            let r = generator.generate_day(&e, d, &mut rng).unwrap();
            let v = r.get(Metric::RespiratoryRate).unwrap();
            assert!((8.0..=20.0).contains(&v), "respiratory_rate {v} outside [8, 20]");
        }
    }

    #[test]
    fn test_soft_bounds_follow_modulated_mean() {
        let d = Distribution::new(50.0, 10.0);
        assert_eq!(clip_bounds(&d, 1.0, 95.0), 80.0);
        assert_eq!(clip_bounds(&d, 2.0, 200.0), 160.0);
        assert_eq!(clip_bounds(&d, 2.0, 10.0), 40.0);
        let explicit = Distribution::bounded(50.0, 10.0, 45.0, 55.0);
        assert_eq!(clip_bounds(&explicit, 2.0, 200.0), 55.0);
        assert_eq!(clip_bounds(&explicit, 2.0, 0.0), 45.0);
    }

    #[test]
    fn test_overflowing_mean_recovers() {
        let (mut t, c, k) = models();
        t.distributions.insert(
            Parameter::SleepDuration,
            BTreeMap::from([(StratumKey::GLOBAL, Distribution::new(1e308, 1e307))]),
        );
        let generator = EntityGenerator::new(&t, &c, &k);
        let mut rng = StdRng::seed_from_u64(13);
        let e = VirtualEntity::with_offsets(
            0,
            AgeBand::A30To39,
            Sex::Female,
            ActivityLevel::Active,
            IndividualOffsets::from_values(0.0, 0.0, 0.0, 0.0),
        );
        // Saturday: 1e308 x 1.15 overflows to infinity.
        let r = generator.generate_day(&e, date(6), &mut rng).unwrap();
        let sleep = r.get(Metric::SleepDurationHours).unwrap();
        let spec = t.metric_spec(Metric::SleepDurationHours).unwrap();
        assert!(sleep.is_finite());
        assert!(spec.contains(sleep), "sleep {sleep} outside declared range");
        let stages = r.stage_minutes_total();
        assert!((stages - sleep * 60.0).abs() < 1e-6, "stages {stages} vs {}", sleep * 60.0);
    }
}

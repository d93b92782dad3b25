//! Cohort assembly: stratum assignment and the per-entity generation loop.
//!
//! Every entity owns a `StdRng` seeded from the run seed and its id. Trait
//! assignment, offsets, and all of its days are drawn from that one stream,
//! so the record set is identical whether entities run serially or on the
//! rayon pool, in any order.

use chrono::{Days, NaiveDate};
use log::{debug, info};
use rand::SeedableRng;
use rand::distr::Distribution as _;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::VirtualEntity;
use crate::error::{Error, Result};
use crate::generator::EntityGenerator;
use crate::record::BiometricRecord;
use crate::strata::{ActivityLevel, AgeBand, Sex, StratumKey};

/// Default activity mix: sedentary, moderate, active, athletic.
pub const DEFAULT_ACTIVITY_WEIGHTS: [f64; 4] = [0.25, 0.40, 0.25, 0.10];

/// How declared age × sex cells are handed out to entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    /// Entity `i` gets cell `i mod cells`; every cell is filled once
    /// `count >= cells`.
    #[default]
    RoundRobin,
    /// Uniform draw per entity. Small cohorts may leave cells empty.
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAssignment {
    /// Weighted draw over [`ActivityLevel::ALL`].
    Weighted([f64; 4]),
    /// Every entity gets this level.
    Pinned(ActivityLevel),
}

impl Default for ActivityAssignment {
    fn default() -> Self {
        Self::Weighted(DEFAULT_ACTIVITY_WEIGHTS)
    }
}

/// Declared strata and how entities are spread across them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StratificationPlan {
    pub age_bands: Vec<AgeBand>,
    pub sexes: Vec<Sex>,
    pub coverage: Coverage,
    pub activity: ActivityAssignment,
}

impl Default for StratificationPlan {
    fn default() -> Self {
        Self {
            age_bands: AgeBand::ALL.to_vec(),
            sexes: Sex::ALL.to_vec(),
            coverage: Coverage::default(),
            activity: ActivityAssignment::default(),
        }
    }
}

impl StratificationPlan {
    pub fn validate(&self) -> Result<()> {
        if self.age_bands.is_empty() || self.sexes.is_empty() {
            return Err(Error::InvalidPlan(
                "at least one age band and one sex must be declared".into(),
            ));
        }
        if has_duplicates(&self.age_bands) || has_duplicates(&self.sexes) {
            return Err(Error::InvalidPlan("duplicate stratum declared".into()));
        }
        if let ActivityAssignment::Weighted(weights) = &self.activity {
            if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(Error::InvalidPlan(format!(
                    "activity weights must be finite and >= 0, got {weights:?}"
                )));
            }
            if weights.iter().sum::<f64>() <= 0.0 {
                return Err(Error::InvalidPlan("activity weights sum to zero".into()));
            }
        }
        Ok(())
    }

    /// Declared age × sex cells, age-major.
    pub fn cells(&self) -> Vec<(AgeBand, Sex)> {
        self.age_bands
            .iter()
            .flat_map(|&age| self.sexes.iter().map(move |&sex| (age, sex)))
            .collect()
    }

    /// Activity levels an entity can receive under this plan.
    pub fn activity_levels(&self) -> Vec<ActivityLevel> {
        match self.activity {
            ActivityAssignment::Pinned(level) => vec![level],
            ActivityAssignment::Weighted(weights) => ActivityLevel::ALL
                .into_iter()
                .zip(weights)
                .filter(|(_, w)| *w > 0.0)
                .map(|(level, _)| level)
                .collect(),
        }
    }

    /// Every fully specified stratum an entity can land in.
    pub fn strata(&self) -> Vec<StratumKey> {
        let levels = self.activity_levels();
        self.cells()
            .into_iter()
            .flat_map(|(age, sex)| {
                levels.iter().map(move |&level| StratumKey {
                    age: Some(age),
                    sex: Some(sex),
                    activity: Some(level),
                })
            })
            .collect()
    }
}

fn has_duplicates<T: PartialEq>(items: &[T]) -> bool {
    items
        .iter()
        .enumerate()
        .any(|(i, a)| items[i + 1..].contains(a))
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed of entity `id`'s private stream under run seed `base`.
pub fn entity_seed(base: u64, id: u32) -> u64 {
    splitmix64(base ^ splitmix64(u64::from(id)))
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Entities and their records, records grouped by entity in id order.
#[derive(Debug, Clone, PartialEq)]
pub struct Cohort {
    pub entities: Vec<VirtualEntity>,
    pub records: Vec<BiometricRecord>,
}

/// Drives an [`EntityGenerator`] over a cohort and a date range.
#[derive(Debug, Clone, Copy)]
pub struct CohortBuilder<'a> {
    generator: EntityGenerator<'a>,
    seed: u64,
    parallel: bool,
}

impl<'a> CohortBuilder<'a> {
    pub fn new(generator: EntityGenerator<'a>, seed: u64) -> Self {
        Self {
            generator,
            seed,
            parallel: true,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Check the plan and that every stratum it can produce resolves.
    pub fn validate_for(&self, plan: &StratificationPlan) -> Result<()> {
        plan.validate()?;
        self.generator.check_strata(&plan.strata())
    }

    /// Generate `count` entities × `days` consecutive days from `start_date`.
    pub fn build(
        &self,
        count: u32,
        days: u32,
        start_date: NaiveDate,
        plan: &StratificationPlan,
    ) -> Result<Cohort> {
        self.validate_for(plan)?;
        let dates = date_range(start_date, days)?;
        let cells = plan.cells();
        let activity = match plan.activity {
            ActivityAssignment::Weighted(weights) => Some(
                WeightedIndex::new(weights)
                    .map_err(|e| Error::InvalidPlan(format!("activity weights: {e}")))?,
            ),
            ActivityAssignment::Pinned(_) => None,
        };

        info!(
            "building cohort: {count} entities x {days} days from {start_date} (seed {})",
            self.seed
        );

        let run = |id: u32| -> Result<(VirtualEntity, Vec<BiometricRecord>)> {
            let mut rng = StdRng::seed_from_u64(entity_seed(self.seed, id));
            let (age, sex) = match plan.coverage {
                Coverage::RoundRobin => cells.get(id as usize % cells.len()).copied(),
                Coverage::Random => cells.choose(&mut rng).copied(),
            }
            .ok_or_else(|| Error::InvalidPlan("no age x sex cells declared".into()))?;
            let level = match (&activity, plan.activity) {
                (Some(index), _) => ActivityLevel::ALL[index.sample(&mut rng)],
                (None, ActivityAssignment::Pinned(level)) => level,
                (None, ActivityAssignment::Weighted(_)) => ActivityLevel::Moderate,
            };
            let entity = VirtualEntity::new(id, age, sex, level, &mut rng);
            let records = dates
                .iter()
                .map(|&date| self.generator.generate_day(&entity, date, &mut rng))
                .collect::<Result<Vec<_>>>()?;
            Ok((entity, records))
        };

        let per_entity: Vec<(VirtualEntity, Vec<BiometricRecord>)> = if self.parallel {
            (0..count).into_par_iter().map(run).collect::<Result<_>>()?
        } else {
            (0..count).map(run).collect::<Result<_>>()?
        };

        let mut entities = Vec::with_capacity(per_entity.len());
        let mut records = Vec::with_capacity(per_entity.len() * dates.len());
        for (entity, days) in per_entity {
            entities.push(entity);
            records.extend(days);
        }
        debug!("cohort built: {} records", records.len());
        Ok(Cohort { entities, records })
    }
}

fn date_range(start: NaiveDate, days: u32) -> Result<Vec<NaiveDate>> {
    (0..days)
        .map(|d| {
            start
                .checked_add_days(Days::new(u64::from(d)))
                .ok_or_else(|| Error::InvalidPlan(format!("date range overflows at {start} + {d}")))
        })
        .collect()
}

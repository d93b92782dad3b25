//! Virtual cohort members and their persistent individual traits.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::strata::{ActivityLevel, AgeBand, Sex, StratumKey};

/// Metric family sharing one persistent individual offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetFamily {
    Hrv,
    HeartRate,
    Sleep,
    /// Steps and active energy.
    Activity,
}

impl OffsetFamily {
    pub const ALL: [OffsetFamily; 4] = [Self::Hrv, Self::HeartRate, Self::Sleep, Self::Activity];

    /// Between-individual standard deviation of the fractional offset.
    pub fn spread(self) -> f64 {
        match self {
            Self::Hrv => 0.15,
            Self::HeartRate => 0.10,
            Self::Sleep => 0.10,
            Self::Activity => 0.15,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Hrv => 0,
            Self::HeartRate => 1,
            Self::Sleep => 2,
            Self::Activity => 3,
        }
    }
}

/// Zero-mean fractional deviations from the population mean, one per family.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndividualOffsets([f64; 4]);

impl IndividualOffsets {
    /// Draws are clamped symmetrically at this many spreads so that
    /// `1 + offset` stays positive.
    const CLAMP_SPREADS: f64 = 4.0;

    /// Draw one offset per family from N(0, spread²).
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut values = [0.0; 4];
        for family in OffsetFamily::ALL {
            let spread = family.spread();
            let limit = Self::CLAMP_SPREADS * spread;
            let v = match Normal::new(0.0, spread) {
                Ok(normal) => normal.sample(rng),
                Err(_) => 0.0,
            };
            values[family.index()] = v.clamp(-limit, limit);
        }
        Self(values)
    }

    pub fn from_values(hrv: f64, heart_rate: f64, sleep: f64, activity: f64) -> Self {
        Self([hrv, heart_rate, sleep, activity])
    }

    pub fn get(&self, family: OffsetFamily) -> f64 {
        self.0[family.index()]
    }
}

/// One member of a virtual cohort. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualEntity {
    id: u32,
    age_band: AgeBand,
    sex: Sex,
    activity_level: ActivityLevel,
    offsets: IndividualOffsets,
}

impl VirtualEntity {
    /// Create an entity, drawing its individual offsets from `rng`.
    pub fn new<R: Rng + ?Sized>(
        id: u32,
        age_band: AgeBand,
        sex: Sex,
        activity_level: ActivityLevel,
        rng: &mut R,
    ) -> Self {
        Self::with_offsets(id, age_band, sex, activity_level, IndividualOffsets::draw(rng))
    }

    pub fn with_offsets(
        id: u32,
        age_band: AgeBand,
        sex: Sex,
        activity_level: ActivityLevel,
        offsets: IndividualOffsets,
    ) -> Self {
        Self {
            id,
            age_band,
            sex,
            activity_level,
            offsets,
        }
    }

    /// Identifier stamped on records.
    pub fn label(&self) -> String {
        format!("synthetic_{}", self.id)
    }

    pub fn age_band(&self) -> AgeBand {
        self.age_band
    }

    pub fn sex(&self) -> Sex {
        self.sex
    }

    pub fn activity_level(&self) -> ActivityLevel {
        self.activity_level
    }

    pub fn offset(&self, family: OffsetFamily) -> f64 {
        self.offsets.get(family)
    }

    /// Fully specified stratum of this entity.
    pub fn stratum_key(&self) -> StratumKey {
        StratumKey {
            age: Some(self.age_band),
            sex: Some(self.sex),
            activity: Some(self.activity_level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_offsets_are_zero_mean() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let mut sums = [0.0; 4];
        for _ in 0..n {
            let o = IndividualOffsets::draw(&mut rng);
            for family in OffsetFamily::ALL {
                sums[family.index()] += o.get(family);
            }
        }
        for family in OffsetFamily::ALL {
            let mean = sums[family.index()] / n as f64;
            assert!(mean.abs() < 0.01, "{family:?} mean offset {mean}");
        }
    }

    #[test]
    fn test_offsets_bounded() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..10_000 {
            let o = IndividualOffsets::draw(&mut rng);
            for family in OffsetFamily::ALL {
                assert!(1.0 + o.get(family) > 0.0);
            }
        }
    }

    #[test]
    fn test_entity_accessors() {
        let e = VirtualEntity::with_offsets(
            3,
            AgeBand::A50To59,
            Sex::Female,
            ActivityLevel::Moderate,
            IndividualOffsets::from_values(0.1, -0.05, 0.0, 0.2),
        );
        assert_eq!(e.label(), "synthetic_3");
        assert_eq!(e.offset(OffsetFamily::Activity), 0.2);
        assert_eq!(e.stratum_key().to_string(), "50-59/female/moderate");
    }
}

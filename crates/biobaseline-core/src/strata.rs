//! Stratifying factors and the composite stratum key.
//!
//! The label strings produced here are the only spelling of a stratum used
//! anywhere: generation stamps them on records, aggregation partitions by
//! them, and the baseline report keys cells with them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Ordered age band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeBand {
    #[serde(rename = "18-29")]
    A18To29,
    #[serde(rename = "30-39")]
    A30To39,
    #[serde(rename = "40-49")]
    A40To49,
    #[serde(rename = "50-59")]
    A50To59,
    #[serde(rename = "60-69")]
    A60To69,
    #[serde(rename = "70+")]
    A70Plus,
}

impl AgeBand {
    pub const ALL: [AgeBand; 6] = [
        Self::A18To29,
        Self::A30To39,
        Self::A40To49,
        Self::A50To59,
        Self::A60To69,
        Self::A70Plus,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::A18To29 => "18-29",
            Self::A30To39 => "30-39",
            Self::A40To49 => "40-49",
            Self::A50To59 => "50-59",
            Self::A60To69 => "60-69",
            Self::A70Plus => "70+",
        }
    }

    /// Band for an age in whole years. Minors have no band.
    pub fn from_age(years: u32) -> Option<Self> {
        match years {
            0..=17 => None,
            18..=29 => Some(Self::A18To29),
            30..=39 => Some(Self::A30To39),
            40..=49 => Some(Self::A40To49),
            50..=59 => Some(Self::A50To59),
            60..=69 => Some(Self::A60To69),
            _ => Some(Self::A70Plus),
        }
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AgeBand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|b| b.label() == s)
            .ok_or_else(|| Error::InvalidStratum(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub const ALL: [Sex; 2] = [Self::Male, Self::Female];

    pub fn label(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Sex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|x| x.label() == s)
            .ok_or_else(|| Error::InvalidStratum(s.to_string()))
    }
}

/// Habitual activity level, least to most active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Sedentary,
    Moderate,
    Active,
    Athletic,
}

impl ActivityLevel {
    pub const ALL: [ActivityLevel; 4] = [
        Self::Sedentary,
        Self::Moderate,
        Self::Active,
        Self::Athletic,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Sedentary => "sedentary",
            Self::Moderate => "moderate",
            Self::Active => "active",
            Self::Athletic => "athletic",
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ActivityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|x| x.label() == s)
            .ok_or_else(|| Error::InvalidStratum(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Composite key
// ---------------------------------------------------------------------------

/// A point in stratum space; absent factors mean "any".
///
/// Written as factor labels joined by `/` (`"30-39/male"`, `"sedentary"`),
/// with `"*"` for the unconditional key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StratumKey {
    pub age: Option<AgeBand>,
    pub sex: Option<Sex>,
    pub activity: Option<ActivityLevel>,
}

impl StratumKey {
    pub const GLOBAL: StratumKey = StratumKey {
        age: None,
        sex: None,
        activity: None,
    };

    pub fn age(age: AgeBand) -> Self {
        Self {
            age: Some(age),
            ..Self::GLOBAL
        }
    }

    pub fn sex(sex: Sex) -> Self {
        Self {
            sex: Some(sex),
            ..Self::GLOBAL
        }
    }

    pub fn activity(activity: ActivityLevel) -> Self {
        Self {
            activity: Some(activity),
            ..Self::GLOBAL
        }
    }

    pub fn age_sex(age: AgeBand, sex: Sex) -> Self {
        Self {
            age: Some(age),
            sex: Some(sex),
            activity: None,
        }
    }

    pub fn is_global(&self) -> bool {
        *self == Self::GLOBAL
    }

    /// Lookup chain from this key down to the unconditional key.
    ///
    /// Keys are ordered by specificity, ties broken age > sex > activity:
    /// `age/sex/activity`, `age/sex`, `age/activity`, `sex/activity`, `age`,
    /// `sex`, `activity`, `*`. Only factors present on `self` appear.
    pub fn fallbacks(&self) -> Vec<StratumKey> {
        // Bit 2 = age, bit 1 = sex, bit 0 = activity.
        const ORDER: [u8; 8] = [0b111, 0b110, 0b101, 0b011, 0b100, 0b010, 0b001, 0b000];
        let present = (u8::from(self.age.is_some()) << 2)
            | (u8::from(self.sex.is_some()) << 1)
            | u8::from(self.activity.is_some());
        ORDER
            .iter()
            .filter(|&&mask| mask & present == mask)
            .map(|&mask| StratumKey {
                age: if mask & 0b100 != 0 { self.age } else { None },
                sex: if mask & 0b010 != 0 { self.sex } else { None },
                activity: if mask & 0b001 != 0 { self.activity } else { None },
            })
            .collect()
    }
}

impl fmt::Display for StratumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            return f.write_str("*");
        }
        let parts: Vec<&str> = [
            self.age.map(AgeBand::label),
            self.sex.map(Sex::label),
            self.activity.map(ActivityLevel::label),
        ]
        .into_iter()
        .flatten()
        .collect();
        f.write_str(&parts.join("/"))
    }
}

impl FromStr for StratumKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::GLOBAL);
        }
        let mut key = Self::GLOBAL;
        for part in s.split('/').map(str::trim) {
            let duplicate = if let Ok(age) = part.parse::<AgeBand>() {
                key.age.replace(age).is_some()
            } else if let Ok(sex) = part.parse::<Sex>() {
                key.sex.replace(sex).is_some()
            } else if let Ok(level) = part.parse::<ActivityLevel>() {
                key.activity.replace(level).is_some()
            } else {
                return Err(Error::InvalidStratum(s.to_string()));
            };
            if duplicate {
                return Err(Error::InvalidStratum(format!("{s} (factor repeated)")));
            }
        }
        Ok(key)
    }
}

impl TryFrom<String> for StratumKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StratumKey> for String {
    fn from(key: StratumKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for band in AgeBand::ALL {
            assert_eq!(band.label().parse::<AgeBand>().unwrap(), band);
        }
        for sex in Sex::ALL {
            assert_eq!(sex.to_string().parse::<Sex>().unwrap(), sex);
        }
        for level in ActivityLevel::ALL {
            assert_eq!(level.to_string().parse::<ActivityLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_serde_labels_match_display() {
        let json = serde_json::to_string(&AgeBand::A70Plus).unwrap();
        assert_eq!(json, "\"70+\"");
        let json = serde_json::to_string(&ActivityLevel::Athletic).unwrap();
        assert_eq!(json, "\"athletic\"");
    }

    #[test]
    fn test_from_age() {
        assert_eq!(AgeBand::from_age(17), None);
        assert_eq!(AgeBand::from_age(18), Some(AgeBand::A18To29));
        assert_eq!(AgeBand::from_age(39), Some(AgeBand::A30To39));
        assert_eq!(AgeBand::from_age(95), Some(AgeBand::A70Plus));
    }

    #[test]
    fn test_stratum_key_parse_and_display() {
        let key: StratumKey = "30-39/male".parse().unwrap();
        assert_eq!(key, StratumKey::age_sex(AgeBand::A30To39, Sex::Male));
        assert_eq!(key.to_string(), "30-39/male");
        assert_eq!("*".parse::<StratumKey>().unwrap(), StratumKey::GLOBAL);
        // Factor order in the input does not matter.
        let key: StratumKey = "active/female".parse().unwrap();
        assert_eq!(key.to_string(), "female/active");
    }

    #[test]
    fn test_stratum_key_rejects_garbage() {
        assert!("30-39/purple".parse::<StratumKey>().is_err());
        assert!("male/female".parse::<StratumKey>().is_err());
    }

    #[test]
    fn test_fallback_order() {
        let key = StratumKey {
            age: Some(AgeBand::A40To49),
            sex: Some(Sex::Female),
            activity: Some(ActivityLevel::Active),
        };
        let chain: Vec<String> = key.fallbacks().iter().map(|k| k.to_string()).collect();
        assert_eq!(
            chain,
            vec![
                "40-49/female/active",
                "40-49/female",
                "40-49/active",
                "female/active",
                "40-49",
                "female",
                "active",
                "*",
            ]
        );
    }

    #[test]
    fn test_fallback_partial_key() {
        let chain = StratumKey::sex(Sex::Male).fallbacks();
        assert_eq!(chain, vec![StratumKey::sex(Sex::Male), StratumKey::GLOBAL]);
    }
}

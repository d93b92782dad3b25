//! Stratified aggregation of records (or parameters) into baseline cells.
//!
//! Both entry points yield the same [`BaselineTree`]: [`aggregate`] from a
//! record set through [`Empirical`], [`aggregate_parametric`] from the
//! parameter table through [`Parametric`]. A cell whose backing count is
//! below threshold is left out of the tree, never written as null or zero.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use biobaseline_stats::{Empirical, Parametric, Summarize, Summary};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::metric::{HourlyMetric, Metric};
use crate::params::ParameterTable;
use crate::record::BiometricRecord;
use crate::strata::StratumKey;

/// Cell label of the unconditional cut before it is flattened into the tree.
const GLOBAL_CELL: &str = "all";

// ═══════════════════════════════════════════════════════════════════════════════
// Entries and tree
// ═══════════════════════════════════════════════════════════════════════════════

/// One cell's statistics for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub n: usize,
    pub mean: f64,
    pub std: f64,
    pub median: f64,
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl BaselineEntry {
    /// p5 ≤ p10 ≤ p25 ≤ median ≤ p75 ≤ p90 ≤ p95.
    pub fn is_monotone(&self) -> bool {
        [
            self.p5,
            self.p10,
            self.p25,
            self.median,
            self.p75,
            self.p90,
            self.p95,
        ]
        .windows(2)
        .all(|w| w[0] <= w[1])
    }
}

impl From<Summary> for BaselineEntry {
    fn from(s: Summary) -> Self {
        Self {
            n: s.n,
            mean: s.mean,
            std: s.std,
            median: s.median,
            p5: s.p5,
            p10: s.p10,
            p25: s.p25,
            p75: s.p75,
            p90: s.p90,
            p95: s.p95,
            min: s.min,
            max: s.max,
        }
    }
}

/// Metric name → entry.
pub type MetricTable = BTreeMap<String, BaselineEntry>;
/// Cell label → metric table.
pub type CellTable = BTreeMap<String, MetricTable>;

/// Baselines for every computed cross-cut.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineTree {
    pub global: MetricTable,
    pub by_sex: CellTable,
    pub by_age_group: CellTable,
    pub by_activity_level: CellTable,
    pub by_age_and_sex: CellTable,
    pub by_hour: CellTable,
}

impl BaselineTree {
    fn set(&mut self, cut: CrossCut, mut cells: CellTable) {
        match cut {
            CrossCut::Global => self.global = cells.remove(GLOBAL_CELL).unwrap_or_default(),
            CrossCut::BySex => self.by_sex = cells,
            CrossCut::ByAgeGroup => self.by_age_group = cells,
            CrossCut::ByActivityLevel => self.by_activity_level = cells,
            CrossCut::ByAgeAndSex => self.by_age_and_sex = cells,
            CrossCut::ByHour => self.by_hour = cells,
        }
    }

    /// Cells of a stratified cut. `None` for [`CrossCut::Global`].
    pub fn cells(&self, cut: CrossCut) -> Option<&CellTable> {
        match cut {
            CrossCut::Global => None,
            CrossCut::BySex => Some(&self.by_sex),
            CrossCut::ByAgeGroup => Some(&self.by_age_group),
            CrossCut::ByActivityLevel => Some(&self.by_activity_level),
            CrossCut::ByAgeAndSex => Some(&self.by_age_and_sex),
            CrossCut::ByHour => Some(&self.by_hour),
        }
    }

    /// Number of emitted cells; the global cut counts as one when non-empty.
    pub fn cell_count(&self, cut: CrossCut) -> usize {
        match self.cells(cut) {
            Some(cells) => cells.len(),
            None => usize::from(!self.global.is_empty()),
        }
    }

    /// Every emitted entry, in cut order.
    pub fn entries(&self) -> impl Iterator<Item = &BaselineEntry> + '_ {
        let stratified = [
            &self.by_sex,
            &self.by_age_group,
            &self.by_activity_level,
            &self.by_age_and_sex,
            &self.by_hour,
        ];
        self.global.values().chain(
            stratified
                .into_iter()
                .flat_map(|cells| cells.values().flat_map(|m| m.values())),
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cross-cuts and configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Aggregation axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossCut {
    Global,
    BySex,
    ByAgeGroup,
    ByActivityLevel,
    /// Cells keyed `"{age_band}_{sex}"`.
    ByAgeAndSex,
    /// Built from hourly sub-samples; cells keyed by hour.
    ByHour,
}

impl CrossCut {
    pub const ALL: [CrossCut; 6] = [
        Self::Global,
        Self::BySex,
        Self::ByAgeGroup,
        Self::ByActivityLevel,
        Self::ByAgeAndSex,
        Self::ByHour,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::BySex => "by_sex",
            Self::ByAgeGroup => "by_age_group",
            Self::ByActivityLevel => "by_activity_level",
            Self::ByAgeAndSex => "by_age_and_sex",
            Self::ByHour => "by_hour",
        }
    }

    /// Cell a daily record falls into. `None` for the hourly cut.
    fn record_cell(self, r: &BiometricRecord) -> Option<String> {
        match self {
            Self::Global => Some(GLOBAL_CELL.to_string()),
            Self::BySex => Some(r.sex.to_string()),
            Self::ByAgeGroup => Some(r.age_band.to_string()),
            Self::ByActivityLevel => Some(r.activity_level.to_string()),
            Self::ByAgeAndSex => Some(format!("{}_{}", r.age_band, r.sex)),
            Self::ByHour => None,
        }
    }

    /// Cell a table entry at exactly `key` belongs to, if this cut has one.
    fn stratum_cell(self, key: &StratumKey) -> Option<String> {
        match (self, key.age, key.sex, key.activity) {
            (Self::Global, None, None, None) => Some(GLOBAL_CELL.to_string()),
            (Self::BySex, None, Some(sex), None) => Some(sex.to_string()),
            (Self::ByAgeGroup, Some(age), None, None) => Some(age.to_string()),
            (Self::ByActivityLevel, None, None, Some(level)) => Some(level.to_string()),
            (Self::ByAgeAndSex, Some(age), Some(sex), None) => Some(format!("{age}_{sex}")),
            _ => None,
        }
    }
}

impl fmt::Display for CrossCut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CrossCut {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| Error::InvalidPlan(format!("unknown cross-cut '{s}'")))
    }
}

/// Suppression thresholds and execution mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Minimum finite values behind an entry.
    pub min_count: usize,
    /// Minimum partition size per cut; smaller partitions are dropped whole.
    pub cut_min_counts: BTreeMap<CrossCut, usize>,
    /// Compute cuts on the rayon pool.
    pub parallel: bool,
    /// Sample size assumed for parametric entries that declare none.
    pub assumed_sample_size: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            min_count: 30,
            cut_min_counts: BTreeMap::new(),
            parallel: true,
            assumed_sample_size: 1000,
        }
    }
}

impl AggregationConfig {
    pub fn with_min_count(mut self, min_count: usize) -> Self {
        self.min_count = min_count;
        self
    }

    /// Partition minimums of the population biomarker baselines: 50 per age
    /// band, 30 per age × sex cell.
    pub fn with_biomarker_partition_minimums(mut self) -> Self {
        self.cut_min_counts.insert(CrossCut::ByAgeGroup, 50);
        self.cut_min_counts.insert(CrossCut::ByAgeAndSex, 30);
        self
    }

    fn partition_min(&self, cut: CrossCut) -> usize {
        self.cut_min_counts.get(&cut).copied().unwrap_or(0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Empirical path
// ═══════════════════════════════════════════════════════════════════════════════

/// Aggregate `records` over `cuts`.
pub fn aggregate(
    records: &[BiometricRecord],
    cuts: &[CrossCut],
    config: &AggregationConfig,
) -> BaselineTree {
    let compute = |&cut: &CrossCut| (cut, aggregate_cut(records, cut, config));
    let results: Vec<(CrossCut, CellTable)> = if config.parallel {
        cuts.par_iter().map(compute).collect()
    } else {
        cuts.iter().map(compute).collect()
    };

    let mut tree = BaselineTree::default();
    for (cut, cells) in results {
        tree.set(cut, cells);
    }
    info!(
        "aggregated {} records across {} cross-cuts",
        records.len(),
        cuts.len()
    );
    tree
}

fn aggregate_cut(records: &[BiometricRecord], cut: CrossCut, config: &AggregationConfig) -> CellTable {
    let cells = if cut == CrossCut::ByHour {
        let mut partitions: BTreeMap<String, Vec<&BTreeMap<HourlyMetric, f64>>> = BTreeMap::new();
        for sample in records.iter().flat_map(|r| &r.hourly_samples) {
            partitions
                .entry(sample.hour.to_string())
                .or_default()
                .push(&sample.values);
        }
        summarize_partitions(
            cut,
            partitions,
            config,
            &HourlyMetric::ALL,
            HourlyMetric::name,
            |values, m| values.get(&m).copied(),
        )
    } else {
        let mut partitions: BTreeMap<String, Vec<&BiometricRecord>> = BTreeMap::new();
        for r in records {
            if let Some(label) = cut.record_cell(r) {
                partitions.entry(label).or_default().push(r);
            }
        }
        summarize_partitions(cut, partitions, config, &Metric::ALL, Metric::name, |r, m| {
            r.get(m)
        })
    };
    debug!("{cut}: {} cells emitted", cells.len());
    cells
}

/// Summarize each partition per metric, dropping undersized cells and entries.
fn summarize_partitions<T, M: Copy>(
    cut: CrossCut,
    partitions: BTreeMap<String, Vec<T>>,
    config: &AggregationConfig,
    metrics: &[M],
    name: impl Fn(M) -> &'static str,
    value: impl Fn(&T, M) -> Option<f64>,
) -> CellTable {
    let partition_min = config.partition_min(cut);
    let mut cells = CellTable::new();
    for (label, members) in partitions {
        if members.len() < partition_min {
            debug!(
                "{cut}/{label}: partition of {} below minimum {partition_min}, dropped",
                members.len()
            );
            continue;
        }
        let mut table = MetricTable::new();
        for &metric in metrics {
            let sample = Empirical::new(members.iter().filter_map(|m| value(m, metric)));
            if sample.count() == 0 {
                continue;
            }
            match sample.summarize_at_least(config.min_count) {
                Some(summary) => {
                    table.insert(name(metric).to_string(), summary.into());
                }
                None => debug!(
                    "{cut}/{label}/{}: {} values below threshold {}",
                    name(metric),
                    sample.count(),
                    config.min_count
                ),
            }
        }
        if !table.is_empty() {
            cells.insert(label, table);
        }
    }
    cells
}

// ═══════════════════════════════════════════════════════════════════════════════
// Parametric path
// ═══════════════════════════════════════════════════════════════════════════════

/// Baselines straight from table distributions via normal quantiles.
///
/// Only entries stored at exactly a cut's stratum shape contribute, so no
/// value is duplicated across cells through fallback. Entries without explicit
/// bounds report their `mean ± 3σ` soft bounds as min/max. The hourly cut has
/// no parametric source and is always empty here.
pub fn aggregate_parametric(
    table: &ParameterTable,
    cuts: &[CrossCut],
    config: &AggregationConfig,
) -> BaselineTree {
    let mut tree = BaselineTree::default();
    for &cut in cuts {
        let threshold = config.min_count.max(config.partition_min(cut));
        let mut cells = CellTable::new();
        for (parameter, strata) in &table.distributions {
            for (key, dist) in strata {
                let Some(label) = cut.stratum_cell(key) else {
                    continue;
                };
                let (min, max) = dist.bounds();
                let source = Parametric {
                    mean: dist.mean,
                    std: dist.std,
                    min: Some(min),
                    max: Some(max),
                    n: dist.n.unwrap_or(config.assumed_sample_size),
                };
                if let Some(summary) = source.summarize_at_least(threshold) {
                    cells
                        .entry(label)
                        .or_default()
                        .insert(parameter.output_name().to_string(), summary.into());
                }
            }
        }
        debug!("{cut}: {} parametric cells", cells.len());
        tree.set(cut, cells);
    }
    info!("parametric baselines across {} cross-cuts", cuts.len());
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Distribution, Parameter};
    use crate::record::HourlySample;
    use crate::strata::{ActivityLevel, AgeBand, Sex};
    use chrono::NaiveDate;

    fn record(i: usize, sex: Sex, age: AgeBand) -> BiometricRecord {
        BiometricRecord {
            person_id: format!("synthetic_{i}"),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            age_band: age,
            sex,
            activity_level: ActivityLevel::Moderate,
            metrics: BTreeMap::from([
                (Metric::DailySteps, 5000.0 + i as f64),
                (Metric::RestingHeartRate, 60.0 + (i % 10) as f64),
            ]),
            hourly_samples: vec![HourlySample {
                hour: 7,
                values: BTreeMap::from([(HourlyMetric::HeartRate, 70.0)]),
            }],
        }
    }

    fn serial() -> AggregationConfig {
        AggregationConfig {
            parallel: false,
            ..AggregationConfig::default()
        }
    }

    #[test]
    fn test_threshold_29_absent_30_present() {
        let mut records: Vec<_> = (0..29).map(|i| record(i, Sex::Male, AgeBand::A18To29)).collect();
        records.extend((0..30).map(|i| record(i, Sex::Female, AgeBand::A18To29)));
        let tree = aggregate(&records, &[CrossCut::BySex], &serial());
        assert!(!tree.by_sex.contains_key("male"));
        let female = &tree.by_sex["female"];
        assert_eq!(female["daily_steps"].n, 30);
    }

    #[test]
    fn test_absent_metric_not_emitted() {
        let records: Vec<_> = (0..40).map(|i| record(i, Sex::Male, AgeBand::A18To29)).collect();
        let tree = aggregate(&records, &[CrossCut::Global], &serial());
        assert!(tree.global.contains_key("daily_steps"));
        assert!(!tree.global.contains_key("spo2"));
    }

    #[test]
    fn test_age_and_sex_key_format() {
        let records: Vec<_> = (0..30).map(|i| record(i, Sex::Female, AgeBand::A30To39)).collect();
        let tree = aggregate(&records, &[CrossCut::ByAgeAndSex], &serial());
        assert!(tree.by_age_and_sex.contains_key("30-39_female"));
    }

    #[test]
    fn test_hourly_cut() {
        let records: Vec<_> = (0..30).map(|i| record(i, Sex::Male, AgeBand::A18To29)).collect();
        let tree = aggregate(&records, &[CrossCut::ByHour], &serial());
        let entry = &tree.by_hour["7"]["heart_rate"];
        assert_eq!(entry.n, 30);
        assert_eq!(entry.std, 0.0);
        assert!(!tree.by_hour["7"].contains_key("hrv"));
    }

    #[test]
    fn test_partition_minimum_drops_cell() {
        let records: Vec<_> = (0..40).map(|i| record(i, Sex::Male, AgeBand::A40To49)).collect();
        let config = serial().with_biomarker_partition_minimums();
        let tree = aggregate(&records, &[CrossCut::ByAgeGroup, CrossCut::ByAgeAndSex], &config);
        assert!(tree.by_age_group.is_empty());
        assert!(tree.by_age_and_sex.contains_key("40-49_male"));
    }

    #[test]
    fn test_order_independent_bitwise() {
        let records: Vec<_> = (0..50)
            .map(|i| record(i, Sex::ALL[i % 2], AgeBand::A18To29))
            .collect();
        let mut reversed = records.clone();
        reversed.reverse();
        let a = aggregate(&records, &CrossCut::ALL, &serial());
        let b = aggregate(&reversed, &CrossCut::ALL, &AggregationConfig::default());
        assert_eq!(a, b);
        let (x, y) = (&a.global["daily_steps"], &b.global["daily_steps"]);
        assert_eq!(x.mean.to_bits(), y.mean.to_bits());
        assert_eq!(x.p90.to_bits(), y.p90.to_bits());
    }

    #[test]
    fn test_parametric_cells() {
        let t = ParameterTable::literature();
        let tree = aggregate_parametric(&t, &CrossCut::ALL, &AggregationConfig::default());
        assert!(tree.by_hour.is_empty());
        assert_eq!(tree.by_age_and_sex.len(), 12);
        let hrv = &tree.by_age_and_sex["30-39_male"]["hrv_sdnn"];
        assert_eq!(hrv.mean, 50.0);
        assert!(hrv.is_monotone());
        assert_eq!(tree.by_activity_level["active"]["resting_heart_rate"].mean, 62.0);
        assert!(tree.global.contains_key("sleep_stage_deep"));
        let spo2 = &tree.global["spo2"];
        assert_eq!(spo2.max, Some(100.0));
        assert!(spo2.p95 <= 100.0);
    }

    #[test]
    fn test_cross_cut_from_str() {
        for cut in CrossCut::ALL {
            assert_eq!(cut.name().parse::<CrossCut>().unwrap(), cut);
        }
        assert!("by_weather".parse::<CrossCut>().is_err());
    }

    #[test]
    fn test_parametric_unbounded_entry_gets_soft_bounds() {
        let t = ParameterTable::literature();
        let tree = aggregate_parametric(&t, &[CrossCut::Global], &AggregationConfig::default());
        let rr = &tree.global["respiratory_rate"];
        assert_eq!(rr.min, Some(8.0));
        assert_eq!(rr.max, Some(20.0));
        assert!(rr.p5 >= 8.0 && rr.p95 <= 20.0);
    }

    #[test]
    fn test_parametric_declared_n_below_threshold() {
        let mut t = ParameterTable::literature();
        t.insert(
            Parameter::RespiratoryRate,
            StratumKey::sex(Sex::Female),
            Distribution {
                n: Some(29),
                ..Distribution::new(15.0, 2.0)
            },
        );
        t.insert(
            Parameter::RespiratoryRate,
            StratumKey::sex(Sex::Male),
            Distribution {
                n: Some(30),
                ..Distribution::new(14.0, 2.0)
            },
        );
        let tree = aggregate_parametric(&t, &[CrossCut::BySex], &AggregationConfig::default());
        assert!(!tree.by_sex.contains_key("female"));
        assert_eq!(tree.by_sex["male"]["respiratory_rate"].n, 30);
    }

    #[test]
    fn test_entry_shapes_match() {
        let records: Vec<_> = (0..30).map(|i| record(i, Sex::Male, AgeBand::A18To29)).collect();
        let empirical = aggregate(&records, &[CrossCut::Global], &serial());
        let parametric = aggregate_parametric(
            &ParameterTable::literature(),
            &[CrossCut::Global],
            &AggregationConfig::default(),
        );
        let keys = |e: &BaselineEntry| -> Vec<String> {
            let v = serde_json::to_value(e).unwrap();
            let mut k: Vec<String> = v.as_object().unwrap().keys().cloned().collect();
            k.retain(|k| k != "min" && k != "max");
            k
        };
        assert_eq!(
            keys(&empirical.global["daily_steps"]),
            keys(&parametric.global["respiratory_rate"])
        );
    }
}

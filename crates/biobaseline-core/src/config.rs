//! Run configuration and the end-to-end pipeline.

use std::path::Path;

use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregationConfig, CrossCut, aggregate, aggregate_parametric};
use crate::baseline::{BaselineAssembler, BaselineReport, RunParameters};
use crate::cohort::{Cohort, CohortBuilder, StratificationPlan};
use crate::error::{Error, Result};
use crate::generator::EntityGenerator;
use crate::modulation::{CalendarModel, CircadianModel};
use crate::params::ParameterTable;

/// Generation and aggregation controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of virtual entities.
    pub people: u32,
    /// Consecutive days per entity.
    pub days: u32,
    pub start_date: NaiveDate,
    /// Run seed. `None` draws one from OS entropy; the drawn value is
    /// reported so the run can be repeated.
    pub seed: Option<u64>,
    pub plan: StratificationPlan,
    pub aggregation: AggregationConfig,
    /// Override of the per-metric day-to-day noise fraction.
    pub noise_fraction: Option<f64>,
    pub cross_cuts: Vec<CrossCut>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            people: 100,
            days: 30,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            seed: None,
            plan: StratificationPlan::default(),
            aggregation: AggregationConfig::default(),
            noise_fraction: None,
            cross_cuts: CrossCut::ALL.to_vec(),
        }
    }
}

impl RunConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(f) = self.noise_fraction {
            if !f.is_finite() || f < 0.0 {
                return Err(Error::InvalidPlan(format!(
                    "noise fraction must be finite and >= 0, got {f}"
                )));
            }
        }
        self.plan.validate()
    }
}

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub cohort: Cohort,
    pub report: BaselineReport,
}

/// Payloads plus configuration; `run` takes it from parameters to report.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub table: ParameterTable,
    pub circadian: CircadianModel,
    pub calendar: CalendarModel,
    pub config: RunConfig,
}

impl Pipeline {
    /// Pipeline over the built-in literature payloads.
    pub fn new(config: RunConfig) -> Self {
        Self {
            table: ParameterTable::literature(),
            circadian: CircadianModel::literature(),
            calendar: CalendarModel::literature(),
            config,
        }
    }

    pub fn with_table(mut self, table: ParameterTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_circadian(mut self, circadian: CircadianModel) -> Self {
        self.circadian = circadian;
        self
    }

    pub fn with_calendar(mut self, calendar: CalendarModel) -> Self {
        self.calendar = calendar;
        self
    }

    fn generator(&self) -> EntityGenerator<'_> {
        EntityGenerator::new(&self.table, &self.circadian, &self.calendar)
            .with_noise_fraction(self.config.noise_fraction)
    }

    /// Every configuration check the run depends on, with no generation.
    pub fn validate(&self) -> Result<()> {
        self.table.validate()?;
        self.circadian.validate()?;
        self.calendar.validate()?;
        self.config.validate()?;
        CohortBuilder::new(self.generator(), 0).validate_for(&self.config.plan)
    }

    /// Generate the cohort, aggregate it, and assemble the report.
    ///
    /// Fails before the first record on any configuration error; a
    /// generation failure returns before aggregation starts.
    pub fn run(&self) -> Result<PipelineOutput> {
        self.validate()?;
        let seed = self.config.seed.unwrap_or_else(rand::random);
        let cfg = &self.config;
        info!(
            "run: {} people x {} days from {} (seed {seed})",
            cfg.people, cfg.days, cfg.start_date
        );

        let cohort = CohortBuilder::new(self.generator(), seed)
            .with_parallel(cfg.aggregation.parallel)
            .build(cfg.people, cfg.days, cfg.start_date, &cfg.plan)?;
        info!("generated {} records", cohort.records.len());

        let tree = aggregate(&cohort.records, &cfg.cross_cuts, &cfg.aggregation);
        let report = BaselineAssembler::new(&self.table)
            .with_modulation(&self.circadian, &self.calendar)
            .assemble(
                tree,
                cohort.records.len(),
                Some(RunParameters {
                    num_people: cfg.people,
                    days_per_person: cfg.days,
                    start_date: cfg.start_date,
                    seed,
                    noise_fraction: cfg.noise_fraction,
                    min_count: cfg.aggregation.min_count,
                }),
            );
        for (cut, cells) in report.cell_counts() {
            info!("  {cut}: {cells} cells");
        }
        Ok(PipelineOutput { cohort, report })
    }

    /// Baselines from the parameter table alone, no simulation.
    pub fn parametric(&self) -> Result<BaselineReport> {
        self.table.validate()?;
        let tree = aggregate_parametric(&self.table, &self.config.cross_cuts, &self.config.aggregation);
        Ok(BaselineAssembler::new(&self.table)
            .with_source("Literature parameters (normal quantiles)")
            .assemble(tree, 0, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameter;
    use std::collections::BTreeMap;

    fn small(seed: u64) -> RunConfig {
        RunConfig {
            people: 12,
            days: 5,
            seed: Some(seed),
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let c = RunConfig::default();
        assert_eq!(c.people, 100);
        assert_eq!(c.days, 30);
        assert_eq!(c.start_date.to_string(), "2024-01-01");
        assert_eq!(c.aggregation.min_count, 30);
        assert_eq!(c.cross_cuts.len(), 6);
    }

    #[test]
    fn test_config_from_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{"people": 7, "seed": 3, "aggregation": {"min_count": 5}, "cross_cuts": ["global", "by_sex"]}"#,
        )
        .unwrap();
        let c = RunConfig::from_path(&path).unwrap();
        assert_eq!(c.people, 7);
        assert_eq!(c.days, 30);
        assert_eq!(c.seed, Some(3));
        assert_eq!(c.aggregation.min_count, 5);
        assert!(c.aggregation.parallel);
        assert_eq!(c.cross_cuts, vec![CrossCut::Global, CrossCut::BySex]);
    }

    #[test]
    fn test_negative_noise_rejected() {
        let c = RunConfig {
            noise_fraction: Some(-0.1),
            ..RunConfig::default()
        };
        assert!(Pipeline::new(c).run().is_err());
    }

    #[test]
    fn test_run_is_reproducible() {
        let a = Pipeline::new(small(11)).run().unwrap();
        let b = Pipeline::new(small(11)).run().unwrap();
        assert_eq!(a.cohort, b.cohort);
        assert_eq!(a.report.baselines, b.report.baselines);
        assert_eq!(a.report.total_records, 60);
        assert_eq!(a.report.parameters.as_ref().unwrap().seed, 11);
    }

    #[test]
    fn test_unseeded_run_reports_seed() {
        let c = RunConfig {
            people: 2,
            days: 1,
            ..RunConfig::default()
        };
        let out = Pipeline::new(c).run().unwrap();
        assert!(out.report.parameters.is_some());
    }

    #[test]
    fn test_missing_curve_aborts() {
        let p = Pipeline::new(small(1)).with_calendar(CalendarModel::new(BTreeMap::new()).unwrap());
        assert!(matches!(p.run().unwrap_err(), Error::MissingCurve { .. }));
    }

    #[test]
    fn test_missing_parameter_aborts() {
        let mut table = ParameterTable::literature();
        table.distributions.remove(&Parameter::Spo2);
        let p = Pipeline::new(small(1)).with_table(table);
        assert!(matches!(
            p.run().unwrap_err(),
            Error::MissingDistribution { .. }
        ));
    }

    #[test]
    fn test_parametric_report() {
        let report = Pipeline::new(RunConfig::default()).parametric().unwrap();
        assert_eq!(report.total_records, 0);
        assert!(report.parameters.is_none());
        assert_eq!(report.baselines.by_age_and_sex.len(), 12);
    }
}

//! Final export structure: baseline tree plus the metadata it was built from.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{BaselineTree, CrossCut};
use crate::modulation::{CalendarModel, CircadianModel};
use crate::params::{MetricSpec, ParameterTable};

pub const DEFAULT_SOURCE: &str = "Synthetic HealthKit Data Generator";

/// Generation controls echoed into the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    pub num_people: u32,
    pub days_per_person: u32,
    pub start_date: NaiveDate,
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_fraction: Option<f64>,
    pub min_count: usize,
}

/// Exported baselines with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineReport {
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub run_id: String,
    /// Absent for reports computed straight from parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<RunParameters>,
    pub total_records: usize,
    pub metric_metadata: BTreeMap<String, MetricSpec>,
    pub population_params_used: ParameterTable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circadian_patterns_used: Option<CircadianModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_patterns_used: Option<CalendarModel>,
    pub baselines: BaselineTree,
}

impl BaselineReport {
    /// Emitted cells per cross-cut.
    pub fn cell_counts(&self) -> Vec<(CrossCut, usize)> {
        CrossCut::ALL
            .into_iter()
            .map(|cut| (cut, self.baselines.cell_count(cut)))
            .collect()
    }
}

/// Composes table metadata and an aggregated tree into a [`BaselineReport`].
///
/// Pure structure: nothing is recomputed, and labels in the tree are passed
/// through exactly as the aggregator produced them.
#[derive(Debug, Clone)]
pub struct BaselineAssembler<'a> {
    table: &'a ParameterTable,
    circadian: Option<&'a CircadianModel>,
    calendar: Option<&'a CalendarModel>,
    source: String,
}

impl<'a> BaselineAssembler<'a> {
    pub fn new(table: &'a ParameterTable) -> Self {
        Self {
            table,
            circadian: None,
            calendar: None,
            source: DEFAULT_SOURCE.to_string(),
        }
    }

    pub fn with_modulation(mut self, circadian: &'a CircadianModel, calendar: &'a CalendarModel) -> Self {
        self.circadian = Some(circadian);
        self.calendar = Some(calendar);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn assemble(
        &self,
        baselines: BaselineTree,
        total_records: usize,
        parameters: Option<RunParameters>,
    ) -> BaselineReport {
        let metric_metadata = self
            .table
            .metrics
            .iter()
            .map(|(metric, spec)| (metric.name().to_string(), spec.clone()))
            .collect();
        BaselineReport {
            source: self.source.clone(),
            generated_at: Utc::now(),
            run_id: Uuid::new_v4().to_string(),
            parameters,
            total_records,
            metric_metadata,
            population_params_used: self.table.clone(),
            circadian_patterns_used: self.circadian.cloned(),
            calendar_patterns_used: self.calendar.cloned(),
            baselines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregationConfig, aggregate_parametric};

    #[test]
    fn test_envelope_fields() {
        let table = ParameterTable::literature();
        let tree = aggregate_parametric(&table, &CrossCut::ALL, &AggregationConfig::default());
        let report = BaselineAssembler::new(&table).assemble(tree, 0, None);
        let json = serde_json::to_value(&report).unwrap();
        for field in [
            "source",
            "generated_at",
            "run_id",
            "total_records",
            "metric_metadata",
            "population_params_used",
            "baselines",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert!(json.get("parameters").is_none());
        assert_eq!(json["metric_metadata"]["spo2"]["unit"], "%");
        assert_eq!(json["metric_metadata"]["daily_steps"]["thresholds"]["active"], ">=10000");
        assert!(json["baselines"]["by_sex"].is_object());
        assert_eq!(Uuid::parse_str(&report.run_id).unwrap().get_version_num(), 4);
    }

    #[test]
    fn test_tree_passed_through() {
        let table = ParameterTable::literature();
        let tree = aggregate_parametric(&table, &CrossCut::ALL, &AggregationConfig::default());
        let circadian = CircadianModel::literature();
        let calendar = CalendarModel::literature();
        let report = BaselineAssembler::new(&table)
            .with_modulation(&circadian, &calendar)
            .with_source("test")
            .assemble(tree.clone(), 10, None);
        assert_eq!(report.baselines, tree);
        assert_eq!(report.source, "test");
        assert_eq!(report.calendar_patterns_used, Some(calendar));
        let counts = report.cell_counts();
        assert_eq!(counts[0], (CrossCut::Global, 1));
    }

    #[test]
    fn test_report_round_trip() {
        let table = ParameterTable::literature();
        let tree = aggregate_parametric(&table, &[CrossCut::BySex], &AggregationConfig::default());
        let report = BaselineAssembler::new(&table).assemble(
            tree,
            35,
            Some(RunParameters {
                num_people: 5,
                days_per_person: 7,
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                seed: 42,
                noise_fraction: None,
                min_count: 30,
            }),
        );
        let text = serde_json::to_string(&report).unwrap();
        let back: BaselineReport = serde_json::from_str(&text).unwrap();
        assert_eq!(back, report);
    }
}

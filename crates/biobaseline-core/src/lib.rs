//! # biobaseline-core
//!
//! **Synthetic cohorts in, stratified reference baselines out.**
//!
//! `biobaseline-core` simulates daily wearable metrics (sleep and its stages,
//! steps, energy, distance, respiration, SpO2, resting heart rate, HRV) for a
//! virtual cohort, then reduces the record set to per-stratum descriptive
//! statistics suitable as reference distributions for anomaly scoring.
//!
//! ## Quick Start
//!
//! ```no_run
//! use biobaseline_core::{Pipeline, RunConfig};
//!
//! let config = RunConfig {
//!     people: 50,
//!     days: 14,
//!     seed: Some(42),
//!     ..RunConfig::default()
//! };
//! let output = Pipeline::new(config).run()?;
//! println!("{} records", output.report.total_records);
//! println!("{} sex cells", output.report.baselines.by_sex.len());
//! # Ok::<(), biobaseline_core::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ParameterTable + CircadianModel + CalendarModel → EntityGenerator →
//! CohortBuilder → records → aggregate → BaselineAssembler → report
//!
//! - Parameter lookups walk an explicit fallback chain from the entity's
//!   full stratum down to the unconditional entry. A parameter missing at
//!   every level aborts the run.
//! - Every entity draws from its own seeded stream, so cohorts are
//!   reproducible no matter how the rayon pool schedules them.
//! - Record aggregation and parameter-only aggregation both go through
//!   [`biobaseline_stats::Summarize`] and yield the same [`BaselineEntry`]
//!   shape. Cells below the suppression threshold are simply absent.
//! - [`cgm`] is library-only. It needs a caller-supplied
//!   [`cgm::GlucoseSimulator`], so neither [`Pipeline`] nor the CLI drives it.

pub mod aggregate;
pub mod baseline;
pub mod cgm;
pub mod cohort;
pub mod config;
pub mod entity;
pub mod error;
pub mod generator;
pub mod metric;
pub mod modulation;
pub mod params;
pub mod record;
pub mod strata;

pub use aggregate::{
    AggregationConfig, BaselineEntry, BaselineTree, CellTable, CrossCut, MetricTable, aggregate,
    aggregate_parametric,
};
pub use baseline::{BaselineAssembler, BaselineReport, RunParameters};
pub use cohort::{
    ActivityAssignment, Cohort, CohortBuilder, Coverage, DEFAULT_ACTIVITY_WEIGHTS,
    StratificationPlan, entity_seed,
};
pub use config::{Pipeline, PipelineOutput, RunConfig};
pub use entity::{IndividualOffsets, OffsetFamily, VirtualEntity};
pub use error::{Error, Result};
pub use generator::EntityGenerator;
pub use metric::{HourlyMetric, Metric};
pub use modulation::{CalendarCurve, CalendarModel, CircadianCurve, CircadianModel};
pub use params::{Distribution, MetricSpec, Parameter, ParameterTable};
pub use record::{BiometricRecord, HourlySample, SAMPLE_HOURS};
pub use strata::{ActivityLevel, AgeBand, Sex, StratumKey};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

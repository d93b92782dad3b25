//! Error taxonomy for the generation and aggregation pipeline.
//!
//! Only configuration problems are errors. Non-finite draws are repaired
//! inside the generator and undersized cells are omitted from the baseline
//! tree, so neither ever shows up here.

use thiserror::Error;

/// Configuration or boundary failure. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum Error {
    /// No distribution at any fallback level for a required parameter.
    #[error("no distribution for `{parameter}` at stratum `{stratum}` or any fallback")]
    MissingDistribution { parameter: String, stratum: String },

    /// A distribution with a negative or non-finite parameter.
    #[error("invalid distribution for `{parameter}` at `{stratum}`: {reason}")]
    InvalidDistribution {
        parameter: String,
        stratum: String,
        reason: String,
    },

    /// A modulation curve of the wrong length.
    #[error("curve `{curve}` must have {expected} multipliers, got {got}")]
    MalformedCurve {
        curve: String,
        expected: usize,
        got: usize,
    },

    /// A curve the generator needs is absent from the model.
    #[error("modulation curve `{curve}` is not defined")]
    MissingCurve { curve: String },

    /// A metric's hard range is empty or non-finite.
    #[error("invalid valid range for `{metric}`: [{min}, {max}]")]
    InvalidRange { metric: String, min: f64, max: f64 },

    /// A metric has no unit/range declaration.
    #[error("metric `{metric}` has no declared range")]
    MissingMetricSpec { metric: String },

    #[error("invalid stratification plan: {0}")]
    InvalidPlan(String),

    #[error("invalid stratum label: {0}")]
    InvalidStratum(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

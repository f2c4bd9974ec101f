//! Asset criticality scoring.
//!
//! Loads a table of network assets, min-max normalizes their risk attributes,
//! scores them with configurable weight scenarios, and plans field
//! inspections through stratified sampling. Inspection results feed back into
//! the ranking through reconciliation and regression-based imputation.
pub mod config;
pub mod error;
pub mod fixtures;
pub mod impute;
pub mod loader;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod reconcile;
pub mod reports;
pub mod sampling;
pub mod scenario;
pub mod scoring;
pub mod types;
pub mod util;

pub use config::AnalysisConfig;
pub use error::{Error, Result, ScoringError};
pub use normalize::{normalize, NormalizedTable};
pub use scenario::{compute, run_scenarios, Scenario};
pub use scoring::{rank, score, WeightConfig};
pub use types::{AssetRecord, Dataset};

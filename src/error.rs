// Error types for the scoring engine and the file-facing layer around it.
//
// `ScoringError` covers everything the engine itself can reject. `Error`
// wraps it together with the I/O and parsing failures of loaders and writers.
use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by normalization, scoring, sampling, reconciliation and
/// imputation. Every variant names the attribute or asset it is about.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    /// A requested attribute column does not exist in the dataset.
    #[error("attribute '{attribute}' is not present in the dataset")]
    MissingAttribute { attribute: String },

    /// A weight configuration references an attribute with no normalized column.
    #[error("weight configuration references unknown attribute '{attribute}'")]
    UnknownAttribute { attribute: String },

    /// An asset has no value for an attribute the dataset declares.
    #[error("asset '{asset_id}' has no value for attribute '{attribute}'")]
    MissingValue { asset_id: String, attribute: String },

    /// Every value of the attribute is identical, so min-max scaling is undefined.
    #[error("attribute '{attribute}' has a degenerate range (all values equal {value})")]
    DegenerateRange { attribute: String, value: f64 },

    /// No inspected assets were available to fit the imputation model.
    #[error("no inspected assets to fit on; {pending} assets left without an imputed measurement")]
    InsufficientTrainingData { pending: usize },

    /// The same asset id appears more than once within a single source table.
    #[error("asset id '{asset_id}' appears more than once in {table}")]
    JoinKeyConflict { asset_id: String, table: String },

    #[error("weight for '{attribute}' must be finite and non-negative, got {weight}")]
    InvalidWeight { attribute: String, weight: f64 },

    /// Overrides replace normalized cells, so they must lie in [0, 1].
    #[error("override for asset '{asset_id}' sets '{attribute}' to {value}, outside [0, 1]")]
    InvalidOverride {
        asset_id: String,
        attribute: String,
        value: f64,
    },

    #[error("discrepancy threshold must be finite and non-negative, got {threshold}")]
    InvalidThreshold { threshold: f64 },

    #[error("number of strata must be at least 1, got {strata}")]
    InvalidStrata { strata: usize },

    #[error("fraction must lie in [0, 1), got {fraction}")]
    InvalidFraction { fraction: f64 },

    #[error("dataset contains no assets")]
    EmptyDataset,
}

/// Errors surfaced by loading, configuration and report writing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("required input file not found: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("unsupported input format for {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("row {row}: {message}")]
    InvalidRow { row: usize, message: String },

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

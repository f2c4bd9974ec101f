// Analysis configuration: column names, attributes, weight scenarios and the
// knobs of sampling, reconciliation and imputation. Every field has a default,
// so an empty TOML file yields the reference configuration.
use crate::error::{Result, ScoringError};
use crate::impute::DEFAULT_HOLDOUT_FRACTION;
use crate::reconcile::DEFAULT_DISCREPANCY_THRESHOLD;
use crate::scenario::Scenario;
use crate::scoring::WeightConfig;
use crate::types::attr;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Source header names for the dataset's fields.
///
/// Attributes not listed here are read from a header with the attribute's
/// own name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub id: String,
    pub asset_type: String,
    pub locality: String,
    pub event_date: String,
    pub failure_frequency: String,
    pub operating_time: String,
    pub customers_affected: String,
    pub regulatory_impact: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        ColumnMap {
            id: "asset_id".to_string(),
            asset_type: "asset_type".to_string(),
            locality: "locality".to_string(),
            event_date: "event_date".to_string(),
            failure_frequency: attr::FAILURE_FREQUENCY.to_string(),
            operating_time: attr::OPERATING_TIME.to_string(),
            customers_affected: attr::CUSTOMERS_AFFECTED.to_string(),
            regulatory_impact: attr::REGULATORY_IMPACT.to_string(),
        }
    }
}

impl ColumnMap {
    pub fn header_for<'a>(&'a self, attribute: &'a str) -> &'a str {
        match attribute {
            attr::FAILURE_FREQUENCY => &self.failure_frequency,
            attr::OPERATING_TIME => &self.operating_time,
            attr::CUSTOMERS_AFFECTED => &self.customers_affected,
            attr::REGULATORY_IMPACT => &self.regulatory_impact,
            other => other,
        }
    }
}

/// What to do when an attribute cannot be normalized because min == max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegeneratePolicy {
    /// Exclude the attribute from normalization and from every scenario.
    #[default]
    Drop,
    /// Fail the whole run.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub strata: usize,
    pub sample_size: usize,
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            strata: 3,
            sample_size: 50,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputationConfig {
    pub holdout_fraction: f64,
    pub seed: u64,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        ImputationConfig {
            holdout_fraction: DEFAULT_HOLDOUT_FRACTION,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub columns: ColumnMap,
    /// Attributes to normalize, in order.
    pub attributes: Vec<String>,
    /// Attributes that may be missing from the source file.
    pub optional_attributes: Vec<String>,
    /// Weights scored as the `primary` scenario when no scenarios are listed.
    pub weights: WeightConfig,
    /// Scenarios for comparison; the primary weights are used when empty.
    pub scenarios: Vec<Scenario>,
    /// Treat the dataset as already normalized and skip min-max scaling.
    pub prenormalized: bool,
    pub on_degenerate: DegeneratePolicy,
    pub discrepancy_threshold: f64,
    pub top_k: usize,
    pub sampling: SamplingConfig,
    pub imputation: ImputationConfig,
}

fn reference_weights(ff: f64, ot: f64, ca: f64, ri: f64) -> WeightConfig {
    WeightConfig::new([
        (attr::FAILURE_FREQUENCY, ff),
        (attr::OPERATING_TIME, ot),
        (attr::CUSTOMERS_AFFECTED, ca),
        (attr::REGULATORY_IMPACT, ri),
    ])
    .unwrap_or_default()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let weights = reference_weights(0.4, 0.3, 0.2, 0.1);
        AnalysisConfig {
            columns: ColumnMap::default(),
            attributes: [
                attr::FAILURE_FREQUENCY,
                attr::OPERATING_TIME,
                attr::CUSTOMERS_AFFECTED,
                attr::REGULATORY_IMPACT,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            optional_attributes: Vec::new(),
            scenarios: vec![
                Scenario::new("baseline", weights.clone()),
                Scenario::new("regulatory_focus", reference_weights(0.3, 0.1, 0.1, 0.5)),
                Scenario::new("failure_focus", reference_weights(0.5, 0.2, 0.1, 0.2)),
            ],
            weights,
            prenormalized: false,
            on_degenerate: DegeneratePolicy::Drop,
            discrepancy_threshold: DEFAULT_DISCREPANCY_THRESHOLD,
            top_k: 10,
            sampling: SamplingConfig::default(),
            imputation: ImputationConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::parse(&contents)?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AnalysisConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScoringError> {
        if self.sampling.strata == 0 {
            return Err(ScoringError::InvalidStrata {
                strata: self.sampling.strata,
            });
        }
        let f = self.imputation.holdout_fraction;
        if !(0.0..1.0).contains(&f) {
            return Err(ScoringError::InvalidFraction { fraction: f });
        }
        let t = self.discrepancy_threshold;
        if !t.is_finite() || t < 0.0 {
            return Err(ScoringError::InvalidThreshold { threshold: t });
        }
        Ok(())
    }

    /// Scenarios to compare, falling back to the primary weights alone.
    pub fn scenario_list(&self) -> Vec<Scenario> {
        if self.scenarios.is_empty() {
            vec![Scenario::new("primary", self.weights.clone())]
        } else {
            self.scenarios.clone()
        }
    }

    pub fn scenario(&self, name: &str) -> Option<Scenario> {
        self.scenario_list().into_iter().find(|s| s.name == name)
    }

    pub fn is_optional(&self, attribute: &str) -> bool {
        self.optional_attributes.iter().any(|a| a == attribute)
    }
}

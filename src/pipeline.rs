// Load → normalize → score orchestration shared by every CLI command.
//
// A `Prepared` snapshot is built once per run. Everything downstream
// (scenarios, strata, reconciliation) reads it without modifying it.
use crate::config::{AnalysisConfig, DegeneratePolicy};
use crate::error::{Result, ScoringError};
use crate::impute::{impute, Imputation};
use crate::loader::{load_dataset, LoadReport};
use crate::normalize::{
    normalize, AttributeOutcome, AttributeOverrides, ColumnRange, NormalizedTable, OverrideReport,
};
use crate::reconcile::{reconcile, FieldMeasurements, Reconciliation};
use crate::sampling::{stratified_sample, stratify, Sample, Strata};
use crate::scenario::{compute, run_scenarios, Scenario, ScenarioReport, ScenarioResult};
use crate::scoring::WeightConfig;
use crate::types::Dataset;
use crate::util::min_max;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Prepared {
    pub dataset: Dataset,
    pub load: LoadReport,
    pub outcomes: Vec<(String, AttributeOutcome)>,
    pub table: NormalizedTable,
    /// Configured scenarios, in order, with dropped attributes removed.
    pub scenarios: Vec<Scenario>,
    /// Attributes removed from every weight configuration.
    pub dropped: Vec<String>,
    pub overrides: Option<OverrideReport>,
}

pub fn load_and_prepare(input: &Path, config: &AnalysisConfig) -> Result<Prepared> {
    let (dataset, load) = load_dataset(input, config)?;
    info!(
        path = %input.display(),
        rows = load.total_rows,
        assets = dataset.len(),
        duplicates = load.duplicate_rows,
        imputed = load.imputed_values,
        "dataset loaded"
    );
    prepare(dataset, load, config)
}

/// Normalize the dataset and apply the degenerate-attribute policy.
///
/// Under `Drop`, degenerate attributes and optional attributes missing from
/// the source are removed from every scenario. Under
/// `Abort`, the first degenerate attribute fails the run.
pub fn prepare(dataset: Dataset, load: LoadReport, config: &AnalysisConfig) -> Result<Prepared> {
    if dataset.is_empty() {
        return Err(ScoringError::EmptyDataset.into());
    }

    let (table, outcomes) = if config.prenormalized {
        prenormalized(&dataset, &config.attributes)?
    } else {
        let n = normalize(&dataset, &config.attributes);
        (n.table, n.outcomes)
    };

    let mut dropped = Vec::new();
    for (name, outcome) in &outcomes {
        match outcome {
            AttributeOutcome::Normalized(_) => {}
            AttributeOutcome::Failed(e) => return Err(e.clone().into()),
            AttributeOutcome::Degenerate(e) => {
                if config.on_degenerate == DegeneratePolicy::Abort {
                    return Err(e.clone().into());
                }
                warn!(attribute = name.as_str(), "degenerate attribute dropped from all scenarios");
                dropped.push(name.clone());
            }
            AttributeOutcome::Skipped if config.is_optional(name) => {
                debug!(attribute = name.as_str(), "optional attribute absent, dropped from weights");
                dropped.push(name.clone());
            }
            AttributeOutcome::Skipped => {}
        }
    }

    let strip = |w: &WeightConfig| dropped.iter().fold(w.clone(), |acc, a| acc.without(a));
    let scenarios = config
        .scenario_list()
        .iter()
        .map(|s| Scenario::new(s.name.clone(), strip(&s.weights)))
        .collect();

    Ok(Prepared {
        dataset,
        load,
        outcomes,
        table,
        scenarios,
        dropped,
        overrides: None,
    })
}

fn prenormalized(
    dataset: &Dataset,
    attributes: &[String],
) -> Result<(NormalizedTable, Vec<(String, AttributeOutcome)>), ScoringError> {
    let table = NormalizedTable::from_normalized(dataset)?;
    let outcomes = attributes
        .iter()
        .map(|name| {
            let outcome = match table.column(name).and_then(min_max) {
                Some((min, max)) => AttributeOutcome::Normalized(ColumnRange { min, max }),
                None => AttributeOutcome::Skipped,
            };
            (name.clone(), outcome)
        })
        .collect();
    Ok((table, outcomes))
}

impl Prepared {
    /// Replace the snapshot with one carrying the field-team overrides.
    pub fn apply_overrides(&mut self, overrides: &AttributeOverrides) -> &OverrideReport {
        let (table, report) = self.table.with_overrides(overrides);
        info!(
            rows = overrides.len(),
            applied = report.applied,
            unknown_assets = report.unknown_assets.len(),
            "overrides applied"
        );
        self.table = table;
        self.overrides.insert(report)
    }

    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Score the primary scenario: the first one, in configured order, that
    /// scores successfully. Every command ranks against this same result.
    pub fn primary(&self) -> Result<ScenarioResult, ScoringError> {
        let mut first_error = None;
        for scenario in &self.scenarios {
            match self.score(scenario) {
                Ok(result) => return Ok(result),
                Err(e) => {
                    debug!(scenario = scenario.name.as_str(), error = %e, "skipping failed scenario for primary");
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error.unwrap_or(ScoringError::EmptyDataset))
    }

    pub fn score(&self, scenario: &Scenario) -> Result<ScenarioResult, ScoringError> {
        compute(&self.table, &scenario.name, &scenario.weights)
    }

    pub fn run_scenarios(&self, top_k: usize) -> ScenarioReport {
        run_scenarios(&self.table, &self.scenarios, top_k)
    }
}

#[derive(Debug, Clone)]
pub struct Stratified {
    pub strata: Strata,
    pub sample: Sample,
}

pub fn plan_inspections(result: &ScenarioResult, config: &AnalysisConfig) -> Result<Stratified, ScoringError> {
    let strata = stratify(&result.scores, config.sampling.strata)?;
    let sample = stratified_sample(&strata, config.sampling.sample_size, config.sampling.seed);
    info!(
        scenario = result.name.as_str(),
        strata = strata.k(),
        sampled = sample.len(),
        "inspection sample drawn"
    );
    Ok(Stratified { strata, sample })
}

#[derive(Debug, Clone)]
pub struct Feedback {
    pub reconciliation: Reconciliation,
    pub imputation: Imputation,
}

pub fn process_feedback(
    result: &ScenarioResult,
    measurements: &FieldMeasurements,
    config: &AnalysisConfig,
) -> Result<Feedback, ScoringError> {
    let reconciliation = reconcile(&result.scores, measurements, config.discrepancy_threshold)?;
    let imputation = impute(
        &reconciliation,
        config.imputation.holdout_fraction,
        config.imputation.seed,
    )?;
    Ok(Feedback {
        reconciliation,
        imputation,
    })
}

/// Everything the `report` command writes.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub scenarios: ScenarioReport,
    pub primary: ScenarioResult,
    pub stratified: Stratified,
    pub feedback: Option<Feedback>,
}

/// Run scenarios, then stratify, sample and (when field data is given)
/// reconcile and impute against the primary scenario.
pub fn analyze(
    prepared: &Prepared,
    measurements: Option<&FieldMeasurements>,
    config: &AnalysisConfig,
) -> Result<Analysis> {
    let scenarios = prepared.run_scenarios(config.top_k);
    let primary = prepared.primary()?;
    let stratified = plan_inspections(&primary, config)?;
    let feedback = measurements
        .map(|m| process_feedback(&primary, m, config))
        .transpose()?;
    Ok(Analysis {
        scenarios,
        primary,
        stratified,
        feedback,
    })
}

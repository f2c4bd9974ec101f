use crate::config::AnalysisConfig;
use crate::impute::Imputation;
use crate::normalize::{AttributeOutcome, NormalizedTable};
use crate::output::render_records;
use crate::pipeline::{Analysis, Prepared};
use crate::reconcile::{Recommendation, Reconciliation};
use crate::sampling::{Sample, Strata};
use crate::scenario::{ComparisonTable, ScenarioResult};
use crate::types::{
    AttributeOutcomeRow, ImputationRow, PriorityRow, ReconciliationRow, SampleRow, StratumCount,
    SummaryStats,
};
use crate::util::{average, format_number, format_optional, min_max};
use std::fmt::Write;
use tabled::{settings::Style, Table};

pub fn attribute_outcome_rows(outcomes: &[(String, AttributeOutcome)]) -> Vec<AttributeOutcomeRow> {
    outcomes
        .iter()
        .map(|(name, outcome)| {
            let (status, min, max) = match outcome {
                AttributeOutcome::Normalized(r) => (
                    "normalized".to_string(),
                    format_number(r.min, 2),
                    format_number(r.max, 2),
                ),
                AttributeOutcome::Skipped => ("skipped (not in dataset)".to_string(), String::new(), String::new()),
                AttributeOutcome::Degenerate(e) => (format!("dropped: {}", e), String::new(), String::new()),
                AttributeOutcome::Failed(e) => (format!("error: {}", e), String::new(), String::new()),
            };
            AttributeOutcomeRow {
                attribute: name.clone(),
                status,
                min,
                max,
            }
        })
        .collect()
}

/// Normalized matrix as runtime-shaped records: `AssetId` plus one column per
/// attribute.
pub fn normalized_records(table: &NormalizedTable) -> (Vec<String>, Vec<Vec<String>>) {
    let attributes: Vec<&str> = table.attributes().collect();
    let mut headers = vec!["AssetId".to_string()];
    headers.extend(attributes.iter().map(|a| a.to_string()));
    let rows = table
        .ids()
        .iter()
        .map(|id| {
            let mut row = vec![id.clone()];
            row.extend(
                attributes
                    .iter()
                    .map(|a| format_optional(table.value(id, a), 4)),
            );
            row
        })
        .collect();
    (headers, rows)
}

/// Ranking of one scenario, with stratum labels when strata are known.
pub fn priority_rows(result: &ScenarioResult, strata: Option<&Strata>) -> Vec<PriorityRow> {
    result
        .ranking
        .entries()
        .iter()
        .map(|e| PriorityRow {
            rank: e.rank,
            asset_id: e.asset_id.clone(),
            criticality: format_number(e.score, 4),
            stratum: strata
                .and_then(|s| s.stratum_of(&e.asset_id).map(|i| s.label(i).to_string()))
                .unwrap_or_default(),
        })
        .collect()
}

pub fn sample_rows(sample: &Sample, strata: &Strata) -> Vec<SampleRow> {
    sample
        .picks
        .iter()
        .map(|p| SampleRow {
            asset_id: p.asset_id.clone(),
            criticality: format_number(p.score, 4),
            stratum: strata.label(p.stratum).to_string(),
        })
        .collect()
}

pub fn reconciliation_rows(reconciliation: &Reconciliation) -> Vec<ReconciliationRow> {
    reconciliation
        .rows
        .iter()
        .map(|r| ReconciliationRow {
            asset_id: r.asset_id.clone(),
            computed_score: format_optional(r.computed_score, 4),
            field_measurement: format_optional(r.field_measurement, 4),
            discrepancy: format_optional(r.discrepancy, 4),
            recommendation: r.recommendation.map(|x| x.to_string()).unwrap_or_default(),
            notes: r.notes.clone().unwrap_or_default(),
        })
        .collect()
}

pub fn imputation_rows(imputation: &Imputation) -> Vec<ImputationRow> {
    imputation
        .rows
        .iter()
        .map(|r| ImputationRow {
            asset_id: r.asset_id.clone(),
            computed_score: format_optional(r.computed_score, 4),
            field_measurement: format_optional(r.field.value(), 4),
            source: r.field.label().to_string(),
        })
        .collect()
}

/// Scenario pivot with a score and a rank column per scenario.
pub fn comparison_records(comparison: &ComparisonTable) -> (Vec<String>, Vec<Vec<String>>) {
    let mut headers = vec!["AssetId".to_string()];
    for name in &comparison.scenarios {
        headers.push(name.clone());
        headers.push(format!("{}_rank", name));
    }
    headers.push("MaxRankShift".to_string());

    let rows = comparison
        .rows
        .iter()
        .map(|r| {
            let mut row = vec![r.asset_id.clone()];
            for (score, rank) in r.scores.iter().zip(&r.ranks) {
                row.push(format_optional(*score, 4));
                row.push(rank.map(|x| x.to_string()).unwrap_or_default());
            }
            row.push(r.max_rank_shift.to_string());
            row
        })
        .collect();
    (headers, rows)
}

pub fn generate_summary(total_assets: usize, analysis: &Analysis) -> SummaryStats {
    let scores = analysis.primary.scores.scores();
    let strata = &analysis.stratified.strata;
    let sampled = &analysis.stratified.sample.per_stratum;
    let counts = strata
        .sizes()
        .iter()
        .enumerate()
        .map(|(i, &assets)| StratumCount {
            label: strata.label(i).to_string(),
            assets,
            sampled: sampled.get(i).copied().unwrap_or(0),
        })
        .collect();

    let mut summary = SummaryStats {
        total_assets,
        scenario: analysis.primary.name.clone(),
        mean_score: average(&scores),
        max_score: min_max(&scores).map(|(_, hi)| hi).unwrap_or(0.0),
        strata: counts,
        reassess: 0,
        retain: 0,
        imputed: 0,
        mse: None,
        r2: None,
    };
    if let Some(feedback) = &analysis.feedback {
        summary.reassess = feedback.reconciliation.count(Recommendation::Reassess);
        summary.retain = feedback.reconciliation.count(Recommendation::Retain);
        summary.imputed = feedback.imputation.imputed_count();
        if let Ok(d) = &feedback.imputation.fit {
            summary.mse = d.mse;
            summary.r2 = d.r2;
        }
    }
    summary
}

fn markdown<T: tabled::Tabled>(rows: Vec<T>) -> String {
    Table::new(rows).with(Style::markdown()).to_string()
}

/// Markdown analysis report: methodology, ranking, scenario comparison,
/// field reconciliation and recommendations.
pub fn render_report(prepared: &Prepared, analysis: &Analysis, config: &AnalysisConfig) -> String {
    let mut md = String::new();
    let summary = generate_summary(prepared.dataset.len(), analysis);

    // Writing into a String cannot fail.
    let _ = writeln!(md, "# Asset Criticality Report\n");
    let _ = writeln!(md, "## Methodology\n");
    let _ = writeln!(
        md,
        "Each attribute is min-max normalized to [0, 1] over the {} loaded assets. \
         The criticality score is the weighted sum of the normalized attributes; \
         weights are not rescaled.\n",
        prepared.dataset.len()
    );
    let _ = writeln!(md, "Weights of the primary scenario `{}`:\n", analysis.primary.name);
    let _ = writeln!(md, "| Attribute | Weight |\n|---|---|");
    if let Some(scenario) = prepared.scenario(&analysis.primary.name) {
        for (attribute, weight) in scenario.weights.iter() {
            let _ = writeln!(md, "| {} | {} |", attribute, format_number(weight, 2));
        }
    }
    let _ = writeln!(md);
    if !prepared.dropped.is_empty() {
        let _ = writeln!(
            md,
            "Excluded from scoring: {}.\n",
            prepared.dropped.join(", ")
        );
    }
    let _ = writeln!(md, "{}\n", markdown(attribute_outcome_rows(&prepared.outcomes)));

    let _ = writeln!(
        md,
        "## Top {} assets ({})\n",
        config.top_k, analysis.primary.name
    );
    let priorities: Vec<PriorityRow> = priority_rows(&analysis.primary, Some(&analysis.stratified.strata))
        .into_iter()
        .take(config.top_k)
        .collect();
    let _ = writeln!(md, "{}\n", markdown(priorities));

    let _ = writeln!(md, "## Scenario comparison\n");
    for (name, err) in analysis.scenarios.failed() {
        let _ = writeln!(md, "- scenario `{}` failed: {}", name, err);
    }
    let (headers, rows) = comparison_records(&analysis.scenarios.comparison);
    if rows.is_empty() {
        let _ = writeln!(md, "(no rows)\n");
    } else {
        let _ = writeln!(md, "{}\n", render_records(&headers, &rows, rows.len()));
    }

    let _ = writeln!(md, "## Inspection sample\n");
    for s in &summary.strata {
        let _ = writeln!(md, "- {}: {} assets, {} sampled", s.label, s.assets, s.sampled);
    }
    let _ = writeln!(md);

    let _ = writeln!(md, "## Field reconciliation\n");
    match &analysis.feedback {
        None => {
            let _ = writeln!(md, "No field measurements were provided.\n");
        }
        Some(feedback) => {
            let _ = writeln!(
                md,
                "- threshold: {}\n- reassess: {}\n- retain: {}\n- imputed measurements: {}",
                format_number(feedback.reconciliation.threshold, 2),
                summary.reassess,
                summary.retain,
                summary.imputed
            );
            match &feedback.imputation.fit {
                Ok(d) => {
                    let _ = writeln!(
                        md,
                        "- imputation model: measurement = {} + {} x score (train {}, test {}, MSE {}, R² {})\n",
                        format_number(d.fit.intercept, 4),
                        format_number(d.fit.slope, 4),
                        d.train_size,
                        d.test_size,
                        format_optional(d.mse, 4),
                        format_optional(d.r2, 4)
                    );
                }
                Err(e) => {
                    let _ = writeln!(md, "- imputation skipped: {}\n", e);
                }
            }
        }
    }

    let _ = writeln!(md, "## Recommendations\n");
    let _ = writeln!(
        md,
        "- Prioritize maintenance for the top-ranked assets above, highest score first."
    );
    if let Some(feedback) = &analysis.feedback {
        let reassess: Vec<&str> = feedback
            .reconciliation
            .rows
            .iter()
            .filter(|r| r.recommendation == Some(Recommendation::Reassess))
            .map(|r| r.asset_id.as_str())
            .collect();
        if !reassess.is_empty() {
            let _ = writeln!(
                md,
                "- Reassess assets whose field results disagree with the model: {}.",
                reassess.join(", ")
            );
        }
    }
    let unstable: Vec<&str> = analysis
        .scenarios
        .comparison
        .rows
        .iter()
        .filter(|r| r.max_rank_shift > config.top_k)
        .map(|r| r.asset_id.as_str())
        .collect();
    if !unstable.is_empty() {
        let _ = writeln!(
            md,
            "- Review weights for assets whose rank depends strongly on the scenario: {}.",
            unstable.join(", ")
        );
    }
    md
}

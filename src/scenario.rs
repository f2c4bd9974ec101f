// Named weight scenarios over one normalized snapshot, and the comparison
// table used to see how rankings move between them.
use crate::error::ScoringError;
use crate::normalize::NormalizedTable;
use crate::scoring::{rank, score, Ranking, ScoreTable, WeightConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub weights: WeightConfig,
}

impl Scenario {
    pub fn new(name: impl Into<String>, weights: WeightConfig) -> Self {
        Scenario {
            name: name.into(),
            weights,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioResult {
    pub name: String,
    pub scores: ScoreTable,
    pub ranking: Ranking,
}

/// Score and rank the table under one weight configuration.
///
/// This is the single request/response entry point: nothing is cached
/// between calls, so a newer request simply supersedes an older one.
pub fn compute(
    table: &NormalizedTable,
    name: &str,
    weights: &WeightConfig,
) -> Result<ScenarioResult, ScoringError> {
    let scores = score(table, weights)?;
    let ranking = rank(&scores);
    Ok(ScenarioResult {
        name: name.to_string(),
        scores,
        ranking,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    pub name: String,
    pub result: Result<ScenarioResult, ScoringError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub asset_id: String,
    /// One entry per scenario; `None` where the scenario failed.
    pub scores: Vec<Option<f64>>,
    pub ranks: Vec<Option<usize>>,
    /// Largest rank difference between any two successful scenarios.
    pub max_rank_shift: usize,
}

/// Asset × scenario pivot of scores for a chosen subset of assets.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ComparisonTable {
    pub scenarios: Vec<String>,
    pub rows: Vec<ComparisonRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioReport {
    pub outcomes: Vec<ScenarioOutcome>,
    pub comparison: ComparisonTable,
}

impl ScenarioReport {
    pub fn get(&self, name: &str) -> Option<&ScenarioResult> {
        self.outcomes
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.result.as_ref().ok())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ScenarioResult> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &ScoringError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.name.as_str(), e)))
    }

    /// The first scenario that scored successfully.
    pub fn primary(&self) -> Option<&ScenarioResult> {
        self.succeeded().next()
    }
}

/// Run every scenario against the same snapshot, in order.
///
/// A failing scenario is recorded and the rest still run. The comparison
/// covers the top `top_k` assets of the primary scenario.
pub fn run_scenarios(table: &NormalizedTable, scenarios: &[Scenario], top_k: usize) -> ScenarioReport {
    let outcomes: Vec<ScenarioOutcome> = scenarios
        .iter()
        .map(|s| {
            let result = compute(table, &s.name, &s.weights);
            match &result {
                Ok(r) => info!(scenario = s.name.as_str(), assets = r.scores.len(), "scenario scored"),
                Err(e) => warn!(scenario = s.name.as_str(), error = %e, "scenario failed"),
            }
            ScenarioOutcome {
                name: s.name.clone(),
                result,
            }
        })
        .collect();

    let comparison = compare(&outcomes, top_k);
    ScenarioReport {
        outcomes,
        comparison,
    }
}

fn compare(outcomes: &[ScenarioOutcome], top_k: usize) -> ComparisonTable {
    let scenarios = outcomes.iter().map(|o| o.name.clone()).collect();
    let Some(primary) = outcomes.iter().find_map(|o| o.result.as_ref().ok()) else {
        return ComparisonTable {
            scenarios,
            rows: Vec::new(),
        };
    };

    let rows = primary
        .ranking
        .top(top_k)
        .iter()
        .map(|entry| {
            let id = entry.asset_id.as_str();
            let (scores, ranks): (Vec<Option<f64>>, Vec<Option<usize>>) = outcomes
                .iter()
                .map(|o| match &o.result {
                    Ok(r) => (r.scores.get(id), r.ranking.rank_of(id)),
                    Err(_) => (None, None),
                })
                .unzip();
            let present: Vec<usize> = ranks.iter().flatten().copied().collect();
            let max_rank_shift = match (present.iter().min(), present.iter().max()) {
                (Some(lo), Some(hi)) => hi - lo,
                _ => 0,
            };
            ComparisonRow {
                asset_id: id.to_string(),
                scores,
                ranks,
                max_rank_shift,
            }
        })
        .collect();

    ComparisonTable { scenarios, rows }
}

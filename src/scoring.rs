// Weighted-sum criticality scoring and descending ranking.
use crate::error::ScoringError;
use crate::normalize::NormalizedTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable attribute → weight mapping.
///
/// Weights are finite and non-negative but deliberately not required to sum
/// to one: the score is a weighted sum, not a weighted average.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct WeightConfig {
    weights: BTreeMap<String, f64>,
}

impl WeightConfig {
    pub fn new<I, K>(weights: I) -> Result<Self, ScoringError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (name, weight) in weights {
            let name = name.into();
            if !weight.is_finite() || weight < 0.0 {
                return Err(ScoringError::InvalidWeight { attribute: name, weight });
            }
            map.insert(name, weight);
        }
        Ok(WeightConfig { weights: map })
    }

    pub fn get(&self, attribute: &str) -> Option<f64> {
        self.weights.get(attribute).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    /// A new configuration without the given attribute.
    pub fn without(&self, attribute: &str) -> WeightConfig {
        let mut weights = self.weights.clone();
        weights.remove(attribute);
        WeightConfig { weights }
    }
}

impl TryFrom<BTreeMap<String, f64>> for WeightConfig {
    type Error = ScoringError;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        WeightConfig::new(map)
    }
}

impl From<WeightConfig> for BTreeMap<String, f64> {
    fn from(config: WeightConfig) -> Self {
        config.weights
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetScore {
    pub asset_id: String,
    pub score: f64,
}

/// Per-asset scores in the table's row order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ScoreTable {
    entries: Vec<AssetScore>,
}

impl ScoreTable {
    pub fn from_entries(entries: Vec<AssetScore>) -> Self {
        ScoreTable { entries }
    }

    pub fn entries(&self) -> &[AssetScore] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, asset_id: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.asset_id == asset_id)
            .map(|e| e.score)
    }

    pub fn scores(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.score).collect()
    }
}

/// Compute `Σ weight[attr] * normalized[attr]` for every asset.
///
/// Every weighted attribute must have a normalized column; an unknown one is a
/// configuration error rather than a silent zero contribution.
pub fn score(table: &NormalizedTable, weights: &WeightConfig) -> Result<ScoreTable, ScoringError> {
    let mut totals = vec![0.0; table.len()];
    for (attribute, weight) in weights.iter() {
        let column = table
            .column(attribute)
            .ok_or_else(|| ScoringError::UnknownAttribute {
                attribute: attribute.to_string(),
            })?;
        for (total, value) in totals.iter_mut().zip(column) {
            *total += weight * value;
        }
    }
    let entries = table
        .ids()
        .iter()
        .zip(totals)
        .map(|(id, score)| AssetScore {
            asset_id: id.clone(),
            score,
        })
        .collect();
    Ok(ScoreTable { entries })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedAsset {
    pub rank: usize,
    pub asset_id: String,
    pub score: f64,
}

/// Assets ordered by descending score; ties keep their row order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Ranking {
    entries: Vec<RankedAsset>,
}

impl Ranking {
    pub fn entries(&self) -> &[RankedAsset] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.asset_id.as_str()).collect()
    }

    pub fn top(&self, k: usize) -> &[RankedAsset] {
        &self.entries[..k.min(self.entries.len())]
    }

    pub fn rank_of(&self, asset_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.asset_id == asset_id)
            .map(|e| e.rank)
    }
}

pub fn rank(scores: &ScoreTable) -> Ranking {
    let mut ordered: Vec<&AssetScore> = scores.entries.iter().collect();
    // `sort_by` is stable, so equal scores keep their original row order.
    ordered.sort_by(|a, b| b.score.total_cmp(&a.score));
    let entries = ordered
        .into_iter()
        .enumerate()
        .map(|(i, e)| RankedAsset {
            rank: i + 1,
            asset_id: e.asset_id.clone(),
            score: e.score,
        })
        .collect();
    Ranking { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::{attr, AssetRecord, Dataset};

    fn table(rows: &[(&str, f64, f64)]) -> NormalizedTable {
        let ds = Dataset::new(
            rows.iter()
                .map(|(id, ff, ri)| {
                    AssetRecord::new(*id)
                        .with_attribute(attr::FAILURE_FREQUENCY, *ff)
                        .with_attribute(attr::REGULATORY_IMPACT, *ri)
                })
                .collect(),
        )
        .unwrap();
        normalize(&ds, &[attr::FAILURE_FREQUENCY, attr::REGULATORY_IMPACT]).table
    }

    #[test]
    fn end_to_end_three_assets() {
        let t = table(&[("asset1", 2.0, 0.0), ("asset2", 8.0, 1.0), ("asset3", 5.0, 2.0)]);
        let w = WeightConfig::new([(attr::FAILURE_FREQUENCY, 1.0)]).unwrap();
        let scores = score(&t, &w).unwrap();
        assert_eq!(scores.scores(), vec![0.0, 1.0, 0.5]);
        assert_eq!(rank(&scores).ids(), vec!["asset2", "asset3", "asset1"]);
    }

    #[test]
    fn weights_are_not_rescaled() {
        let t = table(&[("a", 0.0, 0.0), ("b", 10.0, 10.0)]);
        let w = WeightConfig::new([(attr::FAILURE_FREQUENCY, 2.0), (attr::REGULATORY_IMPACT, 3.0)]).unwrap();
        let scores = score(&t, &w).unwrap();
        assert_eq!(scores.get("b"), Some(5.0));
        assert_eq!(w.total(), 5.0);
    }

    #[test]
    fn unknown_attribute_is_an_error() {
        let t = table(&[("a", 0.0, 0.0), ("b", 10.0, 10.0)]);
        let w = WeightConfig::new([("operating_time", 0.5)]).unwrap();
        assert_eq!(
            score(&t, &w).unwrap_err(),
            ScoringError::UnknownAttribute { attribute: "operating_time".to_string() }
        );
    }

    #[test]
    fn negative_and_nan_weights_are_rejected() {
        assert!(matches!(
            WeightConfig::new([("x", -0.1)]),
            Err(ScoringError::InvalidWeight { .. })
        ));
        assert!(WeightConfig::new([("x", f64::NAN)]).is_err());
        assert!(WeightConfig::new([("x", 0.0)]).is_ok());
    }

    #[test]
    fn ties_keep_row_order_and_ranking_is_repeatable() {
        let t = table(&[("a", 5.0, 0.0), ("b", 10.0, 0.0), ("c", 5.0, 0.0), ("d", 0.0, 1.0)]);
        let w = WeightConfig::new([(attr::FAILURE_FREQUENCY, 1.0)]).unwrap();
        let first = rank(&score(&t, &w).unwrap());
        let second = rank(&score(&t, &w).unwrap());
        assert_eq!(first.ids(), vec!["b", "a", "c", "d"]);
        assert_eq!(first, second);
        assert_eq!(first.rank_of("c"), Some(3));
        assert_eq!(first.top(2).len(), 2);
        assert_eq!(first.top(10).len(), 4);
    }

    #[test]
    fn weight_config_deserializes_with_validation() {
        let ok: WeightConfig = serde_json::from_str(r#"{"failure_frequency": 0.4}"#).unwrap();
        assert_eq!(ok.get(attr::FAILURE_FREQUENCY), Some(0.4));
        assert!(serde_json::from_str::<WeightConfig>(r#"{"failure_frequency": -1.0}"#).is_err());
        assert_eq!(ok.without(attr::FAILURE_FREQUENCY).len(), 0);
    }
}

// Merging computed scores with field measurements and flagging assets whose
// inspection result disagrees with the model.
use crate::error::ScoringError;
use crate::scoring::ScoreTable;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::debug;

/// Relative discrepancy above which an asset is sent back for reassessment.
pub const DEFAULT_DISCREPANCY_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Reassess,
    Retain,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Reassess => "reassess",
            Recommendation::Retain => "retain",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inspection result. A blank measurement is kept as `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMeasurement {
    pub asset_id: String,
    pub measurement: Option<f64>,
    pub notes: Option<String>,
}

impl FieldMeasurement {
    pub fn new(asset_id: impl Into<String>, measurement: f64) -> Self {
        FieldMeasurement {
            asset_id: asset_id.into(),
            measurement: Some(measurement),
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldMeasurements {
    rows: Vec<FieldMeasurement>,
}

impl FieldMeasurements {
    pub fn new(rows: Vec<FieldMeasurement>) -> Result<Self, ScoringError> {
        let mut seen = HashSet::new();
        for r in &rows {
            if !seen.insert(r.asset_id.as_str()) {
                return Err(ScoringError::JoinKeyConflict {
                    asset_id: r.asset_id.clone(),
                    table: "field measurement table".to_string(),
                });
            }
        }
        Ok(FieldMeasurements { rows })
    }

    pub fn rows(&self) -> &[FieldMeasurement] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReconciledAsset {
    pub asset_id: String,
    pub computed_score: Option<f64>,
    pub field_measurement: Option<f64>,
    pub discrepancy: Option<f64>,
    pub recommendation: Option<Recommendation>,
    pub notes: Option<String>,
}

/// `|computed - field| / computed`, undefined when the computed score is zero.
pub fn discrepancy(computed: f64, field: f64) -> Option<f64> {
    if computed == 0.0 {
        return None;
    }
    Some((computed - field).abs() / computed)
}

pub fn recommend(discrepancy: f64, threshold: f64) -> Recommendation {
    if discrepancy > threshold {
        Recommendation::Reassess
    } else {
        Recommendation::Retain
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reconciliation {
    pub rows: Vec<ReconciledAsset>,
    pub threshold: f64,
}

impl Reconciliation {
    pub fn count(&self, recommendation: Recommendation) -> usize {
        self.rows
            .iter()
            .filter(|r| r.recommendation == Some(recommendation))
            .count()
    }

    pub fn get(&self, asset_id: &str) -> Option<&ReconciledAsset> {
        self.rows.iter().find(|r| r.asset_id == asset_id)
    }
}

/// Outer-join scores and measurements on asset id.
///
/// Rows come out sorted by id. Assets known to only one side survive with the
/// other side absent, and get neither a discrepancy nor a recommendation.
pub fn reconcile(
    scores: &ScoreTable,
    measurements: &FieldMeasurements,
    threshold: f64,
) -> Result<Reconciliation, ScoringError> {
    let mut merged: BTreeMap<String, ReconciledAsset> = BTreeMap::new();

    for entry in scores.entries() {
        if merged.contains_key(&entry.asset_id) {
            return Err(ScoringError::JoinKeyConflict {
                asset_id: entry.asset_id.clone(),
                table: "score table".to_string(),
            });
        }
        merged.insert(
            entry.asset_id.clone(),
            ReconciledAsset {
                asset_id: entry.asset_id.clone(),
                computed_score: Some(entry.score),
                ..Default::default()
            },
        );
    }

    for m in measurements.rows() {
        let row = merged
            .entry(m.asset_id.clone())
            .or_insert_with(|| ReconciledAsset {
                asset_id: m.asset_id.clone(),
                ..Default::default()
            });
        row.field_measurement = m.measurement;
        row.notes = m.notes.clone();
    }

    for row in merged.values_mut() {
        if let (Some(computed), Some(field)) = (row.computed_score, row.field_measurement) {
            row.discrepancy = discrepancy(computed, field);
            row.recommendation = row.discrepancy.map(|d| recommend(d, threshold));
            if row.discrepancy.is_none() {
                debug!(asset_id = row.asset_id.as_str(), "zero computed score, discrepancy undefined");
            }
        }
    }

    Ok(Reconciliation {
        rows: merged.into_values().collect(),
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::AssetScore;

    fn scores(rows: &[(&str, f64)]) -> ScoreTable {
        ScoreTable::from_entries(
            rows.iter()
                .map(|(id, s)| AssetScore {
                    asset_id: id.to_string(),
                    score: *s,
                })
                .collect(),
        )
    }

    #[test]
    fn discrepancy_examples() {
        let d = discrepancy(0.80, 0.60).unwrap();
        assert!((d - 0.25).abs() < 1e-12);
        assert_eq!(recommend(d, DEFAULT_DISCREPANCY_THRESHOLD), Recommendation::Reassess);

        let d = discrepancy(0.75, 0.74).unwrap();
        assert!((d - 0.013333).abs() < 1e-5);
        assert_eq!(recommend(d, DEFAULT_DISCREPANCY_THRESHOLD), Recommendation::Retain);

        assert_eq!(discrepancy(0.0, 0.5), None);
    }

    #[test]
    fn discrepancy_is_relative_to_the_computed_score() {
        assert_eq!(discrepancy(1.0, 0.0), Some(1.0));
        assert_eq!(discrepancy(0.0, 1.0), None);
        assert_eq!(recommend(0.1, 0.1), Recommendation::Retain);
    }

    #[test]
    fn outer_join_keeps_both_sides() {
        let s = scores(&[("A003", 0.8), ("A001", 0.75), ("A004", 0.0)]);
        let m = FieldMeasurements::new(vec![
            FieldMeasurement::new("A001", 0.74),
            FieldMeasurement::new("A002", 0.7),
            FieldMeasurement::new("A004", 0.3),
            FieldMeasurement {
                asset_id: "A003".into(),
                measurement: Some(0.6),
                notes: Some("needs repair".into()),
            },
        ])
        .unwrap();

        let rec = reconcile(&s, &m, DEFAULT_DISCREPANCY_THRESHOLD).unwrap();
        let ids: Vec<&str> = rec.rows.iter().map(|r| r.asset_id.as_str()).collect();
        assert_eq!(ids, vec!["A001", "A002", "A003", "A004"]);

        let a2 = rec.get("A002").unwrap();
        assert_eq!(a2.computed_score, None);
        assert_eq!(a2.recommendation, None);

        let a3 = rec.get("A003").unwrap();
        assert_eq!(a3.recommendation, Some(Recommendation::Reassess));
        assert_eq!(a3.notes.as_deref(), Some("needs repair"));

        let a4 = rec.get("A004").unwrap();
        assert_eq!(a4.field_measurement, Some(0.3));
        assert_eq!(a4.discrepancy, None);
        assert_eq!(a4.recommendation, None);

        assert_eq!(rec.count(Recommendation::Reassess), 1);
        assert_eq!(rec.count(Recommendation::Retain), 1);
    }

    #[test]
    fn unmeasured_assets_are_absent_not_zero() {
        let s = scores(&[("A001", 0.5)]);
        let m = FieldMeasurements::new(vec![FieldMeasurement {
            asset_id: "A001".into(),
            measurement: None,
            notes: None,
        }])
        .unwrap();
        let rec = reconcile(&s, &m, 0.1).unwrap();
        let row = rec.get("A001").unwrap();
        assert_eq!(row.field_measurement, None);
        assert_eq!(row.discrepancy, None);
    }

    #[test]
    fn duplicate_ids_conflict() {
        let err = FieldMeasurements::new(vec![
            FieldMeasurement::new("A001", 0.1),
            FieldMeasurement::new("A001", 0.2),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ScoringError::JoinKeyConflict {
                asset_id: "A001".into(),
                table: "field measurement table".into()
            }
        );

        let s = scores(&[("A001", 0.1), ("A001", 0.2)]);
        assert!(reconcile(&s, &FieldMeasurements::default(), 0.1).is_err());
    }
}

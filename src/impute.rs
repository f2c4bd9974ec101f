// Estimating field measurements for assets that were never inspected, from a
// straight-line fit of measurement on computed score.
use crate::error::ScoringError;
use crate::reconcile::Reconciliation;
use crate::util::average;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, warn};

pub const DEFAULT_HOLDOUT_FRACTION: f64 = 0.2;

/// Where an asset's field measurement came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Observed(f64),
    Imputed(f64),
    /// No model was available; nothing was fabricated.
    NotImputed,
}

impl FieldValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            FieldValue::Observed(v) | FieldValue::Imputed(v) => Some(*v),
            FieldValue::NotImputed => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FieldValue::Observed(_) => "observed",
            FieldValue::Imputed(_) => "imputed",
            FieldValue::NotImputed => "not imputed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImputedAsset {
    pub asset_id: String,
    pub computed_score: Option<f64>,
    pub field: FieldValue,
}

/// `y = intercept + slope * x`, fitted by ordinary least squares.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// With fewer than two distinct x values the slope is zero and the line
    /// passes through the mean of y.
    pub fn fit(xs: &[f64], ys: &[f64]) -> LinearFit {
        let mx = average(xs);
        let my = average(ys);
        let (sxy, sxx) = xs
            .iter()
            .zip(ys)
            .fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
                (sxy + (x - mx) * (y - my), sxx + (x - mx) * (x - mx))
            });
        let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
        LinearFit {
            slope,
            intercept: my - slope * mx,
        }
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionDiagnostics {
    pub fit: LinearFit,
    pub train_size: usize,
    pub test_size: usize,
    /// Mean squared error on the held-out rows; `None` when none were held out.
    pub mse: Option<f64>,
    /// Coefficient of determination on the held-out rows; `None` when it is
    /// undefined (fewer than two rows or constant measurements).
    pub r2: Option<f64>,
    pub imputed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Imputation {
    pub rows: Vec<ImputedAsset>,
    /// The fitted model, or the soft error explaining why there is none.
    pub fit: Result<RegressionDiagnostics, ScoringError>,
}

impl Imputation {
    pub fn imputed_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r.field, FieldValue::Imputed(_)))
            .count()
    }

    pub fn not_imputed_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.field == FieldValue::NotImputed)
            .count()
    }

    pub fn get(&self, asset_id: &str) -> Option<&ImputedAsset> {
        self.rows.iter().find(|r| r.asset_id == asset_id)
    }
}

fn mse(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() {
        return None;
    }
    let errors: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p) * (a - p))
        .collect();
    Some(average(&errors))
}

fn r2(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.len() < 2 {
        return None;
    }
    let mean = average(actual);
    let ss_tot: f64 = actual.iter().map(|a| (a - mean) * (a - mean)).sum();
    if ss_tot == 0.0 {
        return None;
    }
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p) * (a - p))
        .sum();
    Some(1.0 - ss_res / ss_tot)
}

/// Fit on inspected assets and fill in the non-inspected ones.
///
/// A seeded random `holdout_fraction` of the inspected rows (rounded up) is
/// kept aside for MSE / R²; when that would leave nothing to train on, every
/// inspected row is used for training. With no inspected rows at all the
/// non-inspected assets are marked `NotImputed` and `fit` carries
/// `InsufficientTrainingData`.
pub fn impute(
    reconciliation: &Reconciliation,
    holdout_fraction: f64,
    seed: u64,
) -> Result<Imputation, ScoringError> {
    if !(0.0..1.0).contains(&holdout_fraction) {
        return Err(ScoringError::InvalidFraction {
            fraction: holdout_fraction,
        });
    }

    let inspected: Vec<(f64, f64)> = reconciliation
        .rows
        .iter()
        .filter_map(|r| Some((r.computed_score?, r.field_measurement?)))
        .collect();
    let pending = reconciliation
        .rows
        .iter()
        .filter(|r| r.field_measurement.is_none())
        .count();

    let fit = if inspected.is_empty() {
        warn!(pending, "no inspected assets, imputation skipped");
        Err(ScoringError::InsufficientTrainingData { pending })
    } else {
        Ok(fit_with_holdout(&inspected, holdout_fraction, seed))
    };

    let rows: Vec<ImputedAsset> = reconciliation
        .rows
        .iter()
        .map(|r| {
            let field = match (r.field_measurement, r.computed_score, &fit) {
                (Some(v), _, _) => FieldValue::Observed(v),
                (None, Some(score), Ok(d)) => FieldValue::Imputed(d.fit.predict(score)),
                _ => FieldValue::NotImputed,
            };
            ImputedAsset {
                asset_id: r.asset_id.clone(),
                computed_score: r.computed_score,
                field,
            }
        })
        .collect();

    let imputed = rows
        .iter()
        .filter(|r| matches!(r.field, FieldValue::Imputed(_)))
        .count();
    let fit = fit.map(|mut d| {
        d.imputed = imputed;
        info!(
            train = d.train_size,
            test = d.test_size,
            mse = ?d.mse,
            r2 = ?d.r2,
            imputed,
            "imputation model fitted"
        );
        d
    });

    Ok(Imputation { rows, fit })
}

fn fit_with_holdout(pairs: &[(f64, f64)], holdout_fraction: f64, seed: u64) -> RegressionDiagnostics {
    let n = pairs.len();
    let mut test_size = (holdout_fraction * n as f64).ceil() as usize;
    if test_size >= n {
        test_size = 0;
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    let (test_idx, train_idx) = order.split_at(test_size);

    let (train_x, train_y): (Vec<f64>, Vec<f64>) = train_idx.iter().map(|&i| pairs[i]).unzip();
    let fit = LinearFit::fit(&train_x, &train_y);

    let (test_x, test_y): (Vec<f64>, Vec<f64>) = test_idx.iter().map(|&i| pairs[i]).unzip();
    let predicted: Vec<f64> = test_x.iter().map(|&x| fit.predict(x)).collect();

    RegressionDiagnostics {
        fit,
        train_size: train_idx.len(),
        test_size,
        mse: mse(&test_y, &predicted),
        r2: r2(&test_y, &predicted),
        imputed: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::ReconciledAsset;

    fn rec(rows: &[(&str, Option<f64>, Option<f64>)]) -> Reconciliation {
        Reconciliation {
            rows: rows
                .iter()
                .map(|(id, score, field)| ReconciledAsset {
                    asset_id: id.to_string(),
                    computed_score: *score,
                    field_measurement: *field,
                    ..Default::default()
                })
                .collect(),
            threshold: 0.1,
        }
    }

    #[test]
    fn least_squares_fit() {
        let fit = LinearFit::fit(&[0.0, 1.0, 2.0], &[1.0, 3.0, 5.0]);
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);

        let flat = LinearFit::fit(&[0.5, 0.5], &[0.2, 0.4]);
        assert_eq!(flat.slope, 0.0);
        assert!((flat.predict(9.0) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn imputes_from_linear_relationship() {
        let mut rows: Vec<(String, Option<f64>, Option<f64>)> = (0..10)
            .map(|i| {
                let x = i as f64 / 10.0;
                (format!("A{:03}", i), Some(x), Some(0.1 + 0.5 * x))
            })
            .collect();
        rows.push(("B001".into(), Some(0.4), None));
        rows.push(("B002".into(), None, None));
        let borrowed: Vec<(&str, Option<f64>, Option<f64>)> =
            rows.iter().map(|(id, s, f)| (id.as_str(), *s, *f)).collect();

        let out = impute(&rec(&borrowed), DEFAULT_HOLDOUT_FRACTION, 42).unwrap();
        let diag = out.fit.as_ref().unwrap();
        assert_eq!(diag.test_size, 2);
        assert_eq!(diag.train_size, 8);
        assert!(diag.mse.unwrap() < 1e-20);
        assert!((diag.r2.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(diag.imputed, 1);

        match out.get("B001").unwrap().field {
            FieldValue::Imputed(v) => assert!((v - 0.3).abs() < 1e-9),
            other => panic!("expected imputed value, got {other:?}"),
        }
        assert_eq!(out.get("B002").unwrap().field, FieldValue::NotImputed);
        assert!(matches!(out.get("A003").unwrap().field, FieldValue::Observed(_)));
    }

    #[test]
    fn no_training_data_falls_back_to_marker() {
        let out = impute(
            &rec(&[("A001", Some(0.8), None), ("A002", Some(0.0), None)]),
            DEFAULT_HOLDOUT_FRACTION,
            42,
        )
        .unwrap();
        assert_eq!(out.fit, Err(ScoringError::InsufficientTrainingData { pending: 2 }));
        for row in &out.rows {
            assert_eq!(row.field, FieldValue::NotImputed);
            assert_eq!(row.field.value(), None);
        }
        assert_eq!(out.imputed_count(), 0);
        assert_eq!(out.not_imputed_count(), 2);
    }

    #[test]
    fn single_inspected_row_trains_without_holdout() {
        let out = impute(&rec(&[("A001", Some(0.5), Some(0.7)), ("A002", Some(0.9), None)]), 0.2, 1).unwrap();
        let diag = out.fit.as_ref().unwrap();
        assert_eq!(diag.train_size, 1);
        assert_eq!(diag.test_size, 0);
        assert_eq!(diag.mse, None);
        assert_eq!(diag.r2, None);
        assert_eq!(out.get("A002").unwrap().field, FieldValue::Imputed(0.7));
    }

    #[test]
    fn holdout_split_is_seeded() {
        let rows: Vec<(String, Option<f64>, Option<f64>)> = (0..20)
            .map(|i| (format!("A{:03}", i), Some(i as f64), Some((i * i) as f64)))
            .collect();
        let borrowed: Vec<(&str, Option<f64>, Option<f64>)> =
            rows.iter().map(|(id, s, f)| (id.as_str(), *s, *f)).collect();
        let r = rec(&borrowed);
        assert_eq!(impute(&r, 0.2, 7).unwrap(), impute(&r, 0.2, 7).unwrap());
    }

    #[test]
    fn rejects_invalid_fraction() {
        assert!(matches!(
            impute(&rec(&[]), 1.0, 0),
            Err(ScoringError::InvalidFraction { .. })
        ));
    }
}

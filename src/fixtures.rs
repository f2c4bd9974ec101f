// Synthetic demo inputs.
//
// This is a separate, explicitly requested code path (`generate` command):
// production loading never falls back to anything produced here.
use crate::error::Result;
use crate::output::write_csv;
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

const ASSET_TYPES: [&str; 5] = ["Transformer", "Recloser", "Insulator", "Sectionalizer", "Cable"];
const LOCALITIES: [&str; 4] = ["North Zone", "South Zone", "Center", "West Zone"];
const CUSTOMER_BANDS: [u64; 5] = [50, 100, 200, 500, 1000];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntheticAsset {
    pub asset_id: String,
    pub failure_frequency: u32,
    pub operating_time: f64,
    pub customers_affected: u64,
    pub regulatory_impact: f64,
    pub asset_type: String,
    pub locality: String,
    pub event_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldTemplateRow {
    pub asset_id: String,
    pub measurement: f64,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideTemplateRow {
    pub asset_id: String,
    pub failure_frequency: f64,
    pub regulatory_impact: f64,
}

pub fn asset_id(n: usize) -> String {
    format!("A-{:04}", n)
}

/// `count` random assets with one failure event per day from 1990-01-01.
pub fn synthetic_assets(count: usize, seed: u64) -> Vec<SyntheticAsset> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap_or_default();
    (1..=count)
        .map(|i| SyntheticAsset {
            asset_id: asset_id(i),
            failure_frequency: rng.gen_range(0..10),
            operating_time: round2(rng.gen_range(0.5..50.0)),
            customers_affected: *CUSTOMER_BANDS.choose(&mut rng).unwrap_or(&CUSTOMER_BANDS[0]),
            regulatory_impact: round2(rng.gen_range(0.0..50.0)),
            asset_type: ASSET_TYPES.choose(&mut rng).unwrap_or(&ASSET_TYPES[0]).to_string(),
            locality: LOCALITIES.choose(&mut rng).unwrap_or(&LOCALITIES[0]).to_string(),
            event_date: start + Duration::days(i as i64 - 1),
        })
        .collect()
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn field_template() -> Vec<FieldTemplateRow> {
    [
        (1, 0.80, "No issues found."),
        (2, 0.70, "Minor adjustments."),
        (3, 0.60, "Review required."),
    ]
    .iter()
    .map(|(i, m, n)| FieldTemplateRow {
        asset_id: asset_id(*i),
        measurement: *m,
        notes: n.to_string(),
    })
    .collect()
}

pub fn override_template() -> Vec<OverrideTemplateRow> {
    vec![
        OverrideTemplateRow {
            asset_id: asset_id(1),
            failure_frequency: 0.45,
            regulatory_impact: 0.75,
        },
        OverrideTemplateRow {
            asset_id: asset_id(2),
            failure_frequency: 0.35,
            regulatory_impact: 0.65,
        },
    ]
}

#[derive(Debug, Clone)]
pub struct FixturePaths {
    pub assets: PathBuf,
    pub field: PathBuf,
    pub overrides: PathBuf,
}

/// Write the synthetic dataset and both templates into `dir`.
pub fn write_fixtures(dir: &Path, count: usize, seed: u64) -> Result<FixturePaths> {
    std::fs::create_dir_all(dir)?;
    let paths = FixturePaths {
        assets: dir.join("assets.csv"),
        field: dir.join("field_measurements.csv"),
        overrides: dir.join("overrides.csv"),
    };
    write_csv(&paths.assets, &synthetic_assets(count, seed))?;
    write_csv(&paths.field, &field_template())?;
    write_csv(&paths.overrides, &override_template())?;
    info!(dir = %dir.display(), assets = count, "synthetic fixtures written");
    Ok(paths)
}

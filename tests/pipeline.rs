use asset_criticality::config::AnalysisConfig;
use asset_criticality::error::{Error, ScoringError};
use asset_criticality::fixtures::write_fixtures;
use asset_criticality::loader::{load_dataset, load_field_measurements, load_overrides};
use asset_criticality::output::{write_csv, write_json, write_records};
use asset_criticality::pipeline::{analyze, load_and_prepare};
use asset_criticality::reconcile::Recommendation;
use asset_criticality::reports;
use std::fs;
use std::path::Path;

const ASSETS: &str = "\
asset_id,failure_frequency,operating_time,customers_affected,regulatory_impact,asset_type,locality,event_date
A-0001,2,10,100,5,Transformer,North Zone,1990-01-01
A-0002,8,30,500,20,Recloser,South Zone,1990-01-02
A-0003,5,20,,10,Cable,Center,1990-01-03
A-0004,0,40,1000,45,Insulator,West Zone,not a date
A-0004,0,40,1000,45,Insulator,West Zone,not a date
A-0005,9,5,50,30,Cable,Center,1990-01-05
A-0006,4,25,200,15,Transformer,North Zone,1990-01-06
";

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn load_cleans_duplicates_blanks_and_dates() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "assets.csv", ASSETS);
    let (dataset, report) = load_dataset(&input, &AnalysisConfig::default()).unwrap();

    assert_eq!(report.total_rows, 7);
    assert_eq!(report.duplicate_rows, 1);
    assert_eq!(report.imputed_values, 1);
    assert_eq!(report.invalid_dates, 1);
    assert_eq!(dataset.len(), 6);

    let filled = dataset.records()[2].attribute("customers_affected").unwrap();
    let mean = (100.0 + 500.0 + 1000.0 + 50.0 + 200.0) / 5.0;
    assert!((filled - mean).abs() < 1e-9);
    assert_eq!(dataset.records()[0].event_year(), Some(1990));
}

#[test]
fn missing_input_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_dataset(&dir.path().join("absent.csv"), &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(err, Error::MissingInput { .. }));
}

#[test]
fn conflicting_rows_for_one_id_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(
        dir.path(),
        "assets.csv",
        "asset_id,failure_frequency,operating_time,customers_affected,regulatory_impact\n\
         A-0001,1,2,3,4\n\
         A-0001,5,6,7,8\n",
    );
    let err = load_dataset(&input, &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        Error::Scoring(ScoringError::JoinKeyConflict { ref asset_id, .. }) if asset_id == "A-0001"
    ));
}

#[test]
fn json_lines_input_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(
        dir.path(),
        "assets.jsonl",
        r#"{"asset_id": "A-0001", "failure_frequency": 1, "operating_time": 2, "customers_affected": 50, "regulatory_impact": 0}
{"asset_id": "A-0002", "failure_frequency": 3, "operating_time": 4, "customers_affected": 100, "regulatory_impact": 1}
"#,
    );
    let (dataset, _) = load_dataset(&input, &AnalysisConfig::default()).unwrap();
    assert_eq!(dataset.ids(), vec!["A-0001", "A-0002"]);
}

#[test]
fn report_flow_writes_every_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "assets.csv", ASSETS);
    let field = write(
        dir.path(),
        "field.csv",
        "asset_id,measurement,notes\nA-0002,0.2,Worn contacts\nA-0005,,Not reached\nZ-9999,0.5,\n",
    );
    let overrides = write(dir.path(), "overrides.csv", "asset_id,regulatory_impact\nA-0001,1.0\n");

    let config = AnalysisConfig::default();
    let mut prepared = load_and_prepare(&input, &config).unwrap();
    let applied = prepared
        .apply_overrides(&load_overrides(&overrides, &config).unwrap())
        .applied;
    assert_eq!(applied, 1);

    let measurements = load_field_measurements(&field, &AnalysisConfig::default()).unwrap();
    let analysis = analyze(&prepared, Some(&measurements), &config).unwrap();
    let feedback = analysis.feedback.as_ref().unwrap();

    // Outer join: six scored assets plus the unmatched field row.
    assert_eq!(feedback.reconciliation.rows.len(), 7);
    let orphan = feedback.reconciliation.get("Z-9999").unwrap();
    assert_eq!(orphan.computed_score, None);
    assert_eq!(orphan.recommendation, None);
    assert_eq!(
        feedback.reconciliation.get("A-0005").unwrap().notes.as_deref(),
        Some("Not reached")
    );

    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    let priorities = reports::priority_rows(&analysis.primary, Some(&analysis.stratified.strata));
    write_csv(&out.join("priority_matrix.csv"), &priorities).unwrap();
    let (headers, rows) = reports::comparison_records(&analysis.scenarios.comparison);
    write_records(&out.join("comparison.csv"), &headers, &rows).unwrap();
    let summary = reports::generate_summary(prepared.dataset.len(), &analysis);
    write_json(&out.join("summary.json"), &summary).unwrap();

    let matrix = fs::read_to_string(out.join("priority_matrix.csv")).unwrap();
    assert!(matrix.starts_with("Rank,AssetId,Criticality,Stratum\n1,"));
    assert_eq!(matrix.lines().count(), 7);

    let comparison = fs::read_to_string(out.join("comparison.csv")).unwrap();
    assert!(comparison.starts_with("AssetId,baseline,baseline_rank,regulatory_focus"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("summary.json")).unwrap()).unwrap();
    assert_eq!(json["total_assets"], 6);
    assert_eq!(json["scenario"], "baseline");
    let decided = summary.reassess + summary.retain;
    assert_eq!(decided, feedback.reconciliation.count(Recommendation::Reassess)
        + feedback.reconciliation.count(Recommendation::Retain));
}

#[test]
fn generated_fixtures_run_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_fixtures(dir.path(), 100, 42).unwrap();
    let config = AnalysisConfig::default();
    let prepared = load_and_prepare(&paths.assets, &config).unwrap();
    let measurements = load_field_measurements(&paths.field, &AnalysisConfig::default()).unwrap();
    let analysis = analyze(&prepared, Some(&measurements), &config).unwrap();

    assert_eq!(analysis.primary.ranking.len(), 100);
    assert_eq!(analysis.scenarios.comparison.rows.len(), 10);
    let sampled = analysis.stratified.sample.len();
    assert!((48..=52).contains(&sampled), "sampled {sampled}");
    let feedback = analysis.feedback.unwrap();
    assert_eq!(feedback.imputation.imputed_count(), 97);
    assert!(feedback.imputation.fit.is_ok());

    let md = reports::render_report(&prepared, &analyze(&prepared, None, &config).unwrap(), &config);
    assert!(md.contains("No field measurements were provided."));
}

use crate::config::AnalysisConfig;
use crate::error::{Error, Result, ScoringError};
use crate::normalize::AttributeOverrides;
use crate::reconcile::{FieldMeasurement, FieldMeasurements};
use crate::types::{AssetRecord, Dataset, FieldMeasurementRow};
use crate::util::{average, clean_text, parse_date_safe, parse_f64_safe};
use csv::{ReaderBuilder, StringRecord};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub duplicate_rows: usize,
    /// Rows dropped because they had no usable asset id.
    pub skipped_rows: usize,
    /// Blank or unparseable numeric cells filled with the column mean.
    pub imputed_values: usize,
    pub invalid_dates: usize,
    /// Optional attributes that were not found in the source.
    pub missing_attributes: Vec<String>,
}

/// Header names plus one row of raw cells per record, whatever the format.
struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::MissingInput {
            path: path.to_path_buf(),
        })
    }
}

fn read_csv_table(path: &Path) -> Result<(RawTable, usize)> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut rows = Vec::new();
    let mut unreadable = 0usize;
    for result in rdr.records() {
        match result {
            Ok(record) => rows.push(record.iter().map(str::to_string).collect()),
            Err(e) => {
                debug!(error = %e, "unreadable CSV record");
                unreadable += 1;
            }
        }
    }
    Ok((RawTable { headers, rows }, unreadable))
}

fn json_cell(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// JSON input is either an array of objects or one object per line.
fn read_json_table(path: &Path) -> Result<(RawTable, usize)> {
    let text = std::fs::read_to_string(path)?;
    let objects: Vec<serde_json::Map<String, serde_json::Value>> = if text.trim_start().starts_with('[') {
        serde_json::from_str(&text)?
    } else {
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<std::result::Result<_, _>>()?
    };

    let mut headers: Vec<String> = Vec::new();
    for obj in &objects {
        for key in obj.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }
    let rows = objects
        .iter()
        .map(|obj| headers.iter().map(|h| json_cell(obj.get(h))).collect())
        .collect();
    Ok((RawTable { headers, rows }, 0))
}

/// Load the asset dataset, validating the schema once before any row is read.
///
/// Production loading never substitutes synthetic data: a missing file is an
/// error.
pub fn load_dataset(path: &Path, config: &AnalysisConfig) -> Result<(Dataset, LoadReport)> {
    ensure_exists(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let (table, unreadable) = match ext.as_str() {
        "csv" => read_csv_table(path)?,
        "json" | "jsonl" | "ndjson" => read_json_table(path)?,
        _ => {
            return Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };
    let (dataset, mut report) = clean_table(&table, config)?;
    report.total_rows += unreadable;
    report.skipped_rows += unreadable;
    Ok((dataset, report))
}

fn clean_table(table: &RawTable, config: &AnalysisConfig) -> Result<(Dataset, LoadReport)> {
    let columns = &config.columns;
    let id_col = table
        .column(&columns.id)
        .ok_or_else(|| ScoringError::MissingAttribute {
            attribute: columns.id.clone(),
        })?;

    let mut report = LoadReport {
        total_rows: table.rows.len(),
        ..Default::default()
    };

    // Resolve every configured attribute to a column index up front.
    let mut attr_cols: Vec<(String, usize)> = Vec::new();
    for name in &config.attributes {
        let header = columns.header_for(name);
        match table.column(header) {
            Some(idx) => attr_cols.push((name.clone(), idx)),
            None if config.is_optional(name) => {
                warn!(attribute = name.as_str(), header, "optional attribute not found in source");
                report.missing_attributes.push(name.clone());
            }
            None => {
                return Err(ScoringError::MissingAttribute {
                    attribute: name.clone(),
                }
                .into())
            }
        }
    }
    let type_col = table.column(&columns.asset_type);
    let locality_col = table.column(&columns.locality);
    let date_col = table.column(&columns.event_date);

    let cell = |row: &[String], idx: usize| -> Option<String> { row.get(idx).cloned() };

    let mut seen_rows: HashSet<&[String]> = HashSet::new();
    let mut records: Vec<AssetRecord> = Vec::new();
    let mut pending: Vec<(usize, String)> = Vec::new();
    let mut parsed: HashMap<String, Vec<f64>> = HashMap::new();

    for row in &table.rows {
        if !seen_rows.insert(row.as_slice()) {
            report.duplicate_rows += 1;
            continue;
        }
        let Some(id) = clean_text(cell(row, id_col).as_deref()) else {
            report.skipped_rows += 1;
            continue;
        };

        let mut record = AssetRecord::new(id);
        record.asset_type = type_col.and_then(|c| clean_text(cell(row, c).as_deref()));
        record.locality = locality_col.and_then(|c| clean_text(cell(row, c).as_deref()));
        if let Some(c) = date_col {
            let raw = cell(row, c);
            record.event_date = parse_date_safe(raw.as_deref());
            if record.event_date.is_none() && clean_text(raw.as_deref()).is_some() {
                report.invalid_dates += 1;
            }
        }

        for (name, idx) in &attr_cols {
            match parse_f64_safe(cell(row, *idx).as_deref()) {
                Some(v) => {
                    record.attributes.insert(name.clone(), v);
                    parsed.entry(name.clone()).or_default().push(v);
                }
                None => pending.push((records.len(), name.clone())),
            }
        }
        records.push(record);
    }

    // Fill gaps with the column mean; a column with no usable value at all
    // cannot be imputed and is treated as absent.
    let means: HashMap<&str, f64> = parsed.iter().map(|(k, v)| (k.as_str(), average(v))).collect();
    let mut attributes: Vec<String> = Vec::new();
    for (name, _) in &attr_cols {
        if means.contains_key(name.as_str()) || records.is_empty() {
            attributes.push(name.clone());
        } else if config.is_optional(name) {
            warn!(attribute = name.as_str(), "optional attribute has no usable values");
            report.missing_attributes.push(name.clone());
        } else {
            return Err(ScoringError::MissingAttribute {
                attribute: name.clone(),
            }
            .into());
        }
    }
    for (row, name) in pending {
        if let Some(mean) = means.get(name.as_str()) {
            records[row].attributes.insert(name, *mean);
            report.imputed_values += 1;
        }
    }

    let dataset = Dataset::with_attributes(records, attributes)?;
    debug!(
        rows = report.total_rows,
        kept = dataset.len(),
        duplicates = report.duplicate_rows,
        imputed = report.imputed_values,
        "dataset cleaned"
    );
    Ok((dataset, report))
}

/// Load inspection results (`asset_id, measurement[, notes]`). The id column
/// may also carry the configured source header.
pub fn load_field_measurements(path: &Path, config: &AnalysisConfig) -> Result<FieldMeasurements> {
    ensure_exists(path)?;
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = rdr.headers()?.clone();
    if !headers.iter().any(|h| h.trim() == "asset_id") {
        let renamed: StringRecord = headers
            .iter()
            .map(|h| if h.trim() == config.columns.id { "asset_id" } else { h })
            .collect();
        rdr.set_headers(renamed);
    }
    let mut rows = Vec::new();
    for (i, result) in rdr.deserialize::<FieldMeasurementRow>().enumerate() {
        let raw = result.map_err(|e| Error::InvalidRow {
            row: i + 1,
            message: e.to_string(),
        })?;
        let Some(asset_id) = clean_text(Some(raw.asset_id.as_str())) else {
            continue;
        };
        rows.push(FieldMeasurement {
            asset_id,
            measurement: parse_f64_safe(raw.measurement.as_deref()),
            notes: clean_text(raw.notes.as_deref()),
        });
    }
    Ok(FieldMeasurements::new(rows)?)
}

/// Load per-asset attribute overrides. Columns may be named either by
/// attribute or by the configured source header; blank cells override nothing.
pub fn load_overrides(path: &Path, config: &AnalysisConfig) -> Result<AttributeOverrides> {
    ensure_exists(path)?;
    let (table, _) = read_csv_table(path)?;
    let id_col = table
        .column(&config.columns.id)
        .or_else(|| table.column("asset_id"))
        .ok_or_else(|| ScoringError::MissingAttribute {
            attribute: config.columns.id.clone(),
        })?;

    let attribute_names: Vec<String> = table
        .headers
        .iter()
        .map(|h| {
            config
                .attributes
                .iter()
                .find(|a| config.columns.header_for(a) == h)
                .cloned()
                .unwrap_or_else(|| h.clone())
        })
        .collect();

    let mut rows = Vec::new();
    for row in &table.rows {
        let Some(id) = clean_text(row.get(id_col).map(String::as_str)) else {
            continue;
        };
        let values: BTreeMap<String, f64> = row
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != id_col)
            .filter_map(|(i, v)| Some((attribute_names.get(i)?.clone(), parse_f64_safe(Some(v))?)))
            .collect();
        rows.push((id, values));
    }
    Ok(AttributeOverrides::new(rows)?)
}

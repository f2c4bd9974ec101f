// Min-max normalization of asset attributes and the normalized snapshot that
// every scoring pass reads from.
use crate::error::ScoringError;
use crate::types::Dataset;
use crate::util::min_max;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Observed range of a raw attribute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnRange {
    pub min: f64,
    pub max: f64,
}

/// What happened to one requested attribute during normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeOutcome {
    Normalized(ColumnRange),
    /// The attribute is not part of the dataset.
    Skipped,
    /// The attribute exists but min == max.
    Degenerate(ScoringError),
    /// Any other failure, such as an empty dataset.
    Failed(ScoringError),
}

impl AttributeOutcome {
    pub fn is_normalized(&self) -> bool {
        matches!(self, AttributeOutcome::Normalized(_))
    }
}

/// Immutable asset × attribute table of values in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    columns: BTreeMap<String, Vec<f64>>,
}

/// Result of `normalize`: the table plus one outcome per requested attribute,
/// in request order.
#[derive(Debug, Clone)]
pub struct Normalization {
    pub table: NormalizedTable,
    pub outcomes: Vec<(String, AttributeOutcome)>,
}

impl Normalization {
    pub fn degenerate(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, AttributeOutcome::Degenerate(_)))
            .map(|(name, _)| name.as_str())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, AttributeOutcome::Skipped))
            .map(|(name, _)| name.as_str())
    }
}

/// Rescale `values` to [0, 1] using their own min and max.
pub fn min_max_scale(values: &[f64], attribute: &str) -> Result<(Vec<f64>, ColumnRange), ScoringError> {
    let (min, max) = min_max(values).ok_or(ScoringError::EmptyDataset)?;
    if max == min {
        return Err(ScoringError::DegenerateRange {
            attribute: attribute.to_string(),
            value: min,
        });
    }
    let span = max - min;
    let scaled = values.iter().map(|v| (v - min) / span).collect();
    Ok((scaled, ColumnRange { min, max }))
}

/// Normalize a single attribute of the dataset.
pub fn normalize_attribute(
    dataset: &Dataset,
    attribute: &str,
) -> Result<(Vec<f64>, ColumnRange), ScoringError> {
    let values = dataset.column(attribute)?;
    min_max_scale(&values, attribute)
}

/// Normalize every requested attribute that the dataset carries.
///
/// Missing attributes are reported as `Skipped` and degenerate ones as
/// `Degenerate`; neither is added to the table and neither stops the others.
pub fn normalize<S: AsRef<str>>(dataset: &Dataset, attributes: &[S]) -> Normalization {
    let mut columns = BTreeMap::new();
    let mut outcomes = Vec::with_capacity(attributes.len());
    let mut requested: HashSet<&str> = HashSet::new();

    for name in attributes.iter().map(AsRef::as_ref) {
        if !requested.insert(name) {
            continue;
        }
        let outcome = match normalize_attribute(dataset, name) {
            Ok((scaled, range)) => {
                debug!(attribute = name, min = range.min, max = range.max, "normalized attribute");
                columns.insert(name.to_string(), scaled);
                AttributeOutcome::Normalized(range)
            }
            Err(ScoringError::MissingAttribute { .. }) => {
                warn!(attribute = name, "attribute not found, skipping normalization");
                AttributeOutcome::Skipped
            }
            Err(e @ ScoringError::DegenerateRange { .. }) => {
                warn!(attribute = name, error = %e, "attribute has a degenerate range");
                AttributeOutcome::Degenerate(e)
            }
            Err(e) => {
                warn!(attribute = name, error = %e, "attribute cannot be normalized");
                AttributeOutcome::Failed(e)
            }
        };
        outcomes.push((name.to_string(), outcome));
    }

    Normalization {
        table: NormalizedTable::from_parts(dataset.ids(), columns),
        outcomes,
    }
}

impl NormalizedTable {
    fn from_parts(ids: Vec<String>, columns: BTreeMap<String, Vec<f64>>) -> Self {
        let index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        NormalizedTable { ids, index, columns }
    }

    /// Use the dataset's values as-is, for matrices that were normalized
    /// upstream (for example a prior total weighting column).
    pub fn from_normalized(dataset: &Dataset) -> Result<Self, ScoringError> {
        let mut columns = BTreeMap::new();
        for name in dataset.attributes() {
            columns.insert(name.clone(), dataset.column(name)?);
        }
        Ok(Self::from_parts(dataset.ids(), columns))
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn value(&self, id: &str, attribute: &str) -> Option<f64> {
        let row = self.position(id)?;
        self.columns.get(attribute).map(|c| c[row])
    }

    /// A copy of the table with field-team overrides written into the cells,
    /// so rescoring picks them up through the ordinary formula.
    pub fn with_overrides(&self, overrides: &AttributeOverrides) -> (NormalizedTable, OverrideReport) {
        let mut table = self.clone();
        let mut report = OverrideReport::default();
        for (asset_id, values) in &overrides.rows {
            let Some(row) = table.position(asset_id) else {
                warn!(asset_id = asset_id.as_str(), "override for unknown asset ignored");
                report.unknown_assets.push(asset_id.clone());
                continue;
            };
            for (attribute, value) in values {
                match table.columns.get_mut(attribute) {
                    Some(column) => {
                        column[row] = *value;
                        report.applied += 1;
                    }
                    None => {
                        if !report.unknown_attributes.contains(attribute) {
                            warn!(attribute = attribute.as_str(), "override column is not a normalized attribute");
                            report.unknown_attributes.push(attribute.clone());
                        }
                    }
                }
            }
        }
        (table, report)
    }
}

/// Per-asset cell overrides coming back from field teams.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeOverrides {
    rows: Vec<(String, BTreeMap<String, f64>)>,
}

impl AttributeOverrides {
    /// Values are normalized-scale cells and must be finite and within [0, 1].
    pub fn new(rows: Vec<(String, BTreeMap<String, f64>)>) -> Result<Self, ScoringError> {
        let mut seen = HashSet::new();
        for (id, values) in &rows {
            if !seen.insert(id.as_str()) {
                return Err(ScoringError::JoinKeyConflict {
                    asset_id: id.clone(),
                    table: "override table".to_string(),
                });
            }
            if let Some((attribute, value)) = values.iter().find(|(_, v)| !(0.0..=1.0).contains(*v)) {
                return Err(ScoringError::InvalidOverride {
                    asset_id: id.clone(),
                    attribute: attribute.clone(),
                    value: *value,
                });
            }
        }
        Ok(AttributeOverrides { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideReport {
    /// Number of cells overwritten.
    pub applied: usize,
    pub unknown_assets: Vec<String>,
    pub unknown_attributes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{attr, AssetRecord};

    fn dataset(values: &[(&str, f64, f64)]) -> Dataset {
        Dataset::new(
            values
                .iter()
                .map(|(id, ff, ot)| {
                    AssetRecord::new(*id)
                        .with_attribute(attr::FAILURE_FREQUENCY, *ff)
                        .with_attribute(attr::OPERATING_TIME, *ot)
                })
                .collect(),
        )
        .expect("valid dataset")
    }

    #[test]
    fn scales_to_unit_interval_with_exact_endpoints() {
        let ds = dataset(&[("a1", 2.0, 10.0), ("a2", 8.0, 30.0), ("a3", 5.0, 20.0)]);
        let n = normalize(&ds, &[attr::FAILURE_FREQUENCY, attr::OPERATING_TIME]);
        assert_eq!(n.table.column(attr::FAILURE_FREQUENCY), Some(&[0.0, 1.0, 0.5][..]));
        assert_eq!(n.table.column(attr::OPERATING_TIME), Some(&[0.0, 1.0, 0.5][..]));
        assert!(n.outcomes.iter().all(|(_, o)| o.is_normalized()));
    }

    #[test]
    fn missing_attribute_is_skipped_not_fatal() {
        let ds = dataset(&[("a1", 2.0, 10.0), ("a2", 8.0, 30.0)]);
        let n = normalize(&ds, &[attr::FAILURE_FREQUENCY, attr::REGULATORY_IMPACT]);
        assert_eq!(n.skipped().collect::<Vec<_>>(), vec![attr::REGULATORY_IMPACT]);
        assert!(n.table.has_attribute(attr::FAILURE_FREQUENCY));
        assert!(!n.table.has_attribute(attr::REGULATORY_IMPACT));
        assert_eq!(
            normalize_attribute(&ds, attr::REGULATORY_IMPACT).unwrap_err(),
            ScoringError::MissingAttribute { attribute: attr::REGULATORY_IMPACT.to_string() }
        );
    }

    #[test]
    fn constant_column_is_degenerate() {
        let ds = dataset(&[("a1", 3.0, 10.0), ("a2", 3.0, 30.0)]);
        let n = normalize(&ds, &[attr::FAILURE_FREQUENCY, attr::OPERATING_TIME]);
        assert_eq!(n.degenerate().collect::<Vec<_>>(), vec![attr::FAILURE_FREQUENCY]);
        match &n.outcomes[0].1 {
            AttributeOutcome::Degenerate(ScoringError::DegenerateRange { attribute, value }) => {
                assert_eq!(attribute, attr::FAILURE_FREQUENCY);
                assert_eq!(*value, 3.0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(n.table.has_attribute(attr::OPERATING_TIME));
    }

    #[test]
    fn single_row_dataset_is_degenerate() {
        let ds = dataset(&[("a1", 3.0, 10.0)]);
        let n = normalize(&ds, &[attr::FAILURE_FREQUENCY]);
        assert_eq!(n.degenerate().count(), 1);
    }

    #[test]
    fn overrides_replace_cells_in_a_copy() {
        let ds = dataset(&[("a1", 2.0, 10.0), ("a2", 8.0, 30.0)]);
        let table = normalize(&ds, &[attr::FAILURE_FREQUENCY]).table;
        let overrides = AttributeOverrides::new(vec![
            ("a1".to_string(), BTreeMap::from([(attr::FAILURE_FREQUENCY.to_string(), 0.9)])),
            ("zz".to_string(), BTreeMap::from([(attr::FAILURE_FREQUENCY.to_string(), 0.1)])),
            ("a2".to_string(), BTreeMap::from([("notes".to_string(), 1.0)])),
        ])
        .unwrap();

        let (updated, report) = table.with_overrides(&overrides);
        assert_eq!(updated.value("a1", attr::FAILURE_FREQUENCY), Some(0.9));
        assert_eq!(table.value("a1", attr::FAILURE_FREQUENCY), Some(0.0));
        assert_eq!(report.applied, 1);
        assert_eq!(report.unknown_assets, vec!["zz".to_string()]);
        assert_eq!(report.unknown_attributes, vec!["notes".to_string()]);
    }

    #[test]
    fn overrides_outside_unit_interval_are_rejected() {
        for bad in [-5.0, 7.0, f64::NAN, f64::INFINITY] {
            let err = AttributeOverrides::new(vec![(
                "A-0001".to_string(),
                BTreeMap::from([(attr::FAILURE_FREQUENCY.to_string(), bad)]),
            )])
            .unwrap_err();
            match err {
                ScoringError::InvalidOverride { asset_id, attribute, .. } => {
                    assert_eq!(asset_id, "A-0001");
                    assert_eq!(attribute, attr::FAILURE_FREQUENCY);
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
        let edges = AttributeOverrides::new(vec![(
            "A-0001".to_string(),
            BTreeMap::from([
                (attr::FAILURE_FREQUENCY.to_string(), 0.0),
                (attr::OPERATING_TIME.to_string(), 1.0),
            ]),
        )]);
        assert!(edges.is_ok());
    }

    #[test]
    fn empty_dataset_is_not_reported_as_degenerate() {
        let ds = Dataset::with_attributes(Vec::new(), vec![attr::FAILURE_FREQUENCY.to_string()]).unwrap();
        let n = normalize(&ds, &[attr::FAILURE_FREQUENCY]);
        assert_eq!(n.degenerate().count(), 0);
        assert_eq!(
            n.outcomes[0].1,
            AttributeOutcome::Failed(ScoringError::EmptyDataset)
        );
    }

    #[test]
    fn duplicate_override_ids_conflict() {
        let err = AttributeOverrides::new(vec![
            ("a1".to_string(), BTreeMap::new()),
            ("a1".to_string(), BTreeMap::new()),
        ])
        .unwrap_err();
        assert!(matches!(err, ScoringError::JoinKeyConflict { asset_id, .. } if asset_id == "a1"));
    }
}

use crate::error::ScoringError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tabled::Tabled;

/// Canonical attribute names used by the reference configuration.
pub mod attr {
    pub const FAILURE_FREQUENCY: &str = "failure_frequency";
    pub const OPERATING_TIME: &str = "operating_time";
    pub const CUSTOMERS_AFFECTED: &str = "customers_affected";
    pub const REGULATORY_IMPACT: &str = "regulatory_impact";
}

/// One physical network asset after loading and cleanup.
///
/// Numeric attributes live in `attributes` keyed by their canonical name so the
/// set of scored columns stays configuration rather than struct layout.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRecord {
    pub id: String,
    pub asset_type: Option<String>,
    pub locality: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub attributes: BTreeMap<String, f64>,
}

impl AssetRecord {
    pub fn new(id: impl Into<String>) -> Self {
        AssetRecord {
            id: id.into(),
            asset_type: None,
            locality: None,
            event_date: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).copied()
    }

    /// Year of the most recent recorded failure event.
    pub fn event_year(&self) -> Option<i32> {
        self.event_date.map(|d| d.year())
    }
}

/// An in-memory dataset: unique asset ids, every record carrying every
/// declared attribute. Row order is the load order and drives tie-breaking.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    records: Vec<AssetRecord>,
    attributes: Vec<String>,
}

impl Dataset {
    /// Build a dataset whose attribute set is the union of the records'
    /// attributes, in first-seen order.
    pub fn new(records: Vec<AssetRecord>) -> Result<Self, ScoringError> {
        let mut attributes: Vec<String> = Vec::new();
        for r in &records {
            for name in r.attributes.keys() {
                if !attributes.iter().any(|a| a == name) {
                    attributes.push(name.clone());
                }
            }
        }
        Self::with_attributes(records, attributes)
    }

    /// Build a dataset with an explicit attribute list.
    pub fn with_attributes(
        records: Vec<AssetRecord>,
        attributes: Vec<String>,
    ) -> Result<Self, ScoringError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for r in &records {
            if !seen.insert(r.id.as_str()) {
                return Err(ScoringError::JoinKeyConflict {
                    asset_id: r.id.clone(),
                    table: "asset dataset".to_string(),
                });
            }
            for name in &attributes {
                if r.attribute(name).is_none() {
                    return Err(ScoringError::MissingValue {
                        asset_id: r.id.clone(),
                        attribute: name.clone(),
                    });
                }
            }
        }
        Ok(Dataset { records, attributes })
    }

    pub fn records(&self) -> &[AssetRecord] {
        &self.records
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    /// All values of one attribute, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<f64>, ScoringError> {
        if !self.has_attribute(name) {
            return Err(ScoringError::MissingAttribute {
                attribute: name.to_string(),
            });
        }
        self.records
            .iter()
            .map(|r| {
                r.attribute(name).ok_or_else(|| ScoringError::MissingValue {
                    asset_id: r.id.clone(),
                    attribute: name.to_string(),
                })
            })
            .collect()
    }
}

/// A row of the field-measurement table (inspection results).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldMeasurementRow {
    #[serde(alias = "ID_Ativo", alias = "id")]
    pub asset_id: String,
    #[serde(alias = "Medicoes", default)]
    pub measurement: Option<String>,
    #[serde(alias = "Observacoes", default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct AttributeOutcomeRow {
    #[serde(rename = "Attribute")]
    #[tabled(rename = "Attribute")]
    pub attribute: String,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: String,
    #[serde(rename = "Min")]
    #[tabled(rename = "Min")]
    pub min: String,
    #[serde(rename = "Max")]
    #[tabled(rename = "Max")]
    pub max: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct PriorityRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "AssetId")]
    #[tabled(rename = "AssetId")]
    pub asset_id: String,
    #[serde(rename = "Criticality")]
    #[tabled(rename = "Criticality")]
    pub criticality: String,
    #[serde(rename = "Stratum")]
    #[tabled(rename = "Stratum")]
    pub stratum: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct SampleRow {
    #[serde(rename = "AssetId")]
    #[tabled(rename = "AssetId")]
    pub asset_id: String,
    #[serde(rename = "Criticality")]
    #[tabled(rename = "Criticality")]
    pub criticality: String,
    #[serde(rename = "Stratum")]
    #[tabled(rename = "Stratum")]
    pub stratum: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ReconciliationRow {
    #[serde(rename = "AssetId")]
    #[tabled(rename = "AssetId")]
    pub asset_id: String,
    #[serde(rename = "ComputedScore")]
    #[tabled(rename = "ComputedScore")]
    pub computed_score: String,
    #[serde(rename = "FieldMeasurement")]
    #[tabled(rename = "FieldMeasurement")]
    pub field_measurement: String,
    #[serde(rename = "Discrepancy")]
    #[tabled(rename = "Discrepancy")]
    pub discrepancy: String,
    #[serde(rename = "Recommendation")]
    #[tabled(rename = "Recommendation")]
    pub recommendation: String,
    #[serde(rename = "Notes")]
    #[tabled(rename = "Notes")]
    pub notes: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ImputationRow {
    #[serde(rename = "AssetId")]
    #[tabled(rename = "AssetId")]
    pub asset_id: String,
    #[serde(rename = "ComputedScore")]
    #[tabled(rename = "ComputedScore")]
    pub computed_score: String,
    #[serde(rename = "FieldMeasurement")]
    #[tabled(rename = "FieldMeasurement")]
    pub field_measurement: String,
    #[serde(rename = "Source")]
    #[tabled(rename = "Source")]
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StratumCount {
    pub label: String,
    pub assets: usize,
    pub sampled: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryStats {
    pub total_assets: usize,
    pub scenario: String,
    pub mean_score: f64,
    pub max_score: f64,
    pub strata: Vec<StratumCount>,
    pub reassess: usize,
    pub retain: usize,
    pub imputed: usize,
    pub mse: Option<f64>,
    pub r2: Option<f64>,
}

// 📂 Record Loader & Cleaner - register rows in, one current row per area out
//
// The register can carry several rows for the same area (decision history).
// Cleaning runs in two passes:
//   1. validity: non-current rows are dropped when a current sibling exists
//   2. duplicates: one row per nature id survives, first occurrence wins

use crate::error::{BuildError, BuildResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

// ============================================================================
// REGISTER COLUMNS
// ============================================================================

/// Column names of the protected-area register
pub mod fields {
    pub const NATURE_ID: &str = "NVRID";
    pub const NAME: &str = "NAMN";
    pub const COUNTY: &str = "LAN";
    pub const MUNICIPALITIES: &str = "KOMMUN";
    pub const OPERATOR: &str = "FORVALTARE";
    pub const IUCN_CATEGORY: &str = "IUCNKAT";
    pub const PROTECTION_TYPE: &str = "SKYDDSTYP";
    pub const STATUS: &str = "BESLSTATUS";
    pub const AREA_TOTAL: &str = "AREA_HA";
    pub const AREA_WOODS: &str = "SKOG_HA";
    pub const AREA_LAND: &str = "LAND_HA";
    pub const AREA_WATER: &str = "VATTEN_HA";
    pub const DECISION_DATE: &str = "URSBESLDAT";
}

/// Status value of a decision that is in force
pub const CURRENT_STATUS: &str = "Gällande";

// ============================================================================
// SOURCE RECORD
// ============================================================================

/// One register row, field name → raw string value.
///
/// No schema is enforced at load time. A missing column surfaces as
/// `BuildError::MissingField` the first time something reads it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRecord {
    fields: HashMap<String, String>,
}

impl SourceRecord {
    pub fn new(fields: HashMap<String, String>) -> Self {
        SourceRecord { fields }
    }

    /// Build a record from (column, value) pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        SourceRecord {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Read a field, failing fast when the column is absent
    pub fn get(&self, field: &str) -> BuildResult<&str> {
        self.fields
            .get(field)
            .map(|v| v.as_str())
            .ok_or_else(|| BuildError::MissingField {
                field: field.to_string(),
            })
    }

    /// Read a field that may legitimately be absent
    pub fn get_opt(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|v| v.as_str())
    }

    /// Set or overwrite a field
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn nature_id(&self) -> BuildResult<&str> {
        self.get(fields::NATURE_ID)
    }

    pub fn name(&self) -> BuildResult<&str> {
        self.get(fields::NAME)
    }

    /// Whether the decision behind this row is in force.
    /// A row without a status column is treated as not current.
    pub fn is_current(&self) -> bool {
        self.get_opt(fields::STATUS) == Some(CURRENT_STATUS)
    }

    /// Human-readable name for diagnostics, falling back to the id
    pub fn display_name(&self) -> &str {
        self.get_opt(fields::NAME)
            .or_else(|| self.get_opt(fields::NATURE_ID))
            .unwrap_or("<unnamed>")
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Load raw register rows from a CSV file.
///
/// Ragged rows are accepted: a short row simply lacks its trailing columns
/// and fails with `MissingField` when one of them is read.
pub fn load_csv(csv_path: &Path) -> Result<Vec<SourceRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open register file: {:?}", csv_path))?;

    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read register header: {:?}", csv_path))?
        .clone();

    let mut records = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let row = result.with_context(|| format!("Failed to read register row {}", line + 1))?;
        if row.len() != headers.len() {
            warn!(row = line + 1, fields = row.len(), expected = headers.len(), "ragged register row");
        }
        let fields: HashMap<String, String> = headers
            .iter()
            .zip(row.iter())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        records.push(SourceRecord::new(fields));
    }

    info!(path = ?csv_path, rows = records.len(), "loaded register");
    Ok(records)
}

/// Load a register file and clean it in one go
pub fn load_and_clean(csv_path: &Path) -> Result<Vec<SourceRecord>> {
    let raw = load_csv(csv_path)?;
    let cleaned = clean(raw);
    info!(rows = cleaned.len(), "cleaned up duplicates and invalid rows");
    Ok(cleaned)
}

// ============================================================================
// CLEANING
// ============================================================================

/// Both cleaning passes, order-preserving
pub fn clean(records: Vec<SourceRecord>) -> Vec<SourceRecord> {
    remove_duplicate_entries(remove_invalid_entries(records))
}

/// Drop non-current rows whose nature id also has a current row.
///
/// A non-current row with no current sibling is kept: it is the only
/// information available about that area.
pub fn remove_invalid_entries(records: Vec<SourceRecord>) -> Vec<SourceRecord> {
    let ids_with_current: HashSet<String> = records
        .iter()
        .filter(|r| r.is_current())
        .filter_map(|r| r.get_opt(fields::NATURE_ID).map(str::to_string))
        .collect();

    records
        .into_iter()
        .filter(|r| {
            if r.is_current() {
                return true;
            }
            match r.get_opt(fields::NATURE_ID) {
                Some(id) => !ids_with_current.contains(id),
                // Without an id there is nothing to compete with
                None => true,
            }
        })
        .collect()
}

/// Keep one row per nature id: the first current row, else the first row.
///
/// The survivor takes the position of its group's first occurrence.
/// Rows without an id are passed through untouched.
pub fn remove_duplicate_entries(records: Vec<SourceRecord>) -> Vec<SourceRecord> {
    let mut results: Vec<SourceRecord> = Vec::with_capacity(records.len());
    let mut position: HashMap<String, usize> = HashMap::new();

    for record in records {
        let Some(id) = record.get_opt(fields::NATURE_ID).map(str::to_string) else {
            results.push(record);
            continue;
        };

        match position.get(&id) {
            Some(&idx) => {
                if record.is_current() && !results[idx].is_current() {
                    results[idx] = record;
                }
            }
            None => {
                position.insert(id, results.len());
                results.push(record);
            }
        }
    }

    results
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_record(id: &str, name: &str, status: &str) -> SourceRecord {
        SourceRecord::from_pairs([
            (fields::NATURE_ID, id),
            (fields::NAME, name),
            (fields::STATUS, status),
        ])
    }

    #[test]
    fn test_missing_field_fails_on_access() {
        let record = SourceRecord::from_pairs([(fields::NATURE_ID, "1")]);
        assert_eq!(record.nature_id(), Ok("1"));
        assert_eq!(
            record.name(),
            Err(BuildError::MissingField {
                field: fields::NAME.to_string()
            })
        );
    }

    #[test]
    fn test_single_current_row_survives() {
        let records = vec![
            create_test_record("1", "Old", "Överklagat"),
            create_test_record("1", "Current", CURRENT_STATUS),
            create_test_record("1", "Older", "Upphävt"),
        ];

        let cleaned = clean(records);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].name(), Ok("Current"));
    }

    #[test]
    fn test_no_current_row_keeps_first() {
        let records = vec![
            create_test_record("7", "First", "Överklagat"),
            create_test_record("7", "Second", "Upphävt"),
        ];

        let cleaned = clean(records);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].name(), Ok("First"));
    }

    #[test]
    fn test_lone_non_current_row_is_kept() {
        let records = vec![create_test_record("9", "Only", "Överklagat")];
        let cleaned = remove_invalid_entries(records);
        assert_eq!(cleaned.len(), 1);
    }

    #[test]
    fn test_order_is_preserved() {
        let records = vec![
            create_test_record("1", "A", CURRENT_STATUS),
            create_test_record("2", "B old", "Överklagat"),
            create_test_record("3", "C", CURRENT_STATUS),
            create_test_record("2", "B", CURRENT_STATUS),
            create_test_record("1", "A again", CURRENT_STATUS),
        ];

        let cleaned = clean(records);
        let names: Vec<&str> = cleaned.iter().map(|r| r.display_name()).collect();
        assert_eq!(names, vec!["A", "C", "B"]);
    }

    #[test]
    fn test_duplicate_pass_prefers_current() {
        // Without the validity pass, the duplicate pass alone still picks the current row
        let records = vec![
            create_test_record("4", "Old", "Överklagat"),
            create_test_record("5", "Other", CURRENT_STATUS),
            create_test_record("4", "New", CURRENT_STATUS),
        ];

        let cleaned = remove_duplicate_entries(records);
        let names: Vec<&str> = cleaned.iter().map(|r| r.display_name()).collect();
        assert_eq!(names, vec!["New", "Other"]);
    }

    #[test]
    fn test_rows_without_id_pass_through() {
        let records = vec![
            SourceRecord::from_pairs([(fields::NAME, "No id")]),
            SourceRecord::from_pairs([(fields::NAME, "No id either")]),
        ];
        assert_eq!(clean(records).len(), 2);
    }

    #[test]
    fn test_load_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("register.csv");
        std::fs::write(
            &path,
            "NVRID,NAMN,BESLSTATUS\n1,Abisko,Gällande\n1,Abisko,Överklagat\n2,Tyresta,Gällande\n",
        )
        .unwrap();

        let raw = load_csv(&path).unwrap();
        assert_eq!(raw.len(), 3);

        let cleaned = load_and_clean(&path).unwrap();
        assert_eq!(cleaned.len(), 2);
        assert!(cleaned.iter().all(|r| r.is_current()));
    }

    #[test]
    fn test_short_row_does_not_abort_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("register.csv");
        std::fs::write(
            &path,
            "NVRID,NAMN,BESLSTATUS,AREA_HA\n1,Abisko,Gällande,7700\n2,Tyresta,Gällande\n",
        )
        .unwrap();

        let records = load_and_clean(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get(fields::AREA_TOTAL), Ok("7700"));

        assert_eq!(records[1].name(), Ok("Tyresta"));
        assert_eq!(
            records[1].get(fields::AREA_TOTAL),
            Err(BuildError::MissingField {
                field: fields::AREA_TOTAL.to_string()
            })
        );
    }
}

//! The column universe: every column and measure the model declares.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error_codes;
use crate::key::{normalize_key, QualifiedName};

/// Where a column's values physically live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "storage_name", rename_all = "snake_case")]
pub enum StorageSource {
    /// Backed by a database column, which may be named differently from the model column.
    Imported(String),
    /// Computed in the model from a formula.
    Calculated,
    Measure,
    /// The implicit `[Value]` column of a calculated table or parameter.
    SyntheticValue,
}

impl StorageSource {
    /// Interprets the catalog's `SourceColumn` cell.
    pub fn from_source_column(raw: &str) -> Self {
        match raw.trim() {
            "" => StorageSource::Calculated,
            "[Measure]" => StorageSource::Measure,
            "[Value]" => StorageSource::SyntheticValue,
            name => StorageSource::Imported(name.to_string()),
        }
    }

    pub fn is_measure(&self) -> bool {
        matches!(self, StorageSource::Measure)
    }

    /// Exists only in the model, never in the database.
    pub fn is_model_only(&self) -> bool {
        matches!(self, StorageSource::Measure | StorageSource::Calculated)
    }

    pub fn storage_name(&self) -> Option<&str> {
        match self {
            StorageSource::Imported(name) => Some(name),
            _ => None,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            StorageSource::Imported(_) => "Column",
            StorageSource::Calculated => "Calculated Column",
            StorageSource::Measure => "Measure",
            StorageSource::SyntheticValue => "Value Column",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub id: i64,
    pub name: String,
    pub source_column: String,
    pub table_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRecord {
    pub id: i64,
    pub name: QualifiedName,
    pub storage: StorageSource,
    pub key: String,
    pub normalized_key: String,
}

impl ColumnRecord {
    pub fn table(&self) -> &str {
        &self.name.table
    }

    pub fn column(&self) -> &str {
        &self.name.name
    }
}

/// One identifier that failed to map to a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedId {
    /// Zero-based data row in the source table.
    pub row: usize,
    pub field: &'static str,
    pub id: i64,
}

impl std::fmt::Display for UnresolvedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {} {}={}", self.row + 1, self.field, self.id)
    }
}

/// Identifier lookups that failed; every failure is collected before reporting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[PRUNE_RESOLVE_001] {} {source_name} identifier(s) could not be resolved: {}. Suggestion: regenerate the catalog so tables, columns and relations come from the same model version.", .unresolved.len(), render_unresolved(.unresolved))]
pub struct ResolutionError {
    pub source_name: &'static str,
    pub unresolved: Vec<UnresolvedId>,
}

impl ResolutionError {
    pub fn code(&self) -> &'static str {
        error_codes::RESOLVE_UNMAPPED_IDS
    }
}

fn render_unresolved(items: &[UnresolvedId]) -> String {
    const SHOWN: usize = 25;
    let mut parts: Vec<String> = items.iter().take(SHOWN).map(|u| u.to_string()).collect();
    if items.len() > SHOWN {
        parts.push(format!("... {} more", items.len() - SHOWN));
    }
    parts.join(", ")
}

/// All columns of the model with id lookups for relationship resolution.
#[derive(Debug, Clone, Default)]
pub struct ColumnUniverse {
    pub columns: Vec<ColumnRecord>,
    table_names: BTreeMap<i64, String>,
    column_names: BTreeMap<i64, String>,
}

impl ColumnUniverse {
    pub fn build(tables: &[TableRow], columns: &[ColumnRow]) -> Result<Self, ResolutionError> {
        let table_names: BTreeMap<i64, String> = tables
            .iter()
            .map(|t| (t.id, t.name.trim().to_string()))
            .collect();

        let mut unresolved = Vec::new();
        let mut records = Vec::with_capacity(columns.len());
        let mut column_names = BTreeMap::new();

        for (row, col) in columns.iter().enumerate() {
            let Some(table) = table_names.get(&col.table_id) else {
                unresolved.push(UnresolvedId {
                    row,
                    field: "TableID",
                    id: col.table_id,
                });
                continue;
            };
            let name = QualifiedName::new(table.clone(), col.name.trim());
            let key = name.key();
            let normalized_key = normalize_key(&key);
            column_names.insert(col.id, name.name.clone());
            records.push(ColumnRecord {
                id: col.id,
                name,
                storage: StorageSource::from_source_column(&col.source_column),
                key,
                normalized_key,
            });
        }

        if !unresolved.is_empty() {
            return Err(ResolutionError {
                source_name: "column",
                unresolved,
            });
        }

        Ok(Self {
            columns: records,
            table_names,
            column_names,
        })
    }

    pub fn table_name(&self, id: i64) -> Option<&str> {
        self.table_names.get(&id).map(String::as_str)
    }

    pub fn column_name(&self, id: i64) -> Option<&str> {
        self.column_names.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnRecord> {
        self.columns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> Vec<TableRow> {
        vec![
            TableRow { id: 1, name: "Sales".into() },
            TableRow { id: 2, name: "Customers".into() },
        ]
    }

    #[test]
    fn source_column_classification() {
        assert_eq!(StorageSource::from_source_column(" "), StorageSource::Calculated);
        assert_eq!(StorageSource::from_source_column("[Measure]"), StorageSource::Measure);
        assert_eq!(StorageSource::from_source_column("[Value]"), StorageSource::SyntheticValue);
        assert_eq!(
            StorageSource::from_source_column("cust_id"),
            StorageSource::Imported("cust_id".into())
        );
        assert!(StorageSource::Measure.is_model_only());
        assert!(!StorageSource::SyntheticValue.is_model_only());
    }

    #[test]
    fn build_resolves_table_names_and_keys() {
        let columns = vec![ColumnRow {
            id: 10,
            name: " Amount ".into(),
            source_column: "amt".into(),
            table_id: 1,
        }];
        let universe = ColumnUniverse::build(&tables(), &columns).expect("universe");
        let rec = &universe.columns[0];
        assert_eq!(rec.key, "Sales$$Amount");
        assert_eq!(rec.normalized_key, "sales$$amount");
        assert_eq!(rec.storage.storage_name(), Some("amt"));
        assert_eq!(universe.column_name(10), Some("Amount"));
        assert_eq!(universe.table_name(2), Some("Customers"));
    }

    #[test]
    fn build_reports_every_unmapped_table_id() {
        let columns = vec![
            ColumnRow { id: 1, name: "A".into(), source_column: "a".into(), table_id: 7 },
            ColumnRow { id: 2, name: "B".into(), source_column: "b".into(), table_id: 1 },
            ColumnRow { id: 3, name: "C".into(), source_column: "c".into(), table_id: 9 },
        ];
        let err = ColumnUniverse::build(&tables(), &columns).expect_err("unmapped ids");
        assert_eq!(err.unresolved.len(), 2);
        let msg = err.to_string();
        assert!(msg.contains("row 1 TableID=7"), "{msg}");
        assert!(msg.contains("row 3 TableID=9"), "{msg}");
        assert_eq!(err.code(), "PRUNE_RESOLVE_001");
    }
}

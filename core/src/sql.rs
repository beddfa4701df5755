//! DROP statement generation and the model-only cleanup listing.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::catalog::StorageSource;
use crate::decision::{ColumnDecision, TableVerdict};

/// Bracket-quotes an identifier, doubling any `]` inside it.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropTableStatement {
    pub table: String,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropColumnStatement {
    pub table: String,
    pub column: String,
    pub storage_column: String,
    pub sql: String,
}

pub fn drop_table_statements(verdicts: &[TableVerdict], schema: &str) -> Vec<DropTableStatement> {
    verdicts
        .iter()
        .filter(|v| v.remove)
        .map(|v| DropTableStatement {
            table: v.table.clone(),
            sql: format!("DROP TABLE {}.{};", quote_ident(schema), quote_ident(&v.table)),
        })
        .collect()
}

/// Only imported columns of kept tables; the storage name is what the
/// database knows the column as.
pub fn drop_column_statements(
    decisions: &[ColumnDecision],
    kept_tables: &BTreeSet<String>,
    schema: &str,
) -> Vec<DropColumnStatement> {
    decisions
        .iter()
        .filter(|d| d.remove && kept_tables.contains(d.column.table()))
        .filter_map(|d| {
            let storage = d.column.storage.storage_name()?;
            Some(DropColumnStatement {
                table: d.column.table().to_string(),
                column: d.column.column().to_string(),
                storage_column: storage.to_string(),
                sql: format!(
                    "ALTER TABLE {}.{} DROP COLUMN {};",
                    quote_ident(schema),
                    quote_ident(d.column.table()),
                    quote_ident(storage)
                ),
            })
        })
        .collect()
}

/// One statement per line, newline-terminated; empty input renders empty.
pub fn render_script<'a>(statements: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for stmt in statements {
        out.push_str(stmt);
        out.push('\n');
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelItemKind {
    Measure,
    #[serde(rename = "Calculated Column")]
    CalculatedColumn,
}

impl ModelItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelItemKind::Measure => "Measure",
            ModelItemKind::CalculatedColumn => "Calculated Column",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCleanupRow {
    pub table: String,
    pub name: String,
    pub kind: ModelItemKind,
    pub file: String,
}

/// Removable measures and calculated columns in kept tables; these have no
/// database counterpart, so only a model edit removes them.
pub fn model_cleanup_rows(
    decisions: &[ColumnDecision],
    kept_tables: &BTreeSet<String>,
    extension: &str,
) -> Vec<ModelCleanupRow> {
    decisions
        .iter()
        .filter(|d| d.remove && kept_tables.contains(d.column.table()))
        .filter_map(|d| {
            let kind = match d.column.storage {
                StorageSource::Measure => ModelItemKind::Measure,
                StorageSource::Calculated => ModelItemKind::CalculatedColumn,
                _ => return None,
            };
            Some(ModelCleanupRow {
                table: d.column.table().to_string(),
                name: d.column.column().to_string(),
                kind,
                file: format!("{}.{}", d.column.table(), extension),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnRow, ColumnUniverse, TableRow};
    use crate::decision::{decide_columns, kept_tables, rollup_tables, ProtectionSets};
    use crate::liveness::LivenessFlags;

    fn decisions_with(live: &[bool]) -> Vec<ColumnDecision> {
        let tables = vec![
            TableRow { id: 1, name: "Sales".into() },
            TableRow { id: 2, name: "Old]Stuff".into() },
        ];
        let columns = vec![
            ColumnRow { id: 1, name: "Amount".into(), source_column: "amount".into(), table_id: 1 },
            ColumnRow { id: 2, name: "Net Cost".into(), source_column: "net_cost".into(), table_id: 1 },
            ColumnRow { id: 3, name: "Margin %".into(), source_column: "[Measure]".into(), table_id: 1 },
            ColumnRow { id: 4, name: "Bucket".into(), source_column: "".into(), table_id: 1 },
            ColumnRow { id: 5, name: "Value".into(), source_column: "[Value]".into(), table_id: 1 },
            ColumnRow { id: 6, name: "Raw".into(), source_column: "raw".into(), table_id: 2 },
        ];
        let universe = ColumnUniverse::build(&tables, &columns).expect("universe");
        let flags: Vec<LivenessFlags> = live
            .iter()
            .map(|&l| LivenessFlags { used_in_report: l, used_in_relationship: false })
            .collect();
        decide_columns(&universe, &flags, &ProtectionSets::new())
    }

    #[test]
    fn drop_table_quotes_and_escapes_identifiers() {
        let decisions = decisions_with(&[true, false, false, false, false, false]);
        let verdicts = rollup_tables(&decisions, &ProtectionSets::new());
        let stmts = drop_table_statements(&verdicts, "dbo");
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].sql, "DROP TABLE [dbo].[Old]]Stuff];");
    }

    #[test]
    fn drop_column_uses_storage_name_and_skips_model_only_items() {
        let decisions = decisions_with(&[true, false, false, false, false, false]);
        let verdicts = rollup_tables(&decisions, &ProtectionSets::new());
        let kept = kept_tables(&verdicts);
        let stmts = drop_column_statements(&decisions, &kept, "gold");
        let sql: Vec<&str> = stmts.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(sql, vec!["ALTER TABLE [gold].[Sales] DROP COLUMN [net_cost];"]);
        assert_eq!(stmts[0].column, "Net Cost");
    }

    #[test]
    fn model_cleanup_lists_measures_and_calculated_columns() {
        let decisions = decisions_with(&[true, true, false, false, false, true]);
        let verdicts = rollup_tables(&decisions, &ProtectionSets::new());
        let rows = model_cleanup_rows(&decisions, &kept_tables(&verdicts), "tmdl");
        let listed: Vec<(&str, ModelItemKind, &str)> = rows
            .iter()
            .map(|r| (r.name.as_str(), r.kind, r.file.as_str()))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("Margin %", ModelItemKind::Measure, "Sales.tmdl"),
                ("Bucket", ModelItemKind::CalculatedColumn, "Sales.tmdl"),
            ]
        );
    }

    #[test]
    fn render_script_terminates_each_statement() {
        assert_eq!(render_script(["A;", "B;"]), "A;\nB;\n");
        assert_eq!(render_script(Vec::<&str>::new()), "");
    }
}

//! CSV renderings of the decision artifacts. Every file carries its header
//! row even when there are no records.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::Writer;

use super::ReportError;
use crate::decision::{ColumnDecision, TableVerdict};
use crate::liveness::UnmatchedUsageKey;
use crate::sql::{DropColumnStatement, DropTableStatement, ModelCleanupRow};

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

/// Writes `headers` then one record per item.
pub fn write_records<W, T, F>(out: W, headers: &[&str], items: impl IntoIterator<Item = T>, row: F) -> csv::Result<W>
where
    W: Write,
    F: Fn(T) -> Vec<String>,
{
    let mut wtr = Writer::from_writer(out);
    wtr.write_record(headers)?;
    for item in items {
        wtr.write_record(row(item))?;
    }
    wtr.flush()?;
    wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

fn write_file<T, F>(path: &Path, headers: &[&str], items: impl IntoIterator<Item = T>, row: F) -> Result<PathBuf, ReportError>
where
    F: Fn(T) -> Vec<String>,
{
    let file = File::create(path).map_err(|e| ReportError::io(path, e))?;
    write_records(file, headers, items, row).map_err(|e| ReportError::Csv {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(path.to_path_buf())
}

pub const COLUMN_DECISION_HEADERS: &[&str] = &[
    "TableName",
    "ColumnName",
    "Key_Column",
    "Storage",
    "SourceColumn",
    "Used_in_PBI",
    "Used_in_Relationship",
    "Remove_column",
    "Protected",
    "Protection_Reason",
];

pub fn write_column_decisions(path: &Path, decisions: &[ColumnDecision]) -> Result<PathBuf, ReportError> {
    write_file(path, COLUMN_DECISION_HEADERS, decisions, |d| {
        vec![
            d.column.table().to_string(),
            d.column.column().to_string(),
            d.column.key.clone(),
            d.column.storage.kind_label().to_string(),
            d.column.storage.storage_name().unwrap_or_default().to_string(),
            yes_no(d.flags.used_in_report).to_string(),
            yes_no(d.flags.used_in_relationship).to_string(),
            yes_no(d.remove).to_string(),
            yes_no(d.protected.is_some()).to_string(),
            d.protected.map_or("", |p| p.as_str()).to_string(),
        ]
    })
}

pub fn write_table_decisions(path: &Path, tables: &[TableVerdict]) -> Result<PathBuf, ReportError> {
    let headers = ["TableName", "Total_Columns", "Columns_To_Remove", "Remove_table", "Protected", "Protection_Reason"];
    write_file(path, &headers, tables, |t| {
        vec![
            t.table.clone(),
            t.total_columns.to_string(),
            t.columns_to_remove.to_string(),
            yes_no(t.remove).to_string(),
            yes_no(t.protected.is_some()).to_string(),
            t.protected.map_or("", |p| p.as_str()).to_string(),
        ]
    })
}

pub fn write_unmatched_usage(path: &Path, keys: &[UnmatchedUsageKey]) -> Result<PathBuf, ReportError> {
    write_file(path, &["Key_Column", "Classification"], keys, |k| {
        vec![k.key.clone(), k.kind.as_str().to_string()]
    })
}

pub fn write_unmatched_endpoints(path: &Path, endpoints: &[String]) -> Result<PathBuf, ReportError> {
    write_file(path, &["Unmatched_Relationship_Endpoint_Key_Column"], endpoints, |e| {
        vec![e.clone()]
    })
}

pub fn write_drop_tables(path: &Path, statements: &[DropTableStatement]) -> Result<PathBuf, ReportError> {
    write_file(path, &["TableName", "Drop_SQL"], statements, |s| {
        vec![s.table.clone(), s.sql.clone()]
    })
}

pub fn write_drop_columns(path: &Path, statements: &[DropColumnStatement]) -> Result<PathBuf, ReportError> {
    let headers = ["TableName", "ColumnName", "SourceColumn", "Drop_SQL"];
    write_file(path, &headers, statements, |s| {
        vec![
            s.table.clone(),
            s.column.clone(),
            s.storage_column.clone(),
            s.sql.clone(),
        ]
    })
}

pub fn write_model_cleanup(path: &Path, rows: &[ModelCleanupRow]) -> Result<PathBuf, ReportError> {
    write_file(path, &["TableName", "ColumnName", "Type", "TMDL_File"], rows, |r| {
        vec![
            r.table.clone(),
            r.name.clone(),
            r.kind.as_str().to_string(),
            r.file.clone(),
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_still_writes_header() {
        let out = write_records(Vec::new(), &["A", "B"], Vec::<(String, String)>::new(), |(a, b)| vec![a, b])
            .expect("write");
        assert_eq!(String::from_utf8(out).expect("utf8"), "A,B\n");
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        let out = write_records(Vec::new(), &["Key"], vec!["Sales$$Amount, net".to_string()], |k| vec![k])
            .expect("write");
        assert_eq!(String::from_utf8(out).expect("utf8"), "Key\n\"Sales$$Amount, net\"\n");
    }
}

//! Writers for analysis and cleanup artifacts.

pub mod csv_files;
pub mod json;
#[cfg(feature = "xlsx-report")]
pub mod xlsx;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::analysis::Analysis;
use crate::error_codes;
use crate::report::DispositionReport;
use crate::sql::render_script;

pub const COLUMN_DECISIONS_FILE: &str = "column_decisions.csv";
pub const TABLE_DECISIONS_FILE: &str = "table_decisions.csv";
pub const UNMATCHED_USAGE_FILE: &str = "unmatched_usage_keys.csv";
pub const UNMATCHED_ENDPOINTS_FILE: &str = "unmatched_relationship_endpoints.csv";
pub const DROP_TABLES_SQL_FILE: &str = "DROP_TABLES.sql";
pub const DROP_COLUMNS_SQL_FILE: &str = "DROP_COLUMNS.sql";
pub const DROP_TABLES_FILE: &str = "drop_tables.csv";
pub const DROP_COLUMNS_FILE: &str = "drop_columns.csv";
pub const MODEL_CLEANUP_FILE: &str = "model_cleanup.csv";
pub const REPORT_JSON_FILE: &str = "cleanup_report.json";
pub const REPORT_XLSX_FILE: &str = "cleanup_report.xlsx";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    #[error("[PRUNE_OUTPUT_001] cannot write {path}: {reason}. Suggestion: check that the output directory is writable.")]
    Io { path: PathBuf, reason: String },
    #[error("[PRUNE_OUTPUT_002] failed to write CSV {path}: {reason}")]
    Csv { path: PathBuf, reason: String },
    #[error("[PRUNE_OUTPUT_003] failed to serialize {path}: {reason}")]
    Json { path: PathBuf, reason: String },
    #[error("[PRUNE_OUTPUT_004] failed to write workbook {path}: {reason}")]
    Xlsx { path: PathBuf, reason: String },
}

impl ReportError {
    pub fn code(&self) -> &'static str {
        match self {
            ReportError::Io { .. } => error_codes::OUTPUT_IO,
            ReportError::Csv { .. } => error_codes::OUTPUT_CSV,
            ReportError::Json { .. } => error_codes::OUTPUT_JSON,
            ReportError::Xlsx { .. } => error_codes::OUTPUT_XLSX,
        }
    }

    pub(crate) fn io(path: &Path, err: impl std::fmt::Display) -> Self {
        ReportError::Io {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }
}

fn ensure_dir(dir: &Path) -> Result<(), ReportError> {
    std::fs::create_dir_all(dir).map_err(|e| ReportError::io(dir, e))
}

fn write_text(path: PathBuf, text: &str) -> Result<PathBuf, ReportError> {
    std::fs::write(&path, text).map_err(|e| ReportError::io(&path, e))?;
    Ok(path)
}

/// Writes every decision, audit and SQL artifact into `dir`, returning the
/// paths written.
pub fn write_analysis(dir: &Path, analysis: &Analysis) -> Result<Vec<PathBuf>, ReportError> {
    ensure_dir(dir)?;
    let mut written = vec![
        csv_files::write_column_decisions(&dir.join(COLUMN_DECISIONS_FILE), &analysis.decisions)?,
        csv_files::write_table_decisions(&dir.join(TABLE_DECISIONS_FILE), &analysis.tables)?,
        csv_files::write_unmatched_usage(&dir.join(UNMATCHED_USAGE_FILE), &analysis.unmatched_usage)?,
        csv_files::write_unmatched_endpoints(&dir.join(UNMATCHED_ENDPOINTS_FILE), &analysis.unmatched_endpoints)?,
        csv_files::write_drop_tables(&dir.join(DROP_TABLES_FILE), &analysis.drop_tables)?,
        csv_files::write_drop_columns(&dir.join(DROP_COLUMNS_FILE), &analysis.drop_columns)?,
        csv_files::write_model_cleanup(&dir.join(MODEL_CLEANUP_FILE), &analysis.model_cleanup)?,
    ];
    written.push(write_text(
        dir.join(DROP_TABLES_SQL_FILE),
        &render_script(analysis.drop_tables.iter().map(|s| s.sql.as_str())),
    )?);
    written.push(write_text(
        dir.join(DROP_COLUMNS_SQL_FILE),
        &render_script(analysis.drop_columns.iter().map(|s| s.sql.as_str())),
    )?);
    log::info!("wrote {} analysis file(s) to {}", written.len(), dir.display());
    Ok(written)
}

/// Writes the disposition report as JSON and, when enabled, as a workbook.
pub fn write_disposition(dir: &Path, report: &DispositionReport) -> Result<Vec<PathBuf>, ReportError> {
    ensure_dir(dir)?;
    let mut written = vec![json::write_disposition_json(&dir.join(REPORT_JSON_FILE), report)?];
    #[cfg(feature = "xlsx-report")]
    written.push(xlsx::write_disposition_xlsx(&dir.join(REPORT_XLSX_FILE), report)?);
    log::info!("wrote cleanup report to {}", dir.display());
    Ok(written)
}

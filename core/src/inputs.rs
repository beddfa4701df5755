//! CSV readers for the artifacts produced by upstream extraction steps.
//!
//! Headers are matched case-insensitively after trimming. Missing required
//! headers are reported together, before any row is read.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use thiserror::Error;

use crate::catalog::{ColumnRow, TableRow};
use crate::decision::ProtectionSets;
use crate::error_codes;
use crate::relationships::{CrossFilter, RelationRow};
use crate::usage::UsageRow;

pub const USAGE_TABLE: &str = "Table in the Semantic Model";
pub const USAGE_COLUMN: &str = "Column in the Semantic Model";
pub const USAGE_KIND: &str = "Usage (Visual/Filter/Slicer)";
pub const USAGE_FORMULA: &str = "Measure Formula";
pub const USAGE_FIELD_NAME: &str = "UI Field Name";

pub const TABLES_FILE: &str = "Tables.csv";
pub const COLUMNS_FILE: &str = "Columns.csv";
pub const RELATIONS_FILE: &str = "Relations.csv";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InputError {
    #[error("[PRUNE_INPUT_001] input not found: {path}. Suggestion: check the path or regenerate the upstream extract.")]
    MissingFile { path: PathBuf },
    #[error("[PRUNE_INPUT_001] failed to open {path}: {reason}")]
    Io { path: PathBuf, reason: String },
    #[error("[PRUNE_INPUT_002] {source_name} is missing required column(s): {}. Found: {}", .missing.join(", "), .found.join(", "))]
    MissingHeaders {
        source_name: String,
        missing: Vec<String>,
        found: Vec<String>,
    },
    #[error("[PRUNE_INPUT_003] {source_name} line {line}: {field} has invalid value {value:?} ({reason})")]
    InvalidField {
        source_name: String,
        line: u64,
        field: String,
        value: String,
        reason: String,
    },
    #[error("[PRUNE_INPUT_004] failed to read {source_name}: {reason}")]
    Csv { source_name: String, reason: String },
}

impl InputError {
    pub fn code(&self) -> &'static str {
        match self {
            InputError::MissingFile { .. } | InputError::Io { .. } => error_codes::INPUT_MISSING_FILE,
            InputError::MissingHeaders { .. } => error_codes::INPUT_MISSING_HEADERS,
            InputError::InvalidField { .. } => error_codes::INPUT_INVALID_FIELD,
            InputError::Csv { .. } => error_codes::INPUT_CSV,
        }
    }
}

/// Column positions resolved from a header row.
struct HeaderMap {
    names: Vec<String>,
}

impl HeaderMap {
    fn new(record: &StringRecord) -> Self {
        Self {
            names: record
                .iter()
                .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
                .collect(),
        }
    }

    fn position(&self, header: &str) -> Option<usize> {
        let wanted = header.to_lowercase();
        self.names.iter().position(|h| *h == wanted)
    }

    fn require(&self, source_name: &str, headers: &[&str]) -> Result<Vec<usize>, InputError> {
        let mut positions = Vec::with_capacity(headers.len());
        let mut missing = Vec::new();
        for header in headers {
            match self.position(header) {
                Some(idx) => positions.push(idx),
                None => missing.push((*header).to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(InputError::MissingHeaders {
                source_name: source_name.to_string(),
                missing,
                found: self.names.clone(),
            });
        }
        Ok(positions)
    }
}

struct CsvSource<R: Read> {
    name: String,
    reader: csv::Reader<R>,
    headers: HeaderMap,
}

impl<R: Read> CsvSource<R> {
    fn from_reader(input: R, name: &str) -> Result<Self, InputError> {
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(input);
        let headers = reader.headers().map_err(|e| InputError::Csv {
            source_name: name.to_string(),
            reason: e.to_string(),
        })?;
        let headers = HeaderMap::new(headers);
        Ok(Self {
            name: name.to_string(),
            reader,
            headers,
        })
    }

    fn records(&mut self) -> Result<Vec<StringRecord>, InputError> {
        let mut out = Vec::new();
        for record in self.reader.records() {
            let record = record.map_err(|e| InputError::Csv {
                source_name: self.name.clone(),
                reason: e.to_string(),
            })?;
            out.push(record);
        }
        Ok(out)
    }
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("")
}

fn optional_field(record: &StringRecord, idx: Option<usize>) -> Option<String> {
    let value = field(record, idx?);
    (!value.trim().is_empty()).then(|| value.to_string())
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map_or(0, |p| p.line())
}

fn parse_id(source_name: &str, record: &StringRecord, idx: usize, header: &str) -> Result<i64, InputError> {
    let raw = field(record, idx).trim();
    let invalid = |reason: &str| InputError::InvalidField {
        source_name: source_name.to_string(),
        line: line_of(record),
        field: header.to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    if let Ok(id) = raw.parse::<i64>() {
        return Ok(id);
    }
    // Spreadsheet round-trips write integer ids as `12.0`.
    match raw.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 && value.abs() < 9.0e15 => Ok(value as i64),
        Ok(_) => Err(invalid("expected an integer id")),
        Err(_) => Err(invalid("not a number")),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

pub fn read_usage<R: Read>(input: R, source_name: &str) -> Result<Vec<UsageRow>, InputError> {
    let mut src = CsvSource::from_reader(input, source_name)?;
    let idx = src
        .headers
        .require(source_name, &[USAGE_TABLE, USAGE_COLUMN, USAGE_KIND])?;
    let formula = src.headers.position(USAGE_FORMULA);
    let field_name = src.headers.position(USAGE_FIELD_NAME);

    Ok(src
        .records()?
        .iter()
        .map(|r| UsageRow {
            table: field(r, idx[0]).to_string(),
            columns: field(r, idx[1]).to_string(),
            usage: field(r, idx[2]).to_string(),
            formula: optional_field(r, formula),
            field_name: optional_field(r, field_name),
        })
        .collect())
}

pub fn read_usage_file(path: &Path) -> Result<Vec<UsageRow>, InputError> {
    read_usage(open_existing(path)?, &display_name(path))
}

pub fn read_tables<R: Read>(input: R, source_name: &str) -> Result<Vec<TableRow>, InputError> {
    let mut src = CsvSource::from_reader(input, source_name)?;
    let idx = src.headers.require(source_name, &["ID", "Name"])?;
    src.records()?
        .iter()
        .map(|r| {
            Ok(TableRow {
                id: parse_id(source_name, r, idx[0], "ID")?,
                name: field(r, idx[1]).trim().to_string(),
            })
        })
        .collect()
}

pub fn read_columns<R: Read>(input: R, source_name: &str) -> Result<Vec<ColumnRow>, InputError> {
    let mut src = CsvSource::from_reader(input, source_name)?;
    let idx = src
        .headers
        .require(source_name, &["ID", "ExplicitName", "SourceColumn", "TableID"])?;
    src.records()?
        .iter()
        .map(|r| {
            Ok(ColumnRow {
                id: parse_id(source_name, r, idx[0], "ID")?,
                name: field(r, idx[1]).trim().to_string(),
                source_column: field(r, idx[2]).trim().to_string(),
                table_id: parse_id(source_name, r, idx[3], "TableID")?,
            })
        })
        .collect()
}

pub fn read_relations<R: Read>(input: R, source_name: &str) -> Result<Vec<RelationRow>, InputError> {
    let mut src = CsvSource::from_reader(input, source_name)?;
    let idx = src.headers.require(
        source_name,
        &["FromTableID", "FromColumnID", "ToTableID", "ToColumnID"],
    )?;
    let cross_filter = src.headers.position("CrossFilteringBehavior");
    let active = src.headers.position("IsActive");

    src.records()?
        .iter()
        .map(|r| {
            let active_raw = active.map(|i| field(r, i)).unwrap_or("");
            let active = parse_flag(active_raw).ok_or_else(|| InputError::InvalidField {
                source_name: source_name.to_string(),
                line: line_of(r),
                field: "IsActive".to_string(),
                value: active_raw.to_string(),
                reason: "expected true/false".to_string(),
            })?;
            Ok(RelationRow {
                from_table_id: parse_id(source_name, r, idx[0], "FromTableID")?,
                from_column_id: parse_id(source_name, r, idx[1], "FromColumnID")?,
                to_table_id: parse_id(source_name, r, idx[2], "ToTableID")?,
                to_column_id: parse_id(source_name, r, idx[3], "ToColumnID")?,
                cross_filter: CrossFilter::from_raw(cross_filter.map(|i| field(r, i)).unwrap_or("")),
                active,
            })
        })
        .collect()
}

/// The three catalog tables as read from disk.
#[derive(Debug, Clone, Default)]
pub struct CatalogInput {
    pub tables: Vec<TableRow>,
    pub columns: Vec<ColumnRow>,
    pub relations: Vec<RelationRow>,
}

/// Finds `name` in `dir`, ignoring ASCII case.
fn find_in_dir(dir: &Path, name: &str) -> Result<PathBuf, InputError> {
    let exact = dir.join(name);
    if exact.is_file() {
        return Ok(exact);
    }
    let entries = std::fs::read_dir(dir).map_err(|e| InputError::Io {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    for entry in entries.flatten() {
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case(name));
        if matches && path.is_file() {
            return Ok(path);
        }
    }
    Err(InputError::MissingFile { path: exact })
}

fn open_file(path: &Path) -> Result<File, InputError> {
    File::open(path).map_err(|e| InputError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn load_catalog_dir(dir: &Path) -> Result<CatalogInput, InputError> {
    if !dir.is_dir() {
        return Err(InputError::MissingFile {
            path: dir.to_path_buf(),
        });
    }
    let tables_path = find_in_dir(dir, TABLES_FILE)?;
    let columns_path = find_in_dir(dir, COLUMNS_FILE)?;
    let relations_path = find_in_dir(dir, RELATIONS_FILE)?;

    Ok(CatalogInput {
        tables: read_tables(open_file(&tables_path)?, TABLES_FILE)?,
        columns: read_columns(open_file(&columns_path)?, COLUMNS_FILE)?,
        relations: read_relations(open_file(&relations_path)?, RELATIONS_FILE)?,
    })
}

/// Paths of the protection lists; any may be absent.
#[derive(Debug, Clone, Default)]
pub struct ProtectionSources {
    /// `TableName`, `ColumnName` rows.
    pub columns: Option<PathBuf>,
    /// `TableName` rows.
    pub tables: Option<PathBuf>,
    /// `TableName` rows from access-control detection.
    pub access_control: Option<PathBuf>,
}

pub fn read_protected_columns<R: Read>(
    input: R,
    source_name: &str,
    into: &mut ProtectionSets,
) -> Result<usize, InputError> {
    let mut src = CsvSource::from_reader(input, source_name)?;
    let idx = src.headers.require(source_name, &["TableName", "ColumnName"])?;
    let records = src.records()?;
    for r in &records {
        into.protect_column(field(r, idx[0]), field(r, idx[1]));
    }
    Ok(records.len())
}

fn read_table_list<R: Read>(
    input: R,
    source_name: &str,
    mut add: impl FnMut(&str),
) -> Result<usize, InputError> {
    let mut src = CsvSource::from_reader(input, source_name)?;
    let idx = src.headers.require(source_name, &["TableName"])?;
    let records = src.records()?;
    for r in &records {
        add(field(r, idx[0]));
    }
    Ok(records.len())
}

pub fn read_protected_tables<R: Read>(
    input: R,
    source_name: &str,
    into: &mut ProtectionSets,
) -> Result<usize, InputError> {
    read_table_list(input, source_name, |t| into.protect_table(t))
}

pub fn read_access_control_tables<R: Read>(
    input: R,
    source_name: &str,
    into: &mut ProtectionSets,
) -> Result<usize, InputError> {
    read_table_list(input, source_name, |t| into.protect_access_controlled_table(t))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Unions every configured list. A configured access-control list that does
/// not exist is skipped with a warning, since detection may not have run.
pub fn load_protections(sources: &ProtectionSources) -> Result<ProtectionSets, InputError> {
    let mut sets = ProtectionSets::new();

    if let Some(path) = &sources.columns {
        let n = read_protected_columns(open_existing(path)?, &display_name(path), &mut sets)?;
        log::debug!("read {n} protected column row(s) from {}", path.display());
    }
    if let Some(path) = &sources.tables {
        let n = read_protected_tables(open_existing(path)?, &display_name(path), &mut sets)?;
        log::debug!("read {n} protected table row(s) from {}", path.display());
    }
    if let Some(path) = &sources.access_control {
        if path.is_file() {
            let n = read_access_control_tables(open_file(path)?, &display_name(path), &mut sets)?;
            log::info!("merged {n} access-controlled table row(s) from {}", path.display());
        } else {
            log::warn!("access-control list not found, continuing without it: {}", path.display());
        }
    }

    log::info!(
        "protections: {} table(s), {} column(s)",
        sets.table_count(),
        sets.column_count()
    );
    Ok(sets)
}

fn open_existing(path: &Path) -> Result<File, InputError> {
    if !path.is_file() {
        return Err(InputError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    open_file(path)
}

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::parse::TmdlDocument;
use super::types::Block;
use crate::config::PruneConfig;
use crate::error_codes;
use crate::key::normalize_key;

#[derive(Debug, Clone)]
pub struct ModelScanConfig {
    /// Extension of table files, without the dot.
    pub extension: String,
    /// Maximum file size to read into memory (bytes).
    pub max_file_bytes: u64,
}

impl Default for ModelScanConfig {
    fn default() -> Self {
        Self::from(&PruneConfig::default())
    }
}

impl From<&PruneConfig> for ModelScanConfig {
    fn from(cfg: &PruneConfig) -> Self {
        Self {
            extension: cfg.source_extension().to_string(),
            max_file_bytes: cfg.max_file_bytes,
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelScanError {
    #[error("[PRUNE_MODEL_001] model tables directory not found: {path}. Suggestion: point at the semantic model's definition/tables folder.")]
    DirNotFound { path: PathBuf },
    #[error("[PRUNE_MODEL_002] failed to list {path}: {reason}")]
    ReadDir { path: PathBuf, reason: String },
    #[error("[PRUNE_MODEL_004] {count} table file(s) could not be read ({files}); first: {reason}. Suggestion: fix or re-save them; dependencies they declare would otherwise go unprotected.")]
    Incomplete {
        count: usize,
        files: String,
        reason: String,
    },
}

impl ModelScanError {
    pub fn code(&self) -> &'static str {
        match self {
            ModelScanError::DirNotFound { .. } => error_codes::MODEL_DIR_NOT_FOUND,
            ModelScanError::ReadDir { .. } => error_codes::MODEL_READ,
            ModelScanError::Incomplete { .. } => error_codes::MODEL_INCOMPLETE,
        }
    }

    /// The model on disk is missing or malformed, as opposed to an I/O fault.
    pub fn is_input_error(&self) -> bool {
        matches!(self, ModelScanError::DirNotFound { .. } | ModelScanError::Incomplete { .. })
    }
}

/// One parsed table file.
#[derive(Debug, Clone)]
pub struct ModelFile {
    pub path: PathBuf,
    pub file_name: String,
    /// From the `table` declaration, or the file stem when there is none.
    pub table_name: String,
    pub document: TmdlDocument,
}

impl ModelFile {
    pub fn from_text(path: PathBuf, text: &str) -> Self {
        let document = TmdlDocument::parse(text);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let table_name = match document.table() {
            Some(table) => table.name.clone(),
            None => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        Self {
            path,
            file_name,
            table_name,
            document,
        }
    }

    pub fn table(&self) -> Option<&Block> {
        self.document.table()
    }
}

/// A file that could not be read. Scanning continues; planning refuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableFile {
    pub path: PathBuf,
    pub code: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSnapshot {
    /// Sorted by file name.
    pub files: Vec<ModelFile>,
    pub unreadable: Vec<UnreadableFile>,
}

impl ModelSnapshot {
    /// Index of the file declaring `table`, matched case-insensitively.
    pub fn file_for_table(&self, table: &str) -> Option<usize> {
        let wanted = normalize_key(table);
        self.files
            .iter()
            .position(|f| normalize_key(&f.table_name) == wanted)
    }

    /// Fails when any table file was unreadable: its formulas and variations
    /// would be missing from the dependency graph.
    pub fn ensure_complete(&self) -> Result<(), ModelScanError> {
        let Some(first) = self.unreadable.first() else {
            return Ok(());
        };
        let files: Vec<String> = self
            .unreadable
            .iter()
            .map(|u| {
                u.path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .collect();
        Err(ModelScanError::Incomplete {
            count: files.len(),
            files: files.join(", "),
            reason: format!("[{}] {}", first.code, first.reason),
        })
    }
}

/// Reads every table file directly inside `dir`. Subdirectories and files
/// with other extensions (including backups) are ignored.
pub fn load_tables_dir(dir: &Path, scan: &ModelScanConfig) -> Result<ModelSnapshot, ModelScanError> {
    if !dir.is_dir() {
        return Err(ModelScanError::DirNotFound {
            path: dir.to_path_buf(),
        });
    }
    let entries = std::fs::read_dir(dir).map_err(|e| ModelScanError::ReadDir {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ModelScanError::ReadDir {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        if path.is_file() && has_extension(&path, &scan.extension) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut snapshot = ModelSnapshot::default();
    for path in paths {
        match read_model_file(&path, scan.max_file_bytes) {
            Ok(text) => snapshot.files.push(ModelFile::from_text(path, &text)),
            Err(unreadable) => {
                log::warn!("skipping {}: {}", path.display(), unreadable.reason);
                snapshot.unreadable.push(unreadable);
            }
        }
    }
    log::debug!("loaded {} table file(s) from {}", snapshot.files.len(), dir.display());
    Ok(snapshot)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

fn read_model_file(path: &Path, max_bytes: u64) -> Result<String, UnreadableFile> {
    let unreadable = |code: &'static str, reason: String| UnreadableFile {
        path: path.to_path_buf(),
        code,
        reason,
    };
    let meta = std::fs::metadata(path)
        .map_err(|e| unreadable(error_codes::MODEL_READ, format!("failed to read metadata: {e}")))?;
    if meta.len() > max_bytes {
        return Err(unreadable(
            error_codes::MODEL_TOO_LARGE,
            format!("file too large to read ({} bytes > {} bytes cap)", meta.len(), max_bytes),
        ));
    }
    std::fs::read_to_string(path)
        .map_err(|e| unreadable(error_codes::MODEL_READ, format!("failed to read as UTF-8 text: {e}")))
}

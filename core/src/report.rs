//! End-of-run disposition: what was removed, what was skipped and why.

use serde::{Deserialize, Serialize};

use crate::protect::ProtectionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NotFound,
    ProtectedByHierarchy,
    ProtectedBySemanticLink,
    ProtectedByFormulaReference,
    ProtectedByHierarchySibling,
    FileNotFound,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::NotFound => "not-found",
            SkipReason::ProtectedByHierarchy => "protected-by-hierarchy",
            SkipReason::ProtectedBySemanticLink => "protected-by-semantic-link",
            SkipReason::ProtectedByFormulaReference => "protected-by-formula-reference",
            SkipReason::ProtectedByHierarchySibling => "protected-by-hierarchy-sibling",
            SkipReason::FileNotFound => "file-not-found",
        }
    }
}

impl From<ProtectionKind> for SkipReason {
    fn from(kind: ProtectionKind) -> Self {
        match kind {
            ProtectionKind::Hierarchy => SkipReason::ProtectedByHierarchy,
            ProtectionKind::SemanticLink => SkipReason::ProtectedBySemanticLink,
            ProtectionKind::FormulaReference => SkipReason::ProtectedByFormulaReference,
            ProtectionKind::HierarchySibling => SkipReason::ProtectedByHierarchySibling,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Measure,
    CalculatedColumn,
    Column,
    Hierarchy,
    Variation,
    Table,
}

impl ItemKind {
    pub fn label(self) -> &'static str {
        match self {
            ItemKind::Measure => "Measure",
            ItemKind::CalculatedColumn => "Calculated Column",
            ItemKind::Column => "Imported Column",
            ItemKind::Hierarchy => "Hierarchy (cascade)",
            ItemKind::Variation => "Variation (cascade)",
            ItemKind::Table => "Empty Table Deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedItem {
    pub table: String,
    pub item: String,
    pub kind: ItemKind,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub table: String,
    pub item: String,
    pub kind: ItemKind,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    AmbiguousReference,
    MalformedAnnotation,
    StrippedMarker,
    UnreadableFile,
    /// A table file that was already empty and was deleted without edits.
    EmptyTableDeleted,
}

impl NoteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NoteKind::AmbiguousReference => "ambiguous_reference",
            NoteKind::MalformedAnnotation => "malformed_annotation",
            NoteKind::StrippedMarker => "stripped_marker",
            NoteKind::UnreadableFile => "unreadable_file",
            NoteKind::EmptyTableDeleted => "empty_table_deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Note {
    pub kind: NoteKind,
    pub file: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: String,
    pub code: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispositionReport {
    pub removed: Vec<RemovedItem>,
    pub skipped: Vec<SkippedItem>,
    pub notes: Vec<Note>,
    pub failures: Vec<FileFailure>,
}

/// Counts for the end-of-run summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispositionSummary {
    pub measures: usize,
    pub calculated_columns: usize,
    pub columns: usize,
    pub hierarchies: usize,
    pub variations: usize,
    pub tables: usize,
    pub skipped: usize,
    pub failures: usize,
}

impl DispositionReport {
    pub fn note(&mut self, kind: NoteKind, file: impl Into<String>, message: impl Into<String>) {
        self.notes.push(Note {
            kind,
            file: file.into(),
            message: message.into(),
        });
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn summary(&self) -> DispositionSummary {
        let mut s = DispositionSummary {
            skipped: self.skipped.len(),
            failures: self.failures.len(),
            ..Default::default()
        };
        for item in &self.removed {
            match item.kind {
                ItemKind::Measure => s.measures += 1,
                ItemKind::CalculatedColumn => s.calculated_columns += 1,
                ItemKind::Column => s.columns += 1,
                ItemKind::Hierarchy => s.hierarchies += 1,
                ItemKind::Variation => s.variations += 1,
                ItemKind::Table => s.tables += 1,
            }
        }
        s
    }

    pub fn skipped_with(&self, reason: SkipReason) -> impl Iterator<Item = &SkippedItem> {
        self.skipped.iter().filter(move |s| s.reason == reason)
    }
}

impl std::fmt::Display for DispositionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "removed {} measure(s), {} calculated column(s), {} column(s), {} hierarchy(ies), {} variation(s), {} empty table(s); skipped {}; failed files {}",
            self.measures,
            self.calculated_columns,
            self.columns,
            self.hierarchies,
            self.variations,
            self.tables,
            self.skipped,
            self.failures
        )
    }
}

//! Cascading deletion of planned items from TMDL table files.
//!
//! All files are parsed up front (the [`ModelSnapshot`]). Deletions are
//! collected per file as line spans, hierarchy cascades are resolved across
//! every file before variations are touched, and each file is then written
//! once. A failure on one file is recorded and the remaining files proceed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use crate::config::PruneConfig;
use crate::error_codes;
use crate::key::normalize_key;
use crate::protect::CleanupPlan;
use crate::report::{DispositionReport, FileFailure, ItemKind, NoteKind, RemovedItem, SkipReason, SkippedItem};
use crate::tmdl::{parse_object_ref, unquote_name, Block, BlockKind, LineSpan, ModelFile, ModelSnapshot, TmdlDocument};

const SHOW_AS_VARIATIONS_ONLY: &str = "showAsVariationsOnly";
const ENTIRE_TABLE: &str = "(entire table)";

/// Pending edits to one file, committed at most once.
struct FileTransaction<'a> {
    file: &'a ModelFile,
    removed: Vec<LineSpan>,
    dropped: BTreeSet<usize>,
    items: Vec<RemovedItem>,
    backed_up: bool,
    failed: bool,
    rendered: Option<String>,
}

impl<'a> FileTransaction<'a> {
    fn new(file: &'a ModelFile) -> Self {
        Self {
            file,
            removed: Vec::new(),
            dropped: BTreeSet::new(),
            items: Vec::new(),
            backed_up: false,
            failed: false,
            rendered: None,
        }
    }

    fn remove_block(&mut self, block: &Block, table: &str, item: &str, kind: ItemKind) {
        self.removed.push(block.span);
        self.items.push(RemovedItem {
            table: table.to_string(),
            item: item.to_string(),
            kind,
            file: self.file.file_name.clone(),
        });
    }

    fn covers(&self, line: usize) -> bool {
        self.removed.iter().any(|span| span.contains(line))
    }

    fn is_dirty(&self) -> bool {
        !self.removed.is_empty() || !self.dropped.is_empty()
    }

    fn failure(&self, code: &str, error: impl std::fmt::Display) -> FileFailure {
        FileFailure {
            file: self.file.file_name.clone(),
            code: code.to_string(),
            error: error.to_string(),
        }
    }

    fn ensure_backup(&mut self, extension: &str) -> Result<(), FileFailure> {
        if self.backed_up {
            return Ok(());
        }
        let target = backup_path(&self.file.path, extension);
        fs::copy(&self.file.path, &target).map_err(|e| self.failure(error_codes::CLEANUP_BACKUP, e))?;
        log::debug!("backup: {}", target.display());
        self.backed_up = true;
        Ok(())
    }

    fn commit(&mut self, extension: &str) -> Result<(), FileFailure> {
        self.ensure_backup(extension)?;
        let text = self.file.document.render_excluding(&self.removed, &self.dropped);
        fs::write(&self.file.path, &text).map_err(|e| self.failure(error_codes::CLEANUP_WRITE, e))?;
        self.rendered = Some(text);
        Ok(())
    }

    /// Columns and measures left once this transaction's edits apply.
    fn remaining_members(&self) -> Option<usize> {
        match &self.rendered {
            Some(text) => TmdlDocument::parse(text).table().map(Block::member_count),
            None => self.file.table().map(Block::member_count),
        }
    }
}

/// `Sales.tmdl` -> `Sales.tmdl.bak`.
pub fn backup_path(path: &std::path::Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

type HierarchyKey = (String, String);

fn file_label(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The report before any file is touched: plan notes, unreadable files and
/// protected candidates.
pub fn planned_report(plan: &CleanupPlan, snapshot: &ModelSnapshot) -> DispositionReport {
    let mut report = DispositionReport::default();
    report.notes.extend(plan.notes.iter().cloned());
    for unreadable in &snapshot.unreadable {
        report.note(
            NoteKind::UnreadableFile,
            file_label(&unreadable.path),
            format!("[{}] {}", unreadable.code, unreadable.reason),
        );
    }
    for protected in &plan.protected {
        report.skipped.push(SkippedItem {
            table: protected.candidate.name.table.clone(),
            item: protected.candidate.name.name.clone(),
            kind: protected.candidate.kind,
            reason: protected.kind.into(),
        });
    }
    report
}

/// Deletes the plan's candidates from the snapshot's files and returns what
/// happened to each of them. Nothing is touched when any file of the
/// snapshot was unreadable.
pub fn apply_cleanup(plan: &CleanupPlan, snapshot: &ModelSnapshot, config: &PruneConfig) -> DispositionReport {
    let mut report = planned_report(plan, snapshot);
    if let Err(err) = snapshot.ensure_complete() {
        log::warn!("cleanup refused: {err}");
        for unreadable in &snapshot.unreadable {
            report.failures.push(FileFailure {
                file: file_label(&unreadable.path),
                code: err.code().to_string(),
                error: format!("[{}] {}; no file was changed", unreadable.code, unreadable.reason),
            });
        }
        return report;
    }

    let mut txns: Vec<FileTransaction<'_>> = snapshot.files.iter().map(FileTransaction::new).collect();
    let mut deleted_hierarchies: BTreeSet<HierarchyKey> = BTreeSet::new();

    // Locate candidates and cascade to hierarchies in the same file.
    let mut by_file: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, candidate) in plan.candidates.iter().enumerate() {
        match snapshot.file_for_table(&candidate.name.table) {
            Some(file) => by_file.entry(file).or_default().push(idx),
            None => report.skipped.push(SkippedItem {
                table: candidate.name.table.clone(),
                item: candidate.name.name.clone(),
                kind: candidate.kind,
                reason: SkipReason::FileNotFound,
            }),
        }
    }

    for (file_idx, candidate_ids) in &by_file {
        let file = txns[*file_idx].file;
        let txn = &mut txns[*file_idx];
        let table = file.table();
        let mut removed_columns = BTreeSet::new();

        for &idx in candidate_ids {
            let candidate = &plan.candidates[idx];
            let Some(block) = table.and_then(|t| t.child(candidate.block_kind(), &candidate.name.name)) else {
                report.skipped.push(SkippedItem {
                    table: candidate.name.table.clone(),
                    item: candidate.name.name.clone(),
                    kind: candidate.kind,
                    reason: SkipReason::NotFound,
                });
                continue;
            };
            if block.kind == BlockKind::Column {
                removed_columns.insert(normalize_key(&block.name));
            }
            txn.remove_block(block, &candidate.name.table, &candidate.name.name, candidate.kind);
        }

        let Some(table) = table else {
            continue;
        };
        for hierarchy in table.children_of(BlockKind::Hierarchy) {
            let broken = hierarchy
                .children_of(BlockKind::Level)
                .filter_map(|level| level.property("column"))
                .any(|col| removed_columns.contains(&normalize_key(&unquote_name(col))));
            if broken {
                log::info!("{}: cascade removes hierarchy '{}'", file.file_name, hierarchy.name);
                txn.remove_block(hierarchy, &table.name, &hierarchy.name, ItemKind::Hierarchy);
                deleted_hierarchies.insert((normalize_key(&table.name), normalize_key(&hierarchy.name)));
            }
        }
    }

    // Every hierarchy deletion is known; drop variations pointing at them.
    let mut still_targeted: BTreeSet<String> = BTreeSet::new();
    if !deleted_hierarchies.is_empty() {
        for txn in txns.iter_mut() {
            let file = txn.file;
            let Some(table) = file.table() else {
                continue;
            };
            for column in table.children_of(BlockKind::Column) {
                if txn.covers(column.header_line) {
                    continue;
                }
                for variation in column.children_of(BlockKind::Variation) {
                    let Some((target_table, target_hierarchy)) =
                        variation.property("defaultHierarchy").and_then(parse_object_ref)
                    else {
                        continue;
                    };
                    let key = (normalize_key(&target_table), normalize_key(&target_hierarchy));
                    if deleted_hierarchies.contains(&key) {
                        log::info!(
                            "{}: cascade removes variation '{}' on '{}'",
                            txn.file.file_name,
                            variation.name,
                            column.name
                        );
                        txn.remove_block(variation, &table.name, &variation.name, ItemKind::Variation);
                    } else {
                        still_targeted.insert(key.0);
                    }
                }
            }
        }
    }

    let orphaned: BTreeSet<&String> = deleted_hierarchies
        .iter()
        .map(|(table, _)| table)
        .filter(|table| !still_targeted.contains(*table))
        .collect();
    for table in orphaned {
        let Some(file_idx) = snapshot.file_for_table(table) else {
            continue;
        };
        let txn = &mut txns[file_idx];
        let file = txn.file;
        if let Some(flag) = file.table().and_then(|t| t.flag(SHOW_AS_VARIATIONS_ONLY)) {
            txn.dropped.insert(flag.line);
            report.note(
                NoteKind::StrippedMarker,
                file.file_name.clone(),
                format!("{SHOW_AS_VARIATIONS_ONLY} removed; no variation targets this table"),
            );
        }
    }

    let extension = config.backup_extension();
    for txn in txns.iter_mut().filter(|t| t.is_dirty()) {
        match txn.commit(extension) {
            Ok(()) => {
                log::info!("{}: removed {} item(s)", txn.file.file_name, txn.items.len());
                report.removed.append(&mut txn.items);
            }
            Err(failure) => {
                log::warn!("{}: {}", failure.file, failure.error);
                txn.failed = true;
                report.failures.push(failure);
            }
        }
    }

    // Every readable file is checked, including ones this run did not edit.
    for txn in txns.iter_mut().filter(|t| !t.failed) {
        if txn.remaining_members() != Some(0) {
            continue;
        }
        let untouched = txn.rendered.is_none();
        let result = txn.ensure_backup(extension).and_then(|()| {
            fs::remove_file(&txn.file.path).map_err(|e| txn.failure(error_codes::CLEANUP_DELETE, e))
        });
        match result {
            Ok(()) => {
                log::info!("deleted empty table file {}", txn.file.file_name);
                if untouched {
                    report.note(
                        NoteKind::EmptyTableDeleted,
                        txn.file.file_name.clone(),
                        "declared no columns or measures before this run; deleted",
                    );
                }
                let table = txn
                    .file
                    .table()
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| txn.file.table_name.clone());
                report.removed.push(RemovedItem {
                    table,
                    item: ENTIRE_TABLE.to_string(),
                    kind: ItemKind::Table,
                    file: txn.file.file_name.clone(),
                });
            }
            Err(failure) => {
                log::warn!("{}: {}", failure.file, failure.error);
                report.failures.push(failure);
            }
        }
    }

    report
}

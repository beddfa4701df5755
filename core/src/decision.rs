//! Per-column removal decisions and the whole-table rollup.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::catalog::{ColumnRecord, ColumnUniverse};
use crate::key::{compose_key, normalize_key};
use crate::liveness::LivenessFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionReason {
    AccessControl,
    ManualTable,
    ManualColumn,
    /// Kept because a surviving model item depends on it.
    Hierarchy,
    SemanticLink,
    FormulaReference,
    HierarchySibling,
}

impl ProtectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtectionReason::AccessControl => "access-control",
            ProtectionReason::ManualTable => "manual-table",
            ProtectionReason::ManualColumn => "manual-column",
            ProtectionReason::Hierarchy => "hierarchy",
            ProtectionReason::SemanticLink => "semantic-link",
            ProtectionReason::FormulaReference => "formula-reference",
            ProtectionReason::HierarchySibling => "hierarchy-sibling",
        }
    }
}

/// Tables and columns that must never be removed, held in normalized form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionSets {
    manual_tables: BTreeSet<String>,
    manual_columns: BTreeSet<String>,
    access_control_tables: BTreeSet<String>,
}

impl ProtectionSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protect_table(&mut self, table: &str) {
        insert_normalized(&mut self.manual_tables, table);
    }

    pub fn protect_column(&mut self, table: &str, column: &str) {
        if table.trim().is_empty() || column.trim().is_empty() {
            return;
        }
        self.manual_columns.insert(normalize_key(&compose_key(table, column)));
    }

    pub fn protect_access_controlled_table(&mut self, table: &str) {
        insert_normalized(&mut self.access_control_tables, table);
    }

    pub fn table_reason(&self, table: &str) -> Option<ProtectionReason> {
        let table = normalize_key(table);
        if self.access_control_tables.contains(&table) {
            Some(ProtectionReason::AccessControl)
        } else if self.manual_tables.contains(&table) {
            Some(ProtectionReason::ManualTable)
        } else {
            None
        }
    }

    pub fn column_reason(&self, column: &ColumnRecord) -> Option<ProtectionReason> {
        self.table_reason(column.table()).or_else(|| {
            self.manual_columns
                .contains(&column.normalized_key)
                .then_some(ProtectionReason::ManualColumn)
        })
    }

    pub fn table_count(&self) -> usize {
        self.manual_tables.union(&self.access_control_tables).count()
    }

    pub fn column_count(&self) -> usize {
        self.manual_columns.len()
    }
}

fn insert_normalized(set: &mut BTreeSet<String>, name: &str) {
    let norm = normalize_key(name);
    if !norm.is_empty() {
        set.insert(norm);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDecision {
    pub column: ColumnRecord,
    pub flags: LivenessFlags,
    pub remove: bool,
    pub protected: Option<ProtectionReason>,
}

/// Decides every column of the universe; the output is never filtered.
pub fn decide_columns(
    universe: &ColumnUniverse,
    flags: &[LivenessFlags],
    protections: &ProtectionSets,
) -> Vec<ColumnDecision> {
    universe
        .iter()
        .zip(flags.iter().copied().chain(std::iter::repeat(LivenessFlags::default())))
        .map(|(column, flags)| {
            let protected = protections.column_reason(column);
            ColumnDecision {
                column: column.clone(),
                flags,
                remove: !flags.is_live() && protected.is_none(),
                protected,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableVerdict {
    pub table: String,
    pub total_columns: usize,
    pub columns_to_remove: usize,
    pub remove: bool,
    pub protected: Option<ProtectionReason>,
}

/// One verdict per table, ordered by table name.
pub fn rollup_tables(decisions: &[ColumnDecision], protections: &ProtectionSets) -> Vec<TableVerdict> {
    let mut groups: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for decision in decisions {
        let entry = groups.entry(decision.column.table()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += usize::from(decision.remove);
    }

    groups
        .into_iter()
        .map(|(table, (total, flagged))| {
            let protected = protections.table_reason(table);
            TableVerdict {
                table: table.to_string(),
                total_columns: total,
                columns_to_remove: flagged,
                remove: total == flagged && protected.is_none(),
                protected,
            }
        })
        .collect()
}

pub fn kept_tables(verdicts: &[TableVerdict]) -> BTreeSet<String> {
    verdicts
        .iter()
        .filter(|v| !v.remove)
        .map(|v| v.table.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnRow, TableRow};

    fn universe() -> ColumnUniverse {
        let tables = vec![
            TableRow { id: 1, name: "Sales".into() },
            TableRow { id: 2, name: "Staging".into() },
            TableRow { id: 3, name: "UserAccess".into() },
        ];
        let columns = vec![
            ColumnRow { id: 1, name: "Amount".into(), source_column: "amount".into(), table_id: 1 },
            ColumnRow { id: 2, name: "Cost".into(), source_column: "cost".into(), table_id: 1 },
            ColumnRow { id: 3, name: "Raw".into(), source_column: "raw".into(), table_id: 2 },
            ColumnRow { id: 4, name: "Email".into(), source_column: "email".into(), table_id: 3 },
        ];
        ColumnUniverse::build(&tables, &columns).expect("universe")
    }

    fn live(report: bool) -> LivenessFlags {
        LivenessFlags {
            used_in_report: report,
            used_in_relationship: false,
        }
    }

    #[test]
    fn unused_unprotected_columns_are_removed() {
        let flags = vec![live(true), live(false), live(false), live(false)];
        let decisions = decide_columns(&universe(), &flags, &ProtectionSets::new());
        let removed: Vec<bool> = decisions.iter().map(|d| d.remove).collect();
        assert_eq!(removed, vec![false, true, true, true]);
    }

    #[test]
    fn protection_overrides_removal_and_records_reason() {
        let mut protections = ProtectionSets::new();
        protections.protect_column("sales", " COST ");
        protections.protect_access_controlled_table("useraccess");
        protections.protect_table("UserAccess");

        let flags = vec![live(false); 4];
        let decisions = decide_columns(&universe(), &flags, &protections);
        assert_eq!(decisions[1].protected, Some(ProtectionReason::ManualColumn));
        assert!(!decisions[1].remove);
        assert_eq!(decisions[3].protected, Some(ProtectionReason::AccessControl));
        assert!(!decisions[3].remove);
        assert!(decisions[0].remove);
    }

    #[test]
    fn table_removed_only_when_every_column_is() {
        let mut protections = ProtectionSets::new();
        protections.protect_table("UserAccess");
        let flags = vec![live(true), live(false), live(false), live(false)];
        let decisions = decide_columns(&universe(), &flags, &protections);
        let verdicts = rollup_tables(&decisions, &protections);

        let by_name: BTreeMap<&str, &TableVerdict> =
            verdicts.iter().map(|v| (v.table.as_str(), v)).collect();
        assert!(!by_name["Sales"].remove);
        assert_eq!(by_name["Sales"].columns_to_remove, 1);
        assert!(by_name["Staging"].remove);
        assert!(!by_name["UserAccess"].remove);
        assert_eq!(by_name["UserAccess"].protected, Some(ProtectionReason::ManualTable));

        let kept = kept_tables(&verdicts);
        assert!(kept.contains("Sales") && kept.contains("UserAccess"));
        assert!(!kept.contains("Staging"));
    }

    #[test]
    fn blank_protection_entries_are_ignored() {
        let mut protections = ProtectionSets::new();
        protections.protect_table("   ");
        protections.protect_column("", "x");
        assert_eq!(protections.table_count(), 0);
        assert_eq!(protections.column_count(), 0);
    }
}

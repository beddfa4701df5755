//! Per-column liveness flags and the audits that explain unmatched evidence.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::catalog::ColumnUniverse;
use crate::key::{normalize_key, split_key};
use crate::relationships::RelationshipEdge;
use crate::usage::UsageRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessFlags {
    pub used_in_report: bool,
    pub used_in_relationship: bool,
}

impl LivenessFlags {
    pub fn is_live(self) -> bool {
        self.used_in_report || self.used_in_relationship
    }
}

fn item_part(normalized_key: &str) -> &str {
    split_key(normalized_key).map_or(normalized_key, |(_, item)| item.trim())
}

/// One flag per universe column, in universe order.
///
/// Measures also match by bare name because visuals can attribute a measure
/// to a table other than its home table; measure names are model-unique.
pub fn flag_report_usage(universe: &ColumnUniverse, usage: &[UsageRecord]) -> Vec<bool> {
    let used_keys: HashSet<&str> = usage.iter().map(|u| u.normalized_key.as_str()).collect();
    let used_names: HashSet<&str> = used_keys.iter().map(|k| item_part(k)).collect();

    universe
        .iter()
        .map(|col| {
            if used_keys.contains(col.normalized_key.as_str()) {
                return true;
            }
            col.storage.is_measure() && used_names.contains(normalize_key(col.column()).as_str())
        })
        .collect()
}

pub fn flag_relationship_usage(universe: &ColumnUniverse, edges: &[RelationshipEdge]) -> Vec<bool> {
    let endpoints: HashSet<String> = edges
        .iter()
        .flat_map(|e| e.endpoints())
        .map(|q| q.normalized())
        .collect();
    universe
        .iter()
        .map(|col| endpoints.contains(&col.normalized_key))
        .collect()
}

pub fn compute_liveness(
    universe: &ColumnUniverse,
    usage: &[UsageRecord],
    edges: &[RelationshipEdge],
) -> Vec<LivenessFlags> {
    let report = flag_report_usage(universe, usage);
    let rel = flag_relationship_usage(universe, edges);
    report
        .into_iter()
        .zip(rel)
        .map(|(used_in_report, used_in_relationship)| LivenessFlags {
            used_in_report,
            used_in_relationship,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedKind {
    /// The item name exists in the model, but under a different table.
    TrueMismatch,
    /// The item name exists nowhere; a visual-level rename or ad-hoc field.
    DisplayAlias,
}

impl UnmatchedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UnmatchedKind::TrueMismatch => "true_mismatch",
            UnmatchedKind::DisplayAlias => "display_alias",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnmatchedUsageKey {
    pub key: String,
    pub kind: UnmatchedKind,
}

/// Usage keys that matched no model column, deduplicated and ordered by key.
pub fn audit_usage_keys(universe: &ColumnUniverse, usage: &[UsageRecord]) -> Vec<UnmatchedUsageKey> {
    let model_keys: HashSet<&str> = universe.iter().map(|c| c.normalized_key.as_str()).collect();
    let all_names: HashSet<String> = universe.iter().map(|c| normalize_key(c.column())).collect();
    let measure_names: HashSet<String> = universe
        .iter()
        .filter(|c| c.storage.is_measure())
        .map(|c| normalize_key(c.column()))
        .collect();

    let mut out: BTreeSet<UnmatchedUsageKey> = BTreeSet::new();
    for record in usage {
        let norm = record.normalized_key.as_str();
        if model_keys.contains(norm) {
            continue;
        }
        let name = item_part(norm);
        if measure_names.contains(name) {
            continue;
        }
        let kind = if all_names.contains(name) {
            UnmatchedKind::TrueMismatch
        } else {
            UnmatchedKind::DisplayAlias
        };
        out.insert(UnmatchedUsageKey {
            key: record.key.clone(),
            kind,
        });
    }
    out.into_iter().collect()
}

/// Relationship endpoints (as `Table$$Column`) that name no model column.
pub fn audit_relationship_endpoints(universe: &ColumnUniverse, edges: &[RelationshipEdge]) -> Vec<String> {
    let model_keys: HashSet<&str> = universe.iter().map(|c| c.normalized_key.as_str()).collect();
    let mut out: BTreeSet<String> = BTreeSet::new();
    for endpoint in edges.iter().flat_map(|e| e.endpoints()) {
        if !model_keys.contains(endpoint.normalized().as_str()) {
            out.insert(endpoint.key());
        }
    }
    out.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnRow, TableRow};
    use crate::key::QualifiedName;
    use crate::relationships::CrossFilter;
    use crate::usage::{aggregate_usage, UsageRow};

    fn universe() -> ColumnUniverse {
        let tables = vec![
            TableRow { id: 1, name: "Sales".into() },
            TableRow { id: 2, name: "Opportunities".into() },
        ];
        let columns = vec![
            ColumnRow { id: 1, name: "Amount".into(), source_column: "amount".into(), table_id: 1 },
            ColumnRow { id: 2, name: "Cost".into(), source_column: "cost".into(), table_id: 1 },
            ColumnRow { id: 3, name: "Margin".into(), source_column: "margin".into(), table_id: 1 },
            ColumnRow { id: 4, name: "Goal".into(), source_column: "[Measure]".into(), table_id: 2 },
        ];
        ColumnUniverse::build(&tables, &columns).expect("universe")
    }

    fn usage(rows: &[(&str, &str)]) -> Vec<UsageRecord> {
        let rows: Vec<UsageRow> = rows
            .iter()
            .map(|(t, c)| UsageRow {
                table: t.to_string(),
                columns: c.to_string(),
                usage: "Visual".into(),
                ..Default::default()
            })
            .collect();
        aggregate_usage(&rows)
    }

    #[test]
    fn report_flags_match_normalized_keys() {
        let flags = flag_report_usage(&universe(), &usage(&[("SALES", "amount ?")]));
        assert_eq!(flags, vec![true, false, false, false]);
    }

    #[test]
    fn measures_match_by_bare_name_across_tables() {
        let flags = flag_report_usage(&universe(), &usage(&[("Owners", "Goal")]));
        assert_eq!(flags, vec![false, false, false, true]);
    }

    #[test]
    fn plain_columns_do_not_match_by_bare_name() {
        let flags = flag_report_usage(&universe(), &usage(&[("Other", "Amount")]));
        assert_eq!(flags, vec![false; 4]);
    }

    #[test]
    fn relationship_flags_cover_both_endpoints() {
        let edges = vec![RelationshipEdge {
            from: QualifiedName::new("Sales", "Cost"),
            to: QualifiedName::new("Sales", "Margin"),
            cross_filter: CrossFilter::Single,
            active: true,
        }];
        let flags = compute_liveness(&universe(), &[], &edges);
        let live: Vec<bool> = flags.iter().map(|f| f.is_live()).collect();
        assert_eq!(live, vec![false, true, true, false]);
    }

    #[test]
    fn audit_separates_mismatches_from_aliases() {
        let usage = usage(&[
            ("Sales", "Amount"),
            ("Products", "Cost"),
            ("Sales", "Profit Ratio"),
            ("Owners", "Goal"),
        ]);
        let audit = audit_usage_keys(&universe(), &usage);
        assert_eq!(
            audit,
            vec![
                UnmatchedUsageKey { key: "Products$$Cost".into(), kind: UnmatchedKind::TrueMismatch },
                UnmatchedUsageKey { key: "Sales$$Profit Ratio".into(), kind: UnmatchedKind::DisplayAlias },
            ]
        );
    }

    #[test]
    fn relationship_audit_lists_unknown_endpoints() {
        let edges = vec![RelationshipEdge {
            from: QualifiedName::new("Sales", "Amount"),
            to: QualifiedName::new("Ghost", "ID"),
            cross_filter: CrossFilter::Both,
            active: false,
        }];
        assert_eq!(audit_relationship_endpoints(&universe(), &edges), vec!["Ghost$$ID".to_string()]);
    }
}

//! Aggregates per-field consumption evidence into one record per column.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::key::{clean_text, compose_key, normalize_key};

/// One raw row of the usage extract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageRow {
    pub table: String,
    /// A single column name or several joined with commas.
    pub columns: String,
    pub usage: String,
    pub formula: Option<String>,
    /// Display name of a computed field, used as the column when `formula` is present.
    pub field_name: Option<String>,
}

impl UsageRow {
    fn is_computed_field(&self) -> bool {
        self.formula
            .as_deref()
            .map(|f| !f.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageKinds {
    pub slicer: bool,
    pub visual: bool,
    pub filter: bool,
    pub measure: bool,
}

impl UsageKinds {
    pub fn classify(label: &str, computed_field: bool) -> Self {
        let lower = label.to_lowercase();
        Self {
            slicer: contains_word(&lower, "slicer"),
            visual: contains_word(&lower, "visual"),
            filter: contains_word(&lower, "filter"),
            measure: lower.contains("(measure)") || computed_field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageObservation {
    pub table: String,
    pub column: String,
    pub kinds: UsageKinds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub table: String,
    pub column: String,
    pub slicer: u32,
    pub visual: u32,
    pub filter: u32,
    pub measure: u32,
    pub frequency: u32,
    pub key: String,
    pub normalized_key: String,
}

/// Expands raw rows into single-column observations.
pub fn observations(rows: &[UsageRow]) -> Vec<UsageObservation> {
    let mut out = Vec::new();
    for row in rows {
        let table = clean_text(&row.table);
        if table.is_empty() {
            continue;
        }
        let computed = row.is_computed_field();
        let kinds = UsageKinds::classify(&clean_text(&row.usage), computed);

        for part in row.columns.split(',') {
            let column = clean_text(part);
            if column.is_empty() {
                continue;
            }
            out.push(UsageObservation {
                table: table.clone(),
                column,
                kinds,
            });
        }

        if computed {
            let field = clean_text(row.field_name.as_deref().unwrap_or(""));
            if !field.is_empty() {
                out.push(UsageObservation {
                    table: table.clone(),
                    column: field,
                    kinds,
                });
            }
        }
    }
    out
}

/// Groups observations by exact (table, column) and sorts by frequency
/// descending, then table and column ascending.
pub fn aggregate_usage(rows: &[UsageRow]) -> Vec<UsageRecord> {
    let mut groups: BTreeMap<(String, String), [u32; 4]> = BTreeMap::new();
    for obs in observations(rows) {
        let counts = groups.entry((obs.table, obs.column)).or_insert([0; 4]);
        counts[0] += u32::from(obs.kinds.slicer);
        counts[1] += u32::from(obs.kinds.visual);
        counts[2] += u32::from(obs.kinds.filter);
        counts[3] += u32::from(obs.kinds.measure);
    }

    let mut out: Vec<UsageRecord> = groups
        .into_iter()
        .map(|((table, column), [slicer, visual, filter, measure])| {
            let key = compose_key(&table, &column);
            let normalized_key = normalize_key(&key);
            UsageRecord {
                table,
                column,
                slicer,
                visual,
                filter,
                measure,
                frequency: slicer + visual + filter + measure,
                key,
                normalized_key,
            }
        })
        .collect();

    out.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then_with(|| a.table.cmp(&b.table))
            .then_with(|| a.column.cmp(&b.column))
    });
    out
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Whole-word containment with `\b` semantics on both sides.
fn contains_word(haystack: &str, word: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(word) {
        let begin = start + pos;
        let end = begin + word.len();
        let before_ok = haystack[..begin]
            .chars()
            .next_back()
            .map_or(true, |c| !is_word_char(c));
        let after_ok = haystack[end..].chars().next().map_or(true, |c| !is_word_char(c));
        if before_ok && after_ok {
            return true;
        }
        start = begin + word.len();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(table: &str, columns: &str, usage: &str) -> UsageRow {
        UsageRow {
            table: table.into(),
            columns: columns.into(),
            usage: usage.into(),
            ..Default::default()
        }
    }

    #[test]
    fn comma_joined_columns_split_into_separate_records() {
        let rows = vec![
            row("Sales", "Amount, Cost", "Visual"),
            row("Sales", "Amount", "Slicer"),
        ];
        let out = aggregate_usage(&rows);
        assert_eq!(out.len(), 2);

        let amount = &out[0];
        assert_eq!(amount.column, "Amount");
        assert_eq!((amount.visual, amount.slicer, amount.frequency), (1, 1, 2));
        assert_eq!(amount.key, "Sales$$Amount");

        let cost = &out[1];
        assert_eq!(cost.column, "Cost");
        assert_eq!((cost.visual, cost.frequency), (1, 1));
    }

    #[test]
    fn blank_names_are_dropped() {
        let rows = vec![row("Sales", " , ,", "Visual"), row("  ", "Amount", "Visual")];
        assert!(aggregate_usage(&rows).is_empty());
    }

    #[test]
    fn classification_requires_whole_words() {
        let kinds = UsageKinds::classify("visualization filters", false);
        assert!(!kinds.visual);
        assert!(!kinds.filter);
        let kinds = UsageKinds::classify("Visual/Filter (Measure)", false);
        assert!(kinds.visual && kinds.filter && kinds.measure);
        assert!(!kinds.slicer);
    }

    #[test]
    fn computed_field_rows_track_field_display_name() {
        let rows = vec![UsageRow {
            table: "Opportunities".into(),
            columns: "CreatedOn".into(),
            usage: "Visual".into(),
            formula: Some("DATEDIFF(...)".into()),
            field_name: Some("Weeks Open".into()),
        }];
        let out = aggregate_usage(&rows);
        let names: Vec<&str> = out.iter().map(|r| r.column.as_str()).collect();
        assert_eq!(names, vec!["CreatedOn", "Weeks Open"]);
        assert!(out.iter().all(|r| r.measure == 1 && r.visual == 1 && r.frequency == 2));
    }

    #[test]
    fn blank_formula_is_not_a_computed_field() {
        let rows = vec![UsageRow {
            table: "T".into(),
            columns: "C".into(),
            usage: "Visual".into(),
            formula: Some("   ".into()),
            field_name: Some("Alias".into()),
        }];
        let out = aggregate_usage(&rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].measure, 0);
    }

    #[test]
    fn ordering_is_frequency_then_table_then_column() {
        let rows = vec![
            row("B", "x", "Visual"),
            row("A", "y", "Visual"),
            row("A", "x", "Visual"),
            row("C", "z", "Visual Filter Slicer"),
        ];
        let out = aggregate_usage(&rows);
        let keys: Vec<&str> = out.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["C$$z", "A$$x", "A$$y", "B$$x"]);
    }
}

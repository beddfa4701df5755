//! Resolves relationship endpoints from catalog ids to qualified names.

use serde::{Deserialize, Serialize};

use crate::catalog::{ColumnUniverse, ResolutionError, UnresolvedId};
use crate::key::QualifiedName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossFilter {
    Single,
    Both,
    Automatic,
    Unknown,
}

impl CrossFilter {
    /// Accepts both the numeric catalog encoding and the TMDL keywords.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "1" | "single" | "onedirection" => CrossFilter::Single,
            "2" | "both" | "bothdirections" => CrossFilter::Both,
            "3" | "automatic" => CrossFilter::Automatic,
            _ => CrossFilter::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRow {
    pub from_table_id: i64,
    pub from_column_id: i64,
    pub to_table_id: i64,
    pub to_column_id: i64,
    pub cross_filter: CrossFilter,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub from: QualifiedName,
    pub to: QualifiedName,
    pub cross_filter: CrossFilter,
    pub active: bool,
}

impl RelationshipEdge {
    pub fn endpoints(&self) -> [&QualifiedName; 2] {
        [&self.from, &self.to]
    }
}

/// Maps every id of every row; fails with all unmapped ids at once.
pub fn resolve_relationships(
    rows: &[RelationRow],
    universe: &ColumnUniverse,
) -> Result<Vec<RelationshipEdge>, ResolutionError> {
    let mut unresolved = Vec::new();
    let mut edges = Vec::with_capacity(rows.len());

    for (row_idx, row) in rows.iter().enumerate() {
        let mut lookup = |field: &'static str, id: i64, name: Option<&str>| -> Option<String> {
            match name {
                Some(name) => Some(name.to_string()),
                None => {
                    unresolved.push(UnresolvedId { row: row_idx, field, id });
                    None
                }
            }
        };

        let from_table = lookup("FromTableID", row.from_table_id, universe.table_name(row.from_table_id));
        let from_column = lookup("FromColumnID", row.from_column_id, universe.column_name(row.from_column_id));
        let to_table = lookup("ToTableID", row.to_table_id, universe.table_name(row.to_table_id));
        let to_column = lookup("ToColumnID", row.to_column_id, universe.column_name(row.to_column_id));

        if let (Some(ft), Some(fc), Some(tt), Some(tc)) = (from_table, from_column, to_table, to_column) {
            edges.push(RelationshipEdge {
                from: QualifiedName::new(ft, fc),
                to: QualifiedName::new(tt, tc),
                cross_filter: row.cross_filter,
                active: row.active,
            });
        }
    }

    if !unresolved.is_empty() {
        return Err(ResolutionError {
            source_name: "relationship",
            unresolved,
        });
    }
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnRow, TableRow};

    fn universe() -> ColumnUniverse {
        let tables = vec![
            TableRow { id: 1, name: "Orders".into() },
            TableRow { id: 2, name: "Customers".into() },
        ];
        let columns = vec![
            ColumnRow { id: 11, name: "CustomerID".into(), source_column: "cust".into(), table_id: 1 },
            ColumnRow { id: 21, name: "ID".into(), source_column: "id".into(), table_id: 2 },
        ];
        ColumnUniverse::build(&tables, &columns).expect("universe")
    }

    fn relation(ft: i64, fc: i64, tt: i64, tc: i64) -> RelationRow {
        RelationRow {
            from_table_id: ft,
            from_column_id: fc,
            to_table_id: tt,
            to_column_id: tc,
            cross_filter: CrossFilter::Single,
            active: true,
        }
    }

    #[test]
    fn resolves_names_for_each_endpoint() {
        let edges = resolve_relationships(&[relation(1, 11, 2, 21)], &universe()).expect("resolve");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from, QualifiedName::new("Orders", "CustomerID"));
        assert_eq!(edges[0].to, QualifiedName::new("Customers", "ID"));
    }

    #[test]
    fn collects_every_unmapped_id_before_failing() {
        let rows = vec![relation(1, 99, 2, 21), relation(5, 11, 2, 77)];
        let err = resolve_relationships(&rows, &universe()).expect_err("unmapped");
        let fields: Vec<(usize, &str, i64)> = err
            .unresolved
            .iter()
            .map(|u| (u.row, u.field, u.id))
            .collect();
        assert_eq!(
            fields,
            vec![(0, "FromColumnID", 99), (1, "FromTableID", 5), (1, "ToColumnID", 77)]
        );
    }

    #[test]
    fn cross_filter_accepts_numeric_and_keyword_forms() {
        assert_eq!(CrossFilter::from_raw("2"), CrossFilter::Both);
        assert_eq!(CrossFilter::from_raw("BothDirections"), CrossFilter::Both);
        assert_eq!(CrossFilter::from_raw(""), CrossFilter::Single);
        assert_eq!(CrossFilter::from_raw("sideways"), CrossFilter::Unknown);
    }
}

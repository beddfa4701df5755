//! The removal-decision pipeline from raw inputs to every decision artifact.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;

use crate::catalog::{ColumnUniverse, ResolutionError};
use crate::config::PruneConfig;
use crate::decision::{
    decide_columns, kept_tables, rollup_tables, ColumnDecision, ProtectionReason, ProtectionSets, TableVerdict,
};
use crate::hashing::Fingerprinter;
use crate::inputs::{load_catalog_dir, load_protections, read_usage_file, CatalogInput, InputError, ProtectionSources};
use crate::liveness::{audit_relationship_endpoints, audit_usage_keys, compute_liveness, UnmatchedUsageKey};
use crate::protect::ProtectedCandidate;
use crate::relationships::{resolve_relationships, RelationshipEdge};
use crate::sql::{
    drop_column_statements, drop_table_statements, model_cleanup_rows, DropColumnStatement, DropTableStatement,
    ModelCleanupRow,
};
use crate::usage::{aggregate_usage, UsageRecord, UsageRow};

/// Everything the pipeline reads, already parsed.
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    pub usage: Vec<UsageRow>,
    pub catalog: CatalogInput,
    pub protections: ProtectionSets,
}

impl AnalysisInput {
    /// Reads the usage table, the catalog directory and the protection lists.
    pub fn load(usage: &Path, catalog_dir: &Path, protections: &ProtectionSources) -> Result<Self, InputError> {
        let usage = read_usage_file(usage)?;
        let catalog = load_catalog_dir(catalog_dir)?;
        let protections = load_protections(protections)?;
        log::info!(
            "loaded {} usage row(s), {} table(s), {} column(s), {} relationship(s)",
            usage.len(),
            catalog.tables.len(),
            catalog.columns.len(),
            catalog.relations.len()
        );
        Ok(Self {
            usage,
            catalog,
            protections,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub usage: Vec<UsageRecord>,
    pub relationships: Vec<RelationshipEdge>,
    pub decisions: Vec<ColumnDecision>,
    pub tables: Vec<TableVerdict>,
    pub kept_tables: BTreeSet<String>,
    pub unmatched_usage: Vec<UnmatchedUsageKey>,
    pub unmatched_endpoints: Vec<String>,
    pub drop_tables: Vec<DropTableStatement>,
    pub drop_columns: Vec<DropColumnStatement>,
    pub model_cleanup: Vec<ModelCleanupRow>,
    /// xxh3 over the rendered column and table verdicts.
    pub fingerprint: u64,
    protections: ProtectionSets,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    pub columns: usize,
    pub used_in_report: usize,
    pub used_in_relationship: usize,
    pub removable_columns: usize,
    pub protected_columns: usize,
    pub tables: usize,
    pub removable_tables: usize,
    pub unmatched_usage_keys: usize,
}

impl std::fmt::Display for AnalysisSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Columns:              {}", self.columns)?;
        writeln!(f, "  used in report:     {}", self.used_in_report)?;
        writeln!(f, "  used in relation:   {}", self.used_in_relationship)?;
        writeln!(f, "  protected:          {}", self.protected_columns)?;
        writeln!(f, "  removable:          {}", self.removable_columns)?;
        writeln!(f, "Tables:               {}", self.tables)?;
        writeln!(f, "  removable:          {}", self.removable_tables)?;
        write!(f, "Unmatched usage keys: {}", self.unmatched_usage_keys)
    }
}

impl Analysis {
    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            columns: self.decisions.len(),
            used_in_report: self.decisions.iter().filter(|d| d.flags.used_in_report).count(),
            used_in_relationship: self
                .decisions
                .iter()
                .filter(|d| d.flags.used_in_relationship)
                .count(),
            removable_columns: self.decisions.iter().filter(|d| d.remove).count(),
            protected_columns: self.decisions.iter().filter(|d| d.protected.is_some()).count(),
            tables: self.tables.len(),
            removable_tables: self.tables.iter().filter(|t| t.remove).count(),
            unmatched_usage_keys: self.unmatched_usage.len(),
        }
    }
}

/// Runs aggregation, resolution, liveness, decisions, rollup and SQL
/// generation. Only identifier resolution can fail. Model dependencies are
/// not known yet; see [`Analysis::apply_structural_protection`].
pub fn analyze(input: &AnalysisInput, config: &PruneConfig) -> Result<Analysis, ResolutionError> {
    let universe = ColumnUniverse::build(&input.catalog.tables, &input.catalog.columns)?;
    let relationships = resolve_relationships(&input.catalog.relations, &universe)?;
    let usage = aggregate_usage(&input.usage);

    let flags = compute_liveness(&universe, &usage, &relationships);
    let decisions = decide_columns(&universe, &flags, &input.protections);

    let unmatched_usage = audit_usage_keys(&universe, &usage);
    let unmatched_endpoints = audit_relationship_endpoints(&universe, &relationships);
    if !unmatched_usage.is_empty() {
        log::warn!("{} usage key(s) match no model column", unmatched_usage.len());
    }
    if !unmatched_endpoints.is_empty() {
        log::warn!(
            "{} relationship endpoint(s) are not in the catalog",
            unmatched_endpoints.len()
        );
    }

    let mut analysis = Analysis {
        usage,
        relationships,
        decisions,
        tables: Vec::new(),
        kept_tables: BTreeSet::new(),
        unmatched_usage,
        unmatched_endpoints,
        drop_tables: Vec::new(),
        drop_columns: Vec::new(),
        model_cleanup: Vec::new(),
        fingerprint: 0,
        protections: input.protections.clone(),
    };
    analysis.derive_outputs(config);
    Ok(analysis)
}

impl Analysis {
    /// Keeps every removable column the model still depends on. Decisions
    /// flip to `remove = false` with the dependency as their reason; table
    /// verdicts, SQL and the model cleanup listing are regenerated. Returns
    /// how many decisions changed.
    pub fn apply_structural_protection(&mut self, protected: &[ProtectedCandidate], config: &PruneConfig) -> usize {
        let reasons: BTreeMap<&str, ProtectionReason> = protected
            .iter()
            .map(|p| (p.candidate.normalized_key.as_str(), ProtectionReason::from(p.kind)))
            .collect();
        let mut changed = 0;
        for decision in self.decisions.iter_mut().filter(|d| d.remove) {
            if let Some(&reason) = reasons.get(decision.column.normalized_key.as_str()) {
                decision.remove = false;
                decision.protected = Some(reason);
                changed += 1;
            }
        }
        if changed > 0 {
            log::info!("{changed} removable column(s) kept for model dependencies");
            self.derive_outputs(config);
        }
        changed
    }

    fn derive_outputs(&mut self, config: &PruneConfig) {
        self.tables = rollup_tables(&self.decisions, &self.protections);
        self.kept_tables = kept_tables(&self.tables);
        self.drop_tables = drop_table_statements(&self.tables, &config.schema);
        self.drop_columns = drop_column_statements(&self.decisions, &self.kept_tables, &config.schema);
        self.model_cleanup = model_cleanup_rows(&self.decisions, &self.kept_tables, config.source_extension());
        self.fingerprint = fingerprint(&self.decisions, &self.tables);
    }
}

fn fingerprint(decisions: &[ColumnDecision], tables: &[TableVerdict]) -> u64 {
    let mut fp = Fingerprinter::new();
    for d in decisions {
        fp.field(&d.column.normalized_key)
            .field(bool_field(d.flags.used_in_report))
            .field(bool_field(d.flags.used_in_relationship))
            .field(bool_field(d.remove))
            .field(d.protected.map_or("", |p| p.as_str()))
            .end_record();
    }
    for t in tables {
        fp.field(&t.table)
            .field(&t.total_columns.to_string())
            .field(&t.columns_to_remove.to_string())
            .field(bool_field(t.remove))
            .end_record();
    }
    fp.finish()
}

fn bool_field(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnRow, TableRow};
    use crate::key::QualifiedName;
    use crate::protect::{Candidate, ProtectionKind};
    use crate::relationships::{CrossFilter, RelationRow};
    use crate::report::ItemKind;

    fn column(id: i64, name: &str, source: &str, table_id: i64) -> ColumnRow {
        ColumnRow {
            id,
            name: name.into(),
            source_column: source.into(),
            table_id,
        }
    }

    fn usage(table: &str, columns: &str, kind: &str) -> UsageRow {
        UsageRow {
            table: table.into(),
            columns: columns.into(),
            usage: kind.into(),
            ..Default::default()
        }
    }

    fn sample() -> AnalysisInput {
        AnalysisInput {
            usage: vec![usage("Sales", "Amount", "Visual")],
            catalog: CatalogInput {
                tables: vec![
                    TableRow { id: 1, name: "Sales".into() },
                    TableRow { id: 2, name: "Orders".into() },
                    TableRow { id: 3, name: "Customers".into() },
                    TableRow { id: 4, name: "Scratch".into() },
                ],
                columns: vec![
                    column(10, "Amount", "amount_usd", 1),
                    column(11, "Cost", "cost", 1),
                    column(12, "Margin", "", 1),
                    column(20, "CustomerID", "CustomerID", 2),
                    column(30, "ID", "ID", 3),
                    column(40, "Tmp", "Tmp", 4),
                ],
                relations: vec![RelationRow {
                    from_table_id: 2,
                    from_column_id: 20,
                    to_table_id: 3,
                    to_column_id: 30,
                    cross_filter: CrossFilter::Single,
                    active: true,
                }],
            },
            protections: ProtectionSets::new(),
        }
    }

    #[test]
    fn pipeline_produces_expected_artifacts() {
        let analysis = analyze(&sample(), &PruneConfig::default()).expect("analysis");

        let removable: Vec<&str> = analysis
            .decisions
            .iter()
            .filter(|d| d.remove)
            .map(|d| d.column.key.as_str())
            .collect();
        assert_eq!(removable, vec!["Sales$$Cost", "Sales$$Margin", "Scratch$$Tmp"]);

        let dropped: Vec<&str> = analysis.drop_tables.iter().map(|t| t.sql.as_str()).collect();
        assert_eq!(dropped, vec!["DROP TABLE [dbo].[Scratch];"]);
        assert_eq!(analysis.drop_columns.len(), 1);
        assert_eq!(analysis.drop_columns[0].sql, "ALTER TABLE [dbo].[Sales] DROP COLUMN [cost];");
        assert_eq!(analysis.model_cleanup.len(), 1);
        assert_eq!(analysis.model_cleanup[0].file, "Sales.tmdl");

        let summary = analysis.summary();
        assert_eq!(summary.columns, 6);
        assert_eq!(summary.used_in_relationship, 2);
        assert_eq!(summary.removable_tables, 1);
    }

    #[test]
    fn protected_table_blocks_drop() {
        let mut input = sample();
        input.protections.protect_table("scratch");
        let analysis = analyze(&input, &PruneConfig::default()).expect("analysis");
        assert!(analysis.drop_tables.is_empty());
        assert!(analysis
            .decisions
            .iter()
            .filter(|d| d.column.table() == "Scratch")
            .all(|d| !d.remove && d.protected.is_some()));
    }

    fn protected(table: &str, name: &str, kind: ProtectionKind) -> ProtectedCandidate {
        let name = QualifiedName::new(table, name);
        ProtectedCandidate {
            candidate: Candidate {
                normalized_key: name.normalized(),
                name,
                kind: ItemKind::Column,
            },
            kind,
        }
    }

    #[test]
    fn structural_protection_regenerates_outputs() {
        let config = PruneConfig::default();
        let mut analysis = analyze(&sample(), &config).expect("analysis");
        let before = analysis.fingerprint;

        let changed = analysis.apply_structural_protection(
            &[
                protected("Sales", "Cost", ProtectionKind::FormulaReference),
                protected("Scratch", "Tmp", ProtectionKind::Hierarchy),
                protected("Sales", "Amount", ProtectionKind::Hierarchy),
            ],
            &config,
        );
        assert_eq!(changed, 2, "Amount was never removable");

        let cost = analysis
            .decisions
            .iter()
            .find(|d| d.column.key == "Sales$$Cost")
            .expect("Cost decision");
        assert!(!cost.remove);
        assert_eq!(cost.protected, Some(ProtectionReason::FormulaReference));
        assert!(analysis.decisions.iter().all(|d| !(d.remove && d.protected.is_some())));

        assert!(analysis.drop_columns.is_empty());
        assert!(analysis.drop_tables.is_empty(), "Scratch keeps a column now");
        assert!(analysis.kept_tables.contains("Scratch"));
        assert_ne!(analysis.fingerprint, before);
    }

    #[test]
    fn unresolved_relationship_ids_abort() {
        let mut input = sample();
        input.catalog.relations[0].to_column_id = 99;
        let err = analyze(&input, &PruneConfig::default()).expect_err("should fail");
        assert_eq!(err.unresolved.len(), 1);
        assert_eq!(err.unresolved[0].id, 99);
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let config = PruneConfig::default();
        let a = analyze(&sample(), &config).expect("analysis");
        let b = analyze(&sample(), &config).expect("analysis");
        assert_eq!(a.fingerprint, b.fingerprint);

        let mut changed = sample();
        changed.usage.push(usage("Sales", "Cost", "Filter"));
        let c = analyze(&changed, &config).expect("analysis");
        assert_ne!(a.fingerprint, c.fingerprint);
    }
}

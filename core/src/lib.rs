//! Model Prune: usage-driven cleanup of Power BI tabular models.
//!
//! This crate provides functionality for:
//! - Aggregating report usage and relationship membership into per-column
//!   removal decisions, rolled up to whole tables
//! - Generating `DROP TABLE` / `ALTER TABLE ... DROP COLUMN` scripts
//! - Protecting items that surviving hierarchies, variations, semantic links
//!   or formulas still depend on
//! - Deleting the remaining items from TMDL table files with backups and
//!   hierarchy/variation cascades
//!
//! # Quick Start
//!
//! ```ignore
//! use model_prune::{analyze, apply_cleanup, load_tables_dir, plan_cleanup, structural_protection};
//! use model_prune::{AnalysisInput, ModelScanConfig, PruneConfig, ProtectionSources};
//!
//! let config = PruneConfig::default();
//! let input = AnalysisInput::load("usage.csv".as_ref(), "catalog".as_ref(), &ProtectionSources::default())?;
//! let mut analysis = analyze(&input, &config)?;
//!
//! let snapshot = load_tables_dir("model/definition/tables".as_ref(), &ModelScanConfig::from(&config))?;
//! let plan = plan_cleanup(&analysis.decisions, &snapshot, &config)?;
//! let kept = structural_protection(&analysis.decisions, &snapshot, &config)?;
//! analysis.apply_structural_protection(&kept, &config);
//! let report = apply_cleanup(&plan, &snapshot, &config);
//! println!("{}", report.summary());
//! ```

mod analysis;
mod catalog;
mod cleanup;
mod config;
mod decision;
pub mod error_codes;
pub(crate) mod hashing;
mod inputs;
mod key;
mod liveness;
mod output;
mod protect;
mod relationships;
mod report;
mod sql;
pub mod tmdl;
mod usage;

pub use analysis::{analyze, Analysis, AnalysisInput, AnalysisSummary};
pub use catalog::{ColumnRecord, ColumnRow, ColumnUniverse, ResolutionError, StorageSource, TableRow, UnresolvedId};
pub use cleanup::{apply_cleanup, backup_path, planned_report};
pub use config::{CleanupMode, ConfigError, PruneConfig, PruneConfigBuilder};
pub use decision::{
    decide_columns, kept_tables, rollup_tables, ColumnDecision, ProtectionReason, ProtectionSets, TableVerdict,
};
pub use hashing::{format_fingerprint, hash_text};
pub use inputs::{
    load_catalog_dir, load_protections, read_access_control_tables, read_columns, read_protected_columns,
    read_protected_tables, read_relations, read_tables, read_usage, read_usage_file, CatalogInput, InputError,
    ProtectionSources,
};
pub use key::{clean_text, compose_key, normalize_key, split_key, QualifiedName, KEY_SEPARATOR};
pub use liveness::{
    audit_relationship_endpoints, audit_usage_keys, compute_liveness, flag_relationship_usage, flag_report_usage,
    LivenessFlags, UnmatchedKind, UnmatchedUsageKey,
};
pub use output::csv_files::{write_records, COLUMN_DECISION_HEADERS};
pub use output::json::{serialize_cleanup_plan, serialize_disposition_report, write_disposition_json};
#[cfg(feature = "xlsx-report")]
pub use output::xlsx::{build_disposition_workbook, write_disposition_xlsx};
pub use output::{
    write_analysis, write_disposition, ReportError, COLUMN_DECISIONS_FILE, DROP_COLUMNS_FILE, DROP_COLUMNS_SQL_FILE,
    DROP_TABLES_FILE, DROP_TABLES_SQL_FILE, MODEL_CLEANUP_FILE, REPORT_JSON_FILE, REPORT_XLSX_FILE,
    TABLE_DECISIONS_FILE, UNMATCHED_ENDPOINTS_FILE, UNMATCHED_USAGE_FILE,
};
pub use protect::{
    build_dependency_graph, plan_cleanup, select_candidates, structural_protection, Candidate, CleanupPlan, DependencyGraph,
    ProtectedCandidate, ProtectionKind,
};
pub use relationships::{resolve_relationships, CrossFilter, RelationRow, RelationshipEdge};
pub use report::{
    DispositionReport, DispositionSummary, FileFailure, ItemKind, Note, NoteKind, RemovedItem, SkipReason,
    SkippedItem,
};
pub use sql::{
    drop_column_statements, drop_table_statements, model_cleanup_rows, quote_ident, render_script,
    DropColumnStatement, DropTableStatement, ModelCleanupRow, ModelItemKind,
};
pub use tmdl::{load_tables_dir, ModelScanConfig, ModelScanError, ModelSnapshot};
pub use usage::{aggregate_usage, observations, UsageKinds, UsageObservation, UsageRecord, UsageRow};

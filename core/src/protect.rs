//! Structural dependency protection.
//!
//! Every relationship that would break if an item were deleted becomes an
//! edge in one [`DependencyGraph`] over normalized `table$$item` keys:
//!
//! - a column's variation points at a hierarchy: column -> each level column
//! - `sortByColumn`: column -> sort column
//! - a semantic-link annotation: column -> link target
//! - a calculated column or measure formula: item -> referenced item
//! - two levels of one hierarchy: level column <-> level column
//!
//! Nodes that are not removal candidates are live. A candidate reachable from
//! a live node is protected and itself treated as live from then on.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::StorageSource;
use crate::config::{CleanupMode, PruneConfig};
use crate::decision::{ColumnDecision, ProtectionReason};
use crate::hashing::Fingerprinter;
use crate::key::{normalize_key, QualifiedName};
use crate::report::{ItemKind, Note, NoteKind};
use crate::tmdl::{
    parse_object_ref, scan_references, unquote_name, Block, BlockKind, ModelScanError, ModelSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionKind {
    Hierarchy,
    SemanticLink,
    FormulaReference,
    HierarchySibling,
}

impl ProtectionKind {
    /// Higher wins when one item is protected by several analyses.
    fn priority(self) -> u8 {
        match self {
            ProtectionKind::FormulaReference => 3,
            ProtectionKind::SemanticLink => 2,
            ProtectionKind::HierarchySibling => 1,
            ProtectionKind::Hierarchy => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProtectionKind::Hierarchy => "hierarchy",
            ProtectionKind::SemanticLink => "semantic-link",
            ProtectionKind::FormulaReference => "formula-reference",
            ProtectionKind::HierarchySibling => "hierarchy-sibling",
        }
    }
}

/// An item the decision engine marked for removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: QualifiedName,
    pub kind: ItemKind,
    pub normalized_key: String,
}

impl Candidate {
    pub fn from_decision(decision: &ColumnDecision) -> Self {
        let kind = match decision.column.storage {
            StorageSource::Measure => ItemKind::Measure,
            StorageSource::Calculated => ItemKind::CalculatedColumn,
            StorageSource::Imported(_) | StorageSource::SyntheticValue => ItemKind::Column,
        };
        Self {
            name: decision.column.name.clone(),
            kind,
            normalized_key: decision.column.normalized_key.clone(),
        }
    }

    /// The TMDL declaration keyword the candidate is located by.
    pub fn block_kind(&self) -> BlockKind {
        match self.kind {
            ItemKind::Measure => BlockKind::Measure,
            _ => BlockKind::Column,
        }
    }
}

/// Removable items eligible for deletion under `mode`, in decision order.
pub fn select_candidates(decisions: &[ColumnDecision], mode: CleanupMode) -> Vec<Candidate> {
    decisions
        .iter()
        .filter(|d| d.remove)
        .filter(|d| match mode {
            CleanupMode::ModelOnly => d.column.storage.is_model_only(),
            CleanupMode::All => true,
        })
        .map(Candidate::from_decision)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Edge {
    to: String,
    kind: ProtectionKind,
}

/// Directed dependency edges between model items, keyed by normalized key.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    edges: BTreeMap<String, BTreeSet<Edge>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, item: &QualifiedName) {
        self.nodes.insert(item.normalized());
    }

    pub fn add_edge(&mut self, from: &QualifiedName, to: &QualifiedName, kind: ProtectionKind) {
        let from = from.normalized();
        let to = to.normalized();
        if from == to {
            return;
        }
        self.edges.entry(from).or_default().insert(Edge { to, kind });
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Candidates reachable from a live node. Each records the strongest
    /// kind among incoming edges from live nodes, or from protected nodes
    /// when no live node points at it directly.
    pub fn protected_candidates(&self, candidates: &BTreeSet<String>) -> BTreeMap<String, ProtectionKind> {
        let mut reached: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<&str> = self
            .nodes
            .iter()
            .chain(self.edges.keys())
            .filter(|n| !candidates.contains(*n))
            .map(String::as_str)
            .collect();
        let mut seen: BTreeSet<&str> = queue.iter().copied().collect();

        while let Some(node) = queue.pop_front() {
            let Some(out) = self.edges.get(node) else {
                continue;
            };
            for edge in out {
                if candidates.contains(&edge.to) && seen.insert(edge.to.as_str()) {
                    reached.insert(edge.to.clone());
                    queue.push_back(edge.to.as_str());
                }
            }
        }

        // (direct, priority) orders the choices; direct edges come from live nodes.
        let mut best: BTreeMap<&str, (bool, u8, ProtectionKind)> = BTreeMap::new();
        for (from, out) in &self.edges {
            let direct = !candidates.contains(from);
            if !direct && !reached.contains(from) {
                continue;
            }
            for edge in out.iter().filter(|e| reached.contains(&e.to)) {
                let rank = (direct, edge.kind.priority(), edge.kind);
                best.entry(edge.to.as_str())
                    .and_modify(|current| {
                        if (rank.0, rank.1) > (current.0, current.1) {
                            *current = rank;
                        }
                    })
                    .or_insert(rank);
            }
        }
        best.into_iter()
            .map(|(key, (_, _, kind))| (key.to_string(), kind))
            .collect()
    }
}

/// Member names declared in the model, used to resolve formula references.
#[derive(Debug, Default)]
struct MemberIndex {
    /// normalized table -> normalized member name -> declared name
    members: BTreeMap<String, BTreeMap<String, QualifiedName>>,
    /// normalized measure name -> declared names
    measures: BTreeMap<String, Vec<QualifiedName>>,
    /// (normalized table, normalized hierarchy) -> level columns
    hierarchies: BTreeMap<(String, String), Vec<QualifiedName>>,
}

impl MemberIndex {
    fn build(snapshot: &ModelSnapshot) -> Self {
        let mut index = Self::default();
        for file in &snapshot.files {
            let Some(table) = file.table() else {
                continue;
            };
            let table_key = normalize_key(&table.name);
            let members = index.members.entry(table_key.clone()).or_default();
            for member in table
                .children
                .iter()
                .filter(|c| matches!(c.kind, BlockKind::Column | BlockKind::Measure))
            {
                let name = QualifiedName::new(table.name.clone(), member.name.clone());
                members.insert(normalize_key(&member.name), name.clone());
                if member.kind == BlockKind::Measure {
                    index
                        .measures
                        .entry(normalize_key(&member.name))
                        .or_default()
                        .push(name);
                }
            }
            for hierarchy in table.children_of(BlockKind::Hierarchy) {
                let levels = hierarchy
                    .children_of(BlockKind::Level)
                    .filter_map(|level| level.property("column"))
                    .map(|col| QualifiedName::new(table.name.clone(), unquote_name(col)))
                    .collect();
                index
                    .hierarchies
                    .insert((table_key.clone(), normalize_key(&hierarchy.name)), levels);
            }
        }
        index
    }

    fn hierarchy_levels(&self, table: &str, hierarchy: &str) -> Option<&[QualifiedName]> {
        self.hierarchies
            .get(&(normalize_key(table), normalize_key(hierarchy)))
            .map(Vec::as_slice)
    }

    fn member(&self, table: &str, name: &str) -> Option<&QualifiedName> {
        self.members.get(&normalize_key(table))?.get(&normalize_key(name))
    }

    fn measure_elsewhere(&self, table: &str, name: &str) -> Option<&QualifiedName> {
        let table = normalize_key(table);
        self.measures
            .get(&normalize_key(name))?
            .iter()
            .find(|m| normalize_key(&m.table) != table)
    }
}

/// Reads the models' table files into a dependency graph. Annotations that
/// cannot be parsed and ambiguous formula references are reported in `notes`.
pub fn build_dependency_graph(snapshot: &ModelSnapshot, config: &PruneConfig, notes: &mut Vec<Note>) -> DependencyGraph {
    let index = MemberIndex::build(snapshot);
    let mut graph = DependencyGraph::new();

    for file in &snapshot.files {
        let Some(table) = file.table() else {
            continue;
        };
        for member in &table.children {
            let from = QualifiedName::new(table.name.clone(), member.name.clone());
            match member.kind {
                BlockKind::Column => {
                    graph.add_node(&from);
                    add_variation_edges(&mut graph, &index, &from, member);
                    if let Some(sort) = member.property("sortByColumn") {
                        let to = QualifiedName::new(table.name.clone(), unquote_name(sort));
                        graph.add_edge(&from, &to, ProtectionKind::Hierarchy);
                    }
                    add_semantic_link_edges(&mut graph, &from, member, config, &file.file_name, notes);
                    if member.is_calculated_column() {
                        add_formula_edges(&mut graph, &index, &from, member, &file.file_name, notes);
                    }
                }
                BlockKind::Measure => {
                    graph.add_node(&from);
                    add_formula_edges(&mut graph, &index, &from, member, &file.file_name, notes);
                }
                BlockKind::Hierarchy => {
                    let levels: Vec<QualifiedName> = member
                        .children_of(BlockKind::Level)
                        .filter_map(|level| level.property("column"))
                        .map(|col| QualifiedName::new(table.name.clone(), unquote_name(col)))
                        .collect();
                    for a in &levels {
                        for b in &levels {
                            graph.add_edge(a, b, ProtectionKind::HierarchySibling);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    log::debug!(
        "dependency graph: {} node(s), {} edge(s)",
        graph.node_count(),
        graph.edge_count()
    );
    graph
}

fn add_variation_edges(graph: &mut DependencyGraph, index: &MemberIndex, from: &QualifiedName, column: &Block) {
    for variation in column.children_of(BlockKind::Variation) {
        let Some((table, hierarchy)) = variation.property("defaultHierarchy").and_then(parse_object_ref) else {
            continue;
        };
        if let Some(levels) = index.hierarchy_levels(&table, &hierarchy) {
            for level in levels {
                graph.add_edge(from, level, ProtectionKind::Hierarchy);
            }
        }
    }
}

fn add_semantic_link_edges(
    graph: &mut DependencyGraph,
    from: &QualifiedName,
    column: &Block,
    config: &PruneConfig,
    file_name: &str,
    notes: &mut Vec<Note>,
) {
    let annotations = column
        .children_of(BlockKind::Annotation)
        .filter(|a| a.name.eq_ignore_ascii_case(&config.semantic_link_annotation));
    for annotation in annotations {
        let raw = annotation.expression.as_deref().unwrap_or("").trim();
        let links = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => items,
            Ok(other) => vec![other],
            Err(err) => {
                log::warn!("{file_name}: unparsable {} on {from}: {err}", annotation.name);
                notes.push(Note {
                    kind: NoteKind::MalformedAnnotation,
                    file: file_name.to_string(),
                    message: format!("{} on {from} is not valid JSON: {err}", annotation.name),
                });
                continue;
            }
        };
        for link in &links {
            let target = &link["LinkTarget"];
            let table = target["TableName"].as_str().unwrap_or("").trim();
            let item = target["TableItemName"].as_str().unwrap_or("").trim();
            if !table.is_empty() && !item.is_empty() {
                graph.add_edge(from, &QualifiedName::new(table, item), ProtectionKind::SemanticLink);
            }
        }
    }
}

fn add_formula_edges(
    graph: &mut DependencyGraph,
    index: &MemberIndex,
    from: &QualifiedName,
    member: &Block,
    file_name: &str,
    notes: &mut Vec<Note>,
) {
    let Some(expression) = member.expression.as_deref() else {
        return;
    };
    let mut seen = BTreeSet::new();
    for reference in scan_references(expression) {
        if !seen.insert(reference.clone()) {
            continue;
        }
        let target = match &reference.table {
            Some(table) => index
                .member(table, &reference.name)
                .cloned()
                .unwrap_or_else(|| QualifiedName::new(table.clone(), reference.name.clone())),
            None => {
                let local = index.member(&from.table, &reference.name);
                let measure = index.measure_elsewhere(&from.table, &reference.name);
                match (local, measure) {
                    (Some(local), Some(measure)) => {
                        notes.push(Note {
                            kind: NoteKind::AmbiguousReference,
                            file: file_name.to_string(),
                            message: format!(
                                "[{}] in {from} matches {local} and measure {measure}; using {local}",
                                reference.name
                            ),
                        });
                        local.clone()
                    }
                    (Some(found), None) | (None, Some(found)) => found.clone(),
                    (None, None) => continue,
                }
            }
        };
        graph.add_edge(from, &target, ProtectionKind::FormulaReference);
    }
}

/// A candidate withheld from deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedCandidate {
    pub candidate: Candidate,
    pub kind: ProtectionKind,
}

/// What the mutator will attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupPlan {
    pub mode: CleanupMode,
    pub candidates: Vec<Candidate>,
    pub protected: Vec<ProtectedCandidate>,
    pub notes: Vec<Note>,
    pub fingerprint: u64,
}

impl CleanupPlan {
    pub fn protected_with(&self, kind: ProtectionKind) -> impl Iterator<Item = &ProtectedCandidate> {
        self.protected.iter().filter(move |p| p.kind == kind)
    }
}

/// Selects candidates for `config.cleanup_mode` and withholds every one a
/// live item structurally depends on. Refuses a snapshot with unreadable
/// files.
pub fn plan_cleanup(
    decisions: &[ColumnDecision],
    snapshot: &ModelSnapshot,
    config: &PruneConfig,
) -> Result<CleanupPlan, ModelScanError> {
    snapshot.ensure_complete()?;
    let selected = select_candidates(decisions, config.cleanup_mode);
    let mut notes = Vec::new();
    let graph = build_dependency_graph(snapshot, config, &mut notes);

    let keys: BTreeSet<String> = selected.iter().map(|c| c.normalized_key.clone()).collect();
    let reasons = graph.protected_candidates(&keys);

    let mut candidates = Vec::new();
    let mut protected = Vec::new();
    for candidate in selected {
        match reasons.get(&candidate.normalized_key) {
            Some(&kind) => protected.push(ProtectedCandidate { candidate, kind }),
            None => candidates.push(candidate),
        }
    }
    notes.sort();
    notes.dedup();

    let mut fp = Fingerprinter::new();
    fp.field(config.cleanup_mode.as_str()).end_record();
    for c in &candidates {
        fp.field("remove").field(&c.normalized_key).end_record();
    }
    for p in &protected {
        fp.field("protect")
            .field(&p.candidate.normalized_key)
            .field(p.kind.as_str())
            .end_record();
    }

    log::info!(
        "cleanup plan: {} candidate(s), {} protected",
        candidates.len(),
        protected.len()
    );
    Ok(CleanupPlan {
        mode: config.cleanup_mode,
        candidates,
        protected,
        notes,
        fingerprint: fp.finish(),
    })
}

/// Every removable item the model still depends on, whatever the cleanup
/// mode. The database scripts assume all removable items are gone, so the
/// protection is computed as if every one of them were a candidate.
pub fn structural_protection(
    decisions: &[ColumnDecision],
    snapshot: &ModelSnapshot,
    config: &PruneConfig,
) -> Result<Vec<ProtectedCandidate>, ModelScanError> {
    let all = PruneConfig {
        cleanup_mode: CleanupMode::All,
        ..config.clone()
    };
    Ok(plan_cleanup(decisions, snapshot, &all)?.protected)
}

impl From<ProtectionKind> for ProtectionReason {
    fn from(kind: ProtectionKind) -> Self {
        match kind {
            ProtectionKind::Hierarchy => ProtectionReason::Hierarchy,
            ProtectionKind::SemanticLink => ProtectionReason::SemanticLink,
            ProtectionKind::FormulaReference => ProtectionReason::FormulaReference,
            ProtectionKind::HierarchySibling => ProtectionReason::HierarchySibling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnRecord;
    use crate::liveness::LivenessFlags;
    use crate::tmdl::{ModelFile, UnreadableFile};
    use std::path::PathBuf;

    fn decision(table: &str, name: &str, storage: StorageSource, remove: bool) -> ColumnDecision {
        let qn = QualifiedName::new(table, name);
        ColumnDecision {
            column: ColumnRecord {
                id: 0,
                key: qn.key(),
                normalized_key: qn.normalized(),
                name: qn,
                storage,
            },
            flags: LivenessFlags::default(),
            remove,
            protected: None,
        }
    }

    fn snapshot(files: &[(&str, &str)]) -> ModelSnapshot {
        ModelSnapshot {
            files: files
                .iter()
                .map(|(name, text)| ModelFile::from_text(PathBuf::from(name), text))
                .collect(),
            unreadable: Vec::new(),
        }
    }

    fn plan_for(decisions: &[ColumnDecision], snapshot: &ModelSnapshot, config: &PruneConfig) -> CleanupPlan {
        plan_cleanup(decisions, snapshot, config).expect("plan")
    }

    fn all_mode() -> PruneConfig {
        PruneConfig {
            cleanup_mode: CleanupMode::All,
            ..PruneConfig::default()
        }
    }

    const OPPORTUNITIES: &str = "table Opportunities\n\n\tmeasure WeeksOpen = DATEDIFF(MIN(Opportunities[CreatedOn]), TODAY(), WEEK)\n\n\tcolumn CreatedOn\n\t\tdataType: dateTime\n\t\tsourceColumn: CreatedOn\n\n\tcolumn Stage\n\t\tsourceColumn: Stage\n";

    #[test]
    fn model_only_mode_keeps_imported_columns_out() {
        let decisions = vec![
            decision("T", "m", StorageSource::Measure, true),
            decision("T", "c", StorageSource::Calculated, true),
            decision("T", "i", StorageSource::Imported("i".into()), true),
            decision("T", "kept", StorageSource::Measure, false),
        ];
        let model_only = select_candidates(&decisions, CleanupMode::ModelOnly);
        assert_eq!(model_only.len(), 2);
        assert_eq!(model_only[0].kind, ItemKind::Measure);
        assert_eq!(model_only[1].kind, ItemKind::CalculatedColumn);
        assert_eq!(select_candidates(&decisions, CleanupMode::All).len(), 3);
    }

    #[test]
    fn live_measure_protects_referenced_column() {
        let decisions = vec![
            decision("Opportunities", "CreatedOn", StorageSource::Imported("CreatedOn".into()), true),
            decision("Opportunities", "Stage", StorageSource::Imported("Stage".into()), true),
        ];
        let plan = plan_for(&decisions, &snapshot(&[("Opportunities.tmdl", OPPORTUNITIES)]), &all_mode());
        assert_eq!(plan.protected.len(), 1);
        assert_eq!(plan.protected[0].candidate.name.name, "CreatedOn");
        assert_eq!(plan.protected[0].kind, ProtectionKind::FormulaReference);
        assert_eq!(plan.candidates.len(), 1);
        assert_eq!(plan.candidates[0].name.name, "Stage");
    }

    #[test]
    fn removed_measure_does_not_protect_its_references() {
        let decisions = vec![
            decision("Opportunities", "WeeksOpen", StorageSource::Measure, true),
            decision("Opportunities", "CreatedOn", StorageSource::Imported("CreatedOn".into()), true),
        ];
        let plan = plan_for(&decisions, &snapshot(&[("Opportunities.tmdl", OPPORTUNITIES)]), &all_mode());
        assert!(plan.protected.is_empty());
        assert_eq!(plan.candidates.len(), 2);
    }

    #[test]
    fn protection_is_transitive_through_protected_items() {
        let text = "table T\n\tmeasure Live = [Mid]\n\tmeasure Mid = [Leaf]\n\tmeasure Leaf = 1\n";
        let decisions = vec![
            decision("T", "Mid", StorageSource::Measure, true),
            decision("T", "Leaf", StorageSource::Measure, true),
        ];
        let plan = plan_for(&decisions, &snapshot(&[("T.tmdl", text)]), &PruneConfig::default());
        assert_eq!(plan.protected.len(), 2);
        assert!(plan.candidates.is_empty());
    }

    #[test]
    fn variation_protects_target_hierarchy_levels() {
        let date = "table Date\n\tcolumn Date\n\t\tsourceColumn: Date\n\n\t\tvariation Variation\n\t\t\tisDefault\n\t\t\trelationship: abc\n\t\t\tdefaultHierarchy: LocalDateTable.'Date Hierarchy'\n";
        let local = "table LocalDateTable\n\tshowAsVariationsOnly\n\n\tcolumn Year\n\t\tsourceColumn: Year\n\tcolumn Quarter\n\t\tsourceColumn: Quarter\n\tcolumn Month\n\t\tsourceColumn: Month\n\tcolumn Day\n\t\tsourceColumn: Day\n\n\thierarchy 'Date Hierarchy'\n\t\tlevel Year\n\t\t\tcolumn: Year\n\t\tlevel Quarter\n\t\t\tcolumn: Quarter\n\t\tlevel Month\n\t\t\tcolumn: Month\n";
        let decisions = vec![
            decision("LocalDateTable", "Year", StorageSource::Imported("Year".into()), true),
            decision("LocalDateTable", "Quarter", StorageSource::Imported("Quarter".into()), true),
            decision("LocalDateTable", "Month", StorageSource::Imported("Month".into()), true),
            decision("LocalDateTable", "Day", StorageSource::Imported("Day".into()), true),
        ];
        let plan = plan_for(
            &decisions,
            &snapshot(&[("Date.tmdl", date), ("LocalDateTable.tmdl", local)]),
            &all_mode(),
        );
        let names: Vec<&str> = plan.protected.iter().map(|p| p.candidate.name.name.as_str()).collect();
        assert_eq!(names, vec!["Year", "Quarter", "Month"]);
        assert_eq!(plan.protected_with(ProtectionKind::Hierarchy).count(), 3);
        assert_eq!(plan.candidates.len(), 1);
        assert_eq!(plan.candidates[0].name.name, "Day");
    }

    #[test]
    fn live_level_protects_its_siblings() {
        let text = "table Geo\n\tcolumn Country\n\tcolumn City\n\n\thierarchy Place\n\t\tlevel Country\n\t\t\tcolumn: Country\n\t\tlevel City\n\t\t\tcolumn: City\n";
        let decisions = vec![decision("Geo", "City", StorageSource::Imported("City".into()), true)];
        let plan = plan_for(&decisions, &snapshot(&[("Geo.tmdl", text)]), &all_mode());
        assert_eq!(plan.protected.len(), 1);
        assert_eq!(plan.protected[0].kind, ProtectionKind::HierarchySibling);
    }

    #[test]
    fn semantic_link_target_is_protected_and_bad_json_is_noted() {
        let text = "table T\n\tcolumn Code\n\t\tannotation __PBI_SemanticLinks = [{\"LinkTarget\":{\"TableName\":\"T\",\"TableItemName\":\"Label\"}}]\n\tcolumn Label\n\tcolumn Other\n\t\tannotation __PBI_SemanticLinks = [{not json\n";
        let decisions = vec![decision("T", "Label", StorageSource::Imported("Label".into()), true)];
        let plan = plan_for(&decisions, &snapshot(&[("T.tmdl", text)]), &all_mode());
        assert_eq!(plan.protected.len(), 1);
        assert_eq!(plan.protected[0].kind, ProtectionKind::SemanticLink);
        assert_eq!(plan.notes.len(), 1);
        assert_eq!(plan.notes[0].kind, NoteKind::MalformedAnnotation);
    }

    #[test]
    fn formula_reference_outranks_hierarchy_support() {
        let text = "table T\n\tmeasure M = SUM(T[Sorted])\n\tcolumn Label\n\t\tsortByColumn: Sorted\n\tcolumn Sorted\n";
        let decisions = vec![decision("T", "Sorted", StorageSource::Imported("Sorted".into()), true)];
        let plan = plan_for(&decisions, &snapshot(&[("T.tmdl", text)]), &all_mode());
        assert_eq!(plan.protected[0].kind, ProtectionKind::FormulaReference);
    }

    #[test]
    fn unqualified_reference_prefers_same_table_and_notes_ambiguity() {
        let sales = "table Sales\n\tmeasure Report = [Total]\n\tcolumn Total\n";
        let other = "table Other\n\tmeasure Total = 1\n";
        let decisions = vec![
            decision("Sales", "Total", StorageSource::Imported("Total".into()), true),
            decision("Other", "Total", StorageSource::Measure, true),
        ];
        let plan = plan_for(
            &decisions,
            &snapshot(&[("Other.tmdl", other), ("Sales.tmdl", sales)]),
            &all_mode(),
        );
        assert_eq!(plan.protected.len(), 1);
        assert_eq!(plan.protected[0].candidate.name.table, "Sales");
        assert_eq!(plan.notes[0].kind, NoteKind::AmbiguousReference);
    }

    #[test]
    fn unqualified_reference_falls_back_to_measure_elsewhere() {
        let sales = "table Sales\n\tmeasure Report = [Margin] * 2\n";
        let other = "table Calc\n\tmeasure Margin = 1\n";
        let decisions = vec![decision("Calc", "Margin", StorageSource::Measure, true)];
        let plan = plan_for(
            &decisions,
            &snapshot(&[("Calc.tmdl", other), ("Sales.tmdl", sales)]),
            &PruneConfig::default(),
        );
        assert_eq!(plan.protected.len(), 1);
        assert!(plan.notes.is_empty());
    }

    #[test]
    fn planning_is_deterministic() {
        let decisions = vec![
            decision("Opportunities", "CreatedOn", StorageSource::Imported("CreatedOn".into()), true),
            decision("Opportunities", "Stage", StorageSource::Imported("Stage".into()), true),
        ];
        let snap = snapshot(&[("Opportunities.tmdl", OPPORTUNITIES)]);
        let a = plan_for(&decisions, &snap, &all_mode());
        let b = plan_for(&decisions, &snap, &all_mode());
        assert_eq!(a, b);
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn unreadable_file_blocks_planning() {
        let mut snap = snapshot(&[("Opportunities.tmdl", OPPORTUNITIES)]);
        snap.unreadable.push(UnreadableFile {
            path: PathBuf::from("Accounts.tmdl"),
            code: crate::error_codes::MODEL_READ,
            reason: "failed to read as UTF-8 text".into(),
        });
        let decisions = vec![decision("Opportunities", "Stage", StorageSource::Imported("Stage".into()), true)];
        let err = plan_cleanup(&decisions, &snap, &all_mode()).expect_err("incomplete model");
        assert!(err.is_input_error());
        assert!(err.to_string().contains("Accounts.tmdl"));
    }

    #[test]
    fn structural_protection_ignores_cleanup_mode() {
        let decisions = vec![
            decision("Opportunities", "CreatedOn", StorageSource::Imported("CreatedOn".into()), true),
            decision("Opportunities", "Stage", StorageSource::Imported("Stage".into()), true),
        ];
        let snap = snapshot(&[("Opportunities.tmdl", OPPORTUNITIES)]);
        assert!(plan_for(&decisions, &snap, &PruneConfig::default()).protected.is_empty());

        let protected = structural_protection(&decisions, &snap, &PruneConfig::default()).expect("protection");
        assert_eq!(protected.len(), 1);
        assert_eq!(protected[0].candidate.name.name, "CreatedOn");
        assert_eq!(ProtectionReason::from(protected[0].kind), ProtectionReason::FormulaReference);
    }
}

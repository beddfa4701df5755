use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockKind {
    Table,
    Column,
    Measure,
    Hierarchy,
    Level,
    Variation,
    Partition,
    Annotation,
    Other,
}

impl BlockKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let kind = match keyword {
            "table" => BlockKind::Table,
            "column" => BlockKind::Column,
            "measure" => BlockKind::Measure,
            "hierarchy" => BlockKind::Hierarchy,
            "level" => BlockKind::Level,
            "variation" => BlockKind::Variation,
            "partition" => BlockKind::Partition,
            "annotation" => BlockKind::Annotation,
            "calculationGroup" | "calculationItem" | "changedProperty" | "culture"
            | "dataSource" | "database" | "expression" | "extendedProperty" | "kpi"
            | "linguisticMetadata" | "model" | "perspective" | "perspectiveColumn"
            | "perspectiveHierarchy" | "perspectiveMeasure" | "perspectiveTable" | "ref"
            | "relationship" | "role" | "tablePermission" | "columnPermission" => BlockKind::Other,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Table => "table",
            BlockKind::Column => "column",
            BlockKind::Measure => "measure",
            BlockKind::Hierarchy => "hierarchy",
            BlockKind::Level => "level",
            BlockKind::Variation => "variation",
            BlockKind::Partition => "partition",
            BlockKind::Annotation => "annotation",
            BlockKind::Other => "other",
        }
    }
}

/// Half-open range of line indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

impl LineSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, line: usize) -> bool {
        line >= self.start && line < self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A `key: value` line directly under a block header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
    pub line: usize,
}

/// A bare keyword line such as `isHidden` or `showAsVariationsOnly`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub text: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub keyword: String,
    /// Declared name with TMDL quoting removed.
    pub name: String,
    pub depth: usize,
    pub header_line: usize,
    /// Covers leading `///` lines, the header and every nested line.
    pub span: LineSpan,
    /// Text after `=` on the header plus any deeper continuation lines.
    pub expression: Option<String>,
    pub properties: Vec<Property>,
    pub flags: Vec<Flag>,
    pub children: Vec<Block>,
}

impl Block {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.key.eq_ignore_ascii_case(key))
            .map(|p| p.value.as_str())
    }

    pub fn flag(&self, text: &str) -> Option<&Flag> {
        self.flags.iter().find(|f| f.text.eq_ignore_ascii_case(text))
    }

    pub fn children_of(&self, kind: BlockKind) -> impl Iterator<Item = &Block> {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    pub fn child(&self, kind: BlockKind, name: &str) -> Option<&Block> {
        self.children_of(kind).find(|c| c.name == name)
    }

    /// A column with a formula, as opposed to one loaded from a source.
    pub fn is_calculated_column(&self) -> bool {
        self.kind == BlockKind::Column && self.expression.is_some()
    }

    /// Columns and measures; the members whose absence makes a table empty.
    pub fn member_count(&self) -> usize {
        self.children
            .iter()
            .filter(|c| matches!(c.kind, BlockKind::Column | BlockKind::Measure))
            .count()
    }
}

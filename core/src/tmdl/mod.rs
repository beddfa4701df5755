//! TMDL (Tabular Model Definition Language) source files.
//!
//! The tokenizer recovers the block structure of table files: tables, their
//! columns and measures, hierarchies with levels, variations and annotations.
//! Spans are tracked per block so the mutator can rebuild a file while
//! leaving selected blocks out.

mod parse;
mod refs;
mod scan;
mod types;

pub use parse::{parse_object_ref, read_name, unquote_name, LineEnding, TmdlDocument};
pub use refs::{scan_references, FormulaRef};
pub use scan::{load_tables_dir, ModelFile, ModelScanConfig, ModelScanError, ModelSnapshot, UnreadableFile};
pub use types::{Block, BlockKind, Flag, LineSpan, Property};

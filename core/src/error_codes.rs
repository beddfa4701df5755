//! Stable error codes surfaced in error messages and the disposition report.
//!
//! Codes never change meaning once published; new failure modes get new codes.

pub const INPUT_MISSING_FILE: &str = "PRUNE_INPUT_001";
pub const INPUT_MISSING_HEADERS: &str = "PRUNE_INPUT_002";
pub const INPUT_INVALID_FIELD: &str = "PRUNE_INPUT_003";
pub const INPUT_CSV: &str = "PRUNE_INPUT_004";

pub const RESOLVE_UNMAPPED_IDS: &str = "PRUNE_RESOLVE_001";

pub const MODEL_DIR_NOT_FOUND: &str = "PRUNE_MODEL_001";
pub const MODEL_READ: &str = "PRUNE_MODEL_002";
pub const MODEL_TOO_LARGE: &str = "PRUNE_MODEL_003";
pub const MODEL_INCOMPLETE: &str = "PRUNE_MODEL_004";

pub const CONFIG_INVALID: &str = "PRUNE_CONFIG_001";

pub const OUTPUT_IO: &str = "PRUNE_OUTPUT_001";
pub const OUTPUT_CSV: &str = "PRUNE_OUTPUT_002";
pub const OUTPUT_JSON: &str = "PRUNE_OUTPUT_003";
pub const OUTPUT_XLSX: &str = "PRUNE_OUTPUT_004";

pub const CLEANUP_BACKUP: &str = "PRUNE_CLEANUP_001";
pub const CLEANUP_WRITE: &str = "PRUNE_CLEANUP_002";
pub const CLEANUP_DELETE: &str = "PRUNE_CLEANUP_003";

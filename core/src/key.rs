//! Canonical `Table$$Column` identifiers.
//!
//! Every comparison between evidence from different sources (usage rows,
//! catalog rows, relationship endpoints, manual protection lists) goes through
//! [`normalize_key`], so two spellings that differ only in case, runs of
//! whitespace, embedded newlines or a stray trailing `?` compare equal.

use serde::{Deserialize, Serialize};

pub const KEY_SEPARATOR: &str = "$$";

/// Newlines become spaces, whitespace runs collapse to one space, ends are trimmed.
pub fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for part in raw.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(part);
    }
    out
}

/// [`clean_text`] plus case folding and removal of a trailing `?`.
pub fn normalize_key(raw: &str) -> String {
    let cleaned = clean_text(raw).to_lowercase();
    match cleaned.strip_suffix('?') {
        Some(rest) => rest.trim_end().to_string(),
        None => cleaned,
    }
}

pub fn compose_key(table: &str, item: &str) -> String {
    format!("{}{}{}", table.trim(), KEY_SEPARATOR, item.trim())
}

/// Splits at the first separator; the item part may itself contain `$$`.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(KEY_SEPARATOR)
}

/// A (table, item) pair naming one column or measure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub table: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
        }
    }

    pub fn key(&self) -> String {
        compose_key(&self.table, &self.name)
    }

    pub fn normalized(&self) -> String {
        normalize_key(&self.key())
    }
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.table, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_collapses_newlines_and_runs() {
        assert_eq!(clean_text("  Sales \n Amount\t\tNet  "), "Sales Amount Net");
        assert_eq!(clean_text("\n\n"), "");
    }

    #[test]
    fn normalize_key_folds_case_and_strips_question_mark() {
        assert_eq!(normalize_key("Sales$$Is  Active ?"), "sales$$is active");
        assert_eq!(normalize_key("Sales$$Amount?"), "sales$$amount");
        assert_eq!(normalize_key("SALES$$AMOUNT"), "sales$$amount");
    }

    #[test]
    fn normalize_key_keeps_interior_question_marks() {
        assert_eq!(normalize_key("T$$Why? Not"), "t$$why? not");
    }

    #[test]
    fn split_key_uses_first_separator() {
        assert_eq!(split_key("T$$a$$b"), Some(("T", "a$$b")));
        assert_eq!(split_key("no separator"), None);
    }

    #[test]
    fn qualified_name_normalizes_through_composed_key() {
        let name = QualifiedName::new(" Orders ", "Customer ID");
        assert_eq!(name.key(), "Orders$$Customer ID");
        assert_eq!(name.normalized(), "orders$$customer id");
        assert_eq!(name.to_string(), " Orders [Customer ID]");
    }
}

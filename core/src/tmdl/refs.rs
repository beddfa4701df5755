//! Tolerant scanner for column and measure references in DAX text.
//!
//! This is not a parser: it tokenizes just enough (identifiers, quoted table
//! names, bracketed names, strings, comments) to find `Table[Item]` and
//! `[Item]` references, and never fails on text it does not understand.

/// One reference found in a formula.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormulaRef {
    /// `None` for an unqualified `[Item]`.
    pub table: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    QuotedIdent(String),
    BracketIdent(String),
    Other,
}

/// Words that can directly precede `[Item]` without naming a table.
const KEYWORDS: &[&str] = &[
    "and", "asc", "by", "column", "define", "desc", "evaluate", "false", "in", "measure", "not",
    "or", "order", "return", "table", "true", "var",
];

struct Scanner {
    chars: Vec<char>,
    pos: usize,
}

impl Scanner {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.advance() {
            if ch == '\n' || ch == '\r' {
                break;
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(ch) if ch.is_whitespace()) {
                self.advance();
            }
            match (self.peek(), self.peek_next()) {
                (Some('/'), Some('/')) | (Some('-'), Some('-')) => self.skip_line(),
                (Some('/'), Some('*')) => {
                    self.pos += 2;
                    while let Some(ch) = self.advance() {
                        if ch == '*' && self.peek() == Some('/') {
                            self.advance();
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Reads up to `close`, treating a doubled `close` as an escaped literal.
    fn read_delimited(&mut self, close: char) -> String {
        let mut buf = String::new();
        while let Some(ch) = self.advance() {
            if ch == close {
                if self.peek() == Some(close) {
                    buf.push(close);
                    self.advance();
                    continue;
                }
                break;
            }
            buf.push(ch);
        }
        buf
    }

    fn next_token(&mut self) -> Option<Token> {
        self.skip_whitespace_and_comments();
        let ch = self.peek()?;
        let token = match ch {
            '[' => {
                self.advance();
                Token::BracketIdent(self.read_delimited(']'))
            }
            '\'' => {
                self.advance();
                Token::QuotedIdent(self.read_delimited('\''))
            }
            '"' => {
                self.advance();
                self.read_delimited('"');
                Token::Other
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut buf = String::new();
                while let Some(c) = self.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        buf.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                Token::Ident(buf)
            }
            _ => {
                self.advance();
                Token::Other
            }
        };
        Some(token)
    }
}

fn names_table(ident: &str) -> bool {
    let first = ident.chars().next();
    !first.is_some_and(|c| c.is_ascii_digit())
        && !KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(ident))
}

/// Every reference in order of appearance; duplicates are kept.
pub fn scan_references(formula: &str) -> Vec<FormulaRef> {
    let mut scanner = Scanner::new(formula);
    let mut out = Vec::new();
    let mut prev: Option<Token> = None;

    while let Some(token) = scanner.next_token() {
        if let Token::BracketIdent(name) = &token {
            let table = match &prev {
                Some(Token::QuotedIdent(t)) => Some(t.clone()),
                Some(Token::Ident(t)) if names_table(t) => Some(t.clone()),
                _ => None,
            };
            let name = name.trim();
            if !name.is_empty() {
                out.push(FormulaRef {
                    table: table.map(|t| t.trim().to_string()),
                    name: name.to_string(),
                });
            }
        }
        prev = Some(token);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qualified(table: &str, name: &str) -> FormulaRef {
        FormulaRef {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    fn bare(name: &str) -> FormulaRef {
        FormulaRef {
            table: None,
            name: name.into(),
        }
    }

    #[test]
    fn finds_qualified_and_quoted_table_references() {
        let refs = scan_references("DATEDIFF(Opportunities[CreatedOn], 'Close Dates'[Closed On], WEEK)");
        assert_eq!(
            refs,
            vec![qualified("Opportunities", "CreatedOn"), qualified("Close Dates", "Closed On")]
        );
    }

    #[test]
    fn unqualified_references_after_keywords_and_operators() {
        let refs = scan_references("VAR x = [Total Sales] RETURN x / [Count]");
        assert_eq!(refs, vec![bare("Total Sales"), bare("Count")]);
    }

    #[test]
    fn strings_and_comments_are_ignored() {
        let refs = scan_references(
            "// Sales[Old]\n\"[NotARef]\" & /* T[X] */ Sales[Amount] -- [Gone]\n+ [Tax]",
        );
        assert_eq!(refs, vec![qualified("Sales", "Amount"), bare("Tax")]);
    }

    #[test]
    fn escaped_delimiters_are_unescaped() {
        let refs = scan_references("'Bob''s Table'[Col]]x] + \"say \"\"hi\"\"\"");
        assert_eq!(refs, vec![qualified("Bob's Table", "Col]x")]);
    }

    #[test]
    fn unterminated_input_does_not_panic() {
        let refs = scan_references("SUM(Sales[Amou");
        assert_eq!(refs, vec![qualified("Sales", "Amou")]);
        assert!(scan_references("'open").is_empty());
    }
}

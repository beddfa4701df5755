//! Line-oriented TMDL tokenizer.
//!
//! Only structure is recovered: declarations, their nesting by indentation,
//! `key: value` properties, bare flags and formula text. Everything else is
//! kept verbatim so a document can be rendered back with selected spans left
//! out.

use std::collections::BTreeSet;

use super::types::{Block, BlockKind, Flag, LineSpan, Property};

const SPACES_PER_LEVEL: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmdlDocument {
    lines: Vec<String>,
    line_ending: LineEnding,
    trailing_newline: bool,
    had_bom: bool,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Copy)]
struct LineInfo {
    depth: usize,
    blank: bool,
}

fn line_info(line: &str) -> LineInfo {
    let mut tabs = 0;
    let mut spaces = 0;
    for ch in line.chars() {
        match ch {
            '\t' => tabs += 1,
            ' ' => spaces += 1,
            _ => break,
        }
    }
    LineInfo {
        depth: tabs + spaces / SPACES_PER_LEVEL,
        blank: line.trim().is_empty(),
    }
}

impl TmdlDocument {
    pub fn parse(text: &str) -> Self {
        let (body, had_bom) = match text.strip_prefix('\u{feff}') {
            Some(rest) => (rest, true),
            None => (text, false),
        };
        let line_ending = if body.contains("\r\n") {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        };
        let trailing_newline = body.ends_with('\n');

        let mut lines: Vec<String> = body
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
            .collect();
        if trailing_newline || body.is_empty() {
            lines.pop();
        }

        let infos: Vec<LineInfo> = lines.iter().map(|l| line_info(l)).collect();
        let members = parse_members(&lines, &infos, 0, lines.len(), 0);

        Self {
            lines,
            line_ending,
            trailing_newline,
            had_bom,
            blocks: members.blocks,
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line(&self, idx: usize) -> Option<&str> {
        self.lines.get(idx).map(String::as_str)
    }

    pub fn had_bom(&self) -> bool {
        self.had_bom
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// The file's `table` declaration, if it has one.
    pub fn table(&self) -> Option<&Block> {
        self.blocks.iter().find(|b| b.kind == BlockKind::Table)
    }

    /// Copies every line not covered by `removed` or listed in `dropped`.
    /// The output never carries a byte-order mark.
    pub fn render_excluding(&self, removed: &[LineSpan], dropped: &BTreeSet<usize>) -> String {
        let mut keep = vec![true; self.lines.len()];
        for span in removed {
            let end = span.end.min(keep.len());
            for flag in keep.iter_mut().take(end).skip(span.start) {
                *flag = false;
            }
        }
        for &line in dropped {
            if let Some(flag) = keep.get_mut(line) {
                *flag = false;
            }
        }

        let newline = self.line_ending.as_str();
        let mut out = String::new();
        let mut first = true;
        for (line, _) in self.lines.iter().zip(&keep).filter(|(_, k)| **k) {
            if !first {
                out.push_str(newline);
            }
            out.push_str(line);
            first = false;
        }
        if self.trailing_newline && !first {
            out.push_str(newline);
        }
        out
    }

    pub fn render(&self) -> String {
        self.render_excluding(&[], &BTreeSet::new())
    }
}

#[derive(Default)]
struct Members {
    blocks: Vec<Block>,
    properties: Vec<Property>,
    flags: Vec<Flag>,
}

/// Walks lines `[start, end)` whose depth equals `depth`, recursing into
/// declarations. Deeper lines outside a declaration are skipped.
fn parse_members(lines: &[String], infos: &[LineInfo], start: usize, end: usize, depth: usize) -> Members {
    let mut out = Members::default();
    let mut doc_start: Option<usize> = None;
    let mut i = start;

    while i < end {
        let info = infos[i];
        if info.blank {
            i += 1;
            continue;
        }
        if info.depth != depth {
            doc_start = None;
            i += 1;
            continue;
        }

        let content = lines[i].trim();
        if content.starts_with("///") {
            doc_start.get_or_insert(i);
            i += 1;
            continue;
        }

        if let Some(header) = parse_header(content) {
            let block = parse_block(lines, infos, i, doc_start.take().unwrap_or(i), end, header);
            i = block.span.end;
            out.blocks.push(block);
            continue;
        }

        doc_start = None;
        match split_property(content) {
            Some((key, value)) => out.properties.push(Property {
                key: key.to_string(),
                value: value.to_string(),
                line: i,
            }),
            None => out.flags.push(Flag {
                text: content.to_string(),
                line: i,
            }),
        }
        i += 1;
    }
    out
}

struct Header {
    kind: BlockKind,
    keyword: String,
    name: String,
    expression: Option<String>,
}

fn parse_block(
    lines: &[String],
    infos: &[LineInfo],
    header_line: usize,
    span_start: usize,
    limit: usize,
    header: Header,
) -> Block {
    let depth = infos[header_line].depth;

    let mut end = header_line + 1;
    while end < limit {
        let info = infos[end];
        if !info.blank && info.depth <= depth {
            break;
        }
        end += 1;
    }

    // Formula continuation lines sit two levels deeper than the header and
    // precede the first member line.
    let mut body_start = header_line + 1;
    let mut expression = header.expression;
    if expression.is_some() {
        let mut continuation: Vec<&str> = Vec::new();
        while body_start < end {
            let info = infos[body_start];
            if !info.blank && info.depth <= depth + 1 {
                break;
            }
            continuation.push(lines[body_start].trim());
            body_start += 1;
        }
        while continuation.last().is_some_and(|l| l.is_empty()) {
            continuation.pop();
        }
        if !continuation.is_empty() {
            let mut text = expression.unwrap_or_default();
            for line in continuation {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(line);
            }
            expression = Some(text);
        }
    }

    let members = parse_members(lines, infos, body_start, end, depth + 1);

    Block {
        kind: header.kind,
        keyword: header.keyword,
        name: header.name,
        depth,
        header_line,
        span: LineSpan::new(span_start, end),
        expression: expression.map(|e| strip_fences(&e)),
        properties: members.properties,
        flags: members.flags,
        children: members.blocks,
    }
}

/// Recognizes `keyword name [= expression]` where keyword is a known
/// declaration keyword.
fn parse_header(content: &str) -> Option<Header> {
    let (keyword, rest) = match content.split_once(|c: char| c.is_whitespace()) {
        Some((k, r)) => (k, r.trim_start()),
        None => return None,
    };
    let kind = BlockKind::from_keyword(keyword)?;
    if rest.is_empty() {
        return None;
    }

    let (name, after) = read_name(rest)?;
    let after = after.trim_start();
    let expression = after
        .strip_prefix('=')
        .map(|expr| expr.trim().to_string());

    Some(Header {
        kind,
        keyword: keyword.to_string(),
        name,
        expression,
    })
}

/// Reads a possibly quoted object name, returning it unquoted with the rest
/// of the input.
pub fn read_name(input: &str) -> Option<(String, &str)> {
    if let Some(body) = input.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = body.char_indices().peekable();
        while let Some((idx, ch)) = chars.next() {
            if ch == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    name.push('\'');
                    chars.next();
                    continue;
                }
                return Some((name, &body[idx + 1..]));
            }
            name.push(ch);
        }
        // Unterminated quote: take the remainder as the name.
        return Some((name, ""));
    }

    let stop = input.find('=').unwrap_or(input.len());
    let name = input[..stop].trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), &input[stop..]))
}

pub fn unquote_name(raw: &str) -> String {
    let raw = raw.trim();
    match read_name(raw) {
        Some((name, _)) if raw.starts_with('\'') => name,
        _ => raw.to_string(),
    }
}

/// Splits `Table.'Object'` (either part may be quoted) into its two names.
pub fn parse_object_ref(raw: &str) -> Option<(String, String)> {
    let raw = raw.trim();
    let (table, rest) = if raw.starts_with('\'') {
        let (table, rest) = read_name(raw)?;
        (table, rest.strip_prefix('.')?)
    } else {
        let (table, rest) = raw.split_once('.')?;
        (table.trim().to_string(), rest)
    };
    let object = unquote_name(rest);
    if table.is_empty() || object.is_empty() {
        return None;
    }
    Some((table, object))
}

fn split_property(content: &str) -> Option<(&str, &str)> {
    let (key, value) = content.split_once(':')?;
    let key = key.trim_end();
    if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some((key, value.trim()))
}

/// Removes the ``` fences TMDL allows around multi-line expressions.
fn strip_fences(expr: &str) -> String {
    let trimmed = expr.trim();
    match trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    {
        Some(inner) => inner.trim().to_string(),
        None => trimmed.to_string(),
    }
}

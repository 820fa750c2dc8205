//! Best-effort parsing of list literals out of free-form model replies.
//!
//! Models are asked to answer with `["a", "b"]` (or the Python spelling
//! `['a', 'b']`), but replies arrive wrapped in code fences, prefixed with a
//! reasoning block, or embedded in prose. The parser returns a tagged result so
//! each call site can choose its own fallback.

use regex::Regex;
use thiserror::Error;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListParseError {
    #[error("empty response")]
    Empty,
    #[error("no list literal found in response: {0}")]
    NoList(String),
}

/// Drop a leading `<think>...</think>` block (reasoning models emit one).
/// Everything up to and including the first closing marker is removed.
pub fn strip_thinking(text: &str) -> &str {
    if text.contains(THINK_OPEN) {
        if let Some(end) = text.find(THINK_CLOSE) {
            return &text[end + THINK_CLOSE.len()..];
        }
    }
    text
}

/// Parse a list of strings from a model reply.
///
/// Order of attempts: exact `[]`, whole reply (after stripping a code fence),
/// the first bracketed list embedded in the text, and finally a bare `[]`
/// anywhere. Non-string scalars and nested lists inside the list are skipped.
pub fn parse_list_literal(text: &str) -> Result<Vec<String>, ListParseError> {
    let content = strip_thinking(text.trim()).trim();
    if content.is_empty() {
        return Err(ListParseError::Empty);
    }
    if content == "[]" {
        return Ok(Vec::new());
    }

    let content = strip_code_fence(content);

    if let Some((items, used)) = parse_sequence(content) {
        if content[used..].trim().is_empty() {
            return Ok(items);
        }
    }

    for (idx, _) in content.match_indices('[') {
        if let Some((items, _)) = parse_sequence(&content[idx..]) {
            return Ok(items);
        }
    }

    if content.contains("[]") {
        return Ok(Vec::new());
    }

    Err(ListParseError::NoList(content.chars().take(200).collect()))
}

/// Remove a surrounding Markdown fence (```python, ```json, bare ```).
fn strip_code_fence(content: &str) -> &str {
    if !(content.starts_with("```") && content.ends_with("```") && content.len() >= 6) {
        return content;
    }
    if let Ok(re) = Regex::new(r"(?s)\A```[A-Za-z0-9_-]*[ \t]*\n?(.*?)\n?```\z") {
        if let Some(inner) = re.captures(content).and_then(|c| c.get(1)) {
            return inner.as_str().trim();
        }
    }
    content
}

/// Parse a `[...]` or `(...)` literal at the start of `src`.
/// Returns the string items and the number of bytes consumed.
fn parse_sequence(src: &str) -> Option<(Vec<String>, usize)> {
    let mut parser = Parser { src, pos: 0 };
    let items = parser.sequence()?;
    Some((items, parser.pos))
}

enum Item {
    Str(String),
    Other,
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn sequence(&mut self) -> Option<Vec<String>> {
        let close = match self.bump()? {
            '[' => ']',
            '(' => ')',
            _ => return None,
        };
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek()? == close {
                self.bump();
                return Some(items);
            }
            if let Item::Str(s) = self.value()? {
                items.push(s);
            }
            self.skip_ws();
            match self.bump()? {
                ',' => continue,
                c if c == close => return Some(items),
                _ => return None,
            }
        }
    }

    fn value(&mut self) -> Option<Item> {
        match self.peek()? {
            '\'' | '"' => self.string().map(Item::Str),
            '[' | '(' => self.sequence().map(|_| Item::Other),
            _ => self.scalar().map(|_| Item::Other),
        }
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'u' => {
                        let start = self.pos;
                        for _ in 0..4 {
                            self.bump()?;
                        }
                        let code = u32::from_str_radix(&self.src[start..self.pos], 16).ok()?;
                        out.push(char::from_u32(code)?);
                    }
                    c @ ('\\' | '\'' | '"') => out.push(c),
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                },
                c if c == quote => return Some(out),
                c => out.push(c),
            }
        }
    }

    /// Numbers and the literal constants; bare words are not list items.
    fn scalar(&mut self) -> Option<()> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'))
        {
            self.bump();
        }
        let token = &self.src[start..self.pos];
        let is_number = !token.is_empty() && token.parse::<f64>().is_ok();
        let is_constant = matches!(token, "True" | "False" | "None" | "true" | "false" | "null");
        (is_number || is_constant).then_some(())
    }
}

//! Text form of when-clauses.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use super::{ContextKeyExpr, PatternError, RegexPattern};
use crate::value::display;

/// A recoverable problem found while parsing a rule.
///
/// Parsing never fails outright: a malformed regex clause still yields a
/// `Regex` node with no pattern (which never matches), and the problem is
/// reported here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDiagnostic {
    /// `key =~` with nothing after the operator.
    #[error("missing regexp-value for =~-expression on '{key}'")]
    MissingRegexValue {
        /// Key the clause tests.
        key: String,
    },

    /// The regex value is not enclosed in slashes.
    #[error("bad regexp-value '{value}', missing /-enclosure")]
    MissingEnclosure {
        /// Raw value text.
        value: String,
    },

    /// `//` with nothing between the slashes.
    #[error("bad regexp-value '{value}', empty pattern")]
    EmptyPattern {
        /// Raw value text.
        value: String,
    },

    /// The pattern did not compile.
    #[error("bad regexp-value '{value}', parse error: {message}")]
    InvalidPattern {
        /// Raw value text.
        value: String,
        /// Compiler message.
        message: String,
    },
}

/// Result of [`parse_with_diagnostics`].
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    /// Normalized expression; `None` for empty input.
    pub expr: Option<ContextKeyExpr>,
    /// Problems encountered, in clause order.
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// Parse rule text and report every recoverable problem.
///
/// The text is split on `&&`; each clause is classified by the first
/// operator it contains, checked in the order `!=`, `==`, `=~`, then a
/// leading `!`, otherwise the clause is a bare key. Blank clauses are
/// skipped. A well-formed quoted literal after `==`/`!=` is opaque to both
/// steps.
pub fn parse_with_diagnostics(text: &str) -> Parsed {
    let mut diagnostics = Vec::new();
    if text.is_empty() {
        return Parsed {
            expr: None,
            diagnostics,
        };
    }
    let clauses: Vec<Option<ContextKeyExpr>> = split_clauses(text)
        .into_iter()
        .map(|clause| parse_clause(clause, &mut diagnostics))
        .collect();
    Parsed {
        expr: ContextKeyExpr::and(clauses).normalize(),
        diagnostics,
    }
}

/// Parse a single clause between `&&` separators.
fn parse_clause(clause: &str, diagnostics: &mut Vec<ParseDiagnostic>) -> Option<ContextKeyExpr> {
    let clause = clause.trim();
    if clause.is_empty() {
        return None;
    }
    let scope = operator_scope(clause);
    let split = |op: &str| split_at_operator(clause, scope, op);
    if let Some((key, value)) = split("!=") {
        return Some(ContextKeyExpr::NotEquals(
            key.trim().to_string(),
            parse_literal(value),
        ));
    }
    if let Some((key, value)) = split("==") {
        return Some(ContextKeyExpr::Equals(
            key.trim().to_string(),
            parse_literal(value),
        ));
    }
    if let Some((key, value)) = split("=~") {
        let key = key.trim();
        let pattern = parse_regex(key, value, diagnostics);
        return Some(ContextKeyExpr::Regex(key.to_string(), pattern));
    }
    if let Some(key) = clause.strip_prefix('!') {
        return Some(ContextKeyExpr::Not(key.trim().to_string()));
    }
    Some(ContextKeyExpr::Defined(clause.to_string()))
}

/// Split `clause` around the first `op` found within `scope`, a prefix of it.
fn split_at_operator<'a>(clause: &'a str, scope: &str, op: &str) -> Option<(&'a str, &'a str)> {
    let at = scope.find(op)?;
    Some((&clause[..at], &clause[at + op.len()..]))
}

/// Split rule text on `&&`, skipping separators inside a quoted literal.
fn split_clauses(text: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    while pos < text.len() {
        let rest = &text[pos..];
        if rest.starts_with("&&") {
            clauses.push(&text[start..pos]);
            pos += 2;
            start = pos;
        } else if rest.starts_with("==") || rest.starts_with("!=") {
            pos += 2;
            pos += quoted_literal_len(&text[pos..]).unwrap_or(0);
        } else {
            pos += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    clauses.push(&text[start..]);
    clauses
}

/// The part of a clause searched for operators: up to and including the
/// first `==`/`!=` when a quoted literal follows it, otherwise all of it.
fn operator_scope(clause: &str) -> &str {
    let first = [clause.find("!="), clause.find("==")]
        .into_iter()
        .flatten()
        .min();
    match first {
        Some(at) if quoted_literal_len(&clause[at + 2..]).is_some() => &clause[..at + 2],
        _ => clause,
    }
}

/// Length of the leading whitespace and quoted literal at the start of
/// `text`, when the literal is followed only by whitespace up to `&&` or the
/// end.
fn quoted_literal_len(text: &str) -> Option<usize> {
    let body = text.trim_start();
    let (_, len) = read_quoted(body)?;
    let tail = body[len..].trim_start();
    (tail.is_empty() || tail.starts_with("&&")).then_some(text.len() - body.len() + len)
}

/// Read a single-quoted literal at the start of `body`.
///
/// Inside the quotes `\'` and `\\` are escapes; any other backslash is
/// literal. Returns the unescaped text and the byte length through the
/// closing quote.
fn read_quoted(body: &str) -> Option<(String, usize)> {
    let inner = body.strip_prefix('\'')?;
    let mut text = String::new();
    let mut chars = inner.char_indices().peekable();
    while let Some((at, c)) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&(_, next @ ('\'' | '\\'))) => {
                    text.push(next);
                    chars.next();
                }
                _ => text.push(c),
            },
            '\'' => return Some((text, at + 2)),
            _ => text.push(c),
        }
    }
    None
}

/// Interpret the right-hand side of `==`/`!=`.
///
/// Bare `true`/`false` become booleans and bare `null` is null. A
/// well-formed quoted literal is unescaped and otherwise kept verbatim.
/// Anything else is the trimmed text.
fn parse_literal(raw: &str) -> Value {
    let raw = raw.trim();
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    match read_quoted(raw) {
        Some((text, len)) if len == raw.len() => Value::String(text),
        _ => Value::String(raw.to_string()),
    }
}

/// Text form of an `==`/`!=` literal, read back by [`parse_literal`].
pub(super) fn write_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        other => {
            let text = display(other);
            let mut out = String::with_capacity(text.len() + 2);
            out.push('\'');
            for c in text.chars() {
                if matches!(c, '\'' | '\\') {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('\'');
            out
        }
    }
}

/// Interpret the right-hand side of `=~` as `/pattern/` with an optional
/// trailing `i`.
fn parse_regex(
    key: &str,
    raw: &str,
    diagnostics: &mut Vec<ParseDiagnostic>,
) -> Option<RegexPattern> {
    let result = compile_regex(key, raw);
    match result {
        Ok(pattern) => Some(pattern),
        Err(diagnostic) => {
            warn!(key = %key, "{}", diagnostic);
            diagnostics.push(diagnostic);
            None
        }
    }
}

/// Locate the slash enclosure and compile its contents.
fn compile_regex(key: &str, raw: &str) -> Result<RegexPattern, ParseDiagnostic> {
    if raw.trim().is_empty() {
        return Err(ParseDiagnostic::MissingRegexValue {
            key: key.to_string(),
        });
    }
    let value = raw.trim().to_string();
    let (Some(start), Some(end)) = (raw.find('/'), raw.rfind('/')) else {
        return Err(ParseDiagnostic::MissingEnclosure { value });
    };
    if start == end {
        return Err(ParseDiagnostic::MissingEnclosure { value });
    }
    let source = &raw[start + 1..end];
    let ignore_case = raw[end + 1..].starts_with('i');
    RegexPattern::new(source, ignore_case).map_err(|e| match e {
        PatternError::Empty => ParseDiagnostic::EmptyPattern { value },
        other => ParseDiagnostic::InvalidPattern {
            value,
            message: other.to_string(),
        },
    })
}

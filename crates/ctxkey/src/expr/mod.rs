//! When-clause expressions over context keys.
//!
//! The language is deliberately small: a flat conjunction of leaf tests
//! (`key`, `!key`, `key == 'v'`, `key != 'v'`, `key =~ /re/i`). Expressions
//! are canonicalized on construction of an `And` and by [`ContextKeyExpr::normalize`]:
//! boolean equality collapses to `Defined`/`Not`, nested conjunctions are
//! flattened, and conjunction members are sorted by [`cmp_exprs`].

mod parse;
mod raw;

use std::{cmp::Ordering, fmt};

use regex::{Regex, RegexBuilder};
use serde_json::Value;
use thiserror::Error;

pub use parse::{ParseDiagnostic, Parsed, parse_with_diagnostics};
use parse::write_literal;
pub use raw::RawContextKey;

use crate::{
    context::ContextReader,
    value::{cmp_values, display, is_truthy, loose_eq},
};

/// Discriminant of an expression node, in canonical sort rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ExprType {
    /// `key`
    Defined = 1,
    /// `!key`
    Not = 2,
    /// `key == 'value'`
    Equals = 3,
    /// `key != 'value'`
    NotEquals = 4,
    /// `a && b && ...`
    And = 5,
    /// `key =~ /pattern/flags`
    Regex = 6,
}

impl ExprType {
    /// Numeric rank used as the primary sort key.
    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// Why a regex pattern was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// Nothing between the slashes. Rule text reads `//` as "no pattern".
    #[error("empty pattern")]
    Empty,

    /// The source contains `&&`, which rule text treats as a clause break.
    #[error("pattern contains the clause separator '&&'")]
    Separator,

    /// The pattern did not compile.
    #[error("{0}")]
    Invalid(String),
}

/// A compiled regex together with the source text it was written as.
#[derive(Clone)]
pub struct RegexPattern {
    /// Pattern text between the slashes.
    source: String,
    /// Whether the `i` flag was given.
    ignore_case: bool,
    /// Compiled matcher.
    regex: Regex,
}

impl RegexPattern {
    /// Compile `source`, optionally case-insensitive.
    ///
    /// Sources that rule text cannot carry are refused: an empty source and
    /// one containing `&&`.
    pub fn new(source: &str, ignore_case: bool) -> Result<Self, PatternError> {
        if source.is_empty() {
            return Err(PatternError::Empty);
        }
        if source.contains("&&") {
            return Err(PatternError::Separator);
        }
        let regex = RegexBuilder::new(source)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| PatternError::Invalid(e.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            ignore_case,
            regex,
        })
    }

    /// Pattern text as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether matching ignores case.
    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    /// Unanchored search, like a `test()` against the text.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for RegexPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.ignore_case == other.ignore_case
    }
}

impl fmt::Display for RegexPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{}/{}",
            self.source,
            if self.ignore_case { "i" } else { "" }
        )
    }
}

impl fmt::Debug for RegexPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegexPattern({})", self)
    }
}

/// A parsed when-clause.
///
/// Variants can be built directly, but `And` nodes are only guaranteed to be
/// flat and sorted when built with [`ContextKeyExpr::and`] or passed through
/// [`ContextKeyExpr::normalize`].
#[derive(Clone, Debug, PartialEq)]
pub enum ContextKeyExpr {
    /// True when the key's value is truthy.
    Defined(String),
    /// True when the key's value is falsy or absent.
    Not(String),
    /// True when the key's value loosely equals the literal.
    Equals(String, Value),
    /// Negation of [`ContextKeyExpr::Equals`].
    NotEquals(String, Value),
    /// True when the pattern matches the key's value as text. A missing
    /// pattern (malformed rule text) never matches.
    Regex(String, Option<RegexPattern>),
    /// True when every member is true.
    And(Vec<ContextKeyExpr>),
}

impl ContextKeyExpr {
    /// `key`
    pub fn has(key: impl Into<String>) -> Self {
        Self::Defined(key.into())
    }

    /// `!key`
    pub fn not(key: impl Into<String>) -> Self {
        Self::Not(key.into())
    }

    /// `key == value`
    ///
    /// Numbers and compound values are kept as their text, the form rule
    /// text compares them in.
    pub fn equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals(key.into(), text_literal(value.into()))
    }

    /// `key != value`, with the literal kept as for [`equals`](Self::equals).
    pub fn not_equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::NotEquals(key.into(), text_literal(value.into()))
    }

    /// `key =~ pattern`
    pub fn regex(key: impl Into<String>, pattern: RegexPattern) -> Self {
        Self::Regex(key.into(), Some(pattern))
    }

    /// Conjunction of `members`, skipping `None` entries.
    ///
    /// Members are normalized, nested conjunctions are flattened, and the
    /// result is sorted. The node is kept even with fewer than two members;
    /// call [`normalize`](Self::normalize) to collapse it.
    pub fn and<I>(members: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Option<Self>>,
    {
        Self::And(normalize_members(members.into_iter().map(Into::into)))
    }

    /// Parse rule text, returning the normalized expression.
    ///
    /// Empty input yields `None`. Malformed regex clauses are logged and
    /// produce a never-matching `Regex` node; see [`parse_with_diagnostics`]
    /// to inspect the problems.
    pub fn deserialize(text: &str) -> Option<Self> {
        parse_with_diagnostics(text).expr
    }

    /// Kind of this node.
    pub fn expr_type(&self) -> ExprType {
        match self {
            Self::Defined(_) => ExprType::Defined,
            Self::Not(_) => ExprType::Not,
            Self::Equals(..) => ExprType::Equals,
            Self::NotEquals(..) => ExprType::NotEquals,
            Self::Regex(..) => ExprType::Regex,
            Self::And(_) => ExprType::And,
        }
    }

    /// Canonical form of this expression; `None` means "no rule".
    ///
    /// Idempotent: normalizing a normalized expression returns it unchanged.
    pub fn normalize(self) -> Option<Self> {
        match self {
            Self::Equals(key, Value::Bool(true)) | Self::NotEquals(key, Value::Bool(false)) => {
                Some(Self::Defined(key))
            }
            Self::Equals(key, Value::Bool(false)) | Self::NotEquals(key, Value::Bool(true)) => {
                Some(Self::Not(key))
            }
            Self::Equals(key, value) => Some(Self::Equals(key, text_literal(value))),
            Self::NotEquals(key, value) => Some(Self::NotEquals(key, text_literal(value))),
            Self::And(members) => {
                let mut members = normalize_members(members.into_iter().map(Some));
                match members.len() {
                    0 => None,
                    1 => members.pop(),
                    _ => Some(Self::And(members)),
                }
            }
            other => Some(other),
        }
    }

    /// Evaluate against a context.
    pub fn evaluate<C: ContextReader + ?Sized>(&self, context: &C) -> bool {
        match self {
            Self::Defined(key) => is_truthy(context.get_value(key).as_ref()),
            Self::Not(key) => !is_truthy(context.get_value(key).as_ref()),
            Self::Equals(key, value) => loose_eq(context.get_value(key).as_ref(), value),
            Self::NotEquals(key, value) => !loose_eq(context.get_value(key).as_ref(), value),
            Self::Regex(key, pattern) => match (pattern, context.get_value(key)) {
                (Some(pattern), Some(value)) => pattern.is_match(&display(&value)),
                _ => false,
            },
            Self::And(members) => members.iter().all(|e| e.evaluate(context)),
        }
    }

    /// Compact textual form accepted by [`deserialize`](Self::deserialize).
    pub fn serialize(&self) -> String {
        match self {
            Self::Defined(key) => key.clone(),
            Self::Not(key) => format!("!{}", key),
            Self::Equals(key, Value::Bool(b)) | Self::NotEquals(key, Value::Bool(b)) => {
                let defined = matches!(self, Self::Equals(..)) == *b;
                if defined {
                    key.clone()
                } else {
                    format!("!{}", key)
                }
            }
            Self::Equals(key, value) => format!("{} == {}", key, write_literal(value)),
            Self::NotEquals(key, value) => format!("{} != {}", key, write_literal(value)),
            Self::Regex(key, Some(pattern)) => format!("{} =~ {}", key, pattern),
            // `RegexPattern` refuses an empty source, so `//` only ever reads
            // back as a missing pattern.
            Self::Regex(key, None) => format!("{} =~ //", key),
            Self::And(members) => members
                .iter()
                .map(Self::serialize)
                .collect::<Vec<_>>()
                .join(" && "),
        }
    }

    /// Every key referenced, in member order.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::Defined(key)
            | Self::Not(key)
            | Self::Equals(key, _)
            | Self::NotEquals(key, _)
            | Self::Regex(key, _) => vec![key.as_str()],
            Self::And(members) => members.iter().flat_map(Self::keys).collect(),
        }
    }
}

impl fmt::Display for ContextKeyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// Bring a literal into the domain rule text can carry: null, booleans and
/// strings. Numbers and compound values become their text.
fn text_literal(value: Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => value,
        other => Value::String(display(&other)),
    }
}

/// Normalize, drop empty, flatten nested `And`s, then sort.
fn normalize_members<I>(members: I) -> Vec<ContextKeyExpr>
where
    I: Iterator<Item = Option<ContextKeyExpr>>,
{
    let mut out = Vec::new();
    for member in members.flatten() {
        match member.normalize() {
            Some(ContextKeyExpr::And(inner)) => out.extend(inner),
            Some(e) => out.push(e),
            None => {}
        }
    }
    out.sort_by(cmp_exprs);
    out
}

/// Total order over expressions used to sort conjunction members.
///
/// Nodes order by [`ExprType`] rank, then by key, then by literal value (for
/// `Equals`/`NotEquals`) or pattern source and flag (for `Regex`). Two `And`
/// nodes order by member count, then member-wise.
pub fn cmp_exprs(a: &ContextKeyExpr, b: &ContextKeyExpr) -> Ordering {
    use ContextKeyExpr as E;

    a.expr_type()
        .cmp(&b.expr_type())
        .then_with(|| match (a, b) {
            (E::Defined(x), E::Defined(y)) | (E::Not(x), E::Not(y)) => x.cmp(y),
            (E::Equals(kx, vx), E::Equals(ky, vy))
            | (E::NotEquals(kx, vx), E::NotEquals(ky, vy)) => {
                kx.cmp(ky).then_with(|| cmp_values(vx, vy))
            }
            (E::Regex(kx, px), E::Regex(ky, py)) => kx.cmp(ky).then_with(|| {
                let source = |p: &Option<RegexPattern>| {
                    p.as_ref()
                        .map(|p| (p.source().to_string(), p.ignore_case()))
                        .unwrap_or_default()
                };
                source(px).cmp(&source(py))
            }),
            (E::And(xs), E::And(ys)) => xs.len().cmp(&ys.len()).then_with(|| {
                xs.iter()
                    .zip(ys)
                    .map(|(x, y)| cmp_exprs(x, y))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            }),
            _ => Ordering::Equal,
        })
}

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// A value stored under a context key.
///
/// Values arrive from the host as JSON, so the variants mirror JSON's shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ContextValue>),
    Map(BTreeMap<String, ContextValue>),
}

impl ContextValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        ContextValue::Bool(b)
    }
}

impl From<f64> for ContextValue {
    fn from(n: f64) -> Self {
        ContextValue::Number(n)
    }
}

impl From<i64> for ContextValue {
    fn from(n: i64) -> Self {
        ContextValue::Number(n as f64)
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::String(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::String(s)
    }
}

impl<T: Into<ContextValue>> From<Vec<T>> for ContextValue {
    fn from(items: Vec<T>) -> Self {
        ContextValue::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for ContextValue {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => ContextValue::Null,
            serde_json::Value::Bool(b) => ContextValue::Bool(b),
            serde_json::Value::Number(n) => ContextValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => ContextValue::String(s),
            serde_json::Value::Array(arr) => ContextValue::Array(arr.into_iter().map(ContextValue::from).collect()),
            serde_json::Value::Object(map) => {
                ContextValue::Map(map.into_iter().map(|(k, v)| (k, ContextValue::from(v))).collect())
            }
        }
    }
}

/// Right-hand side of equality and relational nodes.
#[derive(Debug, Clone)]
pub enum Literal {
    Number(f64),
    Str(String),
}

impl Literal {
    /// Total order used for canonical sorting: numbers before strings.
    pub fn cmp_canonical(&self, other: &Literal) -> Ordering {
        match (self, other) {
            (Literal::Number(a), Literal::Number(b)) => a.total_cmp(b),
            (Literal::Str(a), Literal::Str(b)) => a.cmp(b),
            (Literal::Number(_), Literal::Str(_)) => Ordering::Less,
            (Literal::Str(_), Literal::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_canonical(other) == Ordering::Equal
    }
}

impl Eq for Literal {}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Str(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::Str(s)
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Number(n)
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Number(n) => f.write_str(&crate::runtime::coercion::number_to_string(*n)),
            Literal::Str(s) => f.write_str(s),
        }
    }
}

/// A compiled regex literal.
///
/// The source is kept in canonical form, with every `/` outside a character
/// class written `\/`, so it can always be printed back between slashes.
/// Identity (equality, ordering) is that source alone; flags only affect
/// matching and serialization.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    flags: String,
    regex: regex::Regex,
}

impl Pattern {
    /// Compile `source` with JavaScript-style `flags` (`i`, `m`, `s`, `u`).
    /// `g` and `y` have no meaning for a single test and are dropped.
    pub fn new(source: &str, flags: &str) -> Result<Self, Error> {
        let mut canonical = String::new();
        for flag in ['i', 'm', 's', 'u'] {
            if flags.contains(flag) {
                canonical.push(flag);
            }
        }
        if let Some(bad) = flags.chars().find(|c| !matches!(c, 'i' | 'm' | 's' | 'u' | 'g' | 'y')) {
            return Err(Error::InvalidRegex { pattern: source.to_string(), reason: format!("unknown flag '{}'", bad) });
        }
        let regex = regex::RegexBuilder::new(&translate_source(source))
            .case_insensitive(canonical.contains('i'))
            .multi_line(canonical.contains('m'))
            .dot_matches_new_line(canonical.contains('s'))
            .build()
            .map_err(|e| Error::InvalidRegex { pattern: source.to_string(), reason: e.to_string() })?;
        Ok(Self { source: escape_slashes(source), flags: canonical, regex })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

// Bare `/` outside a class ends a regex literal, so the canonical source
// escapes it.
fn escape_slashes(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars();
    let mut in_class = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push('\\');
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '/' if !in_class => out.push_str("\\/"),
            '[' => {
                in_class = true;
                out.push(c);
            }
            ']' => {
                in_class = false;
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

// `\/` is how a slash is written inside a regex literal; the regex engine
// wants it bare.
fn translate_source(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('/') => out.push('/'),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_values_deserialize_from_json() {
        let v: ContextValue = serde_json::from_str(r#"{"a": [1, "x", true, null]}"#).unwrap();
        match v {
            ContextValue::Map(m) => {
                assert_eq!(
                    m["a"],
                    ContextValue::Array(vec![1.0.into(), "x".into(), true.into(), ContextValue::Null])
                );
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn pattern_keeps_source_and_flags() {
        let p = Pattern::new("^foo\\/bar$", "gi").unwrap();
        assert_eq!(p.to_string(), "/^foo\\/bar$/i");
        assert!(p.is_match("FOO/BAR"));
        assert!(Pattern::new("(", "").is_err());
    }

    #[test]
    fn pattern_source_escapes_bare_slashes() {
        let bare = Pattern::new("^src/main/[/a]", "").unwrap();
        assert_eq!(bare.source(), "^src\\/main\\/[/a]");
        assert!(bare.is_match("src/main/a"));
        assert!(bare == Pattern::new("^src\\/main\\/[/a]", "").unwrap());
        assert_eq!(Pattern::new("a\\\\/b", "").unwrap().source(), "a\\\\\\/b");
    }

    #[test]
    fn literals_order_numbers_first() {
        assert_eq!(Literal::Number(5.0).cmp_canonical(&Literal::from("a")), Ordering::Less);
        assert_eq!(Literal::from("b").cmp_canonical(&Literal::from("a")), Ordering::Greater);
        assert_eq!(Literal::Number(1.5).to_string(), "1.5");
        assert_eq!(Literal::Number(3.0).to_string(), "3");
    }
}

//! Value coercions with JavaScript semantics.
//!
//! When-clauses were historically evaluated by a JavaScript engine and
//! extensions rely on its loose typing (`"1" == 1`, `parseFloat("5px")`), so
//! evaluation reproduces those rules on top of [`ContextValue`].

use crate::types::{ContextValue, Literal};

/// `!!value`
pub fn is_truthy(value: Option<&ContextValue>) -> bool {
    match value {
        None | Some(ContextValue::Null) => false,
        Some(ContextValue::Bool(b)) => *b,
        Some(ContextValue::Number(n)) => *n != 0.0 && !n.is_nan(),
        Some(ContextValue::String(s)) => !s.is_empty(),
        Some(ContextValue::Array(_)) | Some(ContextValue::Map(_)) => true,
    }
}

/// `String(value)`; an absent value is `"undefined"`.
pub fn to_js_string(value: Option<&ContextValue>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(ContextValue::Null) => "null".to_string(),
        Some(ContextValue::Bool(b)) => b.to_string(),
        Some(ContextValue::Number(n)) => number_to_string(*n),
        Some(ContextValue::String(s)) => s.clone(),
        Some(ContextValue::Array(items)) => items
            .iter()
            .map(|item| match item {
                ContextValue::Null => String::new(),
                other => to_js_string(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(ContextValue::Map(_)) => "[object Object]".to_string(),
    }
}

pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        let s = format!("{:e}", n);
        return match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        };
    }
    format!("{}", n)
}

fn trim_js(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '\u{FEFF}')
}

/// Length of the longest prefix of `s` that reads as a decimal literal
/// (`[+-]digits[.digits][e[+-]digits]` or `[+-]Infinity`).
fn decimal_prefix_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    if s[i..].starts_with("Infinity") {
        return Some(i + "Infinity".len());
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;
    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        digits += j - frac_start;
        if digits > 0 {
            i = j;
        }
    }
    if digits == 0 {
        return None;
    }
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        let mut j = i + 1;
        if j < bytes.len() && matches!(bytes[j], b'+' | b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    Some(i)
}

fn parse_decimal(s: &str) -> f64 {
    let unsigned = s.trim_start_matches(['+', '-']);
    if unsigned == "Infinity" {
        return if s.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

/// `parseFloat(s)`: the numeric prefix after leading whitespace, or NaN.
pub fn parse_float(s: &str) -> f64 {
    let s = s.trim_start_matches(|c: char| c.is_whitespace() || c == '\u{FEFF}');
    match decimal_prefix_len(s) {
        Some(len) => parse_decimal(&s[..len]),
        None => f64::NAN,
    }
}

/// `Number(s)`: the whole trimmed string must be numeric; empty is 0.
pub fn string_to_number(s: &str) -> f64 {
    let s = trim_js(s);
    if s.is_empty() {
        return 0.0;
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = s.strip_prefix(prefix) {
            if digits.is_empty() {
                return f64::NAN;
            }
            return digits.chars().try_fold(0.0_f64, |acc, c| c.to_digit(radix).map(|d| acc * radix as f64 + d as f64)).unwrap_or(f64::NAN);
        }
    }
    match decimal_prefix_len(s) {
        Some(len) if len == s.len() => parse_decimal(s),
        _ => f64::NAN,
    }
}

fn literal_to_number(literal: &Literal) -> f64 {
    match literal {
        Literal::Number(n) => *n,
        Literal::Str(s) => string_to_number(s),
    }
}

/// `value == literal` with JavaScript's abstract equality.
pub fn loose_equals(value: Option<&ContextValue>, literal: &Literal) -> bool {
    match value {
        None | Some(ContextValue::Null) => false,
        Some(ContextValue::Bool(b)) => (if *b { 1.0 } else { 0.0 }) == literal_to_number(literal),
        Some(ContextValue::Number(n)) => *n == literal_to_number(literal),
        Some(ContextValue::String(s)) => match literal {
            Literal::Str(t) => s == t,
            Literal::Number(m) => string_to_number(s) == *m,
        },
        Some(compound) => {
            let primitive = to_js_string(Some(compound));
            match literal {
                Literal::Str(t) => primitive == *t,
                Literal::Number(m) => string_to_number(&primitive) == *m,
            }
        }
    }
}

/// Element equality used by `Array.prototype.includes` (NaN finds NaN).
pub fn same_value_zero(a: &ContextValue, b: &ContextValue) -> bool {
    match (a, b) {
        (ContextValue::Number(x), ContextValue::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => a == b,
    }
}

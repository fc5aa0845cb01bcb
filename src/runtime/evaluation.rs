use crate::ast::{Expr, ExprKind};
use crate::context::ContextLookup;
use crate::runtime::coercion::{is_truthy, loose_equals, parse_float, same_value_zero, to_js_string};
use crate::types::{ContextValue, Literal};

/// Evaluates `expr` against `context`. Never fails: absent keys are falsy,
/// invalid regexes and mistyped comparisons are `false`.
pub fn eval(expr: &Expr, context: &dyn ContextLookup) -> bool {
    match expr.kind() {
        ExprKind::False => false,
        ExprKind::True => true,
        ExprKind::Defined(key) => is_truthy(context.get_value(key)),
        ExprKind::Not(key) => !is_truthy(context.get_value(key)),
        ExprKind::Equals(key, value) => loose_equals(context.get_value(key), value),
        ExprKind::NotEquals(key, value) => !loose_equals(context.get_value(key), value),
        ExprKind::And(items) => items.iter().all(|e| eval(e, context)),
        ExprKind::Or(items) => items.iter().any(|e| eval(e, context)),
        ExprKind::Regex(key, pattern) => match pattern {
            Some(pattern) => pattern.is_match(&to_js_string(context.get_value(key))),
            None => false,
        },
        ExprKind::NotRegex(inner) => !eval(inner, context),
        ExprKind::In(key, value_key) => eval_in(key, value_key, context),
        ExprKind::NotIn(key, value_key) => !eval_in(key, value_key, context),
        ExprKind::Greater(key, value) => compare(context.get_value(key), value, |a, b| a > b),
        ExprKind::GreaterEquals(key, value) => compare(context.get_value(key), value, |a, b| a >= b),
        ExprKind::Smaller(key, value) => compare(context.get_value(key), value, |a, b| a < b),
        ExprKind::SmallerEquals(key, value) => compare(context.get_value(key), value, |a, b| a <= b),
    }
}

fn eval_in(key: &str, value_key: &str, context: &dyn ContextLookup) -> bool {
    let source = context.get_value(value_key);
    let item = context.get_value(key);
    match (source, item) {
        // `token in list` where `token` is not a context key looks the
        // key name itself up in the list.
        (Some(ContextValue::Array(items)), None) => items.iter().any(|v| v.as_str() == Some(key)),
        (Some(ContextValue::Array(items)), Some(item)) => items.iter().any(|v| same_value_zero(v, item)),
        (Some(ContextValue::Map(map)), Some(ContextValue::String(item))) => map.contains_key(item),
        _ => false,
    }
}

fn compare(value: Option<&ContextValue>, operand: &Literal, op: impl Fn(f64, f64) -> bool) -> bool {
    match operand {
        Literal::Str(_) => false,
        Literal::Number(n) => op(parse_float(&to_js_string(value)), *n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Pattern;
    use std::collections::HashMap;

    fn ctx(pairs: &[(&str, ContextValue)]) -> HashMap<String, ContextValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn defined_and_not() {
        let c = ctx(&[("a", true.into()), ("empty", "".into())]);
        assert!(eval(&Expr::has("a"), &c));
        assert!(!eval(&Expr::has("empty"), &c));
        assert!(eval(&Expr::not("missing"), &c));
    }

    #[test]
    fn in_falls_back_to_the_key_name() {
        let c = ctx(&[("list", vec!["a", "x"].into())]);
        assert!(eval(&Expr::in_("x", "list"), &c));
        assert!(!eval(&Expr::in_("y", "list"), &c));
        assert!(eval(&Expr::not_in("y", "list"), &c));
    }

    #[test]
    fn in_uses_the_item_value_when_present() {
        let c = ctx(&[("item", "b".into()), ("list", vec!["a", "b"].into())]);
        assert!(eval(&Expr::in_("item", "list"), &c));

        let map: ContextValue = serde_json::from_str(r#"{"b": 1}"#).unwrap();
        let c = ctx(&[("item", "b".into()), ("obj", map)]);
        assert!(eval(&Expr::in_("item", "obj"), &c));
        assert!(!eval(&Expr::in_("missing", "obj"), &c));
    }

    #[test]
    fn relational_comparisons() {
        let c = ctx(&[("n", 5.0.into()), ("s", "10px".into())]);
        assert!(eval(&Expr::greater("n", 4.0), &c));
        assert!(!eval(&Expr::greater("n", 5.0), &c));
        assert!(eval(&Expr::greater_equals("n", 5.0), &c));
        assert!(eval(&Expr::smaller("s", 11.0), &c));
        assert!(!eval(&Expr::smaller("missing", 11.0), &c));
        assert!(!eval(&Expr::greater("n", "abc"), &c));
    }

    #[test]
    fn regex_tests_the_string_form() {
        let c = ctx(&[("file", "main.ts".into()), ("n", 42.0.into())]);
        let re = |key: &str, src: &str| Expr::regex(key, Pattern::new(src, "").ok());
        assert!(eval(&re("file", "\\.ts$"), &c));
        assert!(eval(&re("n", "^42$"), &c));
        assert!(eval(&re("missing", "^undefined$"), &c));
        assert!(!eval(&Expr::regex("file", None), &c));
        assert!(!eval(&re("file", "\\.ts$").negate(), &c));
    }

    #[test]
    fn loose_equality() {
        let c = ctx(&[("n", 1.0.into()), ("s", "x".into())]);
        assert!(eval(&Expr::equals("n", "1"), &c));
        assert!(eval(&Expr::equals("s", "x"), &c));
        assert!(eval(&Expr::not_equals("s", "y"), &c));
        assert!(eval(&Expr::not_equals("missing", "y"), &c));
    }
}

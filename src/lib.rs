pub mod ast;
pub mod constants;
pub mod context;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod store;
pub mod types;
pub mod validate;

pub use ast::{Expr, ExprKind, ExprMapper};
pub use constants::ConstantRegistry;
pub use context::{ContextId, ContextLookup, ContextRef, ContextSnapshot, ContextTree};
pub use error::{Error, LexingError, ParsingError, Result};
pub use parser::{Parser, ParserConfig};
pub use runtime::{expressions_are_equal_with_constant_substitution, implies};
pub use store::{ContextEvent, ContextHost, ContextStore};
pub use types::{ContextValue, Literal, Pattern};
pub use validate::{validate_when_clauses, WhenClauseDiagnostic};
use std::collections::HashMap;

/// Parse a when-clause into a normalized expression.
pub fn parse(input: &str) -> Result<Expr> {
    let mut parser = Parser::new();
    match parser.parse(input) {
        Some(expr) => Ok(expr),
        None => {
            let first = parser
                .parsing_errors()
                .first()
                .cloned()
                .or_else(|| parser.lexing_errors().first().cloned().map(ParsingError::from))
                .unwrap_or_else(|| ParsingError::new("Unexpected token", 0, "", None));
            Err(Error::Parse(first))
        }
    }
}

/// Parse and evaluate a when-clause against `context`.
pub fn evaluate(input: &str, context: &dyn ContextLookup) -> Result<bool> {
    Ok(parse(input)?.evaluate(context))
}

/// Evaluate with the context provided as a JSON object string.
/// JSON format: {"key1": "value1", "key2": 42, "key3": true, "key4": ["a", "b"]}
pub fn evaluate_with_json(input: &str, json_context: &str) -> Result<bool> {
    let context = context_from_json(json_context)?;
    evaluate(input, &context)
}

/// Decode a JSON object into a flat context map.
pub fn context_from_json(json_context: &str) -> Result<HashMap<String, ContextValue>> {
    let json_value: serde_json::Value = serde_json::from_str(json_context)?;
    match json_value {
        serde_json::Value::Object(map) => Ok(map.into_iter().map(|(k, v)| (k, ContextValue::from(v))).collect()),
        _ => Err(Error::Json("JSON must be an object with key-value pairs".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_clauses() {
        let ctx = context_from_json(r#"{"a": true, "n": 3, "list": ["x"]}"#).unwrap();
        assert!(evaluate("a && n > 2", &ctx).unwrap());
        assert!(evaluate("!b || a", &ctx).unwrap());
        assert!(evaluate("x in list", &ctx).unwrap());
        assert!(!evaluate("a && n >= 4", &ctx).unwrap());
    }

    #[test]
    fn test_parse_errors_surface() {
        match parse("a &&") {
            Err(Error::Parse(e)) => assert_eq!(e.message, "Unexpected end of expression"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(evaluate_with_json("a", "[1]"), Err(Error::Json(_))));
        assert!(matches!(evaluate_with_json("a", "{"), Err(Error::Json(_))));
        assert_eq!(evaluate_with_json("a == 1", r#"{"a": "1"}"#), Ok(true));
    }
}

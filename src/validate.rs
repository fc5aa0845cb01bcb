use crate::parser::{Parser, ParserConfig};
use serde::{Deserialize, Serialize};

/// One problem found in a when-clause, positioned for an editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhenClauseDiagnostic {
    pub error_message: String,
    pub offset: usize,
    pub length: usize,
}

/// Lints manifest when-clauses. Returns one list per input, empty for a
/// clause without problems. Clauses are parsed strictly (no regex
/// recovery); when a clause has lexing errors its parsing errors are not
/// reported.
pub fn validate_when_clauses(when_clauses: &[&str]) -> Vec<Vec<WhenClauseDiagnostic>> {
    let mut parser = Parser::with_config(ParserConfig { regex_parsing_with_error_recovery: false });
    when_clauses
        .iter()
        .map(|clause| {
            let _ = parser.parse(clause);
            if !parser.lexing_errors().is_empty() {
                return parser
                    .lexing_errors()
                    .iter()
                    .map(|e| WhenClauseDiagnostic {
                        error_message: match &e.additional_info {
                            Some(hint) => format!("Unexpected token. Hint: {}", hint),
                            None => "Unexpected token.".to_string(),
                        },
                        offset: e.offset,
                        length: e.lexeme.len(),
                    })
                    .collect();
            }
            parser
                .parsing_errors()
                .iter()
                .map(|e| WhenClauseDiagnostic {
                    error_message: match &e.additional_info {
                        Some(hint) => format!("{}. {}", e.message, hint),
                        None => e.message.clone(),
                    },
                    offset: e.offset,
                    length: e.lexeme.len(),
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_clauses_have_no_diagnostics() {
        let result = validate_when_clauses(&["a && b", "resource =~ /\\.ts$/"]);
        assert_eq!(result, vec![vec![], vec![]]);
    }

    #[test]
    fn lexing_errors_take_precedence() {
        let result = validate_when_clauses(&["a = b"]);
        assert_eq!(
            result[0],
            vec![WhenClauseDiagnostic { error_message: "Unexpected token. Hint: Did you mean == or =~?".into(), offset: 2, length: 1 }]
        );
    }

    #[test]
    fn parsing_errors_carry_hints() {
        let result = validate_when_clauses(&["a b", ""]);
        assert_eq!(result[0][0].error_message, "Unexpected token. Did you forget to put && or || before the token?");
        assert_eq!((result[0][0].offset, result[0][0].length), (2, 1));
        assert!(result[1][0].error_message.starts_with("Empty context key expression. "));
    }

    #[test]
    fn serializes_camel_case() {
        let d = WhenClauseDiagnostic { error_message: "x".into(), offset: 1, length: 2 };
        assert_eq!(serde_json::to_string(&d).unwrap(), r#"{"errorMessage":"x","offset":1,"length":2}"#);
    }
}

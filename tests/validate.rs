use contextkey::{validate_when_clauses, WhenClauseDiagnostic};

fn diag(error_message: &str, offset: usize, length: usize) -> WhenClauseDiagnostic {
    WhenClauseDiagnostic { error_message: error_message.to_string(), offset, length }
}

#[test]
fn one_result_list_per_clause() {
    let result = validate_when_clauses(&["a", "b && c", "view == explorer"]);
    assert_eq!(result.len(), 3);
    assert!(result.iter().all(Vec::is_empty));
}

#[test]
fn unterminated_regex_is_a_lexing_error_in_strict_mode() {
    let result = validate_when_clauses(&["resource =~ /foo"]);
    assert_eq!(
        result[0],
        vec![diag(
            "Unexpected token. Hint: Did you forget to escape the '/' (slash) character? Put two backslashes before it to escape, e.g., '\\\\/'.",
            12,
            4
        )]
    );
}

#[test]
fn unescaped_slash_is_rejected_in_strict_mode() {
    let result = validate_when_clauses(&["resource =~ /foo/bar/"]);
    assert_eq!(result[0].len(), 1);
    assert_eq!(result[0][0].offset, 17);
    assert!(result[0][0].error_message.starts_with("Unexpected token."));
}

#[test]
fn parse_errors_without_hints() {
    let result = validate_when_clauses(&["(a && b", "a not b"]);
    assert_eq!(result[0], vec![diag("Expected: closing parenthesis ')'\nReceived: 'EOF'.", 7, 3)]);
    assert_eq!(result[1], vec![diag("Expected: 'in' after 'not'.\nReceived: 'b'.", 6, 1)]);
}

#[test]
fn every_lexing_error_is_reported() {
    let result = validate_when_clauses(&["a & b | c"]);
    assert_eq!(
        result[0],
        vec![diag("Unexpected token. Hint: Did you mean &&?", 2, 1), diag("Unexpected token. Hint: Did you mean ||?", 6, 1)]
    );
}

#[test]
fn end_of_expression() {
    let result = validate_when_clauses(&["a ||"]);
    assert_eq!(result[0], vec![diag("Unexpected end of expression. Did you forget to put a context key?", 4, 0)]);
}

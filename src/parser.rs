use crate::ast::Expr;
use crate::constants::ConstantRegistry;
use crate::error::{LexingError, ParsingError};
use crate::lexer::{Scanner, Token, TokenType};
use crate::types::Pattern;
use std::sync::Arc;

const ERR_EMPTY: &str = "Empty context key expression";
const HINT_EMPTY: &str = "Did you forget to write an expression? You can also put 'false' or 'true' to always evaluate to false or true, respectively.";
const ERR_NO_IN_AFTER_NOT: &str = "'in' after 'not'.";
const ERR_CLOSING_PAREN: &str = "closing parenthesis ')'";
const ERR_UNEXPECTED_TOKEN: &str = "Unexpected token";
const HINT_UNEXPECTED_TOKEN: &str = "Did you forget to put && or || before the token?";
const ERR_UNEXPECTED_EOF: &str = "Unexpected end of expression";
const HINT_UNEXPECTED_EOF: &str = "Did you forget to put a context key?";

const EXPECTED_TERM: &str = "KEY | true | false | '(' expression ')'";
const EXPECTED_PRIMARY: &str =
    "true | false | KEY \n\t| KEY '=~' REGEX \n\t| KEY ('==' | '!=' | '<' | '<=' | '>' | '>=' | 'in' | 'not' 'in') value";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    /// Re-join the tokens after `=~` into one regex so that unescaped
    /// slashes (`/foo/bar/`) still parse.
    pub regex_parsing_with_error_recovery: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { regex_parsing_with_error_recovery: true }
    }
}

/// The descent stops at the first unrecoverable error; the error itself has
/// already been pushed to `parsing_errors` by then.
#[derive(Debug)]
struct ParseAbort;

type PResult<T> = Result<T, ParseAbort>;

/// Recursive-descent parser for when-clauses.
///
/// ```text
/// expression ::= or
/// or         ::= and ( '||' and )*
/// and        ::= term ( '&&' term )*
/// term       ::= '!' ( KEY | true | false | '(' expression ')' ) | primary
/// primary    ::= true | false | '(' expression ')'
///              | KEY '=~' REGEX
///              | KEY ( '==' | '!=' | '<' | '<=' | '>' | '>=' | 'in' | 'not' 'in' ) value
///              | KEY
/// value      ::= KEY | QUOTED | true | false | in | <nothing>
/// ```
///
/// A parser is reusable; diagnostics describe the most recent `parse` call.
pub struct Parser {
    scanner: Scanner,
    tokens: Vec<Token>,
    current: usize,
    parsing_errors: Vec<ParsingError>,
    config: ParserConfig,
    constants: Option<Arc<ConstantRegistry>>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self { scanner: Scanner::new(), tokens: Vec::new(), current: 0, parsing_errors: Vec::new(), config, constants: None }
    }

    /// Leaves on keys registered in `constants` fold to `true`/`false`.
    pub fn with_constants(config: ParserConfig, constants: Arc<ConstantRegistry>) -> Self {
        Self { constants: Some(constants), ..Self::with_config(config) }
    }

    pub fn lexing_errors(&self) -> &[LexingError] {
        self.scanner.errors()
    }

    pub fn parsing_errors(&self) -> &[ParsingError] {
        &self.parsing_errors
    }

    /// Parses `input`, or returns `None` and leaves the reason in
    /// [`parsing_errors`](Self::parsing_errors). Lexing errors alone do not
    /// fail a parse: error tokens are only rejected where the grammar has no
    /// place for them.
    pub fn parse(&mut self, input: &str) -> Option<Expr> {
        self.parsing_errors.clear();
        self.current = 0;

        if input.is_empty() {
            self.scanner.reset(input);
            self.tokens.clear();
            self.parsing_errors.push(ParsingError::new(ERR_EMPTY, 0, "", Some(HINT_EMPTY.to_string())));
            tracing::debug!("rejected empty when-clause");
            return None;
        }

        self.tokens = self.scanner.reset(input).scan();

        let result = self.parse_expr().and_then(|expr| {
            if self.is_at_end() {
                return Ok(expr);
            }
            let peek = self.peek().clone();
            let hint = (peek.kind == TokenType::Str).then(|| HINT_UNEXPECTED_TOKEN.to_string());
            self.parsing_errors.push(ParsingError::new(ERR_UNEXPECTED_TOKEN, peek.offset, peek.display_lexeme(), hint));
            Err(ParseAbort)
        });

        match result {
            Ok(expr) => Some(expr),
            Err(ParseAbort) => {
                if let Some(err) = self.parsing_errors.first() {
                    tracing::debug!(input, offset = err.offset, message = %err.message, "failed to parse when-clause");
                }
                None
            }
        }
    }

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut expr = vec![self.parse_and()?];
        while self.match_one(TokenType::Or) {
            expr.push(self.parse_and()?);
        }
        Ok(if expr.len() == 1 { expr.remove(0) } else { Expr::or(expr).unwrap_or_else(Expr::false_) })
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut expr = vec![self.parse_term()?];
        while self.match_one(TokenType::And) {
            expr.push(self.parse_term()?);
        }
        Ok(if expr.len() == 1 { expr.remove(0) } else { Expr::and(expr).unwrap_or_else(Expr::true_) })
    }

    fn parse_term(&mut self) -> PResult<Expr> {
        if !self.match_one(TokenType::Neg) {
            return self.parse_primary();
        }
        let peek = self.peek().clone();
        match peek.kind {
            TokenType::True => {
                self.advance();
                Ok(Expr::false_())
            }
            TokenType::False => {
                self.advance();
                Ok(Expr::true_())
            }
            TokenType::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.consume(TokenType::RParen, ERR_CLOSING_PAREN)?;
                Ok(expr.negate())
            }
            TokenType::Str => {
                self.advance();
                Ok(self.leaf(Expr::not(peek.lexeme)))
            }
            _ => Err(self.err_expected_but_got(EXPECTED_TERM, &peek)),
        }
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let peek = self.peek().clone();
        match peek.kind {
            TokenType::True => {
                self.advance();
                Ok(Expr::true_())
            }
            TokenType::False => {
                self.advance();
                Ok(Expr::false_())
            }
            TokenType::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.consume(TokenType::RParen, ERR_CLOSING_PAREN)?;
                Ok(expr)
            }
            TokenType::Str => {
                self.advance();
                self.parse_key_expr(peek.lexeme)
            }
            TokenType::Eof => {
                self.parsing_errors.push(ParsingError::new(
                    ERR_UNEXPECTED_EOF,
                    peek.offset,
                    "",
                    Some(HINT_UNEXPECTED_EOF.to_string()),
                ));
                Err(ParseAbort)
            }
            _ => Err(self.err_expected_but_got(EXPECTED_PRIMARY, &peek)),
        }
    }

    /// Everything that may follow a bare key.
    fn parse_key_expr(&mut self, key: String) -> PResult<Expr> {
        if self.match_one(TokenType::RegexOp) {
            return self.parse_regex(key);
        }

        if self.match_one(TokenType::Not) {
            self.consume(TokenType::In, ERR_NO_IN_AFTER_NOT)?;
            let right = self.parse_value();
            return Ok(Expr::not_in(key, right));
        }

        let op = self.peek().kind;
        match op {
            TokenType::Eq | TokenType::NotEq => {
                self.advance();
                let right = self.parse_value();
                // `foo == 'true'` stays a string comparison, `foo == true` folds.
                let quoted = self.previous().map(|t| t.kind) == Some(TokenType::QuotedStr);
                let expr = match (quoted, right.as_str(), op == TokenType::Eq) {
                    (false, "true", true) | (false, "false", false) => Expr::has(key),
                    (false, "false", true) | (false, "true", false) => Expr::not(key),
                    (_, _, true) => Expr::equals(key, right),
                    (_, _, false) => Expr::not_equals(key, right),
                };
                Ok(self.leaf(expr))
            }
            TokenType::Lt => {
                self.advance();
                Ok(Expr::smaller(key, self.parse_value()))
            }
            TokenType::LtEq => {
                self.advance();
                Ok(Expr::smaller_equals(key, self.parse_value()))
            }
            TokenType::Gt => {
                self.advance();
                Ok(Expr::greater(key, self.parse_value()))
            }
            TokenType::GtEq => {
                self.advance();
                Ok(Expr::greater_equals(key, self.parse_value()))
            }
            TokenType::In => {
                self.advance();
                Ok(Expr::in_(key, self.parse_value()))
            }
            _ => Ok(self.leaf(Expr::has(key))),
        }
    }

    fn parse_regex(&mut self, key: String) -> PResult<Expr> {
        let expr = self.peek().clone();

        if !self.config.regex_parsing_with_error_recovery {
            self.advance();
            if expr.kind != TokenType::RegexStr {
                return Err(self.err_expected_but_got("REGEX", &expr));
            }
            let pattern = self.compile_regex_lexeme(&expr.lexeme, &expr)?;
            return Ok(Expr::regex(key, Some(pattern)));
        }

        match expr.kind {
            // An error token shows up for input such as `/(/file)/`.
            TokenType::RegexStr | TokenType::Error => {
                let mut lexeme = expr.lexeme.clone();
                self.advance();

                let mut paren_balance = paren_delta(&expr.lexeme);
                loop {
                    let following = self.peek().clone();
                    if self.is_at_end() || matches!(following.kind, TokenType::And | TokenType::Or) {
                        break;
                    }
                    match following.kind {
                        TokenType::LParen => paren_balance += 1,
                        TokenType::RParen => paren_balance -= 1,
                        TokenType::RegexStr | TokenType::QuotedStr => paren_balance += paren_delta(&following.lexeme),
                        _ => {}
                    }
                    if paren_balance < 0 {
                        break;
                    }
                    lexeme.push_str(following.display_lexeme());
                    self.advance();
                }

                let pattern = self.compile_regex_lexeme(&lexeme, &expr)?;
                Ok(Expr::regex(key, Some(pattern)))
            }
            TokenType::QuotedStr => {
                self.advance();
                // Legacy form: `key =~ '/source/'` with an optional `i` flag.
                let serialized = expr.lexeme.as_str();
                let mut pattern = None;
                if !serialized.trim().is_empty() {
                    if let (Some(start), Some(end)) = (serialized.find('/'), serialized.rfind('/')) {
                        if start != end {
                            let source = &serialized[start + 1..end];
                            let flags = if serialized[end + 1..].starts_with('i') { "i" } else { "" };
                            match Pattern::new(source, flags) {
                                Ok(p) => pattern = Some(p),
                                Err(_) => return Err(self.err_expected_but_got("REGEX", &expr)),
                            }
                        }
                    }
                }
                match pattern {
                    Some(p) => Ok(Expr::regex(key, Some(p))),
                    None => Err(self.err_expected_but_got("REGEX", &expr)),
                }
            }
            _ => {
                let peek = self.peek().clone();
                Err(self.err_expected_but_got("REGEX", &peek))
            }
        }
    }

    /// Splits `/source/flags` at the last slash and compiles it.
    fn compile_regex_lexeme(&mut self, lexeme: &str, at: &Token) -> PResult<Pattern> {
        let closing = match lexeme.rfind('/') {
            Some(i) if i > 0 && lexeme.starts_with('/') => i,
            _ => return Err(self.err_expected_but_got("REGEX", at)),
        };
        let source = &lexeme[1..closing];
        let flags: String = lexeme[closing + 1..].chars().filter(|c| !matches!(c, 'g' | 'y')).collect();
        Pattern::new(source, &flags).map_err(|e| {
            tracing::debug!(error = %e, "regex literal did not compile");
            self.err_expected_but_got("REGEX", at)
        })
    }

    /// A missing value is the empty string; the offending token is left for
    /// the caller (`"foo == "` is accepted).
    fn parse_value(&mut self) -> String {
        let token = self.peek().clone();
        match token.kind {
            TokenType::Str | TokenType::QuotedStr => {
                self.advance();
                token.lexeme
            }
            TokenType::True => {
                self.advance();
                "true".to_string()
            }
            TokenType::False => {
                self.advance();
                "false".to_string()
            }
            TokenType::In => {
                self.advance();
                "in".to_string()
            }
            _ => String::new(),
        }
    }

    fn leaf(&self, expr: Expr) -> Expr {
        match &self.constants {
            Some(constants) => expr.substitute_constants(constants),
            None => expr,
        }
    }

    fn err_expected_but_got(&mut self, expected: &str, got: &Token) -> ParseAbort {
        let lexeme = got.display_lexeme();
        let message = format!("Expected: {}\nReceived: '{}'.", expected, lexeme);
        self.parsing_errors.push(ParsingError::new(message, got.offset, lexeme, None));
        ParseAbort
    }

    fn consume(&mut self, kind: TokenType, expected: &str) -> PResult<()> {
        if self.check(kind) {
            self.advance();
            return Ok(());
        }
        let peek = self.peek().clone();
        Err(self.err_expected_but_got(expected, &peek))
    }

    fn match_one(&mut self, kind: TokenType) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: TokenType) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.current += 1;
        }
    }

    fn previous(&self) -> Option<&Token> {
        self.current.checked_sub(1).and_then(|i| self.tokens.get(i))
    }

    // The scanner always terminates with `Eof`, so the last token is a safe
    // fallback.
    fn peek(&self) -> &Token {
        match self.tokens.get(self.current).or_else(|| self.tokens.last()) {
            Some(t) => t,
            None => &EOF_TOKEN,
        }
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenType::Eof
    }
}

static EOF_TOKEN: Token = Token { kind: TokenType::Eof, offset: 0, lexeme: String::new(), triple_eq: false };

fn paren_delta(s: &str) -> i32 {
    s.chars().fold(0, |acc, c| match c {
        '(' => acc + 1,
        ')' => acc - 1,
        _ => acc,
    })
}

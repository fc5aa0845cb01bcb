use crate::error::LexingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    LParen,
    RParen,
    Neg,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    RegexOp,
    RegexStr,
    True,
    False,
    In,
    Not,
    And,
    Or,
    Str,
    QuotedStr,
    Error,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenType,
    /// Byte offset into the scanned input.
    pub offset: usize,
    /// Text for `Str`, `QuotedStr` (without quotes), `RegexStr` and `Error`.
    pub lexeme: String,
    /// `===` / `!==` spelling of `Eq` / `NotEq`.
    pub triple_eq: bool,
}

impl Token {
    fn new(kind: TokenType, offset: usize) -> Self {
        Self { kind, offset, lexeme: String::new(), triple_eq: false }
    }

    fn with_lexeme(kind: TokenType, offset: usize, lexeme: &str) -> Self {
        Self { kind, offset, lexeme: lexeme.to_string(), triple_eq: false }
    }

    /// The token as it is shown in diagnostics and re-joined during regex
    /// recovery.
    pub fn display_lexeme(&self) -> &str {
        match self.kind {
            TokenType::LParen => "(",
            TokenType::RParen => ")",
            TokenType::Neg => "!",
            TokenType::Eq => {
                if self.triple_eq {
                    "==="
                } else {
                    "=="
                }
            }
            TokenType::NotEq => {
                if self.triple_eq {
                    "!=="
                } else {
                    "!="
                }
            }
            TokenType::Lt => "<",
            TokenType::LtEq => "<=",
            TokenType::Gt => ">",
            TokenType::GtEq => ">=",
            TokenType::RegexOp => "=~",
            TokenType::True => "true",
            TokenType::False => "false",
            TokenType::In => "in",
            TokenType::Not => "not",
            TokenType::And => "&&",
            TokenType::Or => "||",
            TokenType::Eof => "EOF",
            TokenType::RegexStr | TokenType::Str | TokenType::QuotedStr | TokenType::Error => &self.lexeme,
        }
    }
}

const HINT_QUOTE: &str = "Did you forget to open or close the quote?";
const HINT_SLASH: &str =
    "Did you forget to escape the '/' (slash) character? Put two backslashes before it to escape, e.g., '\\\\/'.";

fn hint_did_you_mean(meant: &[&str]) -> String {
    match meant {
        [one] => format!("Did you mean {}?", one),
        [a, b] => format!("Did you mean {} or {}?", a, b),
        [a, b, c] => format!("Did you mean {}, {} or {}?", a, b, c),
        _ => String::new(),
    }
}

fn is_keyword(word: &str) -> Option<TokenType> {
    match word {
        "not" => Some(TokenType::Not),
        "in" => Some(TokenType::In),
        "false" => Some(TokenType::False),
        "true" => Some(TokenType::True),
        _ => None,
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '_' | '<' | '>' | '-' | '.' | '/' | '\\' | ':' | '*' | '?' | '+' | '[' | ']' | '^' | ',' | '#' | '@' | ';' | '"' | '%' | '$'
        )
        || c.is_alphabetic()
}

fn is_regex_flag(b: u8) -> bool {
    matches!(b, b'i' | b'g' | b's' | b'm' | b'y' | b'u')
}

/// Splits a when-clause into tokens. Malformed input never stops the scan:
/// it yields an `Error` token plus a [`LexingError`] and scanning resumes.
#[derive(Debug, Default, Clone)]
pub struct Scanner {
    input: String,
    start: usize,
    current: usize,
    tokens: Vec<Token>,
    errors: Vec<LexingError>,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self, input: &str) -> &mut Self {
        self.input = input.to_string();
        self.start = 0;
        self.current = 0;
        self.tokens.clear();
        self.errors.clear();
        self
    }

    pub fn errors(&self) -> &[LexingError] {
        &self.errors
    }

    pub fn scan(&mut self) -> Vec<Token> {
        while !self.is_at_end() {
            self.start = self.current;
            let ch = match self.bump() {
                Some(c) => c,
                None => break,
            };
            match ch {
                '(' => self.add(TokenType::LParen),
                ')' => self.add(TokenType::RParen),
                '!' => {
                    if self.eat('=') {
                        let triple = self.eat('=');
                        self.tokens.push(Token { triple_eq: triple, ..Token::new(TokenType::NotEq, self.start) });
                    } else {
                        self.add(TokenType::Neg);
                    }
                }
                '\'' => self.quoted_string(),
                '/' => self.regex(),
                '=' => {
                    if self.eat('=') {
                        let triple = self.eat('=');
                        self.tokens.push(Token { triple_eq: triple, ..Token::new(TokenType::Eq, self.start) });
                    } else if self.eat('~') {
                        self.add(TokenType::RegexOp);
                    } else {
                        self.error(Some(hint_did_you_mean(&["==", "=~"])));
                    }
                }
                '<' => {
                    let kind = if self.eat('=') { TokenType::LtEq } else { TokenType::Lt };
                    self.add(kind);
                }
                '>' => {
                    let kind = if self.eat('=') { TokenType::GtEq } else { TokenType::Gt };
                    self.add(kind);
                }
                '&' => {
                    if self.eat('&') {
                        self.add(TokenType::And);
                    } else {
                        self.error(Some(hint_did_you_mean(&["&&"])));
                    }
                }
                '|' => {
                    if self.eat('|') {
                        self.add(TokenType::Or);
                    } else {
                        self.error(Some(hint_did_you_mean(&["||"])));
                    }
                }
                ' ' | '\r' | '\t' | '\n' | '\u{00A0}' => {}
                c => self.string(c),
            }
        }
        self.start = self.current;
        self.add(TokenType::Eof);
        self.tokens.clone()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.current..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.current += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.current += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.input.len()
    }

    fn add(&mut self, kind: TokenType) {
        self.tokens.push(Token::new(kind, self.start));
    }

    fn error(&mut self, additional_info: Option<String>) {
        let lexeme = self.input[self.start..self.current].to_string();
        self.errors.push(LexingError { offset: self.start, lexeme: lexeme.clone(), additional_info });
        self.tokens.push(Token { lexeme, ..Token::new(TokenType::Error, self.start) });
    }

    fn string(&mut self, first: char) {
        if !is_key_char(first) {
            return;
        }
        while let Some(c) = self.peek() {
            if !is_key_char(c) {
                break;
            }
            self.current += c.len_utf8();
        }
        let lexeme = &self.input[self.start..self.current];
        let token = match is_keyword(lexeme) {
            Some(kind) => Token::new(kind, self.start),
            None => Token::with_lexeme(TokenType::Str, self.start, lexeme),
        };
        self.tokens.push(token);
    }

    fn quoted_string(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\'' {
                break;
            }
            self.current += c.len_utf8();
        }
        if self.is_at_end() {
            self.error(Some(HINT_QUOTE.to_string()));
            return;
        }
        self.current += 1; // closing quote
        let lexeme = &self.input[self.start + 1..self.current - 1];
        self.tokens.push(Token::with_lexeme(TokenType::QuotedStr, self.start + 1, lexeme));
    }

    fn regex(&mut self) {
        let bytes = self.input.as_bytes();
        let mut p = self.current;
        let mut in_escape = false;
        let mut in_class = false;
        loop {
            if p >= bytes.len() {
                self.current = p;
                self.error(Some(HINT_SLASH.to_string()));
                return;
            }
            let b = bytes[p];
            if in_escape {
                in_escape = false;
            } else if b == b'/' && !in_class {
                p += 1;
                break;
            } else if b == b'[' {
                in_class = true;
            } else if b == b'\\' {
                in_escape = true;
            } else if b == b']' {
                in_class = false;
            }
            p += 1;
        }
        while p < bytes.len() && is_regex_flag(bytes[p]) {
            p += 1;
        }
        self.current = p;
        let lexeme = &self.input[self.start..self.current];
        self.tokens.push(Token::with_lexeme(TokenType::RegexStr, self.start, lexeme));
    }
}

use std::fmt::{Display, Formatter};

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level failures. Scanner and parser diagnostics are plain data
/// ([`LexingError`], [`ParsingError`]); `Error::Parse` carries the first one
/// outward when a caller wants a `Result`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(ParsingError),

    #[error("constant `{0}` is already set")]
    ConstantAlreadySet(String),

    #[error("unknown context id {0}")]
    UnknownContext(u64),

    #[error("context id {0} already exists")]
    DuplicateContext(u64),

    #[error("invalid regular expression /{pattern}/: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("host error: {0}")]
    Host(String),

    #[error("invalid JSON: {0}")]
    Json(String),
}

impl Error {
    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// A malformed token found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexingError {
    pub offset: usize,
    pub lexeme: String,
    pub additional_info: Option<String>,
}

/// A grammar violation found by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsingError {
    pub message: String,
    pub offset: usize,
    pub lexeme: String,
    pub additional_info: Option<String>,
}

impl ParsingError {
    pub fn new<M: Into<String>>(message: M, offset: usize, lexeme: impl Into<String>, additional_info: Option<String>) -> Self {
        Self { message: message.into(), offset, lexeme: lexeme.into(), additional_info }
    }
}

impl From<LexingError> for ParsingError {
    fn from(e: LexingError) -> Self {
        Self { message: "Unexpected token".to_string(), offset: e.offset, lexeme: e.lexeme, additional_info: e.additional_info }
    }
}

impl Display for LexingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.additional_info {
            Some(hint) => write!(f, "Unexpected token '{}' at position {}. Hint: {}", self.lexeme, self.offset, hint),
            None => write!(f, "Unexpected token '{}' at position {}", self.lexeme, self.offset),
        }
    }
}

impl Display for ParsingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.additional_info {
            Some(hint) => write!(f, "{} at position {}. {}", self.message, self.offset, hint),
            None => write!(f, "{} at position {}", self.message, self.offset),
        }
    }
}

impl std::error::Error for ParsingError {}

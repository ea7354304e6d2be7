use std::{fmt, io};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Allocation,
    Scan,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogKind::Allocation => write!(f, "allocation log"),
            LogKind::Scan => write!(f, "scan log"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseReason {
    #[error("missing `:` before the csv payload")]
    MissingPayload,
    #[error("missing csv field {0}")]
    MissingField(usize),
    #[error("invalid decimal `{0}`")]
    BadDecimal(String),
    #[error("missing `->` separator")]
    MissingArrow,
    #[error("invalid hex `{0}`")]
    BadHex(String),
    #[error("invalid utf-8")]
    InvalidUtf8,
}

/// A malformed line, located by log and 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{log} line {line}: {reason}: `{content}`")]
pub struct ParseError {
    pub log: LogKind,
    pub line: usize,
    pub content: String,
    pub reason: ParseReason,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[test]
fn test_parse_error_display() {
    let err = ParseError {
        log: LogKind::Scan,
        line: 3,
        content: "0x10 0x20".to_string(),
        reason: ParseReason::MissingArrow,
    };
    assert_eq!(err.to_string(), "scan log line 3: missing `->` separator: `0x10 0x20`");

    let err = Error::from(ParseError {
        log: LogKind::Allocation,
        line: 7,
        content: "[0] 1 malloc(0x10) 16: 0, 1, x, 16".to_string(),
        reason: ParseReason::BadDecimal("x".to_string()),
    });
    assert_eq!(err.to_string(), "allocation log line 7: invalid decimal `x`: `[0] 1 malloc(0x10) 16: 0, 1, x, 16`");
}

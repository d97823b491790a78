use core::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    BinaryPlist,
    XmlPlist,
    Xml,
    Zip,
    Json,
    Yaml,
    KeyValue,
    Unknown,
}

impl FileKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BinaryPlist => "binary_plist",
            Self::XmlPlist => "xml_plist",
            Self::Xml => "xml",
            Self::Zip => "zip",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::KeyValue => "key_value",
            Self::Unknown => "unknown",
        }
    }

    pub const fn is_plist(self) -> bool {
        matches!(self, Self::BinaryPlist | Self::XmlPlist)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single parse strategy gave up. The cascade records these; they never
/// reach the caller as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParseErrorCode {
    NotApplicable,
    InvalidEncoding,
    Syntax,
    WrongShape,
    LimitExceeded,
    TimedOut,
    WorkerPanicked,
}

impl ParseErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotApplicable => "NOT_APPLICABLE",
            Self::InvalidEncoding => "INVALID_ENCODING",
            Self::Syntax => "SYNTAX",
            Self::WrongShape => "WRONG_SHAPE",
            Self::LimitExceeded => "LIMIT_EXCEEDED",
            Self::TimedOut => "TIMED_OUT",
            Self::WorkerPanicked => "WORKER_PANICKED",
        }
    }
}

impl fmt::Display for ParseErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub code: ParseErrorCode,
    pub detail: String,
}

impl ParseError {
    pub fn new(code: ParseErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    pub fn not_applicable(detail: impl Into<String>) -> Self {
        Self::new(ParseErrorCode::NotApplicable, detail)
    }

    pub fn syntax(detail: impl fmt::Display) -> Self {
        Self::new(ParseErrorCode::Syntax, detail.to_string())
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}

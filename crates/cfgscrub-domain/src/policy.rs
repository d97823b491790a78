use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTransformPolicy {
    None,
    #[default]
    Mask,
    Partial,
    Length,
    Hash,
    /// Reversible encoding for display only. Not a security control.
    Base64,
}

impl FieldTransformPolicy {
    pub const ALL: [Self; 6] = [
        Self::None,
        Self::Mask,
        Self::Partial,
        Self::Length,
        Self::Hash,
        Self::Base64,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Mask => "mask",
            Self::Partial => "partial",
            Self::Length => "length",
            Self::Hash => "hash",
            Self::Base64 => "base64",
        }
    }

    pub const fn is_reversible(self) -> bool {
        matches!(self, Self::None | Self::Base64)
    }
}

impl fmt::Display for FieldTransformPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldTransformPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPolicy(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateDisplayPolicy {
    Preserve,
    Obfuscate,
    Hash,
    Truncate,
    #[default]
    Info,
}

impl CertificateDisplayPolicy {
    pub const ALL: [Self; 5] = [
        Self::Preserve,
        Self::Obfuscate,
        Self::Hash,
        Self::Truncate,
        Self::Info,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preserve => "preserve",
            Self::Obfuscate => "obfuscate",
            Self::Hash => "hash",
            Self::Truncate => "truncate",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for CertificateDisplayPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateDisplayPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPolicy(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPolicy(pub String);

impl fmt::Display for UnknownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown policy: {}", self.0)
    }
}

impl std::error::Error for UnknownPolicy {}

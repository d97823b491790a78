//! Terminal conversion errors.
//!
//! Everything else that can go wrong during a conversion (a parser giving up,
//! a malformed certificate, a structural oddity) degrades into the result
//! instead of ending up here.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConvertError>;

#[derive(Debug, Error)]
pub enum ConvertError {
    /// The upload never became visible, neither at the primary nor at the
    /// alternate location.
    #[error("upload {token} not found after {attempts} attempts (tried: {})", .candidates.join(", "))]
    NotFound {
        token: String,
        attempts: u32,
        candidates: Vec<String>,
    },

    /// A ZIP upload contained no entry that looks like a configuration payload.
    #[error("no configuration payload in archive {file_name} ({size} bytes); entries: [{}]", .entries.join(", "))]
    ArchiveUnresolved {
        file_name: String,
        size: usize,
        entries: Vec<String>,
    },

    #[error("archive {file_name} ({size} bytes) is unreadable: {reason}")]
    ArchiveUnreadable {
        file_name: String,
        size: usize,
        reason: String,
    },

    #[error("storage error for {token}: {source}")]
    Storage {
        token: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {format} output: {message}")]
    Serialize {
        format: &'static str,
        message: String,
    },
}

impl ConvertError {
    pub fn not_found(token: impl Into<String>, attempts: u32, candidates: Vec<String>) -> Self {
        Self::NotFound {
            token: token.into(),
            attempts,
            candidates,
        }
    }

    pub fn archive_unresolved(file_name: impl Into<String>, size: usize, entries: Vec<String>) -> Self {
        Self::ArchiveUnresolved {
            file_name: file_name.into(),
            size,
            entries,
        }
    }

    pub fn archive_unreadable(
        file_name: impl Into<String>,
        size: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::ArchiveUnreadable {
            file_name: file_name.into(),
            size,
            reason: reason.into(),
        }
    }

    pub fn storage(token: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            token: token.into(),
            source,
        }
    }

    pub fn serialize(format: &'static str, message: impl Into<String>) -> Self {
        Self::Serialize {
            format,
            message: message.into(),
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ArchiveUnresolved { .. } => "ARCHIVE_UNRESOLVED",
            Self::ArchiveUnreadable { .. } => "ARCHIVE_UNREADABLE",
            Self::Storage { .. } => "STORAGE",
            Self::Serialize { .. } => "SERIALIZE",
        }
    }
}

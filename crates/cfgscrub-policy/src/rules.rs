use std::collections::BTreeSet;
use std::path::Path;

use cfgscrub_domain::RulesId;
use serde::Deserialize;

use crate::rules_id::compute_field_rules_id;

pub const FIELD_RULES_SCHEMA_V1: &str = "field_rules.v1";

/// Keys whose values are always sensitive.
pub const DEFAULT_ALLOW: &[&str] = &[
    "password",
    "Password",
    "passwd",
    "passphrase",
    "Passphrase",
    "UserPassword",
    "PayloadCertificatePassword",
    "PreSharedKey",
    "SharedSecret",
    "secret",
    "client_secret",
    "private_key_passwd",
    "private_key2_passwd",
    "wpa_passphrase",
    "psk",
    "XAuthPassword",
    "AuthPassword",
    "KeyPassword",
];

/// Lowercased key endings that mark a key as sensitive.
pub const DEFAULT_PATTERNS: &[&str] = &["password", "passphrase", "secret"];

/// Keys that match a pattern but hold flags, labels or names, never secrets.
pub const DEFAULT_EXCLUDE: &[&str] = &[
    "PasswordRequired",
    "PromptForPassword",
    "SavePassword",
    "OneTimePassword",
    "OneTimeUserPassword",
    "PasswordHint",
    "SecretName",
    "SecretType",
    "UseSecret",
    "RequirePassword",
    "RequireSharedSecret",
    "ResetPassword",
    "TLSTrustedServerNames",
    "ServerName",
    "DisplayName",
    "PayloadDisplayName",
    "UserName",
    "Username",
];

#[derive(Debug)]
pub enum RulesError {
    Io,
    NotUtf8,
    Json(String),
    WrongSchema(String),
    EmptyEntry,
    EmptyRules,
}

impl core::fmt::Display for RulesError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io => f.write_str("field rules file could not be read"),
            Self::NotUtf8 => f.write_str("field rules file is not valid UTF-8"),
            Self::Json(msg) => write!(f, "field rules JSON is invalid: {msg}"),
            Self::WrongSchema(found) => write!(
                f,
                "unsupported field rules schema_version {found:?} (expected {FIELD_RULES_SCHEMA_V1:?})"
            ),
            Self::EmptyEntry => f.write_str("field rules contain an empty entry"),
            Self::EmptyRules => f.write_str("field rules match no keys at all"),
        }
    }
}

impl std::error::Error for RulesError {}

/// Immutable key lists consulted by the redactor and the certificate handler.
#[derive(Debug, Clone)]
pub struct FieldRules {
    allow: BTreeSet<String>,
    patterns: Vec<String>,
    exclude: BTreeSet<String>,
    rules_id: RulesId,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldRulesFile {
    schema_version: String,
    #[serde(default)]
    allow: Vec<String>,
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default = "default_extend")]
    extend_defaults: bool,
}

fn default_extend() -> bool {
    true
}

impl Default for FieldRules {
    fn default() -> Self {
        Self::build(
            DEFAULT_ALLOW.iter().map(|s| s.to_string()),
            DEFAULT_PATTERNS.iter().map(|s| s.to_string()),
            DEFAULT_EXCLUDE.iter().map(|s| s.to_string()),
        )
    }
}

impl FieldRules {
    fn build(
        allow: impl IntoIterator<Item = String>,
        patterns: impl IntoIterator<Item = String>,
        exclude: impl IntoIterator<Item = String>,
    ) -> Self {
        let allow: BTreeSet<String> = allow.into_iter().collect();
        let mut patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.to_ascii_lowercase())
            .collect();
        patterns.sort();
        patterns.dedup();
        let exclude: BTreeSet<String> = exclude.into_iter().collect();
        let rules_id = compute_field_rules_id(&allow, &patterns, &exclude);
        Self {
            allow,
            patterns,
            exclude,
            rules_id,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, RulesError> {
        let file: FieldRulesFile =
            serde_json::from_str(text).map_err(|e| RulesError::Json(e.to_string()))?;
        if file.schema_version != FIELD_RULES_SCHEMA_V1 {
            return Err(RulesError::WrongSchema(file.schema_version));
        }

        let all_entries = file
            .allow
            .iter()
            .chain(&file.patterns)
            .chain(&file.exclude);
        for entry in all_entries {
            if entry.trim().is_empty() {
                return Err(RulesError::EmptyEntry);
            }
        }

        let rules = if file.extend_defaults {
            let base = Self::default();
            Self::build(
                base.allow.into_iter().chain(file.allow),
                base.patterns.into_iter().chain(file.patterns),
                base.exclude.into_iter().chain(file.exclude),
            )
        } else {
            Self::build(file.allow, file.patterns, file.exclude)
        };

        if rules.allow.is_empty() && rules.patterns.is_empty() {
            return Err(RulesError::EmptyRules);
        }
        Ok(rules)
    }

    pub fn load(path: &Path) -> Result<Self, RulesError> {
        let bytes = std::fs::read(path).map_err(|_| RulesError::Io)?;
        let text = std::str::from_utf8(&bytes).map_err(|_| RulesError::NotUtf8)?;
        let rules = Self::from_json(text)?;
        tracing::debug!(
            path = %path.display(),
            rules_id = %rules.rules_id.short_hex(),
            allow = rules.allow.len(),
            patterns = rules.patterns.len(),
            exclude = rules.exclude.len(),
            "loaded field rules"
        );
        Ok(rules)
    }

    /// Exact allow-list hit, or a key that is not excluded and ends with a pattern.
    pub fn is_sensitive(&self, key: &str) -> bool {
        if self.allow.contains(key) {
            return true;
        }
        if self.is_excluded(key) {
            return false;
        }
        let lowered = key.to_ascii_lowercase();
        self.patterns.iter().any(|p| lowered.ends_with(p.as_str()))
    }

    pub fn is_excluded(&self, key: &str) -> bool {
        self.exclude.contains(key)
    }

    pub fn rules_id(&self) -> RulesId {
        self.rules_id
    }

    pub fn allow(&self) -> impl Iterator<Item = &str> {
        self.allow.iter().map(String::as_str)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(String::as_str)
    }

    pub fn exclude(&self) -> impl Iterator<Item = &str> {
        self.exclude.iter().map(String::as_str)
    }
}

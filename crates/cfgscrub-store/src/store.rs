//! Storage contract shared by the upload and convert sides.
//!
//! Upload and convert are independent requests. The convert side only ever
//! sees the token, so the token carries the original file name (and with it
//! the extension hint) through storage.

use std::io;
use std::time::Duration;

use cfgscrub_domain::{UploadDigest, hash_upload_digest, upload_nonce};

const MAX_NAME_CHARS: usize = 100;

pub trait UploadStore {
    fn put(&self, bytes: &[u8], original_name: &str) -> io::Result<String>;
    fn exists(&self, token: &str) -> bool;
    fn get(&self, token: &str) -> io::Result<Vec<u8>>;
    /// Deletes uploads older than `max_age`. Files vanishing mid-sweep are not
    /// errors.
    fn sweep(&self, max_age: Duration) -> io::Result<SweepReport>;
    /// Location text for diagnostics.
    fn describe(&self, token: &str) -> String;
}

impl<T: UploadStore + ?Sized> UploadStore for &T {
    fn put(&self, bytes: &[u8], original_name: &str) -> io::Result<String> {
        (**self).put(bytes, original_name)
    }

    fn exists(&self, token: &str) -> bool {
        (**self).exists(token)
    }

    fn get(&self, token: &str) -> io::Result<Vec<u8>> {
        (**self).get(token)
    }

    fn sweep(&self, max_age: Duration) -> io::Result<SweepReport> {
        (**self).sweep(max_age)
    }

    fn describe(&self, token: &str) -> String {
        (**self).describe(token)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: u64,
    pub deleted: u64,
    /// Expired files that disappeared before the delete landed.
    pub vanished: u64,
    pub failed: u64,
}

/// Keeps `[A-Za-z0-9._-]`, replaces everything else, never starts with a dot.
pub fn sanitize_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    let mut out: String = trimmed.chars().rev().take(MAX_NAME_CHARS).collect();
    out = out.chars().rev().collect();
    if out.is_empty() {
        "upload".to_string()
    } else {
        out
    }
}

pub fn make_token(bytes: &[u8], original_name: &str) -> String {
    let digest: UploadDigest = hash_upload_digest(bytes, original_name, upload_nonce());
    format!("{}_{}", digest.short_hex(), sanitize_name(original_name))
}

/// The sanitized original name carried by a token.
pub fn original_name_of(token: &str) -> &str {
    token.split_once('_').map_or(token, |(_, name)| name)
}

pub fn validate_token(token: &str) -> io::Result<()> {
    let ok = !token.is_empty()
        && !token.starts_with('.')
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "token contains characters outside [A-Za-z0-9._-]",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_sanitized_keeping_the_extension() {
        assert_eq!(sanitize_name("Corp Wi-Fi (2).mobileconfig"), "Corp_Wi-Fi__2_.mobileconfig");
        assert_eq!(sanitize_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_name("..."), "upload");
        assert_eq!(sanitize_name(".hidden.plist"), "hidden.plist");
        let long = format!("{}.plist", "a".repeat(200));
        let out = sanitize_name(&long);
        assert_eq!(out.len(), MAX_NAME_CHARS);
        assert!(out.ends_with(".plist"));
    }

    #[test]
    fn token_carries_the_original_name() {
        let token = make_token(b"abc", "wifi profile.plist");
        let (hex, name) = token.split_once('_').expect("separator");
        assert_eq!(hex.len(), 16);
        assert_eq!(name, "wifi_profile.plist");
        assert_eq!(original_name_of(&token), "wifi_profile.plist");
        assert!(validate_token(&token).is_ok());
        assert!(validate_token("../x").is_err());
        assert!(validate_token("").is_err());
    }
}

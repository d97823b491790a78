use std::time::{SystemTime, UNIX_EPOCH};

use blake3::Hasher;
use sha2::{Digest, Sha256};

use crate::{Digest32, UploadDigest};

pub fn sha256_digest(bytes: &[u8]) -> Digest32 {
    Digest32::from_bytes(Sha256::digest(bytes).into())
}

/// `sha256:` followed by the first 16 hex characters of the SHA-256 digest.
pub fn sha256_reference(bytes: &[u8]) -> String {
    format!("sha256:{}", sha256_digest(bytes).short_hex())
}

/// Storage key digest for an upload. The nonce keeps two uploads of the same
/// file from colliding.
pub fn hash_upload_digest(bytes: &[u8], original_name: &str, nonce: u128) -> UploadDigest {
    let mut hasher = Hasher::new();
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
    hasher.update(original_name.as_bytes());
    hasher.update(&nonce.to_le_bytes());
    UploadDigest::from_digest(Digest32::from_bytes(*hasher.finalize().as_bytes()))
}

pub fn upload_nonce() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
        ^ u128::from(std::process::id())
}

use std::collections::BTreeSet;

use blake3::Hasher;
use cfgscrub_domain::{Digest32, RulesId};

/// Order-independent identity of an effective rule set. Each list is hashed as
/// a tag byte, an entry count, then length-prefixed sorted entries.
pub fn compute_field_rules_id(
    allow: &BTreeSet<String>,
    patterns: &[String],
    exclude: &BTreeSet<String>,
) -> RulesId {
    let mut hasher = Hasher::new();
    hasher.update(crate::FIELD_RULES_SCHEMA_V1.as_bytes());
    hash_list(&mut hasher, b'a', allow.iter());
    hash_list(&mut hasher, b'p', patterns.iter());
    hash_list(&mut hasher, b'x', exclude.iter());

    RulesId::from_digest(Digest32::from_bytes(*hasher.finalize().as_bytes()))
}

fn hash_list<'a>(hasher: &mut Hasher, tag: u8, entries: impl ExactSizeIterator<Item = &'a String>) {
    hasher.update(&[tag]);
    hasher.update(&(entries.len() as u64).to_le_bytes());
    for entry in entries {
        let bytes = entry.as_bytes();
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
}

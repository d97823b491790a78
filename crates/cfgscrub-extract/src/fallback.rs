use cfgscrub_domain::{ParseTree, TreeMap};
use serde_json::json;

use crate::cascade::{ParseAttempt, ParseInput};
use crate::sniff::ByteProfile;

pub const FALLBACK_PARSER_ID: &str = "fallback";

/// Diagnostic tree returned when no strategy produced anything. Always
/// succeeds.
pub fn fallback_tree(input: &ParseInput, attempts: &[ParseAttempt]) -> ParseTree {
    let profile = ByteProfile::of(&input.bytes);
    let preview: String = String::from_utf8_lossy(&input.bytes)
        .chars()
        .take(input.limits.preview_chars as usize)
        .collect();
    let ratio = (profile.printable_ratio * 100.0).round() / 100.0;

    let mut root = TreeMap::new();
    root.insert(
        "fileInfo".to_string(),
        json!({
            "name": input.name,
            "size": profile.size,
            "extension": input.extension,
            "detectedType": input.kind.as_str(),
        }),
    );
    root.insert("rawContentPreview".to_string(), ParseTree::String(preview));
    root.insert(
        "binaryInfo".to_string(),
        json!({
            "hexPreview": profile.hex_preview,
            "printableRatio": ratio,
            "hasNullBytes": profile.has_nul,
        }),
    );
    root.insert(
        "parseErrors".to_string(),
        ParseTree::Array(
            attempts
                .iter()
                .map(|a| ParseTree::String(format!("{}: {}", a.parser_id, a.error)))
                .collect(),
        ),
    );
    ParseTree::Object(root)
}


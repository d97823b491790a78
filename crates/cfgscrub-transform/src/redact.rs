use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cfgscrub_domain::{FieldTransformPolicy, ParseTree, TreeMap, sha256_reference};
use cfgscrub_policy::FieldRules;

pub const REDACTED_MARKER: &str = "***REDACTED***";
pub const HASH_PREFIX: &str = "sha256:";
pub const BASE64_PREFIX: &str = "base64:";

/// Per-key counts of the values a redaction pass rewrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionReport {
    pub policy: FieldTransformPolicy,
    pub rewritten: BTreeMap<String, usize>,
    /// Sensitive values left alone because they already carry a marker.
    pub already_marked: usize,
}

impl RedactionReport {
    pub fn total(&self) -> usize {
        self.rewritten.values().sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Redactor<'a> {
    rules: &'a FieldRules,
    policy: FieldTransformPolicy,
}

impl<'a> Redactor<'a> {
    pub fn new(rules: &'a FieldRules, policy: FieldTransformPolicy) -> Self {
        Self { rules, policy }
    }

    pub fn apply(&self, tree: &ParseTree) -> (ParseTree, RedactionReport) {
        let mut report = RedactionReport {
            policy: self.policy,
            ..RedactionReport::default()
        };
        if self.policy == FieldTransformPolicy::None {
            return (tree.clone(), report);
        }
        let out = self.walk(tree, &mut report);
        (out, report)
    }

    fn walk(&self, value: &ParseTree, report: &mut RedactionReport) -> ParseTree {
        match value {
            ParseTree::Object(map) => {
                let mut out = TreeMap::new();
                for (k, v) in map {
                    let v = if self.rules.is_sensitive(k) {
                        self.rewrite_under(k, v, report)
                    } else {
                        self.walk(v, report)
                    };
                    out.insert(k.clone(), v);
                }
                ParseTree::Object(out)
            }
            ParseTree::Array(items) => {
                ParseTree::Array(items.iter().map(|v| self.walk(v, report)).collect())
            }
            other => other.clone(),
        }
    }

    /// A sensitive key rewrites its string value, or the strings directly
    /// inside a list value. Nested maps are still walked by key.
    fn rewrite_under(&self, key: &str, value: &ParseTree, report: &mut RedactionReport) -> ParseTree {
        match value {
            ParseTree::String(s) => ParseTree::String(self.rewrite_string(key, s, report)),
            ParseTree::Array(items) => ParseTree::Array(
                items
                    .iter()
                    .map(|item| match item {
                        ParseTree::String(s) => {
                            ParseTree::String(self.rewrite_string(key, s, report))
                        }
                        other => self.walk(other, report),
                    })
                    .collect(),
            ),
            other => self.walk(other, report),
        }
    }

    fn rewrite_string(&self, key: &str, s: &str, report: &mut RedactionReport) -> String {
        if s.is_empty() {
            return String::new();
        }
        if carries_marker(s) {
            report.already_marked += 1;
            return s.to_string();
        }
        *report.rewritten.entry(key.to_string()).or_default() += 1;
        transform_value(self.policy, s)
    }
}

pub fn redact(tree: &ParseTree, policy: FieldTransformPolicy, rules: &FieldRules) -> ParseTree {
    Redactor::new(rules, policy).apply(tree).0
}

pub fn transform_value(policy: FieldTransformPolicy, s: &str) -> String {
    match policy {
        FieldTransformPolicy::None => s.to_string(),
        FieldTransformPolicy::Mask => REDACTED_MARKER.to_string(),
        FieldTransformPolicy::Partial => partial(s),
        FieldTransformPolicy::Length => format!("[LENGTH-{}-CHARS]", s.chars().count()),
        FieldTransformPolicy::Hash => sha256_reference(s.as_bytes()),
        FieldTransformPolicy::Base64 => format!("{BASE64_PREFIX}{}", STANDARD.encode(s)),
    }
}

fn partial(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 4 {
        return REDACTED_MARKER.to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}***{tail}")
}

/// True for any value one of the field policies could have produced.
pub fn carries_marker(s: &str) -> bool {
    s.contains(REDACTED_MARKER)
        || s.starts_with(HASH_PREFIX)
        || s.starts_with(BASE64_PREFIX)
        || is_length_marker(s)
}

fn is_length_marker(s: &str) -> bool {
    s.strip_prefix("[LENGTH-")
        .and_then(|rest| rest.strip_suffix("-CHARS]"))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cfgscrub_domain::{FileKind, ParseError, ParseErrorCode, ParseTree, TreeMap};

use crate::cascade::{ParseInput, ParseStrategy};

pub const CANONICAL_PLIST_DOCTYPE: &str = r#"<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">"#;

pub fn parse_plist_bytes(bytes: &[u8]) -> Result<ParseTree, ParseError> {
    let value = plist::Value::from_reader(Cursor::new(bytes)).map_err(ParseError::syntax)?;
    Ok(plist_to_tree(value))
}

pub fn plist_to_tree(value: plist::Value) -> ParseTree {
    match value {
        plist::Value::Dictionary(dict) => {
            let mut map = TreeMap::new();
            for (k, v) in dict {
                map.insert(k, plist_to_tree(v));
            }
            ParseTree::Object(map)
        }
        plist::Value::Array(items) => {
            ParseTree::Array(items.into_iter().map(plist_to_tree).collect())
        }
        plist::Value::Boolean(b) => ParseTree::Bool(b),
        plist::Value::Data(bytes) => ParseTree::String(STANDARD.encode(bytes)),
        plist::Value::Date(date) => ParseTree::String(date.to_xml_format()),
        plist::Value::Real(r) => serde_json::Number::from_f64(r)
            .map(ParseTree::Number)
            .unwrap_or_else(|| ParseTree::String(r.to_string())),
        plist::Value::Integer(i) => {
            if let Some(n) = i.as_signed() {
                ParseTree::from(n)
            } else if let Some(n) = i.as_unsigned() {
                ParseTree::from(n)
            } else {
                ParseTree::Null
            }
        }
        plist::Value::String(s) => ParseTree::String(s),
        plist::Value::Uid(uid) => ParseTree::from(uid.get()),
        _ => ParseTree::Null,
    }
}

#[derive(Debug)]
pub struct PlistStrategy;

impl ParseStrategy for PlistStrategy {
    fn id(&self) -> &'static str {
        "plist"
    }

    fn yields(&self) -> FileKind {
        FileKind::XmlPlist
    }

    fn parse(&self, input: &ParseInput) -> Result<ParseTree, ParseError> {
        parse_plist_bytes(crate::sniff::strip_bom(&input.bytes))
    }
}

/// Rewrites a damaged DOCTYPE to the canonical Apple one and retries.
#[derive(Debug)]
pub struct DoctypeRepairStrategy;

impl ParseStrategy for DoctypeRepairStrategy {
    fn id(&self) -> &'static str {
        "plist.doctype_repair"
    }

    fn yields(&self) -> FileKind {
        FileKind::XmlPlist
    }

    fn parse(&self, input: &ParseInput) -> Result<ParseTree, ParseError> {
        let text = std::str::from_utf8(crate::sniff::strip_bom(&input.bytes))
            .map_err(|_| ParseError::new(ParseErrorCode::InvalidEncoding, "not UTF-8 text"))?;
        let repaired = repair_doctype(text)
            .ok_or_else(|| ParseError::not_applicable("no repairable DOCTYPE"))?;
        parse_plist_bytes(repaired.as_bytes())
    }
}

/// Returns the document with its DOCTYPE replaced, or `None` when there is
/// no DOCTYPE or it is already canonical.
pub fn repair_doctype(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let start = lower.find("<!doctype")?;
    let end = start + lower[start..].find('>')?;
    let current = &text[start..=end];
    if current == CANONICAL_PLIST_DOCTYPE {
        return None;
    }
    if !lower[start..=end].contains("plist") && !lower.contains("<plist") {
        return None;
    }

    let mut out = String::with_capacity(text.len() + CANONICAL_PLIST_DOCTYPE.len());
    out.push_str(&text[..start]);
    out.push_str(CANONICAL_PLIST_DOCTYPE);
    out.push_str(&text[end + 1..]);
    Some(out)
}

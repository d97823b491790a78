use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use cfgscrub_domain::{CascadeLimits, FileKind, ParseError, ParseErrorCode, ParseTree};

use crate::cascade::{ParseInput, ParseStrategy};
use crate::property_list::parse_plist_bytes;
use crate::sniff::{BINARY_PLIST_MAGIC, strip_bom};
use crate::xml::parse_lenient;

const PLIST_END: &[u8] = b"</plist>";
const MIN_BASE64_CHARS: usize = 16;

pub fn find_subslice(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if needle.is_empty() || start >= haystack.len() {
        return None;
    }
    haystack[start..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| start + pos)
}

/// `<?xml … </plist>` (or `<plist … </plist>`) inside a larger byte buffer,
/// such as a CMS-signed profile or a multipart body.
pub fn find_plist_fragment(bytes: &[u8]) -> Option<&[u8]> {
    let start = find_subslice(bytes, b"<?xml", 0).or_else(|| find_subslice(bytes, b"<plist", 0))?;
    let end = find_subslice(bytes, PLIST_END, start)?;
    Some(&bytes[start..end + PLIST_END.len()])
}

fn parse_fragment(fragment: &[u8], limits: &CascadeLimits) -> Result<ParseTree, ParseError> {
    match parse_plist_bytes(fragment) {
        Ok(tree) => Ok(tree),
        Err(_) => parse_lenient(&String::from_utf8_lossy(fragment), limits).map(|doc| doc.tree),
    }
}

#[derive(Debug)]
pub struct EmbeddedPlistStrategy;

impl ParseStrategy for EmbeddedPlistStrategy {
    fn id(&self) -> &'static str {
        "embedded_plist"
    }

    fn yields(&self) -> FileKind {
        FileKind::XmlPlist
    }

    fn parse(&self, input: &ParseInput) -> Result<ParseTree, ParseError> {
        let fragment = find_plist_fragment(&input.bytes)
            .ok_or_else(|| ParseError::not_applicable("no embedded property list"))?;
        if fragment.len() == input.bytes.len() {
            // The whole input is the fragment; the plain strategies own that case.
            return Err(ParseError::not_applicable("input is not wrapped"));
        }
        parse_fragment(fragment, &input.limits)
    }
}

#[derive(Debug)]
pub struct Base64WrappedStrategy;

impl ParseStrategy for Base64WrappedStrategy {
    fn id(&self) -> &'static str {
        "base64_wrapped"
    }

    fn yields(&self) -> FileKind {
        FileKind::XmlPlist
    }

    fn parse(&self, input: &ParseInput) -> Result<ParseTree, ParseError> {
        let text = std::str::from_utf8(strip_bom(&input.bytes))
            .map_err(|_| ParseError::new(ParseErrorCode::InvalidEncoding, "not UTF-8 text"))?;
        if text.contains('<') {
            return Err(ParseError::not_applicable("markup present"));
        }
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.len() < MIN_BASE64_CHARS
            || !compact
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        {
            return Err(ParseError::not_applicable("not base64 text"));
        }

        let decoded = STANDARD
            .decode(&compact)
            .or_else(|_| STANDARD_NO_PAD.decode(compact.trim_end_matches('=')))
            .map_err(ParseError::syntax)?;

        if decoded.starts_with(BINARY_PLIST_MAGIC)
            && let Ok(tree) = parse_plist_bytes(&decoded)
        {
            return Ok(tree);
        }
        if let Some(fragment) = find_plist_fragment(&decoded) {
            return parse_fragment(fragment, &input.limits);
        }
        let body = strip_bom(&decoded);
        if body.trim_ascii_start().starts_with(b"<") {
            return parse_lenient(&String::from_utf8_lossy(body), &input.limits).map(|doc| doc.tree);
        }
        Err(ParseError::new(
            ParseErrorCode::WrongShape,
            "decoded content is neither a property list nor XML",
        ))
    }
}

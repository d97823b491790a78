use cfgscrub_domain::FileKind;

pub const SNIFF_WINDOW: usize = 1024;
pub const BINARY_PLIST_MAGIC: &[u8; 8] = b"bplist00";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const HEX_PREVIEW_BYTES: usize = 32;
const LINE_SCAN_LIMIT: usize = 200;

/// Local file header, empty-archive end of central directory, spanned archive marker.
pub const ZIP_SIGNATURES: [&[u8; 4]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

/// Diagnostics kept for inputs nothing could identify.
#[derive(Debug, Clone, PartialEq)]
pub struct ByteProfile {
    pub hex_preview: String,
    pub printable_ratio: f64,
    pub has_nul: bool,
    pub size: usize,
}

impl ByteProfile {
    pub fn of(bytes: &[u8]) -> Self {
        let hex_preview = bytes
            .iter()
            .take(HEX_PREVIEW_BYTES)
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ");
        let printable = bytes.iter().filter(|b| is_printable(**b)).count();
        let printable_ratio = if bytes.is_empty() {
            0.0
        } else {
            printable as f64 / bytes.len() as f64
        };
        Self {
            hex_preview,
            printable_ratio,
            has_nul: bytes.contains(&0),
            size: bytes.len(),
        }
    }
}

fn is_printable(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\r') || (0x20..0x7f).contains(&b) || b >= 0x80
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sniffed {
    pub kind: FileKind,
    pub profile: ByteProfile,
}

pub fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

/// Classify a buffer by content. Never fails; anything ambiguous lands on the
/// least specific tag. The extension only matters for tie-breaking later in
/// the cascade, not here.
pub fn sniff(bytes: &[u8], extension: Option<&str>) -> Sniffed {
    let kind = if has_zip_signature(bytes) {
        FileKind::Zip
    } else {
        classify_content(bytes)
    };
    sniffed(bytes, extension, kind)
}

/// Like [`sniff`], for bytes that carry a ZIP signature but did not open as
/// an archive.
pub fn sniff_content(bytes: &[u8], extension: Option<&str>) -> Sniffed {
    sniffed(bytes, extension, classify_content(bytes))
}

fn has_zip_signature(bytes: &[u8]) -> bool {
    ZIP_SIGNATURES.iter().any(|sig| bytes.starts_with(*sig))
}

fn sniffed(bytes: &[u8], extension: Option<&str>, kind: FileKind) -> Sniffed {
    tracing::debug!(
        size = bytes.len(),
        extension = extension.unwrap_or(""),
        kind = %kind,
        "sniffed upload"
    );
    Sniffed {
        kind,
        profile: ByteProfile::of(bytes),
    }
}

fn classify_content(bytes: &[u8]) -> FileKind {
    let body = strip_bom(bytes);
    if body.starts_with(BINARY_PLIST_MAGIC) {
        return FileKind::BinaryPlist;
    }

    let window = &body[..body.len().min(SNIFF_WINDOW)];
    let window_lower = String::from_utf8_lossy(window).to_ascii_lowercase();
    if window_lower.contains("<!doctype plist") || window_lower.contains("<plist") {
        let head = &body[..body.len().min(BINARY_PLIST_MAGIC.len())];
        if head.contains(&0) {
            return FileKind::BinaryPlist;
        }
        return FileKind::XmlPlist;
    }

    let Ok(text) = std::str::from_utf8(body) else {
        return FileKind::Unknown;
    };
    let trimmed = text.trim_start();

    if trimmed.starts_with("<?xml") || looks_like_start_tag(trimmed) {
        return FileKind::Xml;
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return FileKind::Json;
    }
    if !trimmed.is_empty() && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return FileKind::Json;
    }

    let lines = || {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with(';'))
            .take(LINE_SCAN_LIMIT)
    };
    if lines().any(is_yaml_line) {
        return FileKind::Yaml;
    }
    if lines().any(is_key_value_line) {
        return FileKind::KeyValue;
    }

    FileKind::Unknown
}

fn looks_like_start_tag(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('<') && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
}

fn is_yaml_line(line: &str) -> bool {
    if line == "---" || line.starts_with("- ") {
        return true;
    }
    let Some((key, rest)) = line.split_once(':') else {
        return false;
    };
    is_plain_key(key) && (rest.is_empty() || rest.starts_with(' '))
}

fn is_key_value_line(line: &str) -> bool {
    if line.starts_with('[') && line.ends_with(']') && line.len() > 2 {
        return true;
    }
    match line.split_once('=') {
        // Trailing `=` padding is base64, not an assignment.
        Some((key, rest)) => is_plain_key(key) && !rest.chars().all(|c| c == '='),
        None => false,
    }
}

fn is_plain_key(key: &str) -> bool {
    let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' '))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_needs_a_full_signature() {
        assert_eq!(sniff(b"PK\x03\x04rest", None).kind, FileKind::Zip);
        assert_eq!(sniff(b"PK\x05\x06", Some("zip")).kind, FileKind::Zip);
        assert_eq!(sniff(b"PKG_NAME: corp-wifi\n", Some("yaml")).kind, FileKind::Yaml);
        assert_eq!(sniff(b"PKCS12_PATH=/etc/cert.p12\n", Some("conf")).kind, FileKind::KeyValue);
        assert_eq!(sniff_content(b"PK\x03\x04rest", None).kind, FileKind::Unknown);
    }

    #[test]
    fn classifies_by_content() {
        assert_eq!(classify_content(b"bplist00\x00\x01"), FileKind::BinaryPlist);
        assert_eq!(
            classify_content(b"\xEF\xBB\xBF<?xml version=\"1.0\"?>\n<plist version=\"1.0\"><dict/></plist>"),
            FileKind::XmlPlist
        );
        assert_eq!(classify_content(b"<?xml version=\"1.0\"?><root/>"), FileKind::Xml);
        assert_eq!(classify_content(b"  {\"a\": 1}"), FileKind::Json);
        assert_eq!(classify_content(b"\"just a string\""), FileKind::Json);
        assert_eq!(classify_content(b"ssid: home\npassword: x\n"), FileKind::Yaml);
        assert_eq!(classify_content(b"network={\n ssid=\"home\"\n}\n"), FileKind::KeyValue);
        assert_eq!(classify_content(b"abc"), FileKind::Unknown);
        assert_eq!(classify_content(b"PD94bWwgdmVyc2lvbj0iMS4wIj8+PHBsaXN0Lz4="), FileKind::Unknown);
        assert_eq!(classify_content(b"\x00\x01\x02\xff"), FileKind::Unknown);
    }

    #[test]
    fn profile_reports_ratio_and_nul() {
        let p = ByteProfile::of(b"ab\x00\x01");
        assert!(p.has_nul);
        assert_eq!(p.size, 4);
        assert!((p.printable_ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(p.hex_preview, "61 62 00 01");
    }
}

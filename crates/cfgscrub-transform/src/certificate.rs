//! Certificate and key material found in string values.
//!
//! Detection is textual (PEM armor, or a long base64 run with a DER sequence
//! prefix). Metadata comes from a real X.509 parse when the bytes allow it,
//! then from regex scraping, and degrades to a digest + size stub otherwise.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cfgscrub_domain::{
    CertificateDisplayPolicy, CertificateMetadata, CertificateSource, ExtractionLevel,
    MaterialKind, ParseTree, TreeMap, encode_hex, push_path_segment, sha256_digest,
    sha256_reference,
};
use cfgscrub_policy::FieldRules;
use const_oid::ObjectIdentifier;
use const_oid::db::rfc4519;
use der::Decode;
use regex::Regex;
use x509_cert::Certificate;
use x509_cert::name::Name;
use x509_cert::time::Time;

pub const OBFUSCATED_PLACEHOLDER: &str = "***CERTIFICATE_DATA***";
pub const TRUNCATED_PLACEHOLDER: &str = "[CERTIFICATE_DATA_TRUNCATED]";
pub const INFO_SUFFIX: &str = "_certificate_info";
pub const CERT_HASH_PREFIX: &str = "cert:";

const DER_BASE64_PREFIXES: [&str; 4] = ["MII", "MIG", "MIH", "MIA"];
const MIN_BARE_BASE64_LEN: usize = 100;

const NAME_LABELS: [(ObjectIdentifier, &str); 6] = [
    (rfc4519::CN, "CN"),
    (rfc4519::O, "O"),
    (rfc4519::OU, "OU"),
    (rfc4519::C, "C"),
    (rfc4519::L, "L"),
    (rfc4519::ST, "ST"),
];

static PEM_BEGIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-----BEGIN ([A-Z0-9 ]+)-----").expect("static regex"));
static PEM_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)-----BEGIN [A-Z0-9 ]+-----(.*?)-----END [A-Z0-9 ]+-----").expect("static regex")
});
static PEM_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-----(?:BEGIN|END) [A-Z0-9 ]+-----").expect("static regex"));
static HEURISTIC_CN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CN\s*=\s*([^,/\r\n]+)").expect("static regex"));
static HEURISTIC_O: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bO\s*=\s*([^,/\r\n]+)").expect("static regex"));
static HEURISTIC_NOT_AFTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Not After\s*:\s*([^\r\n]+)").expect("static regex"));

/// Decoded certificate or key material plus what could be learned about it.
#[derive(Debug, Clone)]
pub struct Material {
    pub metadata: CertificateMetadata,
    bytes: Vec<u8>,
}

impl Material {
    /// Decoded bytes, or the literal text when decoding failed.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

pub fn detect_certificate(s: &str) -> Option<CertificateSource> {
    if PEM_BEGIN.is_match(s) {
        return Some(CertificateSource::Pem);
    }
    let stripped: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let looks_base64 = stripped.len() > MIN_BARE_BASE64_LEN
        && DER_BASE64_PREFIXES.iter().any(|p| stripped.starts_with(p))
        && stripped
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='));
    looks_base64.then_some(CertificateSource::Base64)
}

pub fn inspect(text: &str, source: CertificateSource) -> Material {
    let label = PEM_BEGIN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let decoded = match source {
        CertificateSource::Pem => decode_pem_body(text),
        CertificateSource::Base64 => decode_base64(text),
    };
    let bytes = decoded.clone().unwrap_or_else(|| text.as_bytes().to_vec());

    let kind = match label.as_deref() {
        Some(l) if l.contains("PRIVATE KEY") => MaterialKind::PrivateKey,
        Some(l) if l.contains("CERTIFICATE") => MaterialKind::Certificate,
        Some(_) => MaterialKind::Other,
        None => MaterialKind::Certificate,
    };

    let metadata = if kind == MaterialKind::Certificate
        && let Some(der) = decoded.as_deref()
        && let Some(meta) = parse_x509(der, source)
    {
        meta
    } else {
        heuristic_metadata(text, decoded.as_deref(), &bytes, kind, source)
    };

    Material { metadata, bytes }
}

fn decode_pem_body(text: &str) -> Option<Vec<u8>> {
    let body = PEM_BLOCK.captures(text)?.get(1)?.as_str();
    // Encapsulated headers such as `Proc-Type: 4,ENCRYPTED` sit on their own lines.
    let cleaned: String = body
        .lines()
        .filter(|l| !l.contains(':'))
        .flat_map(|l| l.chars())
        .filter(|c| !c.is_whitespace())
        .collect();
    STANDARD.decode(cleaned).ok().filter(|b| !b.is_empty())
}

fn decode_base64(text: &str) -> Option<Vec<u8>> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).ok()
}

fn parse_x509(der: &[u8], source: CertificateSource) -> Option<CertificateMetadata> {
    let cert = Certificate::from_der(der).ok()?;
    let tbs = &cert.tbs_certificate;
    Some(CertificateMetadata {
        kind: MaterialKind::Certificate,
        subject: Some(format_name(&tbs.subject)),
        issuer: Some(format_name(&tbs.issuer)),
        not_before: Some(format_time(&tbs.validity.not_before)),
        not_after: Some(format_time(&tbs.validity.not_after)),
        fingerprint: sha256_digest(der).to_colon_hex(),
        serial_number: Some(format_serial(tbs.serial_number.as_bytes())),
        source_format: source,
        size_bytes: der.len(),
        extraction: ExtractionLevel::X509,
    })
}

fn format_name(name: &Name) -> String {
    let mut parts = Vec::new();
    for rdn in name.0.iter() {
        for atv in rdn.0.iter() {
            let Ok(value) = std::str::from_utf8(atv.value.value()) else {
                continue;
            };
            let label = NAME_LABELS
                .iter()
                .find(|(oid, _)| *oid == atv.oid)
                .map_or_else(|| atv.oid.to_string(), |(_, l)| (*l).to_string());
            parts.push(format!("{label}={value}"));
        }
    }
    parts.join(", ")
}

fn format_time(t: &Time) -> String {
    let dt = t.to_date_time();
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minutes(),
        dt.seconds()
    )
}

fn format_serial(bytes: &[u8]) -> String {
    let trimmed = match bytes {
        [0, rest @ ..] if !rest.is_empty() => rest,
        _ => bytes,
    };
    encode_hex(trimmed).to_ascii_uppercase()
}

fn heuristic_metadata(
    text: &str,
    decoded: Option<&[u8]>,
    bytes: &[u8],
    kind: MaterialKind,
    source: CertificateSource,
) -> CertificateMetadata {
    let mut meta = CertificateMetadata::minimal(kind, source, sha256_reference(bytes), bytes.len());
    if kind == MaterialKind::PrivateKey {
        return meta;
    }

    let decoded_text = decoded.map(String::from_utf8_lossy);
    let haystacks: Vec<&str> = decoded_text.as_deref().into_iter().chain([text]).collect();
    let cn = first_capture(&HEURISTIC_CN, &haystacks);
    let org = first_capture(&HEURISTIC_O, &haystacks);
    let subject: Vec<String> = [("CN", cn), ("O", org)]
        .into_iter()
        .filter_map(|(label, v)| v.map(|v| format!("{label}={v}")))
        .collect();
    if !subject.is_empty() {
        meta.subject = Some(subject.join(", "));
    }
    meta.not_after = first_capture(&HEURISTIC_NOT_AFTER, &haystacks);
    if meta.subject.is_some() || meta.not_after.is_some() {
        meta.extraction = ExtractionLevel::Heuristic;
    }
    meta
}

fn first_capture(re: &Regex, haystacks: &[&str]) -> Option<String> {
    haystacks.iter().find_map(|h| {
        re.captures(h)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// The replacement for a detected value under `policy`.
pub fn display_value(policy: CertificateDisplayPolicy, original: &str, material: &Material) -> String {
    match policy {
        CertificateDisplayPolicy::Preserve => original.to_string(),
        CertificateDisplayPolicy::Obfuscate => OBFUSCATED_PLACEHOLDER.to_string(),
        CertificateDisplayPolicy::Hash => format!("{CERT_HASH_PREFIX}{}", sha256_reference(material.bytes())),
        CertificateDisplayPolicy::Truncate => {
            let markers: Vec<&str> = PEM_MARKER.find_iter(original).map(|m| m.as_str()).collect();
            if markers.is_empty() {
                TRUNCATED_PLACEHOLDER.to_string()
            } else {
                markers.join("\n")
            }
        }
        CertificateDisplayPolicy::Info => match material.metadata.subject_common_name() {
            Some(cn) => format!("[CERTIFICATE: {cn}]"),
            None => "[CERTIFICATE]".to_string(),
        },
    }
}

/// Tree pass rewriting certificate-like values. Keys the field rules treat as
/// secrets belong to the redactor and are left alone here.
#[derive(Debug, Clone, Copy)]
pub struct CertificateHandler<'a> {
    rules: &'a FieldRules,
    policy: CertificateDisplayPolicy,
}

impl<'a> CertificateHandler<'a> {
    pub fn new(rules: &'a FieldRules, policy: CertificateDisplayPolicy) -> Self {
        Self { rules, policy }
    }

    pub fn apply(&self, tree: &ParseTree) -> (ParseTree, BTreeMap<String, CertificateMetadata>) {
        let mut found = BTreeMap::new();
        let mut path = String::new();
        let out = self.walk(tree, &mut path, &mut found);
        (out, found)
    }

    fn walk(
        &self,
        value: &ParseTree,
        path: &mut String,
        found: &mut BTreeMap<String, CertificateMetadata>,
    ) -> ParseTree {
        match value {
            ParseTree::Object(map) => {
                let mut out = TreeMap::new();
                for (k, v) in map {
                    let old_len = path.len();
                    push_path_segment(path, k);

                    if self.rules.is_sensitive(k) {
                        out.insert(k.clone(), v.clone());
                    } else if let ParseTree::String(s) = v
                        && let Some((display, info)) = self.rewrite(s, path, found)
                    {
                        out.insert(k.clone(), ParseTree::String(display));
                        let sibling = format!("{k}{INFO_SUFFIX}");
                        if self.policy != CertificateDisplayPolicy::Preserve
                            && !map.contains_key(&sibling)
                        {
                            out.insert(sibling, info);
                        }
                    } else {
                        out.insert(k.clone(), self.walk(v, path, found));
                    }

                    path.truncate(old_len);
                }
                ParseTree::Object(out)
            }
            ParseTree::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (idx, item) in items.iter().enumerate() {
                    let old_len = path.len();
                    push_path_segment(path, &idx.to_string());
                    out.push(self.walk(item, path, found));
                    path.truncate(old_len);
                }
                ParseTree::Array(out)
            }
            ParseTree::String(s) => match self.rewrite(s, path, found) {
                Some((display, _)) => ParseTree::String(display),
                None => value.clone(),
            },
            other => other.clone(),
        }
    }

    /// Display string and metadata tree for a detected value.
    fn rewrite(
        &self,
        s: &str,
        path: &str,
        found: &mut BTreeMap<String, CertificateMetadata>,
    ) -> Option<(String, ParseTree)> {
        let source = detect_certificate(s)?;
        let material = inspect(s, source);
        if material.metadata.extraction == ExtractionLevel::Minimal {
            tracing::warn!(
                path,
                size = material.metadata.size_bytes,
                "certificate metadata degraded to digest and size"
            );
        }
        let display = display_value(self.policy, s, &material);
        let info = material.metadata.to_tree();
        found.insert(path.to_string(), material.metadata);
        Some((display, info))
    }
}

pub fn handle_certificates(
    tree: &ParseTree,
    policy: CertificateDisplayPolicy,
    rules: &FieldRules,
) -> (ParseTree, BTreeMap<String, CertificateMetadata>) {
    CertificateHandler::new(rules, policy).apply(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_needs_armor_or_a_long_der_prefix() {
        assert_eq!(
            detect_certificate("-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----"),
            Some(CertificateSource::Pem)
        );
        let bare = format!("MIIB{}", "A".repeat(120));
        assert_eq!(detect_certificate(&bare), Some(CertificateSource::Base64));
        assert_eq!(detect_certificate(&format!("MIIB{}", "A".repeat(20))), None);
        assert_eq!(detect_certificate(&format!("QUJD{}", "A".repeat(120))), None);
        assert_eq!(detect_certificate("MIIB A-B"), None);
    }

    #[test]
    fn truncate_keeps_only_marker_lines() {
        let pem = "-----BEGIN CERTIFICATE-----\nMIIBAAAA\n-----END CERTIFICATE-----";
        let material = inspect(pem, CertificateSource::Pem);
        assert_eq!(
            display_value(CertificateDisplayPolicy::Truncate, pem, &material),
            "-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----"
        );

        let bare = format!("MIIB{}", "A".repeat(120));
        let material = inspect(&bare, CertificateSource::Base64);
        assert_eq!(
            display_value(CertificateDisplayPolicy::Truncate, &bare, &material),
            TRUNCATED_PLACEHOLDER
        );
    }

    #[test]
    fn truncate_drops_the_body_of_a_single_line_block() {
        let pem = "-----BEGIN CERTIFICATE----- MIIBAAAA -----END CERTIFICATE-----";
        let material = inspect(pem, CertificateSource::Pem);
        assert_eq!(
            display_value(CertificateDisplayPolicy::Truncate, pem, &material),
            "-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----"
        );
    }

    #[test]
    fn serial_drops_der_sign_byte() {
        assert_eq!(format_serial(&[0x00, 0x9f, 0x01]), "9F01");
        assert_eq!(format_serial(&[0x00]), "00");
    }

    #[test]
    fn heuristic_reads_text_dumps() {
        let dump = "-----BEGIN CERTIFICATE-----\nnot base64 at all!\n-----END CERTIFICATE-----\nSubject: CN=ca.example.org, O=Example\nNot After : Jan  1 00:00:00 2030 GMT";
        let material = inspect(dump, CertificateSource::Pem);
        let meta = &material.metadata;
        assert_eq!(meta.extraction, ExtractionLevel::Heuristic);
        assert_eq!(meta.subject.as_deref(), Some("CN=ca.example.org, O=Example"));
        assert_eq!(meta.not_after.as_deref(), Some("Jan  1 00:00:00 2030 GMT"));
        assert!(meta.fingerprint.starts_with("sha256:"));
    }
}

//! Structural sanity checks on the raw upload.
//!
//! Alerts are advisory. They are computed from the same bytes the parser sees
//! and never change what the parser produces.

use std::sync::LazyLock;

use cfgscrub_domain::{Alert, AlertKind, Severity};
use regex::Regex;

pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mobileconfig",
    "plist",
    "xml",
    "yaml",
    "yml",
    "json",
    "zip",
    "eap",
    "conf",
    "cfg",
    "config",
    "ini",
    "txt",
];

/// Extensions whose content is always text, so NUL bytes in them are an
/// encoding problem rather than a binary format.
pub const TEXT_EXTENSIONS: &[&str] = &[
    "xml", "yaml", "yml", "json", "eap", "conf", "cfg", "config", "ini", "txt",
];

pub const STANDARD_PLIST_DOCTYPE: &str = r#"<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">"#;

static OPENING_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z_][^<>]*>").expect("static regex"));
static CLOSING_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</[A-Za-z_][^<>]*>").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    /// Allowed difference between opening and closing tag counts.
    pub tag_tolerance: usize,
    /// Share of control characters above which a file counts as binary.
    pub binary_control_ratio: f64,
    pub min_size: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            tag_tolerance: 20,
            binary_control_ratio: 0.10,
            min_size: 10,
        }
    }
}

pub trait AlertDetector {
    fn detect(&self, file_name: &str, extension: Option<&str>, bytes: &[u8]) -> Vec<Alert>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MalformationDetector {
    settings: DetectorSettings,
}

impl MalformationDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self { settings }
    }
}

pub fn detect_alerts(file_name: &str, extension: Option<&str>, bytes: &[u8]) -> Vec<Alert> {
    MalformationDetector::default().detect(file_name, extension, bytes)
}

impl AlertDetector for MalformationDetector {
    fn detect(&self, file_name: &str, extension: Option<&str>, bytes: &[u8]) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let ext = extension.map(str::to_ascii_lowercase);

        check_extension(ext.as_deref(), &mut alerts);
        if bytes.len() < self.settings.min_size {
            alerts.push(
                Alert::new(
                    AlertKind::EmptyFile,
                    Severity::Error,
                    format!(
                        "{file_name} is only {} bytes; it is empty or truncated",
                        bytes.len()
                    ),
                )
                .with_detail("size", bytes.len()),
            );
        }

        if expects_binary(ext.as_deref(), bytes) && is_binary(bytes, self.settings.binary_control_ratio) {
            tracing::debug!(file = file_name, "binary content, skipping text checks");
            return finish(file_name, alerts);
        }

        check_encoding(bytes, &mut alerts);

        let text = String::from_utf8_lossy(bytes);
        check_tag_balance(&text, self.settings.tag_tolerance, &mut alerts);
        check_plist_structure(&text, ext.as_deref(), &mut alerts);

        finish(file_name, alerts)
    }
}

fn finish(file_name: &str, alerts: Vec<Alert>) -> Vec<Alert> {
    for alert in &alerts {
        tracing::debug!(
            file = file_name,
            kind = %alert.kind,
            severity = %alert.severity,
            "structural alert"
        );
    }
    alerts
}

fn check_extension(ext: Option<&str>, alerts: &mut Vec<Alert>) {
    if ext.is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e)) {
        return;
    }
    let shown = ext.unwrap_or("");
    let message = if shown.is_empty() {
        "file has no extension; expected one of the supported configuration formats".to_string()
    } else {
        format!("file extension .{shown} is not a supported configuration format")
    };
    alerts.push(
        Alert::new(AlertKind::UnsupportedFileType, Severity::Warning, message)
            .with_detail("extension", shown)
            .with_detail("supported", SUPPORTED_EXTENSIONS.to_vec()),
    );
}

/// NUL bytes, or more than `ratio` control characters other than tab/CR/LF.
pub fn is_binary(bytes: &[u8], ratio: f64) -> bool {
    if bytes.is_empty() {
        return false;
    }
    if bytes.contains(&0) {
        return true;
    }
    let control = bytes
        .iter()
        .filter(|b| b.is_ascii_control() && !matches!(**b, b'\t' | b'\r' | b'\n'))
        .count();
    control as f64 / bytes.len() as f64 > ratio
}

/// Binary-capable extensions (plist, mobileconfig, zip) and unknown ones may
/// hold binary data, unless the content opens like markup.
fn expects_binary(ext: Option<&str>, bytes: &[u8]) -> bool {
    if ext.is_some_and(|e| TEXT_EXTENSIONS.contains(&e)) {
        return false;
    }
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    !body.trim_ascii_start().starts_with(b"<")
}

fn check_encoding(bytes: &[u8], alerts: &mut Vec<Alert>) {
    let replacements = String::from_utf8_lossy(bytes).matches('\u{FFFD}').count();
    let nul_bytes = bytes.iter().filter(|b| **b == 0).count();

    let mut problems = Vec::new();
    match std::str::from_utf8(bytes) {
        Err(e) => problems.push(format!("invalid UTF-8 at byte {}", e.valid_up_to())),
        Ok(_) if replacements > 0 => {
            problems.push(format!("{replacements} replacement characters in text"));
        }
        Ok(_) => {}
    }
    if nul_bytes > 0 {
        problems.push(format!("{nul_bytes} embedded NUL byte(s)"));
    }
    if problems.is_empty() {
        return;
    }

    alerts.push(
        Alert::new(
            AlertKind::EncodingIssue,
            Severity::Warning,
            format!("text encoding problem: {}", problems.join("; ")),
        )
        .with_detail("replacement_chars", replacements)
        .with_detail("nul_bytes", nul_bytes),
    );
}

fn check_tag_balance(text: &str, tolerance: usize, alerts: &mut Vec<Alert>) {
    let opening = OPENING_TAG
        .find_iter(text)
        .filter(|m| !m.as_str().ends_with("/>"))
        .count();
    let closing = CLOSING_TAG.find_iter(text).count();
    if opening.abs_diff(closing) <= tolerance {
        return;
    }
    alerts.push(
        Alert::new(
            AlertKind::MalformedXml,
            Severity::Error,
            format!("{opening} opening tags but {closing} closing tags"),
        )
        .with_detail("opening_tags", opening)
        .with_detail("closing_tags", closing),
    );
}

fn check_plist_structure(text: &str, ext: Option<&str>, alerts: &mut Vec<Alert>) {
    let lower = text.to_ascii_lowercase();
    let has_plist = lower.contains("<plist");

    if let Some(start) = lower.find("<!doctype")
        && (has_plist || lower[start..].starts_with("<!doctype plist"))
        && !text.contains(STANDARD_PLIST_DOCTYPE)
    {
        let end = text[start..].find('>').map_or(text.len(), |i| start + i + 1);
        alerts.push(
            Alert::new(
                AlertKind::MalformedDoctype,
                Severity::Warning,
                "property list DOCTYPE is not the standard Apple declaration",
            )
            .with_detail("found", text[start..end].chars().take(200).collect::<String>()),
        );
    }

    if has_plist && !lower.contains("</plist>") {
        alerts.push(Alert::new(
            AlertKind::IncompleteXml,
            Severity::Error,
            "<plist> element is never closed; the file may be truncated",
        ));
    }

    if lower.trim_start_matches(['\u{feff}', ' ', '\t', '\r', '\n']).starts_with("<?xml")
        && !has_plist
        && !lower.contains("<dict")
        && ext != Some("xml")
    {
        alerts.push(Alert::new(
            AlertKind::UnexpectedXmlContent,
            Severity::Warning,
            "XML document has no property list structure",
        ));
    }
}

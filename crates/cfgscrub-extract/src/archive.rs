//! Picks the one configuration payload out of a ZIP upload.
//!
//! Three passes, first hit wins: entry name, payload markers in small entries,
//! then network keywords in non-office XML entries.

use std::io::{Cursor, Read};

use cfgscrub_domain::{ArchiveLimits, ConvertError};

use crate::sniff::BINARY_PLIST_MAGIC;

const NAME_SUFFIXES: &[&str] = &[".plist", ".mobileconfig"];
const NAME_FRAGMENTS: &[&str] = &["passpoint", "wifi", "802dot1x"];

const PAYLOAD_MARKERS: &[&str] = &[
    "<!DOCTYPE plist",
    "<plist",
    "com.apple.wifi.managed",
    "com.apple.security.pkcs12",
    "com.apple.security.root",
    "com.apple.eapclient",
];

const OFFICE_PREFIXES: &[&str] = &["_rels/", "docprops/", "word/", "xl/", "ppt/"];

const NETWORK_KEYWORDS: &[&str] = &[
    "passpoint",
    "hotspot",
    "wifi",
    "ssid",
    "eap",
    "realm",
    "credential",
    "roamingconsortium",
    "homesp",
    "fqdn",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    EntryName,
    PayloadMarker,
    NetworkXml,
}

impl MatchPass {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EntryName => "entry_name",
            Self::PayloadMarker => "payload_marker",
            Self::NetworkXml => "network_xml",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub name: String,
    pub bytes: Vec<u8>,
    pub pass: MatchPass,
    /// Entries skipped along the way and why.
    pub notes: Vec<String>,
}

#[derive(Debug, Clone)]
struct EntryMeta {
    index: usize,
    path: String,
    size: u64,
}

struct ArchiveReader<'a> {
    archive: zip::ZipArchive<Cursor<&'a [u8]>>,
    limits: ArchiveLimits,
    expanded: u64,
    notes: Vec<String>,
}

pub fn resolve_archive(
    bytes: &[u8],
    file_name: &str,
    limits: ArchiveLimits,
) -> Result<ResolvedEntry, ConvertError> {
    let unreadable =
        |reason: String| ConvertError::archive_unreadable(file_name, bytes.len(), reason);

    let archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| unreadable(e.to_string()))?;
    if archive.len() > limits.max_entries_per_archive as usize {
        return Err(unreadable(format!(
            "{} entries exceed the limit of {}",
            archive.len(),
            limits.max_entries_per_archive
        )));
    }

    let mut reader = ArchiveReader {
        archive,
        limits,
        expanded: 0,
        notes: Vec::new(),
    };
    let (metas, listing) = reader.enumerate();

    let mut found = reader.pass_entry_name(&metas).map_err(&unreadable)?;
    if found.is_none() {
        found = reader.pass_payload_marker(&metas).map_err(&unreadable)?;
    }
    if found.is_none() {
        found = reader.pass_network_xml(&metas).map_err(&unreadable)?;
    }

    match found {
        Some((meta, entry_bytes, pass)) => {
            tracing::info!(
                archive = file_name,
                entry = %meta.path,
                pass = pass.as_str(),
                size = entry_bytes.len(),
                "resolved archive entry"
            );
            Ok(ResolvedEntry {
                name: meta.path,
                bytes: entry_bytes,
                pass,
                notes: reader.notes,
            })
        }
        None => {
            tracing::warn!(
                archive = file_name,
                entries = listing.len(),
                "no configuration payload in archive"
            );
            Err(ConvertError::archive_unresolved(
                file_name,
                bytes.len(),
                listing,
            ))
        }
    }
}

type Found = Option<(EntryMeta, Vec<u8>, MatchPass)>;

impl ArchiveReader<'_> {
    /// Safe file entries plus the raw name of every file entry for error
    /// listings.
    fn enumerate(&mut self) -> (Vec<EntryMeta>, Vec<String>) {
        let mut metas = Vec::new();
        let mut listing = Vec::new();
        for index in 0..self.archive.len() {
            let file = match self.archive.by_index_raw(index) {
                Ok(file) => file,
                Err(err) => {
                    self.notes.push(format!("entry #{index} skipped: {err}"));
                    continue;
                }
            };
            if file.is_dir() {
                continue;
            }
            let raw_name = file.name().to_string();
            listing.push(raw_name.clone());

            // 0o120000: symlink.
            if let Some(mode) = file.unix_mode()
                && mode & 0o170000 == 0o120000
            {
                self.notes.push(format!("{raw_name}: symlink entry skipped"));
                continue;
            }
            let Some(path) = normalize_archive_entry_path(&raw_name) else {
                self.notes.push(format!("{raw_name}: unsafe path skipped"));
                continue;
            };
            metas.push(EntryMeta {
                index,
                path,
                size: file.size(),
            });
        }
        (metas, listing)
    }

    fn read_entry(&mut self, meta: &EntryMeta, max_bytes: u64) -> Result<Option<Vec<u8>>, String> {
        let mut file = match self.archive.by_index(meta.index) {
            Ok(file) => file,
            Err(zip::result::ZipError::UnsupportedArchive(zip::result::ZipError::PASSWORD_REQUIRED)) => {
                self.notes.push(format!("{}: encrypted entry skipped", meta.path));
                return Ok(None);
            }
            Err(err) => {
                self.notes.push(format!("{}: {err}", meta.path));
                return Ok(None);
            }
        };
        let bytes = match read_to_end_bounded(&mut file, max_bytes) {
            Ok(bytes) => bytes,
            Err(reason) => {
                self.notes.push(format!("{}: {reason}", meta.path));
                return Ok(None);
            }
        };

        self.expanded = self.expanded.saturating_add(bytes.len() as u64);
        if self.expanded > self.limits.max_expanded_bytes_per_archive {
            return Err(format!(
                "expanded size exceeds {} bytes",
                self.limits.max_expanded_bytes_per_archive
            ));
        }
        Ok(Some(bytes))
    }

    fn pass_entry_name(&mut self, metas: &[EntryMeta]) -> Result<Found, String> {
        for meta in metas {
            if !name_matches(&meta.path) {
                continue;
            }
            if let Some(bytes) = self.read_entry(meta, self.limits.max_bytes_per_entry)? {
                return Ok(Some((meta.clone(), bytes, MatchPass::EntryName)));
            }
        }
        Ok(None)
    }

    fn pass_payload_marker(&mut self, metas: &[EntryMeta]) -> Result<Found, String> {
        let bound = self.limits.max_scan_bytes_per_entry;
        for meta in metas.iter().filter(|m| m.size <= bound) {
            let Some(bytes) = self.read_entry(meta, bound)? else {
                continue;
            };
            if has_payload_marker(&bytes) {
                return Ok(Some((meta.clone(), bytes, MatchPass::PayloadMarker)));
            }
        }
        Ok(None)
    }

    fn pass_network_xml(&mut self, metas: &[EntryMeta]) -> Result<Found, String> {
        let bound = self.limits.max_scan_bytes_per_entry;
        let candidates = metas.iter().filter(|m| {
            let lower = m.path.to_ascii_lowercase();
            lower.ends_with(".xml") && !is_office_boilerplate(&lower) && m.size <= bound
        });
        for meta in candidates {
            let Some(bytes) = self.read_entry(meta, bound)? else {
                continue;
            };
            let lower = String::from_utf8_lossy(&bytes).to_ascii_lowercase();
            if NETWORK_KEYWORDS.iter().any(|k| lower.contains(k)) {
                return Ok(Some((meta.clone(), bytes, MatchPass::NetworkXml)));
            }
        }
        Ok(None)
    }
}

fn name_matches(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    NAME_SUFFIXES.iter().any(|s| lower.ends_with(s))
        || NAME_FRAGMENTS.iter().any(|f| lower.contains(f))
}

fn has_payload_marker(bytes: &[u8]) -> bool {
    if bytes.starts_with(BINARY_PLIST_MAGIC) {
        return true;
    }
    let text = String::from_utf8_lossy(bytes);
    PAYLOAD_MARKERS.iter().any(|m| text.contains(m))
}

fn is_office_boilerplate(lower_path: &str) -> bool {
    let base = lower_path.rsplit('/').next().unwrap_or(lower_path);
    base == "[content_types].xml"
        || base == "styles.xml"
        || lower_path.contains("theme")
        || lower_path.contains("/_rels/")
        || OFFICE_PREFIXES.iter().any(|p| lower_path.starts_with(p))
}

pub fn normalize_archive_entry_path(raw: &str) -> Option<String> {
    let path = raw.replace('\\', "/");
    if path.contains('\0') || path.starts_with('/') {
        return None;
    }

    // Windows drive prefixes like "C:".
    let b = path.as_bytes();
    if b.len() >= 2 && b[1] == b':' && b[0].is_ascii_alphabetic() {
        return None;
    }

    let mut segments = Vec::<&str>::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => continue,
            ".." => return None,
            _ => segments.push(seg),
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

fn read_to_end_bounded<R: Read>(reader: &mut R, max_bytes: u64) -> Result<Vec<u8>, String> {
    let mut out = Vec::<u8>::new();
    let mut buf = [0_u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| e.to_string())?;
        if n == 0 {
            break;
        }
        if (out.len() + n) as u64 > max_bytes {
            return Err(format!("entry larger than {max_bytes} bytes"));
        }
        out.extend_from_slice(&buf[..n]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_paths_are_normalized_or_rejected() {
        assert_eq!(
            normalize_archive_entry_path("profiles\\.\\wifi.mobileconfig").as_deref(),
            Some("profiles/wifi.mobileconfig")
        );
        assert_eq!(normalize_archive_entry_path("../etc/passwd"), None);
        assert_eq!(normalize_archive_entry_path("/abs.plist"), None);
        assert_eq!(normalize_archive_entry_path("C:evil.plist"), None);
        assert_eq!(normalize_archive_entry_path("./"), None);
    }

    #[test]
    fn office_boilerplate_is_recognized() {
        for path in [
            "[content_types].xml",
            "_rels/.rels",
            "word/document.xml",
            "xl/workbook.xml",
            "docprops/core.xml",
            "theme/theme1.xml",
            "styles.xml",
        ] {
            assert!(is_office_boilerplate(path), "{path}");
        }
        assert!(!is_office_boilerplate("config/hotspot.xml"));
    }

    #[test]
    fn entry_names_match_case_insensitively() {
        assert!(name_matches("Profiles/Corp.MobileConfig"));
        assert!(name_matches("PASSPOINT-settings.xml"));
        assert!(name_matches("eth_802dot1x.cfg"));
        assert!(!name_matches("readme.txt"));
    }
}

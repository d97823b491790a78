use std::cell::RefCell;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use cfgscrub_domain::{
    AlertKind, CertificateDisplayPolicy, ConversionRequest, ConvertError, FieldTransformPolicy,
    FileKind, RawUpload, RetrySchedule,
};
use cfgscrub_pipeline::{Converter, ConverterSettings};
use cfgscrub_store::{LocalDirStore, ProgressEvent, ProgressSink, ProgressStatus, Sleeper, UploadStore};
use serde_json::{Value, json};
use zip::write::FileOptions;

struct TestDir {
    path: PathBuf,
}

impl TestDir {
    fn new(label: &str) -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "cfgscrub_pipeline_test_{}_{}",
            std::process::id(),
            label.replace(['\\', '/', ':'], "_")
        ));

        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).expect("create temp dir");

        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

#[derive(Default)]
struct RecordingSleeper {
    slept: RefCell<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

#[derive(Default)]
struct RecordingProgress {
    events: RefCell<Vec<(String, ProgressEvent)>>,
}

impl ProgressSink for RecordingProgress {
    fn publish(&self, stream_id: &str, event: &ProgressEvent) {
        self.events
            .borrow_mut()
            .push((stream_id.to_string(), event.clone()));
    }
}

fn make_zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let cursor = Cursor::new(Vec::<u8>::new());
    let mut writer = zip::ZipWriter::new(cursor);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        writer.start_file(*name, options).expect("start zip file");
        writer.write_all(data).expect("write zip data");
    }
    writer.finish().expect("finish zip").into_inner()
}

const WIFI_PROFILE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>PayloadContent</key>
  <array>
    <dict>
      <key>PayloadType</key><string>com.apple.wifi.managed</string>
      <key>SSID_STR</key><string>CorpNet</string>
      <key>Password</key><string>hunter2hunter2</string>
      <key>DisplayedOperatorName</key><string>Example Networks</string>
      <key>DomainName</key><string>example.net</string>
    </dict>
  </array>
  <key>PayloadType</key><string>Configuration</string>
</dict>
</plist>
"#;

fn yaml_of(text: &str) -> Value {
    serde_yaml::from_str(text).expect("yaml output parses")
}

#[test]
fn yaml_secret_is_masked_without_alerts_or_certificates() {
    let upload = RawUpload::new(b"password: \"s3cr3t!\"\n".to_vec(), "net.yaml")
        .with_mime_type("application/yaml");
    let converter = Converter::default();
    let result = converter
        .convert_bytes(&upload, &ConversionRequest::new("t"))
        .expect("converted");

    assert_eq!(yaml_of(&result.yaml), json!({"password": "***REDACTED***"}));
    let json: Value = serde_json::from_str(&result.json).expect("json output parses");
    assert_eq!(json, json!({"password": "***REDACTED***"}));
    assert!(result.alerts.is_empty());
    assert!(result.certificates.is_empty());
    assert_eq!(result.original, "password: \"s3cr3t!\"\n");
    assert_eq!(result.file_kind, FileKind::Yaml);
    assert!(!result.fallback);
    assert!(result.archive_entry.is_none());
    assert!(result.notes.iter().any(|n| n.contains("mask")));
}

#[test]
fn office_archive_is_reported_with_its_entries() {
    let bytes = make_zip_bytes(&[("styles.xml", b"<styles/>"), ("theme.xml", b"<theme/>")]);
    let upload = RawUpload::new(bytes.clone(), "office.zip");
    let err = Converter::default()
        .convert_bytes(&upload, &ConversionRequest::new("t"))
        .expect_err("no profile inside");

    assert_eq!(err.code(), "ARCHIVE_UNRESOLVED");
    let ConvertError::ArchiveUnresolved {
        file_name,
        size,
        entries,
    } = err
    else {
        panic!("expected ArchiveUnresolved");
    };
    assert_eq!(file_name, "office.zip");
    assert_eq!(size, bytes.len());
    assert_eq!(entries, vec!["styles.xml", "theme.xml"]);
}

#[test]
fn text_starting_with_pk_is_not_an_archive() {
    let upload = RawUpload::new(b"PKG_NAME: corp-wifi\npassword: hunter22\n".to_vec(), "net.yaml");
    let result = Converter::default()
        .convert_bytes(&upload, &ConversionRequest::new("t"))
        .expect("converted");

    assert_eq!(result.file_kind, FileKind::Yaml);
    assert!(result.archive_entry.is_none());
    assert_eq!(
        yaml_of(&result.yaml),
        json!({"PKG_NAME": "corp-wifi", "password": "***REDACTED***"})
    );
}

#[test]
fn broken_zip_signature_falls_back_to_content_unless_named_zip() {
    let bytes = b"PK\x03\x04 not an archive, just an odd config blob".to_vec();
    let upload = RawUpload::new(bytes.clone(), "blob.cfg");
    let result = Converter::default()
        .convert_bytes(&upload, &ConversionRequest::new("t"))
        .expect("still converted");

    assert!(result.fallback);
    assert!(result.archive_entry.is_none());
    assert!(result.notes.iter().any(|n| n.contains("not a readable archive")));

    let err = Converter::default()
        .convert_bytes(&RawUpload::new(bytes, "blob.zip"), &ConversionRequest::new("t"))
        .expect_err("a .zip upload must be an archive");
    assert_eq!(err.code(), "ARCHIVE_UNREADABLE");
}

#[test]
fn profile_inside_archive_is_converted() {
    let bytes = make_zip_bytes(&[
        ("readme.txt", b"see attached"),
        ("Corp.mobileconfig", WIFI_PROFILE.as_bytes()),
    ]);
    let upload = RawUpload::new(bytes, "bundle.zip");
    let result = Converter::default()
        .convert_bytes(&upload, &ConversionRequest::new("t"))
        .expect("converted");

    assert_eq!(result.archive_entry.as_deref(), Some("Corp.mobileconfig"));
    assert_eq!(result.file_kind, FileKind::XmlPlist);
    let tree = yaml_of(&result.yaml);
    assert_eq!(tree["PayloadContent"][0]["SSID_STR"], json!("CorpNet"));
    assert_eq!(tree["PayloadContent"][0]["Password"], json!("***REDACTED***"));
    assert!(result.alerts.is_empty());
    assert!(result.notes.iter().any(|n| n.contains("Corp.mobileconfig")));
}

#[test]
fn tiny_profile_gets_an_alert_and_a_diagnostic_summary() {
    let upload = RawUpload::new(b"abc".to_vec(), "tiny.mobileconfig");
    let result = Converter::default()
        .convert_bytes(&upload, &ConversionRequest::new("t"))
        .expect("still converted");

    assert!(result.fallback);
    assert_eq!(result.parser_id, "fallback");
    let kinds: Vec<AlertKind> = result.alerts.iter().map(|a| a.kind).collect();
    assert!(kinds.contains(&AlertKind::EmptyFile));

    let tree = yaml_of(&result.yaml);
    assert_eq!(tree["fileInfo"]["name"], json!("tiny.mobileconfig"));
    assert_eq!(tree["fileInfo"]["size"], json!(3));
    assert_eq!(tree["rawContentPreview"], json!("abc"));
}

#[test]
fn alerts_never_change_the_tree() {
    let truncated = WIFI_PROFILE.replace("</plist>\n", "");
    let whole = Converter::default()
        .convert_bytes(
            &RawUpload::new(WIFI_PROFILE.as_bytes().to_vec(), "Corp.mobileconfig"),
            &ConversionRequest::new("a"),
        )
        .expect("whole");
    let cut = Converter::default()
        .convert_bytes(
            &RawUpload::new(truncated.into_bytes(), "Corp.mobileconfig"),
            &ConversionRequest::new("b"),
        )
        .expect("truncated");

    assert!(whole.alerts.is_empty());
    assert_eq!(cut.alerts.len(), 1);
    assert_eq!(cut.alerts[0].kind, AlertKind::IncompleteXml);
    assert_eq!(yaml_of(&whole.yaml), yaml_of(&cut.yaml));
}

#[test]
fn mapping_is_attached_only_when_asked() {
    let upload = RawUpload::new(WIFI_PROFILE.as_bytes().to_vec(), "Corp.mobileconfig");
    let converter = Converter::default();

    let plain = converter
        .convert_bytes(&upload, &ConversionRequest::new("t"))
        .expect("plain");
    assert!(plain.mapped.is_none());

    let mut request = ConversionRequest::new("t");
    request.include_mapping = true;
    let mapped = converter.convert_bytes(&upload, &request).expect("mapped");
    let profile = mapped.mapped.expect("profile recognized");
    assert_eq!(profile["ssid"], json!("CorpNet"));
    assert_eq!(profile["friendlyName"], json!("Example Networks"));
    assert_eq!(profile["source"], json!("apple_wifi"));
}

#[test]
fn progress_is_published_only_with_a_stream_id() {
    let progress = RecordingProgress::default();
    let converter = Converter::default().with_progress(&progress);
    let upload = RawUpload::new(b"abc".to_vec(), "tiny.mobileconfig");

    converter
        .convert_bytes(&upload, &ConversionRequest::new("quiet"))
        .expect("converted");
    assert!(progress.events.borrow().is_empty());

    let mut request = ConversionRequest::new("loud");
    request.stream_id = Some("s-1".to_string());
    converter.convert_bytes(&upload, &request).expect("converted");
    let statuses: Vec<ProgressStatus> = progress
        .events
        .borrow()
        .iter()
        .map(|(stream, e)| {
            assert_eq!(stream, "s-1");
            e.status
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            ProgressStatus::Started,
            ProgressStatus::Alerts,
            ProgressStatus::Completed
        ]
    );
}

#[test]
fn stored_upload_is_read_from_the_alternate_store() {
    let dir = TestDir::new("alternate");
    let primary = LocalDirStore::new(dir.path().join("primary"));
    let alternate = LocalDirStore::new(dir.path().join("alternate"));
    let token = alternate
        .put(b"password: \"s3cr3t!\"\n", "net.yaml")
        .expect("put");

    let sleeper = RecordingSleeper::default();
    let converter = Converter::default();
    let request = ConversionRequest::new(token.clone())
        .with_policies(FieldTransformPolicy::Hash, CertificateDisplayPolicy::Info);
    let result = converter
        .convert_stored(&primary, Some(&alternate), &sleeper, &request)
        .expect("found in alternate");

    let tree = yaml_of(&result.yaml);
    let hashed = tree["password"].as_str().expect("string");
    assert!(hashed.starts_with("sha256:"));
    assert_eq!(
        sleeper.slept.borrow().iter().sum::<Duration>(),
        RetrySchedule::default().worst_case()
    );
    assert!(result.notes[0].contains("alternate"));
    assert!(alternate.exists(&token));
}

#[test]
fn missing_upload_fails_with_not_found() {
    let dir = TestDir::new("missing");
    let primary = LocalDirStore::new(dir.path().join("primary"));
    let settings = ConverterSettings {
        retry: RetrySchedule {
            max_attempts: 2,
            ..RetrySchedule::default()
        },
        ..ConverterSettings::default()
    };
    let progress = RecordingProgress::default();
    let converter = Converter::new(Default::default(), settings).with_progress(&progress);
    let mut request = ConversionRequest::new("0123456789abcdef_gone.plist");
    request.stream_id = Some("s-2".to_string());

    let err = converter
        .convert_stored(&primary, None, RecordingSleeper::default(), &request)
        .expect_err("never appears");
    assert_eq!(err.code(), "NOT_FOUND");
    let last = progress.events.borrow().last().cloned().expect("events");
    assert_eq!(last.1.status, ProgressStatus::Error);
}

use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Output};

fn cfgscrub_cmd() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cfgscrub"));
    cmd.env("CFGSCRUB_LOG", "warn");
    cmd
}

struct TestDir {
    path: PathBuf,
}

impl TestDir {
    fn new(label: &str) -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "cfgscrub_cli_test_{}_{}",
            std::process::id(),
            label.replace(['\\', '/', ':'], "_")
        ));

        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).expect("create temp dir");

        Self { path }
    }

    fn join(&self, rel: &str) -> PathBuf {
        self.path.join(rel)
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

const SECRET_YAML: &str = "ssid: CorpNet\npassword: \"s3cr3t!\"\n";

const FAST_RETRY_CONFIG: &str = r#"{
  "retry": {"max_attempts": 1, "short_delay_ms": 1, "medium_delay_ms": 1, "long_delay_ms": 1}
}"#;

#[test]
fn help_is_available() {
    let out = cfgscrub_cmd().arg("--help").output().expect("run --help");
    assert!(out.status.success());

    let text = stdout(&out);
    assert!(text.contains("USAGE:"));
    assert!(text.contains("convert-file"));
    assert!(text.contains("rules lint"));
}

#[test]
fn unknown_command_is_usage_error() {
    let out = cfgscrub_cmd().arg("transmogrify").output().expect("run");
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn convert_missing_flags_is_usage_error() {
    let out = cfgscrub_cmd().arg("convert").output().expect("run convert");
    assert_eq!(out.status.code(), Some(3));
    assert!(stderr(&out).contains("--store"));
}

#[test]
fn convert_file_masks_secrets() {
    let dir = TestDir::new("convert_file");
    let input = dir.join("net.yaml");
    std::fs::write(&input, SECRET_YAML).expect("write input");

    let out = cfgscrub_cmd()
        .arg("convert-file")
        .arg("--file")
        .arg(&input)
        .output()
        .expect("run convert-file");
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));

    let tree: serde_yaml::Value = serde_yaml::from_str(&stdout(&out)).expect("yaml on stdout");
    assert_eq!(tree["ssid"].as_str(), Some("CorpNet"));
    assert_eq!(tree["password"].as_str(), Some("***REDACTED***"));
    assert!(!stdout(&out).contains("s3cr3t!"));
}

#[test]
fn convert_file_result_format_carries_the_mapping() {
    let dir = TestDir::new("result_format");
    let input = dir.join("hs20.json");
    std::fs::write(
        &input,
        r#"{"FriendlyName": "Example Roaming", "DomainName": "example.net", "Password": "pw-123456"}"#,
    )
    .expect("write input");

    let out = cfgscrub_cmd()
        .args(["convert-file", "--format", "result", "--map", "--fields", "length", "--file"])
        .arg(&input)
        .output()
        .expect("run convert-file");
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));

    let result: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("json result");
    assert_eq!(result["file_kind"], "json");
    assert_eq!(result["fallback"], false);
    assert!(result["json"].as_str().expect("json text").contains("[LENGTH-9-CHARS]"));
    assert_eq!(result["mapped"]["domain"], "example.net");
    assert_eq!(result["mapped"]["source"], "generic");
}

#[test]
fn map_without_result_format_is_usage_error() {
    let dir = TestDir::new("map_usage");
    let input = dir.join("net.yaml");
    std::fs::write(&input, SECRET_YAML).expect("write input");

    let out = cfgscrub_cmd()
        .args(["convert-file", "--map", "--file"])
        .arg(&input)
        .output()
        .expect("run convert-file");
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn upload_then_convert_by_token() {
    let dir = TestDir::new("upload_convert");
    let input = dir.join("net.yaml");
    std::fs::write(&input, SECRET_YAML).expect("write input");
    let store = dir.join("store");

    let up = cfgscrub_cmd()
        .arg("upload")
        .arg("--store")
        .arg(&store)
        .arg("--file")
        .arg(&input)
        .output()
        .expect("run upload");
    assert_eq!(up.status.code(), Some(0), "{}", stderr(&up));
    let token = stdout(&up).trim().to_string();
    assert!(token.ends_with("_net.yaml"));
    assert!(store.join(&token).is_file());

    let out = cfgscrub_cmd()
        .arg("convert")
        .arg("--store")
        .arg(&store)
        .arg("--token")
        .arg(&token)
        .args(["--format", "json"])
        .output()
        .expect("run convert");
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    let tree: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("json on stdout");
    assert_eq!(tree["password"], "***REDACTED***");
}

#[test]
fn convert_finds_the_upload_in_the_alternate_store() {
    let dir = TestDir::new("alt_store");
    let input = dir.join("net.yaml");
    std::fs::write(&input, SECRET_YAML).expect("write input");
    let config = dir.join("config.json");
    std::fs::write(&config, FAST_RETRY_CONFIG).expect("write config");

    let up = cfgscrub_cmd()
        .arg("upload")
        .arg("--store")
        .arg(dir.join("alt"))
        .arg("--file")
        .arg(&input)
        .output()
        .expect("run upload");
    let token = stdout(&up).trim().to_string();

    let out = cfgscrub_cmd()
        .arg("convert")
        .arg("--store")
        .arg(dir.join("primary"))
        .arg("--alt-store")
        .arg(dir.join("alt"))
        .arg("--token")
        .arg(&token)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("run convert");
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    assert!(stdout(&out).contains("***REDACTED***"));
}

#[test]
fn missing_upload_is_a_conversion_failure() {
    let dir = TestDir::new("missing_upload");
    let config = dir.join("config.json");
    std::fs::write(&config, FAST_RETRY_CONFIG).expect("write config");

    let out = cfgscrub_cmd()
        .arg("convert")
        .arg("--store")
        .arg(dir.join("primary"))
        .args(["--token", "0123456789abcdef_gone.plist", "--config"])
        .arg(&config)
        .output()
        .expect("run convert");
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("NOT_FOUND"));
}

#[test]
fn office_archive_is_a_conversion_failure() {
    let dir = TestDir::new("office_zip");
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::<u8>::new()));
    let options = zip::write::FileOptions::default();
    for (name, data) in [("styles.xml", "<styles/>"), ("theme.xml", "<theme/>")] {
        writer.start_file(name, options).expect("start zip file");
        writer.write_all(data.as_bytes()).expect("write zip data");
    }
    let bytes = writer.finish().expect("finish zip").into_inner();
    let input = dir.join("office.zip");
    std::fs::write(&input, bytes).expect("write zip");

    let out = cfgscrub_cmd()
        .arg("convert-file")
        .arg("--file")
        .arg(&input)
        .output()
        .expect("run convert-file");
    assert_eq!(out.status.code(), Some(2));
    let err = stderr(&out);
    assert!(err.contains("ARCHIVE_UNRESOLVED"));
    assert!(err.contains("styles.xml"));
}

#[test]
fn unknown_config_field_is_usage_error() {
    let dir = TestDir::new("bad_config");
    let input = dir.join("net.yaml");
    std::fs::write(&input, SECRET_YAML).expect("write input");
    let config = dir.join("config.json");
    std::fs::write(&config, r#"{"retries": 3}"#).expect("write config");

    let out = cfgscrub_cmd()
        .arg("convert-file")
        .arg("--file")
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("run convert-file");
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn sniff_reports_kind_and_alerts() {
    let dir = TestDir::new("sniff");
    let input = dir.join("tiny.mobileconfig");
    std::fs::write(&input, "abc").expect("write input");

    let out = cfgscrub_cmd()
        .arg("sniff")
        .arg("--file")
        .arg(&input)
        .output()
        .expect("run sniff");
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    let report: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("json report");
    assert_eq!(report["size"], 3);
    assert_eq!(report["extension"], "mobileconfig");
    let kinds: Vec<&str> = report["alerts"]
        .as_array()
        .expect("alerts array")
        .iter()
        .filter_map(|a| a["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"empty_file"));
}

#[test]
fn sweep_keeps_fresh_uploads() {
    let dir = TestDir::new("sweep");
    let input = dir.join("net.yaml");
    std::fs::write(&input, SECRET_YAML).expect("write input");
    let store = dir.join("store");
    let up = cfgscrub_cmd()
        .arg("upload")
        .arg("--store")
        .arg(&store)
        .arg("--file")
        .arg(&input)
        .output()
        .expect("run upload");
    let token = stdout(&up).trim().to_string();

    let out = cfgscrub_cmd()
        .arg("sweep")
        .arg("--store")
        .arg(&store)
        .args(["--max-age-secs", "3600"])
        .output()
        .expect("run sweep");
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    let report: serde_json::Value = serde_json::from_str(stdout(&out).trim()).expect("json report");
    assert_eq!(report["scanned"], 1);
    assert_eq!(report["deleted"], 0);
    assert!(store.join(&token).is_file());
}

#[test]
fn rules_lint_prints_a_stable_id() {
    let dir = TestDir::new("rules_lint");
    let rules = dir.join("rules.json");
    std::fs::write(
        &rules,
        r#"{"schema_version": "field_rules.v1", "allow": ["WiFiKey"]}"#,
    )
    .expect("write rules");

    let first = cfgscrub_cmd()
        .args(["rules", "lint", "--file"])
        .arg(&rules)
        .output()
        .expect("run rules lint");
    let second = cfgscrub_cmd()
        .args(["rules", "lint", "--file"])
        .arg(&rules)
        .output()
        .expect("run rules lint");
    assert_eq!(first.status.code(), Some(0), "{}", stderr(&first));
    let id = stdout(&first).trim().to_string();
    assert_eq!(id.len(), 64);
    assert_eq!(id, stdout(&second).trim());

    std::fs::write(&rules, r#"{"schema_version": "field_rules.v0"}"#).expect("rewrite rules");
    let bad = cfgscrub_cmd()
        .args(["rules", "lint", "--file"])
        .arg(&rules)
        .output()
        .expect("run rules lint");
    assert_eq!(bad.status.code(), Some(3));
}

#[test]
fn custom_rules_apply_during_conversion() {
    let dir = TestDir::new("custom_rules");
    let rules = dir.join("rules.json");
    std::fs::write(
        &rules,
        r#"{"schema_version": "field_rules.v1", "allow": ["ssid"]}"#,
    )
    .expect("write rules");
    let config = dir.join("config.json");
    let config_json = serde_json::json!({ "field_rules": rules.display().to_string() });
    std::fs::write(&config, config_json.to_string()).expect("write config");
    let input = dir.join("net.yaml");
    std::fs::write(&input, SECRET_YAML).expect("write input");

    let out = cfgscrub_cmd()
        .arg("convert-file")
        .arg("--file")
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("run convert-file");
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    let tree: serde_yaml::Value = serde_yaml::from_str(&stdout(&out)).expect("yaml on stdout");
    assert_eq!(tree["ssid"].as_str(), Some("***REDACTED***"));
    assert_eq!(tree["password"].as_str(), Some("***REDACTED***"));
}

use cfgscrub_domain::{
    CertificateDisplayPolicy, ConversionRequest, ConversionResult, FieldTransformPolicy, RawUpload,
};
use cfgscrub_pipeline::Converter;
use cfgscrub_store::{LocalDirStore, LogProgress, ThreadSleeper, UploadStore};

use super::*;
use crate::runtime_config::RuntimeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Yaml,
    Json,
    Result,
}

impl OutputFormat {
    fn parse(value: &str) -> Result<Self, String> {
        match value {
            "yaml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "result" => Ok(Self::Result),
            _ => Err("--format must be one of yaml, json, result".to_string()),
        }
    }
}

#[derive(Debug)]
struct ConvertArgs {
    store: Option<PathBuf>,
    token: Option<String>,
    file: Option<PathBuf>,
    alt_store: Option<PathBuf>,
    fields: FieldTransformPolicy,
    certs: CertificateDisplayPolicy,
    format: OutputFormat,
    map: bool,
    stream_id: Option<String>,
    config: Option<PathBuf>,
}

pub(super) fn cmd_convert(exe: &str, args: &[String]) -> ExitCode {
    if wants_help(args) {
        print_convert_help(exe);
        return ExitCode::from(EXIT_OK);
    }

    let parsed = match parse_convert_args(args).and_then(|p| validate_stored_args(&p).map(|()| p)) {
        Ok(p) => p,
        Err(msg) => return exit_usage(exe, &msg, print_convert_help),
    };
    let config = match RuntimeConfig::load(parsed.config.as_deref()) {
        Ok(c) => c,
        Err(msg) => return exit_usage(exe, &msg, print_convert_help),
    };
    let rules = match config.field_rules() {
        Ok(r) => r,
        Err(msg) => return exit_usage(exe, &msg, print_convert_help),
    };

    let (Some(store_root), Some(token)) = (parsed.store.as_ref(), parsed.token.as_ref()) else {
        return exit_usage(exe, "--store and --token are required", print_convert_help);
    };
    let primary = LocalDirStore::new(store_root);
    let alternate = parsed
        .alt_store
        .clone()
        .or_else(|| config.alt_store.clone())
        .map(LocalDirStore::new);

    let progress = LogProgress;
    let converter = Converter::new(rules, config.converter_settings()).with_progress(&progress);
    let request = build_request(token.clone(), &parsed);
    let outcome = converter.convert_stored(
        &primary,
        alternate.as_ref().map(|s| s as &dyn UploadStore),
        ThreadSleeper,
        &request,
    );
    finish(outcome, parsed.format)
}

pub(super) fn cmd_convert_file(exe: &str, args: &[String]) -> ExitCode {
    if wants_help(args) {
        print_convert_file_help(exe);
        return ExitCode::from(EXIT_OK);
    }

    let parsed = match parse_convert_args(args).and_then(|p| validate_direct_args(&p).map(|()| p)) {
        Ok(p) => p,
        Err(msg) => return exit_usage(exe, &msg, print_convert_file_help),
    };
    let config = match RuntimeConfig::load(parsed.config.as_deref()) {
        Ok(c) => c,
        Err(msg) => return exit_usage(exe, &msg, print_convert_file_help),
    };
    let rules = match config.field_rules() {
        Ok(r) => r,
        Err(msg) => return exit_usage(exe, &msg, print_convert_file_help),
    };

    let Some(path) = parsed.file.as_ref() else {
        return exit_usage(exe, "--file is required", print_convert_file_help);
    };
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: could not read {}: {e}", path.display());
            return ExitCode::from(EXIT_FATAL);
        }
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let upload = RawUpload::new(bytes, name.clone());

    let progress = LogProgress;
    let converter = Converter::new(rules, config.converter_settings()).with_progress(&progress);
    let request = build_request(name, &parsed);
    finish(converter.convert_bytes(&upload, &request), parsed.format)
}

fn build_request(token: String, parsed: &ConvertArgs) -> ConversionRequest {
    let mut request = ConversionRequest::new(token).with_policies(parsed.fields, parsed.certs);
    request.stream_id = parsed.stream_id.clone();
    request.include_mapping = parsed.map;
    request
}

fn finish(outcome: cfgscrub_domain::Result<ConversionResult>, format: OutputFormat) -> ExitCode {
    let result = match outcome {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {} ({e})", e.code());
            return ExitCode::from(EXIT_CONVERSION_FAILED);
        }
    };

    for alert in &result.alerts {
        tracing::warn!(kind = %alert.kind, severity = %alert.severity, "{}", alert.message);
    }
    for note in &result.notes {
        tracing::info!("{note}");
    }

    match format {
        OutputFormat::Yaml => print!("{}", result.yaml),
        OutputFormat::Json => println!("{}", result.json),
        OutputFormat::Result => match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: could not serialize result: {e}");
                return ExitCode::from(EXIT_FATAL);
            }
        },
    }
    ExitCode::from(EXIT_OK)
}

fn parse_convert_args(args: &[String]) -> Result<ConvertArgs, String> {
    let mut parsed = ConvertArgs {
        store: None,
        token: None,
        file: None,
        alt_store: None,
        fields: FieldTransformPolicy::default(),
        certs: CertificateDisplayPolicy::default(),
        format: OutputFormat::Yaml,
        map: false,
        stream_id: None,
        config: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--store" => {
                i += 1;
                parsed.store = Some(require_path(args, i, "--store")?);
            }
            "--token" => {
                i += 1;
                parsed.token = Some(require_value(args, i, "--token")?);
            }
            "--file" => {
                i += 1;
                parsed.file = Some(require_path(args, i, "--file")?);
            }
            "--alt-store" => {
                i += 1;
                parsed.alt_store = Some(require_path(args, i, "--alt-store")?);
            }
            "--fields" => {
                i += 1;
                let v = require_value(args, i, "--fields")?;
                parsed.fields = v.parse().map_err(|e| format!("--fields: {e}"))?;
            }
            "--certs" => {
                i += 1;
                let v = require_value(args, i, "--certs")?;
                parsed.certs = v.parse().map_err(|e| format!("--certs: {e}"))?;
            }
            "--format" => {
                i += 1;
                parsed.format = OutputFormat::parse(&require_value(args, i, "--format")?)?;
            }
            "--map" => parsed.map = true,
            "--stream-id" => {
                i += 1;
                parsed.stream_id = Some(require_value(args, i, "--stream-id")?);
            }
            "--config" => {
                i += 1;
                parsed.config = Some(require_path(args, i, "--config")?);
            }
            other => return Err(unexpected(other)),
        }
        i += 1;
    }
    Ok(parsed)
}

fn validate_common(args: &ConvertArgs) -> Result<(), String> {
    if args.map && args.format != OutputFormat::Result {
        return Err("--map needs --format result".to_string());
    }
    if let Some(config) = args.config.as_ref() {
        ensure_file_exists(config, "config")?;
    }
    Ok(())
}

fn validate_stored_args(args: &ConvertArgs) -> Result<(), String> {
    if args.store.is_none() {
        return Err("missing required flag --store".to_string());
    }
    if args.token.is_none() {
        return Err("missing required flag --token".to_string());
    }
    if args.file.is_some() {
        return Err("--file belongs to convert-file".to_string());
    }
    validate_common(args)
}

fn validate_direct_args(args: &ConvertArgs) -> Result<(), String> {
    let Some(file) = args.file.as_ref() else {
        return Err("missing required flag --file".to_string());
    };
    if args.store.is_some() || args.token.is_some() || args.alt_store.is_some() {
        return Err("convert-file does not read from a store".to_string());
    }
    ensure_file_exists(file, "input")?;
    validate_common(args)
}

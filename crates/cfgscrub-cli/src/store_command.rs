use std::time::Duration;

use cfgscrub_store::{LocalDirStore, UploadStore};

use super::*;
use crate::runtime_config::RuntimeConfig;

#[derive(Debug)]
struct UploadArgs {
    store: PathBuf,
    file: PathBuf,
    name: Option<String>,
}

pub(super) fn cmd_upload(exe: &str, args: &[String]) -> ExitCode {
    if wants_help(args) {
        print_upload_help(exe);
        return ExitCode::from(EXIT_OK);
    }

    let parsed = match parse_upload_args(args) {
        Ok(p) => p,
        Err(msg) => return exit_usage(exe, &msg, print_upload_help),
    };
    if let Err(msg) = ensure_file_exists(&parsed.file, "input") {
        return exit_usage(exe, &msg, print_upload_help);
    }

    let bytes = match std::fs::read(&parsed.file) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: could not read {}: {e}", parsed.file.display());
            return ExitCode::from(EXIT_FATAL);
        }
    };
    let name = parsed.name.clone().unwrap_or_else(|| {
        parsed
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string())
    });

    let store = LocalDirStore::new(&parsed.store);
    match store.put(&bytes, &name) {
        Ok(token) => {
            println!("{token}");
            ExitCode::from(EXIT_OK)
        }
        Err(e) => {
            eprintln!("error: could not store upload: {e}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn parse_upload_args(args: &[String]) -> Result<UploadArgs, String> {
    let mut store = None;
    let mut file = None;
    let mut name = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--store" => {
                i += 1;
                store = Some(require_path(args, i, "--store")?);
            }
            "--file" => {
                i += 1;
                file = Some(require_path(args, i, "--file")?);
            }
            "--name" => {
                i += 1;
                name = Some(require_value(args, i, "--name")?);
            }
            other => return Err(unexpected(other)),
        }
        i += 1;
    }

    Ok(UploadArgs {
        store: store.ok_or_else(|| "missing required flag --store".to_string())?,
        file: file.ok_or_else(|| "missing required flag --file".to_string())?,
        name,
    })
}

#[derive(Debug)]
struct SweepArgs {
    store: PathBuf,
    max_age_secs: Option<u64>,
    config: Option<PathBuf>,
}

pub(super) fn cmd_sweep(exe: &str, args: &[String]) -> ExitCode {
    if wants_help(args) {
        print_sweep_help(exe);
        return ExitCode::from(EXIT_OK);
    }

    let parsed = match parse_sweep_args(args) {
        Ok(p) => p,
        Err(msg) => return exit_usage(exe, &msg, print_sweep_help),
    };
    let config = match RuntimeConfig::load(parsed.config.as_deref()) {
        Ok(c) => c,
        Err(msg) => return exit_usage(exe, &msg, print_sweep_help),
    };
    let max_age = parsed
        .max_age_secs
        .map_or_else(|| config.retention(), Duration::from_secs);

    let store = LocalDirStore::new(&parsed.store);
    match store.sweep(max_age) {
        Ok(report) => {
            let summary = serde_json::json!({
                "store": parsed.store.display().to_string(),
                "max_age_secs": max_age.as_secs(),
                "scanned": report.scanned,
                "deleted": report.deleted,
                "vanished": report.vanished,
                "failed": report.failed,
            });
            println!("{summary}");
            if report.failed > 0 {
                ExitCode::from(EXIT_FATAL)
            } else {
                ExitCode::from(EXIT_OK)
            }
        }
        Err(e) => {
            eprintln!("error: sweep of {} failed: {e}", parsed.store.display());
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn parse_sweep_args(args: &[String]) -> Result<SweepArgs, String> {
    let mut store = None;
    let mut max_age_secs = None;
    let mut config = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--store" => {
                i += 1;
                store = Some(require_path(args, i, "--store")?);
            }
            "--max-age-secs" => {
                i += 1;
                let v = require_value(args, i, "--max-age-secs")?;
                max_age_secs = Some(
                    v.parse::<u64>()
                        .map_err(|_| "--max-age-secs must be a non-negative integer".to_string())?,
                );
            }
            "--config" => {
                i += 1;
                config = Some(require_path(args, i, "--config")?);
            }
            other => return Err(unexpected(other)),
        }
        i += 1;
    }

    Ok(SweepArgs {
        store: store.ok_or_else(|| "missing required flag --store".to_string())?,
        max_age_secs,
        config,
    })
}

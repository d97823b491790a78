use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod convert_command;
mod inspect_command;
mod runtime_config;
mod store_command;

use convert_command::{cmd_convert, cmd_convert_file};
use inspect_command::{cmd_rules, cmd_sniff};
use store_command::{cmd_sweep, cmd_upload};

const EXIT_OK: u8 = 0;
const EXIT_FATAL: u8 = 1;
const EXIT_CONVERSION_FAILED: u8 = 2;
const EXIT_USAGE: u8 = 3;

const LOG_ENV: &str = "CFGSCRUB_LOG";

fn main() -> ExitCode {
    let mut args = std::env::args().collect::<Vec<String>>();
    let exe = args.first().cloned().unwrap_or_else(|| "cfgscrub".to_string());
    args.remove(0);

    let log_json = args.iter().any(|a| a == "--log-json");
    args.retain(|a| a != "--log-json");
    init_logging(log_json);

    if args.is_empty() || args[0] == "-h" || args[0] == "--help" {
        print_root_help(&exe);
        return ExitCode::from(EXIT_OK);
    }

    match args[0].as_str() {
        "upload" => cmd_upload(&exe, &args[1..]),
        "convert" => cmd_convert(&exe, &args[1..]),
        "convert-file" => cmd_convert_file(&exe, &args[1..]),
        "sweep" => cmd_sweep(&exe, &args[1..]),
        "sniff" => cmd_sniff(&exe, &args[1..]),
        "rules" => cmd_rules(&exe, &args[1..]),
        other => {
            eprintln!("error: unknown command {other:?}");
            eprintln!();
            print_root_help(&exe);
            ExitCode::from(EXIT_USAGE)
        }
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn wants_help(args: &[String]) -> bool {
    args.iter().any(|a| a == "-h" || a == "--help")
}

fn exit_usage(exe: &str, message: &str, help: fn(&str)) -> ExitCode {
    eprintln!("error: {message}");
    eprintln!();
    help(exe);
    ExitCode::from(EXIT_USAGE)
}

fn require_value(args: &[String], i: usize, flag: &'static str) -> Result<String, String> {
    let value = args
        .get(i)
        .ok_or_else(|| format!("missing value for {flag}"))?;
    if value.starts_with("--") {
        return Err(format!("missing value for {flag}"));
    }
    Ok(value.clone())
}

fn require_path(args: &[String], i: usize, flag: &'static str) -> Result<PathBuf, String> {
    require_value(args, i, flag).map(PathBuf::from)
}

fn ensure_file_exists(path: &Path, kind: &str) -> Result<(), String> {
    let meta = std::fs::metadata(path)
        .map_err(|_| format!("{kind} path does not exist or is not accessible: {}", path.display()))?;
    if !meta.is_file() {
        return Err(format!("{kind} path must be a file: {}", path.display()));
    }
    Ok(())
}

fn unexpected(flag: &str) -> String {
    if flag.starts_with('-') {
        format!("unknown flag {flag}")
    } else {
        format!("unexpected argument {flag:?}")
    }
}

fn print_root_help(exe: &str) {
    println!("cfgscrub (configuration normalization and redaction)");
    println!();
    println!("USAGE:");
    println!("  {exe} <COMMAND> [FLAGS]");
    println!();
    println!("COMMANDS:");
    println!("  upload         Store a file and print its token");
    println!("  convert        Convert a stored upload by token");
    println!("  convert-file   Convert a file directly, without storage");
    println!("  sweep          Delete stored uploads past the retention window");
    println!("  sniff          Report the detected kind and structural alerts of a file");
    println!("  rules lint     Validate a field rules file and print its rules id");
    println!();
    println!("GLOBAL:");
    println!("  --log-json     Emit logs as JSON lines on stderr");
    println!("  {LOG_ENV}=<filter> sets the log filter (default: info)");
    println!();
    println!("Run '{exe} <COMMAND> --help' for command-specific help.");
}

fn print_upload_help(exe: &str) {
    println!("USAGE:");
    println!("  {exe} upload --store <DIR> --file <PATH> [--name <NAME>]");
    println!();
    println!("REQUIRED:");
    println!("  --store <DIR>    Upload store root");
    println!("  --file <PATH>    File to store");
    println!();
    println!("OPTIONAL:");
    println!("  --name <NAME>    Original file name to record (default: file name of --file)");
}

fn print_convert_help(exe: &str) {
    println!("USAGE:");
    println!("  {exe} convert --store <DIR> --token <TOKEN> [FLAGS]");
    println!();
    println!("REQUIRED:");
    println!("  --store <DIR>      Primary upload store root");
    println!("  --token <TOKEN>    Token printed by upload");
    println!();
    print_conversion_flags();
    println!("  --alt-store <DIR>      Alternate store checked after the primary gives up");
}

fn print_convert_file_help(exe: &str) {
    println!("USAGE:");
    println!("  {exe} convert-file --file <PATH> [FLAGS]");
    println!();
    println!("REQUIRED:");
    println!("  --file <PATH>    File to convert");
    println!();
    print_conversion_flags();
}

fn print_conversion_flags() {
    println!("OPTIONAL:");
    println!("  --fields mask|partial|hash|length|base64|none   Default: mask");
    println!("  --certs info|hash|truncate|obfuscate|preserve   Default: info");
    println!("  --format yaml|json|result   Default: yaml");
    println!("  --map                  Attach the network profile mapping (needs --format result)");
    println!("  --stream-id <ID>       Publish progress events under this stream id");
    println!("  --config <PATH>        Runtime configuration JSON");
}

fn print_sweep_help(exe: &str) {
    println!("USAGE:");
    println!("  {exe} sweep --store <DIR> [--max-age-secs <N>] [--config <PATH>]");
    println!();
    println!("REQUIRED:");
    println!("  --store <DIR>    Upload store root");
    println!();
    println!("OPTIONAL:");
    println!("  --max-age-secs <N>   Retention window (default: retention_secs from config, else 3600)");
    println!("  --config <PATH>      Runtime configuration JSON");
}

fn print_sniff_help(exe: &str) {
    println!("USAGE:");
    println!("  {exe} sniff --file <PATH>");
    println!();
    println!("REQUIRED:");
    println!("  --file <PATH>    File to inspect");
}

fn print_rules_help(exe: &str) {
    println!("USAGE:");
    println!("  {exe} rules <SUBCOMMAND> [FLAGS]");
    println!();
    println!("SUBCOMMANDS:");
    println!("  lint   Validate a field rules file and print its rules id");
}

fn print_rules_lint_help(exe: &str) {
    println!("USAGE:");
    println!("  {exe} rules lint --file <PATH>");
    println!();
    println!("REQUIRED:");
    println!("  --file <PATH>    Field rules JSON (schema_version \"field_rules.v1\")");
}

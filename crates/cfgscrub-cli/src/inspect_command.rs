use cfgscrub_detect::detect_alerts;
use cfgscrub_domain::extension_of;
use cfgscrub_extract::sniff;
use cfgscrub_policy::FieldRules;

use super::*;

fn parse_file_flag(args: &[String]) -> Result<PathBuf, String> {
    let mut file = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--file" => {
                i += 1;
                file = Some(require_path(args, i, "--file")?);
            }
            other => return Err(unexpected(other)),
        }
        i += 1;
    }
    let file = file.ok_or_else(|| "missing required flag --file".to_string())?;
    ensure_file_exists(&file, "input")?;
    Ok(file)
}

pub(super) fn cmd_sniff(exe: &str, args: &[String]) -> ExitCode {
    if wants_help(args) {
        print_sniff_help(exe);
        return ExitCode::from(EXIT_OK);
    }

    let path = match parse_file_flag(args) {
        Ok(p) => p,
        Err(msg) => return exit_usage(exe, &msg, print_sniff_help),
    };
    let bytes = match std::fs::read(&path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: could not read {}: {e}", path.display());
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = extension_of(&name);
    let sniffed = sniff(&bytes, extension.as_deref());
    let alerts = detect_alerts(&name, extension.as_deref(), &bytes);

    let report = serde_json::json!({
        "file": name,
        "extension": extension,
        "kind": sniffed.kind.as_str(),
        "size": sniffed.profile.size,
        "printable_ratio": (sniffed.profile.printable_ratio * 100.0).round() / 100.0,
        "has_null_bytes": sniffed.profile.has_nul,
        "hex_preview": sniffed.profile.hex_preview,
        "alerts": alerts,
    });
    match serde_json::to_string_pretty(&report) {
        Ok(text) => {
            println!("{text}");
            ExitCode::from(EXIT_OK)
        }
        Err(e) => {
            eprintln!("error: could not serialize sniff report: {e}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

pub(super) fn cmd_rules(exe: &str, args: &[String]) -> ExitCode {
    if args.is_empty() || args[0] == "-h" || args[0] == "--help" {
        print_rules_help(exe);
        return ExitCode::from(EXIT_OK);
    }

    match args[0].as_str() {
        "lint" => cmd_rules_lint(exe, &args[1..]),
        other => {
            eprintln!("error: unknown rules subcommand {other:?}");
            eprintln!();
            print_rules_help(exe);
            ExitCode::from(EXIT_USAGE)
        }
    }
}

fn cmd_rules_lint(exe: &str, args: &[String]) -> ExitCode {
    if wants_help(args) {
        print_rules_lint_help(exe);
        return ExitCode::from(EXIT_OK);
    }

    let path = match parse_file_flag(args) {
        Ok(p) => p,
        Err(msg) => return exit_usage(exe, &msg, print_rules_lint_help),
    };

    match FieldRules::load(&path) {
        Ok(rules) => {
            println!("{}", rules.rules_id());
            ExitCode::from(EXIT_OK)
        }
        Err(e) => exit_usage(exe, &format!("field rules are invalid: {e}"), print_rules_lint_help),
    }
}

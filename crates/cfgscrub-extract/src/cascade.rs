use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use cfgscrub_domain::{CascadeLimits, FileKind, ParseError, ParseErrorCode, ParseTree};

use crate::embedded::{Base64WrappedStrategy, EmbeddedPlistStrategy};
use crate::fallback::{FALLBACK_PARSER_ID, fallback_tree};
use crate::property_list::{DoctypeRepairStrategy, PlistStrategy};
use crate::text::{JsonStrategy, KeyValueStrategy, YamlStrategy};
use crate::xml::XmlStrategy;

/// What every strategy sees. Bytes are shared so an abandoned worker can keep
/// its copy alive without holding up the caller.
#[derive(Debug, Clone)]
pub struct ParseInput {
    pub bytes: Arc<[u8]>,
    pub name: String,
    pub extension: Option<String>,
    pub kind: FileKind,
    pub limits: CascadeLimits,
}

impl ParseInput {
    pub fn new(
        bytes: &[u8],
        name: &str,
        extension: Option<&str>,
        kind: FileKind,
        limits: CascadeLimits,
    ) -> Self {
        Self {
            bytes: Arc::from(bytes),
            name: name.to_string(),
            extension: extension.map(str::to_string),
            kind,
            limits,
        }
    }
}

pub trait ParseStrategy: Send + Sync {
    fn id(&self) -> &'static str;

    /// File kind reported when this strategy succeeds on an unidentified input.
    fn yields(&self) -> FileKind;

    fn parse(&self, input: &ParseInput) -> Result<ParseTree, ParseError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseAttempt {
    pub parser_id: &'static str,
    pub error: ParseError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub tree: ParseTree,
    pub parser_id: &'static str,
    pub file_kind: FileKind,
    pub attempts: Vec<ParseAttempt>,
    pub fallback: bool,
}

static PLIST: PlistStrategy = PlistStrategy;
static DOCTYPE_REPAIR: DoctypeRepairStrategy = DoctypeRepairStrategy;
static XML: XmlStrategy = XmlStrategy;
static EMBEDDED: EmbeddedPlistStrategy = EmbeddedPlistStrategy;
static BASE64: Base64WrappedStrategy = Base64WrappedStrategy;
static JSON: JsonStrategy = JsonStrategy;
static YAML: YamlStrategy = YamlStrategy;
static KEY_VALUE: KeyValueStrategy = KeyValueStrategy;

pub fn strategy_order(kind: FileKind, extension: Option<&str>) -> Vec<&'static dyn ParseStrategy> {
    let base: Vec<&'static dyn ParseStrategy> = match kind {
        FileKind::BinaryPlist | FileKind::XmlPlist => {
            vec![&PLIST, &DOCTYPE_REPAIR, &XML, &EMBEDDED]
        }
        FileKind::Xml => vec![&XML, &PLIST, &DOCTYPE_REPAIR, &EMBEDDED],
        FileKind::Json => vec![&JSON, &YAML, &KEY_VALUE],
        FileKind::Yaml => vec![&YAML, &JSON, &KEY_VALUE],
        FileKind::KeyValue => vec![&KEY_VALUE, &YAML],
        FileKind::Zip => vec![&EMBEDDED],
        FileKind::Unknown => vec![&PLIST, &EMBEDDED, &BASE64, &JSON, &YAML, &KEY_VALUE],
    };

    if !matches!(extension, Some("mobileconfig" | "plist")) {
        return base;
    }
    let mut order: Vec<&'static dyn ParseStrategy> = vec![&PLIST, &EMBEDDED];
    for s in base {
        if !order.iter().any(|o| o.id() == s.id()) {
            order.push(s);
        }
    }
    order
}

/// The sniffed tag survives only when its own first strategy won.
fn reported_kind(tagged: FileKind, winner: &dyn ParseStrategy) -> FileKind {
    if tagged == FileKind::Unknown {
        return winner.yields();
    }
    let primary = strategy_order(tagged, None).first().map(|s| s.id());
    if primary == Some(winner.id()) {
        tagged
    } else {
        winner.yields()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParserCascade {
    limits: CascadeLimits,
}

impl ParserCascade {
    pub fn new(limits: CascadeLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &CascadeLimits {
        &self.limits
    }

    pub fn parse(
        &self,
        bytes: &[u8],
        name: &str,
        extension: Option<&str>,
        kind: FileKind,
    ) -> ParseOutcome {
        let input = ParseInput::new(bytes, name, extension, kind, self.limits);
        self.run(&strategy_order(kind, extension), input)
    }

    /// Folds `strategies` left to right and stops at the first success. Never
    /// fails: exhaustion ends in the diagnostic fallback.
    pub fn run(&self, strategies: &[&'static dyn ParseStrategy], input: ParseInput) -> ParseOutcome {
        let input = Arc::new(input);
        let budget = self.limits.parse_budget();
        let mut attempts = Vec::<ParseAttempt>::new();

        for strategy in strategies.iter().copied() {
            let started = Instant::now();
            match run_attempt(strategy, &input, budget) {
                Ok(tree) => {
                    tracing::debug!(
                        parser = strategy.id(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        failed_before = attempts.len(),
                        "parse strategy succeeded"
                    );
                    let file_kind = reported_kind(input.kind, strategy);
                    return ParseOutcome {
                        tree,
                        parser_id: strategy.id(),
                        file_kind,
                        attempts,
                        fallback: false,
                    };
                }
                Err(error) => {
                    tracing::debug!(
                        parser = strategy.id(),
                        code = %error.code,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "parse strategy failed"
                    );
                    attempts.push(ParseAttempt {
                        parser_id: strategy.id(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            name = %input.name,
            size = input.bytes.len(),
            attempts = attempts.len(),
            "every parse strategy failed, using diagnostic fallback"
        );
        ParseOutcome {
            tree: fallback_tree(&input, &attempts),
            parser_id: FALLBACK_PARSER_ID,
            file_kind: input.kind,
            attempts,
            fallback: true,
        }
    }
}

/// Runs one strategy on a worker thread. Past the budget the worker is
/// abandoned and keeps running detached until it finishes on its own.
fn run_attempt(
    strategy: &'static dyn ParseStrategy,
    input: &Arc<ParseInput>,
    budget: Duration,
) -> Result<ParseTree, ParseError> {
    let (tx, rx) = mpsc::channel();
    let worker_input = Arc::clone(input);
    let spawned = thread::Builder::new()
        .name(format!("cfgscrub-parse-{}", strategy.id()))
        .spawn(move || {
            let _ = tx.send(strategy.parse(&worker_input));
        });
    if spawned.is_err() {
        return strategy.parse(input);
    }

    match rx.recv_timeout(budget) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(ParseError::new(
            ParseErrorCode::TimedOut,
            format!("no result within {} ms", budget.as_millis()),
        )),
        Err(RecvTimeoutError::Disconnected) => Err(ParseError::new(
            ParseErrorCode::WorkerPanicked,
            "parser worker exited without a result",
        )),
    }
}

//! One conversion, end to end: gate, sniff, archive, cascade, alerts,
//! redaction, certificates, optional mapping, serialization.

use cfgscrub_detect::{AlertDetector, DetectorSettings, MalformationDetector};
use cfgscrub_domain::{
    ArchiveLimits, CascadeLimits, ConversionRequest, ConversionResult, ConvertError, FileKind,
    ParseTree, RawUpload, Result, RetrySchedule, extension_of,
};
use cfgscrub_extract::{ParseOutcome, ParserCascade, resolve_archive, sniff, sniff_content};
use cfgscrub_policy::FieldRules;
use cfgscrub_store::{
    Location, NoopProgress, ProgressEvent, ProgressSink, ProgressStatus, RetryGate, Sleeper,
    UploadStore, original_name_of,
};
use cfgscrub_transform::{CertificateHandler, Redactor, map_profile};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConverterSettings {
    pub cascade: CascadeLimits,
    pub archive: ArchiveLimits,
    pub retry: RetrySchedule,
    pub detector: DetectorSettings,
}

pub struct Converter<'a> {
    rules: FieldRules,
    settings: ConverterSettings,
    progress: &'a dyn ProgressSink,
}

static NOOP_PROGRESS: NoopProgress = NoopProgress;

impl Default for Converter<'_> {
    fn default() -> Self {
        Self::new(FieldRules::default(), ConverterSettings::default())
    }
}

impl<'a> Converter<'a> {
    pub fn new(rules: FieldRules, settings: ConverterSettings) -> Self {
        Self {
            rules,
            settings,
            progress: &NOOP_PROGRESS,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn rules(&self) -> &FieldRules {
        &self.rules
    }

    pub fn settings(&self) -> &ConverterSettings {
        &self.settings
    }

    /// Waits for the upload to become visible, reads it and converts it. The
    /// upload is left in place for the sweep.
    pub fn convert_stored<S: Sleeper>(
        &self,
        primary: &dyn UploadStore,
        alternate: Option<&dyn UploadStore>,
        sleeper: S,
        request: &ConversionRequest,
    ) -> Result<ConversionResult> {
        self.publish(request, ProgressStatus::Started, format!("converting {}", request.token));

        let outcome = self.read_stored(primary, alternate, sleeper, request).and_then(|(upload, note)| {
            let mut result = self.convert_inner(&upload, request)?;
            if let Some(note) = note {
                result.notes.insert(0, note);
            }
            Ok(result)
        });
        self.finish(request, outcome)
    }

    pub fn convert_bytes(&self, upload: &RawUpload, request: &ConversionRequest) -> Result<ConversionResult> {
        self.publish(
            request,
            ProgressStatus::Started,
            format!("converting {}", upload.original_name),
        );
        let outcome = self.convert_inner(upload, request);
        self.finish(request, outcome)
    }

    fn read_stored<S: Sleeper>(
        &self,
        primary: &dyn UploadStore,
        alternate: Option<&dyn UploadStore>,
        sleeper: S,
        request: &ConversionRequest,
    ) -> Result<(RawUpload, Option<String>)> {
        let token = request.token.as_str();
        let gate = RetryGate::new(primary, self.settings.retry, sleeper).with_alternate(alternate);
        let resolution = gate.resolve(token)?;
        let bytes = gate
            .store(resolution.location)
            .get(token)
            .map_err(|e| ConvertError::storage(token, e))?;

        let note = (resolution.primary_checks > 1 || resolution.location != Location::Primary)
            .then(|| {
                format!(
                    "upload found in {} store after {} check(s), waited {} ms",
                    resolution.location.as_str(),
                    resolution.primary_checks,
                    resolution.waited.as_millis()
                )
            });
        Ok((RawUpload::new(bytes, original_name_of(token)), note))
    }

    fn convert_inner(&self, upload: &RawUpload, request: &ConversionRequest) -> Result<ConversionResult> {
        let mut notes = Vec::new();

        let sniffed = sniff(&upload.bytes, upload.extension.as_deref());
        tracing::debug!(
            file = %upload.original_name,
            size = upload.size(),
            mime = upload.mime_type.as_deref().unwrap_or("-"),
            kind = %sniffed.kind,
            "sniffed upload"
        );

        let mut work_name = upload.original_name.clone();
        let mut work_ext = upload.extension.clone();
        let mut kind = sniffed.kind;
        let mut archive_entry = None;

        let resolved = if sniffed.kind == FileKind::Zip {
            match resolve_archive(&upload.bytes, &upload.original_name, self.settings.archive) {
                Ok(entry) => Some(entry),
                // Only `.zip` uploads must open as archives.
                Err(ConvertError::ArchiveUnreadable { reason, .. })
                    if upload.extension.as_deref() != Some("zip") =>
                {
                    kind = sniff_content(&upload.bytes, upload.extension.as_deref()).kind;
                    tracing::warn!(
                        file = %upload.original_name,
                        reason = %reason,
                        kind = %kind,
                        "ZIP signature without a readable archive, parsing as content"
                    );
                    notes.push(format!(
                        "{} starts with a ZIP signature but is not a readable archive ({reason}); parsed as {kind}",
                        upload.original_name
                    ));
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let entry_bytes;
        let work_bytes: &[u8] = if let Some(entry) = resolved {
            notes.push(format!(
                "archive entry {} selected by {} match",
                entry.name,
                entry.pass.as_str()
            ));
            notes.extend(entry.notes.iter().cloned());
            work_ext = extension_of(&entry.name);
            kind = sniff(&entry.bytes, work_ext.as_deref()).kind;
            work_name = entry.name.clone();
            archive_entry = Some(entry.name);
            entry_bytes = entry.bytes;
            &entry_bytes
        } else {
            &upload.bytes
        };

        let detector = MalformationDetector::new(self.settings.detector);
        let alerts = detector.detect(&work_name, work_ext.as_deref(), work_bytes);
        if !alerts.is_empty() {
            self.publish(
                request,
                ProgressStatus::Alerts,
                format!("{} structural alert(s)", alerts.len()),
            );
        }

        let cascade = ParserCascade::new(self.settings.cascade);
        let outcome = cascade.parse(work_bytes, &work_name, work_ext.as_deref(), kind);
        notes.push(parse_note(&outcome));

        let (redacted, report) = Redactor::new(&self.rules, request.field_policy).apply(&outcome.tree);
        if report.total() > 0 {
            notes.push(format!(
                "{} field(s) rewritten with {} policy (field rules {})",
                report.total(),
                report.policy,
                self.rules.rules_id().short_hex()
            ));
        }
        if report.total() > 0 && report.policy.is_reversible() {
            notes.push(format!(
                "{} output is reversible and is not a security control",
                report.policy
            ));
        }
        if report.already_marked > 0 {
            notes.push(format!(
                "{} field(s) already carried a redaction marker",
                report.already_marked
            ));
        }

        let (tree, certificates) =
            CertificateHandler::new(&self.rules, request.certificate_policy).apply(&redacted);
        if !certificates.is_empty() {
            notes.push(format!(
                "{} certificate value(s) shown with {} policy",
                certificates.len(),
                request.certificate_policy
            ));
        }

        let mapped = if request.include_mapping {
            let mapped = map_profile(&tree);
            match &mapped {
                Some(m) => notes.push(format!("mapped as {} profile", m.source)),
                None => notes.push("no network profile recognized for mapping".to_string()),
            }
            mapped.map(|m| m.to_tree())
        } else {
            None
        };

        let (yaml, json) = serialize(&tree)?;

        tracing::info!(
            file = %upload.original_name,
            parser = outcome.parser_id,
            kind = %outcome.file_kind,
            fallback = outcome.fallback,
            alerts = alerts.len(),
            certificates = certificates.len(),
            "conversion finished"
        );

        Ok(ConversionResult {
            yaml,
            json,
            original: String::from_utf8_lossy(&upload.bytes).into_owned(),
            certificates,
            alerts,
            notes,
            file_kind: outcome.file_kind,
            parser_id: outcome.parser_id.to_string(),
            fallback: outcome.fallback,
            archive_entry,
            mapped,
        })
    }

    fn finish(&self, request: &ConversionRequest, outcome: Result<ConversionResult>) -> Result<ConversionResult> {
        match &outcome {
            Ok(result) => self.publish(
                request,
                ProgressStatus::Completed,
                format!("parsed by {}", result.parser_id),
            ),
            Err(e) => {
                tracing::warn!(token = %request.token, code = e.code(), "conversion failed");
                self.publish(request, ProgressStatus::Error, e.to_string());
            }
        }
        outcome
    }

    fn publish(&self, request: &ConversionRequest, status: ProgressStatus, message: String) {
        if let Some(stream_id) = request.stream_id.as_deref() {
            self.progress.publish(stream_id, &ProgressEvent::new(status, message));
        }
    }
}

fn parse_note(outcome: &ParseOutcome) -> String {
    if outcome.fallback {
        let tried: Vec<&str> = outcome.attempts.iter().map(|a| a.parser_id).collect();
        format!(
            "no parser accepted the content (tried {}); showing diagnostic summary",
            tried.join(", ")
        )
    } else {
        format!("parsed by {} as {}", outcome.parser_id, outcome.file_kind)
    }
}

pub fn serialize(tree: &ParseTree) -> Result<(String, String)> {
    let yaml = serde_yaml::to_string(tree).map_err(|e| ConvertError::serialize("yaml", e.to_string()))?;
    let json =
        serde_json::to_string_pretty(tree).map_err(|e| ConvertError::serialize("json", e.to_string()))?;
    Ok((yaml, json))
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use cfgscrub_domain::{ArchiveLimits, CascadeLimits, DEFAULT_RETENTION, RetrySchedule};
use cfgscrub_pipeline::ConverterSettings;
use cfgscrub_policy::FieldRules;
use serde::Deserialize;

/// Runtime overrides loaded from `--config`. Every field has a compiled-in
/// default, so `{}` is a valid file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RuntimeConfig {
    pub retry: RetrySchedule,
    pub retention_secs: u64,
    pub parse_budget_ms: u64,
    pub archive: ArchiveLimits,
    pub alt_store: Option<PathBuf>,
    pub field_rules: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            retry: RetrySchedule::default(),
            retention_secs: DEFAULT_RETENTION.as_secs(),
            parse_budget_ms: CascadeLimits::default().parse_budget_ms,
            archive: ArchiveLimits::default(),
            alt_store: None,
            field_rules: None,
        }
    }
}

impl RuntimeConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("config file {} is unreadable: {e}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| format!("config file {} is invalid: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.parse_budget_ms == 0 {
            return Err("parse_budget_ms must be >= 1".to_string());
        }
        if self.archive.max_entries_per_archive == 0 {
            return Err("archive.max_entries_per_archive must be >= 1".to_string());
        }
        if self.archive.max_scan_bytes_per_entry > self.archive.max_bytes_per_entry {
            return Err(
                "archive.max_scan_bytes_per_entry must not exceed archive.max_bytes_per_entry"
                    .to_string(),
            );
        }
        Ok(())
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn converter_settings(&self) -> ConverterSettings {
        ConverterSettings {
            cascade: CascadeLimits {
                parse_budget_ms: self.parse_budget_ms,
                ..CascadeLimits::default()
            },
            archive: self.archive,
            retry: self.retry,
            ..ConverterSettings::default()
        }
    }

    pub fn field_rules(&self) -> Result<FieldRules, String> {
        match self.field_rules.as_deref() {
            Some(path) => FieldRules::load(path)
                .map_err(|e| format!("field rules {}: {e}", path.display())),
            None => Ok(FieldRules::default()),
        }
    }
}

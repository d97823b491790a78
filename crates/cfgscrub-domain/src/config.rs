use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveLimits {
    pub max_entries_per_archive: u32,
    pub max_bytes_per_entry: u64,
    pub max_scan_bytes_per_entry: u64,
    pub max_expanded_bytes_per_archive: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries_per_archive: 10_000,
            max_bytes_per_entry: 64 * 1024 * 1024,
            max_scan_bytes_per_entry: 1024 * 1024,
            max_expanded_bytes_per_archive: 512 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CascadeLimits {
    pub parse_budget_ms: u64,
    pub max_xml_depth: u32,
    pub max_xml_children: u32,
    pub max_xml_attributes: u32,
    pub preview_chars: u32,
}

impl CascadeLimits {
    pub fn parse_budget(&self) -> Duration {
        Duration::from_millis(self.parse_budget_ms)
    }
}

impl Default for CascadeLimits {
    fn default() -> Self {
        Self {
            parse_budget_ms: 30_000,
            max_xml_depth: 64,
            max_xml_children: 10_000,
            max_xml_attributes: 64,
            preview_chars: 1_000,
        }
    }
}

/// Step-function delays for the absence gate: a few short waits, a few medium
/// waits, then long waits until `max_attempts` is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySchedule {
    pub max_attempts: u32,
    pub short_attempts: u32,
    pub medium_attempts: u32,
    pub short_delay_ms: u64,
    pub medium_delay_ms: u64,
    pub long_delay_ms: u64,
}

impl RetrySchedule {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = if attempt <= self.short_attempts {
            self.short_delay_ms
        } else if attempt <= self.short_attempts.saturating_add(self.medium_attempts) {
            self.medium_delay_ms
        } else {
            self.long_delay_ms
        };
        Duration::from_millis(ms)
    }

    pub fn worst_case(&self) -> Duration {
        (1..=self.max_attempts).map(|a| self.delay_for(a)).sum()
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            short_attempts: 3,
            medium_attempts: 3,
            short_delay_ms: 100,
            medium_delay_ms: 500,
            long_delay_ms: 1_000,
        }
    }
}

//! Fire-and-forget progress channel. The pipeline never waits on a sink and
//! never learns whether an event was delivered.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Started,
    Alerts,
    Completed,
    Error,
}

impl ProgressStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Alerts => "alerts",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(status: ProgressStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

pub trait ProgressSink {
    fn publish(&self, stream_id: &str, event: &ProgressEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn publish(&self, _stream_id: &str, _event: &ProgressEvent) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn publish(&self, stream_id: &str, event: &ProgressEvent) {
        tracing::info!(
            stream = stream_id,
            status = %event.status,
            message = %event.message,
            "progress"
        );
    }
}

use prism_core::{LogEntryId, Platform};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Info,
    Action,
    Thinking,
    Success,
    Error,
    Step,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionLogEntry {
    pub id: LogEntryId,
    pub message: String,
    pub kind: LogKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    /// Local wall-clock capture time, `HH:MM:SS`.
    pub timestamp: String,
}

/// Append-only, in arrival order.
#[derive(Clone, Debug, Default)]
pub struct ActionLog {
    entries: Vec<ActionLogEntry>,
}

impl ActionLog {
    pub(crate) fn append(&mut self, kind: LogKind, platform: Option<Platform>, message: impl Into<String>) {
        self.entries.push(ActionLogEntry {
            id: LogEntryId::new(),
            message: message.into(),
            kind,
            platform,
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
        });
    }

    pub fn entries(&self) -> &[ActionLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: LogKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn last(&self) -> Option<&ActionLogEntry> {
        self.entries.last()
    }
}

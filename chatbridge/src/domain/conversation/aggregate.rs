use super::events::LogChange;
use super::value_object::{EntryDirection, EntryKind, EntryTimestamp, GatedActionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: EntryTimestamp,
    pub direction: EntryDirection,
    #[serde(default)]
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Streaming output that a later same-timestamp update will complete.
    #[serde(default)]
    pub partial: bool,
}

impl LogEntry {
    pub fn new(
        timestamp: EntryTimestamp,
        direction: EntryDirection,
        kind: EntryKind,
        text: Option<String>,
    ) -> Self {
        Self {
            timestamp,
            direction,
            kind,
            text,
            partial: false,
        }
    }

    pub fn engine_text(timestamp: EntryTimestamp, text: impl Into<String>) -> Self {
        Self::new(
            timestamp,
            EntryDirection::FromEngine,
            EntryKind::Text,
            Some(text.into()),
        )
    }

    pub fn question(timestamp: EntryTimestamp, text: impl Into<String>) -> Self {
        Self::new(
            timestamp,
            EntryDirection::ToEngine,
            EntryKind::Text,
            Some(text.into()),
        )
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    /// Plain assistant text carried by this entry, if it is output at all.
    ///
    /// Only engine-originated `Text` entries with a non-empty payload qualify.
    pub fn output_text(&self) -> Option<&str> {
        if self.direction != EntryDirection::FromEngine || self.kind != EntryKind::Text {
            return None;
        }
        self.text.as_deref().filter(|text| !text.is_empty())
    }
}

/// Entry content before the session assigns it a timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub direction: EntryDirection,
    #[serde(default)]
    pub kind: EntryKind,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub partial: bool,
}

impl NewLogEntry {
    pub fn engine_text(text: impl Into<String>) -> Self {
        Self {
            direction: EntryDirection::FromEngine,
            kind: EntryKind::Text,
            text: Some(text.into()),
            partial: false,
        }
    }

    pub fn question(text: impl Into<String>) -> Self {
        Self {
            direction: EntryDirection::ToEngine,
            kind: EntryKind::Text,
            text: Some(text.into()),
            partial: false,
        }
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn stamp(self, timestamp: EntryTimestamp) -> LogEntry {
        LogEntry {
            timestamp,
            direction: self.direction,
            kind: self.kind,
            text: self.text,
            partial: self.partial,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    #[error("entry {timestamp} is older than the last entry {last}")]
    OutOfOrder {
        timestamp: EntryTimestamp,
        last: EntryTimestamp,
    },
    #[error("no entry with timestamp {0}")]
    UnknownEntry(EntryTimestamp),
}

/// Append-only message log ordered by timestamp.
#[derive(Clone, Debug, Default)]
pub struct ConversationLog {
    entries: Vec<LogEntry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<EntryTimestamp> {
        self.entries.last().map(|entry| entry.timestamp)
    }

    /// Next timestamp to hand out: wall clock, bumped past the last entry.
    pub fn next_timestamp(&self) -> EntryTimestamp {
        let now = EntryTimestamp::now();
        match self.last_timestamp() {
            Some(last) if last >= now => last.successor(),
            _ => now,
        }
    }

    pub fn append(&mut self, entry: LogEntry) -> Result<LogChange, LogError> {
        if let Some(last) = self.last_timestamp() {
            if entry.timestamp <= last {
                return Err(LogError::OutOfOrder {
                    timestamp: entry.timestamp,
                    last,
                });
            }
        }
        self.entries.push(entry.clone());
        Ok(LogChange::Appended(entry))
    }

    /// Supersedes the entry sharing `entry.timestamp`.
    pub fn replace(&mut self, entry: LogEntry) -> Result<LogChange, LogError> {
        let index = self
            .entries
            .binary_search_by_key(&entry.timestamp, |existing| existing.timestamp)
            .map_err(|_| LogError::UnknownEntry(entry.timestamp))?;
        self.entries[index] = entry.clone();
        Ok(LogChange::Replaced(entry))
    }
}

/// An engine-initiated action awaiting external approval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingGatedAction {
    pub id: GatedActionId,
    pub description: String,
    pub requested_at: DateTime<Utc>,
}

impl PendingGatedAction {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: GatedActionId::new(),
            description: description.into(),
            requested_at: Utc::now(),
        }
    }
}

use super::aggregate::LogEntry;

/// A mutation of the conversation log as observed by subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogChange {
    Appended(LogEntry),
    /// A later partial update superseding the entry with the same timestamp.
    Replaced(LogEntry),
}

impl LogChange {
    pub fn entry(&self) -> &LogEntry {
        match self {
            LogChange::Appended(entry) | LogChange::Replaced(entry) => entry,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LogChange::Appended(_) => "appended",
            LogChange::Replaced(_) => "replaced",
        }
    }
}

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Creation time of a log entry in epoch milliseconds.
///
/// Timestamps double as entry identity inside a conversation log: a later
/// update carrying the same timestamp supersedes the earlier entry in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryTimestamp(i64);

impl EntryTimestamp {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Smallest timestamp strictly after `self`.
    pub fn successor(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for EntryTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryTimestamp {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|err| format!("invalid entry timestamp {value:?}: {err}"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryDirection {
    /// Assistant or system output produced by the engine.
    FromEngine,
    /// A question the engine directs at the user.
    ToEngine,
}

impl EntryDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryDirection::FromEngine => "from_engine",
            EntryDirection::ToEngine => "to_engine",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    #[default]
    Text,
    Error,
    ToolResult,
    ApiRequest,
    Completion,
    #[serde(other)]
    Other,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Text => "text",
            EntryKind::Error => "error",
            EntryKind::ToolResult => "tool_result",
            EntryKind::ApiRequest => "api_request",
            EntryKind::Completion => "completion",
            EntryKind::Other => "other",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatedActionId(Uuid);

impl GatedActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GatedActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GatedActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

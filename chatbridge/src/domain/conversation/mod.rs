pub mod aggregate;
pub mod events;
pub mod value_object;

pub use aggregate::{ConversationLog, LogEntry, LogError, NewLogEntry, PendingGatedAction};
pub use events::LogChange;
pub use value_object::{EntryDirection, EntryKind, EntryTimestamp, GatedActionId};

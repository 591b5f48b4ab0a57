use crate::domain::conversation::{GatedActionId, LogChange, LogEntry, PendingGatedAction};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Ordered, lossless stream of log mutations for one subscriber.
pub type LogChangeStream = mpsc::UnboundedReceiver<LogChange>;

/// Conversation state owned by the engine. The bridge only reads it, except
/// for the approval effect.
#[async_trait]
pub trait SessionPort: Send + Sync {
    fn entries(&self) -> anyhow::Result<Vec<LogEntry>>;

    fn subscribe_changes(&self) -> anyhow::Result<LogChangeStream>;

    fn pending_action(&self) -> anyhow::Result<Option<PendingGatedAction>>;

    /// Approves the pending action if it is still `id`. Returns whether the
    /// approval took effect.
    async fn approve_action(&self, id: &GatedActionId) -> anyhow::Result<bool>;
}

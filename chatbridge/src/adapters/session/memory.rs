use crate::domain::conversation::{
    ConversationLog, GatedActionId, LogChange, LogEntry, LogError, NewLogEntry, PendingGatedAction,
};
use crate::ports::session::{LogChangeStream, SessionPort};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("gated action {0} is already awaiting approval")]
    ActionPending(GatedActionId),
}

#[derive(Default)]
struct SessionState {
    log: ConversationLog,
    pending: Option<PendingGatedAction>,
    approved: Vec<PendingGatedAction>,
    subscribers: Vec<mpsc::UnboundedSender<LogChange>>,
}

impl SessionState {
    fn publish(&mut self, change: &LogChange) {
        self.subscribers
            .retain(|subscriber| subscriber.send(change.clone()).is_ok());
    }
}

/// In-process conversation session held by the host.
///
/// Every mutation is fanned out to change subscribers while the state lock is
/// held, so each subscriber observes changes in log order.
#[derive(Default)]
pub struct MemorySession {
    state: Mutex<SessionState>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an entry stamped with the next log timestamp.
    pub fn append(&self, draft: NewLogEntry) -> Result<LogEntry, SessionError> {
        let mut state = self.state();
        let entry = draft.stamp(state.log.next_timestamp());
        let change = state.log.append(entry.clone())?;
        debug!(
            timestamp = %entry.timestamp,
            direction = entry.direction.as_str(),
            kind = entry.kind.as_str(),
            "session entry appended"
        );
        state.publish(&change);
        Ok(entry)
    }

    /// Supersedes the entry with the same timestamp, e.g. to extend a
    /// partial assistant message.
    pub fn replace(&self, entry: LogEntry) -> Result<LogEntry, SessionError> {
        let mut state = self.state();
        let change = state.log.replace(entry.clone())?;
        debug!(timestamp = %entry.timestamp, partial = entry.partial, "session entry replaced");
        state.publish(&change);
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.state().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().log.is_empty()
    }

    pub fn request_approval(
        &self,
        description: impl Into<String>,
    ) -> Result<PendingGatedAction, SessionError> {
        let mut state = self.state();
        if let Some(existing) = &state.pending {
            return Err(SessionError::ActionPending(existing.id.clone()));
        }
        let action = PendingGatedAction::new(description);
        state.pending = Some(action.clone());
        debug!(action_id = %action.id, "gated action awaiting approval");
        Ok(action)
    }

    /// Drops the pending action without approving it, as when the engine
    /// abandons the step.
    pub fn withdraw_pending(&self) -> Option<PendingGatedAction> {
        self.state().pending.take()
    }

    pub fn approved_actions(&self) -> Vec<PendingGatedAction> {
        self.state().approved.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|subscriber| !subscriber.is_closed());
        state.subscribers.len()
    }
}

#[async_trait]
impl SessionPort for MemorySession {
    fn entries(&self) -> anyhow::Result<Vec<LogEntry>> {
        Ok(self.state().log.entries().to_vec())
    }

    fn subscribe_changes(&self) -> anyhow::Result<LogChangeStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().subscribers.push(tx);
        Ok(rx)
    }

    fn pending_action(&self) -> anyhow::Result<Option<PendingGatedAction>> {
        Ok(self.state().pending.clone())
    }

    async fn approve_action(&self, id: &GatedActionId) -> anyhow::Result<bool> {
        let mut state = self.state();
        match state.pending.take() {
            Some(action) if &action.id == id => {
                debug!(action_id = %action.id, "gated action approved");
                state.approved.push(action);
                Ok(true)
            }
            other => {
                state.pending = other;
                Ok(false)
            }
        }
    }
}

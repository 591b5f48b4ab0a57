use crate::domain::bridge::{UiCommand, UiEvent};
use async_trait::async_trait;
use tokio::sync::mpsc;

pub type UiEventStream = mpsc::UnboundedReceiver<UiEvent>;

/// One-way, order-preserving message channel to a chat UI.
#[async_trait]
pub trait UiChannelPort: Send + Sync {
    /// Enqueues a command without waiting for the UI to act on it.
    async fn post(&self, command: UiCommand) -> Result<(), UiChannelError>;

    /// Hands out the inbound event stream. Only the first call succeeds.
    fn take_events(&self) -> Option<UiEventStream>;
}

#[derive(Debug, thiserror::Error)]
pub enum UiChannelError {
    #[error("ui channel closed")]
    Closed,
}

use crate::ports::ui::UiChannelError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("no session bound")]
    Unbound,
    #[error("ui channel: {0}")]
    Channel(#[from] UiChannelError),
    #[error("session: {0:#}")]
    Session(anyhow::Error),
    #[error("ui event stream already claimed by another bridge")]
    StreamClaimed,
}

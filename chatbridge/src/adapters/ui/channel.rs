use crate::domain::bridge::{UiCommand, UiEvent};
use crate::ports::ui::{UiChannelError, UiChannelPort, UiEventStream};
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// In-process one-way channel pair between the bridge and a UI.
pub struct ChannelUi {
    commands: mpsc::UnboundedSender<UiCommand>,
    events: Mutex<Option<UiEventStream>>,
}

/// The UI's end of a [`ChannelUi`].
pub struct UiEndpoint {
    pub commands: mpsc::UnboundedReceiver<UiCommand>,
    pub events: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelUi {
    pub fn pair() -> (Self, UiEndpoint) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let ui = Self {
            commands: command_tx,
            events: Mutex::new(Some(event_rx)),
        };
        let endpoint = UiEndpoint {
            commands: command_rx,
            events: event_tx,
        };
        (ui, endpoint)
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

#[async_trait]
impl UiChannelPort for ChannelUi {
    async fn post(&self, command: UiCommand) -> Result<(), UiChannelError> {
        self.commands
            .send(command)
            .map_err(|_| UiChannelError::Closed)
    }

    fn take_events(&self) -> Option<UiEventStream> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

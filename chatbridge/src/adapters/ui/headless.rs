use crate::domain::bridge::{UiCommand, UiEvent};
use crate::ports::ui::{UiChannelError, UiChannelPort, UiEventStream};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Default)]
struct InputBox {
    text: String,
    submissions: Vec<String>,
}

/// A UI with an input field and no rendering, used while no real UI is
/// attached. It answers input requests itself, over its own event stream.
pub struct HeadlessUi {
    input: Mutex<InputBox>,
    events_tx: mpsc::UnboundedSender<UiEvent>,
    events_rx: Mutex<Option<UiEventStream>>,
}

impl HeadlessUi {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            input: Mutex::new(InputBox::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    fn input(&self) -> MutexGuard<'_, InputBox> {
        self.input.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_text(&self) -> String {
        self.input().text.clone()
    }

    pub fn submissions(&self) -> Vec<String> {
        self.input().submissions.clone()
    }
}

impl Default for HeadlessUi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UiChannelPort for HeadlessUi {
    async fn post(&self, command: UiCommand) -> Result<(), UiChannelError> {
        let mut input = self.input();
        match command {
            UiCommand::RequestInput { request_id } => self
                .events_tx
                .send(UiEvent::InputValue {
                    request_id,
                    text: input.text.clone(),
                })
                .map_err(|_| UiChannelError::Closed),
            UiCommand::SetInput { text } => {
                input.text = text;
                Ok(())
            }
            UiCommand::Submit { text } => {
                let current = std::mem::take(&mut input.text);
                let message = text.unwrap_or(current);
                if message.is_empty() {
                    debug!("headless ui ignored empty submit");
                } else {
                    input.submissions.push(message);
                }
                Ok(())
            }
        }
    }

    fn take_events(&self) -> Option<UiEventStream> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

use super::value_object::RequestId;
use serde::{Deserialize, Serialize};

/// Commands the bridge posts to the UI. The channel carries no replies of its
/// own; `RequestInput` is answered later by a matching [`UiEvent::InputValue`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiCommand {
    RequestInput { request_id: RequestId },
    SetInput { text: String },
    /// `text: None` submits whatever the input field currently holds.
    Submit { text: Option<String> },
}

impl UiCommand {
    pub fn name(&self) -> &'static str {
        match self {
            UiCommand::RequestInput { .. } => "request_input",
            UiCommand::SetInput { .. } => "set_input",
            UiCommand::Submit { .. } => "submit",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    InputValue { request_id: RequestId, text: String },
}

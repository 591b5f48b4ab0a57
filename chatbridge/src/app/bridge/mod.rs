pub mod approval;
pub mod error;
pub mod notifier;
pub mod pipeline;
pub mod requests;
pub mod service;

pub use error::BridgeError;
pub use notifier::{OutputNotifier, OutputSubscription};
pub use pipeline::{snapshot_output, spawn_translation_task, OutputTranslator};
pub use requests::{spawn_reply_pump, InputRequestBridge};
pub use service::{BridgeConfig, ChatBridge};

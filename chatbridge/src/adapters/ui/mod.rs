pub mod channel;
pub mod headless;
pub mod websocket;

pub use channel::{ChannelUi, UiEndpoint};
pub use headless::HeadlessUi;
pub use websocket::pump_ui_socket;

pub mod ui_port;

pub use ui_port::{UiChannelError, UiChannelPort, UiEventStream};

pub mod session_port;

pub use session_port::{LogChangeStream, SessionPort};

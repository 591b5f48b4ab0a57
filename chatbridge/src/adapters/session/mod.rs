pub mod memory;

pub use memory::{MemorySession, SessionError};

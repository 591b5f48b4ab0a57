pub mod bridge;
pub mod conversation;

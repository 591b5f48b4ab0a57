pub mod session;
pub mod ui;

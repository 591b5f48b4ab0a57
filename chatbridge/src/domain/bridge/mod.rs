pub mod events;
pub mod value_object;

pub use events::{UiCommand, UiEvent};
pub use value_object::{BindingId, RequestId};

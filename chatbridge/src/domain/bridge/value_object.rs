use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Correlation token carried by an input request and echoed by its reply.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one session/UI attachment of a bridge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingId(Uuid);

impl BindingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BindingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique_and_read_back_from_json() {
        let first = RequestId::new();
        let second = RequestId::new();
        assert_ne!(first, second);
        let parsed: RequestId =
            serde_json::from_value(serde_json::Value::String(first.to_string())).unwrap();
        assert_eq!(parsed, first);
        assert!(serde_json::from_value::<RequestId>(serde_json::json!("not-a-uuid")).is_err());
    }
}

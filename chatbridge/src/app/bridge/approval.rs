use super::error::BridgeError;
use crate::ports::session::SessionPort;
use tracing::{debug, info};

/// Approves the session's pending gated action, if there is one.
///
/// The approval names the action that was pending when the check ran, so an
/// action that replaced it in the meantime is left alone.
pub async fn approve_pending(session: &dyn SessionPort) -> Result<bool, BridgeError> {
    let Some(action) = session.pending_action().map_err(BridgeError::Session)? else {
        debug!("approval requested with nothing pending");
        return Ok(false);
    };

    let approved = session
        .approve_action(&action.id)
        .await
        .map_err(BridgeError::Session)?;
    if approved {
        info!(action_id = %action.id, description = %action.description, "gated action approved");
    } else {
        debug!(action_id = %action.id, "pending action changed before approval");
    }
    Ok(approved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::session::MemorySession;

    #[tokio::test]
    async fn nothing_pending_is_not_approved() {
        let session = MemorySession::new();
        assert!(!approve_pending(&session).await.unwrap());
        assert!(session.approved_actions().is_empty());
    }

    #[tokio::test]
    async fn pending_action_is_approved_exactly_once() {
        let session = MemorySession::new();
        let action = session.request_approval("run shell command").unwrap();

        assert!(approve_pending(&session).await.unwrap());
        assert!(!approve_pending(&session).await.unwrap());

        let approved = session.approved_actions();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id, action.id);
        assert!(session.pending_action().unwrap().is_none());
    }
}

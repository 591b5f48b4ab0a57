use super::error::BridgeError;
use crate::domain::bridge::{BindingId, RequestId, UiCommand, UiEvent};
use crate::ports::ui::{UiChannelPort, UiEventStream};
use crate::telemetry::BridgeMetrics;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

/// Correlates `RequestInput` commands with `InputValue` replies arriving on
/// the UI's one-way event stream.
///
/// Each read registers a waiter under a fresh [`RequestId`]. A reply resolves
/// only the waiter with the same id, so overlapping reads never steal each
/// other's answers. Waiters that see no reply within the bound resolve empty.
pub struct InputRequestBridge {
    pending: Mutex<HashMap<RequestId, oneshot::Sender<String>>>,
    timeout: Duration,
    metrics: Option<Arc<BridgeMetrics>>,
}

impl InputRequestBridge {
    pub fn new(timeout: Duration, metrics: Option<Arc<BridgeMetrics>>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
            metrics,
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<String>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn in_flight(&self) -> usize {
        self.pending().len()
    }

    /// Asks the UI for its current input text and waits for the matching reply.
    ///
    /// `Ok(None)` means the wait bound elapsed or the read was cancelled.
    pub async fn request(&self, ui: &dyn UiChannelPort) -> Result<Option<String>, BridgeError> {
        let request_id = RequestId::new();
        let (tx, rx) = oneshot::channel();
        self.pending().insert(request_id.clone(), tx);
        let _waiter = WaiterGuard {
            requests: self,
            request_id: request_id.clone(),
        };

        let started = Instant::now();
        ui.post(UiCommand::RequestInput {
            request_id: request_id.clone(),
        })
        .await?;

        let (value, outcome) = match time::timeout(self.timeout, rx).await {
            Ok(Ok(text)) => (Some(text), "value"),
            Ok(Err(_)) => {
                debug!(%request_id, "input read cancelled");
                (None, "cancelled")
            }
            Err(_) => {
                debug!(%request_id, timeout_ms = self.timeout.as_millis() as u64, "input read timed out");
                (None, "timeout")
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_read(started.elapsed().as_secs_f64() * 1000.0, outcome);
        }
        Ok(value)
    }

    /// Delivers a UI event to its waiter. Returns `false` for replies nobody
    /// is waiting for any more.
    pub fn resolve(&self, event: UiEvent) -> bool {
        match event {
            UiEvent::InputValue { request_id, text } => {
                let waiter = self.pending().remove(&request_id);
                match waiter {
                    Some(tx) => tx.send(text).is_ok(),
                    None => {
                        debug!(%request_id, "dropping reply for unknown or expired request");
                        false
                    }
                }
            }
        }
    }

    /// Resolves every outstanding read empty. Returns how many were waiting.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.pending().drain().collect();
        drained.len()
    }
}

/// Drops a read's waiter however the read ends, including when the caller
/// stops polling it.
struct WaiterGuard<'a> {
    requests: &'a InputRequestBridge,
    request_id: RequestId,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.requests.pending().remove(&self.request_id);
    }
}

/// Feeds the UI's event stream into `requests` until the stream ends.
pub fn spawn_reply_pump(
    mut events: UiEventStream,
    requests: Arc<InputRequestBridge>,
    binding_id: BindingId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            requests.resolve(event);
        }
        debug!(%binding_id, "ui event stream closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ui::ChannelUi;

    fn request_id_of(command: Option<UiCommand>) -> RequestId {
        match command {
            Some(UiCommand::RequestInput { request_id }) => request_id,
            other => panic!("expected request_input, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn overlapping_reads_resolve_by_correlation_id() {
        let (ui, mut endpoint) = ChannelUi::pair();
        let ui = Arc::new(ui);
        let bridge = Arc::new(InputRequestBridge::new(Duration::from_secs(5), None));

        let first = tokio::spawn({
            let (bridge, ui) = (bridge.clone(), ui.clone());
            async move { bridge.request(ui.as_ref()).await }
        });
        let first_id = request_id_of(endpoint.commands.recv().await);

        let second = tokio::spawn({
            let (bridge, ui) = (bridge.clone(), ui.clone());
            async move { bridge.request(ui.as_ref()).await }
        });
        let second_id = request_id_of(endpoint.commands.recv().await);
        assert_ne!(first_id, second_id);
        assert_eq!(bridge.in_flight(), 2);

        // Answer out of order.
        assert!(bridge.resolve(UiEvent::InputValue {
            request_id: second_id,
            text: "second".into(),
        }));
        assert!(bridge.resolve(UiEvent::InputValue {
            request_id: first_id,
            text: "first".into(),
        }));

        assert_eq!(first.await.unwrap().unwrap(), Some("first".to_string()));
        assert_eq!(second.await.unwrap().unwrap(), Some("second".to_string()));
        assert_eq!(bridge.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn read_resolves_empty_after_wait_bound() {
        let (ui, mut endpoint) = ChannelUi::pair();
        let bridge = InputRequestBridge::new(Duration::from_millis(2000), None);

        let started = Instant::now();
        let value = bridge.request(&ui).await.unwrap();
        assert_eq!(value, None);
        assert!(started.elapsed() >= Duration::from_millis(2000));
        assert_eq!(bridge.in_flight(), 0);

        // A late reply finds no waiter.
        let late_id = request_id_of(endpoint.commands.recv().await);
        assert!(!bridge.resolve(UiEvent::InputValue {
            request_id: late_id,
            text: "late".into(),
        }));
    }

    #[tokio::test]
    async fn closed_channel_fails_without_leaving_a_waiter() {
        let (ui, endpoint) = ChannelUi::pair();
        drop(endpoint);
        let bridge = InputRequestBridge::new(Duration::from_secs(5), None);
        assert!(matches!(
            bridge.request(&ui).await,
            Err(BridgeError::Channel(_))
        ));
        assert_eq!(bridge.in_flight(), 0);
    }

    #[tokio::test]
    async fn cancel_all_resolves_waiters_empty() {
        let (ui, mut endpoint) = ChannelUi::pair();
        let ui = Arc::new(ui);
        let bridge = Arc::new(InputRequestBridge::new(Duration::from_secs(60), None));
        let read = tokio::spawn({
            let (bridge, ui) = (bridge.clone(), ui.clone());
            async move { bridge.request(ui.as_ref()).await }
        });
        request_id_of(endpoint.commands.recv().await);

        assert_eq!(bridge.cancel_all(), 1);
        assert_eq!(read.await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn abandoned_reads_release_their_waiters() {
        let (ui, mut endpoint) = ChannelUi::pair();
        let ui = Arc::new(ui);
        let bridge = Arc::new(InputRequestBridge::new(Duration::from_millis(2000), None));

        for _ in 0..5 {
            let read = tokio::spawn({
                let (bridge, ui) = (bridge.clone(), ui.clone());
                async move { bridge.request(ui.as_ref()).await }
            });
            request_id_of(endpoint.commands.recv().await);
            assert_eq!(bridge.in_flight(), 1);

            read.abort();
            assert!(read.await.unwrap_err().is_cancelled());
            assert_eq!(bridge.in_flight(), 0);
        }
    }

    #[tokio::test]
    async fn reply_pump_routes_events_to_waiters() {
        let (ui, mut endpoint) = ChannelUi::pair();
        let events = ui.take_events().unwrap();
        let ui = Arc::new(ui);
        let bridge = Arc::new(InputRequestBridge::new(Duration::from_secs(5), None));
        let pump = spawn_reply_pump(events, bridge.clone(), BindingId::new());

        let read = tokio::spawn({
            let (bridge, ui) = (bridge.clone(), ui.clone());
            async move { bridge.request(ui.as_ref()).await }
        });
        let request_id = request_id_of(endpoint.commands.recv().await);
        endpoint
            .events
            .send(UiEvent::InputValue {
                request_id,
                text: "from ui".into(),
            })
            .unwrap();

        assert_eq!(read.await.unwrap().unwrap(), Some("from ui".to_string()));
        pump.abort();
    }
}

use super::approval::approve_pending;
use super::error::BridgeError;
use super::notifier::{OutputNotifier, OutputSubscription};
use super::pipeline::{snapshot_output, spawn_translation_task};
use super::requests::{spawn_reply_pump, InputRequestBridge};
use crate::domain::bridge::{BindingId, UiCommand};
use crate::ports::session::SessionPort;
use crate::ports::ui::UiChannelPort;
use crate::telemetry::BridgeMetrics;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// How long `read_current_input` waits for the UI's reply.
    pub read_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

/// One session/UI attachment and the tasks serving it.
struct ActiveBinding {
    id: BindingId,
    session: Arc<dyn SessionPort>,
    ui: Arc<dyn UiChannelPort>,
    requests: Arc<InputRequestBridge>,
    tasks: Vec<JoinHandle<()>>,
}

impl ActiveBinding {
    fn retire(&self) {
        for task in &self.tasks {
            task.abort();
        }
        let cancelled = self.requests.cancel_all();
        info!(binding_id = %self.id, cancelled, "binding retired");
    }
}

struct Inner {
    config: BridgeConfig,
    notifier: Arc<OutputNotifier>,
    binding: RwLock<Option<Arc<ActiveBinding>>>,
    metrics: Option<Arc<BridgeMetrics>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let binding = self
            .binding
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(binding) = binding {
            binding.retire();
        }
    }
}

/// Caller-facing entry point of the bridge.
///
/// Holds at most one attachment to a session and its UI. Every operation is
/// safe before [`ChatBridge::bind`] and reports failure through its return
/// value instead of an error. Output subscribers belong to the bridge, not to
/// an attachment, and keep receiving across rebinds.
///
/// Clones share state.
#[derive(Clone)]
pub struct ChatBridge {
    inner: Arc<Inner>,
}

impl ChatBridge {
    pub fn new(config: BridgeConfig, metrics: Option<Arc<BridgeMetrics>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                notifier: OutputNotifier::new(),
                binding: RwLock::new(None),
                metrics,
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    fn slot(&self) -> RwLockWriteGuard<'_, Option<Arc<ActiveBinding>>> {
        self.inner
            .binding
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Result<Arc<ActiveBinding>, BridgeError> {
        self.inner
            .binding
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(BridgeError::Unbound)
    }

    /// Attaches the bridge to `session` and its `ui`, replacing any current
    /// attachment.
    ///
    /// Reads still waiting on the replaced attachment resolve empty. If the
    /// new session or UI cannot be attached, the current attachment is kept.
    /// Must be called from within a tokio runtime.
    pub fn bind(
        &self,
        session: Arc<dyn SessionPort>,
        ui: Arc<dyn UiChannelPort>,
    ) -> Result<BindingId, BridgeError> {
        let events = ui.take_events().ok_or(BridgeError::StreamClaimed)?;
        let changes = session.subscribe_changes().map_err(BridgeError::Session)?;

        let id = BindingId::new();
        let requests = Arc::new(InputRequestBridge::new(
            self.inner.config.read_timeout,
            self.inner.metrics.clone(),
        ));
        let tasks = vec![
            spawn_reply_pump(events, requests.clone(), id.clone()),
            spawn_translation_task(
                changes,
                self.inner.notifier.clone(),
                self.inner.metrics.clone(),
                id.clone(),
            ),
        ];
        let binding = Arc::new(ActiveBinding {
            id: id.clone(),
            session,
            ui,
            requests,
            tasks,
        });

        let previous = self.slot().replace(binding);
        if let Some(previous) = previous {
            previous.retire();
        }
        info!(binding_id = %id, "bridge bound");
        Ok(id)
    }

    /// Detaches the current attachment, if any.
    pub fn unbind(&self) -> Option<BindingId> {
        let previous = self.slot().take()?;
        previous.retire();
        Some(previous.id.clone())
    }

    /// Detaches only if `id` is still the current attachment.
    pub fn unbind_if(&self, id: &BindingId) -> bool {
        let previous = {
            let mut slot = self.slot();
            if slot.as_ref().is_some_and(|current| &current.id == id) {
                slot.take()
            } else {
                None
            }
        };
        match previous {
            Some(previous) => {
                previous.retire();
                true
            }
            None => false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.current().is_ok()
    }

    pub fn binding_id(&self) -> Option<BindingId> {
        self.current().ok().map(|binding| binding.id.clone())
    }

    /// Current text of the UI's input field, or `None` when unbound or when
    /// the UI does not answer within the configured read timeout.
    pub async fn read_current_input(&self) -> Option<String> {
        let binding = match self.current() {
            Ok(binding) => binding,
            Err(err) => {
                debug!(%err, "read_current_input skipped");
                return None;
            }
        };
        match binding.requests.request(binding.ui.as_ref()).await {
            Ok(value) => value,
            Err(err) => {
                warn!(binding_id = %binding.id, %err, "read_current_input failed");
                None
            }
        }
    }

    pub async fn set_current_input(&self, text: impl Into<String>) -> bool {
        let command = UiCommand::SetInput { text: text.into() };
        let result = match self.current() {
            Ok(binding) => self.post(&binding, command).await,
            Err(err) => Err(err),
        };
        report("set_current_input", result)
    }

    /// Submits `text`, or whatever the input field holds when `text` is
    /// `None`. Explicit text is first placed in the input field.
    pub async fn submit(&self, text: Option<String>) -> bool {
        let result = match self.current() {
            Ok(binding) => {
                let mut result = Ok(());
                if let Some(text) = &text {
                    result = self
                        .post(&binding, UiCommand::SetInput { text: text.clone() })
                        .await;
                }
                let submitted = self.post(&binding, UiCommand::Submit { text }).await;
                result.and(submitted)
            }
            Err(err) => Err(err),
        };
        report("submit", result)
    }

    /// Every assistant text in the bound session's log, separated by blank
    /// lines. `None` when unbound or when the log holds no assistant text.
    pub fn read_all_output(&self) -> Option<String> {
        let binding = match self.current() {
            Ok(binding) => binding,
            Err(err) => {
                debug!(%err, "read_all_output skipped");
                return None;
            }
        };
        match binding.session.entries() {
            Ok(entries) => snapshot_output(&entries),
            Err(err) => {
                warn!(binding_id = %binding.id, err = %format!("{err:#}"), "reading session log failed");
                None
            }
        }
    }

    pub async fn approve_pending_action(&self) -> bool {
        let (approved, outcome) = match self.current() {
            Ok(binding) => match approve_pending(binding.session.as_ref()).await {
                Ok(true) => (true, "approved"),
                Ok(false) => (false, "nothing_pending"),
                Err(err) => {
                    warn!(binding_id = %binding.id, %err, "approval failed");
                    (false, "failed")
                }
            },
            Err(err) => {
                debug!(%err, "approve_pending_action skipped");
                (false, "unbound")
            }
        };
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_approval(outcome);
        }
        approved
    }

    /// Registers `callback` for every new piece of assistant output.
    pub fn subscribe_output<F>(&self, callback: F) -> OutputSubscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.notifier.subscribe(callback)
    }

    /// Like [`ChatBridge::subscribe_output`], delivering into a channel.
    pub fn subscribe_output_stream(&self) -> (OutputSubscription, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe_output(move |text| {
            let _ = tx.send(text.to_string());
        });
        (subscription, rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.notifier.subscriber_count()
    }

    async fn post(&self, binding: &ActiveBinding, command: UiCommand) -> Result<(), BridgeError> {
        let name = command.name();
        let result = binding.ui.post(command).await;
        if let Some(metrics) = &self.inner.metrics {
            let outcome = if result.is_ok() { "accepted" } else { "failed" };
            metrics.record_command(name, outcome);
        }
        debug!(binding_id = %binding.id, command = name, ok = result.is_ok(), "ui command posted");
        result.map_err(BridgeError::from)
    }
}

fn report(operation: &'static str, result: Result<(), BridgeError>) -> bool {
    match result {
        Ok(()) => true,
        Err(BridgeError::Unbound) => {
            debug!(operation, "no session bound");
            false
        }
        Err(err) => {
            warn!(operation, %err, "bridge operation failed");
            false
        }
    }
}

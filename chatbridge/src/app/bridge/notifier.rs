use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, warn};

type OutputCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Fan-out of assistant output text to registered callbacks.
///
/// Callbacks run in subscription order on the publishing task. A callback that
/// panics is logged and skipped; the remaining callbacks still run.
#[derive(Default)]
pub struct OutputNotifier {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<u64, OutputCallback>>,
}

impl OutputNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn subscribers(&self) -> MutexGuard<'_, BTreeMap<u64, OutputCallback>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> OutputSubscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers().insert(id, Arc::new(callback));
        debug!(subscription = id, "output subscriber added");
        OutputSubscription {
            id,
            notifier: Arc::downgrade(self),
        }
    }

    /// Delivers `text` to every subscriber. Returns how many callbacks
    /// completed.
    pub fn publish(&self, text: &str) -> usize {
        // Snapshot so callbacks may subscribe or unsubscribe re-entrantly.
        let callbacks: Vec<(u64, OutputCallback)> = self
            .subscribers()
            .iter()
            .map(|(id, callback)| (*id, callback.clone()))
            .collect();

        let mut delivered = 0;
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(text))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(subscription = id, "output subscriber panicked"),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    fn remove(&self, id: u64) -> bool {
        let removed = self.subscribers().remove(&id).is_some();
        if removed {
            debug!(subscription = id, "output subscriber removed");
        }
        removed
    }
}

/// Handle for one output subscription. Dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct OutputSubscription {
    id: u64,
    notifier: Weak<OutputNotifier>,
}

impl OutputSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.notifier
            .upgrade()
            .map(|notifier| notifier.subscribers().contains_key(&self.id))
            .unwrap_or(false)
    }

    /// Stops delivery to this subscriber.
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for OutputSubscription {
    fn drop(&mut self) {
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.remove(self.id);
        }
    }
}

impl std::fmt::Debug for OutputSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSubscription")
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |text: &str| sink.lock().unwrap().push(text.to_string()))
    }

    #[test]
    fn every_subscriber_sees_each_publication() {
        let notifier = OutputNotifier::new();
        let (first, first_cb) = recorder();
        let (second, second_cb) = recorder();
        let _a = notifier.subscribe(first_cb);
        let _b = notifier.subscribe(second_cb);

        assert_eq!(notifier.publish("hello"), 2);
        assert_eq!(*first.lock().unwrap(), vec!["hello"]);
        assert_eq!(*second.lock().unwrap(), vec!["hello"]);
    }

    #[test]
    fn disposed_subscription_stops_delivery() {
        let notifier = OutputNotifier::new();
        let (seen, cb) = recorder();
        let subscription = notifier.subscribe(cb);
        assert!(subscription.is_active());
        notifier.publish("one");

        subscription.dispose();
        assert_eq!(notifier.subscriber_count(), 0);
        assert_eq!(notifier.publish("two"), 0);
        assert_eq!(*seen.lock().unwrap(), vec!["one"]);
    }

    #[test]
    fn panicking_subscriber_does_not_starve_others() {
        let notifier = OutputNotifier::new();
        let _bad = notifier.subscribe(|_: &str| panic!("subscriber bug"));
        let (seen, cb) = recorder();
        let _good = notifier.subscribe(cb);

        assert_eq!(notifier.publish("still delivered"), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["still delivered"]);
    }

    #[test]
    fn subscription_outliving_notifier_is_inert() {
        let notifier = OutputNotifier::new();
        let subscription = notifier.subscribe(|_: &str| {});
        drop(notifier);
        assert!(!subscription.is_active());
        drop(subscription);
    }
}

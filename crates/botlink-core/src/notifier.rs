//! Synchronous change notification.
//!
//! [`Notifier`] is a one-to-many publish mechanism. The queue, the serial
//! link and the connection machine each own one and publish a reference to
//! themselves after every state change, so a UI layer can re-read whatever
//! it renders.
//!
//! Listeners run on the publishing thread, in subscription order. The
//! listener set is copied before iterating, so a listener may unsubscribe
//! itself (or anyone else) mid-publish without affecting that publish.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::helpers::lock;

/// Handle returned by [`Notifier::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Listener<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// Ordered set of listeners for changes to a source of type `S`.
pub struct Notifier<S: ?Sized> {
    next_id: AtomicU64,
    // Ids are allocated monotonically, so key order is subscription order.
    listeners: Mutex<BTreeMap<SubscriptionId, Listener<S>>>,
}

impl<S: ?Sized> Notifier<S> {
    pub fn new() -> Self {
        Notifier {
            next_id: AtomicU64::new(0),
            listeners: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register a listener. Subscribing the same closure twice registers it
    /// twice.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, Arc::new(listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Invoke every current listener with `source`.
    pub fn publish(&self, source: &S) {
        let snapshot: Vec<Listener<S>> = self.lock().values().cloned().collect();
        for listener in snapshot {
            listener(source);
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SubscriptionId, Listener<S>>> {
        lock(&self.listeners)
    }
}

impl<S: ?Sized> Default for Notifier<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized> std::fmt::Debug for Notifier<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn publish_reaches_listeners_in_subscription_order() {
        let notifier: Notifier<u32> = Notifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            notifier.subscribe(move |value: &u32| seen.lock().unwrap().push((tag, *value)));
        }

        notifier.publish(&7);
        assert_eq!(*seen.lock().unwrap(), vec![("a", 7), ("b", 7), ("c", 7)]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let notifier: Notifier<()> = Notifier::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = notifier.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        notifier.publish(&());
        assert!(notifier.unsubscribe(id));
        notifier.publish(&());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!notifier.unsubscribe(id));
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn duplicate_subscription_fires_twice() {
        let notifier: Notifier<()> = Notifier::new();
        let count = Arc::new(AtomicUsize::new(0));
        let listener = {
            let count = count.clone();
            move |_: &()| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        };
        notifier.subscribe(listener.clone());
        notifier.subscribe(listener);

        notifier.publish(&());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_during_publish_does_not_affect_in_flight_publish() {
        let notifier: Arc<Notifier<()>> = Arc::new(Notifier::new());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let second_id = Arc::new(Mutex::new(None));

        {
            let notifier_ref = notifier.clone();
            let calls = calls.clone();
            let second_id = second_id.clone();
            notifier.subscribe(move |_| {
                calls.lock().unwrap().push("first");
                if let Some(id) = second_id.lock().unwrap().take() {
                    notifier_ref.unsubscribe(id);
                }
            });
        }
        {
            let calls = calls.clone();
            let id = notifier.subscribe(move |_| calls.lock().unwrap().push("second"));
            *second_id.lock().unwrap() = Some(id);
        }

        // The second listener was removed mid-publish but still sees this one.
        notifier.publish(&());
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);

        notifier.publish(&());
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "first"]);
    }

    #[test]
    fn listener_may_unsubscribe_itself() {
        let notifier: Arc<Notifier<()>> = Arc::new(Notifier::new());
        let own_id = Arc::new(Mutex::new(None::<SubscriptionId>));
        let count = Arc::new(AtomicUsize::new(0));

        let id = {
            let notifier_ref = notifier.clone();
            let own_id = own_id.clone();
            let count = count.clone();
            notifier.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *own_id.lock().unwrap() {
                    notifier_ref.unsubscribe(id);
                }
            })
        };
        *own_id.lock().unwrap() = Some(id);

        notifier.publish(&());
        notifier.publish(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn publish_with_no_listeners_is_noop() {
        let notifier: Notifier<str> = Notifier::new();
        notifier.publish("nothing listening");
        assert_eq!(notifier.listener_count(), 0);
    }
}

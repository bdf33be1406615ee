//! Observable containers
//!
//! The reactive primitive behind every TESSERA store: a container publishes
//! immutable value snapshots to registered callbacks. Subscribing delivers the
//! current value immediately, then every replacement, in publish order.
//!
//! Containers come in two flavours:
//! - [`Writable`] - a settable container with no lifecycle, used for leaf
//!   state (membership sets, per-peer signals).
//! - [`Readable`] - a derived container with a start/stop lifecycle: a start
//!   closure runs when the first consumer subscribes and returns a teardown
//!   guard that is dropped when the last consumer leaves. Derived stores use
//!   this to scope their upstream subscriptions to "somebody is watching".
//!
//! The model is single-threaded and cooperative: handlers run to completion,
//! and no registry lock is held while callbacks execute, so a callback may
//! freely publish to *other* containers. Publishing to the same container
//! from inside its own callback is not supported.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

pub(crate) type BoxedCallback<A> = Mutex<Box<dyn FnMut(&A) + Send>>;

/// Token-keyed callback registry shared by all observable types.
pub(crate) struct Callbacks<A> {
    next_token: u64,
    entries: HashMap<u64, Arc<BoxedCallback<A>>>,
}

impl<A> Callbacks<A> {
    pub(crate) fn new() -> Self {
        Callbacks {
            next_token: 0,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn add(&mut self, callback: Arc<BoxedCallback<A>>) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.entries.insert(token, callback);
        token
    }

    pub(crate) fn remove(&mut self, token: u64) {
        self.entries.remove(&token);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot of the current callbacks, taken so the registry lock is not
    /// held while they run.
    pub(crate) fn snapshot(&self) -> Vec<Arc<BoxedCallback<A>>> {
        self.entries.values().cloned().collect()
    }
}

/// Cancellation guard for one registered callback (or, for derived stores,
/// one whole teardown bundle). Dropping it cancels.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Subscription {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Explicit cancellation; equivalent to dropping the guard.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

type StartFn<T> = Box<dyn FnMut(Setter<T>) -> Subscription + Send>;

struct Lifecycle<T> {
    start: StartFn<T>,
    /// Teardown guard from the active start, present while consumers exist.
    teardown: Option<Subscription>,
}

struct Shared<T> {
    value: Mutex<T>,
    subscribers: Mutex<Callbacks<T>>,
    lifecycle: Mutex<Option<Lifecycle<T>>>,
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn publish(&self, value: T) {
        *self.value.lock() = value.clone();
        let callbacks = self.subscribers.lock().snapshot();
        for callback in callbacks {
            let mut callback = callback.lock();
            (*callback)(&value);
        }
    }
}

/// Weak publish handle handed to a derived container's start closure.
///
/// Publishing after the container itself is gone is a silent no-op.
pub struct Setter<T> {
    shared: Weak<Shared<T>>,
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Setter {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Setter<T> {
    pub fn set(&self, value: T) {
        if let Some(shared) = self.shared.upgrade() {
            shared.publish(value);
        }
    }
}

/// A read-only observable container.
///
/// Handles are cheap to clone and all point at the same underlying state.
pub struct Readable<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Readable<T> {
    fn clone(&self) -> Self {
        Readable {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Readable<T> {
    /// A derived container. `start` runs when the subscriber count goes
    /// 0 -> 1, *before* the new subscriber is registered, so every subscriber
    /// observes exactly one initial snapshot: the post-start current value.
    /// The returned guard is dropped when the count returns to zero.
    pub fn new(initial: T, start: impl FnMut(Setter<T>) -> Subscription + Send + 'static) -> Self {
        Readable {
            shared: Arc::new(Shared {
                value: Mutex::new(initial),
                subscribers: Mutex::new(Callbacks::new()),
                lifecycle: Mutex::new(Some(Lifecycle {
                    start: Box::new(start),
                    teardown: None,
                })),
            }),
        }
    }

    /// A plain container with no lifecycle; only [`Writable`] constructs one.
    fn plain(initial: T) -> Self {
        Readable {
            shared: Arc::new(Shared {
                value: Mutex::new(initial),
                subscribers: Mutex::new(Callbacks::new()),
                lifecycle: Mutex::new(None),
            }),
        }
    }

    /// Clone of the current value.
    pub fn get(&self) -> T {
        self.shared.value.lock().clone()
    }

    /// Register `f`, delivering the current value immediately and every
    /// published replacement afterwards.
    pub fn subscribe(&self, f: impl FnMut(&T) + Send + 'static) -> Subscription {
        self.ensure_started();
        let callback: Arc<BoxedCallback<T>> = Arc::new(Mutex::new(Box::new(f)));
        let token = self.shared.subscribers.lock().add(callback.clone());
        let snapshot = self.get();
        {
            let mut callback = callback.lock();
            (*callback)(&snapshot);
        }
        self.guard(token)
    }

    /// Register `f` for future changes only, with no immediate delivery.
    /// Derived stores pair this with [`Readable::get`] when seeding, so a
    /// rebuild publishes one snapshot instead of one per observed peer.
    pub fn watch(&self, f: impl FnMut(&T) + Send + 'static) -> Subscription {
        self.ensure_started();
        let callback: Arc<BoxedCallback<T>> = Arc::new(Mutex::new(Box::new(f)));
        let token = self.shared.subscribers.lock().add(callback);
        self.guard(token)
    }

    fn ensure_started(&self) {
        let mut lifecycle = self.shared.lifecycle.lock();
        if let Some(lifecycle) = lifecycle.as_mut() {
            if lifecycle.teardown.is_none() {
                let setter = Setter {
                    shared: Arc::downgrade(&self.shared),
                };
                lifecycle.teardown = Some((lifecycle.start)(setter));
            }
        }
    }

    fn guard(&self, token: u64) -> Subscription {
        let shared = Arc::downgrade(&self.shared);
        Subscription::new(move || {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let now_empty = {
                let mut subscribers = shared.subscribers.lock();
                subscribers.remove(token);
                subscribers.is_empty()
            };
            if now_empty {
                let teardown = shared
                    .lifecycle
                    .lock()
                    .as_mut()
                    .and_then(|lifecycle| lifecycle.teardown.take());
                drop(teardown);
            }
        })
    }

    /// Number of registered consumers; used by lifecycle tests.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }
}

/// A settable observable container.
pub struct Writable<T> {
    inner: Readable<T>,
}

impl<T> Clone for Writable<T> {
    fn clone(&self) -> Self {
        Writable {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Writable<T> {
    pub fn new(initial: T) -> Self {
        Writable {
            inner: Readable::plain(initial),
        }
    }

    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Replace the value and notify every registered callback.
    pub fn set(&self, value: T) {
        self.inner.shared.publish(value);
    }

    pub fn subscribe(&self, f: impl FnMut(&T) + Send + 'static) -> Subscription {
        self.inner.subscribe(f)
    }

    pub fn watch(&self, f: impl FnMut(&T) + Send + 'static) -> Subscription {
        self.inner.watch(f)
    }

    /// Read-only handle to the same container.
    pub fn readable(&self) -> Readable<T> {
        self.inner.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl FnMut(&T) + Send) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |value: &T| sink.lock().push(value.clone()))
    }

    #[test]
    fn test_subscribe_delivers_current_then_updates() {
        let store = Writable::new(1u32);
        let (seen, record) = recorder();
        let _sub = store.subscribe(record);

        store.set(2);
        store.set(3);

        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_watch_skips_initial_value() {
        let store = Writable::new(1u32);
        let (seen, record) = recorder();
        let _sub = store.watch(record);

        store.set(2);

        assert_eq!(*seen.lock(), vec![2]);
    }

    #[test]
    fn test_dropped_subscription_stops_delivery() {
        let store = Writable::new(0u32);
        let (seen, record) = recorder();
        let sub = store.subscribe(record);

        store.set(1);
        drop(sub);
        store.set(2);

        assert_eq!(*seen.lock(), vec![0, 1]);
    }

    #[test]
    fn test_get_returns_latest() {
        let store = Writable::new("a".to_string());
        store.set("b".to_string());
        assert_eq!(store.get(), "b");
    }

    #[test]
    fn test_derived_starts_on_first_subscriber_and_stops_on_last() {
        let starts = Arc::new(Mutex::new(0u32));
        let stops = Arc::new(Mutex::new(0u32));

        let derived = Readable::new(0u32, {
            let starts = starts.clone();
            let stops = stops.clone();
            move |setter| {
                *starts.lock() += 1;
                setter.set(7);
                let stops = stops.clone();
                Subscription::new(move || *stops.lock() += 1)
            }
        });

        assert_eq!(*starts.lock(), 0);

        let (seen, record) = recorder();
        let first = derived.subscribe(record);
        // Start ran before the subscriber was registered: one snapshot only.
        assert_eq!(*seen.lock(), vec![7]);
        assert_eq!(*starts.lock(), 1);

        let second = derived.subscribe(|_| {});
        assert_eq!(*starts.lock(), 1);
        assert_eq!(derived.subscriber_count(), 2);

        drop(first);
        assert_eq!(*stops.lock(), 0);
        drop(second);
        assert_eq!(*stops.lock(), 1);
        assert_eq!(derived.subscriber_count(), 0);

        // A fresh consumer restarts the lifecycle.
        let third = derived.subscribe(|_| {});
        assert_eq!(*starts.lock(), 2);
        drop(third);
        assert_eq!(*stops.lock(), 2);
    }

    #[test]
    fn test_setter_is_noop_after_container_dropped() {
        let escaped: Arc<Mutex<Option<Setter<u32>>>> = Arc::new(Mutex::new(None));
        {
            let derived = Readable::new(0u32, {
                let escaped = escaped.clone();
                move |setter| {
                    *escaped.lock() = Some(setter);
                    Subscription::new(|| {})
                }
            });
            let _sub = derived.subscribe(|_| {});
        }
        // No container left to publish to; must not panic.
        let setter = escaped.lock().take().unwrap();
        setter.set(5);
    }

    #[test]
    fn test_cascaded_set_from_callback() {
        let upstream = Writable::new(1u32);
        let downstream = Writable::new(0u32);

        let _link = upstream.subscribe({
            let downstream = downstream.clone();
            move |value| downstream.set(value * 10)
        });

        let (seen, record) = recorder();
        let _sub = downstream.subscribe(record);

        upstream.set(2);
        upstream.set(3);

        assert_eq!(*seen.lock(), vec![10, 20, 30]);
    }
}

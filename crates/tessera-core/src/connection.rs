//! Connection-event source
//!
//! The connection layer owns peer negotiation; this module only defines the
//! in-process event surface it drives. Membership stores register observers
//! here and react to connect/disconnect events for the lifetime of their
//! registration guard.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::signal::{BoxedCallback, Callbacks};
use crate::{PeerRef, Subscription, UserId};

/// One discrete change in the connected-peer population.
#[derive(Clone, Debug)]
pub enum PeerEvent {
    Connected(PeerRef),
    Disconnected(UserId),
}

/// Event source fed by the connection layer.
///
/// Handles are cheap to clone; all point at the same observer registry.
pub struct ConnectionEvents {
    observers: Arc<Mutex<Callbacks<PeerEvent>>>,
}

impl Clone for ConnectionEvents {
    fn clone(&self) -> Self {
        ConnectionEvents {
            observers: self.observers.clone(),
        }
    }
}

impl Default for ConnectionEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionEvents {
    pub fn new() -> Self {
        ConnectionEvents {
            observers: Arc::new(Mutex::new(Callbacks::new())),
        }
    }

    /// Register `f` for every future event, until the guard is dropped.
    pub fn observe(&self, f: impl FnMut(&PeerEvent) + Send + 'static) -> Subscription {
        let callback: Arc<BoxedCallback<PeerEvent>> = Arc::new(Mutex::new(Box::new(f)));
        let token = self.observers.lock().add(callback);
        let observers = Arc::downgrade(&self.observers);
        Subscription::new(move || unregister(observers, token))
    }

    /// Called by the connection layer when a peer finishes connecting.
    pub fn peer_connected(&self, peer: impl Into<PeerRef>) {
        self.emit(PeerEvent::Connected(peer.into()));
    }

    /// Called by the connection layer when a peer goes away.
    pub fn peer_disconnected(&self, user_id: UserId) {
        self.emit(PeerEvent::Disconnected(user_id));
    }

    fn emit(&self, event: PeerEvent) {
        let callbacks = self.observers.lock().snapshot();
        for callback in callbacks {
            let mut callback = callback.lock();
            (*callback)(&event);
        }
    }
}

fn unregister(observers: Weak<Mutex<Callbacks<PeerEvent>>>, token: u64) {
    if let Some(observers) = observers.upgrade() {
        observers.lock().remove(token);
    }
}

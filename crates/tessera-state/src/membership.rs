//! Peer membership stores
//!
//! One store per peer capability (video, screen-sharing). A store tracks the
//! set of currently connected peers of its kind, driven by a connection-event
//! source. Every change publishes a whole replacement map, so subscribers
//! always observe a complete snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use tessera_core::{
    ConnectionEvents, PeerEvent, PeerRef, Readable, RemotePeer, ScreenSharePeer, Subscription,
    UserId, VideoPeer, Writable,
};

/// Immutable membership snapshot, replaced wholesale on every change.
pub type MembershipSet<P> = Arc<HashMap<UserId, Arc<P>>>;

/// Selects the peers a membership store cares about out of connection events.
pub trait PeerCapability: RemotePeer + Send + Sync + Sized + 'static {
    /// The matching peer, or None when the event is for the other kind.
    fn from_event(peer: &PeerRef) -> Option<Arc<Self>>;
}

impl PeerCapability for VideoPeer {
    fn from_event(peer: &PeerRef) -> Option<Arc<Self>> {
        match peer {
            PeerRef::Video(peer) => Some(peer.clone()),
            _ => None,
        }
    }
}

impl PeerCapability for ScreenSharePeer {
    fn from_event(peer: &PeerRef) -> Option<Arc<Self>> {
        match peer {
            PeerRef::ScreenShare(peer) => Some(peer.clone()),
            _ => None,
        }
    }
}

/// Tracks the live set of connected peers of one capability kind.
pub struct MembershipStore<P: PeerCapability> {
    members: Writable<MembershipSet<P>>,
    /// Registration on the current event source; replaced on re-connect.
    source: Arc<Mutex<Option<Subscription>>>,
}

impl<P: PeerCapability> Clone for MembershipStore<P> {
    fn clone(&self) -> Self {
        MembershipStore {
            members: self.members.clone(),
            source: self.source.clone(),
        }
    }
}

impl<P: PeerCapability> Default for MembershipStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PeerCapability> MembershipStore<P> {
    pub fn new() -> Self {
        MembershipStore {
            members: Writable::new(Arc::new(HashMap::new())),
            source: Arc::new(Mutex::new(None)),
        }
    }

    /// Attach to a connection-event source. Prior membership and the prior
    /// source registration are discarded: a re-connect means this session's
    /// peer connection changed, never a merge of two sources.
    pub fn connect(&self, events: &ConnectionEvents) {
        let members = self.members.clone();
        members.set(Arc::new(HashMap::new()));

        let sub = events.observe(move |event| match event {
            PeerEvent::Connected(peer) => {
                let Some(peer) = P::from_event(peer) else {
                    // Other capability; not relevant to this store.
                    return;
                };
                let mut next = (*members.get()).clone();
                next.insert(peer.user_id(), peer.clone());
                debug!(user_id = %peer.user_id(), total = next.len(), "peer connected");
                members.set(Arc::new(next));
            }
            PeerEvent::Disconnected(user_id) => {
                let current = members.get();
                if !current.contains_key(user_id) {
                    return;
                }
                let mut next = (*current).clone();
                next.remove(user_id);
                debug!(user_id = %user_id, total = next.len(), "peer disconnected");
                members.set(Arc::new(next));
            }
        });

        *self.source.lock() = Some(sub);
    }

    /// Current snapshot.
    pub fn get(&self) -> MembershipSet<P> {
        self.members.get()
    }

    /// Current snapshot immediately, then every replacement.
    pub fn subscribe(&self, f: impl FnMut(&MembershipSet<P>) + Send + 'static) -> Subscription {
        self.members.subscribe(f)
    }

    /// Read-only handle for derived stores.
    pub fn members(&self) -> Readable<MembershipSet<P>> {
        self.members.readable()
    }
}

/// Store of the video peers we are connected to.
pub type PeerMembershipStore = MembershipStore<VideoPeer>;

/// Store of the screen-sharing peers we are connected to.
pub type ScreenSharingMembershipStore = MembershipStore<ScreenSharePeer>;

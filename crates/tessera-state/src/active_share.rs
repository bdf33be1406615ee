//! Active screen-share filter
//!
//! Derives, from the screen-sharing membership, the subset of peers that are
//! actually emitting a stream towards us. The derivation is current under two
//! change sources: membership replacement (full rebuild, all per-peer watches
//! released and recreated) and a single peer's stream-presence flip (that
//! entry only). The store holds exactly one stream watch per current member;
//! anything else is a leak or a blind spot.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use tessera_core::{Readable, ScreenSharePeer, Setter, Subscription, UserId};

use crate::{MembershipSet, ScreenSharingMembershipStore};

/// Immutable snapshot of the peers currently streaming a screen share.
pub type ActiveShareSet = Arc<HashMap<UserId, Arc<ScreenSharePeer>>>;

#[derive(Default)]
struct ShareState {
    active: HashMap<UserId, Arc<ScreenSharePeer>>,
    /// One stream watch per current member, cleared as a whole on rebuild.
    watches: Vec<Subscription>,
}

/// Read-only derived store of actively streaming screen-share peers.
///
/// Lazy: the upstream membership subscription and the per-peer watches exist
/// only while at least one consumer is subscribed.
pub struct ActiveScreenShareStore {
    output: Readable<ActiveShareSet>,
    state: Arc<Mutex<ShareState>>,
}

impl Clone for ActiveScreenShareStore {
    fn clone(&self) -> Self {
        ActiveScreenShareStore {
            output: self.output.clone(),
            state: self.state.clone(),
        }
    }
}

impl ActiveScreenShareStore {
    pub fn new(membership: &ScreenSharingMembershipStore) -> Self {
        let state: Arc<Mutex<ShareState>> = Arc::new(Mutex::new(ShareState::default()));
        let upstream = membership.members();

        let start_state = state.clone();
        let output = Readable::new(Arc::new(HashMap::new()), move |setter| {
            let state = start_state.clone();
            let weak = Arc::downgrade(&start_state);
            let membership_sub = upstream.subscribe({
                let setter = setter.clone();
                move |members| {
                    let Some(state) = weak.upgrade() else {
                        return;
                    };
                    rebuild(&state, &setter, members);
                }
            });
            Subscription::new(move || {
                drop(membership_sub);
                let mut state = state.lock();
                state.watches.clear();
                state.active.clear();
            })
        });

        ActiveScreenShareStore { output, state }
    }

    /// Current snapshot. Meaningful while the store has consumers; a stopped
    /// store retains its last published value.
    pub fn get(&self) -> ActiveShareSet {
        self.output.get()
    }

    /// Current snapshot immediately, then every replacement.
    pub fn subscribe(&self, f: impl FnMut(&ActiveShareSet) + Send + 'static) -> Subscription {
        self.output.subscribe(f)
    }

    /// Read-only handle for derived stores.
    pub fn shares(&self) -> Readable<ActiveShareSet> {
        self.output.clone()
    }

    /// Number of live per-peer stream watches. Equals the screen-sharing
    /// membership size whenever the store is running, zero when stopped.
    pub fn stream_watch_count(&self) -> usize {
        self.state.lock().watches.len()
    }
}

/// Full rebuild after a membership replacement: release every previous watch,
/// re-watch every member of the new set, seed with members already streaming,
/// publish once.
fn rebuild(
    state: &Arc<Mutex<ShareState>>,
    setter: &Setter<ActiveShareSet>,
    members: &MembershipSet<ScreenSharePeer>,
) {
    let mut st = state.lock();
    st.watches.clear();
    st.active.clear();

    let mut watches = Vec::with_capacity(members.len());
    for (user_id, peer) in members.iter() {
        if peer.is_receiving_stream() {
            st.active.insert(*user_id, peer.clone());
        }

        let weak = Arc::downgrade(state);
        let setter = setter.clone();
        let user_id = *user_id;
        let watched = peer.clone();
        watches.push(peer.incoming_stream().watch(move |streaming| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let mut st = state.lock();
            if *streaming {
                st.active.insert(user_id, watched.clone());
            } else {
                st.active.remove(&user_id);
            }
            let snapshot = Arc::new(st.active.clone());
            drop(st);
            setter.set(snapshot);
        }));
    }
    st.watches = watches;

    debug!(
        members = members.len(),
        active = st.active.len(),
        "rebuilt active screen-share set"
    );
    let snapshot = Arc::new(st.active.clone());
    drop(st);
    setter.set(snapshot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::ConnectionEvents;

    fn share(id: u64, name: &str) -> ScreenSharePeer {
        ScreenSharePeer::new(UserId::new(id), name)
    }

    fn pipeline() -> (ConnectionEvents, ScreenSharingMembershipStore, ActiveScreenShareStore) {
        let events = ConnectionEvents::new();
        let membership = ScreenSharingMembershipStore::new();
        membership.connect(&events);
        let active = ActiveScreenShareStore::new(&membership);
        (events, membership, active)
    }

    #[test]
    fn test_seeds_with_already_streaming_members() {
        let (events, _membership, active) = pipeline();
        let peer = share(1, "alice-screen").with_incoming_stream(true);
        events.peer_connected(Arc::new(peer));

        let _sub = active.subscribe(|_| {});
        let set = active.get();
        assert_eq!(set.len(), 1);
        assert!(set.contains_key(&UserId::new(1)));
    }

    #[test]
    fn test_stream_flip_inserts_and_removes_single_entry() {
        let (events, _membership, active) = pipeline();
        let alice = Arc::new(share(1, "alice-screen"));
        let bob = Arc::new(share(2, "bob-screen"));
        events.peer_connected(alice.clone());
        events.peer_connected(bob.clone());

        let _sub = active.subscribe(|_| {});
        assert!(active.get().is_empty());

        alice.incoming_stream().set(true);
        let set = active.get();
        assert_eq!(set.len(), 1);
        assert!(set.contains_key(&UserId::new(1)));

        bob.incoming_stream().set(true);
        assert_eq!(active.get().len(), 2);

        alice.incoming_stream().set(false);
        let set = active.get();
        assert_eq!(set.len(), 1);
        assert!(set.contains_key(&UserId::new(2)));
    }

    #[test]
    fn test_watch_count_tracks_membership_size() {
        let (events, membership, active) = pipeline();
        let _sub = active.subscribe(|_| {});
        assert_eq!(active.stream_watch_count(), 0);

        events.peer_connected(Arc::new(share(1, "a")));
        events.peer_connected(Arc::new(share(2, "b")));
        events.peer_connected(Arc::new(share(3, "c")));
        assert_eq!(active.stream_watch_count(), membership.get().len());
        assert_eq!(active.stream_watch_count(), 3);

        events.peer_disconnected(UserId::new(2));
        assert_eq!(active.stream_watch_count(), 2);
    }

    #[test]
    fn test_departed_peer_signal_no_longer_observed() {
        let (events, _membership, active) = pipeline();
        let alice = Arc::new(share(1, "alice-screen"));
        events.peer_connected(alice.clone());

        let _sub = active.subscribe(|_| {});
        events.peer_disconnected(UserId::new(1));

        // The old watch was released with the rebuild; a late flip on the
        // departed peer must not resurrect it.
        alice.incoming_stream().set(true);
        assert!(active.get().is_empty());
    }

    #[test]
    fn test_active_set_is_subset_of_membership() {
        let (events, membership, active) = pipeline();
        let _sub = active.subscribe(|_| {});

        for id in 1..=4u64 {
            let peer = Arc::new(share(id, "peer"));
            if id % 2 == 0 {
                peer.incoming_stream().set(true);
            }
            events.peer_connected(peer);
        }
        events.peer_disconnected(UserId::new(2));

        let members = membership.get();
        for (user_id, peer) in active.get().iter() {
            assert!(members.contains_key(user_id));
            assert!(peer.is_receiving_stream());
        }
    }

    #[test]
    fn test_last_consumer_releases_all_watches() {
        let (events, _membership, active) = pipeline();
        events.peer_connected(Arc::new(share(1, "a")));
        events.peer_connected(Arc::new(share(2, "b")));

        let sub = active.subscribe(|_| {});
        assert_eq!(active.stream_watch_count(), 2);

        drop(sub);
        assert_eq!(active.stream_watch_count(), 0);
    }

    #[test]
    fn test_restart_after_stop_rebuilds_from_current_membership() {
        let (events, _membership, active) = pipeline();
        let alice = share(1, "alice-screen").with_incoming_stream(true);
        events.peer_connected(Arc::new(alice));

        let first = active.subscribe(|_| {});
        drop(first);
        assert_eq!(active.stream_watch_count(), 0);

        let sizes = Arc::new(Mutex::new(Vec::new()));
        let _second = active.subscribe({
            let sizes = sizes.clone();
            move |set| sizes.lock().push(set.len())
        });
        assert_eq!(*sizes.lock(), vec![1]);
        assert_eq!(active.stream_watch_count(), 1);
    }
}

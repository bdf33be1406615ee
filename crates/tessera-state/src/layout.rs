//! Layout classification
//!
//! Merges the active screen shares and the video peers into one logical peer
//! set and buckets every peer by importance tier. A full rebuild (either
//! upstream republished) releases all importance watches and recreates them;
//! an importance flip moves only that peer between buckets.
//!
//! Merge order is deterministic and documented: the active-share set is
//! processed first, the video membership second, so for a `unique_id` present
//! in both the video peer decides the initial bucket.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use tessera_core::{ImportanceLevel, PeerRef, Readable, Setter, Subscription, VideoPeer};

use crate::{ActiveScreenShareStore, ActiveShareSet, MembershipSet, PeerMembershipStore};

/// Two-tier bucketing of the currently relevant peers, keyed by `unique_id`.
///
/// Invariant: a `unique_id` present in either upstream set appears in exactly
/// one bucket of every published snapshot.
#[derive(Clone, Default)]
pub struct LayoutClassification {
    normal: HashMap<String, PeerRef>,
    important: HashMap<String, PeerRef>,
}

impl LayoutClassification {
    pub fn tier(&self, level: ImportanceLevel) -> &HashMap<String, PeerRef> {
        match level {
            ImportanceLevel::Normal => &self.normal,
            ImportanceLevel::Important => &self.important,
        }
    }

    fn tier_mut(&mut self, level: ImportanceLevel) -> &mut HashMap<String, PeerRef> {
        match level {
            ImportanceLevel::Normal => &mut self.normal,
            ImportanceLevel::Important => &mut self.important,
        }
    }

    /// Tiers holding `unique_id`; exactly one for any tracked peer.
    pub fn tiers_of(&self, unique_id: &str) -> Vec<ImportanceLevel> {
        ImportanceLevel::ALL
            .into_iter()
            .filter(|level| self.tier(*level).contains_key(unique_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.normal.len() + self.important.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normal.is_empty() && self.important.is_empty()
    }

    /// Remove `unique_id` from every tier, then insert into `level`. Doing
    /// both under one `&mut self` is what keeps a moving peer in exactly one
    /// bucket from an observer's point of view.
    fn place(&mut self, level: ImportanceLevel, peer: PeerRef) {
        let unique_id = peer.unique_id().to_string();
        for tier in ImportanceLevel::ALL {
            self.tier_mut(tier).remove(&unique_id);
        }
        self.tier_mut(level).insert(unique_id, peer);
    }
}

#[derive(Default)]
struct LayoutState {
    shares: ActiveShareSet,
    members: MembershipSet<VideoPeer>,
    buckets: LayoutClassification,
    /// One importance watch per processed peer, cleared as a whole on rebuild.
    watches: Vec<Subscription>,
}

/// Read-only derived store combining active screen shares and video peers
/// into the two-tier layout classification.
///
/// Lazy: upstream subscriptions and importance watches exist only while at
/// least one consumer is subscribed; releasing the last consumer cascades the
/// teardown into the active-share store as well.
pub struct LayoutStore {
    output: Readable<LayoutClassification>,
    state: Arc<Mutex<LayoutState>>,
}

impl Clone for LayoutStore {
    fn clone(&self) -> Self {
        LayoutStore {
            output: self.output.clone(),
            state: self.state.clone(),
        }
    }
}

impl LayoutStore {
    pub fn new(membership: &PeerMembershipStore, shares: &ActiveScreenShareStore) -> Self {
        let state: Arc<Mutex<LayoutState>> = Arc::new(Mutex::new(LayoutState::default()));
        let share_handle = shares.shares();
        let member_handle = membership.members();

        let start_state = state.clone();
        let output = Readable::new(LayoutClassification::default(), move |setter| {
            let state = start_state.clone();

            let share_sub = share_handle.subscribe({
                let weak = Arc::downgrade(&start_state);
                let setter = setter.clone();
                move |shares| {
                    let Some(state) = weak.upgrade() else {
                        return;
                    };
                    state.lock().shares = shares.clone();
                    rebuild(&state, &setter);
                }
            });
            let member_sub = member_handle.subscribe({
                let weak = Arc::downgrade(&start_state);
                let setter = setter.clone();
                move |members| {
                    let Some(state) = weak.upgrade() else {
                        return;
                    };
                    state.lock().members = members.clone();
                    rebuild(&state, &setter);
                }
            });

            Subscription::new(move || {
                drop(share_sub);
                drop(member_sub);
                // Cached upstream snapshots reset too, so a later restart
                // rebuilds only from what the fresh subscriptions deliver.
                *state.lock() = LayoutState::default();
            })
        });

        LayoutStore { output, state }
    }

    /// Current snapshot. Meaningful while the store has consumers; a stopped
    /// store retains its last published value.
    pub fn get(&self) -> LayoutClassification {
        self.output.get()
    }

    /// Current snapshot immediately, then every replacement.
    pub fn subscribe(
        &self,
        f: impl FnMut(&LayoutClassification) + Send + 'static,
    ) -> Subscription {
        self.output.subscribe(f)
    }

    /// Number of live importance watches: one per active share plus one per
    /// video peer (a peer present in both sets is watched through each).
    pub fn importance_watch_count(&self) -> usize {
        self.state.lock().watches.len()
    }
}

/// Full rebuild after either upstream republished: release every importance
/// watch, re-bucket the union of both sets, re-watch every processed peer,
/// publish once.
fn rebuild(state: &Arc<Mutex<LayoutState>>, setter: &Setter<LayoutClassification>) {
    let mut st = state.lock();
    st.watches.clear();
    st.buckets = LayoutClassification::default();

    // Shares first, video membership second: last processed wins placement
    // for a unique_id present in both.
    let union: Vec<PeerRef> = st
        .shares
        .values()
        .map(|peer| PeerRef::ScreenShare(peer.clone()))
        .chain(st.members.values().map(|peer| PeerRef::Video(peer.clone())))
        .collect();

    let mut watches = Vec::with_capacity(union.len());
    for peer in union {
        let level = peer.importance().get();
        st.buckets.place(level, peer.clone());

        let weak = Arc::downgrade(state);
        let setter = setter.clone();
        let watched = peer.clone();
        watches.push(peer.importance().watch(move |level| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let mut st = state.lock();
            st.buckets.place(*level, watched.clone());
            let snapshot = st.buckets.clone();
            drop(st);
            setter.set(snapshot);
        }));
    }
    st.watches = watches;

    debug!(
        normal = st.buckets.normal.len(),
        important = st.buckets.important.len(),
        "rebuilt layout classification"
    );
    let snapshot = st.buckets.clone();
    drop(st);
    setter.set(snapshot);
}

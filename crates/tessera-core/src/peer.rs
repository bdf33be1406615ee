//! Peer entities
//!
//! A peer is a remote participant handed to us by the connection layer. Every
//! peer exposes identity plus an importance signal; screen-sharing peers
//! additionally expose a stream-presence signal. Consumers branch on the
//! capability they need via [`PeerRef`], never on concrete identity.

use std::fmt;
use std::sync::Arc;

use crate::{UserId, Writable};

/// Display priority tier assigned to a peer by the importance policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ImportanceLevel {
    #[default]
    Normal,
    Important,
}

impl ImportanceLevel {
    pub const ALL: [ImportanceLevel; 2] = [ImportanceLevel::Normal, ImportanceLevel::Important];
}

/// Common peer surface: identity plus the importance signal.
pub trait RemotePeer {
    fn user_id(&self) -> UserId;

    /// Stable string identity, shared across importance tiers.
    fn unique_id(&self) -> &str;

    fn importance(&self) -> &Writable<ImportanceLevel>;
}

/// A peer we receive camera video from.
pub struct VideoPeer {
    user_id: UserId,
    unique_id: String,
    importance: Writable<ImportanceLevel>,
}

impl VideoPeer {
    pub fn new(user_id: UserId, unique_id: impl Into<String>) -> Self {
        VideoPeer {
            user_id,
            unique_id: unique_id.into(),
            importance: Writable::new(ImportanceLevel::default()),
        }
    }

    pub fn with_importance(self, level: ImportanceLevel) -> Self {
        self.importance.set(level);
        self
    }
}

impl RemotePeer for VideoPeer {
    fn user_id(&self) -> UserId {
        self.user_id
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn importance(&self) -> &Writable<ImportanceLevel> {
        &self.importance
    }
}

impl fmt::Debug for VideoPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VideoPeer({}, {:?})", self.unique_id, self.user_id)
    }
}

/// A peer that may share its screen with us.
pub struct ScreenSharePeer {
    user_id: UserId,
    unique_id: String,
    importance: Writable<ImportanceLevel>,
    incoming_stream: Writable<bool>,
}

impl ScreenSharePeer {
    pub fn new(user_id: UserId, unique_id: impl Into<String>) -> Self {
        ScreenSharePeer {
            user_id,
            unique_id: unique_id.into(),
            importance: Writable::new(ImportanceLevel::default()),
            incoming_stream: Writable::new(false),
        }
    }

    pub fn with_importance(self, level: ImportanceLevel) -> Self {
        self.importance.set(level);
        self
    }

    pub fn with_incoming_stream(self, streaming: bool) -> Self {
        self.incoming_stream.set(streaming);
        self
    }

    /// True while this peer is actually emitting a stream towards us.
    pub fn incoming_stream(&self) -> &Writable<bool> {
        &self.incoming_stream
    }

    pub fn is_receiving_stream(&self) -> bool {
        self.incoming_stream.get()
    }
}

impl RemotePeer for ScreenSharePeer {
    fn user_id(&self) -> UserId {
        self.user_id
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn importance(&self) -> &Writable<ImportanceLevel> {
        &self.importance
    }
}

impl fmt::Debug for ScreenSharePeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScreenSharePeer({}, {:?})", self.unique_id, self.user_id)
    }
}

/// Tagged reference to either peer kind, used where both mix (connection
/// events, layout buckets). Cloning clones the reference, never the peer.
#[derive(Clone)]
pub enum PeerRef {
    Video(Arc<VideoPeer>),
    ScreenShare(Arc<ScreenSharePeer>),
}

impl PeerRef {
    pub fn user_id(&self) -> UserId {
        match self {
            PeerRef::Video(peer) => peer.user_id(),
            PeerRef::ScreenShare(peer) => peer.user_id(),
        }
    }

    pub fn unique_id(&self) -> &str {
        match self {
            PeerRef::Video(peer) => peer.unique_id(),
            PeerRef::ScreenShare(peer) => peer.unique_id(),
        }
    }

    pub fn importance(&self) -> &Writable<ImportanceLevel> {
        match self {
            PeerRef::Video(peer) => peer.importance(),
            PeerRef::ScreenShare(peer) => peer.importance(),
        }
    }
}

impl fmt::Debug for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRef::Video(peer) => peer.fmt(f),
            PeerRef::ScreenShare(peer) => peer.fmt(f),
        }
    }
}

impl From<Arc<VideoPeer>> for PeerRef {
    fn from(peer: Arc<VideoPeer>) -> Self {
        PeerRef::Video(peer)
    }
}

impl From<Arc<ScreenSharePeer>> for PeerRef {
    fn from(peer: Arc<ScreenSharePeer>) -> Self {
        PeerRef::ScreenShare(peer)
    }
}

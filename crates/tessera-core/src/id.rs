//! Identity types for TESSERA
//!
//! Peer identifiers are 64-bit, matching the numeric ids handed out by the
//! connection layer.

use std::fmt;

/// Peer identity - assigned by the connection layer, unique per session
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct UserId(pub u64);

impl UserId {
    pub const ZERO: UserId = UserId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        UserId(id)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "User({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

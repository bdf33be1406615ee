//! TESSERA State - Peer membership and derived layout stores
//!
//! This crate implements the reactive pipeline from connection events to the
//! two-tier layout classification consumed by the UI:
//! - Membership stores track the live video / screen-sharing peer sets
//! - The active-share store filters screen sharers down to those actually
//!   emitting a stream
//! - The layout store buckets the combined peer set by importance tier
//!
//! Data flows strictly upward; derived stores never mutate their upstreams.

pub mod membership;
pub mod active_share;
pub mod layout;

pub use membership::*;
pub use active_share::*;
pub use layout::*;

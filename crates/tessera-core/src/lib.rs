//! TESSERA Core - Fundamental types and reactive primitives
//!
//! This crate defines the building blocks used throughout TESSERA:
//! - Identifiers (UserId)
//! - Observable containers (Readable, Writable, Subscription)
//! - Peer entities and their per-peer signals
//! - The connection-event source consumed by membership stores

pub mod id;
pub mod signal;
pub mod peer;
pub mod connection;

pub use id::*;
pub use signal::*;
pub use peer::*;
pub use connection::*;

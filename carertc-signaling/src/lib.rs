//! # CareRTC Signaling
//!
//! Contracts for the two network collaborators of a consultation call:
//! the signaling channel to the coordination server and the peer session
//! engine that owns the media path. Includes in-process loopback
//! implementations with scriptable fault injection, used by tests and
//! demos in place of real transports.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod loopback;
pub mod peer;
pub mod protocol;

// Re-export main types
pub use client::{SignalingClient, SignalingEvent};
pub use loopback::{LoopbackPeerEngine, LoopbackSignaling};
pub use peer::{PeerConnectionStatus, PeerEvent, PeerSessionEngine};
pub use protocol::SignalMessage;

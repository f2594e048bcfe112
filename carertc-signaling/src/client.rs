//! Signaling client contract

use async_trait::async_trait;
use carertc_core::{CallError, Participant};
use tokio::sync::mpsc;

/// Events the signaling channel reports upward
#[derive(Debug, Clone)]
pub enum SignalingEvent {
    /// Channel established
    Connected,
    /// Channel lost; automatic reconnect starts
    Disconnected {
        /// Reason for the loss
        reason: String,
    },
    /// One automatic reconnect attempt started
    ReconnectAttempt {
        /// Attempt number since the loss
        attempt: u32,
    },
    /// Channel re-established after a loss
    Reconnected,
    /// A peer joined the room
    PeerJoined {
        /// Participant id of the peer
        participant_id: String,
        /// Display name of the peer
        display_name: String,
    },
    /// A peer left the room
    PeerLeft {
        /// Participant id of the peer
        participant_id: String,
    },
}

/// Persistent connection to the coordination server
///
/// Reconnection is the client's own job; the controller only observes
/// `is_reconnecting`/`reconnect_attempts` and reconciles them with the
/// peer media path. The two degrade independently on real networks.
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// Establish the channel
    async fn connect(&self) -> Result<(), CallError>;

    /// Tear the channel down
    async fn disconnect(&self);

    /// Whether the channel is currently established
    fn is_connected(&self) -> bool;

    /// Whether an automatic reconnect is in progress
    fn is_reconnecting(&self) -> bool;

    /// Reconnect attempts since the channel was last healthy
    fn reconnect_attempts(&self) -> u32;

    /// Announce this participant in a room
    async fn join_room(&self, room_id: &str, participant: &Participant) -> Result<(), CallError>;

    /// Withdraw this participant from a room
    async fn leave_room(&self, room_id: &str, participant_id: &str) -> Result<(), CallError>;

    /// Subscribe to channel and room-membership events
    fn subscribe(&self) -> mpsc::UnboundedReceiver<SignalingEvent>;
}

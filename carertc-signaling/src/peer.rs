//! Peer session engine contract
//!
//! The engine owns offer/answer/ICE negotiation and the remote streams it
//! produces. The controller never stops a remote stream's tracks; it only
//! observes status and forwards streams to the render binder.

use async_trait::async_trait;
use carertc_core::CallError;
use carertc_media::StreamHandle;
use tokio::sync::mpsc;

/// Connection status of the peer media path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionStatus {
    /// Negotiation in progress
    Connecting,
    /// Media flowing
    Connected,
    /// ICE degraded; restart in progress
    Reconnecting,
    /// Media path gone for good; needs a full re-join
    Failed,
}

/// Events the peer engine reports upward
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A remote participant's stream became available
    RemoteStreamAdded {
        /// Peer the stream belongs to
        peer_id: String,
        /// The remote stream (owned by the engine)
        stream: StreamHandle,
    },
    /// A remote participant's stream went away
    RemoteStreamRemoved {
        /// Peer the stream belonged to
        peer_id: String,
    },
    /// Media-path status changed
    StatusChanged {
        /// New status
        status: PeerConnectionStatus,
    },
}

/// One peer-to-peer media session for one room
#[async_trait]
pub trait PeerSessionEngine: Send + Sync {
    /// Current media-path status
    fn status(&self) -> PeerConnectionStatus;

    /// Snapshot of remote streams keyed by peer id
    fn remote_streams(&self) -> Vec<(String, StreamHandle)>;

    /// Renegotiate the media path without tearing down the call
    async fn trigger_ice_restart(&self) -> Result<(), CallError>;

    /// Replace the published video source with a screen capture
    async fn start_screen_share(&self) -> Result<(), CallError>;

    /// Restore the camera as the published video source
    async fn stop_screen_share(&self) -> Result<(), CallError>;

    /// Tear the session down
    async fn close(&self);

    /// Subscribe to stream and status events
    fn subscribe(&self) -> mpsc::UnboundedReceiver<PeerEvent>;
}

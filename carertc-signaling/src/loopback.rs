//! In-process loopback collaborators
//!
//! Channel-driven implementations of [`SignalingClient`] and
//! [`PeerSessionEngine`] with scriptable fault injection. Tests and demos
//! drive the controller's reconnection and recovery machinery through
//! these instead of a network.

use crate::client::{SignalingClient, SignalingEvent};
use crate::peer::{PeerConnectionStatus, PeerEvent, PeerSessionEngine};
use async_trait::async_trait;
use carertc_core::{CallError, Participant};
use carertc_media::StreamHandle;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

fn fan_out<T: Clone>(subscribers: &Mutex<Vec<mpsc::UnboundedSender<T>>>, event: T) {
    subscribers.lock().retain(|tx| tx.send(event.clone()).is_ok());
}

/// Loopback signaling channel with fault injection
#[derive(Default)]
pub struct LoopbackSignaling {
    connected: AtomicBool,
    reconnecting: AtomicBool,
    attempts: AtomicU32,
    fail_connect: AtomicBool,
    joined_rooms: Mutex<Vec<String>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SignalingEvent>>>,
}

impl LoopbackSignaling {
    /// Create a disconnected loopback channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `connect` calls fail
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Simulate losing the channel; auto-reconnect state begins
    pub fn drop_connection(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        self.reconnecting.store(true, Ordering::SeqCst);
        debug!(reason, "Loopback signaling dropped");
        fan_out(
            &self.subscribers,
            SignalingEvent::Disconnected {
                reason: reason.to_string(),
            },
        );
    }

    /// Simulate one automatic reconnect attempt
    pub fn tick_reconnect(&self) -> u32 {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        fan_out(&self.subscribers, SignalingEvent::ReconnectAttempt { attempt });
        attempt
    }

    /// Simulate the channel coming back
    pub fn restore_connection(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.reconnecting.store(false, Ordering::SeqCst);
        self.attempts.store(0, Ordering::SeqCst);
        fan_out(&self.subscribers, SignalingEvent::Reconnected);
    }

    /// Announce a remote peer into the joined room
    pub fn inject_peer_joined(&self, participant_id: &str, display_name: &str) {
        fan_out(
            &self.subscribers,
            SignalingEvent::PeerJoined {
                participant_id: participant_id.to_string(),
                display_name: display_name.to_string(),
            },
        );
    }

    /// Announce a remote peer leaving
    pub fn inject_peer_left(&self, participant_id: &str) {
        fan_out(
            &self.subscribers,
            SignalingEvent::PeerLeft {
                participant_id: participant_id.to_string(),
            },
        );
    }

    /// Rooms this client currently sits in
    pub fn joined_rooms(&self) -> Vec<String> {
        self.joined_rooms.lock().clone()
    }
}

#[async_trait]
impl SignalingClient for LoopbackSignaling {
    async fn connect(&self) -> Result<(), CallError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(CallError::Signaling {
                reason: "loopback connect refused".to_string(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        self.reconnecting.store(false, Ordering::SeqCst);
        fan_out(&self.subscribers, SignalingEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.reconnecting.store(false, Ordering::SeqCst);
        self.attempts.store(0, Ordering::SeqCst);
        self.joined_rooms.lock().clear();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::SeqCst)
    }

    fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    async fn join_room(&self, room_id: &str, participant: &Participant) -> Result<(), CallError> {
        if !self.is_connected() {
            return Err(CallError::Signaling {
                reason: "not connected".to_string(),
            });
        }
        debug!(room_id, participant_id = %participant.id, "Loopback join");
        let mut rooms = self.joined_rooms.lock();
        if !rooms.iter().any(|r| r == room_id) {
            rooms.push(room_id.to_string());
        }
        Ok(())
    }

    async fn leave_room(&self, room_id: &str, _participant_id: &str) -> Result<(), CallError> {
        self.joined_rooms.lock().retain(|r| r != room_id);
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<SignalingEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}

/// Loopback peer engine with fault injection
pub struct LoopbackPeerEngine {
    status: Mutex<PeerConnectionStatus>,
    remote: DashMap<String, StreamHandle>,
    ice_restarts: AtomicU32,
    screen_sharing: AtomicBool,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PeerEvent>>>,
}

impl LoopbackPeerEngine {
    /// Create an engine that reports `Connecting` until scripted
    pub fn new() -> Self {
        Self {
            status: Mutex::new(PeerConnectionStatus::Connecting),
            remote: DashMap::new(),
            ice_restarts: AtomicU32::new(0),
            screen_sharing: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn set_status(&self, status: PeerConnectionStatus) {
        *self.status.lock() = status;
        fan_out(&self.subscribers, PeerEvent::StatusChanged { status });
    }

    /// Script: ICE completed, media flowing
    pub fn complete_connection(&self) {
        self.set_status(PeerConnectionStatus::Connected);
    }

    /// Script: media path degraded
    pub fn degrade_media(&self) {
        self.set_status(PeerConnectionStatus::Reconnecting);
    }

    /// Script: media path restored
    pub fn restore_media(&self) {
        self.set_status(PeerConnectionStatus::Connected);
    }

    /// Script: media path failed beyond ICE restart
    pub fn fail_media(&self) {
        self.set_status(PeerConnectionStatus::Failed);
    }

    /// Script: a remote stream arrives for a peer
    pub fn add_remote_stream(&self, peer_id: &str, stream: StreamHandle) {
        self.remote.insert(peer_id.to_string(), stream.clone());
        fan_out(
            &self.subscribers,
            PeerEvent::RemoteStreamAdded {
                peer_id: peer_id.to_string(),
                stream,
            },
        );
    }

    /// Script: a peer's stream goes away
    pub fn remove_remote_stream(&self, peer_id: &str) {
        self.remote.remove(peer_id);
        fan_out(
            &self.subscribers,
            PeerEvent::RemoteStreamRemoved {
                peer_id: peer_id.to_string(),
            },
        );
    }

    /// Script: the engine stops publishing events, dropping every
    /// subscriber's sender (a crashed or torn-down engine loop)
    pub fn close_event_feed(&self) {
        self.subscribers.lock().clear();
    }

    /// ICE restarts requested so far
    pub fn ice_restart_count(&self) -> u32 {
        self.ice_restarts.load(Ordering::SeqCst)
    }

    /// Whether screen share is the published video source
    pub fn is_screen_sharing(&self) -> bool {
        self.screen_sharing.load(Ordering::SeqCst)
    }
}

impl Default for LoopbackPeerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerSessionEngine for LoopbackPeerEngine {
    fn status(&self) -> PeerConnectionStatus {
        *self.status.lock()
    }

    fn remote_streams(&self) -> Vec<(String, StreamHandle)> {
        self.remote
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    async fn trigger_ice_restart(&self) -> Result<(), CallError> {
        self.ice_restarts.fetch_add(1, Ordering::SeqCst);
        debug!("Loopback ICE restart requested");
        Ok(())
    }

    async fn start_screen_share(&self) -> Result<(), CallError> {
        self.screen_sharing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_screen_share(&self) -> Result<(), CallError> {
        self.screen_sharing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.remote.clear();
        *self.status.lock() = PeerConnectionStatus::Failed;
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<PeerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carertc_core::ParticipantRole;
    use carertc_media::{MediaStream, MediaTrack, TrackKind};

    fn participant() -> Participant {
        Participant {
            id: "u1".to_string(),
            display_name: "Alice".to_string(),
            role: ParticipantRole::Patient,
        }
    }

    #[tokio::test]
    async fn signaling_drop_and_restore_cycle() {
        let signaling = LoopbackSignaling::new();
        let mut events = signaling.subscribe();

        signaling.connect().await.unwrap();
        signaling.join_room("r1", &participant()).await.unwrap();
        assert!(signaling.is_connected());
        assert_eq!(signaling.joined_rooms(), vec!["r1".to_string()]);

        signaling.drop_connection("network change");
        assert!(!signaling.is_connected());
        assert!(signaling.is_reconnecting());
        assert_eq!(signaling.tick_reconnect(), 1);
        assert_eq!(signaling.tick_reconnect(), 2);
        assert_eq!(signaling.reconnect_attempts(), 2);

        signaling.restore_connection();
        assert!(signaling.is_connected());
        assert_eq!(signaling.reconnect_attempts(), 0);

        assert!(matches!(events.recv().await, Some(SignalingEvent::Connected)));
        assert!(matches!(
            events.recv().await,
            Some(SignalingEvent::Disconnected { .. })
        ));
        assert!(matches!(
            events.recv().await,
            Some(SignalingEvent::ReconnectAttempt { attempt: 1 })
        ));
    }

    #[tokio::test]
    async fn join_requires_connection() {
        let signaling = LoopbackSignaling::new();
        let err = signaling.join_room("r1", &participant()).await.unwrap_err();
        assert!(matches!(err, CallError::Signaling { .. }));
    }

    #[tokio::test]
    async fn peer_engine_emits_remote_streams() {
        let engine = LoopbackPeerEngine::new();
        let mut events = engine.subscribe();
        engine.complete_connection();

        let stream = MediaStream::new(vec![MediaTrack::new(TrackKind::Video)]);
        engine.add_remote_stream("peer-1", stream);
        assert_eq!(engine.remote_streams().len(), 1);

        assert!(matches!(
            events.recv().await,
            Some(PeerEvent::StatusChanged {
                status: PeerConnectionStatus::Connected
            })
        ));
        assert!(matches!(
            events.recv().await,
            Some(PeerEvent::RemoteStreamAdded { .. })
        ));

        engine.remove_remote_stream("peer-1");
        assert!(engine.remote_streams().is_empty());
    }

    #[tokio::test]
    async fn ice_restart_is_counted() {
        let engine = LoopbackPeerEngine::new();
        engine.degrade_media();
        engine.trigger_ice_restart().await.unwrap();
        engine.trigger_ice_restart().await.unwrap();
        assert_eq!(engine.ice_restart_count(), 2);
        assert_eq!(engine.status(), PeerConnectionStatus::Reconnecting);
    }
}

//! Event system for call lifecycle events

use carertc_core::{CallStatus, ConnectionHealth};
use tokio::sync::mpsc;

/// Call events that can occur during a consultation
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// The call status changed
    StatusChanged {
        /// New status
        status: CallStatus,
    },
    /// Connection health changed
    HealthChanged {
        /// New health classification
        health: ConnectionHealth,
    },
    /// Signaling started another reconnect attempt
    ReconnectAttempt {
        /// Attempt number
        attempt: u32,
    },
    /// The local stream was acquired and handed to the render binder
    LocalStreamReady {
        /// Stream identifier
        stream_id: String,
    },
    /// A remote stream arrived and was handed to the render binder
    RemoteStreamAdded {
        /// Peer the stream belongs to
        peer_id: String,
    },
    /// A remote stream went away
    RemoteStreamRemoved {
        /// Peer the stream belonged to
        peer_id: String,
    },
    /// Media access failed
    MediaError {
        /// Displayable cause
        message: String,
    },
    /// Reconnection budget exhausted; session recovery required
    RecoveryRequired {
        /// Why the reconnect track was abandoned
        reason: String,
    },
    /// The call ended
    SessionEnded {
        /// Why the call ended
        reason: String,
    },
}

impl CallEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            CallEvent::StatusChanged { .. } => "status_changed",
            CallEvent::HealthChanged { .. } => "health_changed",
            CallEvent::ReconnectAttempt { .. } => "reconnect_attempt",
            CallEvent::LocalStreamReady { .. } => "local_stream_ready",
            CallEvent::RemoteStreamAdded { .. } => "remote_stream_added",
            CallEvent::RemoteStreamRemoved { .. } => "remote_stream_removed",
            CallEvent::MediaError { .. } => "media_error",
            CallEvent::RecoveryRequired { .. } => "recovery_required",
            CallEvent::SessionEnded { .. } => "session_ended",
        }
    }

    /// Check if this is a stream-related event
    pub fn is_stream_event(&self) -> bool {
        matches!(
            self,
            CallEvent::LocalStreamReady { .. }
                | CallEvent::RemoteStreamAdded { .. }
                | CallEvent::RemoteStreamRemoved { .. }
        )
    }

    /// Check if this is a connection-related event
    pub fn is_connection_event(&self) -> bool {
        matches!(
            self,
            CallEvent::StatusChanged { .. }
                | CallEvent::HealthChanged { .. }
                | CallEvent::ReconnectAttempt { .. }
                | CallEvent::RecoveryRequired { .. }
        )
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, CallEvent::MediaError { .. })
    }
}

/// Stream of call events for the presentation shell
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<CallEvent>,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<CallEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event, or `None` once the call is dropped
    pub async fn next(&mut self) -> Option<CallEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive
    pub fn try_next(&mut self) -> Option<CallEvent> {
        self.rx.try_recv().ok()
    }
}

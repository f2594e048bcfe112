//! Error types for CareRTC

use thiserror::Error;

/// Main error type for CareRTC call operations
#[derive(Error, Debug)]
pub enum CallError {
    /// Camera/microphone could not be acquired
    #[error("Media access failed: {reason}")]
    MediaAccess {
        /// Reason the capture attempt failed
        reason: String,
    },

    /// Signaling channel was lost
    #[error("Signaling channel lost after {attempts} reconnect attempts")]
    SignalingLoss {
        /// Reconnect attempts made so far
        attempts: u32,
    },

    /// Signaling contract violation
    #[error("Signaling error: {reason}")]
    Signaling {
        /// Reason for the signaling error
        reason: String,
    },

    /// Peer media path degraded
    #[error("Peer media degraded: {reason}")]
    PeerMediaDegraded {
        /// Reason the media path degraded
        reason: String,
    },

    /// Persisted session record says the call cannot be resumed
    #[error("Session not recoverable: {reason}")]
    SessionNotRecoverable {
        /// Reason reported by the persistence service
        reason: String,
    },

    /// Persistence service write failed
    #[error("Persistence {operation} failed: {reason}")]
    PersistenceWrite {
        /// Operation that failed (create, heartbeat, end, recovery)
        operation: String,
        /// Reason for the failure
        reason: String,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Missing configuration error
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Missing configuration field
        field: String,
    },

    /// The call was terminated while the operation was in flight
    #[error("Call terminated")]
    Terminated,
}

impl CallError {
    /// Whether this error ends the join attempt (as opposed to a
    /// transient condition the controller recovers from on its own)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CallError::MediaAccess { .. }
                | CallError::SessionNotRecoverable { .. }
                | CallError::MissingConfiguration { .. }
        )
    }

    /// Human-readable message suitable for display in the consultation UI
    pub fn user_message(&self) -> String {
        match self {
            CallError::MediaAccess { reason } => {
                format!("Could not access your camera or microphone: {}", reason)
            }
            CallError::SignalingLoss { attempts } => {
                format!("Connection lost, reconnecting (attempt {})", attempts)
            }
            CallError::PeerMediaDegraded { .. } => "Poor connection quality".to_string(),
            CallError::SessionNotRecoverable { reason } => {
                format!("This consultation has ended: {}", reason)
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_access_is_fatal() {
        let err = CallError::MediaAccess {
            reason: "permission denied".to_string(),
        };
        assert!(err.is_fatal());
        assert!(err.user_message().contains("permission denied"));
    }

    #[test]
    fn transient_errors_are_not_fatal() {
        assert!(!CallError::SignalingLoss { attempts: 3 }.is_fatal());
        assert!(!CallError::PeerMediaDegraded {
            reason: "ice disconnected".to_string()
        }
        .is_fatal());
        assert!(!CallError::PersistenceWrite {
            operation: "heartbeat".to_string(),
            reason: "timeout".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn not_recoverable_is_fatal() {
        let err = CallError::SessionNotRecoverable {
            reason: "ended by provider".to_string(),
        };
        assert!(err.is_fatal());
    }
}

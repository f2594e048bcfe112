//! Call session model and status state machine

use crate::error::CallError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Role of a participant in a consultation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    /// The patient side of the consultation
    Patient,
    /// The provider (clinician) side of the consultation
    Provider,
}

impl ParticipantRole {
    /// Wire name used by the persistence service
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Patient => "patient",
            ParticipantRole::Provider => "provider",
        }
    }
}

/// Identity of a call participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Stable participant identifier
    pub id: String,
    /// Name shown to the other side
    pub display_name: String,
    /// Patient or provider
    pub role: ParticipantRole,
}

/// Input to a join: which room, as whom
#[derive(Debug, Clone)]
pub struct RoomSpec {
    /// Room identifier shared by both participants
    pub room_id: String,
    /// Local participant identity
    pub participant: Participant,
}

impl RoomSpec {
    /// Validate the spec before any media or network work starts
    pub fn validate(&self) -> Result<(), CallError> {
        if self.room_id.trim().is_empty() {
            return Err(CallError::MissingConfiguration {
                field: "room_id".to_string(),
            });
        }
        if self.participant.id.trim().is_empty() {
            return Err(CallError::MissingConfiguration {
                field: "participant.id".to_string(),
            });
        }
        Ok(())
    }
}

/// Lifecycle status of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// No call in progress
    Idle,
    /// Acquiring local camera/microphone
    RequestingMedia,
    /// Media acquired, joining signaling room and negotiating peer media
    Joining,
    /// Both signaling and peer media are healthy
    Connected,
    /// At least one of signaling/peer media degraded; automatic reconnect running
    Reconnecting,
    /// Reconnect budget exhausted; resuming from the persisted record
    Recovering,
    /// Terminated by a participant
    Ended,
    /// Unrecoverable; a fresh join is required
    Failed,
}

impl CallStatus {
    /// Whether the state machine permits a transition to `next`
    ///
    /// Explicit termination is permitted from every state.
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        if next == CallStatus::Ended {
            return true;
        }
        matches!(
            (self, next),
            (CallStatus::Idle, CallStatus::RequestingMedia)
                | (CallStatus::RequestingMedia, CallStatus::Joining)
                | (CallStatus::RequestingMedia, CallStatus::Idle)
                | (CallStatus::Joining, CallStatus::Connected)
                | (CallStatus::Joining, CallStatus::Failed)
                | (CallStatus::Connected, CallStatus::Reconnecting)
                | (CallStatus::Reconnecting, CallStatus::Connected)
                | (CallStatus::Reconnecting, CallStatus::Recovering)
                | (CallStatus::Recovering, CallStatus::Connected)
                | (CallStatus::Recovering, CallStatus::Joining)
                | (CallStatus::Recovering, CallStatus::Failed)
                | (CallStatus::Ended, CallStatus::Idle)
                | (CallStatus::Failed, CallStatus::Idle)
        )
    }

    /// Whether the session is in an active (non-terminal, non-idle) state
    pub fn is_active(&self) -> bool {
        !matches!(self, CallStatus::Idle | CallStatus::Ended | CallStatus::Failed)
    }

    /// Status name as used in logs and heartbeats
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Idle => "idle",
            CallStatus::RequestingMedia => "requesting_media",
            CallStatus::Joining => "joining",
            CallStatus::Connected => "connected",
            CallStatus::Reconnecting => "reconnecting",
            CallStatus::Recovering => "recovering",
            CallStatus::Ended => "ended",
            CallStatus::Failed => "failed",
        }
    }
}

/// Connection health exposed to the consultation UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    /// Both signaling and peer media healthy
    Good,
    /// One track degraded, automatic reconnect running
    Poor,
    /// Reconnect budget exhausted, session recovery in progress
    Recovering,
}

/// Client-side view of one call, mirrored to the persistence service
///
/// `started_at` is set exactly once, on the first transition into
/// `Connected`, and survives every reconnect so the visible call timer
/// never resets. `session_id` is issued by the persistence service on the
/// first successful create and stays stable while the session is live.
#[derive(Debug, Clone)]
pub struct CallSession {
    /// Room identifier; primary key for all recovery lookups
    pub room_id: String,
    /// Server-issued record id, absent until the first persistence write
    pub session_id: Option<String>,
    /// Local participant identity
    pub participant: Participant,
    /// Current lifecycle status
    pub status: CallStatus,
    /// Moment of the first transition into `Connected`
    pub started_at: Option<Instant>,
    /// Signaling reconnect attempts since the last healthy period
    pub reconnect_attempts: u32,
}

impl CallSession {
    /// Create a fresh idle session for a room
    pub fn new(spec: &RoomSpec) -> Self {
        Self {
            room_id: spec.room_id.clone(),
            session_id: None,
            participant: spec.participant.clone(),
            status: CallStatus::Idle,
            started_at: None,
            reconnect_attempts: 0,
        }
    }

    /// Move to `next`, enforcing the transition table
    pub fn transition(&mut self, next: CallStatus) -> Result<(), CallError> {
        if !self.status.can_transition_to(next) {
            return Err(CallError::InvalidState {
                expected: format!("a state permitting {}", next.as_str()),
                actual: self.status.as_str().to_string(),
            });
        }
        if next == CallStatus::Connected && self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        if next == CallStatus::Connected {
            self.reconnect_attempts = 0;
        }
        self.status = next;
        Ok(())
    }

    /// Record the server-issued session id
    ///
    /// A session id once obtained is stable for the lifetime of the room;
    /// replacing a live id is a contract violation.
    pub fn set_session_id(&mut self, id: String) -> Result<(), CallError> {
        match &self.session_id {
            Some(existing) if *existing != id && self.status.is_active() => {
                Err(CallError::InvalidState {
                    expected: format!("session id {}", existing),
                    actual: id,
                })
            }
            _ => {
                self.session_id = Some(id);
                Ok(())
            }
        }
    }

    /// Elapsed call time, frozen at zero until first connect
    ///
    /// Derived from `started_at`, so it keeps counting through
    /// reconnects and never resets except by a fresh join.
    pub fn call_duration(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    /// Reset to idle for a fresh join, dropping all per-call state
    pub fn reset(&mut self) {
        self.session_id = None;
        self.status = CallStatus::Idle;
        self.started_at = None;
        self.reconnect_attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> RoomSpec {
        RoomSpec {
            room_id: "room-1".to_string(),
            participant: Participant {
                id: "patient-1".to_string(),
                display_name: "Alice".to_string(),
                role: ParticipantRole::Patient,
            },
        }
    }

    #[test]
    fn validates_empty_room_id() {
        let mut s = spec();
        s.room_id = "  ".to_string();
        assert!(matches!(
            s.validate(),
            Err(CallError::MissingConfiguration { .. })
        ));
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn happy_path_transitions() {
        let mut session = CallSession::new(&spec());
        session.transition(CallStatus::RequestingMedia).unwrap();
        session.transition(CallStatus::Joining).unwrap();
        session.transition(CallStatus::Connected).unwrap();
        assert!(session.started_at.is_some());
        session.transition(CallStatus::Reconnecting).unwrap();
        session.transition(CallStatus::Connected).unwrap();
        session.transition(CallStatus::Ended).unwrap();
    }

    #[test]
    fn rejects_illegal_transitions() {
        let mut session = CallSession::new(&spec());
        assert!(session.transition(CallStatus::Connected).is_err());
        session.transition(CallStatus::RequestingMedia).unwrap();
        assert!(session.transition(CallStatus::Reconnecting).is_err());
    }

    #[test]
    fn ended_reachable_from_every_state() {
        for status in [
            CallStatus::Idle,
            CallStatus::RequestingMedia,
            CallStatus::Joining,
            CallStatus::Connected,
            CallStatus::Reconnecting,
            CallStatus::Recovering,
            CallStatus::Failed,
        ] {
            assert!(status.can_transition_to(CallStatus::Ended));
        }
    }

    #[test]
    fn started_at_survives_reconnect() {
        let mut session = CallSession::new(&spec());
        session.transition(CallStatus::RequestingMedia).unwrap();
        session.transition(CallStatus::Joining).unwrap();
        session.transition(CallStatus::Connected).unwrap();
        let started = session.started_at.unwrap();

        session.transition(CallStatus::Reconnecting).unwrap();
        session.transition(CallStatus::Connected).unwrap();
        assert_eq!(session.started_at.unwrap(), started);
    }

    #[test]
    fn session_id_is_stable_while_active() {
        let mut session = CallSession::new(&spec());
        session.set_session_id("s-1".to_string()).unwrap();
        session.transition(CallStatus::RequestingMedia).unwrap();
        session.transition(CallStatus::Joining).unwrap();
        // Re-recording the same id is fine
        session.set_session_id("s-1".to_string()).unwrap();
        // Reissuing a different id while live is not
        assert!(session.set_session_id("s-2".to_string()).is_err());
        session.transition(CallStatus::Ended).unwrap();
        session.set_session_id("s-2".to_string()).unwrap();
    }

    #[test]
    fn duration_zero_before_connect() {
        let session = CallSession::new(&spec());
        assert_eq!(session.call_duration(), Duration::ZERO);
    }
}

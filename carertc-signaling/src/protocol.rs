//! Signaling wire messages
//!
//! The room-membership subset of the coordination protocol the call
//! controller consumes. Offer/answer/candidate payloads stay opaque to
//! this crate; the peer engine owns negotiation.

use carertc_core::ParticipantRole;
use serde::{Deserialize, Serialize};

/// Messages exchanged over the signaling channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMessage {
    /// Join a consultation room
    JoinRoom {
        /// Room ID
        room_id: String,
        /// Participant ID
        participant_id: String,
        /// Display name shown to the other side
        display_name: String,
        /// Patient or provider
        role: ParticipantRole,
    },
    /// Leave a consultation room
    LeaveRoom {
        /// Room ID
        room_id: String,
        /// Participant ID
        participant_id: String,
    },
    /// Another participant joined the room
    PeerJoined {
        /// Room ID
        room_id: String,
        /// Participant ID of the peer
        participant_id: String,
        /// Display name of the peer
        display_name: String,
    },
    /// Another participant left the room
    PeerLeft {
        /// Room ID
        room_id: String,
        /// Participant ID of the peer
        participant_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_room_wire_shape() {
        let message = SignalMessage::JoinRoom {
            room_id: "r1".to_string(),
            participant_id: "u1".to_string(),
            display_name: "Alice".to_string(),
            role: ParticipantRole::Patient,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "join_room");
        assert_eq!(json["role"], "patient");

        let back: SignalMessage = serde_json::from_value(json).unwrap();
        assert!(matches!(back, SignalMessage::JoinRoom { .. }));
    }
}

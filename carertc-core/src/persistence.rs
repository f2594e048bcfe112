//! Session Persistence Service contract
//!
//! Wire types and the `SessionStore` trait the call controller talks to.
//! The server owns the record: another participant or the server itself
//! may end a session concurrently, so a "not found / not active" answer is
//! authoritative even when local state still says connected.

use crate::error::CallError;
use crate::session::ParticipantRole;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Request body for creating a session record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Room the session belongs to
    pub room_id: String,
    /// Participant creating the record
    pub user_id: String,
    /// Display name of the participant
    pub user_name: String,
    /// Participant role
    pub user_type: ParticipantRole,
}

/// Response body for a session create
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    /// The created (or already existing active) record
    pub session: SessionRecord,
}

/// One participant as stored on the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordParticipant {
    /// Participant id
    pub user_id: String,
    /// Display name
    pub user_name: String,
    /// Participant role
    pub user_type: ParticipantRole,
}

/// Server-side record of an in-progress call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Server-issued record id
    pub id: String,
    /// Room the session belongs to
    pub room_id: String,
    /// Record status (`active` or `ended`)
    pub status: String,
    /// Participants known to the server
    pub participants: Vec<RecordParticipant>,
    /// Last heartbeat received from any participant
    pub last_heartbeat_at: DateTime<Utc>,
    /// Whether the session can still be joined/resumed
    pub is_active: bool,
}

/// Heartbeat pushed while the call is connected or reconnecting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    /// Session record id
    pub session_id: String,
    /// Participant sending the heartbeat
    pub user_id: String,
    /// Controller's view of the signaling channel
    pub connection_state: String,
    /// Controller's view of the peer media path
    pub ice_state: String,
}

/// Recovery query sent before resuming a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRequest {
    /// Room to resume
    pub room_id: String,
    /// Participant asking to resume
    pub user_id: String,
}

/// Answer to a recovery query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResponse {
    /// Whether the session can be resumed
    pub can_recover: bool,
    /// Reason when recovery is refused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The active record when recovery is possible
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<SessionRecord>,
}

/// Contract against the server-side Session Persistence Service
///
/// Every method is a network round-trip on real deployments; callers
/// treat failures per the call-lifecycle policy (create/recovery failures
/// propagate, heartbeat failures are advisory).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session record for the room, or return the existing
    /// active one (create is idempotent per active room)
    async fn create(&self, request: CreateSessionRequest) -> Result<CreateSessionResponse, CallError>;

    /// Look up the active record for a room, if any
    async fn find_by_room(&self, room_id: &str) -> Result<Option<SessionRecord>, CallError>;

    /// Record a heartbeat; rejected for ended or unknown sessions and
    /// never resurrects a record
    async fn heartbeat(&self, request: HeartbeatRequest) -> Result<(), CallError>;

    /// Mark the record ended on behalf of a participant
    async fn end_session(&self, session_id: &str, user_id: &str) -> Result<(), CallError>;

    /// Ask whether a participant may resume a room's session
    async fn recovery_query(&self, request: RecoveryRequest) -> Result<RecoveryResponse, CallError>;
}

/// In-memory implementation of the persistence contract
///
/// Reference implementation of the server-side lifecycle rules; used by
/// tests and demos in place of the HTTP service.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    records: DashMap<String, SessionRecord>,
}

impl InMemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records (active and ended) held by the store
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Force-end the active record for a room, as another participant or
    /// a server-side expiry would
    pub fn end_room(&self, room_id: &str) {
        for mut entry in self.records.iter_mut() {
            if entry.room_id == room_id && entry.is_active {
                entry.is_active = false;
                entry.status = "ended".to_string();
            }
        }
    }

    fn active_record_for_room(&self, room_id: &str) -> Option<SessionRecord> {
        self.records
            .iter()
            .find(|r| r.room_id == room_id && r.is_active)
            .map(|r| r.clone())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, request: CreateSessionRequest) -> Result<CreateSessionResponse, CallError> {
        if let Some(mut existing) = self.active_record_for_room(&request.room_id) {
            // Second participant joining the same consultation
            if !existing.participants.iter().any(|p| p.user_id == request.user_id) {
                existing.participants.push(RecordParticipant {
                    user_id: request.user_id.clone(),
                    user_name: request.user_name.clone(),
                    user_type: request.user_type,
                });
                self.records.insert(existing.id.clone(), existing.clone());
            }
            debug!(room_id = %request.room_id, session_id = %existing.id, "Reusing active session record");
            return Ok(CreateSessionResponse { session: existing });
        }

        let record = SessionRecord {
            id: Uuid::new_v4().to_string(),
            room_id: request.room_id.clone(),
            status: "active".to_string(),
            participants: vec![RecordParticipant {
                user_id: request.user_id,
                user_name: request.user_name,
                user_type: request.user_type,
            }],
            last_heartbeat_at: Utc::now(),
            is_active: true,
        };
        debug!(room_id = %record.room_id, session_id = %record.id, "Created session record");
        self.records.insert(record.id.clone(), record.clone());
        Ok(CreateSessionResponse { session: record })
    }

    async fn find_by_room(&self, room_id: &str) -> Result<Option<SessionRecord>, CallError> {
        Ok(self.active_record_for_room(room_id))
    }

    async fn heartbeat(&self, request: HeartbeatRequest) -> Result<(), CallError> {
        match self.records.get_mut(&request.session_id) {
            Some(mut record) if record.is_active => {
                record.last_heartbeat_at = Utc::now();
                Ok(())
            }
            _ => Err(CallError::PersistenceWrite {
                operation: "heartbeat".to_string(),
                reason: format!("session {} is not active", request.session_id),
            }),
        }
    }

    async fn end_session(&self, session_id: &str, _user_id: &str) -> Result<(), CallError> {
        match self.records.get_mut(session_id) {
            Some(mut record) => {
                record.is_active = false;
                record.status = "ended".to_string();
                Ok(())
            }
            None => Err(CallError::PersistenceWrite {
                operation: "end".to_string(),
                reason: format!("session {} not found", session_id),
            }),
        }
    }

    async fn recovery_query(&self, request: RecoveryRequest) -> Result<RecoveryResponse, CallError> {
        match self.active_record_for_room(&request.room_id) {
            Some(record) if record.participants.iter().any(|p| p.user_id == request.user_id) => {
                Ok(RecoveryResponse {
                    can_recover: true,
                    reason: None,
                    data: Some(record),
                })
            }
            Some(_) => Ok(RecoveryResponse {
                can_recover: false,
                reason: Some("participant was never part of this session".to_string()),
                data: None,
            }),
            None => Ok(RecoveryResponse {
                can_recover: false,
                reason: Some("session has ended or expired".to_string()),
                data: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request(room: &str, user: &str) -> CreateSessionRequest {
        CreateSessionRequest {
            room_id: room.to_string(),
            user_id: user.to_string(),
            user_name: format!("User {}", user),
            user_type: ParticipantRole::Patient,
        }
    }

    #[tokio::test]
    async fn create_is_idempotent_per_active_room() {
        let store = InMemorySessionStore::new();
        let first = store.create(create_request("r1", "u1")).await.unwrap();
        let second = store.create(create_request("r1", "u2")).await.unwrap();
        assert_eq!(first.session.id, second.session.id);
        assert_eq!(second.session.participants.len(), 2);
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn ended_room_gets_a_fresh_record() {
        let store = InMemorySessionStore::new();
        let first = store.create(create_request("r1", "u1")).await.unwrap();
        store.end_session(&first.session.id, "u1").await.unwrap();
        let second = store.create(create_request("r1", "u1")).await.unwrap();
        assert_ne!(first.session.id, second.session.id);
    }

    #[tokio::test]
    async fn heartbeat_never_resurrects_an_ended_session() {
        let store = InMemorySessionStore::new();
        let created = store.create(create_request("r1", "u1")).await.unwrap();
        store.end_session(&created.session.id, "u1").await.unwrap();

        let result = store
            .heartbeat(HeartbeatRequest {
                session_id: created.session.id.clone(),
                user_id: "u1".to_string(),
                connection_state: "connected".to_string(),
                ice_state: "connected".to_string(),
            })
            .await;
        assert!(result.is_err());
        assert!(store.find_by_room("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recovery_query_reports_ended_sessions() {
        let store = InMemorySessionStore::new();
        let created = store.create(create_request("r1", "u1")).await.unwrap();

        let answer = store
            .recovery_query(RecoveryRequest {
                room_id: "r1".to_string(),
                user_id: "u1".to_string(),
            })
            .await
            .unwrap();
        assert!(answer.can_recover);
        assert_eq!(answer.data.unwrap().id, created.session.id);

        store.end_session(&created.session.id, "u1").await.unwrap();
        let answer = store
            .recovery_query(RecoveryRequest {
                room_id: "r1".to_string(),
                user_id: "u1".to_string(),
            })
            .await
            .unwrap();
        assert!(!answer.can_recover);
        assert!(answer.reason.is_some());
    }

    #[test]
    fn wire_names_are_camel_case() {
        let request = HeartbeatRequest {
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
            connection_state: "connected".to_string(),
            ice_state: "checking".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("sessionId").is_some());
        assert!(json.get("connectionState").is_some());
        assert!(json.get("iceState").is_some());
    }
}

//! # CareRTC Core
//!
//! Session model, error taxonomy, persistence contract, and resume
//! breadcrumbs for the CareRTC consultation session manager. This crate
//! provides the foundational types the call controller drives: the
//! session status state machine, the server-side session record contract,
//! and the durable breadcrumb that lets a restarted client rediscover an
//! in-progress call.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod breadcrumb;
pub mod error;
pub mod persistence;
pub mod session;

// Re-export main types
pub use breadcrumb::{BreadcrumbStore, FileBreadcrumbStore, InMemoryBreadcrumbStore, ResumeBreadcrumb};
pub use error::CallError;
pub use persistence::{
    CreateSessionRequest, CreateSessionResponse, HeartbeatRequest, InMemorySessionStore,
    RecoveryRequest, RecoveryResponse, SessionRecord, SessionStore,
};
pub use session::{
    CallSession, CallStatus, ConnectionHealth, Participant, ParticipantRole, RoomSpec,
};

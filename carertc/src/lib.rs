//! # CareRTC - Telemedicine Consultation Session Manager
//!
//! CareRTC keeps a patient↔provider video consultation alive: it drives
//! the call through capture → join → monitor → recover → terminate,
//! reconciles signaling loss and media-path loss as independent failure
//! domains, keeps rendered video surfaces bound to the right streams,
//! and resumes an in-progress call after a full client restart.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use carertc::{CallSessionController, CallConfig};
//! use carertc::{InMemoryBreadcrumbStore, InMemorySessionStore};
//! use carertc::{LocalDeviceCapture, LoopbackPeerEngine, LoopbackSignaling};
//! use carertc::{Participant, ParticipantRole, RoomSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = CallSessionController::builder()
//!         .capture(Arc::new(LocalDeviceCapture::new()))
//!         .signaling(Arc::new(LoopbackSignaling::new()))
//!         .peer_engine(Arc::new(LoopbackPeerEngine::new()))
//!         .session_store(Arc::new(InMemorySessionStore::new()))
//!         .breadcrumbs(Arc::new(InMemoryBreadcrumbStore::new()))
//!         .config(CallConfig::default())
//!         .build()?;
//!
//!     // A restarted client resumes its previous call before anything else
//!     if controller.resume_from_breadcrumb().await?.is_none() {
//!         controller.initiate_join(RoomSpec {
//!             room_id: "consult-123".to_string(),
//!             participant: Participant {
//!                 id: "patient-7".to_string(),
//!                 display_name: "Alice".to_string(),
//!                 role: ParticipantRole::Patient,
//!             },
//!         }).await?;
//!     }
//!
//!     let mut events = controller.events();
//!     while let Some(event) = events.next().await {
//!         println!("Call event: {:?}", event);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use carertc_core::{
    BreadcrumbStore, CallError, CallSession, CallStatus, ConnectionHealth, CreateSessionRequest,
    FileBreadcrumbStore, HeartbeatRequest, InMemoryBreadcrumbStore, InMemorySessionStore,
    Participant, ParticipantRole, RecoveryRequest, RecoveryResponse, ResumeBreadcrumb, RoomSpec,
    SessionRecord, SessionStore,
};

pub use carertc_media::{
    CaptureConstraints, CaptureMode, LocalDeviceCapture, MediaCapture, MediaStream, MediaTrack,
    PlaybackState, PlayError, RenderConfig, RenderSurface, StreamHandle, StreamRenderBinder,
    SurfaceKey,
    TrackKind,
};

pub use carertc_signaling::{
    LoopbackPeerEngine, LoopbackSignaling, PeerConnectionStatus, PeerEvent, PeerSessionEngine,
    SignalingClient, SignalingEvent,
};

// Public API modules
pub mod config;
pub mod controller;
pub mod event;
pub mod health;

// Re-export main API types
pub use config::CallConfig;
pub use controller::{CallBuilder, CallSessionController};
pub use event::{CallEvent, EventStream};
pub use health::HealthTracker;

//! Call session controller
//!
//! Orchestrates capture, signaling, the peer engine, and the persistence
//! service into one lifecycle: initiate → join → monitor → recover →
//! terminate. Signaling loss and media-path loss are reconciled as two
//! independent health tracks: either degrading puts the call into
//! `Reconnecting`, and both must recover before it leaves.

use crate::config::CallConfig;
use crate::event::{CallEvent, EventStream};
use crate::health::HealthTracker;
use carertc_core::{
    BreadcrumbStore, CallError, CallSession, CallStatus, ConnectionHealth, CreateSessionRequest,
    HeartbeatRequest, RecoveryRequest, ResumeBreadcrumb, RoomSpec, SessionStore,
};
use carertc_media::{MediaCapture, StreamHandle, StreamRenderBinder, SurfaceKey, TrackKind};
use carertc_signaling::{
    PeerConnectionStatus, PeerEvent, PeerSessionEngine, SignalingClient, SignalingEvent,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fluent builder wiring the controller to its collaborators
pub struct CallBuilder {
    config: CallConfig,
    capture: Option<Arc<dyn MediaCapture>>,
    signaling: Option<Arc<dyn SignalingClient>>,
    peer: Option<Arc<dyn PeerSessionEngine>>,
    store: Option<Arc<dyn SessionStore>>,
    breadcrumbs: Option<Arc<dyn BreadcrumbStore>>,
}

impl CallBuilder {
    pub(crate) fn new() -> Self {
        Self {
            config: CallConfig::default(),
            capture: None,
            signaling: None,
            peer: None,
            store: None,
            breadcrumbs: None,
        }
    }

    /// Override lifecycle configuration
    pub fn config(mut self, config: CallConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the local media capture implementation
    pub fn capture(mut self, capture: Arc<dyn MediaCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Set the signaling client (required)
    pub fn signaling(mut self, signaling: Arc<dyn SignalingClient>) -> Self {
        self.signaling = Some(signaling);
        self
    }

    /// Set the peer session engine (required)
    pub fn peer_engine(mut self, peer: Arc<dyn PeerSessionEngine>) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Set the session persistence service (required)
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the durable breadcrumb store (required)
    pub fn breadcrumbs(mut self, breadcrumbs: Arc<dyn BreadcrumbStore>) -> Self {
        self.breadcrumbs = Some(breadcrumbs);
        self
    }

    /// Build the controller
    pub fn build(self) -> Result<CallSessionController, CallError> {
        let missing = |field: &str| CallError::MissingConfiguration {
            field: field.to_string(),
        };
        let (status_tx, _) = watch::channel(CallStatus::Idle);
        let binder = Arc::new(StreamRenderBinder::new(self.config.render.clone()));
        Ok(CallSessionController {
            shared: Arc::new(Shared {
                config: self.config,
                capture: self.capture.ok_or_else(|| missing("capture"))?,
                signaling: self.signaling.ok_or_else(|| missing("signaling"))?,
                peer: self.peer.ok_or_else(|| missing("peer_engine"))?,
                store: self.store.ok_or_else(|| missing("session_store"))?,
                breadcrumbs: self.breadcrumbs.ok_or_else(|| missing("breadcrumbs"))?,
                binder,
                health: HealthTracker::new(),
                session: RwLock::new(None),
                local_stream: Mutex::new(None),
                media_error: Mutex::new(None),
                last_health: Mutex::new(ConnectionHealth::Good),
                screen_sharing: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                status_tx,
                subscribers: Mutex::new(Vec::new()),
                heartbeat_task: Mutex::new(None),
                supervisor_task: Mutex::new(None),
            }),
        })
    }
}

struct Shared {
    config: CallConfig,
    capture: Arc<dyn MediaCapture>,
    signaling: Arc<dyn SignalingClient>,
    peer: Arc<dyn PeerSessionEngine>,
    store: Arc<dyn SessionStore>,
    breadcrumbs: Arc<dyn BreadcrumbStore>,
    binder: Arc<StreamRenderBinder>,
    health: HealthTracker,
    session: RwLock<Option<CallSession>>,
    /// Exclusively owned: only the controller may stop these tracks
    local_stream: Mutex<Option<StreamHandle>>,
    media_error: Mutex<Option<String>>,
    last_health: Mutex<ConnectionHealth>,
    screen_sharing: AtomicBool,
    /// Termination generation; in-flight completions under a stale
    /// epoch are discarded instead of applied
    epoch: AtomicU64,
    status_tx: watch::Sender<CallStatus>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<CallEvent>>>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
    supervisor_task: Mutex<Option<JoinHandle<()>>>,
}

/// Drives one consultation call through its lifecycle
pub struct CallSessionController {
    shared: Arc<Shared>,
}

impl CallSessionController {
    /// Start wiring a controller
    pub fn builder() -> CallBuilder {
        CallBuilder::new()
    }

    /// Join a consultation room; resumes the existing session record when
    /// the persistence service knows one for the room
    ///
    /// Fails with a displayable [`CallError::MediaAccess`] when capture
    /// fails, leaving the controller idle for a retry.
    pub async fn initiate_join(&self, spec: RoomSpec) -> Result<(), CallError> {
        self.shared.initiate_join(spec).await
    }

    /// Scan durable breadcrumbs and resume the most recent call the
    /// persistence service still considers active
    ///
    /// Returns the resumed room id, or `None` when no breadcrumb
    /// survived revalidation. Stale breadcrumbs are discarded.
    pub async fn resume_from_breadcrumb(&self) -> Result<Option<String>, CallError> {
        self.shared.resume_from_breadcrumb().await
    }

    /// Recover the session via the persistence record after the
    /// reconnect budget ran out (or on explicit user request)
    pub async fn request_recovery(&self) -> Result<(), CallError> {
        self.shared.request_recovery().await
    }

    /// End the call: best-effort cleanup that never fails the caller
    pub async fn terminate(&self) {
        self.shared.terminate("ended by local participant").await;
    }

    /// Manual reconnect: re-establish signaling and restart ICE
    pub async fn retry_connection(&self) -> Result<(), CallError> {
        if !self.shared.signaling.is_connected() {
            self.shared.signaling.connect().await?;
        }
        self.shared.peer.trigger_ice_restart().await
    }

    /// Mute/unmute the local camera; returns the new enabled state
    pub fn toggle_video(&self) -> Result<bool, CallError> {
        self.shared.toggle_local(TrackKind::Video)
    }

    /// Mute/unmute the local microphone; returns the new enabled state
    pub fn toggle_mic(&self) -> Result<bool, CallError> {
        self.shared.toggle_local(TrackKind::Audio)
    }

    /// Switch the published video source between camera and screen;
    /// returns whether screen share is now active
    pub async fn toggle_screen_share(&self) -> Result<bool, CallError> {
        if self.shared.screen_sharing.load(Ordering::SeqCst) {
            self.shared.peer.stop_screen_share().await?;
            self.shared.screen_sharing.store(false, Ordering::SeqCst);
            Ok(false)
        } else {
            self.shared.peer.start_screen_share().await?;
            self.shared.screen_sharing.store(true, Ordering::SeqCst);
            Ok(true)
        }
    }

    /// Current lifecycle status
    pub fn status(&self) -> CallStatus {
        self.shared.status()
    }

    /// Watch channel mirroring the status
    pub fn status_watch(&self) -> watch::Receiver<CallStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Elapsed call time; frozen at zero before connect, continuous
    /// across reconnects, reset only by a fresh join
    pub fn call_duration(&self) -> std::time::Duration {
        self.shared
            .session
            .read()
            .as_ref()
            .map(|s| s.call_duration())
            .unwrap_or_default()
    }

    /// Displayable cause of the last media failure, if any
    pub fn media_error(&self) -> Option<String> {
        self.shared.media_error.lock().clone()
    }

    /// Signaling reconnect attempts since the last healthy period
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.signaling.reconnect_attempts()
    }

    /// Connection health for UI display
    pub fn connection_health(&self) -> ConnectionHealth {
        self.shared.health.classify(self.status())
    }

    /// The local stream, while one is held (self-view rendering)
    pub fn local_stream(&self) -> Option<StreamHandle> {
        self.shared.local_stream.lock().clone()
    }

    /// Server-issued session id, once the first persistence write landed
    pub fn session_id(&self) -> Option<String> {
        self.shared
            .session
            .read()
            .as_ref()
            .and_then(|s| s.session_id.clone())
    }

    /// The render binder; the presentation shell registers its video
    /// surfaces here
    pub fn render_binder(&self) -> Arc<StreamRenderBinder> {
        Arc::clone(&self.shared.binder)
    }

    /// Subscribe to call lifecycle events
    pub fn events(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscribers.lock().push(tx);
        EventStream::new(rx)
    }
}

impl Drop for CallSessionController {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.heartbeat_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.shared.supervisor_task.lock().take() {
            handle.abort();
        }
    }
}

impl Shared {
    fn status(&self) -> CallStatus {
        self.session
            .read()
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(CallStatus::Idle)
    }

    fn emit(&self, event: CallEvent) {
        self.subscribers.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn set_status(&self, next: CallStatus) -> Result<(), CallError> {
        {
            let mut guard = self.session.write();
            let session = guard.as_mut().ok_or_else(|| CallError::InvalidState {
                expected: "an existing session".to_string(),
                actual: "no session".to_string(),
            })?;
            session.transition(next)?;
        }
        debug!(status = next.as_str(), "Call status changed");
        let _ = self.status_tx.send(next);
        self.emit(CallEvent::StatusChanged { status: next });
        self.publish_health();
        Ok(())
    }

    fn publish_health(&self) {
        let health = self.health.classify(self.status());
        let mut last = self.last_health.lock();
        if *last != health {
            *last = health;
            self.emit(CallEvent::HealthChanged { health });
        }
    }

    fn epoch_now(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn check_epoch(&self, epoch: u64) -> Result<(), CallError> {
        if self.epoch_now() != epoch {
            Err(CallError::Terminated)
        } else {
            Ok(())
        }
    }

    async fn initiate_join(self: &Arc<Self>, spec: RoomSpec) -> Result<(), CallError> {
        spec.validate()?;
        {
            let mut guard = self.session.write();
            if let Some(existing) = guard.as_ref() {
                if existing.status.is_active() {
                    return Err(CallError::InvalidState {
                        expected: "idle".to_string(),
                        actual: existing.status.as_str().to_string(),
                    });
                }
            }
            *guard = Some(CallSession::new(&spec));
        }
        let epoch = self.epoch_now();
        self.set_status(CallStatus::RequestingMedia)?;

        // An active record makes this join a resume rather than a fresh one
        let resume_record = match self.store.find_by_room(&spec.room_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Persistence lookup failed; treating as fresh join");
                None
            }
        };
        self.check_epoch(epoch)?;

        let stream = match self.capture.acquire(self.config.capture).await {
            Ok(stream) => stream,
            Err(e) => {
                let message = e.user_message();
                *self.media_error.lock() = Some(message.clone());
                self.emit(CallEvent::MediaError { message });
                let _ = self.set_status(CallStatus::Idle);
                return Err(e);
            }
        };
        if self.check_epoch(epoch).is_err() {
            // Terminated while the permission prompt was up
            stream.stop_all_tracks();
            return Err(CallError::Terminated);
        }
        *self.media_error.lock() = None;
        *self.local_stream.lock() = Some(Arc::clone(&stream));
        self.binder.bind(SurfaceKey::Local, Arc::clone(&stream));
        self.emit(CallEvent::LocalStreamReady {
            stream_id: stream.id.clone(),
        });
        self.set_status(CallStatus::Joining)?;

        // Subscribe before connecting so the supervisor misses nothing
        let signaling_rx = self.signaling.subscribe();
        let peer_rx = self.peer.subscribe();

        if !self.signaling.is_connected() {
            if let Err(e) = self.signaling.connect().await {
                self.fail_join();
                return Err(e);
            }
        }
        if let Err(e) = self.signaling.join_room(&spec.room_id, &spec.participant).await {
            self.fail_join();
            return Err(e);
        }
        self.check_epoch(epoch)?;

        // Persisted record: reuse on resume, create otherwise. A dead
        // persistence service degrades only cross-restart recovery.
        match resume_record {
            Some(record) => {
                info!(room_id = %spec.room_id, session_id = %record.id, "Resuming existing session record");
                self.record_session_id(record.id)?;
            }
            None => {
                let request = CreateSessionRequest {
                    room_id: spec.room_id.clone(),
                    user_id: spec.participant.id.clone(),
                    user_name: spec.participant.display_name.clone(),
                    user_type: spec.participant.role,
                };
                match self.store.create(request).await {
                    Ok(response) => self.record_session_id(response.session.id)?,
                    Err(e) => {
                        warn!(error = %e, "Session record creation failed; continuing without persistence")
                    }
                }
            }
        }
        self.check_epoch(epoch)?;
        self.save_breadcrumb();

        let wait_rx = self.peer.subscribe();
        if let Err(e) = self.wait_for_peer(wait_rx).await {
            self.fail_join();
            return Err(e);
        }
        self.check_epoch(epoch)?;

        self.health.reset();
        self.set_status(CallStatus::Connected)?;
        self.bind_known_remote_streams();
        self.start_background_tasks(signaling_rx, peer_rx);
        Ok(())
    }

    async fn resume_from_breadcrumb(self: &Arc<Self>) -> Result<Option<String>, CallError> {
        for crumb in self.breadcrumbs.scan()? {
            match self.store.find_by_room(&crumb.room_id).await {
                Ok(Some(record)) if record.is_active => {
                    info!(room_id = %crumb.room_id, "Resuming consultation from breadcrumb");
                    let spec = RoomSpec {
                        room_id: crumb.room_id.clone(),
                        participant: crumb.participant.clone(),
                    };
                    self.initiate_join(spec).await?;
                    return Ok(Some(crumb.room_id));
                }
                Ok(_) => {
                    // The server is the source of truth; a breadcrumb for
                    // an ended session is garbage, not a resume target
                    debug!(room_id = %crumb.room_id, "Discarding stale breadcrumb");
                    if let Err(e) = self.breadcrumbs.clear(&crumb.room_id) {
                        warn!(error = %e, "Could not clear stale breadcrumb");
                    }
                }
                Err(e) => {
                    warn!(room_id = %crumb.room_id, error = %e, "Breadcrumb revalidation failed");
                }
            }
        }
        Ok(None)
    }

    async fn request_recovery(self: &Arc<Self>) -> Result<(), CallError> {
        let epoch = self.epoch_now();
        let (room_id, participant) = {
            let guard = self.session.read();
            let session = guard.as_ref().ok_or_else(|| CallError::InvalidState {
                expected: "an existing session".to_string(),
                actual: "no session".to_string(),
            })?;
            (session.room_id.clone(), session.participant.clone())
        };
        match self.status() {
            CallStatus::Reconnecting => self.set_status(CallStatus::Recovering)?,
            CallStatus::Recovering => {}
            other => {
                // Ended/failed sessions need a fresh join, not recovery
                return Err(CallError::InvalidState {
                    expected: "reconnecting or recovering".to_string(),
                    actual: other.as_str().to_string(),
                });
            }
        }

        let answer = self
            .store
            .recovery_query(RecoveryRequest {
                room_id: room_id.clone(),
                user_id: participant.id.clone(),
            })
            .await?;
        self.check_epoch(epoch)?;

        if !answer.can_recover {
            let reason = answer
                .reason
                .unwrap_or_else(|| "session is no longer active".to_string());
            let _ = self.set_status(CallStatus::Failed);
            if let Err(e) = self.breadcrumbs.clear(&room_id) {
                warn!(error = %e, "Could not clear breadcrumb for failed session");
            }
            self.emit(CallEvent::SessionEnded {
                reason: reason.clone(),
            });
            return Err(CallError::SessionNotRecoverable { reason });
        }
        if let Some(record) = answer.data {
            self.record_session_id(record.id)?;
        }

        // Re-acquire media only if the held stream is gone or dead
        let held_stream = self.local_stream.lock().clone();
        let stream = match held_stream {
            Some(stream) if stream.has_live_track() => stream,
            _ => {
                let stream = self.capture.acquire(self.config.capture).await.map_err(|e| {
                    let message = e.user_message();
                    *self.media_error.lock() = Some(message.clone());
                    self.emit(CallEvent::MediaError { message });
                    e
                })?;
                self.check_epoch(epoch)?;
                *self.local_stream.lock() = Some(Arc::clone(&stream));
                self.emit(CallEvent::LocalStreamReady {
                    stream_id: stream.id.clone(),
                });
                stream
            }
        };
        self.binder.bind(SurfaceKey::Local, stream);

        if !self.signaling.is_connected() {
            self.signaling.connect().await?;
        }
        self.signaling.join_room(&room_id, &participant).await?;
        if let Err(e) = self.peer.trigger_ice_restart().await {
            warn!(error = %e, "ICE restart request failed during recovery");
        }
        let wait_rx = self.peer.subscribe();
        self.wait_for_peer(wait_rx).await?;
        self.check_epoch(epoch)?;

        self.health.reset();
        self.set_status(CallStatus::Connected)?;
        self.save_breadcrumb();
        self.bind_known_remote_streams();
        Ok(())
    }

    async fn terminate(self: &Arc<Self>, reason: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.heartbeat_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.supervisor_task.lock().take() {
            handle.abort();
        }

        let snapshot = {
            let guard = self.session.read();
            guard
                .as_ref()
                .map(|s| (s.room_id.clone(), s.session_id.clone(), s.participant.id.clone()))
        };

        if self.status() != CallStatus::Idle {
            let _ = self.set_status(CallStatus::Ended);
            self.emit(CallEvent::SessionEnded {
                reason: reason.to_string(),
            });
        }

        // Local tracks are exclusively ours to stop
        if let Some(stream) = self.local_stream.lock().take() {
            stream.stop_all_tracks();
        }
        self.binder.shutdown();
        self.screen_sharing.store(false, Ordering::SeqCst);

        if let Some((room_id, session_id, user_id)) = snapshot {
            if let Some(session_id) = session_id {
                if let Err(e) = self.store.end_session(&session_id, &user_id).await {
                    warn!(error = %e, "Could not end session record during terminate");
                }
            }
            if let Err(e) = self.signaling.leave_room(&room_id, &user_id).await {
                warn!(error = %e, "Could not leave signaling room during terminate");
            }
            if let Err(e) = self.breadcrumbs.clear(&room_id) {
                warn!(error = %e, "Could not clear breadcrumb during terminate");
            }
        }
        self.signaling.disconnect().await;
        self.peer.close().await;

        if let Some(session) = self.session.write().as_mut() {
            session.reset();
        }
        let _ = self.status_tx.send(CallStatus::Idle);
        info!("Call terminated");
    }

    fn toggle_local(&self, kind: TrackKind) -> Result<bool, CallError> {
        let stream = self.local_stream.lock().clone().ok_or_else(|| CallError::InvalidState {
            expected: "a live local stream".to_string(),
            actual: "no local stream".to_string(),
        })?;
        stream.toggle_kind(kind).ok_or_else(|| CallError::MediaAccess {
            reason: match kind {
                TrackKind::Video => "no video track to toggle".to_string(),
                TrackKind::Audio => "no audio track to toggle".to_string(),
            },
        })
    }

    fn record_session_id(&self, id: String) -> Result<(), CallError> {
        let mut guard = self.session.write();
        let session = guard.as_mut().ok_or_else(|| CallError::InvalidState {
            expected: "an existing session".to_string(),
            actual: "no session".to_string(),
        })?;
        session.set_session_id(id)
    }

    /// Write the resume breadcrumb; failure degrades only cross-restart
    /// recovery, never the live call
    fn save_breadcrumb(&self) {
        let crumb = {
            let guard = self.session.read();
            guard.as_ref().map(|s| ResumeBreadcrumb {
                room_id: s.room_id.clone(),
                session_id: s.session_id.clone(),
                participant: s.participant.clone(),
                saved_at: Utc::now(),
            })
        };
        if let Some(crumb) = crumb {
            if let Err(e) = self.breadcrumbs.save(&crumb) {
                warn!(error = %e, "Could not save resume breadcrumb");
            }
        }
    }

    fn bind_known_remote_streams(&self) {
        for (peer_id, stream) in self.peer.remote_streams() {
            self.binder.bind(SurfaceKey::Remote(peer_id.clone()), stream);
            self.emit(CallEvent::RemoteStreamAdded { peer_id });
        }
    }

    fn fail_join(&self) {
        if let Some(stream) = self.local_stream.lock().take() {
            stream.stop_all_tracks();
        }
        self.binder.remove_surface(&SurfaceKey::Local);
        let _ = self.set_status(CallStatus::Failed);
    }

    async fn wait_for_peer(&self, mut events: mpsc::UnboundedReceiver<PeerEvent>) -> Result<(), CallError> {
        if self.peer.status() == PeerConnectionStatus::Connected {
            return Ok(());
        }
        let connected = tokio::time::timeout(self.config.join_timeout, async {
            while let Some(event) = events.recv().await {
                if matches!(
                    event,
                    PeerEvent::StatusChanged {
                        status: PeerConnectionStatus::Connected
                    }
                ) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);

        if connected || self.peer.status() == PeerConnectionStatus::Connected {
            Ok(())
        } else {
            Err(CallError::PeerMediaDegraded {
                reason: "timed out waiting for peer media".to_string(),
            })
        }
    }

    fn start_background_tasks(
        self: &Arc<Self>,
        signaling_rx: mpsc::UnboundedReceiver<SignalingEvent>,
        peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    ) {
        let supervisor = tokio::spawn(supervisor_loop(Arc::clone(self), signaling_rx, peer_rx));
        if let Some(old) = self.supervisor_task.lock().replace(supervisor) {
            old.abort();
        }
        let heartbeat = tokio::spawn(heartbeat_loop(Arc::clone(self)));
        if let Some(old) = self.heartbeat_task.lock().replace(heartbeat) {
            old.abort();
        }
    }

    fn enter_reconnecting(&self) {
        if self.status() == CallStatus::Connected {
            let _ = self.set_status(CallStatus::Reconnecting);
        } else {
            self.publish_health();
        }
    }

    fn leave_reconnecting_if_healthy(&self) {
        if self.health.both_healthy() && self.status() == CallStatus::Reconnecting {
            let _ = self.set_status(CallStatus::Connected);
        } else {
            self.publish_health();
        }
    }
}

/// Reconciles signaling and peer events into the session status
///
/// One collaborator closing its event feed must not stop monitoring of
/// the other, so each channel's closure is tracked separately.
async fn supervisor_loop(
    shared: Arc<Shared>,
    mut signaling_rx: mpsc::UnboundedReceiver<SignalingEvent>,
    mut peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
) {
    let mut signaling_open = true;
    let mut peer_open = true;
    while signaling_open || peer_open {
        tokio::select! {
            event = signaling_rx.recv(), if signaling_open => match event {
                None => signaling_open = false,
                Some(SignalingEvent::Disconnected { reason }) => {
                    debug!(reason, "Signaling channel lost");
                    shared.health.set_signaling(false);
                    shared.enter_reconnecting();
                }
                Some(SignalingEvent::ReconnectAttempt { attempt }) => {
                    if let Some(session) = shared.session.write().as_mut() {
                        session.reconnect_attempts = attempt;
                    }
                    shared.emit(CallEvent::ReconnectAttempt { attempt });
                    if shared.status() == CallStatus::Reconnecting
                        && shared.health.budget_exhausted(attempt, &shared.config)
                    {
                        let reason = format!("reconnect budget exhausted after {} attempts", attempt);
                        warn!(attempt, "Escalating to session recovery");
                        let _ = shared.set_status(CallStatus::Recovering);
                        shared.emit(CallEvent::RecoveryRequired { reason });
                    }
                }
                Some(SignalingEvent::Reconnected) | Some(SignalingEvent::Connected) => {
                    shared.health.set_signaling(true);
                    shared.leave_reconnecting_if_healthy();
                }
                Some(SignalingEvent::PeerJoined { participant_id, .. }) => {
                    debug!(participant_id, "Peer joined room");
                }
                Some(SignalingEvent::PeerLeft { participant_id }) => {
                    shared.binder.remove_surface(&SurfaceKey::Remote(participant_id.clone()));
                    shared.emit(CallEvent::RemoteStreamRemoved { peer_id: participant_id });
                }
            },
            event = peer_rx.recv(), if peer_open => match event {
                None => peer_open = false,
                Some(PeerEvent::StatusChanged { status }) => match status {
                    PeerConnectionStatus::Connected => {
                        shared.health.set_media(true);
                        shared.leave_reconnecting_if_healthy();
                    }
                    PeerConnectionStatus::Reconnecting | PeerConnectionStatus::Failed => {
                        shared.health.set_media(false);
                        shared.enter_reconnecting();
                        if let Err(e) = shared.peer.trigger_ice_restart().await {
                            warn!(error = %e, "ICE restart request failed");
                        }
                    }
                    PeerConnectionStatus::Connecting => {}
                },
                Some(PeerEvent::RemoteStreamAdded { peer_id, stream }) => {
                    shared.binder.bind(SurfaceKey::Remote(peer_id.clone()), stream);
                    shared.emit(CallEvent::RemoteStreamAdded { peer_id });
                }
                Some(PeerEvent::RemoteStreamRemoved { peer_id }) => {
                    shared.binder.remove_surface(&SurfaceKey::Remote(peer_id.clone()));
                    shared.emit(CallEvent::RemoteStreamRemoved { peer_id });
                }
            },
        }
    }
}

/// Pushes one heartbeat per tick while the call is connected or
/// reconnecting; failures are advisory and never affect the call
async fn heartbeat_loop(shared: Arc<Shared>) {
    let mut interval = tokio::time::interval(shared.config.heartbeat_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so a heartbeat never
    // races the connect that started this loop
    interval.tick().await;
    loop {
        interval.tick().await;
        let epoch = shared.epoch.load(Ordering::SeqCst);
        let request = {
            let guard = shared.session.read();
            match guard.as_ref() {
                Some(session)
                    if matches!(
                        session.status,
                        CallStatus::Connected | CallStatus::Reconnecting
                    ) =>
                {
                    match &session.session_id {
                        Some(session_id) => HeartbeatRequest {
                            session_id: session_id.clone(),
                            user_id: session.participant.id.clone(),
                            connection_state: shared.health.connection_state().to_string(),
                            ice_state: shared.health.ice_state().to_string(),
                        },
                        None => continue,
                    }
                }
                _ => continue,
            }
        };
        let result = shared.store.heartbeat(request).await;
        if shared.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Discarding heartbeat completion after termination");
            continue;
        }
        if let Err(e) = result {
            warn!(error = %e, "Heartbeat failed (advisory only)");
        }
    }
}

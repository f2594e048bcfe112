//! Stream render binding
//!
//! Keeps media streams attached to their render surfaces. Surfaces may
//! not exist yet when a stream becomes available, streams may arrive with
//! zero live tracks, and playback can stall silently; the binder retries
//! with backoff, binds idempotently by stream identity, and periodically
//! re-plays stalled surfaces.

use crate::stream::StreamHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Playback refused by the surface (autoplay policy, device contention)
#[derive(Error, Debug)]
#[error("play refused: {reason}")]
pub struct PlayError {
    /// Reason the surface refused to start playback
    pub reason: String,
}

/// Observable playback state of a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Actively rendering
    Playing,
    /// Attached but not rendering
    Paused,
    /// Playback finished or surface torn down
    Ended,
}

/// One render surface (a video element, in browser terms)
///
/// The binder only attaches and plays; it never stops the stream's
/// tracks. Remote streams are owned by the peer engine.
pub trait RenderSurface: Send + Sync {
    /// Attach a stream to the surface, replacing any previous one
    fn attach(&self, stream: StreamHandle);

    /// Detach whatever is attached
    fn detach(&self);

    /// Start playback of the attached stream
    fn play(&self) -> Result<(), PlayError>;

    /// Current playback state
    fn playback_state(&self) -> PlaybackState;
}

/// Which surface a binding targets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SurfaceKey {
    /// The local self-view
    Local,
    /// The remote view for one peer
    Remote(String),
}

impl fmt::Display for SurfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceKey::Local => write!(f, "local"),
            SurfaceKey::Remote(peer) => write!(f, "remote:{}", peer),
        }
    }
}

/// Render binder timing configuration
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Base delay for bind retries; attempt n waits `base × (n + 1)`
    pub bind_retry_base: Duration,
    /// Retries per stream instance before the binder gives up on it
    pub max_bind_retries: u32,
    /// How often stalled-but-bound surfaces are re-played
    pub heal_interval: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            bind_retry_base: Duration::from_millis(1000),
            max_bind_retries: 5,
            heal_interval: Duration::from_secs(2),
        }
    }
}

impl RenderConfig {
    /// Millisecond-scale timings for tests
    pub fn fast() -> Self {
        Self {
            bind_retry_base: Duration::from_millis(10),
            max_bind_retries: 5,
            heal_interval: Duration::from_millis(20),
        }
    }
}

/// Per-surface binding state
struct Binding {
    surface: Option<Arc<dyn RenderSurface>>,
    bound_stream: Option<StreamHandle>,
    /// Stream waiting for a surface or for a live track
    pending: Option<StreamHandle>,
    retry_count: u32,
    /// Stream instance whose retry budget is exhausted
    abandoned: Option<StreamHandle>,
    retry_task: Option<JoinHandle<()>>,
}

impl Binding {
    fn new() -> Self {
        Self {
            surface: None,
            bound_stream: None,
            pending: None,
            retry_count: 0,
            abandoned: None,
            retry_task: None,
        }
    }

    fn cancel_retry(&mut self) {
        if let Some(task) = self.retry_task.take() {
            task.abort();
        }
    }
}

struct BinderInner {
    config: RenderConfig,
    bindings: Mutex<HashMap<SurfaceKey, Binding>>,
}

/// Binds media streams to render surfaces, one binding per surface key
///
/// N remote bindings plus one local binding, each retried independently:
/// one peer's dead stream never blocks another peer's binding. Retry
/// exhaustion is scoped to the stream instance, never to the surface —
/// a new stream for the same key binds normally.
pub struct StreamRenderBinder {
    inner: Arc<BinderInner>,
    heal_task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamRenderBinder {
    /// Create a binder; no task is spawned until the first binding, so
    /// construction works outside an async runtime
    pub fn new(config: RenderConfig) -> Self {
        Self {
            inner: Arc::new(BinderInner {
                config,
                bindings: Mutex::new(HashMap::new()),
            }),
            heal_task: Mutex::new(None),
        }
    }

    /// Start the self-healing loop on the first binding
    fn ensure_heal_task(&self) {
        let mut heal_task = self.heal_task.lock();
        if heal_task.is_some() {
            return;
        }
        let heal_inner = Arc::clone(&self.inner);
        let interval_duration = heal_inner.config.heal_interval;
        *heal_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_duration);
            loop {
                interval.tick().await;
                heal_inner.heal_tick();
            }
        }));
    }

    /// Make a surface available for its key
    ///
    /// A stream that arrived before the surface is bound immediately.
    pub fn register_surface(&self, key: SurfaceKey, surface: Arc<dyn RenderSurface>) {
        self.ensure_heal_task();
        let mut bindings = self.inner.bindings.lock();
        let binding = bindings.entry(key.clone()).or_insert_with(Binding::new);
        binding.surface = Some(surface);
        if let Some(stream) = binding.pending.take() {
            binding.cancel_retry();
            BinderInner::try_bind(&self.inner, &key, binding, stream);
        }
    }

    /// Tear down the binding for a key (peer left, view unmounted)
    pub fn remove_surface(&self, key: &SurfaceKey) {
        let mut bindings = self.inner.bindings.lock();
        if let Some(mut binding) = bindings.remove(key) {
            binding.cancel_retry();
            if let Some(surface) = &binding.surface {
                surface.detach();
            }
            debug!(surface = %key, "Removed render binding");
        }
    }

    /// Offer a stream for a surface key
    ///
    /// Implements the bind protocol: liveness gate, identity-based
    /// idempotence, attach + best-effort play, retry reset on success.
    pub fn bind(&self, key: SurfaceKey, stream: StreamHandle) {
        self.ensure_heal_task();
        let mut bindings = self.inner.bindings.lock();
        let binding = bindings.entry(key.clone()).or_insert_with(Binding::new);

        // Idempotent: the exact stream already on the surface
        if let Some(bound) = &binding.bound_stream {
            if Arc::ptr_eq(bound, &stream) {
                return;
            }
        }
        // A stream instance we already gave up on stays given up
        if let Some(abandoned) = &binding.abandoned {
            if Arc::ptr_eq(abandoned, &stream) {
                debug!(surface = %key, stream_id = %stream.id, "Ignoring exhausted stream instance");
                return;
            }
        }
        // The instance already waiting on a retry keeps its schedule and
        // its budget; re-offers must not restart the backoff
        if let Some(pending) = &binding.pending {
            if Arc::ptr_eq(pending, &stream) {
                return;
            }
        }

        // A new instance supersedes any in-flight retry schedule
        binding.cancel_retry();
        binding.retry_count = 0;
        binding.abandoned = None;
        BinderInner::try_bind(&self.inner, &key, binding, stream);
    }

    /// Whether a live bind is in place for the key
    pub fn is_bound(&self, key: &SurfaceKey) -> bool {
        self.inner
            .bindings
            .lock()
            .get(key)
            .map(|b| b.bound_stream.is_some())
            .unwrap_or(false)
    }

    /// Current retry count for the key's pending stream
    pub fn retry_count(&self, key: &SurfaceKey) -> u32 {
        self.inner
            .bindings
            .lock()
            .get(key)
            .map(|b| b.retry_count)
            .unwrap_or(0)
    }

    /// Detach everything and stop all timers
    pub fn shutdown(&self) {
        if let Some(task) = self.heal_task.lock().take() {
            task.abort();
        }
        let mut bindings = self.inner.bindings.lock();
        for (key, binding) in bindings.iter_mut() {
            binding.cancel_retry();
            if let Some(surface) = &binding.surface {
                surface.detach();
            }
            binding.bound_stream = None;
            binding.pending = None;
            debug!(surface = %key, "Detached on shutdown");
        }
        bindings.clear();
    }
}

impl Drop for StreamRenderBinder {
    fn drop(&mut self) {
        if let Some(task) = self.heal_task.lock().take() {
            task.abort();
        }
        let mut bindings = self.inner.bindings.lock();
        for binding in bindings.values_mut() {
            binding.cancel_retry();
        }
    }
}

impl BinderInner {
    /// Attempt a bind now; on a missing surface or a dead stream,
    /// schedule a backoff retry instead of binding and flickering
    fn try_bind(inner: &Arc<BinderInner>, key: &SurfaceKey, binding: &mut Binding, stream: StreamHandle) {
        let surface = match &binding.surface {
            Some(surface) if stream.has_live_track() => Arc::clone(surface),
            _ => {
                Self::schedule_retry(inner, key, binding, stream);
                return;
            }
        };

        surface.attach(Arc::clone(&stream));
        if let Err(e) = surface.play() {
            // Autoplay refusals are expected; the heal loop picks them up
            warn!(surface = %key, error = %e, "Play failed after attach");
        }
        debug!(surface = %key, stream_id = %stream.id, "Bound stream to surface");
        binding.bound_stream = Some(stream);
        binding.pending = None;
        binding.retry_count = 0;
        binding.abandoned = None;
        binding.retry_task = None;
    }

    fn schedule_retry(inner: &Arc<BinderInner>, key: &SurfaceKey, binding: &mut Binding, stream: StreamHandle) {
        if binding.retry_count >= inner.config.max_bind_retries {
            warn!(
                surface = %key,
                stream_id = %stream.id,
                retries = binding.retry_count,
                "Giving up on stream instance; surface stays ready for a new one"
            );
            binding.abandoned = Some(stream);
            binding.pending = None;
            binding.retry_task = None;
            return;
        }

        let delay = inner.config.bind_retry_base * (binding.retry_count + 1);
        binding.retry_count += 1;
        binding.pending = Some(Arc::clone(&stream));
        debug!(surface = %key, attempt = binding.retry_count, delay_ms = delay.as_millis() as u64, "Scheduling bind retry");

        let retry_inner = Arc::clone(inner);
        let retry_key = key.clone();
        binding.retry_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            retry_inner.retry_tick(&retry_key, stream);
        }));
    }

    /// Retry firing for a scheduled stream; superseded schedules no-op
    fn retry_tick(self: &Arc<Self>, key: &SurfaceKey, expected: StreamHandle) {
        let mut bindings = self.bindings.lock();
        let Some(binding) = bindings.get_mut(key) else {
            return;
        };
        let still_pending = binding
            .pending
            .as_ref()
            .map(|p| Arc::ptr_eq(p, &expected))
            .unwrap_or(false);
        if !still_pending {
            return;
        }
        Self::try_bind(self, key, binding, expected);
    }

    /// Re-play any surface that stalled without raising an error
    fn heal_tick(&self) {
        let bindings = self.bindings.lock();
        for (key, binding) in bindings.iter() {
            let (Some(surface), Some(_)) = (&binding.surface, &binding.bound_stream) else {
                continue;
            };
            if surface.playback_state() != PlaybackState::Playing {
                debug!(surface = %key, "Re-playing stalled surface");
                if let Err(e) = surface.play() {
                    warn!(surface = %key, error = %e, "Heal replay failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{MediaStream, MediaTrack, TrackKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSurface {
        attaches: AtomicU32,
        state: Mutex<PlaybackState>,
    }

    impl CountingSurface {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                attaches: AtomicU32::new(0),
                state: Mutex::new(PlaybackState::Paused),
            })
        }
    }

    impl RenderSurface for CountingSurface {
        fn attach(&self, _stream: StreamHandle) {
            self.attaches.fetch_add(1, Ordering::SeqCst);
        }
        fn detach(&self) {}
        fn play(&self) -> Result<(), PlayError> {
            *self.state.lock() = PlaybackState::Playing;
            Ok(())
        }
        fn playback_state(&self) -> PlaybackState {
            *self.state.lock()
        }
    }

    #[test]
    fn construction_needs_no_runtime() {
        let binder = StreamRenderBinder::new(RenderConfig::fast());
        assert!(!binder.is_bound(&SurfaceKey::Local));
    }

    #[tokio::test]
    async fn repeated_bind_of_same_stream_attaches_once() {
        let binder = StreamRenderBinder::new(RenderConfig::fast());
        let surface = CountingSurface::new();
        binder.register_surface(SurfaceKey::Local, surface.clone());

        let stream = MediaStream::new(vec![MediaTrack::new(TrackKind::Video)]);
        binder.bind(SurfaceKey::Local, stream.clone());
        binder.bind(SurfaceKey::Local, stream.clone());
        binder.bind(SurfaceKey::Local, stream);

        assert_eq!(surface.attaches.load(Ordering::SeqCst), 1);
        assert!(binder.is_bound(&SurfaceKey::Local));
    }

    #[tokio::test]
    async fn dead_stream_is_never_bound() {
        let binder = StreamRenderBinder::new(RenderConfig::fast());
        let surface = CountingSurface::new();
        binder.register_surface(SurfaceKey::Local, surface.clone());

        let stream = MediaStream::new(vec![MediaTrack::new_dead(TrackKind::Video)]);
        binder.bind(SurfaceKey::Local, stream);

        // All five retries fire well within this window
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(surface.attaches.load(Ordering::SeqCst), 0);
        assert!(!binder.is_bound(&SurfaceKey::Local));
    }

    #[tokio::test]
    async fn stream_arriving_before_surface_binds_on_register() {
        let binder = StreamRenderBinder::new(RenderConfig::fast());
        let stream = MediaStream::new(vec![MediaTrack::new(TrackKind::Video)]);
        binder.bind(SurfaceKey::Remote("peer-1".to_string()), stream);

        let surface = CountingSurface::new();
        binder.register_surface(SurfaceKey::Remote("peer-1".to_string()), surface.clone());
        assert_eq!(surface.attaches.load(Ordering::SeqCst), 1);
    }
}

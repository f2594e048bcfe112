//! Integration tests for the stream render binder
//!
//! Exercises the bind protocol end to end: liveness gating with backoff,
//! per-stream retry exhaustion, play-failure tolerance, self-healing of
//! stalled playback, and independence of concurrent bindings.

use carertc_media::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Surface double that records every attach/play and whose playback
/// state and play behavior the test can script
struct ScriptedSurface {
    attaches: AtomicU32,
    plays: AtomicU32,
    refuse_play: AtomicBool,
    state: Mutex<PlaybackState>,
}

impl ScriptedSurface {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            attaches: AtomicU32::new(0),
            plays: AtomicU32::new(0),
            refuse_play: AtomicBool::new(false),
            state: Mutex::new(PlaybackState::Paused),
        })
    }

    fn attach_count(&self) -> u32 {
        self.attaches.load(Ordering::SeqCst)
    }

    fn play_count(&self) -> u32 {
        self.plays.load(Ordering::SeqCst)
    }

    fn stall(&self) {
        *self.state.lock() = PlaybackState::Paused;
    }
}

impl RenderSurface for ScriptedSurface {
    fn attach(&self, _stream: StreamHandle) {
        self.attaches.fetch_add(1, Ordering::SeqCst);
    }

    fn detach(&self) {
        *self.state.lock() = PlaybackState::Ended;
    }

    fn play(&self) -> Result<(), carertc_media::render::PlayError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        if self.refuse_play.load(Ordering::SeqCst) {
            return Err(carertc_media::render::PlayError {
                reason: "autoplay blocked".to_string(),
            });
        }
        *self.state.lock() = PlaybackState::Playing;
        Ok(())
    }

    fn playback_state(&self) -> PlaybackState {
        *self.state.lock()
    }
}

fn live_stream() -> StreamHandle {
    MediaStream::new(vec![
        MediaTrack::new(TrackKind::Video),
        MediaTrack::new(TrackKind::Audio),
    ])
}

fn dead_stream() -> StreamHandle {
    MediaStream::new(vec![MediaTrack::new_dead(TrackKind::Video)])
}

#[tokio::test]
async fn dead_stream_binds_once_a_track_goes_live() {
    let binder = StreamRenderBinder::new(RenderConfig::fast());
    let surface = ScriptedSurface::new();
    let key = SurfaceKey::Remote("peer-1".to_string());
    binder.register_surface(key.clone(), surface.clone());

    let stream = dead_stream();
    binder.bind(key.clone(), stream.clone());
    assert_eq!(surface.attach_count(), 0);

    // Let a couple of retries fire against the still-dead stream
    tokio::time::sleep(Duration::from_millis(35)).await;
    assert_eq!(surface.attach_count(), 0);
    let attempts_so_far = binder.retry_count(&key);
    assert!(attempts_so_far >= 1 && attempts_so_far <= 5);

    // Producer catches up mid-schedule
    stream.tracks()[0].set_live(true);
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(surface.attach_count(), 1);
    assert!(binder.is_bound(&key));
    // Successful bind resets the retry counter
    assert_eq!(binder.retry_count(&key), 0);
}

#[tokio::test]
async fn exhausted_stream_instance_does_not_poison_the_surface() {
    let binder = StreamRenderBinder::new(RenderConfig::fast());
    let surface = ScriptedSurface::new();
    let key = SurfaceKey::Remote("peer-1".to_string());
    binder.register_surface(key.clone(), surface.clone());

    let doomed = dead_stream();
    binder.bind(key.clone(), doomed.clone());

    // 5 retries at 10,20,30,40,50ms — exhausted well before 300ms
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(surface.attach_count(), 0);

    // Re-offering the exhausted instance stays a no-op, even live
    doomed.tracks()[0].set_live(true);
    binder.bind(key.clone(), doomed);
    assert_eq!(surface.attach_count(), 0);

    // A fresh stream instance for the same surface binds immediately
    binder.bind(key.clone(), live_stream());
    assert_eq!(surface.attach_count(), 1);
    assert!(binder.is_bound(&key));
}

#[tokio::test]
async fn reoffering_a_pending_stream_keeps_its_retry_budget() {
    let binder = StreamRenderBinder::new(RenderConfig::fast());
    let surface = ScriptedSurface::new();
    let key = SurfaceKey::Remote("peer-1".to_string());
    binder.register_surface(key.clone(), surface.clone());

    let stream = dead_stream();
    binder.bind(key.clone(), stream.clone());
    // A peer-engine event loop may re-offer the same dead instance on
    // every renegotiation tick; the running schedule must not restart
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(30)).await;
        binder.bind(key.clone(), stream.clone());
    }

    // 5 retries fire within the first ~150ms, so by now the instance is
    // exhausted; even going live it stays abandoned
    stream.tracks()[0].set_live(true);
    binder.bind(key.clone(), stream);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(surface.attach_count(), 0);
    assert!(!binder.is_bound(&key));
}

#[tokio::test]
async fn play_refusal_does_not_unbind() {
    let binder = StreamRenderBinder::new(RenderConfig::fast());
    let surface = ScriptedSurface::new();
    surface.refuse_play.store(true, Ordering::SeqCst);
    binder.register_surface(SurfaceKey::Local, surface.clone());

    binder.bind(SurfaceKey::Local, live_stream());

    // Attached and considered bound despite the refused play
    assert_eq!(surface.attach_count(), 1);
    assert!(binder.is_bound(&SurfaceKey::Local));

    // Once the policy relents, the heal loop starts playback
    surface.refuse_play.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(surface.playback_state(), PlaybackState::Playing);
}

#[tokio::test]
async fn heal_loop_replays_stalled_surface() {
    let binder = StreamRenderBinder::new(RenderConfig::fast());
    let surface = ScriptedSurface::new();
    binder.register_surface(SurfaceKey::Local, surface.clone());
    binder.bind(SurfaceKey::Local, live_stream());
    assert_eq!(surface.playback_state(), PlaybackState::Playing);

    let plays_before = surface.play_count();
    surface.stall();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(surface.play_count() > plays_before);
    assert_eq!(surface.playback_state(), PlaybackState::Playing);
}

#[tokio::test]
async fn one_peers_dead_stream_never_blocks_another() {
    let binder = StreamRenderBinder::new(RenderConfig::fast());
    let stuck = ScriptedSurface::new();
    let healthy = ScriptedSurface::new();
    let stuck_key = SurfaceKey::Remote("peer-stuck".to_string());
    let healthy_key = SurfaceKey::Remote("peer-healthy".to_string());
    binder.register_surface(stuck_key.clone(), stuck.clone());
    binder.register_surface(healthy_key.clone(), healthy.clone());

    binder.bind(stuck_key.clone(), dead_stream());
    binder.bind(healthy_key.clone(), live_stream());

    assert!(binder.is_bound(&healthy_key));
    assert!(!binder.is_bound(&stuck_key));
    assert_eq!(healthy.attach_count(), 1);
    assert_eq!(stuck.attach_count(), 0);
}

#[tokio::test]
async fn new_stream_replaces_bound_stream() {
    let binder = StreamRenderBinder::new(RenderConfig::fast());
    let surface = ScriptedSurface::new();
    binder.register_surface(SurfaceKey::Local, surface.clone());

    binder.bind(SurfaceKey::Local, live_stream());
    // Renegotiation hands us a different instance for the same surface
    binder.bind(SurfaceKey::Local, live_stream());

    assert_eq!(surface.attach_count(), 2);
}

#[tokio::test]
async fn shutdown_detaches_and_stops_retries() {
    let binder = StreamRenderBinder::new(RenderConfig::fast());
    let surface = ScriptedSurface::new();
    let key = SurfaceKey::Remote("peer-1".to_string());
    binder.register_surface(key.clone(), surface.clone());

    let stream = dead_stream();
    binder.bind(key.clone(), stream.clone());
    binder.shutdown();

    // Retries cancelled: going live afterwards changes nothing
    stream.tracks()[0].set_live(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(surface.attach_count(), 0);
    assert_eq!(surface.playback_state(), PlaybackState::Ended);
}

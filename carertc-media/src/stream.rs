//! Media stream and track model
//!
//! Streams are shared as `Arc<MediaStream>`; identity for bind decisions
//! is pointer identity (`Arc::ptr_eq`), never content comparison, so a
//! renegotiated stream with the same tracks still counts as a new
//! instance.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Shared handle to a media stream
pub type StreamHandle = Arc<MediaStream>;

/// Kind of media a track carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Microphone or remote audio
    Audio,
    /// Camera, screen share, or remote video
    Video,
}

/// One audio or video track within a stream
#[derive(Debug)]
pub struct MediaTrack {
    /// Track identifier
    pub id: String,
    /// Audio or video
    pub kind: TrackKind,
    live: AtomicBool,
    enabled: AtomicBool,
}

impl MediaTrack {
    /// Create a live, enabled track
    pub fn new(kind: TrackKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            live: AtomicBool::new(true),
            enabled: AtomicBool::new(true),
        }
    }

    /// Create a track that exists but is not yet producing media
    ///
    /// Remote streams can arrive in this state transiently; the render
    /// binder refuses to bind them until a track goes live.
    pub fn new_dead(kind: TrackKind) -> Self {
        let track = Self::new(kind);
        track.live.store(false, Ordering::SeqCst);
        track
    }

    /// Whether the track is actively producing media
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Mark the track live (producer started)
    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }

    /// Permanently stop the track
    pub fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    /// Whether the track is enabled (unmuted)
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Enable or disable (mute) the track without stopping it
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

/// A collection of tracks rendered together on one surface
#[derive(Debug)]
pub struct MediaStream {
    /// Stream identifier
    pub id: String,
    tracks: RwLock<Vec<Arc<MediaTrack>>>,
}

impl MediaStream {
    /// Create a stream from tracks
    pub fn new(tracks: Vec<MediaTrack>) -> StreamHandle {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            tracks: RwLock::new(tracks.into_iter().map(Arc::new).collect()),
        })
    }

    /// Create a stream with no tracks at all
    pub fn empty() -> StreamHandle {
        Self::new(Vec::new())
    }

    /// Snapshot of the stream's tracks
    pub fn tracks(&self) -> Vec<Arc<MediaTrack>> {
        self.tracks.read().clone()
    }

    /// Add a track after creation (late producer)
    pub fn add_track(&self, track: MediaTrack) {
        self.tracks.write().push(Arc::new(track));
    }

    /// Whether at least one track is actively producing media
    ///
    /// This is the liveness gate the render binder applies before any
    /// attach: a stream object existing is not the same as it carrying
    /// usable media.
    pub fn has_live_track(&self) -> bool {
        self.tracks.read().iter().any(|t| t.is_live())
    }

    /// Stop every track. Only the stream's owner may call this.
    pub fn stop_all_tracks(&self) {
        for track in self.tracks.read().iter() {
            track.stop();
        }
    }

    /// Enable/disable every track of a kind (video mute, mic mute)
    ///
    /// Returns the new enabled state, or `None` when the stream has no
    /// track of that kind.
    pub fn toggle_kind(&self, kind: TrackKind) -> Option<bool> {
        let tracks = self.tracks.read();
        let mut result = None;
        for track in tracks.iter().filter(|t| t.kind == kind) {
            let next = !track.is_enabled();
            track.set_enabled(next);
            result = Some(next);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_requires_a_live_track() {
        let stream = MediaStream::new(vec![MediaTrack::new_dead(TrackKind::Video)]);
        assert!(!stream.has_live_track());

        stream.tracks()[0].set_live(true);
        assert!(stream.has_live_track());
    }

    #[test]
    fn empty_stream_is_never_live() {
        assert!(!MediaStream::empty().has_live_track());
    }

    #[test]
    fn stop_all_tracks_kills_liveness() {
        let stream = MediaStream::new(vec![
            MediaTrack::new(TrackKind::Audio),
            MediaTrack::new(TrackKind::Video),
        ]);
        assert!(stream.has_live_track());
        stream.stop_all_tracks();
        assert!(!stream.has_live_track());
        assert!(stream.tracks().iter().all(|t| !t.is_live()));
    }

    #[test]
    fn toggle_kind_flips_only_matching_tracks() {
        let stream = MediaStream::new(vec![
            MediaTrack::new(TrackKind::Audio),
            MediaTrack::new(TrackKind::Video),
        ]);
        assert_eq!(stream.toggle_kind(TrackKind::Video), Some(false));
        let tracks = stream.tracks();
        let video = tracks.iter().find(|t| t.kind == TrackKind::Video).unwrap();
        let audio = tracks.iter().find(|t| t.kind == TrackKind::Audio).unwrap();
        assert!(!video.is_enabled());
        assert!(audio.is_enabled());
    }

    #[test]
    fn toggle_kind_without_matching_track() {
        let stream = MediaStream::new(vec![MediaTrack::new(TrackKind::Audio)]);
        assert_eq!(stream.toggle_kind(TrackKind::Video), None);
    }

    #[test]
    fn identity_is_by_pointer() {
        let a = MediaStream::new(vec![MediaTrack::new(TrackKind::Video)]);
        let b = a.clone();
        let c = MediaStream::new(vec![MediaTrack::new(TrackKind::Video)]);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}

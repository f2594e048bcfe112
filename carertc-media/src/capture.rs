//! Local camera/microphone acquisition
//!
//! Capture sits behind a trait so the controller never talks to a device
//! API directly; the device layer belongs to the hosting application.

use crate::stream::{MediaStream, MediaTrack, StreamHandle, TrackKind};
use async_trait::async_trait;
use carertc_core::CallError;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Which kinds of media a join wants to capture
#[derive(Debug, Clone, Copy)]
pub struct CaptureConstraints {
    /// Request a camera track
    pub video: bool,
    /// Request a microphone track
    pub audio: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

/// Capture seam: acquire the local media stream for a call
///
/// A call acquires exactly one local stream; the stream is owned by the
/// call controller, which is the only component allowed to stop its
/// tracks. An acquisition that yields zero tracks must fail with
/// `MediaAccess`.
#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Acquire camera/microphone per the constraints
    async fn acquire(&self, constraints: CaptureConstraints) -> Result<StreamHandle, CallError>;
}

/// Behavior of a [`LocalDeviceCapture`] acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Grant everything the constraints ask for
    Grant,
    /// Grant the camera but not the microphone
    CameraOnly,
    /// Refuse access entirely (user denied the permission prompt)
    Deny,
}

/// Deterministic capture implementation
///
/// Stands in for the device layer in tests, demos, and headless
/// deployments; the mode can be switched at runtime to exercise partial
/// grants and denials.
#[derive(Debug)]
pub struct LocalDeviceCapture {
    mode: Mutex<CaptureMode>,
}

impl LocalDeviceCapture {
    /// Capture that grants all requested tracks
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(CaptureMode::Grant),
        }
    }

    /// Capture with a fixed initial mode
    pub fn with_mode(mode: CaptureMode) -> Self {
        Self {
            mode: Mutex::new(mode),
        }
    }

    /// Change the capture behavior for subsequent acquisitions
    pub fn set_mode(&self, mode: CaptureMode) {
        *self.mode.lock() = mode;
    }
}

impl Default for LocalDeviceCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaCapture for LocalDeviceCapture {
    async fn acquire(&self, constraints: CaptureConstraints) -> Result<StreamHandle, CallError> {
        let mode = *self.mode.lock();
        if mode == CaptureMode::Deny {
            warn!("Capture denied");
            return Err(CallError::MediaAccess {
                reason: "camera and microphone access denied".to_string(),
            });
        }

        let mut tracks = Vec::new();
        if constraints.video {
            tracks.push(MediaTrack::new(TrackKind::Video));
        }
        if constraints.audio && mode != CaptureMode::CameraOnly {
            tracks.push(MediaTrack::new(TrackKind::Audio));
        }

        if tracks.is_empty() {
            return Err(CallError::MediaAccess {
                reason: "no capturable tracks for the requested constraints".to_string(),
            });
        }

        let stream = MediaStream::new(tracks);
        debug!(stream_id = %stream.id, track_count = stream.tracks().len(), "Acquired local stream");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grants_video_and_audio() {
        let capture = LocalDeviceCapture::new();
        let stream = capture.acquire(CaptureConstraints::default()).await.unwrap();
        assert_eq!(stream.tracks().len(), 2);
        assert!(stream.has_live_track());
    }

    #[tokio::test]
    async fn camera_only_still_succeeds() {
        let capture = LocalDeviceCapture::with_mode(CaptureMode::CameraOnly);
        let stream = capture.acquire(CaptureConstraints::default()).await.unwrap();
        let tracks = stream.tracks();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].kind, TrackKind::Video);
    }

    #[tokio::test]
    async fn denial_is_a_media_access_error() {
        let capture = LocalDeviceCapture::with_mode(CaptureMode::Deny);
        let err = capture
            .acquire(CaptureConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::MediaAccess { .. }));
    }

    #[tokio::test]
    async fn zero_track_constraints_fail() {
        let capture = LocalDeviceCapture::new();
        let err = capture
            .acquire(CaptureConstraints {
                video: false,
                audio: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::MediaAccess { .. }));
    }
}

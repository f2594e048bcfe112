//! # CareRTC Media
//!
//! Media stream model, the capture seam, and the stream render binder for
//! CareRTC. The binder guarantees a media stream is and stays attached to
//! its render surface across retries, autoplay refusals, and silent
//! playback stalls.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod capture;
pub mod render;
pub mod stream;

// Re-export main types
pub use capture::{CaptureConstraints, LocalDeviceCapture, MediaCapture};
pub use capture::CaptureMode;
pub use render::{
    PlaybackState, PlayError, RenderConfig, RenderSurface, StreamRenderBinder, SurfaceKey,
};
pub use stream::{MediaStream, MediaTrack, StreamHandle, TrackKind};

//! Dual-track connection health
//!
//! Signaling loss and media-path loss are independent failure modes: a
//! reconnecting signaling socket does not imply the established media
//! path dropped, and vice versa. The tracker keeps one boolean per
//! domain; either going false is enough to consider the call degraded,
//! and both must be true to consider it healthy again.

use crate::config::CallConfig;
use carertc_core::{CallStatus, ConnectionHealth};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Tracks the two connection domains and the reconnect budget
#[derive(Debug)]
pub struct HealthTracker {
    signaling_healthy: AtomicBool,
    media_healthy: AtomicBool,
    degraded_since: Mutex<Option<Instant>>,
}

impl HealthTracker {
    /// Create a tracker that assumes both domains healthy
    pub fn new() -> Self {
        Self {
            signaling_healthy: AtomicBool::new(true),
            media_healthy: AtomicBool::new(true),
            degraded_since: Mutex::new(None),
        }
    }

    /// Record the signaling channel's health
    pub fn set_signaling(&self, healthy: bool) {
        self.signaling_healthy.store(healthy, Ordering::SeqCst);
        self.update_degraded_clock();
    }

    /// Record the peer media path's health
    pub fn set_media(&self, healthy: bool) {
        self.media_healthy.store(healthy, Ordering::SeqCst);
        self.update_degraded_clock();
    }

    /// Both domains healthy — the only condition under which the call
    /// may leave `Reconnecting`
    pub fn both_healthy(&self) -> bool {
        self.signaling_healthy.load(Ordering::SeqCst) && self.media_healthy.load(Ordering::SeqCst)
    }

    /// At least one domain degraded — enough to enter `Reconnecting`
    pub fn any_degraded(&self) -> bool {
        !self.both_healthy()
    }

    /// Whether the reconnect budget is exhausted
    pub fn budget_exhausted(&self, attempts: u32, config: &CallConfig) -> bool {
        if attempts > config.reconnect_attempt_budget {
            return true;
        }
        self.degraded_since
            .lock()
            .map(|since| since.elapsed() > config.reconnect_time_budget)
            .unwrap_or(false)
    }

    /// Health classification for the consultation UI
    pub fn classify(&self, status: CallStatus) -> ConnectionHealth {
        match status {
            CallStatus::Recovering => ConnectionHealth::Recovering,
            _ if self.any_degraded() => ConnectionHealth::Poor,
            _ => ConnectionHealth::Good,
        }
    }

    /// Heartbeat view of the signaling channel
    pub fn connection_state(&self) -> &'static str {
        if self.signaling_healthy.load(Ordering::SeqCst) {
            "connected"
        } else {
            "reconnecting"
        }
    }

    /// Heartbeat view of the media path
    pub fn ice_state(&self) -> &'static str {
        if self.media_healthy.load(Ordering::SeqCst) {
            "connected"
        } else {
            "reconnecting"
        }
    }

    /// Reset both domains healthy (fresh join, completed recovery)
    pub fn reset(&self) {
        self.signaling_healthy.store(true, Ordering::SeqCst);
        self.media_healthy.store(true, Ordering::SeqCst);
        *self.degraded_since.lock() = None;
    }

    fn update_degraded_clock(&self) {
        let mut since = self.degraded_since.lock();
        if self.both_healthy() {
            *since = None;
        } else if since.is_none() {
            *since = Some(Instant::now());
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

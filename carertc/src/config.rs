//! Configuration types and defaults

use carertc_media::{CaptureConstraints, RenderConfig};
use std::time::Duration;

/// Call lifecycle configuration
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// How often a heartbeat is pushed to the persistence service
    pub heartbeat_interval: Duration,
    /// Signaling reconnect attempts tolerated before recovery starts
    pub reconnect_attempt_budget: u32,
    /// Time spent reconnecting tolerated before recovery starts
    pub reconnect_time_budget: Duration,
    /// How long a join waits for the peer media path to come up
    pub join_timeout: Duration,
    /// Which local media a join acquires
    pub capture: CaptureConstraints,
    /// Render binder timings
    pub render: RenderConfig,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            reconnect_attempt_budget: 10,
            reconnect_time_budget: Duration::from_secs(45),
            join_timeout: Duration::from_secs(30),
            capture: CaptureConstraints::default(),
            render: RenderConfig::default(),
        }
    }
}

impl CallConfig {
    /// Millisecond-scale timings for tests
    pub fn fast() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(25),
            reconnect_attempt_budget: 3,
            reconnect_time_budget: Duration::from_millis(250),
            join_timeout: Duration::from_millis(500),
            capture: CaptureConstraints::default(),
            render: RenderConfig::fast(),
        }
    }
}

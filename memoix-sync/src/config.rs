//! Engine configuration.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the sync coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Device name written into every bundle and meta file.
    pub device_name: String,
    /// Quiet period after the last local change before an automatic push.
    pub debounce: Duration,
    /// Minimum age of the last sync before a launch triggers a pull.
    pub launch_cooldown: Duration,
    /// Retry policy for every remote call.
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            device_name: "Unknown Device".to_string(),
            debounce: Duration::from_secs(5),
            launch_cooldown: Duration::from_secs(5 * 60),
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Default configuration for the named device.
    pub fn for_device(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            ..Self::default()
        }
    }
}

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::Result;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub render: RenderConfig,
    pub devices: DeviceConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Fields that are absent keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Configuration of the render loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Ticks per second. Values below one are treated as one.
    pub target_frame_rate: u32,
    /// Propagate per-frame errors out of the loop instead of logging them.
    pub strict: bool,
    /// Minimum interval between two log lines for the same frame error.
    pub error_log_interval_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            target_frame_rate: 25,
            strict: false,
            error_log_interval_ms: 10_000,
        }
    }
}

impl RenderConfig {
    pub fn frame_budget(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.target_frame_rate.max(1)))
    }

    pub fn error_log_interval(&self) -> Duration {
        Duration::from_millis(self.error_log_interval_ms)
    }
}

/// Configuration of device enabling and hand-over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Attempts made by [`DeviceManager::enable_device`](crate::DeviceManager::enable_device)
    /// before giving up.
    pub enable_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Upper bound on how long starting the loop waits for a device change to settle.
    pub changing_wait_ms: u64,
    /// Device that was active when the application last ran.
    pub last_device: Option<DeviceId>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            enable_retries: 5,
            retry_backoff_ms: 250,
            max_backoff_ms: 2_000,
            changing_wait_ms: 5_000,
            last_device: None,
        }
    }
}

impl DeviceConfig {
    /// Backoff before retry number `attempt` (zero based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(31)).unwrap_or(u64::MAX);
        let millis = self.retry_backoff_ms.saturating_mul(factor);
        Duration::from_millis(millis.min(self.max_backoff_ms))
    }

    pub fn changing_wait(&self) -> Duration {
        Duration::from_millis(self.changing_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = AppConfig::from_json(r#"{ "render": { "strict": true } }"#).unwrap();
        assert!(config.render.strict);
        assert_eq!(config.render.target_frame_rate, 25);
        assert_eq!(config.devices.enable_retries, 5);
        assert_eq!(config.render.frame_budget(), Duration::from_millis(40));
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let devices = DeviceConfig::default();
        assert_eq!(devices.backoff(0), Duration::from_millis(250));
        assert_eq!(devices.backoff(2), Duration::from_millis(1_000));
        assert_eq!(devices.backoff(10), Duration::from_millis(2_000));
    }
}

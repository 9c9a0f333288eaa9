//! Engine configuration
//!
//! Groups the server connection, watchdog thresholds, reporting cadence
//! and transcode request parameters. Loaded from JSON or built in code.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Media server connection
    pub server: ServerConfig,
    /// Playback health thresholds
    pub watchdog: WatchdogConfig,
    /// Session reporting cadence
    pub reporter: ReporterConfig,
    /// Parameters for transcoded streams
    pub transcode: TranscodeConfig,
    /// Physical pixel width of the display
    pub device_pixel_width: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            watchdog: WatchdogConfig::default(),
            reporter: ReporterConfig::default(),
            transcode: TranscodeConfig::default(),
            device_pixel_width: 1920,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.device_id.is_empty() {
            return Err(Error::InvalidConfig("server.device_id is empty".into()));
        }
        if self.watchdog.check_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "watchdog.check_interval_ms must be positive".into(),
            ));
        }
        if self.watchdog.direct.max_checks == 0 || self.watchdog.transcode.max_checks == 0 {
            return Err(Error::InvalidConfig(
                "watchdog max_checks must be positive".into(),
            ));
        }
        if self.reporter.heartbeat_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "reporter.heartbeat_interval_ms must be positive".into(),
            ));
        }
        if self.transcode.segment_length == 0 {
            return Err(Error::InvalidConfig(
                "transcode.segment_length must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Media server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server base URL
    pub base_url: Url,
    /// Signed-in user id
    pub user_id: String,
    /// Access token
    pub access_token: String,
    /// Stable device identifier
    pub device_id: String,
    /// Device display name
    pub device_name: String,
    /// Client application name
    pub client_name: String,
    /// Client application version
    pub client_version: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:8096/").expect("static URL"),
            user_id: String::new(),
            access_token: String::new(),
            device_id: "marquee-device".to_string(),
            device_name: "Marquee".to_string(),
            client_name: "Marquee".to_string(),
            client_version: crate::VERSION.to_string(),
            request_timeout_ms: 15_000,
        }
    }
}

impl ServerConfig {
    /// Base URL with a trailing slash so relative joins keep its path
    pub fn base(&self) -> Url {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Thresholds for one class of playback method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Checks before giving up on playback that never progressed
    pub max_checks: u32,
    /// Consecutive non-advancing checks that count as stalled once loaded
    pub stall_checks: u32,
    /// Checks at the start position tolerated before the adapter reports loaded
    pub zero_position_checks: u32,
}

/// Playback health watchdog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Delay after `play()` before the first check
    pub initial_delay_ms: u64,
    /// Interval between checks
    pub check_interval_ms: u64,
    /// Thresholds for DirectPlay/DirectStream
    pub direct: HealthThresholds,
    /// Thresholds for Transcode, which needs longer to buffer
    pub transcode: HealthThresholds,
    /// Minimum advance in seconds that counts as progress
    pub progress_epsilon: f64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2_000,
            check_interval_ms: 1_000,
            direct: HealthThresholds {
                max_checks: 5,
                stall_checks: 2,
                zero_position_checks: 4,
            },
            transcode: HealthThresholds {
                max_checks: 12,
                stall_checks: 4,
                zero_position_checks: 10,
            },
            progress_epsilon: 0.05,
        }
    }
}

impl WatchdogConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

/// Session reporting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Interval between progress heartbeats
    pub heartbeat_interval_ms: u64,
    /// How long `exit` waits for the stop notification
    pub stop_timeout_ms: u64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 10_000,
            stop_timeout_ms: 1_500,
        }
    }
}

impl ReporterConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Parameters sent to the adaptive manifest endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Target video codec
    pub video_codec: String,
    /// Target audio codec
    pub audio_codec: String,
    /// Segment length in seconds
    pub segment_length: u32,
    /// Resolution ceiling
    pub max_width: u32,
    pub max_height: u32,
    /// Audio channel ceiling
    pub max_audio_channels: u32,
    /// Bitrate ceiling used when the user has none
    pub default_max_bitrate: u64,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            video_codec: "h264".to_string(),
            audio_codec: "aac".to_string(),
            segment_length: 6,
            max_width: 1920,
            max_height: 1080,
            max_audio_channels: 6,
            default_max_bitrate: 20_000_000,
        }
    }
}

//! Configuration types for the phishing domain mirror
//!
//! This module defines all configuration structures used throughout the crate.

use crate::backoff::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bulk snapshot endpoint of the authority
pub const DEFAULT_SNAPSHOT_URL: &str = "https://phish.sinking.yachts/v2/all";

/// Streaming delta feed of the authority
pub const DEFAULT_FEED_URL: &str = "wss://phish.sinking.yachts/feed";

/// Header carrying the project identifier on every request
pub const IDENTITY_HEADER: &str = "X-Identity";

/// Identifier sent to the authority when none is configured
pub const DEFAULT_PROJECT_IDENTIFIER: &str = "phishgate/0.1 (github.com/phishgate/phishgate)";

/// Main mirror configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Snapshot source configuration
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Delta feed configuration
    #[serde(default)]
    pub feed: FeedConfig,

    /// Identity presented to the authority
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Message detection options
    #[serde(default)]
    pub detection: DetectionOptions,

    /// Options consulted by the hosting process only
    #[serde(default)]
    pub service: ServiceOptions,
}

impl GatewayConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.snapshot.validate()?;
        self.feed.validate()?;
        self.identity.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Snapshot source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SnapshotConfig {
    /// Authenticated HTTP GET returning a JSON array of domains
    Http {
        /// URL of the bulk endpoint
        #[serde(default = "default_snapshot_url")]
        url: String,
    },

    /// Custom snapshot source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SnapshotConfig {
    /// Validate the snapshot configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SnapshotConfig::Http { url } => {
                if url.is_empty() {
                    return Err(crate::Error::config("Snapshot URL cannot be empty"));
                }
                if !url.starts_with("https://") && !url.starts_with("http://") {
                    return Err(crate::Error::config(format!(
                        "Snapshot URL must use http or https: {}",
                        url
                    )));
                }
                Ok(())
            }
            SnapshotConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom snapshot source factory cannot be empty",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the snapshot source type name
    pub fn type_name(&self) -> &str {
        match self {
            SnapshotConfig::Http { .. } => "http",
            SnapshotConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig::Http {
            url: default_snapshot_url(),
        }
    }
}

/// Delta feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedConfig {
    /// Persistent WebSocket connection carrying JSON delta frames
    #[serde(rename = "websocket")]
    WebSocket {
        /// URL of the feed
        #[serde(default = "default_feed_url")]
        url: String,
    },

    /// Custom feed transport
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl FeedConfig {
    /// Validate the feed configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            FeedConfig::WebSocket { url } => {
                if url.is_empty() {
                    return Err(crate::Error::config("Feed URL cannot be empty"));
                }
                if !url.starts_with("wss://") && !url.starts_with("ws://") {
                    return Err(crate::Error::config(format!(
                        "Feed URL must use ws or wss: {}",
                        url
                    )));
                }
                Ok(())
            }
            FeedConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom feed factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the feed type name
    pub fn type_name(&self) -> &str {
        match self {
            FeedConfig::WebSocket { .. } => "websocket",
            FeedConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig::WebSocket {
            url: default_feed_url(),
        }
    }
}

/// Identity presented to the authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Sent as both `X-Identity` and `User-Agent`
    #[serde(default = "default_project_identifier")]
    pub project_identifier: String,
}

impl IdentityConfig {
    /// Create an identity with the given project identifier
    pub fn new(project_identifier: impl Into<String>) -> Self {
        Self {
            project_identifier: project_identifier.into(),
        }
    }

    /// Validate the identity
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.project_identifier.trim().is_empty() {
            return Err(crate::Error::config("Project identifier cannot be empty"));
        }
        Ok(())
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            project_identifier: default_project_identifier(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay before the first reconnect attempt after a failure (milliseconds)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Upper bound for the reconnect delay (milliseconds)
    ///
    /// Equal to `reconnect_delay_ms` by default, which gives a fixed delay.
    /// A larger value turns on exponential growth up to this cap.
    #[serde(default = "default_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Subtract up to 25% random jitter from each reconnect delay
    #[serde(default)]
    pub reconnect_jitter: bool,

    /// Capacity of the engine event channel
    ///
    /// When full, events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Largest reassembled frame accepted from the feed (bytes)
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// How long `stop()` waits for the streaming task to exit (milliseconds)
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.reconnect_delay_ms == 0 {
            return Err(crate::Error::config("Reconnect delay must be > 0"));
        }
        if self.max_reconnect_delay_ms < self.reconnect_delay_ms {
            return Err(crate::Error::config(
                "Maximum reconnect delay must not be smaller than the reconnect delay",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.max_frame_bytes == 0 {
            return Err(crate::Error::config("Maximum frame size must be > 0"));
        }
        Ok(())
    }

    /// Reconnect policy described by this configuration
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_delay: Duration::from_millis(self.max_reconnect_delay_ms),
            jitter: self.reconnect_jitter,
        }
    }

    /// Stop timeout as a [`Duration`]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_reconnect_delay_ms(),
            reconnect_jitter: false,
            event_channel_capacity: default_event_channel_capacity(),
            max_frame_bytes: default_max_frame_bytes(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

/// Options regarding how messages are checked for phishing
///
/// Neither option has an implementation; enabling one only logs a warning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionOptions {
    /// Follow shortener links (such as bit.ly)
    #[serde(default)]
    pub follow_shorteners: bool,

    /// Double-check messages against an aggregate second-opinion API
    #[serde(default)]
    pub use_second_opinion: bool,
}

/// Options for the process hosting the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOptions {
    /// Terminate the process when the initial snapshot cannot be fetched
    #[serde(default)]
    pub terminate_on_error: bool,
}

fn default_snapshot_url() -> String {
    DEFAULT_SNAPSHOT_URL.to_string()
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_project_identifier() -> String {
    DEFAULT_PROJECT_IDENTIFIER.to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    15_000
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_max_frame_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_stop_timeout_ms() -> u64 {
    5_000
}

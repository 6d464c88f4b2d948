// # phishgated - Phishing Domain Mirror Daemon
//
// This daemon is a THIN integration layer. Fetching, streaming, reconnecting
// and the domain set itself all live in phishgate-core and its plugins.
//
// The phishgated daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering the snapshot source and feed plugins
// 4. Starting the sync engine and stopping it on SIGTERM/SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Authority
// - `PHISHGATE_SNAPSHOT_URL`: Bulk snapshot endpoint
// - `PHISHGATE_FEED_URL`: WebSocket delta feed
// - `PHISHGATE_PROJECT_IDENTIFIER`: Sent as `X-Identity` and `User-Agent`
//
// ### Engine
// - `PHISHGATE_RECONNECT_DELAY_MS`: Delay before reconnecting (default 15000)
// - `PHISHGATE_MAX_RECONNECT_DELAY_MS`: Cap for exponential growth (default: same as delay)
// - `PHISHGATE_RECONNECT_JITTER`: Subtract up to 25% jitter from each delay
//
// ### Service
// - `PHISHGATE_TERMINATE_ON_ERROR`: Exit when the initial snapshot fails
// - `PHISHGATE_FOLLOW_SHORTENERS`: Detection option (not implemented yet)
// - `PHISHGATE_SECOND_OPINION`: Detection option (not implemented yet)
// - `PHISHGATE_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export PHISHGATE_PROJECT_IDENTIFIER="my-bot (github.com/me/my-bot)"
// export PHISHGATE_TERMINATE_ON_ERROR=true
//
// phishgated
// ```

use anyhow::Result;
use phishgate_core::config::{
    DetectionOptions, EngineConfig, FeedConfig, GatewayConfig, IdentityConfig, ServiceOptions,
    SnapshotConfig,
};
use phishgate_core::{EngineEvent, SourceRegistry, SyncEngine};
use std::env;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhishgateExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<PhishgateExitCode> for ExitCode {
    fn from(code: PhishgateExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    snapshot_url: Option<String>,
    feed_url: Option<String>,
    project_identifier: Option<String>,
    reconnect_delay_ms: Option<u64>,
    max_reconnect_delay_ms: Option<u64>,
    reconnect_jitter: bool,
    terminate_on_error: bool,
    follow_shorteners: bool,
    second_opinion: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            snapshot_url: text("PHISHGATE_SNAPSHOT_URL"),
            feed_url: text("PHISHGATE_FEED_URL"),
            project_identifier: text("PHISHGATE_PROJECT_IDENTIFIER"),
            reconnect_delay_ms: parse_number(
                "PHISHGATE_RECONNECT_DELAY_MS",
                text("PHISHGATE_RECONNECT_DELAY_MS"),
            )?,
            max_reconnect_delay_ms: parse_number(
                "PHISHGATE_MAX_RECONNECT_DELAY_MS",
                text("PHISHGATE_MAX_RECONNECT_DELAY_MS"),
            )?,
            reconnect_jitter: parse_flag(
                "PHISHGATE_RECONNECT_JITTER",
                text("PHISHGATE_RECONNECT_JITTER"),
            )?,
            terminate_on_error: parse_flag(
                "PHISHGATE_TERMINATE_ON_ERROR",
                text("PHISHGATE_TERMINATE_ON_ERROR"),
            )?,
            follow_shorteners: parse_flag(
                "PHISHGATE_FOLLOW_SHORTENERS",
                text("PHISHGATE_FOLLOW_SHORTENERS"),
            )?,
            second_opinion: parse_flag(
                "PHISHGATE_SECOND_OPINION",
                text("PHISHGATE_SECOND_OPINION"),
            )?,
            log_level: text("PHISHGATE_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Build the library configuration, falling back to defaults for unset values
    fn gateway(&self) -> GatewayConfig {
        let mut gateway = GatewayConfig::new();

        if let Some(url) = &self.snapshot_url {
            gateway.snapshot = SnapshotConfig::Http { url: url.clone() };
        }
        if let Some(url) = &self.feed_url {
            gateway.feed = FeedConfig::WebSocket { url: url.clone() };
        }
        if let Some(identifier) = &self.project_identifier {
            gateway.identity = IdentityConfig::new(identifier.clone());
        }

        let defaults = EngineConfig::default();
        let reconnect_delay_ms = self
            .reconnect_delay_ms
            .unwrap_or(defaults.reconnect_delay_ms);
        gateway.engine = EngineConfig {
            reconnect_delay_ms,
            // An unset cap keeps the delay fixed
            max_reconnect_delay_ms: self.max_reconnect_delay_ms.unwrap_or(reconnect_delay_ms),
            reconnect_jitter: self.reconnect_jitter,
            ..defaults
        };

        gateway.detection = DetectionOptions {
            follow_shorteners: self.follow_shorteners,
            use_second_opinion: self.second_opinion,
        };
        gateway.service = ServiceOptions {
            terminate_on_error: self.terminate_on_error,
        };

        gateway
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.gateway()
            .validate()
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        if let Some(url) = &self.snapshot_url
            && url.starts_with("http://")
        {
            eprintln!(
                "WARNING: PHISHGATE_SNAPSHOT_URL uses HTTP (not HTTPS). \
                The project identifier is sent in clear text."
            );
        }

        // Validate log level
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "PHISHGATE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

fn parse_number(key: &str, value: Option<String>) -> Result<Option<u64>> {
    value
        .map(|value| {
            value.trim().parse::<u64>().map_err(|_| {
                anyhow::anyhow!("{} must be a non-negative integer. Got: {}", key, value)
            })
        })
        .transpose()
}

fn parse_flag(key: &str, value: Option<String>) -> Result<bool> {
    let Some(value) = value else {
        return Ok(false);
    };

    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be true or false. Got: {}", key, value),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return PhishgateExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return PhishgateExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return PhishgateExitCode::ConfigError.into();
    }

    info!("Starting phishgated daemon");

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return PhishgateExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config).await {
            Ok(code) => code,
            Err(e) => {
                error!("Daemon error: {}", e);
                PhishgateExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: Config) -> Result<PhishgateExitCode> {
    let gateway = config.gateway();

    // Create source registry
    let registry = SourceRegistry::new();

    #[cfg(feature = "http")]
    {
        info!("Registering HTTP snapshot source");
        phishgate_http::register(&registry);
    }

    #[cfg(feature = "websocket")]
    {
        info!("Registering WebSocket feed");
        phishgate_ws::register(&registry);
    }

    let snapshot = match registry.create_snapshot_source(&gateway.snapshot, &gateway.identity) {
        Ok(source) => source,
        Err(e) => {
            error!("Cannot create snapshot source: {}", e);
            return Ok(PhishgateExitCode::ConfigError);
        }
    };
    let feed = match registry.create_feed_connector(&gateway.feed, &gateway.identity) {
        Ok(feed) => feed,
        Err(e) => {
            error!("Cannot create feed connector: {}", e);
            return Ok(PhishgateExitCode::ConfigError);
        }
    };

    let (engine, events) = SyncEngine::new(snapshot, feed, gateway.engine.clone())?;
    let engine = engine.with_detection_options(gateway.detection);
    let forwarder = tokio::spawn(forward_events(events));

    match engine.start().await {
        Ok(()) => info!("Mirroring {} phishing domains", engine.domains().len()),
        Err(e) if gateway.service.terminate_on_error => {
            error!("Initial snapshot failed, terminating: {}", e);
            return Ok(PhishgateExitCode::ConfigError);
        }
        Err(e) => {
            warn!(
                "Initial snapshot failed, serving an empty set until restart: {}",
                e
            );
        }
    }

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    engine.stop().await;

    // Dropping the engine closes the event channel and ends the forwarder
    drop(engine);
    match forwarder.await {
        Ok(summary) => info!(
            "Applied {} delta(s), skipped {}, across {} reconnect(s)",
            summary.deltas_applied, summary.deltas_ignored, summary.reconnects
        ),
        Err(e) => warn!("Event forwarder ended abnormally: {}", e),
    }

    Ok(PhishgateExitCode::CleanShutdown)
}

/// Counters collected while forwarding engine events
#[derive(Debug, Default, PartialEq, Eq)]
struct EventSummary {
    deltas_applied: u64,
    deltas_ignored: u64,
    reconnects: u64,
}

/// Forward engine events to the log until the engine is dropped
async fn forward_events(events: mpsc::Receiver<EngineEvent>) -> EventSummary {
    let mut summary = EventSummary::default();
    let mut events = ReceiverStream::new(events);

    while let Some(event) = events.next().await {
        match &event {
            EngineEvent::DeltaApplied { .. } => summary.deltas_applied += 1,
            EngineEvent::DeltaIgnored { .. } => summary.deltas_ignored += 1,
            EngineEvent::ReconnectScheduled { .. } => summary.reconnects += 1,
            _ => {}
        }
        debug!("Engine event: {:?}", event);
    }

    summary
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };

    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

//! Domain-set synchronization engine
//!
//! The SyncEngine is responsible for:
//! - Installing the bulk snapshot on start
//! - Keeping a persistent connection to the delta feed
//! - Applying add/delete deltas in arrival order
//! - Reconnecting with backoff whenever the connection ends or fails
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   start()   ┌──────────────┐   contains()   ┌──────────┐
//! │ SnapshotSource │────────────▶│  SyncEngine  │◀───────────────│ callers  │
//! └────────────────┘             └──────────────┘                └──────────┘
//!                                       │ spawn
//!                                       ▼
//! ┌────────────────┐  fragments  ┌──────────────┐   apply()   ┌────────────┐
//! │ FeedConnection │────────────▶│  StreamLoop  │────────────▶│ DomainSet  │
//! └────────────────┘             └──────────────┘             └────────────┘
//! ```
//!
//! ## Streaming State Machine
//!
//! 1. `Connecting`: open a connection via [`FeedConnector`]
//! 2. `Streaming`: reassemble fragments into frames and apply each delta
//! 3. On remote close, transport fault or stop: `Closing`, then `Disconnected`
//! 4. Stopped? Exit. Otherwise wait the reconnect delay and go to 1

use crate::backoff::ReconnectPolicy;
use crate::config::{DetectionOptions, EngineConfig};
use crate::detection::PhishingDetector;
use crate::domains::DomainSet;
use crate::error::{Error, Result};
use crate::protocol::{DeltaCommand, DeltaMessage, DeltaOutcome, FrameAssembler};
use crate::traits::{FeedConnection, FeedConnector, FeedRead, SnapshotSource};
use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Close reason sent when the engine gives up on a connection and retries
pub const CLOSE_REASON_RECONNECTING: &str = "reconnecting";

/// Close reason sent when the engine is stopped
pub const CLOSE_REASON_STOPPING: &str = "stopping";

/// Lifecycle of the feed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection (before start, between attempts, after stop)
    Disconnected,
    /// Opening a connection
    Connecting,
    /// Connection open, deltas flowing
    Streaming,
    /// Closing the current connection
    Closing,
}

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Snapshot fetched and installed
    SnapshotInstalled {
        domain_count: usize,
    },

    /// Opening a feed connection
    Connecting {
        /// Total connection attempts since start, including this one
        attempt: u64,
    },

    /// Feed connection open
    Connected,

    /// A delta frame was decoded and applied
    DeltaApplied {
        command: DeltaCommand,
        outcome: DeltaOutcome,
    },

    /// A frame was skipped: undecodable, or an unknown command
    DeltaIgnored {
        reason: String,
    },

    /// The feed connection ended
    Disconnected {
        reason: String,
    },

    /// Next connection attempt after `delay`
    ReconnectScheduled {
        delay: Duration,
        consecutive_failures: u32,
    },

    /// Streaming task exited after stop
    Stopped,
}

/// Handle to the streaming task
///
/// `handle` is `None` while start() is still fetching the snapshot.
struct StreamTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl StreamTask {
    /// Starting, or spawned and not yet finished
    fn is_active(&self) -> bool {
        match &self.handle {
            Some(handle) => !handle.is_finished(),
            None => !self.cancel.is_cancelled(),
        }
    }
}

/// Domain-set synchronization engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. [`SyncEngine::start()`] installs the snapshot and spawns the streaming task
/// 3. [`SyncEngine::contains()`] from any thread, at any time
/// 4. [`SyncEngine::stop()`] cancels the streaming task and waits for it
///
/// Dropping the engine cancels the streaming task without waiting.
///
/// ## Threading
///
/// The streaming task is the only writer of the domain set once started.
/// `contains()` takes a short read lock and never waits on network I/O.
pub struct SyncEngine {
    /// Snapshot source used by start()
    snapshot: Box<dyn SnapshotSource>,

    /// Feed transport, shared with the streaming task
    connector: Arc<dyn FeedConnector>,

    /// The mirrored domain set
    domains: DomainSet,

    /// Detector over `domains`, carrying the configured options
    detector: PhishingDetector,

    /// Delay schedule between connection attempts
    policy: ReconnectPolicy,

    /// Largest reassembled frame
    max_frame_bytes: usize,

    /// Bound on how long stop() waits for the task
    stop_timeout: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,

    /// Current connection state
    state_tx: Arc<watch::Sender<ConnectionState>>,

    /// Running streaming task, if any
    running: Mutex<Option<StreamTask>>,
}

impl SyncEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `snapshot`: Snapshot source implementation
    /// - `connector`: Feed transport implementation
    /// - `config`: Engine configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        snapshot: Box<dyn SnapshotSource>,
        connector: Box<dyn FeedConnector>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let domains = DomainSet::new();

        let engine = Self {
            snapshot,
            connector: Arc::from(connector),
            detector: PhishingDetector::new(domains.clone()),
            domains,
            policy: config.reconnect_policy(),
            max_frame_bytes: config.max_frame_bytes,
            stop_timeout: config.stop_timeout(),
            event_tx: tx,
            state_tx: Arc::new(state_tx),
            running: Mutex::new(None),
        };

        Ok((engine, rx))
    }

    /// Configure the options used by [`SyncEngine::detector()`]
    ///
    /// Options without an implementation are logged once, here.
    pub fn with_detection_options(mut self, options: DetectionOptions) -> Self {
        self.detector = PhishingDetector::with_options(self.domains.clone(), options);
        self
    }

    /// Fetch the snapshot and start streaming
    ///
    /// Returns as soon as the snapshot is installed and the streaming task is
    /// spawned. A failed fetch is returned as-is and nothing is spawned. To
    /// bound the fetch, wrap the call in `tokio::time::timeout`.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Snapshot installed, streaming task running
    /// - `Err(Error::Fetch)`: The snapshot endpoint returned a non-success status
    /// - `Err(Error::AlreadyRunning)`: start() was already called without stop()
    /// - `Err(Error::Stopped)`: stop() was called while the fetch was in flight
    pub async fn start(&self) -> Result<()> {
        let cancel = CancellationToken::new();
        {
            let mut running = self.running.lock().await;
            if running.as_ref().is_some_and(StreamTask::is_active) {
                return Err(Error::AlreadyRunning);
            }
            *running = Some(StreamTask {
                cancel: cancel.clone(),
                handle: None,
            });
        }

        // Cancels the pending entry if this future is dropped mid-fetch
        let start_guard = cancel.clone().drop_guard();

        info!("Fetching snapshot via {}", self.snapshot.source_name());
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Stopped),
            result = self.snapshot.fetch() => result,
        };

        let mut running = self.running.lock().await;

        // stop() took the entry while we were fetching
        if cancel.is_cancelled() {
            info!("Engine stopped before start completed");
            return Err(Error::Stopped);
        }

        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Snapshot fetch failed: {}", e);
                *running = None;
                return Err(e);
            }
        };

        let domain_count = snapshot.len();
        self.domains.replace(snapshot);
        info!("Installed snapshot with {} domains", domain_count);
        self.emit_event(EngineEvent::SnapshotInstalled { domain_count });

        let stream = StreamLoop {
            connector: Arc::clone(&self.connector),
            domains: self.domains.clone(),
            policy: self.policy,
            max_frame_bytes: self.max_frame_bytes,
            event_tx: self.event_tx.clone(),
            state_tx: Arc::clone(&self.state_tx),
            cancel,
        };

        *running = Some(StreamTask {
            cancel: start_guard.disarm(),
            handle: Some(tokio::spawn(stream.run())),
        });

        Ok(())
    }

    /// Stop streaming
    ///
    /// Cancels the streaming task, which closes its connection with reason
    /// `"stopping"`, and waits up to the configured stop timeout for it to
    /// exit. No connection attempt happens after this returns. A start() that
    /// is still fetching the snapshot returns `Error::Stopped` instead of
    /// streaming. Calling stop() on an engine that is not running does nothing.
    pub async fn stop(&self) {
        let Some(task) = self.running.lock().await.take() else {
            debug!("Stop requested but engine is not running");
            return;
        };

        task.cancel.cancel();

        let Some(mut handle) = task.handle else {
            info!("Engine stopped during start");
            return;
        };

        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(Ok(())) => info!("Engine stopped"),
            Ok(Err(e)) => warn!("Streaming task ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Streaming task did not exit within {:?}, aborting",
                    self.stop_timeout
                );
                handle.abort();
            }
        }
    }

    /// Check whether `domain` is a known phishing domain
    ///
    /// Reflects the snapshot plus every delta applied so far. A delta that
    /// is still in flight is not visible yet.
    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains(domain)
    }

    /// Shared handle to the mirrored domain set
    pub fn domains(&self) -> DomainSet {
        self.domains.clone()
    }

    /// Detector scanning free text against the mirrored set
    pub fn detector(&self) -> PhishingDetector {
        self.detector.clone()
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receiver notified on every connection state change
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Whether a streaming task is running
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .and_then(|task| task.handle.as_ref())
            .is_some_and(|handle| !handle.is_finished())
    }

    fn emit_event(&self, event: EngineEvent) {
        emit(&self.event_tx, event);
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if let Some(task) = self.running.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

/// Why the inner read loop ended
enum StreamExit {
    /// stop() was called
    Cancelled,
    /// The remote closed the connection
    RemoteClosed(Option<String>),
    /// A read failed or a frame broke transport limits
    Failed(Error),
}

/// State owned by the background streaming task
struct StreamLoop {
    connector: Arc<dyn FeedConnector>,
    domains: DomainSet,
    policy: ReconnectPolicy,
    max_frame_bytes: usize,
    event_tx: mpsc::Sender<EngineEvent>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
}

impl StreamLoop {
    /// Outer retry loop; runs until cancelled
    async fn run(self) {
        let mut attempts: u64 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            attempts += 1;
            self.set_state(ConnectionState::Connecting);
            self.emit_event(EngineEvent::Connecting { attempt: attempts });
            debug!(
                "Connecting to feed via {} (attempt {})",
                self.connector.transport_name(),
                attempts
            );

            let connected = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = contain_panic("connect", self.connector.connect()) => result,
            };

            let reason = match connected {
                Ok(mut connection) => {
                    consecutive_failures = 0;
                    self.set_state(ConnectionState::Streaming);
                    self.emit_event(EngineEvent::Connected);
                    info!("Connected to feed");

                    match self.stream(connection.as_mut()).await {
                        StreamExit::Cancelled => {
                            self.close(connection.as_mut(), CLOSE_REASON_STOPPING).await;
                            break;
                        }
                        StreamExit::RemoteClosed(reason) => {
                            let reason = reason.unwrap_or_else(|| "closed by remote".to_string());
                            info!("Feed closed by remote: {}", reason);
                            reason
                        }
                        StreamExit::Failed(e) => {
                            warn!("Feed connection failed: {}", e);
                            self.close(connection.as_mut(), CLOSE_REASON_RECONNECTING)
                                .await;
                            e.to_string()
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to connect to feed: {}", e);
                    e.to_string()
                }
            };

            self.set_state(ConnectionState::Disconnected);
            self.emit_event(EngineEvent::Disconnected { reason });

            if self.cancel.is_cancelled() {
                break;
            }

            consecutive_failures = consecutive_failures.saturating_add(1);
            let delay = self.policy.delay_for(consecutive_failures);
            info!("Reconnecting to feed in {:?}", delay);
            self.emit_event(EngineEvent::ReconnectScheduled {
                delay,
                consecutive_failures,
            });

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        self.emit_event(EngineEvent::Stopped);
        info!("Feed streaming stopped after {} connection attempt(s)", attempts);
    }

    /// Inner read loop for one connection
    async fn stream(&self, connection: &mut dyn FeedConnection) -> StreamExit {
        let mut assembler = FrameAssembler::new(self.max_frame_bytes);

        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StreamExit::Cancelled,
                read = contain_panic("read", connection.read()) => read,
            };

            match read {
                Ok(FeedRead::Fragment {
                    data,
                    end_of_message,
                }) => match assembler.push(&data, end_of_message) {
                    Ok(Some(frame)) => self.handle_frame(&frame),
                    Ok(None) => {}
                    Err(e) => return StreamExit::Failed(e),
                },
                Ok(FeedRead::Close { reason }) => {
                    if assembler.pending() > 0 {
                        debug!(
                            "Discarding {} bytes of a partial frame",
                            assembler.pending()
                        );
                        assembler.reset();
                    }
                    return StreamExit::RemoteClosed(reason);
                }
                Err(e) => return StreamExit::Failed(e),
            }
        }
    }

    /// Decode and apply one complete frame
    fn handle_frame(&self, frame: &[u8]) {
        let message = match DeltaMessage::from_frame(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring delta frame: {}", e);
                self.emit_event(EngineEvent::DeltaIgnored {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let outcome = self.domains.apply(&message);
        if outcome == DeltaOutcome::Ignored {
            warn!(
                "Ignoring delta with {} for {} domain(s)",
                message.command,
                message.domains.len()
            );
            self.emit_event(EngineEvent::DeltaIgnored {
                reason: format!("unsupported command {}", message.command),
            });
            return;
        }

        debug!(
            "Applied {} for {} domain(s): {:?}",
            message.command,
            message.domains.len(),
            outcome
        );
        self.emit_event(EngineEvent::DeltaApplied {
            command: message.command,
            outcome,
        });
    }

    /// Best-effort close; failures are logged and dropped
    async fn close(&self, connection: &mut dyn FeedConnection, reason: &str) {
        self.set_state(ConnectionState::Closing);
        if let Err(e) = contain_panic("close", connection.close(reason)).await {
            debug!("Error while closing feed connection ({}): {}", reason, e);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn emit_event(&self, event: EngineEvent) {
        emit(&self.event_tx, event);
    }
}

/// Await a transport future, turning a panic inside it into a transport error
///
/// A panicking connector must cost one connection attempt, not the task.
async fn contain_panic<T, F>(operation: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Feed {} panicked: {}", operation, message);
            Err(Error::transport(format!("{} panicked: {}", operation, message)))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}

/// Send an event without blocking
fn emit(event_tx: &mpsc::Sender<EngineEvent>, event: EngineEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            // Dropping keeps memory bounded when nobody drains the channel
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

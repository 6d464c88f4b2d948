//! Test doubles and common utilities for engine contract tests
//!
//! This module provides minimal test doubles that drive the engine through
//! scripted snapshot and feed behavior without touching the network.

#![allow(dead_code)]

use phishgate_core::config::EngineConfig;
use phishgate_core::engine::EngineEvent;
use phishgate_core::error::{Error, Result};
use phishgate_core::traits::{FeedConnection, FeedConnector, FeedRead, SnapshotSource};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A snapshot source returning a fixed domain list
pub struct StaticSnapshotSource {
    domains: HashSet<String>,
    fetch_count: Arc<AtomicUsize>,
}

impl StaticSnapshotSource {
    pub fn new(domains: &[&str]) -> Self {
        Self {
            domains: domains.iter().map(|d| d.to_string()).collect(),
            fetch_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the number of times fetch() was called
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Create a new source that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            domains: other.domains.clone(),
            fetch_count: Arc::clone(&other.fetch_count),
        }
    }
}

#[async_trait::async_trait]
impl SnapshotSource for StaticSnapshotSource {
    async fn fetch(&self) -> Result<HashSet<String>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.domains.clone())
    }

    fn source_name(&self) -> &'static str {
        "static"
    }
}

/// A snapshot source whose endpoint always answers with `status`
pub struct FailingSnapshotSource {
    status: u16,
}

impl FailingSnapshotSource {
    pub fn new(status: u16) -> Self {
        Self { status }
    }
}

#[async_trait::async_trait]
impl SnapshotSource for FailingSnapshotSource {
    async fn fetch(&self) -> Result<HashSet<String>> {
        Err(Error::fetch(
            "https://phish.sinking.yachts/v2/all",
            "GET",
            self.status,
        ))
    }

    fn source_name(&self) -> &'static str {
        "failing"
    }
}

/// A snapshot source that takes `delay` to answer
pub struct SlowSnapshotSource {
    delay: Duration,
    domains: HashSet<String>,
}

impl SlowSnapshotSource {
    pub fn new(delay: Duration, domains: &[&str]) -> Self {
        Self {
            delay,
            domains: domains.iter().map(|d| d.to_string()).collect(),
        }
    }
}

#[async_trait::async_trait]
impl SnapshotSource for SlowSnapshotSource {
    async fn fetch(&self) -> Result<HashSet<String>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.domains.clone())
    }

    fn source_name(&self) -> &'static str {
        "slow"
    }
}

/// What one connection attempt does
#[derive(Debug, Clone)]
pub enum Script {
    /// connect() fails
    Refuse,
    /// connect() panics
    Panic,
    /// connect() succeeds and the connection plays these steps, then idles
    Steps(Vec<Step>),
}

/// One read on a scripted connection
#[derive(Debug, Clone)]
pub enum Step {
    /// read() returns this
    Read(FeedRead),
    /// read() fails with a transport error
    Fail(String),
    /// read() panics
    Panic,
    /// read() sleeps, then continues with the next step
    Wait(Duration),
}

impl Step {
    pub fn frame(json: &str) -> Self {
        Step::Read(FeedRead::frame(json.as_bytes().to_vec()))
    }

    pub fn partial(bytes: &str) -> Self {
        Step::Read(FeedRead::partial(bytes.as_bytes().to_vec()))
    }

    pub fn close() -> Self {
        Step::Read(FeedRead::Close { reason: None })
    }
}

/// Shared counters of a [`ScriptedFeed`]
#[derive(Clone, Default)]
pub struct FeedLog {
    connect_count: Arc<AtomicUsize>,
    close_reasons: Arc<Mutex<Vec<String>>>,
}

impl FeedLog {
    /// Get the number of times connect() was called
    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Reasons passed to close(), in call order
    pub fn close_reasons(&self) -> Vec<String> {
        self.close_reasons.lock().unwrap().clone()
    }
}

/// A feed connector playing one [`Script`] per connection attempt
///
/// Once every script is used up, further connections succeed and idle.
pub struct ScriptedFeed {
    scripts: Mutex<VecDeque<Script>>,
    feed_log: FeedLog,
}

impl ScriptedFeed {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            feed_log: FeedLog::default(),
        }
    }

    /// A feed whose connections open and never deliver anything
    pub fn idle() -> Self {
        Self::new(Vec::new())
    }

    /// Counters that stay readable after the feed moves into the engine
    pub fn feed_log(&self) -> FeedLog {
        self.feed_log.clone()
    }
}

#[async_trait::async_trait]
impl FeedConnector for ScriptedFeed {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>> {
        self.feed_log.connect_count.fetch_add(1, Ordering::SeqCst);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Steps(Vec::new()));

        match script {
            Script::Refuse => Err(Error::transport("connection refused")),
            Script::Panic => panic!("connector exploded"),
            Script::Steps(steps) => Ok(Box::new(ScriptedConnection {
                steps: steps.into(),
                close_reasons: Arc::clone(&self.feed_log.close_reasons),
            })),
        }
    }

    fn transport_name(&self) -> &'static str {
        "scripted"
    }
}

struct ScriptedConnection {
    steps: VecDeque<Step>,
    close_reasons: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl FeedConnection for ScriptedConnection {
    async fn read(&mut self) -> Result<FeedRead> {
        loop {
            match self.steps.pop_front() {
                Some(Step::Read(read)) => return Ok(read),
                Some(Step::Fail(message)) => return Err(Error::transport(message)),
                Some(Step::Panic) => panic!("read exploded"),
                Some(Step::Wait(delay)) => tokio::time::sleep(delay).await,
                None => return std::future::pending().await,
            }
        }
    }

    async fn close(&mut self, reason: &str) -> Result<()> {
        self.close_reasons.lock().unwrap().push(reason.to_string());
        Ok(())
    }
}

/// Engine configuration with a short fixed reconnect delay
pub fn fast_config(reconnect_delay_ms: u64) -> EngineConfig {
    EngineConfig {
        reconnect_delay_ms,
        max_reconnect_delay_ms: reconnect_delay_ms,
        reconnect_jitter: false,
        event_channel_capacity: 1000,
        max_frame_bytes: 64 * 1024,
        stop_timeout_ms: 2_000,
    }
}

/// Receive events until `predicate` matches one, or panic after `timeout`
///
/// Returns every event received, including the matching one.
pub async fn wait_for_event<F>(
    rx: &mut mpsc::Receiver<EngineEvent>,
    timeout: Duration,
    mut predicate: F,
) -> Vec<EngineEvent>
where
    F: FnMut(&EngineEvent) -> bool,
{
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(event)) => {
                let matched = predicate(&event);
                seen.push(event);
                if matched {
                    return seen;
                }
            }
            Ok(None) => panic!("event channel closed; events so far: {:?}", seen),
            Err(_) => panic!("timed out waiting for event; events so far: {:?}", seen),
        }
    }
}

/// Receive events until `count` deltas were applied
pub async fn wait_for_deltas(
    rx: &mut mpsc::Receiver<EngineEvent>,
    count: usize,
) -> Vec<EngineEvent> {
    let mut applied = 0;
    wait_for_event(rx, Duration::from_secs(2), |event| {
        if matches!(event, EngineEvent::DeltaApplied { .. }) {
            applied += 1;
        }
        applied >= count
    })
    .await
}

/// Poll `condition` every 5ms until it holds, or panic after `timeout`
pub async fn eventually<F>(timeout: Duration, what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

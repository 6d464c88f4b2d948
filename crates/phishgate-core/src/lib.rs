// # phishgate-core
//
// Core library for mirroring a remote phishing domain blocklist.
//
// ## Architecture Overview
//
// This library keeps a live, in-memory set of known phishing domains:
// - **SnapshotSource**: Trait for fetching the complete domain list once
// - **FeedConnector**: Trait for the streaming add/delete delta feed
// - **SyncEngine**: Installs the snapshot, then applies deltas in the background
// - **DomainSet**: Concurrency-safe membership set behind `contains()`
// - **SourceRegistry**: Plugin-based registry for sources and feeds
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from network implementations
// 2. **Single Writer**: Only the streaming task mutates the set after start
// 3. **Self-Healing**: Feed failures reconnect forever; only the snapshot fetch is caller-visible
// 4. **Library-First**: All core functionality can be used as a library

pub mod traits;
pub mod engine;
pub mod registry;
pub mod config;
pub mod error;
pub mod domains;
pub mod protocol;
pub mod backoff;
pub mod detection;

// Re-export core types for convenience
pub use traits::{FeedConnection, FeedConnector, FeedRead, SnapshotSource};
pub use engine::{ConnectionState, EngineEvent, SyncEngine};
pub use registry::SourceRegistry;
pub use config::{EngineConfig, FeedConfig, GatewayConfig, IdentityConfig, SnapshotConfig};
pub use error::{Error, Result};
pub use domains::DomainSet;
pub use backoff::ReconnectPolicy;
pub use detection::{DetectionResult, PhishingDetector, PhishingSource};

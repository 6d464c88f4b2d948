//! Plugin-based source registry
//!
//! The registry allows snapshot sources and feed transports to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use phishgate_core::registry::SourceRegistry;
//! use phishgate_core::config::GatewayConfig;
//!
//! let registry = SourceRegistry::new();
//! phishgate_http::register(&registry);
//! phishgate_ws::register(&registry);
//!
//! let config = GatewayConfig::default();
//! let snapshot = registry.create_snapshot_source(&config.snapshot, &config.identity)?;
//! let feed = registry.create_feed_connector(&config.feed, &config.identity)?;
//! ```

use crate::config::{FeedConfig, IdentityConfig, SnapshotConfig};
use crate::error::{Error, Result};
use crate::traits::{FeedConnector, FeedConnectorFactory, SnapshotSource, SnapshotSourceFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Registry for plugin-based snapshot source and feed creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct SourceRegistry {
    /// Registered snapshot source factories
    snapshot_sources: RwLock<HashMap<String, Box<dyn SnapshotSourceFactory>>>,

    /// Registered feed connector factories
    feeds: RwLock<HashMap<String, Box<dyn FeedConnectorFactory>>>,
}

impl SourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a snapshot source factory
    ///
    /// # Parameters
    ///
    /// - `name`: Snapshot source type name (e.g., "http")
    /// - `factory`: Factory object for creating snapshot source instances
    pub fn register_snapshot_source(
        &self,
        name: impl Into<String>,
        factory: Box<dyn SnapshotSourceFactory>,
    ) {
        self.snapshot_sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register a feed connector factory
    ///
    /// # Parameters
    ///
    /// - `name`: Feed type name (e.g., "websocket")
    /// - `factory`: Factory object for creating feed connector instances
    pub fn register_feed(&self, name: impl Into<String>, factory: Box<dyn FeedConnectorFactory>) {
        self.feeds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Create a snapshot source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn SnapshotSource>)`: Created source instance
    /// - `Err(Error)`: If the source type is not registered or creation fails
    pub fn create_snapshot_source(
        &self,
        config: &SnapshotConfig,
        identity: &IdentityConfig,
    ) -> Result<Box<dyn SnapshotSource>> {
        let source_type = config.type_name();
        let sources = self
            .snapshot_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = sources.get(source_type).ok_or_else(|| {
            Error::config(format!("Unknown snapshot source type: {}", source_type))
        })?;

        factory.create(config, identity)
    }

    /// Create a feed connector from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn FeedConnector>)`: Created connector instance
    /// - `Err(Error)`: If the feed type is not registered or creation fails
    pub fn create_feed_connector(
        &self,
        config: &FeedConfig,
        identity: &IdentityConfig,
    ) -> Result<Box<dyn FeedConnector>> {
        let feed_type = config.type_name();
        let feeds = self.feeds.read().unwrap_or_else(PoisonError::into_inner);

        let factory = feeds
            .get(feed_type)
            .ok_or_else(|| Error::config(format!("Unknown feed type: {}", feed_type)))?;

        factory.create(config, identity)
    }

    /// List all registered snapshot source types
    pub fn list_snapshot_sources(&self) -> Vec<String> {
        self.snapshot_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// List all registered feed types
    pub fn list_feeds(&self) -> Vec<String> {
        self.feeds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Check if a snapshot source type is registered
    pub fn has_snapshot_source(&self, name: &str) -> bool {
        self.snapshot_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Check if a feed type is registered
    pub fn has_feed(&self, name: &str) -> bool {
        self.feeds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

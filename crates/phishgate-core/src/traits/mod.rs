//! Core traits for the phishing domain mirror
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`SnapshotSource`]: Fetch the complete domain list once
//! - [`FeedConnector`]: Open connections to the delta feed
//! - [`FeedConnection`]: Read fragments from one open feed connection

pub mod snapshot_source;
pub mod feed;

pub use snapshot_source::{SnapshotSource, SnapshotSourceFactory};
pub use feed::{FeedConnection, FeedConnector, FeedConnectorFactory, FeedRead};

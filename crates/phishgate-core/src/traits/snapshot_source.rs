// # Snapshot Source Trait
//
// Defines the interface for fetching the authority's complete domain list.
//
// ## Implementations
//
// - HTTP bulk endpoint: `phishgate-http` crate
//
// ## Usage
//
// ```rust,ignore
// use phishgate_core::SnapshotSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* SnapshotSource implementation */;
//
//     let domains = source.fetch().await?;
//     println!("{} known phishing domains", domains.len());
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::collections::HashSet;

/// Trait for snapshot source implementations
///
/// A snapshot source performs exactly one request per `fetch()` call and
/// returns the result instead of mutating shared state; the engine decides
/// when to install it.
///
/// ## Forbidden Capabilities
/// - ❌ Implement retry logic (a failed fetch is reported, not retried)
/// - ❌ Touch the engine's domain set
/// - ❌ Spawn background tasks
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the complete domain list
    ///
    /// # Returns
    ///
    /// - `Ok(HashSet<String>)`: Every domain in the snapshot (duplicates collapse)
    /// - `Err(Error::Fetch)`: The endpoint answered with a non-success status
    /// - `Err(Error)`: The request or body decoding failed
    async fn fetch(&self) -> Result<HashSet<String>, crate::Error>;

    /// Short name for logging
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing snapshot sources from configuration
pub trait SnapshotSourceFactory: Send + Sync {
    /// Create a SnapshotSource instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this snapshot source type
    /// - `identity`: Identity to present to the authority
    fn create(
        &self,
        config: &crate::config::SnapshotConfig,
        identity: &crate::config::IdentityConfig,
    ) -> Result<Box<dyn SnapshotSource>, crate::Error>;
}

// # Feed Traits
//
// Defines the interface for the streaming delta feed.
//
// A `FeedConnector` opens connections; each `FeedConnection` yields raw
// fragments. Reassembly into frames, decoding and applying deltas, and every
// reconnect decision belong to `SyncEngine`.

use async_trait::async_trait;

/// One read from an open feed connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedRead {
    /// Part of a frame
    ///
    /// A frame is complete once a fragment with `end_of_message` arrives.
    Fragment {
        /// Payload bytes of this fragment
        data: Vec<u8>,
        /// Whether this fragment ends the frame
        end_of_message: bool,
    },

    /// The remote side closed the connection
    ///
    /// Routine for idle connections; the engine reconnects.
    Close {
        /// Close reason sent by the remote, if any
        reason: Option<String>,
    },
}

impl FeedRead {
    /// A fragment that completes a frame on its own
    pub fn frame(data: impl Into<Vec<u8>>) -> Self {
        FeedRead::Fragment {
            data: data.into(),
            end_of_message: true,
        }
    }

    /// A fragment that is followed by more fragments of the same frame
    pub fn partial(data: impl Into<Vec<u8>>) -> Self {
        FeedRead::Fragment {
            data: data.into(),
            end_of_message: false,
        }
    }
}

/// Trait for feed transports
///
/// `connect()` is called once per connection attempt. Implementations
/// attach the identity header at open time and must not retry on their own.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Open a new connection to the feed
    async fn connect(&self) -> Result<Box<dyn FeedConnection>, crate::Error>;

    /// Short name for logging
    fn transport_name(&self) -> &'static str;
}

/// An open connection to the feed
///
/// Exclusively owned by the engine's streaming task.
#[async_trait]
pub trait FeedConnection: Send {
    /// Wait for the next fragment or close
    ///
    /// Control frames (ping/pong) are handled by the implementation and
    /// never surface here.
    async fn read(&mut self) -> Result<FeedRead, crate::Error>;

    /// Close the connection with a reason
    ///
    /// Best effort: the engine ignores errors returned from here.
    async fn close(&mut self, reason: &str) -> Result<(), crate::Error>;
}

/// Helper trait for constructing feed connectors from configuration
pub trait FeedConnectorFactory: Send + Sync {
    /// Create a FeedConnector instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this feed type
    /// - `identity`: Identity to present to the authority
    fn create(
        &self,
        config: &crate::config::FeedConfig,
        identity: &crate::config::IdentityConfig,
    ) -> Result<Box<dyn FeedConnector>, crate::Error>;
}

// rule-engine-cache/src/connection.rs
// ============================================================================
// Module: Shared Cache Connection
// Description: One Redis connection manager shared by C1's index cache and
//              C8's value cache (spec §8 invariant 7: shutting down the
//              notification bridge must not disconnect the shared handle).
// Purpose: Cheap-to-clone handle over `redis::aio::ConnectionManager`, which
//          already reconnects transparently.
// Dependencies: redis, tracing
// ============================================================================

use redis::Client;
use redis::aio::ConnectionManager;

use crate::error::CacheError;

/// A cheaply-clonable handle onto the shared cache substrate.
///
/// Cloning this type does not open a new connection; `ConnectionManager`
/// multiplexes over one underlying connection and reconnects on failure, so
/// every owner of a clone survives any one owner being dropped (spec §8
/// invariant 7).
#[derive(Clone)]
pub struct CacheHandle {
    client: Client,
    manager: ConnectionManager,
}

impl CacheHandle {
    /// Connects to the cache substrate at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if the initial connection fails.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(|err| CacheError::Connection(err.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|err| CacheError::Connection(err.to_string()))?;
        tracing::debug!(url, "cache connection manager established");
        Ok(Self { client, manager })
    }

    /// Returns a clone of the underlying connection manager for direct use
    /// by crates that need commands this handle doesn't wrap.
    #[must_use]
    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Opens a dedicated pub/sub connection. A process that uses the
    /// returned handle as a subscriber must not also publish on it, and
    /// vice versa (spec §4.10: "a publisher instance and a subscriber
    /// instance are strictly separate roles per process").
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if the dedicated connection
    /// cannot be established.
    pub async fn pubsub(&self) -> Result<redis::aio::PubSub, CacheError> {
        self.client.get_async_pubsub().await.map_err(|err| CacheError::Connection(err.to_string()))
    }
}

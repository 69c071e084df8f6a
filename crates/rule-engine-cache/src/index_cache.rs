// rule-engine-cache/src/index_cache.rs
// ============================================================================
// Module: Originator Index Cache
// Description: The cache half of C1's cache-coherent lookup (spec §4.1, §8
//              invariant 1). The store-backed rebuild path lives in
//              `rule-engine-index`; this crate only owns the Redis shape.
// Purpose: O(1) lookup keyed by (sourceType, originatorId, variableName),
//          with targeted invalidation that never requires a keyspace scan.
// Dependencies: redis, rule-engine-core, serde_json
// ============================================================================

use redis::AsyncCommands;
use redis::aio::AsyncIter;
use rule_engine_core::OriginatorId;
use rule_engine_core::OriginatorType;
use rule_engine_core::RuleChainId;
use rule_engine_core::VariableName;

use crate::connection::CacheHandle;
use crate::error::CacheError;

/// Default time-to-live for an index cache entry, in seconds.
pub const DEFAULT_INDEX_TTL_SECS: u64 = 300;

/// The Redis-backed half of C1's index cache.
///
/// Forward entries are keyed per `(sourceType, originatorId, variableName)`.
/// Two reverse indexes make invalidation targeted rather than a `SCAN`:
/// one set of forward keys per originator, one set of forward keys per rule
/// chain that was written alongside that entry.
pub struct IndexCache {
    handle: CacheHandle,
    ttl_secs: u64,
}

impl IndexCache {
    /// Wraps a shared [`CacheHandle`] with the default TTL.
    #[must_use]
    pub const fn new(handle: CacheHandle) -> Self {
        Self { handle, ttl_secs: DEFAULT_INDEX_TTL_SECS }
    }

    /// Overrides the default entry TTL.
    #[must_use]
    pub const fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Looks up the cached rule chain ids for one `(sourceType, originatorId,
    /// variableName)` key, or `None` on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on a command failure; callers should treat this
    /// the same as a miss and fall back to the store (spec §4.1: "if the
    /// underlying store fails, C1 returns an empty set rather than
    /// raising" — the cache side mirrors that fail-open posture).
    pub async fn get(
        &self,
        source_type: OriginatorType,
        originator_id: &OriginatorId,
        variable_name: &VariableName,
    ) -> Result<Option<Vec<RuleChainId>>, CacheError> {
        let mut conn = self.handle.manager();
        let raw: Option<String> = conn.get(forward_key(source_type, originator_id, variable_name)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let ids: Vec<String> =
            serde_json::from_str(&raw).map_err(|err| CacheError::Corrupt(err.to_string()))?;
        Ok(Some(ids.into_iter().map(RuleChainId::new).collect()))
    }

    /// Writes one `(sourceType, originatorId, variableName)` entry, updating
    /// the per-originator and per-rule-chain reverse indexes so it can later
    /// be invalidated without a scan.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on a command failure.
    pub async fn set(
        &self,
        source_type: OriginatorType,
        originator_id: &OriginatorId,
        variable_name: &VariableName,
        rule_chain_ids: &[RuleChainId],
    ) -> Result<(), CacheError> {
        let mut conn = self.handle.manager();
        let key = forward_key(source_type, originator_id, variable_name);
        let payload = serde_json::to_string(&rule_chain_ids.iter().map(RuleChainId::as_str).collect::<Vec<_>>())
            .map_err(|err| CacheError::Corrupt(err.to_string()))?;

        let () = conn.set_ex(&key, payload, self.ttl_secs).await?;
        let () = conn.sadd(originator_key(source_type, originator_id), &key).await?;
        let () = conn.expire(originator_key(source_type, originator_id), self.ttl_secs as i64).await?;
        for rule_chain_id in rule_chain_ids {
            let () = conn.sadd(rule_chain_key(rule_chain_id), &key).await?;
        }
        Ok(())
    }

    /// Drops every cached entry for one originator.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on a command failure.
    pub async fn invalidate(
        &self,
        source_type: OriginatorType,
        originator_id: &OriginatorId,
    ) -> Result<(), CacheError> {
        let mut conn = self.handle.manager();
        let index_key = originator_key(source_type, originator_id);
        let forward_keys: Vec<String> = conn.smembers(&index_key).await?;
        if !forward_keys.is_empty() {
            let () = conn.del(&forward_keys).await?;
        }
        let () = conn.del(&index_key).await?;
        Ok(())
    }

    /// Drops every cached entry that was written alongside `rule_chain_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on a command failure.
    pub async fn invalidate_by_rule_chain(&self, rule_chain_id: &RuleChainId) -> Result<(), CacheError> {
        let mut conn = self.handle.manager();
        let index_key = rule_chain_key(rule_chain_id);
        let forward_keys: Vec<String> = conn.smembers(&index_key).await?;
        if !forward_keys.is_empty() {
            let () = conn.del(&forward_keys).await?;
        }
        let () = conn.del(&index_key).await?;
        Ok(())
    }

    /// Drops every cached entry, forward and reverse, regardless of
    /// originator or rule chain. Used when a `MigrationLog` advance means
    /// the rebuild query itself changed shape, so no individually-keyed
    /// invalidation is granular enough (spec §2 `[SUPPLEMENT]`).
    ///
    /// Walks the whole `rule-engine:index:*` keyspace with `SCAN` rather
    /// than `KEYS`, so a large keyspace doesn't block the Redis event loop.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on a command failure.
    pub async fn invalidate_all(&self) -> Result<(), CacheError> {
        let mut conn = self.handle.manager();
        let mut keys = Vec::new();
        {
            let mut iter: AsyncIter<'_, String> = conn.scan_match("rule-engine:index:*").await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        if !keys.is_empty() {
            let () = conn.del(&keys).await?;
        }
        Ok(())
    }
}

fn forward_key(source_type: OriginatorType, originator_id: &OriginatorId, variable_name: &VariableName) -> String {
    format!("rule-engine:index:{source_type:?}:{originator_id}:{variable_name}")
}

fn originator_key(source_type: OriginatorType, originator_id: &OriginatorId) -> String {
    format!("rule-engine:index:orig:{source_type:?}:{originator_id}")
}

fn rule_chain_key(rule_chain_id: &RuleChainId) -> String {
    format!("rule-engine:index:rc:{rule_chain_id}")
}

// rule-engine-queue/src/lib.rs
// ============================================================================
// Module: Durable Priority Queue (C4)
// Description: Redis-backed priority queue with lease, stall recovery, and
//              exponential backoff (spec §4.4).
// Purpose: The durable hand-off between C3 (enqueue) and C6 (lease/ack/fail),
//          and the depth figure C2 gates admission on.
// Dependencies: redis, rule-engine-cache, rule-engine-core, serde_json, time
// ============================================================================

//! ## Overview
//! One [`Queue`] owns one named Redis key family (see [`keys::QueueKeys`]).
//! Job bodies live in a hash; priority ordering and lease tracking live in
//! sorted sets scored by `(priority, enqueued_at)` and lease-expiry
//! respectively, so both pop-order and stall detection are `O(log n)`
//! without a separate index. The four state transitions — lease, ack,
//! retry, dead-letter — each run as one Lua script (spec §6: "Lua
//! atomicity"), so a lease can never observe a job mid-transition.
//!
//! `Queue` shares its connection through [`rule_engine_cache::CacheHandle`]
//! rather than opening its own, so closing any one crate's handle never
//! disconnects another (spec §8 invariant 7).

mod error;
mod keys;
mod scripts;

use redis::AsyncCommands;
use rule_engine_cache::CacheHandle;
pub use rule_engine_core::Backoff;
pub use rule_engine_core::JobOptions;
use rule_engine_core::QueueCounts;
use rule_engine_core::QueueHealth;
pub use rule_engine_core::QueueJob;
use rule_engine_core::Thresholds;
use time::OffsetDateTime;

pub use crate::error::QueueError;
use crate::keys::QueueKeys;

/// Scales `priority` (1..10) into the high digits of a waiting-set score, so
/// priority dominates ordering and the low digits (a millisecond timestamp)
/// break ties in FIFO order.
const PRIORITY_SCALE: f64 = 1e13;

/// How long a lease is held before a job is considered stalled (spec §4.4).
const DEFAULT_LEASE_MS: i64 = 30_000;

fn now_millis() -> i64 {
    let now = OffsetDateTime::now_utc();
    now.unix_timestamp() * 1000 + i64::from(now.millisecond())
}

fn waiting_score(priority: u8, enqueued_at_millis: i64) -> f64 {
    f64::from(priority).mul_add(PRIORITY_SCALE, enqueued_at_millis as f64)
}

/// A durable, priority-ordered job queue over a shared Redis substrate.
pub struct Queue {
    handle: CacheHandle,
    keys: QueueKeys,
    lease_ms: i64,
}

impl Queue {
    /// Opens the named queue over a shared cache handle.
    #[must_use]
    pub fn new(handle: CacheHandle, queue_name: &str) -> Self {
        Self {
            handle,
            keys: QueueKeys::new(queue_name),
            lease_ms: DEFAULT_LEASE_MS,
        }
    }

    /// Overrides the default lease duration (mainly for tests).
    #[must_use]
    pub const fn with_lease_ms(mut self, lease_ms: i64) -> Self {
        self.lease_ms = lease_ms;
        self
    }

    /// Enqueues a job at its configured priority.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Backend`] if the Redis commands fail.
    pub async fn enqueue(&self, job: &QueueJob) -> Result<(), QueueError> {
        let body = serde_json::to_string(job).map_err(|source| QueueError::Corrupt {
            job_id: job.id.as_str().to_owned(),
            source,
        })?;
        let score = waiting_score(job.priority, now_millis());
        let mut conn = self.handle.manager();
        let _: () = redis::pipe()
            .atomic()
            .hset(&self.keys.jobs, job.id.as_str(), &body)
            .zadd(&self.keys.waiting, job.id.as_str(), score)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Leases the highest-priority waiting job, if any and unless paused.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] on a backend failure or a corrupt job body.
    pub async fn lease(&self) -> Result<Option<QueueJob>, QueueError> {
        let mut conn = self.handle.manager();
        let lease_until = now_millis() + self.lease_ms;
        let body: Option<String> = redis::Script::new(scripts::LEASE)
            .key(&self.keys.paused)
            .key(&self.keys.waiting)
            .key(&self.keys.active)
            .key(&self.keys.jobs)
            .arg(lease_until)
            .invoke_async(&mut conn)
            .await?;
        let Some(body) = body else {
            return Ok(None);
        };
        let job: QueueJob = serde_json::from_str(&body).map_err(|source| QueueError::Corrupt {
            job_id: String::new(),
            source,
        })?;
        Ok(Some(job))
    }

    /// Acknowledges successful processing of a leased job.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Backend`] if the Redis script fails.
    pub async fn ack(&self, job: &QueueJob) -> Result<(), QueueError> {
        let mut conn = self.handle.manager();
        let _: bool = redis::Script::new(scripts::ACK)
            .key(&self.keys.active)
            .key(&self.keys.completed)
            .key(&self.keys.jobs)
            .arg(job.id.as_str())
            .arg(job.options.remove_on_complete)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Reports a failed processing attempt. `job` is the body as leased;
    /// this increments its attempt count and either schedules a backoff
    /// retry or dead-letters it, matching [`QueueJob::has_attempts_remaining`]
    /// semantics (spec §4.4).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] on a backend failure or serialization error.
    pub async fn fail(&self, job: &QueueJob) -> Result<(), QueueError> {
        let mut retried = job.clone();
        retried.attempts_made += 1;
        let mut conn = self.handle.manager();

        if retried.has_attempts_remaining() {
            let delay_ms = retried.options.backoff.delay_ms(retried.attempts_made);
            let ready_at = now_millis() + i64::try_from(delay_ms).unwrap_or(i64::MAX);
            let body = serde_json::to_string(&retried).map_err(|source| QueueError::Corrupt {
                job_id: retried.id.as_str().to_owned(),
                source,
            })?;
            let _: bool = redis::Script::new(scripts::RETRY)
                .key(&self.keys.active)
                .key(&self.keys.delayed)
                .key(&self.keys.jobs)
                .arg(retried.id.as_str())
                .arg(ready_at)
                .arg(body)
                .invoke_async(&mut conn)
                .await?;
        } else {
            let body = serde_json::to_string(&retried).map_err(|source| QueueError::Corrupt {
                job_id: retried.id.as_str().to_owned(),
                source,
            })?;
            let _: bool = redis::Script::new(scripts::DEAD_LETTER)
                .key(&self.keys.active)
                .key(&self.keys.failed)
                .key(&self.keys.jobs)
                .arg(retried.id.as_str())
                .arg(body)
                .arg(retried.options.remove_on_fail)
                .invoke_async(&mut conn)
                .await?;
            tracing::warn!(job_id = %retried.id, "job exhausted attempts, dead-lettered");
        }
        Ok(())
    }

    /// Promotes delayed jobs whose backoff has elapsed onto the waiting set.
    /// Intended to be called periodically by a maintenance task.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Backend`] if the Redis script fails.
    pub async fn promote_delayed(&self) -> Result<u64, QueueError> {
        let mut conn = self.handle.manager();
        let promoted: u64 = redis::Script::new(scripts::PROMOTE_DELAYED)
            .key(&self.keys.delayed)
            .key(&self.keys.jobs)
            .key(&self.keys.waiting)
            .arg(now_millis())
            .arg(PRIORITY_SCALE)
            .invoke_async(&mut conn)
            .await?;
        Ok(promoted)
    }

    /// Reclaims jobs whose lease expired without an ack or fail (a worker
    /// crashed mid-processing), requeuing them as a new attempt or
    /// dead-lettering them if attempts are exhausted. Intended to be called
    /// periodically by a maintenance task.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Backend`] if the Redis script fails.
    pub async fn reclaim_stalled(&self) -> Result<(u64, u64), QueueError> {
        let mut conn = self.handle.manager();
        let (promoted, dead): (u64, u64) = redis::Script::new(scripts::RECLAIM_STALLED)
            .key(&self.keys.active)
            .key(&self.keys.jobs)
            .key(&self.keys.waiting)
            .key(&self.keys.failed)
            .arg(now_millis())
            .arg(PRIORITY_SCALE)
            .invoke_async(&mut conn)
            .await?;
        if dead > 0 {
            tracing::warn!(dead, "stalled jobs exhausted attempts on reclaim");
        }
        Ok((promoted, dead))
    }

    /// Returns the dead-lettered jobs, most recent first, for operator
    /// inspection or manual replay.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] on a backend failure or corrupt entry.
    pub async fn failed_jobs(&self, limit: usize) -> Result<Vec<QueueJob>, QueueError> {
        let mut conn = self.handle.manager();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let bodies: Vec<String> = conn.lrange(&self.keys.failed, 0, limit.saturating_sub(1)).await?;
        bodies
            .into_iter()
            .map(|body| {
                serde_json::from_str(&body).map_err(|source| QueueError::Corrupt {
                    job_id: String::new(),
                    source,
                })
            })
            .collect()
    }

    /// Pauses the queue: [`Queue::lease`] will return `None` until resumed.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Backend`] if the Redis command fails.
    pub async fn pause(&self) -> Result<(), QueueError> {
        let mut conn = self.handle.manager();
        let _: () = conn.set(&self.keys.paused, "1").await?;
        Ok(())
    }

    /// Resumes a paused queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Backend`] if the Redis command fails.
    pub async fn resume(&self) -> Result<(), QueueError> {
        let mut conn = self.handle.manager();
        let _: () = conn.del(&self.keys.paused).await?;
        Ok(())
    }

    /// Reads the point-in-time counts the backpressure gate and health
    /// checks consult (spec §4.2, §4.4).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Backend`] if the Redis commands fail.
    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let mut conn = self.handle.manager();
        let (waiting, active, completed, failed, delayed, paused): (u64, u64, u64, u64, u64, bool) = redis::pipe()
            .zcard(&self.keys.waiting)
            .zcard(&self.keys.active)
            .llen(&self.keys.completed)
            .llen(&self.keys.failed)
            .zcard(&self.keys.delayed)
            .exists(&self.keys.paused)
            .query_async(&mut conn)
            .await?;
        Ok(QueueCounts {
            waiting,
            active,
            completed,
            failed,
            delayed,
            paused,
        })
    }
}

/// Derives [`QueueHealth`] from a depth figure against backpressure
/// thresholds (spec §4.4). `Warning` is reserved for a future sub-critical
/// band and is never returned today.
#[must_use]
pub fn derive_health(counts: QueueCounts, thresholds: Thresholds) -> QueueHealth {
    let pending = counts.total_pending();
    if pending >= thresholds.critical {
        QueueHealth::Critical
    } else if pending >= thresholds.warning {
        QueueHealth::Degraded
    } else {
        QueueHealth::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_score_orders_by_priority_then_time() {
        let high_priority_later = waiting_score(1, 2_000);
        let low_priority_earlier = waiting_score(5, 1_000);
        assert!(high_priority_later < low_priority_earlier);
    }

    #[test]
    fn derive_health_bands() {
        let thresholds = Thresholds::default();
        let mut counts = QueueCounts::default();
        counts.waiting = 100;
        assert_eq!(derive_health(counts, thresholds), QueueHealth::Healthy);
        counts.waiting = thresholds.warning;
        assert_eq!(derive_health(counts, thresholds), QueueHealth::Degraded);
        counts.waiting = thresholds.critical;
        assert_eq!(derive_health(counts, thresholds), QueueHealth::Critical);
    }
}

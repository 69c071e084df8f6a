// rule-engine-queue/src/scripts.rs
// ============================================================================
// Module: Queue Lua Scripts
// Description: Atomic lease/ack/retry/dead-letter transitions (spec §6: "Lua
//              atomicity" for the durable queue's state transitions).
// Purpose: Each script performs one job-state transition as a single round
//          trip, so no other lease can observe a job mid-move.
// Dependencies: redis
// ============================================================================

/// Pops the highest-priority waiting job and leases it, unless the queue is
/// paused. `KEYS = [paused, waiting, active, jobs]`, `ARGV = [lease_until]`.
/// Returns the job's serialized body, or `false` if nothing was leased.
pub(crate) const LEASE: &str = r"
local paused = redis.call('GET', KEYS[1])
if paused == '1' then
    return false
end
local popped = redis.call('ZPOPMIN', KEYS[2])
if #popped == 0 then
    return false
end
local job_id = popped[1]
redis.call('ZADD', KEYS[3], ARGV[1], job_id)
return redis.call('HGET', KEYS[4], job_id)
";

/// Acknowledges successful completion. `KEYS = [active, completed, jobs]`,
/// `ARGV = [job_id, remove_on_complete]`.
pub(crate) const ACK: &str = r"
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[3], ARGV[1])
redis.call('LPUSH', KEYS[2], ARGV[1])
redis.call('LTRIM', KEYS[2], 0, tonumber(ARGV[2]) - 1)
return true
";

/// Requeues a failed job for a future retry. `KEYS = [active, delayed,
/// jobs]`, `ARGV = [job_id, ready_at, updated_body]`.
pub(crate) const RETRY: &str = r"
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HSET', KEYS[3], ARGV[1], ARGV[3])
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
return true
";

/// Moves an exhausted job to the dead-letter list. `KEYS = [active, failed,
/// jobs]`, `ARGV = [job_id, updated_body, remove_on_fail]`.
pub(crate) const DEAD_LETTER: &str = r"
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[3], ARGV[1])
redis.call('LPUSH', KEYS[2], ARGV[2])
redis.call('LTRIM', KEYS[2], 0, tonumber(ARGV[3]) - 1)
return true
";

/// Promotes delayed jobs whose readiness time has passed back onto the
/// waiting set, preserving priority order via each job's stored `priority`
/// field. `KEYS = [delayed, jobs, waiting]`, `ARGV = [now, priority_scale]`.
/// Returns the count promoted.
pub(crate) const PROMOTE_DELAYED: &str = r"
local ready = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
local now = tonumber(ARGV[1])
local scale = tonumber(ARGV[2])
for _, job_id in ipairs(ready) do
    local body = redis.call('HGET', KEYS[2], job_id)
    if body then
        local decoded = cjson.decode(body)
        local score = decoded.priority * scale + now
        redis.call('ZREM', KEYS[1], job_id)
        redis.call('ZADD', KEYS[3], score, job_id)
    end
end
return #ready
";

/// Reclaims active jobs whose lease has expired: requeues them if attempts
/// remain, dead-letters them otherwise. `KEYS = [active, jobs, waiting,
/// failed]`, `ARGV = [now, priority_scale]`. Returns `{promoted, dead}`.
pub(crate) const RECLAIM_STALLED: &str = r"
local now = tonumber(ARGV[1])
local scale = tonumber(ARGV[2])
local stalled = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', now)
local promoted = 0
local dead = 0
for _, job_id in ipairs(stalled) do
    local body = redis.call('HGET', KEYS[2], job_id)
    redis.call('ZREM', KEYS[1], job_id)
    if body then
        local decoded = cjson.decode(body)
        decoded.attempts_made = decoded.attempts_made + 1
        if decoded.attempts_made < decoded.options.attempts then
            redis.call('HSET', KEYS[2], job_id, cjson.encode(decoded))
            local score = decoded.priority * scale + now
            redis.call('ZADD', KEYS[3], score, job_id)
            promoted = promoted + 1
        else
            redis.call('HDEL', KEYS[2], job_id)
            redis.call('LPUSH', KEYS[4], cjson.encode(decoded))
            redis.call('LTRIM', KEYS[4], 0, decoded.options.remove_on_fail - 1)
            dead = dead + 1
        end
    end
end
return {promoted, dead}
";

//! Lua scripts for multi-key mutations.
//!
//! Every mutation that touches more than one key runs as a single
//! script so concurrent producers and workers cannot observe a job
//! half-moved between the hash, the due index, and the in-flight set.
//!
//! The claim and revoke scripts derive secondary keys from values
//! (index members / mapping values); this assumes a single logical
//! Redis instance, not Cluster key hashing.

use redis::Script;

/// Write a job record and its due-index entry.
///
/// KEYS: job hash, due index, in-flight index.
/// ARGV: field (encoded id), replace flag, job JSON, due score, member.
/// Returns `{'created'}`, `{'replaced'}`, or `{'exists', <stored JSON>}`.
const PUT_JOB: &str = r#"
local existing = redis.call('HGET', KEYS[1], ARGV[1])
if existing and ARGV[2] == '0' then
  return {'exists', existing}
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
redis.call('ZREM', KEYS[3], ARGV[5])
redis.call('ZADD', KEYS[2], ARGV[4], ARGV[5])
if existing then
  return {'replaced'}
end
return {'created'}
"#;

/// Move all due members to the in-flight set and return their records.
///
/// KEYS: due index, in-flight index.
/// ARGV: now millis, limit, job-hash key prefix.
const CLAIM_DUE: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
local claimed = {}
for _, member in ipairs(due) do
  redis.call('ZREM', KEYS[1], member)
  local cut = string.find(member, '/[^/]*$')
  if cut then
    local queue = string.sub(member, 1, cut - 1)
    local field = string.sub(member, cut + 1)
    local json = redis.call('HGET', ARGV[3] .. queue, field)
    if json then
      redis.call('ZADD', KEYS[2], ARGV[1], member)
      claimed[#claimed + 1] = json
    end
  end
end
return claimed
"#;

/// Return an in-flight job to the due index with a fresh record.
///
/// KEYS: job hash, due index, in-flight index.
/// ARGV: field, job JSON, member, due score.
const REQUEUE: &str = r#"
redis.call('ZREM', KEYS[3], ARGV[3])
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
redis.call('ZADD', KEYS[2], ARGV[4], ARGV[3])
return redis.status_reply('OK')
"#;

/// Remove a finished in-flight job entirely.
///
/// KEYS: job hash, due index, in-flight index.
/// ARGV: field, member.
const ACK_DELETE: &str = r#"
redis.call('ZREM', KEYS[3], ARGV[2])
redis.call('ZREM', KEYS[2], ARGV[2])
redis.call('HDEL', KEYS[1], ARGV[1])
return redis.status_reply('OK')
"#;

/// Delete a job and all its index entries; returns the removed JSON.
///
/// KEYS: job hash, due index, in-flight index.
/// ARGV: field, member.
const DELETE_JOB: &str = r#"
local existing = redis.call('HGET', KEYS[1], ARGV[1])
if not existing then
  return false
end
redis.call('HDEL', KEYS[1], ARGV[1])
redis.call('ZREM', KEYS[2], ARGV[2])
redis.call('ZREM', KEYS[3], ARGV[2])
return existing
"#;

/// Compare-and-swap one job record, re-indexing unless it is in flight.
///
/// KEYS: job hash, due index, in-flight index.
/// ARGV: field, expected JSON, new JSON, member, due score.
/// Returns nil (gone), 0 (lost the race), or 1 (swapped).
const CAS_JOB: &str = r#"
local current = redis.call('HGET', KEYS[1], ARGV[1])
if not current then
  return false
end
if current ~= ARGV[2] then
  return 0
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
local inflight = redis.call('ZSCORE', KEYS[3], ARGV[4])
if not inflight then
  redis.call('ZADD', KEYS[2], ARGV[5], ARGV[4])
end
return 1
"#;

/// Return lease-expired in-flight members to the due index.
///
/// KEYS: in-flight index, due index.
/// ARGV: cutoff millis, now millis.
const RECLAIM: &str = r#"
local expired = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, member in ipairs(expired) do
  redis.call('ZREM', KEYS[1], member)
  redis.call('ZADD', KEYS[2], ARGV[2], member)
end
return #expired
"#;

/// Store a credential for a tenant, dropping the tenant's old one.
///
/// KEYS: token key, tenant-token key.
/// ARGV: tenant, token, token key prefix.
const PUT_TOKEN: &str = r#"
local old = redis.call('GET', KEYS[2])
if old then
  redis.call('DEL', ARGV[3] .. old)
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], ARGV[2])
return redis.status_reply('OK')
"#;

/// Revoke a credential and its reverse mapping.
///
/// KEYS: token key.
/// ARGV: tenant-token key prefix.
const REVOKE_TOKEN: &str = r#"
local tenant = redis.call('GET', KEYS[1])
if not tenant then
  return 0
end
redis.call('DEL', KEYS[1])
redis.call('DEL', ARGV[1] .. tenant)
return 1
"#;

/// Drain all usage counters.
///
/// KEYS: usage hash.
const DRAIN_USAGE: &str = r#"
local usage = redis.call('HGETALL', KEYS[1])
redis.call('DEL', KEYS[1])
return usage
"#;

/// The precompiled script set.
#[derive(Clone)]
pub struct Scripts {
    pub put_job: Script,
    pub claim_due: Script,
    pub requeue: Script,
    pub ack_delete: Script,
    pub delete_job: Script,
    pub cas_job: Script,
    pub reclaim: Script,
    pub put_token: Script,
    pub revoke_token: Script,
    pub drain_usage: Script,
}

impl Scripts {
    /// Compile all scripts.
    pub fn new() -> Self {
        Self {
            put_job: Script::new(PUT_JOB),
            claim_due: Script::new(CLAIM_DUE),
            requeue: Script::new(REQUEUE),
            ack_delete: Script::new(ACK_DELETE),
            delete_job: Script::new(DELETE_JOB),
            cas_job: Script::new(CAS_JOB),
            reclaim: Script::new(RECLAIM),
            put_token: Script::new(PUT_TOKEN),
            revoke_token: Script::new(REVOKE_TOKEN),
            drain_usage: Script::new(DRAIN_USAGE),
        }
    }
}

impl Default for Scripts {
    fn default() -> Self {
        Self::new()
    }
}

//! Validation, rate limiting, and abuse detection (C4).
//!
//! Grounded on the teacher's `enterprise::ratelimit::algorithm::TokenBucket`
//! (CAS-refill token bucket) and `enterprise::ratelimit::analytics::{
//! AbuseDetectionConfig, AbuseDetector, Statistics}`, adapted from an HTTP
//! request-denial model to a per-client operation-submission model. Validator
//! state lives in `DashMap`s so it can be shared across whiteboard partitions
//! (spec §5: rate-limit/abuse tables "may be mutated from any submitter thread").

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use dashmap::DashMap;

use crate::clock::UserId;
use crate::config::EngineConfig;
use crate::error::{Error, RateLimitSeverity};
use crate::limits::{validate_coordinate, validate_element_id, validate_payload_shape};
use crate::operation::ElementOperation;

/// A token-bucket rate limiter for one client, refilled lazily on each check
/// via a compare-and-swap loop rather than a background timer.
struct TokenBucket {
    capacity: f64,
    tokens_milli: AtomicU64,
    refill_per_ms: f64,
    last_refill_ms: AtomicU64,
}

impl TokenBucket {
    fn new(capacity: u32, refill_per_second: u32) -> Self {
        let now_ms = now_millis();
        Self {
            capacity: capacity as f64 * 1000.0,
            tokens_milli: AtomicU64::new((capacity as f64 * 1000.0) as u64),
            refill_per_ms: refill_per_second as f64 / 1000.0,
            last_refill_ms: AtomicU64::new(now_ms),
        }
    }

    /// Attempt to take one token, refilling first. Returns `true` if allowed.
    fn check(&self) -> bool {
        let now_ms = now_millis();
        loop {
            let last = self.last_refill_ms.load(AtomicOrdering::Acquire);
            let elapsed = now_ms.saturating_sub(last) as f64;
            let current = self.tokens_milli.load(AtomicOrdering::Acquire) as f64;
            let refilled = (current + elapsed * self.refill_per_ms * 1000.0).min(self.capacity * 1000.0);

            if self
                .last_refill_ms
                .compare_exchange(last, now_ms, AtomicOrdering::AcqRel, AtomicOrdering::Acquire)
                .is_err()
            {
                continue;
            }

            let refilled_milli = refilled as u64;
            if refilled_milli < 1000 {
                self.tokens_milli.store(refilled_milli, AtomicOrdering::Release);
                return false;
            }

            self.tokens_milli
                .store(refilled_milli - 1000, AtomicOrdering::Release);
            return true;
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Rolling denial statistics for one client, used by the abuse detector.
#[derive(Debug, Default, Clone, Copy)]
pub struct Statistics {
    /// Total submissions observed in the current window.
    pub total: u64,
    /// Submissions denied (rate-limited or validation-failed) in the current window.
    pub denied: u64,
}

impl Statistics {
    /// Fraction of submissions denied, 0.0 when no submissions were observed.
    pub fn denial_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.denied as f64 / self.total as f64
        }
    }
}

struct ClientRecord {
    second_bucket: TokenBucket,
    minute_bucket: TokenBucket,
    violations_in_window: u64,
    window_started: SystemTime,
    blocked_until: Option<SystemTime>,
    stats: Statistics,
}

/// Validates inbound operations: payload shape, timestamp sanity, rate limits,
/// and abuse-driven blocking, entirely independent of processing-latency
/// measurement (spec §9 open question, resolved: keep them independent).
pub struct Validator {
    config: Arc<EngineConfig>,
    clients: DashMap<UserId, ClientRecord>,
}

impl Validator {
    /// Build a validator bound to `config`.
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            clients: DashMap::new(),
        }
    }

    /// Run every validation stage for `operation`, in order: schema/shape,
    /// timestamp sanity, block status, rate limit. The first failing stage
    /// short-circuits and is recorded as a denial for abuse-score purposes.
    pub fn validate(&self, operation: &ElementOperation) -> Result<(), Error> {
        let result = self.validate_inner(operation);
        self.record_outcome(&operation.user_id, result.is_ok());
        result
    }

    fn validate_inner(&self, operation: &ElementOperation) -> Result<(), Error> {
        if let Some(until) = self.blocked_until(&operation.user_id) {
            return Err(Error::ClientBlocked {
                until: chrono::DateTime::<Utc>::from(until),
            });
        }

        validate_element_id(&operation.element_id)?;
        if let Some(position) = operation.position {
            validate_coordinate("position.x", position.x)?;
            validate_coordinate("position.y", position.y)?;
        }
        if let Some(bounds) = operation.bounds {
            validate_coordinate("bounds.x", bounds.x)?;
            validate_coordinate("bounds.y", bounds.y)?;
            validate_coordinate("bounds.w", bounds.w)?;
            validate_coordinate("bounds.h", bounds.h)?;
        }
        if let Some(rotation) = operation.rotation {
            validate_coordinate("rotation", rotation)?;
        }
        if let Some(data) = &operation.data {
            validate_payload_shape("data", data)?;
        }

        self.validate_timestamp(operation)?;
        self.check_rate_limit(&operation.user_id)?;

        Ok(())
    }

    fn validate_timestamp(&self, operation: &ElementOperation) -> Result<(), Error> {
        let skew = (Utc::now() - operation.logical_timestamp).num_seconds().abs();
        if skew > self.config.clock_skew_secs {
            return Err(Error::ValidationFailed {
                field: "logical_timestamp".to_string(),
                code: "clock_skew_exceeded".to_string(),
            });
        }
        Ok(())
    }

    fn check_rate_limit(&self, user_id: &UserId) -> Result<(), Error> {
        let mut record = self.clients.entry(user_id.clone()).or_insert_with(|| {
            ClientRecord {
                second_bucket: TokenBucket::new(self.config.rate_limit_per_second, self.config.rate_limit_per_second),
                minute_bucket: TokenBucket::new(self.config.rate_limit_per_minute, self.config.rate_limit_per_minute / 60),
                violations_in_window: 0,
                window_started: SystemTime::now(),
                blocked_until: None,
                stats: Statistics::default(),
            }
        });

        if !record.second_bucket.check() || !record.minute_bucket.check() {
            self.register_violation(&mut record);
            return Err(Error::RateLimited {
                retry_after_ms: 1000 / self.config.rate_limit_per_second.max(1) as u64,
                severity: if record.violations_in_window > 1 {
                    RateLimitSeverity::Repeated
                } else {
                    RateLimitSeverity::Minor
                },
            });
        }

        Ok(())
    }

    fn register_violation(&self, record: &mut ClientRecord) {
        let window = Duration::from_secs(self.config.abuse_window_secs);
        if record.window_started.elapsed().unwrap_or_default() > window {
            record.window_started = SystemTime::now();
            record.violations_in_window = 0;
        }
        record.violations_in_window += 1;

        if record.violations_in_window >= self.config.abuse_violation_threshold as u64 {
            record.blocked_until =
                Some(SystemTime::now() + Duration::from_secs(self.config.abuse_block_secs));
        }
    }

    fn blocked_until(&self, user_id: &UserId) -> Option<SystemTime> {
        let record = self.clients.get(user_id)?;
        let until = record.blocked_until?;
        if until > SystemTime::now() {
            Some(until)
        } else {
            None
        }
    }

    fn record_outcome(&self, user_id: &UserId, allowed: bool) {
        if let Some(mut record) = self.clients.get_mut(user_id) {
            record.stats.total += 1;
            if !allowed {
                record.stats.denied += 1;
            }
        }
    }

    /// Snapshot of a client's rolling statistics, for the housekeeper/metrics surface.
    pub fn statistics(&self, user_id: &UserId) -> Statistics {
        self.clients.get(user_id).map(|r| r.stats).unwrap_or_default()
    }

    /// Drop tracking state for clients that have had no activity and are not
    /// blocked, bounding memory (spec: housekeeper sweeps stale validator state).
    pub fn cleanup(&self, idle_for: Duration) {
        let now = SystemTime::now();
        self.clients.retain(|_, record| {
            let blocked = record.blocked_until.map(|until| until > now).unwrap_or(false);
            blocked || record.window_started.elapsed().unwrap_or_default() < idle_for
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::test_support::op;
    use crate::operation::OperationKind;

    fn validator() -> Validator {
        let mut config = EngineConfig::default();
        config.rate_limit_per_second = 2;
        config.rate_limit_per_minute = 120;
        config.abuse_violation_threshold = 2;
        Validator::new(Arc::new(config))
    }

    #[test]
    fn accepts_well_formed_operation() {
        let validator = validator();
        let operation = op(1, "alice", OperationKind::Move, "e1");
        assert!(validator.validate(&operation).is_ok());
    }

    #[test]
    fn rejects_bad_element_id() {
        let validator = validator();
        let operation = op(1, "alice", OperationKind::Move, "bad id");
        assert!(matches!(
            validator.validate(&operation),
            Err(Error::ValidationFailed { .. })
        ));
    }

    #[test]
    fn rejects_out_of_skew_timestamp() {
        let validator = validator();
        let mut operation = op(1, "alice", OperationKind::Move, "e1");
        operation.logical_timestamp = Utc::now() - chrono::Duration::seconds(120);
        assert!(matches!(
            validator.validate(&operation),
            Err(Error::ValidationFailed { .. })
        ));
    }

    #[test]
    fn rate_limit_then_block_after_repeated_violations() {
        let validator = validator();
        let operation = op(1, "alice", OperationKind::Move, "e1");

        assert!(validator.validate(&operation).is_ok());
        assert!(validator.validate(&operation).is_ok());
        // third and fourth submissions exceed the per-second bucket of 2.
        assert!(matches!(validator.validate(&operation), Err(Error::RateLimited { .. })));
        let result = validator.validate(&operation);
        assert!(matches!(result, Err(Error::ClientBlocked { .. }) | Err(Error::RateLimited { .. })));
    }

    #[test]
    fn statistics_track_denials() {
        let validator = validator();
        let good = op(1, "bob", OperationKind::Move, "e1");
        let bad = op(2, "bob", OperationKind::Move, "bad id");
        let _ = validator.validate(&good);
        let _ = validator.validate(&bad);
        let stats = validator.statistics(&"bob".to_string());
        assert_eq!(stats.total, 2);
        assert_eq!(stats.denied, 1);
    }
}

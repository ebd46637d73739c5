//! Engine configuration (spec §6).
//!
//! Grounded on the teacher's `enterprise::ratelimit::policy::Policy` and
//! `enterprise::cache::CacheConfig` pattern: one flat, `serde`-derived struct with
//! `#[serde(default = ...)]` on every field, constructed once and shared via `Arc`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_rate_limit_per_second() -> u32 {
    15
}
fn default_rate_limit_per_minute() -> u32 {
    600
}
fn default_abuse_violation_threshold() -> u32 {
    5
}
fn default_abuse_window_secs() -> u64 {
    300
}
fn default_abuse_block_secs() -> u64 {
    600
}
fn default_clock_skew_secs() -> i64 {
    60
}
fn default_spatial_index_capacity() -> usize {
    10_000
}
fn default_transform_cache_capacity() -> usize {
    5_000
}
fn default_recent_ops_cache_capacity() -> usize {
    256
}
fn default_max_elements_per_selection() -> usize {
    100
}
fn default_max_selections_per_user() -> usize {
    1
}
fn default_ownership_expiry_secs() -> u64 {
    30
}
fn default_selection_conflict_auto_resolve_secs() -> u64 {
    5
}
fn default_max_selection_conflicts_per_element() -> usize {
    10
}
fn default_max_element_queue_depth() -> usize {
    500
}
fn default_max_selection_queue_depth() -> usize {
    100
}
fn default_max_in_flight_element_ops() -> usize {
    5
}
fn default_max_in_flight_selection_ops() -> usize {
    1
}
fn default_transaction_max_age_secs() -> i64 {
    300
}
fn default_resolution_budget_ms() -> u64 {
    500
}
fn default_resolution_skip_before_budget_ms() -> u64 {
    100
}
fn default_housekeeper_interval_secs() -> u64 {
    10
}

/// Every tunable the coordination core exposes, gathered in one immutable
/// struct and shared across partitions via `Arc<EngineConfig>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sustained token-bucket refill rate, operations per second per client.
    pub rate_limit_per_second: u32,
    /// Token-bucket capacity, operations per rolling minute per client.
    pub rate_limit_per_minute: u32,
    /// Denials within `abuse_window_secs` that trigger an auto-block.
    pub abuse_violation_threshold: u32,
    /// Rolling window over which violations are counted.
    pub abuse_window_secs: u64,
    /// Duration an auto-blocked client stays blocked.
    pub abuse_block_secs: u64,
    /// Maximum allowed clock skew between client-reported and server time.
    pub clock_skew_secs: i64,
    /// Maximum distinct elements tracked by the spatial index before LRU eviction.
    pub spatial_index_capacity: usize,
    /// Maximum entries in the transform-result cache.
    pub transform_cache_capacity: usize,
    /// Maximum entries in the per-user recent-operation cache.
    pub recent_ops_cache_capacity: usize,
    /// Maximum elements a single selection may reference.
    pub max_elements_per_selection: usize,
    /// Maximum concurrent selections a single user may hold.
    pub max_selections_per_user: usize,
    /// How long an element ownership claim survives without renewal.
    pub ownership_expiry_secs: u64,
    /// How long an unresolved selection conflict waits before auto-resolution.
    pub selection_conflict_auto_resolve_secs: u64,
    /// Force-resolve threshold: conflicts queued against one element.
    pub max_selection_conflicts_per_element: usize,
    /// Backlog depth before element-operation submissions are shed.
    pub max_element_queue_depth: usize,
    /// Backlog depth before selection submissions are shed.
    pub max_selection_queue_depth: usize,
    /// Max concurrently in-flight element operations per whiteboard.
    pub max_in_flight_element_ops: usize,
    /// Max concurrently in-flight selection operations per whiteboard.
    pub max_in_flight_selection_ops: usize,
    /// Age after which a pending transaction is force-rolled-back.
    pub transaction_max_age_secs: i64,
    /// Wall-clock budget for a single conflict resolution attempt.
    pub resolution_budget_ms: u64,
    /// Below this much budget remaining, skip resolution and log rather than attempt it.
    pub resolution_skip_before_budget_ms: u64,
    /// How often the housekeeper sweeps expired state.
    pub housekeeper_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_second: default_rate_limit_per_second(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            abuse_violation_threshold: default_abuse_violation_threshold(),
            abuse_window_secs: default_abuse_window_secs(),
            abuse_block_secs: default_abuse_block_secs(),
            clock_skew_secs: default_clock_skew_secs(),
            spatial_index_capacity: default_spatial_index_capacity(),
            transform_cache_capacity: default_transform_cache_capacity(),
            recent_ops_cache_capacity: default_recent_ops_cache_capacity(),
            max_elements_per_selection: default_max_elements_per_selection(),
            max_selections_per_user: default_max_selections_per_user(),
            ownership_expiry_secs: default_ownership_expiry_secs(),
            selection_conflict_auto_resolve_secs: default_selection_conflict_auto_resolve_secs(),
            max_selection_conflicts_per_element: default_max_selection_conflicts_per_element(),
            max_element_queue_depth: default_max_element_queue_depth(),
            max_selection_queue_depth: default_max_selection_queue_depth(),
            max_in_flight_element_ops: default_max_in_flight_element_ops(),
            max_in_flight_selection_ops: default_max_in_flight_selection_ops(),
            transaction_max_age_secs: default_transaction_max_age_secs(),
            resolution_budget_ms: default_resolution_budget_ms(),
            resolution_skip_before_budget_ms: default_resolution_skip_before_budget_ms(),
            housekeeper_interval_secs: default_housekeeper_interval_secs(),
        }
    }
}

impl EngineConfig {
    /// Wrap in an `Arc` for cheap sharing across per-whiteboard tasks.
    pub fn shared(self) -> Arc<EngineConfig> {
        Arc::new(self)
    }

    /// `abuse_window_secs` as a `Duration`, for use with `tokio::time`.
    pub fn abuse_window(&self) -> Duration {
        Duration::from_secs(self.abuse_window_secs)
    }

    /// `abuse_block_secs` as a `Duration`.
    pub fn abuse_block_duration(&self) -> Duration {
        Duration::from_secs(self.abuse_block_secs)
    }

    /// `resolution_budget_ms` as a `Duration`.
    pub fn resolution_budget(&self) -> Duration {
        Duration::from_millis(self.resolution_budget_ms)
    }

    /// `housekeeper_interval_secs` as a `Duration`.
    pub fn housekeeper_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeper_interval_secs)
    }
}

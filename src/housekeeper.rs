//! Periodic cleanup and metrics (C12).
//!
//! Grounded on the teacher's `enterprise::ratelimit::analytics::AbuseDetector::
//! cleanup` sweep and its `tracing`-event-per-cleanup-class convention, extended
//! to cover every expiring structure this crate owns: transactions, selection
//! ownership/state, and validator client records.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::config::EngineConfig;
use crate::selection_store::SelectionStore;
use crate::transaction::TransactionManager;
use crate::validator::Validator;

/// A point-in-time snapshot of housekeeping-relevant counters, handed back to
/// the caller for `get_metrics` (spec §6).
#[derive(Debug, Clone, Copy, Default)]
pub struct PerformanceMetrics {
    /// Transactions force-rolled-back for exceeding their age limit this sweep.
    pub transactions_force_rolled_back: u64,
    /// Expired ownership claims reaped this sweep.
    pub ownership_reaped: u64,
    /// Empty/stale selections reaped this sweep.
    pub selections_reaped: u64,
    /// Active users with a non-empty selection, as of this sweep.
    pub active_selection_users: usize,
    /// Total selected-element references, as of this sweep.
    pub total_selections: usize,
}

/// Runs one full housekeeping sweep over a whiteboard partition's mutable
/// state. Errors inside any individual cleanup step are logged via
/// `tracing::warn!` and otherwise swallowed — housekeeping must never fail the
/// caller's in-flight request (spec §7 propagation policy).
pub fn sweep(
    config: &Arc<EngineConfig>,
    transactions: &mut TransactionManager,
    selections: &mut SelectionStore,
    validator: &Validator,
) -> PerformanceMetrics {
    let now = Utc::now();

    let rolled_back = transactions.force_rollback_aged(
        chrono::Duration::seconds(config.transaction_max_age_secs),
        now,
    );
    for id in &rolled_back {
        info!(transaction_id = %id, "force-rolled-back aged transaction");
    }
    transactions.reap_terminal(chrono::Duration::seconds(config.transaction_max_age_secs), now);

    let (ownership_reaped, selections_reaped) = selections.sweep_expired(
        now,
        chrono::Duration::seconds(config.ownership_expiry_secs as i64 * 4),
    );
    if ownership_reaped > 0 {
        info!(count = ownership_reaped, "reaped expired selection ownership");
    }
    if selections_reaped > 0 {
        info!(count = selections_reaped, "reaped stale empty selections");
    }

    validator.cleanup(Duration::from_secs(config.abuse_window_secs * 4));

    let selection_stats = selections.statistics();

    PerformanceMetrics {
        transactions_force_rolled_back: rolled_back.len() as u64,
        ownership_reaped: ownership_reaped as u64,
        selections_reaped: selections_reaped as u64,
        active_selection_users: selection_stats.active_users,
        total_selections: selection_stats.total_selections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_reports_rolled_back_transactions() {
        let config = Arc::new(EngineConfig::default());
        let mut transactions = TransactionManager::new();
        let mut selections = SelectionStore::new();
        let validator = Validator::new(config.clone());

        let id = transactions.begin("alice".to_string());
        // Force the clock forward by rolling back manually via a huge max age of
        // zero, simulating an aged transaction without waiting in real time.
        let rolled_back = transactions.force_rollback_aged(
            chrono::Duration::seconds(-1),
            Utc::now(),
        );
        assert_eq!(rolled_back, vec![id]);

        let metrics = sweep(&config, &mut transactions, &mut selections, &validator);
        assert_eq!(metrics.transactions_force_rolled_back, 0); // already rolled back above
    }

    #[test]
    fn sweep_returns_selection_statistics() {
        let config = Arc::new(EngineConfig::default());
        let mut transactions = TransactionManager::new();
        let mut selections = SelectionStore::new();
        let validator = Validator::new(config.clone());

        selections
            .update_selection(&config, &"alice".to_string(), vec!["e1".to_string()])
            .unwrap();

        let metrics = sweep(&config, &mut transactions, &mut selections, &validator);
        assert_eq!(metrics.active_selection_users, 1);
        assert_eq!(metrics.total_selections, 1);
    }
}

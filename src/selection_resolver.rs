//! Selection conflict resolution (C10).
//!
//! Grounded on the teacher's `conflict_resolver::ResolutionStrategy` dispatch
//! pattern, reapplied to element ownership contests rather than operation
//! conflicts, plus the spec's auto-resolution timeout and
//! force-resolve-on-overflow rules.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::UserId;
use crate::config::EngineConfig;
use crate::operation::ElementId;
use crate::selection::{SelectionConflict, SelectionResolutionStrategy};

/// Per-user priority table for the `priority` strategy; absent users default
/// to priority 0.
pub type SelectionPriorityTable = std::collections::HashMap<UserId, u32>;

/// Records that two or more users selected the same element, returning the new
/// (or existing, contender-appended) conflict record.
pub fn detect_or_extend(
    existing: Option<SelectionConflict>,
    element_id: &ElementId,
    user_id: &UserId,
    strategy: SelectionResolutionStrategy,
    now: DateTime<Utc>,
) -> SelectionConflict {
    match existing {
        Some(mut conflict) if !conflict.is_resolved() => {
            if !conflict.contenders.contains(user_id) {
                conflict.contenders.push(user_id.clone());
            }
            conflict
        }
        _ => SelectionConflict {
            id: Uuid::new_v4(),
            element_id: element_id.clone(),
            contenders: vec![user_id.clone()],
            detected_at: now,
            strategy,
            resolved_owner: None,
            resolved_at: None,
        },
    }
}

/// Resolve `conflict` per its configured strategy. `acquired_at` maps each
/// contender to when they first claimed the element (used by `Timestamp`);
/// `current_owner` is the incumbent, if any (used by `Ownership`).
pub fn resolve(
    conflict: &mut SelectionConflict,
    priorities: &SelectionPriorityTable,
    acquired_at: &std::collections::HashMap<UserId, DateTime<Utc>>,
    current_owner: Option<&UserId>,
    now: DateTime<Utc>,
) {
    if conflict.is_resolved() {
        return;
    }

    let winner = match conflict.strategy {
        SelectionResolutionStrategy::Priority => conflict
            .contenders
            .iter()
            .max_by_key(|user| priorities.get(*user).copied().unwrap_or(0))
            .cloned(),
        SelectionResolutionStrategy::Timestamp => conflict
            .contenders
            .iter()
            .min_by_key(|user| acquired_at.get(*user).copied().unwrap_or(now))
            .cloned(),
        SelectionResolutionStrategy::Ownership => current_owner
            .filter(|owner| conflict.contenders.contains(owner))
            .cloned()
            .or_else(|| conflict.contenders.first().cloned()),
        SelectionResolutionStrategy::Shared => None,
    };

    if conflict.strategy == SelectionResolutionStrategy::Shared {
        // Shared conflicts never produce a single resolved owner; they close
        // immediately since there is nothing left to adjudicate.
        conflict.resolved_owner = conflict.contenders.first().cloned();
        conflict.resolved_at = Some(now);
        return;
    }

    if let Some(winner) = winner {
        conflict.resolved_owner = Some(winner);
        conflict.resolved_at = Some(now);
    }
}

/// Force-resolve (via `Timestamp`, the most deterministic strategy) any
/// conflict whose contender count has crossed `max_contenders`, per the spec's
/// anti-starvation rule.
pub fn force_resolve_if_overflowing(
    conflict: &mut SelectionConflict,
    acquired_at: &std::collections::HashMap<UserId, DateTime<Utc>>,
    max_contenders: usize,
    now: DateTime<Utc>,
) {
    if conflict.is_resolved() || conflict.contenders.len() < max_contenders {
        return;
    }
    conflict.strategy = SelectionResolutionStrategy::Timestamp;
    resolve(conflict, &SelectionPriorityTable::new(), acquired_at, None, now);
}

/// Auto-resolve (via `Timestamp`) any conflict that has sat unresolved longer
/// than `timeout`, so a disconnected contender never blocks resolution forever.
pub fn auto_resolve_if_timed_out(
    conflict: &mut SelectionConflict,
    acquired_at: &std::collections::HashMap<UserId, DateTime<Utc>>,
    timeout: chrono::Duration,
    now: DateTime<Utc>,
) {
    if conflict.is_resolved() || now - conflict.detected_at < timeout {
        return;
    }
    conflict.strategy = SelectionResolutionStrategy::Timestamp;
    resolve(conflict, &SelectionPriorityTable::new(), acquired_at, None, now);
}

/// Convenience: derive the configured auto-resolve timeout and overflow cap
/// from engine config, used by the store's periodic sweep.
pub fn sweep_params(config: &Arc<EngineConfig>) -> (chrono::Duration, usize) {
    (
        chrono::Duration::seconds(config.selection_conflict_auto_resolve_secs as i64),
        config.max_selection_conflicts_per_element,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(strategy: SelectionResolutionStrategy, contenders: &[&str], now: DateTime<Utc>) -> SelectionConflict {
        SelectionConflict {
            id: Uuid::new_v4(),
            element_id: "e1".to_string(),
            contenders: contenders.iter().map(|s| s.to_string()).collect(),
            detected_at: now,
            strategy,
            resolved_owner: None,
            resolved_at: None,
        }
    }

    #[test]
    fn priority_strategy_picks_highest_priority() {
        let now = Utc::now();
        let mut c = conflict(SelectionResolutionStrategy::Priority, &["alice", "bob"], now);
        let mut priorities = SelectionPriorityTable::new();
        priorities.insert("bob".to_string(), 10);
        resolve(&mut c, &priorities, &Default::default(), None, now);
        assert_eq!(c.resolved_owner, Some("bob".to_string()));
    }

    #[test]
    fn timestamp_strategy_picks_earliest_claim() {
        let now = Utc::now();
        let mut c = conflict(SelectionResolutionStrategy::Timestamp, &["alice", "bob"], now);
        let mut acquired = std::collections::HashMap::new();
        acquired.insert("alice".to_string(), now + chrono::Duration::seconds(5));
        acquired.insert("bob".to_string(), now);
        resolve(&mut c, &SelectionPriorityTable::new(), &acquired, None, now);
        assert_eq!(c.resolved_owner, Some("bob".to_string()));
    }

    #[test]
    fn shared_strategy_resolves_without_exclusivity() {
        let now = Utc::now();
        let mut c = conflict(SelectionResolutionStrategy::Shared, &["alice", "bob"], now);
        resolve(&mut c, &SelectionPriorityTable::new(), &Default::default(), None, now);
        assert!(c.is_resolved());
    }

    #[test]
    fn overflow_forces_resolution() {
        let now = Utc::now();
        let mut c = conflict(SelectionResolutionStrategy::Shared, &["a", "b", "c"], now);
        force_resolve_if_overflowing(&mut c, &Default::default(), 3, now);
        assert!(c.is_resolved());
        assert_eq!(c.strategy, SelectionResolutionStrategy::Timestamp);
    }

    #[test]
    fn timeout_forces_resolution() {
        let now = Utc::now();
        let mut c = conflict(SelectionResolutionStrategy::Shared, &["a", "b"], now);
        let later = now + chrono::Duration::seconds(10);
        auto_resolve_if_timed_out(&mut c, &Default::default(), chrono::Duration::seconds(5), later);
        assert!(c.is_resolved());
    }
}

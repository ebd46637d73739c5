//! Selection state store (C9).
//!
//! Grounded on the teacher's `enterprise::collaboration::presence::PresenceManager`
//! bookkeeping pattern (per-user state map plus aggregate counters), adapted to
//! enforce the spec's per-user/per-selection caps and ownership-expiry sweeps.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::UserId;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::operation::ElementId;
use crate::selection::{SelectionOwnership, SelectionState};

/// Aggregate counters exposed to the housekeeper's `PerformanceMetrics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionStatistics {
    /// Distinct users with an active (non-empty) selection.
    pub active_users: usize,
    /// Total selected-element references across all users.
    pub total_selections: usize,
}

/// Owns per-user selection state and element ownership claims for one
/// whiteboard partition.
#[derive(Default)]
pub struct SelectionStore {
    selections: HashMap<UserId, SelectionState>,
    ownership: HashMap<ElementId, SelectionOwnership>,
}

impl SelectionStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a selection update from `user_id`, enforcing the configured
    /// per-selection element cap. Does not touch ownership; callers run
    /// conflict detection/resolution afterward (C10).
    pub fn update_selection(
        &mut self,
        config: &Arc<EngineConfig>,
        user_id: &UserId,
        element_ids: Vec<ElementId>,
    ) -> Result<(), Error> {
        if element_ids.len() > config.max_elements_per_selection {
            return Err(Error::LimitExceeded {
                kind: "max_elements_per_selection".to_string(),
            });
        }
        let state = self
            .selections
            .entry(user_id.clone())
            .or_insert_with(|| SelectionState::new(user_id.clone()));
        state.set_elements(element_ids);
        Ok(())
    }

    /// Clear a user's selection entirely.
    pub fn clear_selection(&mut self, user_id: &UserId) {
        if let Some(state) = self.selections.get_mut(user_id) {
            state.set_elements(Vec::new());
        }
    }

    /// Current selection for `user_id`, if one exists.
    pub fn selection(&self, user_id: &UserId) -> Option<&SelectionState> {
        self.selections.get(user_id)
    }

    /// Grant (or renew) exclusive ownership of `element_id` to `user_id`.
    pub fn claim_ownership(
        &mut self,
        config: &Arc<EngineConfig>,
        element_id: &ElementId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) {
        self.ownership.insert(
            element_id.clone(),
            SelectionOwnership {
                element_id: element_id.clone(),
                user_id: user_id.clone(),
                acquired_at: now,
                expires_at: now + chrono::Duration::seconds(config.ownership_expiry_secs as i64),
            },
        );
    }

    /// Current owner of `element_id`, if any and not expired as of `now`.
    pub fn owner(&self, element_id: &ElementId, now: DateTime<Utc>) -> Option<&UserId> {
        self.ownership
            .get(element_id)
            .filter(|claim| !claim.is_expired(now))
            .map(|claim| &claim.user_id)
    }

    /// Release `user_id`'s ownership of `element_id`, if they hold it.
    pub fn release_ownership(&mut self, element_id: &ElementId, user_id: &UserId) {
        if let Some(claim) = self.ownership.get(element_id) {
            if &claim.user_id == user_id {
                self.ownership.remove(element_id);
            }
        }
    }

    /// Drop expired ownership claims and empty selections for users who have
    /// not updated recently, returning the number reaped of each kind.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>, selection_max_age: chrono::Duration) -> (usize, usize) {
        let before_ownership = self.ownership.len();
        self.ownership.retain(|_, claim| !claim.is_expired(now));
        let reaped_ownership = before_ownership - self.ownership.len();

        let before_selections = self.selections.len();
        self.selections
            .retain(|_, state| !state.is_empty() || now - state.updated_at < selection_max_age);
        let reaped_selections = before_selections - self.selections.len();

        (reaped_ownership, reaped_selections)
    }

    /// Snapshot of aggregate counters.
    pub fn statistics(&self) -> SelectionStatistics {
        let active_users = self.selections.values().filter(|s| !s.is_empty()).count();
        let total_selections = self.selections.values().map(|s| s.element_ids.len()).sum();
        SelectionStatistics {
            active_users,
            total_selections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Arc<EngineConfig> {
        Arc::new(EngineConfig::default())
    }

    #[test]
    fn update_selection_enforces_cap() {
        let mut store = SelectionStore::new();
        let mut config = EngineConfig::default();
        config.max_elements_per_selection = 2;
        let config = Arc::new(config);
        let result = store.update_selection(
            &config,
            &"alice".to_string(),
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
        );
        assert!(matches!(result, Err(Error::LimitExceeded { .. })));
    }

    #[test]
    fn ownership_claim_and_expiry() {
        let mut store = SelectionStore::new();
        let config = config();
        let now = Utc::now();
        store.claim_ownership(&config, &"e1".to_string(), &"alice".to_string(), now);
        assert_eq!(store.owner(&"e1".to_string(), now), Some(&"alice".to_string()));

        let later = now + chrono::Duration::seconds(config.ownership_expiry_secs as i64 + 1);
        assert_eq!(store.owner(&"e1".to_string(), later), None);
    }

    #[test]
    fn sweep_reaps_expired_ownership() {
        let mut store = SelectionStore::new();
        let config = config();
        let now = Utc::now();
        store.claim_ownership(&config, &"e1".to_string(), &"alice".to_string(), now);
        let later = now + chrono::Duration::seconds(config.ownership_expiry_secs as i64 + 1);
        let (reaped_ownership, _) = store.sweep_expired(later, chrono::Duration::seconds(300));
        assert_eq!(reaped_ownership, 1);
    }

    #[test]
    fn statistics_count_active_users_and_selections() {
        let mut store = SelectionStore::new();
        let config = config();
        store
            .update_selection(&config, &"alice".to_string(), vec!["a".to_string(), "b".to_string()])
            .unwrap();
        store.update_selection(&config, &"bob".to_string(), vec![]).unwrap();
        let stats = store.statistics();
        assert_eq!(stats.active_users, 1);
        assert_eq!(stats.total_selections, 2);
    }
}

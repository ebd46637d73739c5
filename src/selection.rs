//! Selection data model (C9/C10/C11 shared vocabulary).
//!
//! Grounded on the teacher's `enterprise::collaboration::presence::{
//! CursorPosition, SelectionRange, ActivityStatus}`, adapted from CAD-entity
//! selection to whiteboard element selection with explicit ownership and
//! conflict records the presence module leaves implicit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::UserId;
use crate::operation::ElementId;

/// Selection identifier.
pub type SelectionId = Uuid;

/// One user's current selection on a whiteboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionState {
    /// Selection id.
    pub id: SelectionId,
    /// Owning user.
    pub user_id: UserId,
    /// Elements currently selected, insertion order.
    pub element_ids: Vec<ElementId>,
    /// When this selection was last updated.
    pub updated_at: DateTime<Utc>,
}

impl SelectionState {
    /// A fresh, empty selection for `user_id`.
    pub fn new(user_id: UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            element_ids: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Replace the selected element set and bump `updated_at`.
    pub fn set_elements(&mut self, element_ids: Vec<ElementId>) {
        self.element_ids = element_ids;
        self.updated_at = Utc::now();
    }

    /// Whether this selection currently references no elements.
    pub fn is_empty(&self) -> bool {
        self.element_ids.is_empty()
    }
}

/// An exclusive claim on an element, granted to the first user to select it
/// and released on expiry, explicit clear, or supersession.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionOwnership {
    /// The element being owned.
    pub element_id: ElementId,
    /// The current owner.
    pub user_id: UserId,
    /// When ownership was granted or last renewed.
    pub acquired_at: DateTime<Utc>,
    /// When this claim expires without renewal.
    pub expires_at: DateTime<Utc>,
}

impl SelectionOwnership {
    /// Whether this claim has expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Strategy used to pick a winner when two users select the same element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionResolutionStrategy {
    /// Highest configured/declared priority wins.
    Priority,
    /// Earliest `acquired_at` wins.
    Timestamp,
    /// Current owner is never displaced (first-claim-sticky).
    Ownership,
    /// Both users may select the element; no exclusivity enforced.
    Shared,
}

/// A detected contest over the same element between two or more users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConflict {
    /// Conflict id.
    pub id: Uuid,
    /// The contested element.
    pub element_id: ElementId,
    /// Users contesting this element, in arrival order.
    pub contenders: Vec<UserId>,
    /// When this conflict was first observed.
    pub detected_at: DateTime<Utc>,
    /// The strategy that will (or did) resolve this conflict.
    pub strategy: SelectionResolutionStrategy,
    /// The user granted the element once resolved.
    pub resolved_owner: Option<UserId>,
    /// When this conflict was resolved, if it has been.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SelectionConflict {
    /// Whether this conflict has a terminal resolution.
    pub fn is_resolved(&self) -> bool {
        self.resolved_owner.is_some()
    }
}

/// A single user's highlight entry, as projected for broadcast. Never stored —
/// always derived fresh from selection + ownership state (spec C11).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionHighlight {
    /// The element being highlighted.
    pub element_id: ElementId,
    /// The user whose selection produced this highlight.
    pub user_id: UserId,
    /// Whether `user_id` currently owns this element exclusively.
    pub is_owned: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_expiry() {
        let now = Utc::now();
        let ownership = SelectionOwnership {
            element_id: "e1".to_string(),
            user_id: "alice".to_string(),
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(30),
        };
        assert!(!ownership.is_expired(now));
        assert!(ownership.is_expired(now + chrono::Duration::seconds(31)));
    }

    #[test]
    fn selection_state_replace_updates_timestamp() {
        let mut state = SelectionState::new("alice".to_string());
        let before = state.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        state.set_elements(vec!["e1".to_string()]);
        assert!(state.updated_at >= before);
        assert!(!state.is_empty());
    }
}

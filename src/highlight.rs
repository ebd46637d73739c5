//! Highlight projection (C11).
//!
//! A pure function from selection + ownership state to the highlight list a
//! transport layer would broadcast — never persisted, recomputed on demand, per
//! spec C11. Grounded on the teacher's `presence::PresenceManager::broadcast`
//! read path, which likewise derives a wire view from live state rather than
//! storing one.

use chrono::{DateTime, Utc};

use crate::clock::UserId;
use crate::operation::ElementId;
use crate::selection::SelectionHighlight;
use crate::selection_store::SelectionStore;

/// Project every active selection in `store` into the flat highlight list a
/// transport layer would fan out to connected clients.
pub fn project(store: &SelectionStore, users: &[UserId], now: DateTime<Utc>) -> Vec<SelectionHighlight> {
    let mut highlights = Vec::new();
    for user_id in users {
        let Some(selection) = store.selection(user_id) else {
            continue;
        };
        for element_id in &selection.element_ids {
            let is_owned = store.owner(element_id, now) == Some(user_id);
            highlights.push(SelectionHighlight {
                element_id: element_id.clone(),
                user_id: user_id.clone(),
                is_owned,
            });
        }
    }
    highlights
}

/// Highlights touching one specific element, across all users — useful for an
/// incremental broadcast when only one element's ownership changed.
pub fn project_for_element(
    store: &SelectionStore,
    users: &[UserId],
    element_id: &ElementId,
    now: DateTime<Utc>,
) -> Vec<SelectionHighlight> {
    project(store, users, now)
        .into_iter()
        .filter(|h| &h.element_id == element_id)
        .collect()
}

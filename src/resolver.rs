//! Conflict resolution (C6).
//!
//! Grounded on the teacher's `enterprise::collaboration::conflict_resolver`
//! strategy-selection table, adapted to the spec's §4.6 type/severity dispatch
//! and time-budget rules (resolution attempts skip rather than block once the
//! per-request budget is nearly spent).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value as Json;
use uuid::Uuid;

use crate::clock::causal_order;
use crate::conflict::{ConflictRecord, ConflictResolutionRecord, ConflictType, ResolutionStrategy, Severity};
use crate::error::Error;
use crate::operation::ElementOperation;

/// Per-user priority table consulted by the `priority-user` strategy. Absent
/// users default to priority 0.
pub type PriorityTable = HashMap<String, u32>;

/// Pick the strategy for a conflict per the type/severity table (spec §4.6):
/// `Critical` severity always requires manual resolution regardless of type;
/// `Spatial` conflicts additionally require manual resolution at `High`
/// severity (an overlap big enough to matter but not yet a hard clash);
/// `Semantic` conflicts resolve via `Merge` whenever either the incompatible-
/// change or data-conflict detail is populated, since the merge algebra (not
/// last-write-wins) is what reconciles differing field values; every other
/// type/severity combination dispatches automatically via last-write-wins.
pub fn select_strategy(conflict: &ConflictRecord) -> ResolutionStrategy {
    if conflict.severity == Severity::Critical {
        return ResolutionStrategy::Manual;
    }

    match conflict.conflict_type {
        ConflictType::Spatial if conflict.severity == Severity::High => ResolutionStrategy::Manual,
        ConflictType::Semantic => {
            match &conflict.semantic_details {
                Some(details) if !details.incompatible_changes.is_empty() => ResolutionStrategy::Merge,
                Some(details) if !details.data_conflicts.is_empty() => ResolutionStrategy::Merge,
                _ => ResolutionStrategy::LastWriteWins,
            }
        }
        ConflictType::Spatial
        | ConflictType::Temporal
        | ConflictType::Ordering
        | ConflictType::Dependency
        | ConflictType::Compound => ResolutionStrategy::LastWriteWins,
    }
}

/// Resolve `conflict` given the two operations it names (for pairwise
/// conflicts) and an optional priority table, subject to a wall-clock budget.
/// Returns `Ok(None)` when the remaining budget is below the configured
/// skip-before threshold — the caller should log and leave the conflict
/// pending rather than block further submissions.
pub fn resolve(
    conflict: &ConflictRecord,
    operations: &[&ElementOperation],
    priorities: &PriorityTable,
    deadline: Instant,
    skip_before: Duration,
) -> Result<Option<ConflictResolutionRecord>, Error> {
    if deadline.saturating_duration_since(Instant::now()) < skip_before {
        return Ok(None);
    }

    let strategy = select_strategy(conflict);

    match strategy {
        ResolutionStrategy::Manual => Ok(Some(ConflictResolutionRecord {
            strategy,
            result_operation: None,
            manual_required: true,
            confidence: 0.0,
        })),
        ResolutionStrategy::LastWriteWins => {
            let winner = last_write_wins(operations).ok_or_else(|| Error::TransactionInvalid {
                reason: "resolver requires at least one operation".to_string(),
            })?;
            Ok(Some(ConflictResolutionRecord {
                strategy,
                result_operation: Some(winner.clone()),
                manual_required: false,
                confidence: confidence_for(conflict),
            }))
        }
        ResolutionStrategy::PriorityUser => {
            let winner = priority_winner(operations, priorities).ok_or_else(|| Error::TransactionInvalid {
                reason: "resolver requires at least one operation".to_string(),
            })?;
            Ok(Some(ConflictResolutionRecord {
                strategy,
                result_operation: Some(winner.clone()),
                manual_required: false,
                confidence: confidence_for(conflict),
            }))
        }
        ResolutionStrategy::Merge => {
            let merged = if operations.len() >= 2 {
                let mut ordered = operations.to_vec();
                ordered.sort_by(|a, b| causal_order((a.lamport, &a.user_id), (b.lamport, &b.user_id)));
                merge_operations(ordered[0], ordered[ordered.len() - 1])
            } else {
                last_write_wins(operations)
                    .ok_or_else(|| Error::TransactionInvalid {
                        reason: "resolver requires at least one operation".to_string(),
                    })?
                    .clone()
            };
            Ok(Some(ConflictResolutionRecord {
                strategy,
                result_operation: Some(merged),
                manual_required: false,
                confidence: 0.7,
            }))
        }
        ResolutionStrategy::Automatic => unreachable!("select_strategy never returns Automatic directly"),
    }
}

/// Field-merge algebra for the `Merge` strategy (spec §4.6): `data`/`style`
/// are overlaid key-wise with `incoming` shadowing `existing`; `position`/
/// `bounds`/`rotation`/`z_index` prefer whichever side is non-null, `incoming`
/// breaking ties; causal metadata advances past both inputs rather than
/// picking one side's.
pub fn merge_operations(existing: &ElementOperation, incoming: &ElementOperation) -> ElementOperation {
    let mut merged = incoming.clone();
    merged.id = Uuid::new_v4();

    merged.position = incoming.position.or(existing.position);
    merged.bounds = incoming.bounds.or(existing.bounds);
    merged.rotation = incoming.rotation.or(existing.rotation);
    merged.z_index = incoming.z_index.or(existing.z_index);

    merged.data = match (&existing.data, &incoming.data) {
        (Some(Json::Object(existing_map)), Some(Json::Object(incoming_map))) => {
            let mut overlaid = existing_map.clone();
            for (key, value) in incoming_map {
                overlaid.insert(key.clone(), value.clone());
            }
            Some(Json::Object(overlaid))
        }
        (None, incoming_data) => incoming_data.clone(),
        (existing_data, None) => existing_data.clone(),
        (_, incoming_data) => incoming_data.clone(),
    };

    merged.style = match (&existing.style, &incoming.style) {
        (Some(existing_style), Some(incoming_style)) => {
            let mut overlaid = existing_style.clone();
            overlaid.extend(incoming_style.clone());
            Some(overlaid)
        }
        (None, incoming_style) => incoming_style.clone(),
        (existing_style, None) => existing_style.clone(),
    };

    merged.lamport = existing.lamport.merge_next(incoming.lamport);
    merged.vector_clock = existing.vector_clock.merged_with(&incoming.vector_clock);
    merged.retry_count = 0;
    merged
}

fn last_write_wins<'a>(operations: &[&'a ElementOperation]) -> Option<&'a ElementOperation> {
    operations.iter().copied().max_by(|a, b| {
        causal_order((a.lamport, &a.user_id), (b.lamport, &b.user_id))
    })
}

fn priority_winner<'a>(
    operations: &[&'a ElementOperation],
    priorities: &PriorityTable,
) -> Option<&'a ElementOperation> {
    operations.iter().copied().max_by_key(|op| {
        let priority = op.priority.unwrap_or_else(|| {
            priorities.get(&op.user_id).copied().unwrap_or(0)
        });
        (priority, op.lamport.0)
    })
}

/// Confidence score: higher overlap/closer timing implies the automatic
/// decision is more likely correct (spec §4.6: confidence scales with evidence
/// strength, not resolution correctness).
fn confidence_for(conflict: &ConflictRecord) -> f64 {
    match (&conflict.spatial_overlap, &conflict.temporal_proximity) {
        (Some(overlap), _) => (0.5 + overlap.percentage / 2.0).min(1.0),
        (None, Some(proximity)) if proximity.simultaneous => 0.9,
        (None, Some(_)) => 0.7,
        (None, None) => 0.6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::detect_spatial;
    use crate::operation::test_support::op;
    use crate::operation::{Bounds, OperationKind, Position};

    fn overlapping_pair() -> (ElementOperation, ElementOperation) {
        let mut a = op(1, "alice", OperationKind::Create, "e1");
        a.bounds = Some(Bounds { x: 0.0, y: 0.0, w: 50.0, h: 50.0 });
        a.position = Some(Position { x: 0.0, y: 0.0 });
        a.lamport = crate::clock::Lamport(1);
        let mut b = op(2, "bob", OperationKind::Create, "e2");
        b.bounds = Some(Bounds { x: 10.0, y: 10.0, w: 50.0, h: 50.0 });
        b.position = Some(Position { x: 10.0, y: 10.0 });
        b.lamport = crate::clock::Lamport(2);
        (a, b)
    }

    #[test]
    fn spatial_conflict_resolves_last_write_wins() {
        let (a, b) = overlapping_pair();
        let conflict = detect_spatial(&a, &b).unwrap();
        let priorities = PriorityTable::new();
        let resolution = resolve(
            &conflict,
            &[&a, &b],
            &priorities,
            Instant::now() + Duration::from_millis(500),
            Duration::from_millis(100),
        )
        .unwrap()
        .unwrap();
        assert_eq!(resolution.strategy, ResolutionStrategy::LastWriteWins);
        assert_eq!(resolution.result_operation.map(|op| op.id), Some(b.id)); // higher lamport wins
    }

    #[test]
    fn critical_severity_always_manual() {
        let (a, b) = overlapping_pair();
        let mut conflict = detect_spatial(&a, &b).unwrap();
        conflict.severity = Severity::Critical;
        let priorities = PriorityTable::new();
        let resolution = resolve(
            &conflict,
            &[&a, &b],
            &priorities,
            Instant::now() + Duration::from_millis(500),
            Duration::from_millis(100),
        )
        .unwrap()
        .unwrap();
        assert!(resolution.manual_required);
    }

    #[test]
    fn spatial_high_severity_requires_manual() {
        let (a, b) = overlapping_pair();
        let mut conflict = detect_spatial(&a, &b).unwrap();
        conflict.severity = Severity::High;
        let priorities = PriorityTable::new();
        let resolution = resolve(
            &conflict,
            &[&a, &b],
            &priorities,
            Instant::now() + Duration::from_millis(500),
            Duration::from_millis(100),
        )
        .unwrap()
        .unwrap();
        assert!(resolution.manual_required);
    }

    #[test]
    fn semantic_delete_update_resolves_via_merge() {
        use crate::detector::detect_semantic;

        let a = op(1, "alice", OperationKind::Delete, "e1");
        let b = op(2, "bob", OperationKind::Update, "e1");
        let conflict = detect_semantic(&a, &b).expect("expected semantic conflict");
        assert_eq!(conflict.severity, Severity::High);

        let priorities = PriorityTable::new();
        let resolution = resolve(
            &conflict,
            &[&a, &b],
            &priorities,
            Instant::now() + Duration::from_millis(500),
            Duration::from_millis(100),
        )
        .unwrap()
        .unwrap();
        assert_eq!(resolution.strategy, ResolutionStrategy::Merge);
        assert!(!resolution.manual_required);
        assert!(resolution.confidence >= 0.7);
        assert!(resolution.result_operation.is_some());
    }

    #[test]
    fn merge_overlays_style_and_advances_causal_metadata() {
        let mut existing = op(1, "alice", OperationKind::Style, "e1");
        existing.lamport = crate::clock::Lamport(3);
        existing.vector_clock.increment("alice");
        existing.style = Some(
            [
                ("color".to_string(), serde_json::json!("red")),
                ("stroke".to_string(), serde_json::json!("thin")),
            ]
            .into_iter()
            .collect(),
        );

        let mut incoming = op(2, "bob", OperationKind::Style, "e1");
        incoming.lamport = crate::clock::Lamport(5);
        incoming.vector_clock.increment("bob");
        incoming.style = Some([("color".to_string(), serde_json::json!("blue"))].into_iter().collect());

        let merged = merge_operations(&existing, &incoming);
        let style = merged.style.expect("merged style");
        assert_eq!(style.get("color"), Some(&serde_json::json!("blue"))); // incoming shadows existing
        assert_eq!(style.get("stroke"), Some(&serde_json::json!("thin"))); // untouched key survives
        assert_eq!(merged.lamport, crate::clock::Lamport(6)); // max(3, 5) + 1
        assert_eq!(merged.vector_clock.get("alice"), 1);
        assert_eq!(merged.vector_clock.get("bob"), 1);
    }

    #[test]
    fn near_deadline_skips_resolution() {
        let (a, b) = overlapping_pair();
        let conflict = detect_spatial(&a, &b).unwrap();
        let priorities = PriorityTable::new();
        let resolution = resolve(
            &conflict,
            &[&a, &b],
            &priorities,
            Instant::now(),
            Duration::from_millis(100),
        )
        .unwrap();
        assert!(resolution.is_none());
    }
}

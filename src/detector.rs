//! Conflict detection (C5).
//!
//! Grounded on the teacher's `enterprise::collaboration::conflict_resolver`
//! dispatch-by-`ConflictType` structure, generalized to the spec's six detector
//! families. Every detector here is a pure function: given two operations (plus,
//! for the spatial detector, a pre-narrowed candidate list from the spatial
//! index), it returns zero or one `ConflictRecord`.

use chrono::Utc;

use crate::clock::concurrent;
use crate::conflict::{
    canonical_id, ConflictRecord, ConflictType, SemanticDetails, Severity, SpatialOverlap,
    TemporalProximity,
};
use crate::operation::{ElementOperation, OperationKind};

const SIMULTANEOUS_THRESHOLD_MS: i64 = 100;
const TEMPORAL_WINDOW_MS: i64 = 1_000;

/// Detects bounding-box overlap between two operations on different elements
/// that are spatially close, or two concurrent operations on the same element
/// with spatial data.
pub fn detect_spatial(a: &ElementOperation, b: &ElementOperation) -> Option<ConflictRecord> {
    if a.same_user(b) || !a.has_spatial_data() || !b.has_spatial_data() {
        return None;
    }
    let (a_bounds, b_bounds) = (a.bounds.unwrap(), b.bounds.unwrap());
    if !a_bounds.overlaps(&b_bounds) {
        return None;
    }
    let ratio = a_bounds.overlap_ratio(&b_bounds);
    let severity = severity_from_overlap(ratio);
    Some(base_record(
        a,
        b,
        ConflictType::Spatial,
        severity,
        Some(SpatialOverlap {
            area: a_bounds.intersection_area(&b_bounds),
            percentage: ratio,
        }),
        None,
        None,
    ))
}

fn severity_from_overlap(ratio: f64) -> Severity {
    if ratio > 0.75 {
        Severity::High
    } else if ratio > 0.25 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Detects two operations on the same element landing within the temporal
/// window, escalating to `High` when effectively simultaneous.
pub fn detect_temporal(a: &ElementOperation, b: &ElementOperation) -> Option<ConflictRecord> {
    if a.same_user(b) || a.element_id != b.element_id {
        return None;
    }
    let diff_ms = (a.logical_timestamp - b.logical_timestamp).num_milliseconds().abs();
    if diff_ms > TEMPORAL_WINDOW_MS {
        return None;
    }
    let simultaneous = diff_ms < SIMULTANEOUS_THRESHOLD_MS;
    let severity = if simultaneous { Severity::High } else { Severity::Medium };
    Some(base_record(
        a,
        b,
        ConflictType::Temporal,
        severity,
        None,
        Some(TemporalProximity { diff_ms, simultaneous }),
        None,
    ))
}

/// Detects incompatible operation-kind pairings (delete-vs-anything) or
/// overlapping style keys with differing values on the same element.
pub fn detect_semantic(a: &ElementOperation, b: &ElementOperation) -> Option<ConflictRecord> {
    if a.same_user(b) || a.element_id != b.element_id {
        return None;
    }

    let mut details = SemanticDetails::default();

    if a.kind == OperationKind::Delete || b.kind == OperationKind::Delete {
        let (deleter, other) = if a.kind == OperationKind::Delete { (a, b) } else { (b, a) };
        if other.kind != OperationKind::Delete {
            details
                .incompatible_changes
                .push(format!("delete({}) vs {:?}({})", deleter.user_id, other.kind, other.user_id));
        }
    }

    if let (Some(a_style), Some(b_style)) = (&a.style, &b.style) {
        for (key, a_value) in a_style {
            if let Some(b_value) = b_style.get(key) {
                if a_value != b_value {
                    details
                        .data_conflicts
                        .insert(key.clone(), (a_value.clone(), b_value.clone()));
                }
            }
        }
    }

    if details.incompatible_changes.is_empty() && details.data_conflicts.is_empty() {
        return None;
    }

    let severity = if details.incompatible_changes.is_empty() {
        Severity::Medium
    } else {
        Severity::High
    };

    Some(base_record(a, b, ConflictType::Semantic, severity, None, None, Some(details)))
}

/// Detects an operation whose `depends_on` set references an operation id that
/// has not been observed in `applied_ids` yet (spec: dependency must resolve
/// before the operation may apply).
pub fn detect_dependency(
    operation: &ElementOperation,
    applied_ids: &std::collections::HashSet<crate::operation::OperationId>,
) -> Option<ConflictRecord> {
    let depends_on = operation.depends_on.as_ref()?;
    let missing: Vec<_> = depends_on.iter().filter(|id| !applied_ids.contains(*id)).collect();
    if missing.is_empty() {
        return None;
    }
    Some(ConflictRecord {
        id: canonical_id(operation.id, operation.id, ConflictType::Dependency),
        conflict_type: ConflictType::Dependency,
        severity: Severity::High,
        operations: vec![operation.id],
        affected_elements: vec![operation.element_id.clone()],
        spatial_overlap: None,
        temporal_proximity: None,
        semantic_details: None,
        chosen_strategy: None,
        detected_at: Utc::now(),
        resolved_at: None,
        resolution: None,
    })
}

/// Detects two concurrent (neither happens-before the other) operations on the
/// same element that would otherwise apply in an ambiguous order.
pub fn detect_ordering(a: &ElementOperation, b: &ElementOperation) -> Option<ConflictRecord> {
    if a.same_user(b) || a.element_id != b.element_id {
        return None;
    }
    if !concurrent(&a.vector_clock, &b.vector_clock) {
        return None;
    }
    Some(base_record(a, b, ConflictType::Ordering, Severity::Low, None, None, None))
}

/// Detects a conflict surfaced while applying a compound operation's
/// sub-operations: any pairwise conflict among `parent_operations` escalates to
/// `Compound` severity-critical since a partially-applied compound would leave
/// the element inconsistent.
pub fn detect_compound(a: &ElementOperation, b: &ElementOperation) -> Option<ConflictRecord> {
    if a.kind != OperationKind::Compound && b.kind != OperationKind::Compound {
        return None;
    }
    if a.element_id != b.element_id || a.same_user(b) {
        return None;
    }
    Some(base_record(a, b, ConflictType::Compound, Severity::Critical, None, None, None))
}

fn base_record(
    a: &ElementOperation,
    b: &ElementOperation,
    conflict_type: ConflictType,
    severity: Severity,
    spatial_overlap: Option<SpatialOverlap>,
    temporal_proximity: Option<TemporalProximity>,
    semantic_details: Option<SemanticDetails>,
) -> ConflictRecord {
    ConflictRecord {
        id: canonical_id(a.id, b.id, conflict_type),
        conflict_type,
        severity,
        operations: vec![a.id, b.id],
        affected_elements: {
            let mut elements = vec![a.element_id.clone()];
            if b.element_id != a.element_id {
                elements.push(b.element_id.clone());
            }
            elements
        },
        spatial_overlap,
        temporal_proximity,
        semantic_details,
        chosen_strategy: None,
        detected_at: Utc::now(),
        resolved_at: None,
        resolution: None,
    }
}

/// Run every pairwise detector against a candidate pair, returning every
/// conflict family that fires (a single pair can be both spatial and temporal,
/// for instance).
pub fn detect_all(a: &ElementOperation, b: &ElementOperation) -> Vec<ConflictRecord> {
    [
        detect_spatial(a, b),
        detect_temporal(a, b),
        detect_semantic(a, b),
        detect_ordering(a, b),
        detect_compound(a, b),
    ]
    .into_iter()
    .flatten()
    .collect()
}

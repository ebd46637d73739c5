//! Conflict records (C5/C6 shared vocabulary).
//!
//! Grounded on the teacher's `enterprise::collaboration::conflict_resolver::{
//! Conflict, ConflictType, ConflictSeverity, ConflictResolution, ResolutionStrategy}`,
//! adapted to the spec's six-way conflict taxonomy and terminal/active lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::operation::{ElementId, ElementOperation, OperationId};

/// Conflict identifier.
pub type ConflictId = Uuid;

/// The family of conflict a detector reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Overlapping bounding boxes.
    Spatial,
    /// Operations landing within a small time window.
    Temporal,
    /// Incompatible kind pairing or overlapping style keys with differing values.
    Semantic,
    /// A dependency chain reference not yet applied in program order.
    Ordering,
    /// A `depends_on` reference whose clock is not yet `<=` the canvas clock.
    Dependency,
    /// A conflict detected at a compound operation's boundary.
    Compound,
}

/// How urgently a conflict needs resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Lowest urgency.
    Low,
    /// Default urgency.
    Medium,
    /// Requires prompt resolution.
    High,
    /// Requires manual intervention regardless of strategy defaults.
    Critical,
}

/// Area/percentage summary produced by the spatial detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialOverlap {
    /// Raw intersection area.
    pub area: f64,
    /// Intersection-over-union ratio in `[0, 1]`.
    pub percentage: f64,
}

/// Timing summary produced by the temporal detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalProximity {
    /// Absolute time difference between the two operations, in milliseconds.
    pub diff_ms: i64,
    /// Whether the two operations were effectively simultaneous (`< 100ms`).
    pub simultaneous: bool,
}

/// Detail summary produced by the semantic detector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticDetails {
    /// Human-readable incompatible-change descriptions (e.g. `"delete-update"`).
    pub incompatible_changes: Vec<String>,
    /// Style (or data) keys both operations touched with differing values.
    pub data_conflicts: std::collections::HashMap<String, (serde_json::Value, serde_json::Value)>,
}

/// The resolution record attached to a conflict once a strategy has run
/// (successfully or not).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolutionRecord {
    /// Which resolution strategy produced this record.
    pub strategy: ResolutionStrategy,
    /// The operation the strategy selected as the outcome: one of the
    /// conflicting operands for `LastWriteWins`/`PriorityUser`, or a freshly
    /// constructed merge for `Merge`. `None` when `manual_required`.
    pub result_operation: Option<ElementOperation>,
    /// Set when the strategy could not resolve automatically.
    pub manual_required: bool,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Strategies the resolution engine (C6) can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// Pick the operation with the latest `(lamport, timestamp, user_id)`.
    LastWriteWins,
    /// Pick by a configured per-user priority table.
    PriorityUser,
    /// Overlay field-disjoint edits into one new operation.
    Merge,
    /// Dispatches to one of the above based on conflict type/severity.
    Automatic,
    /// No automatic result; surfaced to the UI.
    Manual,
}

/// A detected incompatibility between two (or more) operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Conflict identifier, deterministic given the ordered operation-id pair
    /// and conflict type (see [`canonical_id`]).
    pub id: ConflictId,
    /// The conflict family.
    pub conflict_type: ConflictType,
    /// Urgency.
    pub severity: Severity,
    /// The operations involved, in detection order.
    pub operations: Vec<OperationId>,
    /// Element ids affected.
    pub affected_elements: Vec<ElementId>,
    /// Present for `Spatial` conflicts.
    pub spatial_overlap: Option<SpatialOverlap>,
    /// Present for `Temporal` conflicts.
    pub temporal_proximity: Option<TemporalProximity>,
    /// Present for `Semantic` conflicts.
    pub semantic_details: Option<SemanticDetails>,
    /// The strategy chosen for this conflict (set once detection selects one).
    pub chosen_strategy: Option<ResolutionStrategy>,
    /// When this conflict was first detected.
    pub detected_at: DateTime<Utc>,
    /// When this conflict became terminal, if it has.
    pub resolved_at: Option<DateTime<Utc>>,
    /// The outcome, once resolved.
    pub resolution: Option<ConflictResolutionRecord>,
}

impl ConflictRecord {
    /// A conflict is terminal exactly when `resolved_at` is set; terminal
    /// conflicts are immutable history (spec §3 invariant).
    pub fn is_terminal(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Mark this conflict resolved, enforcing the "exactly once" invariant by
    /// refusing to overwrite an already-terminal record.
    pub fn resolve(&mut self, resolution: ConflictResolutionRecord) -> Result<(), crate::error::Error> {
        if self.is_terminal() {
            return Err(crate::error::Error::Unknown(
                "conflict already terminal".to_string(),
            ));
        }
        self.chosen_strategy = Some(resolution.strategy);
        self.resolved_at = Some(Utc::now());
        self.resolution = Some(resolution);
        Ok(())
    }
}

/// Deterministic conflict id derived from the ordered pair of operation ids
/// plus the conflict type, so the same pair detected by the same detector
/// twice dedupes to one record (spec §4.5).
pub fn canonical_id(a: OperationId, b: OperationId, conflict_type: ConflictType) -> ConflictId {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let namespace = Uuid::NAMESPACE_OID;
    let name = format!("{lo}:{hi}:{conflict_type:?}");
    Uuid::new_v5(&namespace, name.as_bytes())
}

/// Ordering used when emitting the conflict list: descending severity, then
/// ascending `detected_at` (spec §4.5).
pub fn emission_order(records: &mut [ConflictRecord]) {
    records.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.detected_at.cmp(&b.detected_at))
    });
}

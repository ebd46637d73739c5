//! Top-level coordinator: the public façade over C1–C12 (§6 external interfaces).
//!
//! Grounded on the teacher's `enterprise::collaboration::sync_engine::SyncEngine`
//! as the single owning struct a caller talks to, generalized from one sync
//! session to one whiteboard partition's full coordination state. One
//! `Whiteboard` owns its spatial index, caches, validator, transform clocks,
//! transaction manager, and selection store; partitioning across whiteboards
//! is the caller's concern (spec §5: one task per partition).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::cache::BoundedCache;
use crate::clock::{Lamport, VectorClock};
use crate::conflict::{emission_order, ConflictRecord};
use crate::config::EngineConfig;
use crate::detector::{detect_all, detect_dependency};
use crate::error::Error;
use crate::housekeeper::{self, PerformanceMetrics};
use crate::operation::{ElementId, ElementOperation, OperationId};
use crate::queue::{BoundedQueue, InFlightGuard, PressureSignal};
use crate::resolver::{self, PriorityTable};
use crate::selection::{SelectionConflict, SelectionHighlight, SelectionResolutionStrategy};
use crate::selection_resolver;
use crate::selection_store::SelectionStore;
use crate::spatial::SpatialIndex;
use crate::transaction::{TransactionId, TransactionManager};
use crate::transform::{transform, TransformContext};

/// One submitted selection replacement, as it travels through the selection
/// queue: the user and their new element set.
type SelectionSubmission = (String, Vec<ElementId>);

/// An outbound event the engine produces for the transport layer to fan out.
/// The core never sends these anywhere itself (spec non-goal: no transport).
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// An operation was applied and should be broadcast.
    OperationApplied(ElementOperation),
    /// New conflicts were detected.
    ConflictsDetected(Vec<ConflictRecord>),
    /// The current highlight set changed.
    HighlightsChanged(Vec<SelectionHighlight>),
}

/// The full coordination state for one whiteboard, owned by a single logical
/// writer (spec §5: one task per partition).
pub struct Whiteboard {
    config: Arc<EngineConfig>,
    spatial_index: SpatialIndex,
    transform_cache: BoundedCache<(OperationId, OperationId), ElementOperation>,
    canvas_clock: VectorClock,
    canvas_lamport: Lamport,
    applied_ids: HashSet<OperationId>,
    pending: Vec<ElementOperation>,
    conflicts: Vec<ConflictRecord>,
    transactions: TransactionManager,
    selections: SelectionStore,
    selection_conflicts: std::collections::HashMap<ElementId, SelectionConflict>,
    selection_claimed_at: std::collections::HashMap<crate::clock::UserId, chrono::DateTime<Utc>>,
    priorities: PriorityTable,
    selection_priorities: selection_resolver::SelectionPriorityTable,
    element_queue: BoundedQueue<ElementOperation>,
    element_receiver: tokio::sync::mpsc::Receiver<ElementOperation>,
    element_in_flight: InFlightGuard,
    selection_queue: BoundedQueue<SelectionSubmission>,
    selection_receiver: tokio::sync::mpsc::Receiver<SelectionSubmission>,
    selection_in_flight: InFlightGuard,
}

impl Whiteboard {
    /// Construct a fresh whiteboard under `config`.
    pub fn new(config: Arc<EngineConfig>) -> Self {
        let spatial_capacity = config.spatial_index_capacity;
        let transform_capacity = config.transform_cache_capacity;

        let mut element_queue = BoundedQueue::new(config.max_element_queue_depth);
        let element_receiver = element_queue
            .take_receiver()
            .expect("element queue receiver taken exactly once at construction");
        let mut selection_queue = BoundedQueue::new(config.max_selection_queue_depth);
        let selection_receiver = selection_queue
            .take_receiver()
            .expect("selection queue receiver taken exactly once at construction");

        Self {
            spatial_index: SpatialIndex::new(spatial_capacity),
            transform_cache: BoundedCache::new(transform_capacity),
            canvas_clock: VectorClock::new(),
            canvas_lamport: Lamport::zero(),
            applied_ids: HashSet::new(),
            pending: Vec::new(),
            conflicts: Vec::new(),
            transactions: TransactionManager::new(),
            selections: SelectionStore::new(),
            selection_conflicts: std::collections::HashMap::new(),
            selection_claimed_at: std::collections::HashMap::new(),
            priorities: PriorityTable::new(),
            selection_priorities: selection_resolver::SelectionPriorityTable::new(),
            element_queue,
            element_receiver,
            element_in_flight: InFlightGuard::new(config.max_in_flight_element_ops),
            selection_queue,
            selection_receiver,
            selection_in_flight: InFlightGuard::new(config.max_in_flight_selection_ops),
            config,
        }
    }

    /// Drop up to 25% of the lowest-priority still-pending operations when the
    /// element queue is under CRITICAL pressure (spec §5), so an overloaded
    /// partition's backlog doesn't grow without bound. Operations with no
    /// explicit `priority` are treated as priority 0 — first to be shed.
    fn shed_backlog_if_critical(&mut self) {
        if self.element_queue.pressure() != PressureSignal::Critical {
            return;
        }
        let shed_count = ((self.pending.len() as f64) * 0.25).ceil() as usize;
        if shed_count == 0 {
            return;
        }
        self.pending.sort_by_key(|op| op.priority.unwrap_or(0));
        let shed_count = shed_count.min(self.pending.len());
        for op in self.pending.drain(0..shed_count) {
            warn!(
                operation_id = %op.id,
                element_id = %op.element_id,
                "shed from backlog under critical queue pressure"
            );
        }
    }

    /// Submit an element operation: validate, detect conflicts against the
    /// currently-pending set, transform, and apply. Returns the applied
    /// operation plus any newly detected conflicts, in emission order.
    ///
    /// Enforces §5's backpressure model: the submission passes through the
    /// whiteboard's bounded element queue and in-flight guard before any work
    /// happens, and a CRITICAL backlog sheds its lowest-priority pending
    /// operations first.
    pub fn submit_operation(
        &mut self,
        validator: &crate::validator::Validator,
        operation: ElementOperation,
    ) -> Result<(ElementOperation, Vec<ConflictRecord>), Error> {
        self.element_in_flight.try_acquire()?;
        let result = self.submit_operation_inner(validator, operation);
        self.element_in_flight.release();
        result
    }

    fn submit_operation_inner(
        &mut self,
        validator: &crate::validator::Validator,
        operation: ElementOperation,
    ) -> Result<(ElementOperation, Vec<ConflictRecord>), Error> {
        self.shed_backlog_if_critical();
        self.element_queue.try_enqueue(operation)?;
        let operation = self
            .element_receiver
            .try_recv()
            .map_err(|_| Error::QueueBackpressure)?;

        validator.validate(&operation)?;

        if let Some(conflict) = detect_dependency(&operation, &self.applied_ids) {
            self.conflicts.push(conflict.clone());
            return Err(Error::ConflictManualRequired { conflict_id: conflict.id });
        }

        let concurrent_pending: Vec<&ElementOperation> = self
            .pending
            .iter()
            .filter(|p| p.element_id == operation.element_id)
            .collect();

        let mut new_conflicts = Vec::new();
        for pending_op in &concurrent_pending {
            new_conflicts.extend(detect_all(&operation, pending_op));
        }

        let deadline = Instant::now() + self.config.resolution_budget();
        let skip_before = Duration::from_millis(self.config.resolution_skip_before_budget_ms);

        // The resolver's outcome, if any, names the operation that should
        // actually be applied: the incoming submission itself, a still-pending
        // operand it lost to, or (for `Merge`) a freshly constructed operation.
        let mut winner = operation.clone();
        let mut incoming_superseded = false;

        for conflict in &mut new_conflicts {
            let operands: Vec<&ElementOperation> = conflict
                .operations
                .iter()
                .filter_map(|id| {
                    concurrent_pending
                        .iter()
                        .copied()
                        .chain(std::iter::once(&operation))
                        .find(|op| &op.id == id)
                })
                .collect();

            match resolver::resolve(conflict, &operands, &self.priorities, deadline, skip_before) {
                Ok(Some(resolution)) => {
                    if let Some(result_op) = &resolution.result_operation {
                        if result_op.id != operation.id {
                            incoming_superseded = true;
                            winner = result_op.clone();
                        }
                    }
                    if let Err(err) = conflict.resolve(resolution) {
                        warn!(conflict_id = %conflict.id, error = %err, "failed to record conflict resolution");
                    }
                }
                Ok(None) => {
                    warn!(conflict_id = %conflict.id, "resolution skipped, budget nearly exhausted");
                }
                Err(err) => {
                    warn!(conflict_id = %conflict.id, error = %err, "resolution attempt failed");
                }
            }
        }

        self.conflicts.extend(new_conflicts.clone());
        emission_order(&mut new_conflicts);

        if incoming_superseded && concurrent_pending.iter().any(|p| p.id == winner.id) {
            // The incoming operation lost outright to a still-pending operand
            // (e.g. a delete beating a later style edit): nothing new applies,
            // the pending operation stands as already emitted.
            return Ok((winner, new_conflicts));
        }

        let mut ctx = TransformContext {
            spatial_index: &self.spatial_index,
            cache: &self.transform_cache,
            canvas_clock: &mut self.canvas_clock,
            canvas_lamport: &mut self.canvas_lamport,
        };
        let applied = transform(&winner, &concurrent_pending, &mut ctx);

        self.applied_ids.insert(applied.id);
        self.pending.retain(|p| p.element_id != applied.element_id);
        self.pending.push(applied.clone());

        Ok((applied, new_conflicts))
    }

    /// Submit (replace) a user's current selection. Enforces §5's selection
    /// queue/in-flight caps the same way [`Whiteboard::submit_operation`] does
    /// for element operations.
    pub fn submit_selection(
        &mut self,
        user_id: &str,
        element_ids: Vec<ElementId>,
    ) -> Result<(), Error> {
        self.selection_in_flight.try_acquire()?;
        let result = self.submit_selection_inner(user_id, element_ids);
        self.selection_in_flight.release();
        result
    }

    fn submit_selection_inner(&mut self, user_id: &str, element_ids: Vec<ElementId>) -> Result<(), Error> {
        self.selection_queue.try_enqueue((user_id.to_string(), element_ids))?;
        let (user_id, element_ids) = self
            .selection_receiver
            .try_recv()
            .map_err(|_| Error::QueueBackpressure)?;
        self.selections.update_selection(&self.config, &user_id, element_ids)
    }

    /// Clear a user's selection.
    pub fn clear_selection(&mut self, user_id: &str) {
        self.selections.clear_selection(&user_id.to_string());
    }

    /// Attempt to claim exclusive ownership of `element_id` for `user_id`. If
    /// another user already holds (or is concurrently claiming) the element,
    /// records a selection conflict and immediately attempts automatic
    /// resolution via the default strategy (C10) rather than blocking the
    /// claim outright.
    pub fn claim_ownership(&mut self, element_id: &str, user_id: &str) {
        let now = Utc::now();
        let element_id = element_id.to_string();
        let user_id = user_id.to_string();
        self.selection_claimed_at.insert(user_id.clone(), now);

        if let Some(existing_owner) = self.selections.owner(&element_id, now) {
            if existing_owner != &user_id {
                let existing = self.selection_conflicts.remove(&element_id);
                let mut conflict = selection_resolver::detect_or_extend(
                    existing,
                    &element_id,
                    &user_id,
                    self.default_selection_strategy(),
                    now,
                );
                selection_resolver::resolve(
                    &mut conflict,
                    &self.selection_priorities,
                    &self.selection_claimed_at,
                    Some(existing_owner),
                    now,
                );
                if let Some(winner) = &conflict.resolved_owner {
                    self.selections.claim_ownership(&self.config, &element_id, winner, now);
                }
                self.selection_conflicts.insert(element_id, conflict);
                return;
            }
        }
        self.selections.claim_ownership(&self.config, &element_id, &user_id, now);
    }

    /// Force-resolve any selection conflict that has timed out or accumulated
    /// too many contenders, run as part of housekeeping (C10's
    /// anti-starvation rules).
    fn sweep_selection_conflicts(&mut self) {
        let now = Utc::now();
        let (timeout, max_contenders) = selection_resolver::sweep_params(&self.config);
        for conflict in self.selection_conflicts.values_mut() {
            selection_resolver::force_resolve_if_overflowing(
                conflict,
                &self.selection_claimed_at,
                max_contenders,
                now,
            );
            selection_resolver::auto_resolve_if_timed_out(conflict, &self.selection_claimed_at, timeout, now);
            if let Some(winner) = &conflict.resolved_owner {
                self.selections.claim_ownership(&self.config, &conflict.element_id, winner, now);
            }
        }
        self.selection_conflicts.retain(|_, c| !c.is_resolved());
    }

    /// Currently unresolved selection conflicts.
    pub fn pending_selection_conflicts(&self) -> Vec<SelectionConflict> {
        self.selection_conflicts.values().cloned().collect()
    }

    /// Manually resolve a conflict the automatic resolver left pending (spec:
    /// `resolve_conflict` external verb).
    pub fn resolve_conflict(
        &mut self,
        conflict_id: Uuid,
        resolution: crate::conflict::ConflictResolutionRecord,
    ) -> Result<(), Error> {
        let conflict = self
            .conflicts
            .iter_mut()
            .find(|c| c.id == conflict_id)
            .ok_or_else(|| Error::TransactionInvalid {
                reason: "unknown conflict".to_string(),
            })?;
        conflict.resolve(resolution)
    }

    /// Begin a transaction for `user_id`.
    pub fn begin_transaction(&mut self, user_id: &str) -> TransactionId {
        self.transactions.begin(user_id.to_string())
    }

    /// Append an already-validated operation to an open transaction.
    pub fn append_transaction(&mut self, id: TransactionId, operation: &ElementOperation) -> Result<(), Error> {
        self.transactions.append(id, operation)
    }

    /// Commit a transaction, returning the operation ids that were part of it.
    pub fn commit_transaction(&mut self, id: TransactionId) -> Result<Vec<OperationId>, Error> {
        self.transactions.commit(id)
    }

    /// Roll back a transaction.
    pub fn rollback_transaction(&mut self, id: TransactionId) -> Result<(), Error> {
        self.transactions.rollback(id)
    }

    /// Run one housekeeping sweep (transaction aging, selection/ownership
    /// expiry, validator cleanup), returning the resulting metrics snapshot.
    pub fn run_housekeeping(&mut self, validator: &crate::validator::Validator) -> PerformanceMetrics {
        self.sweep_selection_conflicts();
        housekeeper::sweep(&self.config, &mut self.transactions, &mut self.selections, validator)
    }

    /// Project the current highlight set for the given active users.
    pub fn highlights(&self, users: &[String]) -> Vec<SelectionHighlight> {
        crate::highlight::project(&self.selections, users, Utc::now())
    }

    /// Current unresolved conflicts, in emission order.
    pub fn pending_conflicts(&self) -> Vec<ConflictRecord> {
        let mut pending: Vec<_> = self.conflicts.iter().filter(|c| !c.is_terminal()).cloned().collect();
        emission_order(&mut pending);
        pending
    }

    /// Default selection-contest strategy new conflicts are created with.
    pub fn default_selection_strategy(&self) -> SelectionResolutionStrategy {
        SelectionResolutionStrategy::Ownership
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::test_support::op;
    use crate::operation::{Bounds, OperationKind, Position};
    use crate::validator::Validator;

    #[test]
    fn submit_operation_indexes_and_advances_clock() {
        let config = Arc::new(EngineConfig::default());
        let mut board = Whiteboard::new(config.clone());
        let validator = Validator::new(config);

        let mut operation = op(1, "alice", OperationKind::Create, "e1");
        operation.bounds = Some(Bounds { x: 0.0, y: 0.0, w: 10.0, h: 10.0 });
        operation.position = Some(Position { x: 0.0, y: 0.0 });

        let (applied, conflicts) = board.submit_operation(&validator, operation).unwrap();
        assert!(conflicts.is_empty());
        assert_eq!(applied.lamport.0, 1);
    }

    #[test]
    fn concurrent_overlapping_creates_produce_conflict() {
        let config = Arc::new(EngineConfig::default());
        let mut board = Whiteboard::new(config.clone());
        let validator = Validator::new(config);

        let mut a = op(1, "alice", OperationKind::Create, "e1");
        a.bounds = Some(Bounds { x: 0.0, y: 0.0, w: 50.0, h: 50.0 });
        a.position = Some(Position { x: 0.0, y: 0.0 });
        board.submit_operation(&validator, a).unwrap();

        let mut b = op(2, "bob", OperationKind::Update, "e1");
        b.style = Some([("color".to_string(), serde_json::json!("red"))].into_iter().collect());
        let (_, conflicts) = board.submit_operation(&validator, b).unwrap();
        assert!(!conflicts.is_empty());
    }

    #[test]
    fn transaction_round_trip() {
        let config = Arc::new(EngineConfig::default());
        let mut board = Whiteboard::new(config);
        let tx = board.begin_transaction("alice");
        let operation = op(1, "alice", OperationKind::Move, "e1");
        board.append_transaction(tx, &operation).unwrap();
        let committed = board.commit_transaction(tx).unwrap();
        assert_eq!(committed, vec![operation.id]);
    }
}

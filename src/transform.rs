//! Operational transform core (C7).
//!
//! Grounded on the teacher's `enterprise::collaboration::operations` envelope
//! handling (`Operation::Batch` flattening) combined with `crdt`'s
//! merge-on-apply discipline: rather than rewriting field values against each
//! concurrent pending operation (classical OT), this engine merges causal
//! metadata and defers field conflicts to the detector/resolver pair (C5/C6) —
//! the same division of labor the teacher's sync engine uses between
//! `Operation` application and `ConflictResolver`.

use std::time::Instant;

use serde_json::Value as Json;
use tracing::debug;
use uuid::Uuid;

use crate::cache::BoundedCache;
use crate::clock::{Lamport, VectorClock};
use crate::operation::{ElementOperation, OperationId, OperationKind};
use crate::spatial::SpatialIndex;

/// Context threaded through every transform call: the structures a single
/// whiteboard partition owns.
pub struct TransformContext<'a> {
    /// Spatial index for the whiteboard this operation targets.
    pub spatial_index: &'a SpatialIndex,
    /// Transform-result cache, keyed by `(incoming_id, against_id)`.
    pub cache: &'a BoundedCache<(OperationId, OperationId), ElementOperation>,
    /// The partition's current vector clock, merged into every processed operation.
    pub canvas_clock: &'a mut VectorClock,
    /// The partition's current Lamport clock.
    pub canvas_lamport: &'a mut Lamport,
}

/// Transform `incoming` against the set of operations still pending
/// application (`concurrent_pending`), producing the operation to actually
/// apply. Field-level conflicts are left untouched here — the detector/resolver
/// pair is the only place that adjudicates which field value wins; this
/// function's job is purely to advance causal metadata and, for atomic
/// operations, push the result into the spatial index (spec §4.7).
pub fn transform(
    incoming: &ElementOperation,
    concurrent_pending: &[&ElementOperation],
    ctx: &mut TransformContext,
) -> ElementOperation {
    let start = Instant::now();

    let mut result = match incoming.kind {
        OperationKind::Compound => transform_compound(incoming, concurrent_pending, ctx),
        OperationKind::Batch => transform_batch(incoming, concurrent_pending, ctx),
        _ => transform_atomic(incoming, concurrent_pending, ctx),
    };

    ctx.canvas_lamport.0 = ctx.canvas_lamport.merge_next(result.lamport).0;
    result.lamport = *ctx.canvas_lamport;
    ctx.canvas_clock.merge(&result.vector_clock);
    ctx.canvas_clock.increment(&result.user_id);
    result.vector_clock = ctx.canvas_clock.clone();

    let elapsed_ms = start.elapsed().as_millis() as u64;
    result.metadata.processing_time_ms = Some(elapsed_ms);
    debug!(
        operation_id = %result.id,
        element_id = %result.element_id,
        kind = ?result.kind,
        elapsed_ms,
        "transformed operation"
    );

    result
}

fn transform_atomic(
    incoming: &ElementOperation,
    concurrent_pending: &[&ElementOperation],
    ctx: &mut TransformContext,
) -> ElementOperation {
    if let Some(cached) = concurrent_pending
        .first()
        .and_then(|against| ctx.cache.get(&(incoming.id, against.id)))
    {
        return cached;
    }

    let mut result = incoming.clone();

    if result.kind == OperationKind::Delete {
        ctx.spatial_index.remove(&result.element_id);
    } else if let Some(bounds) = result.bounds {
        ctx.spatial_index.upsert(&result.element_id, bounds);
    }

    if let Some(against) = concurrent_pending.first() {
        ctx.cache.put((incoming.id, against.id), result.clone());
    }

    result.retry_count = incoming.retry_count;
    result
}

/// Decompose a compound envelope into one atomic sub-operation per populated
/// field (`position` → move, `bounds` → resize, `rotation` → rotate), transform
/// each independently against the same concurrent set, then recompose the
/// envelope's own fields from the transformed sub-operations (spec §4.7:
/// decompose → transform each → recompose). `parent_operations` records the
/// synthesized sub-operation ids so later inspection can see what the compound
/// expanded to.
fn transform_compound(
    incoming: &ElementOperation,
    concurrent_pending: &[&ElementOperation],
    ctx: &mut TransformContext,
) -> ElementOperation {
    let mut result = incoming.clone();
    let mut sub_ids = Vec::new();

    if incoming.position.is_some() {
        let sub = sub_operation(incoming, OperationKind::Move);
        let transformed = transform_atomic(&sub, concurrent_pending, ctx);
        result.position = transformed.position;
        sub_ids.push(transformed.id);
    }

    if incoming.bounds.is_some() {
        let sub = sub_operation(incoming, OperationKind::Resize);
        let transformed = transform_atomic(&sub, concurrent_pending, ctx);
        result.bounds = transformed.bounds;
        sub_ids.push(transformed.id);
    }

    if incoming.rotation.is_some() {
        let sub = sub_operation(incoming, OperationKind::Rotate);
        let transformed = transform_atomic(&sub, concurrent_pending, ctx);
        result.rotation = transformed.rotation;
        sub_ids.push(transformed.id);
    }

    if sub_ids.is_empty() {
        // No decomposable fields: the envelope carries no spatial sub-op, but
        // still needs its own causal metadata advanced like any atomic op.
        result = transform_atomic(incoming, concurrent_pending, ctx);
    }

    result.kind = OperationKind::Compound;
    result.parent_operations = Some(sub_ids);
    result
}

fn sub_operation(incoming: &ElementOperation, kind: OperationKind) -> ElementOperation {
    let mut sub = incoming.clone();
    sub.id = Uuid::new_v4();
    sub.kind = kind;
    sub
}

/// Decompose a batch envelope's `data.operations` array into independent
/// sub-operations (each targeting a field subset of the same payload shape),
/// transform each one independently against the shared concurrent set, and
/// recompose the transformed field values back into the array in their
/// original order (spec §4.7: batch sub-operations are independent but order
/// is preserved). An envelope with no `data.operations` array is treated as a
/// single-element batch of itself.
fn transform_batch(
    incoming: &ElementOperation,
    concurrent_pending: &[&ElementOperation],
    ctx: &mut TransformContext,
) -> ElementOperation {
    let mut result = incoming.clone();
    result.kind = OperationKind::Batch;

    let items = match incoming
        .data
        .as_ref()
        .and_then(|data| data.get("operations"))
        .and_then(|ops| ops.as_array())
    {
        Some(items) if !items.is_empty() => items.clone(),
        _ => {
            let transformed = transform_atomic(incoming, concurrent_pending, ctx);
            result.position = transformed.position;
            result.bounds = transformed.bounds;
            result.rotation = transformed.rotation;
            result.parent_operations = Some(vec![transformed.id]);
            return result;
        }
    };

    let mut transformed_items = Vec::with_capacity(items.len());
    let mut sub_ids = Vec::with_capacity(items.len());

    for item in &items {
        let mut sub = incoming.clone();
        sub.id = Uuid::new_v4();
        sub.kind = OperationKind::Update;
        sub.position = item
            .get("position")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .or(incoming.position);
        sub.bounds = item
            .get("bounds")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .or(incoming.bounds);

        let transformed = transform_atomic(&sub, concurrent_pending, ctx);
        sub_ids.push(transformed.id);

        let mut transformed_item = item.clone();
        if let (Json::Object(map), Some(position)) = (&mut transformed_item, transformed.position) {
            map.insert("position".to_string(), serde_json::json!({ "x": position.x, "y": position.y }));
        }
        if let (Json::Object(map), Some(bounds)) = (&mut transformed_item, transformed.bounds) {
            map.insert(
                "bounds".to_string(),
                serde_json::json!({ "x": bounds.x, "y": bounds.y, "w": bounds.w, "h": bounds.h }),
            );
        }
        transformed_items.push(transformed_item);
    }

    result.data = Some(serde_json::json!({ "operations": transformed_items }));
    result.parent_operations = Some(sub_ids);
    result
}

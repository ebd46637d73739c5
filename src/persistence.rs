//! Persistence contract (§6).
//!
//! Grounded on the teacher's `enterprise::collaboration::session::SessionStorage`
//! trait: the collaboration module calls out to a storage collaborator it never
//! implements. This crate does the same — `PersistenceSink` is the seam a host
//! application wires a real store into; no implementation lives here (persistent
//! storage is an explicit non-goal).

use async_trait::async_trait;

use crate::error::Error;
use crate::operation::ElementOperation;
use crate::selection::SelectionState;

/// What the engine knows about a whiteboard at load time, handed back by
/// [`PersistenceSink::load_whiteboard_snapshot`].
#[derive(Debug, Clone, Default)]
pub struct WhiteboardSnapshot {
    /// Operations already applied, in apply order.
    pub operations: Vec<ElementOperation>,
    /// Selections active at snapshot time.
    pub selections: Vec<SelectionState>,
}

/// A selection lifecycle event, for the sink's audit trail.
#[derive(Debug, Clone)]
pub enum SelectionEvent {
    /// A user's selection changed.
    Updated(SelectionState),
    /// A user's selection was cleared.
    Cleared {
        /// The whiteboard this event occurred on.
        whiteboard_id: String,
        /// The user whose selection was cleared.
        user_id: String,
    },
}

/// The storage seam this crate calls but never implements. A host application
/// provides a concrete sink (database, log, or no-op) at construction time.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Load the last known state of `whiteboard_id`, or an empty snapshot for a
    /// whiteboard never seen before.
    async fn load_whiteboard_snapshot(&self, whiteboard_id: &str) -> Result<WhiteboardSnapshot, Error>;

    /// Persist one applied operation.
    async fn persist_operation(&self, whiteboard_id: &str, operation: &ElementOperation) -> Result<(), Error>;

    /// Persist one selection lifecycle event.
    async fn persist_selection_event(&self, whiteboard_id: &str, event: &SelectionEvent) -> Result<(), Error>;
}

/// A sink that discards everything, useful for tests and for hosts that have
/// not wired in real storage yet.
pub struct NullSink;

#[async_trait]
impl PersistenceSink for NullSink {
    async fn load_whiteboard_snapshot(&self, _whiteboard_id: &str) -> Result<WhiteboardSnapshot, Error> {
        Ok(WhiteboardSnapshot::default())
    }

    async fn persist_operation(&self, _whiteboard_id: &str, _operation: &ElementOperation) -> Result<(), Error> {
        Ok(())
    }

    async fn persist_selection_event(&self, _whiteboard_id: &str, _event: &SelectionEvent) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_sink_round_trips_without_error() {
        let sink = NullSink;
        let snapshot = sink.load_whiteboard_snapshot("board-1").await.unwrap();
        assert!(snapshot.operations.is_empty());
    }
}

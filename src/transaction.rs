//! Transaction lifecycle (C8).
//!
//! Grounded on the teacher's `enterprise::collaboration::sync_engine` commit
//! bookkeeping (pending operations accumulate under a session id until a sync
//! point) generalized into an explicit begin/append/commit/rollback state
//! machine, plus the spec's own aged-transaction force-rollback rule.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::UserId;
use crate::error::Error;
use crate::operation::{ElementOperation, OperationId};

/// Transaction identifier.
pub type TransactionId = Uuid;

/// Lifecycle state of a transaction. Once `Committed` or `RolledBack` a
/// transaction is terminal and immutable (spec §3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    /// Accepting appended operations.
    Pending,
    /// Applied to the document atomically.
    Committed,
    /// Discarded without effect.
    RolledBack,
}

/// A group of operations that commit or roll back together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction id.
    pub id: TransactionId,
    /// The user that opened this transaction.
    pub user_id: UserId,
    /// Operation ids appended so far, in append order.
    pub operation_ids: Vec<OperationId>,
    /// Current lifecycle state.
    pub state: TransactionState,
    /// When this transaction was opened.
    pub opened_at: DateTime<Utc>,
    /// When this transaction reached a terminal state, if it has.
    pub closed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    fn new(id: TransactionId, user_id: UserId) -> Self {
        Self {
            id,
            user_id,
            operation_ids: Vec::new(),
            state: TransactionState::Pending,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    /// Whether this transaction has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state != TransactionState::Pending
    }

    /// Age of this transaction relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> ChronoDuration {
        now - self.opened_at
    }
}

/// Tracks open transactions for one whiteboard partition and enforces the
/// begin/append/commit/rollback state machine plus aged-transaction
/// force-rollback (spec: transactions open longer than the configured max age
/// are force-rolled-back by the housekeeper).
#[derive(Debug, Default)]
pub struct TransactionManager {
    open: std::collections::HashMap<TransactionId, Transaction>,
}

impl TransactionManager {
    /// A fresh manager with no open transactions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new transaction for `user_id`.
    pub fn begin(&mut self, user_id: UserId) -> TransactionId {
        let id = Uuid::new_v4();
        self.open.insert(id, Transaction::new(id, user_id));
        id
    }

    /// Append `operation`'s id to an open transaction.
    pub fn append(&mut self, id: TransactionId, operation: &ElementOperation) -> Result<(), Error> {
        let tx = self.require_pending(id)?;
        if tx.user_id != operation.user_id {
            return Err(Error::TransactionInvalid {
                reason: "operation author does not match transaction owner".to_string(),
            });
        }
        tx.operation_ids.push(operation.id);
        Ok(())
    }

    /// Commit a pending transaction, returning its accumulated operation ids
    /// for the caller to apply atomically.
    pub fn commit(&mut self, id: TransactionId) -> Result<Vec<OperationId>, Error> {
        let tx = self.require_pending(id)?;
        tx.state = TransactionState::Committed;
        tx.closed_at = Some(Utc::now());
        Ok(tx.operation_ids.clone())
    }

    /// Roll back a pending transaction, discarding its operations.
    pub fn rollback(&mut self, id: TransactionId) -> Result<(), Error> {
        let tx = self.require_pending(id)?;
        tx.state = TransactionState::RolledBack;
        tx.closed_at = Some(Utc::now());
        Ok(())
    }

    /// Force-rollback every pending transaction older than `max_age`, returning
    /// their ids for the housekeeper to log.
    pub fn force_rollback_aged(&mut self, max_age: ChronoDuration, now: DateTime<Utc>) -> Vec<TransactionId> {
        let mut rolled_back = Vec::new();
        for tx in self.open.values_mut() {
            if tx.state == TransactionState::Pending && tx.age(now) > max_age {
                tx.state = TransactionState::RolledBack;
                tx.closed_at = Some(now);
                rolled_back.push(tx.id);
            }
        }
        rolled_back
    }

    /// Drop terminal transactions older than `retain_after`, bounding memory.
    pub fn reap_terminal(&mut self, retain_after: ChronoDuration, now: DateTime<Utc>) {
        self.open.retain(|_, tx| {
            !tx.is_terminal() || now - tx.closed_at.unwrap_or(now) < retain_after
        });
    }

    fn require_pending(&mut self, id: TransactionId) -> Result<&mut Transaction, Error> {
        let tx = self
            .open
            .get_mut(&id)
            .ok_or_else(|| Error::TransactionInvalid {
                reason: "unknown transaction".to_string(),
            })?;
        if tx.state != TransactionState::Pending {
            return Err(Error::TransactionInvalid {
                reason: "transaction already terminal".to_string(),
            });
        }
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::test_support::op;
    use crate::operation::OperationKind;

    #[test]
    fn begin_append_commit_happy_path() {
        let mut manager = TransactionManager::new();
        let id = manager.begin("alice".to_string());
        let operation = op(1, "alice", OperationKind::Move, "e1");
        manager.append(id, &operation).unwrap();
        let committed = manager.commit(id).unwrap();
        assert_eq!(committed, vec![operation.id]);
    }

    #[test]
    fn cannot_append_after_commit() {
        let mut manager = TransactionManager::new();
        let id = manager.begin("alice".to_string());
        manager.commit(id).unwrap();
        let operation = op(1, "alice", OperationKind::Move, "e1");
        assert!(manager.append(id, &operation).is_err());
    }

    #[test]
    fn append_rejects_mismatched_author() {
        let mut manager = TransactionManager::new();
        let id = manager.begin("alice".to_string());
        let operation = op(1, "bob", OperationKind::Move, "e1");
        assert!(manager.append(id, &operation).is_err());
    }

    #[test]
    fn aged_pending_transaction_is_force_rolled_back() {
        let mut manager = TransactionManager::new();
        let id = manager.begin("alice".to_string());
        let future = Utc::now() + ChronoDuration::seconds(600);
        let rolled_back = manager.force_rollback_aged(ChronoDuration::seconds(300), future);
        assert_eq!(rolled_back, vec![id]);
        assert!(manager.commit(id).is_err());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::AccountRef;
use crate::transaction::{GgoPool, Transaction, TransactionError, TransactionKind};

/// Lifecycle states of a `Batch`. Transitions: PENDING -> SUBMITTED ->
/// (COMPLETED | DECLINED). Declined batches are terminal; nothing
/// resubmits a declined batch, the caller builds a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Pending,
    Submitted,
    Completed,
    Declined,
}

/// A set of transactions executed atomically against the ledger.
/// Transactions run in the order they were added via `add_transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Storage-assigned surrogate key, `None` until the repository persists
    /// this batch (mirrors `Ggo::id`).
    pub id: Option<i64>,
    pub created: DateTime<Utc>,
    pub state: BatchState,
    pub submitted: Option<DateTime<Utc>>,
    pub user: AccountRef,
    pub transactions: Vec<Transaction>,
    pub handle: Option<String>,
    pub poll_count: i32,
}

impl Batch {
    pub fn new(id: Option<i64>, user: AccountRef, created: DateTime<Utc>) -> Self {
        Batch {
            id,
            created,
            state: BatchState::Pending,
            submitted: None,
            user,
            transactions: Vec::new(),
            handle: None,
            poll_count: 0,
        }
    }

    pub fn add_transaction(&mut self, kind: TransactionKind) {
        let order = self.transactions.len() as i32;
        self.transactions.push(Transaction { order, kind });
    }

    pub fn add_all_transactions(&mut self, kinds: impl IntoIterator<Item = TransactionKind>) {
        for kind in kinds {
            self.add_transaction(kind);
        }
    }

    /// Applies every transaction's `on_begin` in insertion order, against
    /// `pool` (which must already contain every GGO any transaction in this
    /// batch touches). Sets the batch to PENDING.
    pub fn on_begin(&mut self, pool: &mut GgoPool) -> Result<(), TransactionError> {
        self.state = BatchState::Pending;
        for tx in &self.transactions {
            tx.on_begin(pool)?;
        }
        Ok(())
    }

    pub fn on_submitted(&mut self, handle: String, submitted_at: DateTime<Utc>) {
        self.state = BatchState::Submitted;
        self.handle = Some(handle);
        self.submitted = Some(submitted_at);
    }

    /// Idempotent: safe to call more than once (it only reasserts the
    /// already-applied flag flips made by `on_begin`).
    pub fn on_commit(&mut self, pool: &mut GgoPool) -> Result<(), TransactionError> {
        self.state = BatchState::Completed;
        for tx in &self.transactions {
            tx.on_commit(pool)?;
        }
        Ok(())
    }

    /// Reverses every transaction in this batch, in reverse insertion
    /// order. Returns the ids of GGOs that were created by split
    /// transactions in this batch and must now be deleted, since those
    /// GGOs never existed on the ledger once the batch is declined.
    pub fn on_rollback(&mut self, pool: &mut GgoPool) -> Result<Vec<Uuid>, TransactionError> {
        self.state = BatchState::Declined;

        let mut orphaned_ggo_ids = Vec::new();
        for tx in self.transactions.iter().rev() {
            tx.on_rollback(pool)?;
            if let TransactionKind::Split(split) = &tx.kind {
                orphaned_ggo_ids.extend(split.targets.iter().map(|t| t.ggo_id));
            }
        }
        Ok(orphaned_ggo_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AccountRef;
    use crate::ggo::Ggo;
    use crate::transaction::{SplitTarget, SplitTransaction};
    use chrono::Duration;

    fn ggo(amount: i64, stored: bool) -> Ggo {
        let now = Utc::now();
        Ggo {
            id: None,
            public_id: Uuid::new_v4(),
            issue_time: now,
            expire_time: now + Duration::days(90),
            begin: now,
            end: now + Duration::hours(1),
            amount,
            sector: "DK1".into(),
            parent_id: None,
            measurement_id: None,
            subject: AccountRef::new("user-a"),
            tech_code: None,
            fuel_code: None,
            issued: false,
            stored,
            retired: false,
            issue_gsrn: None,
            retire_gsrn: None,
            retire_measurement_id: None,
        }
    }

    #[test]
    fn rollback_reverses_in_reverse_order_and_reports_orphans() {
        let mut pool = GgoPool::new();
        let parent = ggo(1000, true);
        let child = ggo(1000, false);
        let (parent_id, child_id) = (parent.public_id, child.public_id);
        pool.insert(parent_id, parent);
        pool.insert(child_id, child);

        let mut batch = Batch::new(Some(1), AccountRef::new("user-a"), Utc::now());
        batch.add_transaction(TransactionKind::Split(SplitTransaction {
            parent_ggo_id: parent_id,
            targets: vec![SplitTarget { ggo_id: child_id, reference: None }],
        }));

        batch.on_begin(&mut pool).unwrap();
        assert!(!pool[&parent_id].stored);
        assert!(pool[&child_id].stored);

        let orphans = batch.on_rollback(&mut pool).unwrap();
        assert_eq!(orphans, vec![child_id]);
        assert!(pool[&parent_id].stored);
        assert!(matches!(batch.state, BatchState::Declined));
    }
}

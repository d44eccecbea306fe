use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::ggo::Ggo;

/// A GGO, keyed by its `public_id`, is looked up in this pool by the
/// transaction's lifecycle methods. The batch owning a set of transactions
/// is expected to hold every GGO those transactions touch (the parent and
/// any freshly created children) in one such pool before invoking
/// `on_begin`/`on_commit`/`on_rollback` — mirroring the loaded SQLAlchemy
/// relationships the original relied on, without requiring an ORM or
/// storage-assigned ids to exist yet.
pub type GgoPool = HashMap<Uuid, Ggo>;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("ggo {0} referenced by transaction not present in pool")]
    GgoMissing(Uuid),
    #[error("split transaction targets do not sum to parent amount: targets={targets} parent={parent}")]
    AmountMismatch { targets: i64, parent: i64 },
    #[error("parent ggo {0} is not stored")]
    ParentNotStored(Uuid),
    #[error("parent ggo {0} is already retired")]
    ParentAlreadyRetired(Uuid),
}

/// A single child produced by a `SplitTransaction`. `reference` is an
/// arbitrary caller-supplied string (e.g. a `TradeAgreement`'s public id)
/// used for later enquiry into transfer totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitTarget {
    pub ggo_id: Uuid,
    pub reference: Option<String>,
}

/// Splits `parent_ggo_id` into the GGOs named by `targets`. The sum of the
/// targets' amounts must equal the parent's amount — the composer is
/// responsible for establishing that invariant before the transaction is
/// ever constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitTransaction {
    pub parent_ggo_id: Uuid,
    pub targets: Vec<SplitTarget>,
}

impl SplitTransaction {
    pub fn on_begin(&self, pool: &mut GgoPool) -> Result<(), TransactionError> {
        let targets_sum: i64 = self
            .targets
            .iter()
            .map(|t| {
                pool.get(&t.ggo_id)
                    .map(|g| g.amount)
                    .ok_or(TransactionError::GgoMissing(t.ggo_id))
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .sum();

        let parent = pool
            .get(&self.parent_ggo_id)
            .ok_or(TransactionError::GgoMissing(self.parent_ggo_id))?;

        if targets_sum != parent.amount {
            return Err(TransactionError::AmountMismatch {
                targets: targets_sum,
                parent: parent.amount,
            });
        }
        if !parent.stored {
            return Err(TransactionError::ParentNotStored(self.parent_ggo_id));
        }
        if parent.retired {
            return Err(TransactionError::ParentAlreadyRetired(self.parent_ggo_id));
        }

        self.apply(pool)
    }

    pub fn on_commit(&self, pool: &mut GgoPool) -> Result<(), TransactionError> {
        self.apply(pool)
    }

    fn apply(&self, pool: &mut GgoPool) -> Result<(), TransactionError> {
        let parent = pool
            .get_mut(&self.parent_ggo_id)
            .ok_or(TransactionError::GgoMissing(self.parent_ggo_id))?;
        parent.stored = false;

        for target in &self.targets {
            let child = pool
                .get_mut(&target.ggo_id)
                .ok_or(TransactionError::GgoMissing(target.ggo_id))?;
            child.stored = true;
        }
        Ok(())
    }

    /// Reverses the split: the parent becomes stored again. The caller
    /// (the repository) is responsible for deleting the target rows/GGOs
    /// from the pool afterwards, matching the original's
    /// `session.delete(target)` / `session.delete(target.ggo)`.
    pub fn on_rollback(&self, pool: &mut GgoPool) -> Result<(), TransactionError> {
        let parent = pool
            .get_mut(&self.parent_ggo_id)
            .ok_or(TransactionError::GgoMissing(self.parent_ggo_id))?;
        parent.stored = true;
        Ok(())
    }
}

/// Retires `parent_ggo_id` against the consumption measurement
/// `measurement_id` at `meteringpoint_gsrn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetireTransaction {
    pub parent_ggo_id: Uuid,
    pub begin: DateTime<Utc>,
    pub meteringpoint_gsrn: String,
    pub measurement_id: i64,
}

impl RetireTransaction {
    /// Builds the transaction and stamps the retire fields onto `ggo`
    /// itself (the original does this as a side effect of `build()`, ahead
    /// of the `on_begin`/`on_commit` hooks that flip `stored`/`retired`).
    pub fn build(ggo: &mut Ggo, meteringpoint_gsrn: &str, measurement_id: i64) -> Self {
        ggo.retire_gsrn = Some(meteringpoint_gsrn.to_string());
        ggo.retire_measurement_id = Some(measurement_id);

        RetireTransaction {
            parent_ggo_id: ggo.public_id,
            begin: ggo.begin,
            meteringpoint_gsrn: meteringpoint_gsrn.to_string(),
            measurement_id,
        }
    }

    pub fn on_begin(&self, pool: &mut GgoPool) -> Result<(), TransactionError> {
        self.apply(pool)
    }

    pub fn on_commit(&self, pool: &mut GgoPool) -> Result<(), TransactionError> {
        self.apply(pool)
    }

    fn apply(&self, pool: &mut GgoPool) -> Result<(), TransactionError> {
        let parent = pool
            .get_mut(&self.parent_ggo_id)
            .ok_or(TransactionError::GgoMissing(self.parent_ggo_id))?;
        parent.stored = false;
        parent.retired = true;
        Ok(())
    }

    pub fn on_rollback(&self, pool: &mut GgoPool) -> Result<(), TransactionError> {
        let parent = pool
            .get_mut(&self.parent_ggo_id)
            .ok_or(TransactionError::GgoMissing(self.parent_ggo_id))?;
        parent.stored = true;
        parent.retired = false;
        parent.retire_gsrn = None;
        parent.retire_measurement_id = None;
        Ok(())
    }
}

/// A single ledger operation within a `Batch`. `order` fixes replay order;
/// unique together with the owning batch id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub order: i32,
    pub kind: TransactionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Split(SplitTransaction),
    Retire(RetireTransaction),
}

impl Transaction {
    pub fn parent_ggo_id(&self) -> Uuid {
        match &self.kind {
            TransactionKind::Split(t) => t.parent_ggo_id,
            TransactionKind::Retire(t) => t.parent_ggo_id,
        }
    }

    pub fn on_begin(&self, pool: &mut GgoPool) -> Result<(), TransactionError> {
        match &self.kind {
            TransactionKind::Split(t) => t.on_begin(pool),
            TransactionKind::Retire(t) => t.on_begin(pool),
        }
    }

    pub fn on_commit(&self, pool: &mut GgoPool) -> Result<(), TransactionError> {
        match &self.kind {
            TransactionKind::Split(t) => t.on_commit(pool),
            TransactionKind::Retire(t) => t.on_commit(pool),
        }
    }

    pub fn on_rollback(&self, pool: &mut GgoPool) -> Result<(), TransactionError> {
        match &self.kind {
            TransactionKind::Split(t) => t.on_rollback(pool),
            TransactionKind::Retire(t) => t.on_rollback(pool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AccountRef;
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
    fn split_on_begin_flips_stored_flags() {
        let mut pool = GgoPool::new();
        let parent = ggo(1000, true);
        let child_a = ggo(600, false);
        let child_b = ggo(400, false);
        let (parent_id, child_a_id, child_b_id) =
            (parent.public_id, child_a.public_id, child_b.public_id);
        pool.insert(parent_id, parent);
        pool.insert(child_a_id, child_a);
        pool.insert(child_b_id, child_b);

        let split = SplitTransaction {
            parent_ggo_id: parent_id,
            targets: vec![
                SplitTarget { ggo_id: child_a_id, reference: None },
                SplitTarget { ggo_id: child_b_id, reference: Some("ref-1".into()) },
            ],
        };

        split.on_begin(&mut pool).unwrap();

        assert!(!pool[&parent_id].stored);
        assert!(pool[&child_a_id].stored);
        assert!(pool[&child_b_id].stored);
    }

    #[test]
    fn split_on_begin_rejects_amount_mismatch() {
        let mut pool = GgoPool::new();
        let parent = ggo(1000, true);
        let child = ggo(600, false);
        let (parent_id, child_id) = (parent.public_id, child.public_id);
        pool.insert(parent_id, parent);
        pool.insert(child_id, child);

        let split = SplitTransaction {
            parent_ggo_id: parent_id,
            targets: vec![SplitTarget { ggo_id: child_id, reference: None }],
        };

        let err = split.on_begin(&mut pool).unwrap_err();
        assert!(matches!(err, TransactionError::AmountMismatch { .. }));
    }

    #[test]
    fn retire_rollback_restores_parent() {
        let mut pool = GgoPool::new();
        let mut parent = ggo(500, true);
        let retire = RetireTransaction::build(&mut parent, "571234567890123456", 42);
        let parent_id = parent.public_id;
        pool.insert(parent_id, parent);

        retire.on_begin(&mut pool).unwrap();
        assert!(!pool[&parent_id].stored);
        assert!(pool[&parent_id].retired);

        retire.on_rollback(&mut pool).unwrap();
        assert!(pool[&parent_id].stored);
        assert!(!pool[&parent_id].retired);
        assert!(pool[&parent_id].retire_gsrn.is_none());
    }
}

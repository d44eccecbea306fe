//! Accumulates transfer/retire intents against one GGO, then compiles them
//! into a `Batch` plus the new GGOs it creates. Grounded on
//! `origin.ggo.composer.GgoComposer`.

use chrono::{DateTime, Utc};
use thiserror::Error;

use ggo_domain_models::common::AccountRef;
use ggo_domain_models::transaction::{GgoPool, TransactionError, TransactionKind};
use ggo_domain_models::{Batch, Ggo, Measurement, Meteringpoint, RetireTransaction, SplitTarget, SplitTransaction};

use crate::ports::{Ports, StoreError};

#[derive(Debug, Error)]
pub enum ComposerError {
    #[error("ggo is not tradable (expired)")]
    NotTradable,
    #[error("amount must be greater than zero and at most the ggo's amount")]
    InvalidAmount,
    #[error("meteringpoint does not belong to the ggo's owner, or is not a consumption point")]
    IneligibleMeteringpoint,
    #[error("no transfers or retires were added")]
    Empty,
    #[error("sum of transfers and retires exceeds the ggo's amount")]
    AmountUnavailable,
    #[error("no published measurement for gsrn {gsrn} at {begin}")]
    RetireMeasurementUnavailable { gsrn: String, begin: DateTime<Utc> },
    #[error("measurement {measurement_id} is not eligible to retire this ggo (sector/begin mismatch)")]
    RetireMeasurementInvalid { measurement_id: i64 },
    #[error("cannot retire {amount}, only {allowed_amount} remains unretired for this measurement")]
    RetireAmountInvalid { amount: i64, allowed_amount: i64 },
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("transaction invariant violated: {0}")]
    Transaction(#[from] TransactionError),
}

/// The result of `Composer::build_batch`: a batch ready for `on_commit`,
/// the GGO pool containing the parent plus every newly created child
/// (already mutated to their post-`on_begin` state), and the list of
/// (recipient, new ggo) pairs the caller must persist and notify.
pub struct ComposedBatch {
    pub batch: Batch,
    pub pool: GgoPool,
    pub recipients: Vec<(AccountRef, Ggo)>,
}

pub struct Composer<'a> {
    ggo: Ggo,
    ports: &'a Ports<'a>,
    transfers: Vec<(AccountRef, i64, Option<String>)>,
    retires: Vec<(Measurement, Meteringpoint, i64)>,
}

impl<'a> Composer<'a> {
    pub fn new(ggo: Ggo, ports: &'a Ports<'a>) -> Result<Self, ComposerError> {
        if !ggo.is_tradable() {
            return Err(ComposerError::NotTradable);
        }
        Ok(Composer {
            ggo,
            ports,
            transfers: Vec::new(),
            retires: Vec::new(),
        })
    }

    /// Read-only access to the GGO being composed against, for consumers
    /// that need to inspect its sector/begin/amount while deciding how much
    /// they want.
    pub fn ggo_ref(&self) -> &Ggo {
        &self.ggo
    }

    pub fn total_amount(&self) -> i64 {
        let transferred: i64 = self.transfers.iter().map(|(_, amount, _)| amount).sum();
        let retired: i64 = self.retires.iter().map(|(_, _, amount)| amount).sum();
        transferred + retired
    }

    pub fn remaining_amount(&self) -> i64 {
        self.ggo.amount - self.total_amount()
    }

    /// Queues a transfer of `amount` to `recipient`. `reference` is an
    /// arbitrary caller-supplied string (typically a `TradeAgreement`'s
    /// public id) surfaced later in transfer-total queries.
    pub fn add_transfer(
        &mut self,
        recipient: AccountRef,
        amount: i64,
        reference: Option<String>,
    ) -> Result<(), ComposerError> {
        if amount <= 0 || amount > self.ggo.amount {
            return Err(ComposerError::InvalidAmount);
        }
        self.transfers.push((recipient, amount, reference));
        Ok(())
    }

    /// Queues a retire of `amount` to `meteringpoint`'s published
    /// consumption measurement at the GGO's `begin`.
    pub async fn add_retire(
        &mut self,
        meteringpoint: Meteringpoint,
        amount: i64,
    ) -> Result<(), ComposerError> {
        if amount <= 0 || amount > self.ggo.amount {
            return Err(ComposerError::InvalidAmount);
        }
        if meteringpoint.subject != self.ggo.subject || !meteringpoint.is_consumer() {
            return Err(ComposerError::IneligibleMeteringpoint);
        }

        let measurement = self
            .ports
            .measurement
            .find(&meteringpoint.subject, &meteringpoint.gsrn, self.ggo.begin)
            .await?
            .ok_or_else(|| ComposerError::RetireMeasurementUnavailable {
                gsrn: meteringpoint.gsrn.clone(),
                begin: self.ggo.begin,
            })?;

        if !self.eligible_to_retire_measurement(&measurement) {
            return Err(ComposerError::RetireMeasurementInvalid {
                measurement_id: measurement.id,
            });
        }

        let retired_amount = self
            .ports
            .ggo
            .total_retired_amount(&self.ggo.subject, &meteringpoint.gsrn, measurement.id)
            .await?;
        let remaining_amount = measurement.amount - retired_amount;

        if amount > remaining_amount {
            return Err(ComposerError::RetireAmountInvalid {
                amount,
                allowed_amount: remaining_amount,
            });
        }

        self.retires.push((measurement, meteringpoint, amount));
        Ok(())
    }

    fn eligible_to_retire_measurement(&self, measurement: &Measurement) -> bool {
        self.ggo.sector == measurement.sector && self.ggo.begin == measurement.begin
    }

    /// Compiles the queued transfers/retires into a `Batch`. Any amount left
    /// over after the queued transfers/retires is implicitly assigned back
    /// to the GGO's current owner, so the batch always accounts for the
    /// GGO's full amount.
    pub fn build_batch(mut self, batch_id: Option<i64>) -> Result<ComposedBatch, ComposerError> {
        if self.total_amount() == 0 {
            return Err(ComposerError::Empty);
        }
        if self.total_amount() > self.ggo.amount {
            return Err(ComposerError::AmountUnavailable);
        }

        let remaining = self.remaining_amount();
        if remaining > 0 {
            self.add_transfer(self.ggo.subject.clone(), remaining, None)?;
        }
        debug_assert_eq!(self.total_amount(), self.ggo.amount);

        let now = self.ports.clock.now();
        let mut pool = GgoPool::new();
        let mut split_targets = Vec::new();
        let mut retire_kinds = Vec::new();
        let mut recipients = Vec::new();

        let total_targets = self.transfers.len() + self.retires.len();
        let should_split = total_targets > 1 || !self.transfers.is_empty();

        for (recipient, amount, reference) in &self.transfers {
            let child = self.ggo.create_child(*amount, recipient.clone());
            split_targets.push(SplitTarget {
                ggo_id: child.public_id,
                reference: reference.clone(),
            });
            recipients.push((recipient.clone(), child.clone()));
            pool.insert(child.public_id, child);
        }

        for (measurement, meteringpoint, amount) in &self.retires {
            if should_split {
                let mut child = self.ggo.create_child(*amount, self.ggo.subject.clone());
                let retire = RetireTransaction::build(&mut child, &meteringpoint.gsrn, measurement.id);
                split_targets.push(SplitTarget { ggo_id: child.public_id, reference: None });
                pool.insert(child.public_id, child);
                retire_kinds.push(TransactionKind::Retire(retire));
            } else {
                let retire = RetireTransaction::build(&mut self.ggo, &meteringpoint.gsrn, measurement.id);
                retire_kinds.push(TransactionKind::Retire(retire));
            }
        }

        pool.insert(self.ggo.public_id, self.ggo.clone());

        let mut batch = Batch::new(batch_id, self.ggo.subject.clone(), now);
        if should_split {
            batch.add_transaction(TransactionKind::Split(SplitTransaction {
                parent_ggo_id: self.ggo.public_id,
                targets: split_targets,
            }));
        }
        batch.add_all_transactions(retire_kinds);

        batch.on_begin(&mut pool)?;

        Ok(ComposedBatch { batch, pool, recipients })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{AgreementStore, Clock, GgoStore, LedgerWriter, MeasurementStore, MeteringpointStore, TransactionStore};
    use async_trait::async_trait;
    use chrono::Duration;
    use ggo_domain_models::{MeteringPointType, TradeAgreement};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FixedClock(DateTime<Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct FakeStore {
        measurement: Option<Measurement>,
        retired_amount: Mutex<i64>,
    }

    #[async_trait]
    impl MeasurementStore for FakeStore {
        async fn find(
            &self,
            _owner: &AccountRef,
            _gsrn: &str,
            _begin: DateTime<Utc>,
        ) -> Result<Option<Measurement>, StoreError> {
            Ok(self.measurement.clone())
        }
    }

    #[async_trait]
    impl GgoStore for FakeStore {
        async fn total_retired_amount(
            &self,
            _owner: &AccountRef,
            _gsrn: &str,
            _measurement_id: i64,
        ) -> Result<i64, StoreError> {
            Ok(*self.retired_amount.lock().unwrap())
        }

        async fn total_stored_amount(&self, _owner: &AccountRef, _begin: DateTime<Utc>) -> Result<i64, StoreError> {
            Ok(0)
        }
    }

    #[async_trait]
    impl MeteringpointStore for FakeStore {
        async fn eligible_to_retire(&self, _owner: &AccountRef, _sector: &str) -> Result<Vec<ggo_domain_models::Meteringpoint>, StoreError> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl AgreementStore for FakeStore {
        async fn eligible_outbound(
            &self,
            _owner: &AccountRef,
            _begin: DateTime<Utc>,
            _issue_gsrn: Option<&str>,
            _tech_code: Option<&str>,
            _fuel_code: Option<&str>,
        ) -> Result<Vec<TradeAgreement>, StoreError> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl TransactionStore for FakeStore {
        async fn total_transferred(&self, _sender: &AccountRef, _reference: &str, _begin: DateTime<Utc>) -> Result<i64, StoreError> {
            Ok(0)
        }
    }

    #[async_trait]
    impl LedgerWriter for FakeStore {
        async fn persist_batch(&self, _parent: &Ggo, _batch: &Batch, children: &[Ggo]) -> Result<Vec<Ggo>, StoreError> {
            Ok(children.to_vec())
        }
    }

    fn sample_ggo(now: DateTime<Utc>) -> Ggo {
        Ggo {
            id: Some(1),
            public_id: Uuid::new_v4(),
            issue_time: now,
            expire_time: now + Duration::days(90),
            begin: now,
            end: now + Duration::hours(1),
            amount: 1000,
            sector: "DK1".into(),
            parent_id: None,
            measurement_id: Some(1),
            subject: AccountRef::new("owner"),
            tech_code: None,
            fuel_code: None,
            issued: true,
            stored: true,
            retired: false,
            issue_gsrn: Some("571234567890123456".into()),
            retire_gsrn: None,
            retire_measurement_id: None,
        }
    }

    #[tokio::test]
    async fn build_batch_assigns_remainder_to_owner() {
        let now = Utc::now();
        let clock = FixedClock(now);
        let store = FakeStore { measurement: None, retired_amount: Mutex::new(0) };
        let ports = Ports {
            ggo: &store,
            measurement: &store,
            meteringpoint: &store,
            agreement: &store,
            transaction: &store,
            writer: &store,
            clock: &clock,
        };

        let ggo = sample_ggo(now);
        let mut composer = Composer::new(ggo.clone(), &ports).unwrap();
        composer.add_transfer(AccountRef::new("recipient"), 300, None).unwrap();

        let composed = composer.build_batch(None).unwrap();

        assert_eq!(composed.recipients.len(), 2);
        let total: i64 = composed.recipients.iter().map(|(_, g)| g.amount).sum();
        assert_eq!(total, ggo.amount);
    }

    #[tokio::test]
    async fn build_batch_errors_when_empty() {
        let now = Utc::now();
        let clock = FixedClock(now);
        let store = FakeStore { measurement: None, retired_amount: Mutex::new(0) };
        let ports = Ports {
            ggo: &store,
            measurement: &store,
            meteringpoint: &store,
            agreement: &store,
            transaction: &store,
            writer: &store,
            clock: &clock,
        };

        let composer = Composer::new(sample_ggo(now), &ports).unwrap();
        let err = composer.build_batch(None).unwrap_err();
        assert!(matches!(err, ComposerError::Empty));
    }

    #[tokio::test]
    async fn add_retire_rejects_amount_beyond_measurement_remainder() {
        let now = Utc::now();
        let ggo = sample_ggo(now);
        let clock = FixedClock(now);
        let measurement = Measurement {
            id: 7,
            gsrn: "571000000000000001".into(),
            subject: AccountRef::new("owner"),
            sector: "DK1".into(),
            begin: ggo.begin,
            end: ggo.end,
            amount: 200,
        };
        let store = FakeStore { measurement: Some(measurement), retired_amount: Mutex::new(150) };
        let ports = Ports {
            ggo: &store,
            measurement: &store,
            meteringpoint: &store,
            agreement: &store,
            transaction: &store,
            writer: &store,
            clock: &clock,
        };

        let meteringpoint = ggo_domain_models::Meteringpoint {
            public_id: "mp-1".into(),
            gsrn: "571000000000000001".into(),
            meteringpoint_type: MeteringPointType::Consumption,
            sector: "DK1".into(),
            tech_code: None,
            fuel_code: None,
            name: "consumer".into(),
            retiring_priority: Some(0),
            subject: AccountRef::new("owner"),
            tags: vec![],
        };

        let mut composer = Composer::new(ggo, &ports).unwrap();
        let err = composer.add_retire(meteringpoint, 100).await.unwrap_err();
        assert!(matches!(err, ComposerError::RetireAmountInvalid { amount: 100, allowed_amount: 50 }));
    }
}

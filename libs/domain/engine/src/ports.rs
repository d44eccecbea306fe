//! Storage and clock interfaces the composer and allocation engine depend
//! on. `ggo-infra-db` implements these against libSQL; tests implement them
//! against an in-memory fake. Neither the composer nor the engine names a
//! concrete database anywhere.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ggo_domain_models::{Batch, Ggo, Measurement, Meteringpoint, TradeAgreement};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock. The default `Clock` for production wiring.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Queries the composer and allocation engine issue against already-issued
/// GGOs. Mutating a GGO's own fields happens in memory (see
/// `ggo_domain_models::transaction::GgoPool`); this port only covers
/// cross-entity totals the engine can't compute from what it already holds.
#[async_trait]
pub trait GgoStore: Send + Sync {
    /// Sum of amounts already retired by `owner` at `gsrn` against
    /// `measurement_id`.
    async fn total_retired_amount(
        &self,
        owner: &ggo_domain_models::common::AccountRef,
        gsrn: &str,
        measurement_id: i64,
    ) -> Result<i64, StoreError>;

    /// Sum of amounts `owner` currently holds in storage for the interval
    /// starting at `begin`.
    async fn total_stored_amount(
        &self,
        owner: &ggo_domain_models::common::AccountRef,
        begin: DateTime<Utc>,
    ) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// The published measurement for `gsrn` at `begin`, owned by `owner`.
    async fn find(
        &self,
        owner: &ggo_domain_models::common::AccountRef,
        gsrn: &str,
        begin: DateTime<Utc>,
    ) -> Result<Option<Measurement>, StoreError>;
}

#[async_trait]
pub trait MeteringpointStore: Send + Sync {
    /// Consumption facilities belonging to `owner` that are eligible to
    /// retire a GGO in `sector`, ordered by `retiring_priority` ascending.
    async fn eligible_to_retire(
        &self,
        owner: &ggo_domain_models::common::AccountRef,
        sector: &str,
    ) -> Result<Vec<Meteringpoint>, StoreError>;
}

#[async_trait]
pub trait AgreementStore: Send + Sync {
    /// Active, accepted agreements outbound from `owner`, eligible to carry
    /// a GGO issued at `issue_gsrn` (facility filter), with technology
    /// `(tech_code, fuel_code)` (technology filter, when either is set), at
    /// the local calendar date of `begin` (window filter: `date_from <=
    /// date <= date_to`). Ordered by `transfer_priority` ascending.
    #[allow(clippy::too_many_arguments)]
    async fn eligible_outbound(
        &self,
        owner: &ggo_domain_models::common::AccountRef,
        begin: DateTime<Utc>,
        issue_gsrn: Option<&str>,
        tech_code: Option<&str>,
        fuel_code: Option<&str>,
    ) -> Result<Vec<TradeAgreement>, StoreError>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Sum of amounts `sender` has already transferred under `reference`
    /// for the interval starting at `begin`.
    async fn total_transferred(
        &self,
        sender: &ggo_domain_models::common::AccountRef,
        reference: &str,
        begin: DateTime<Utc>,
    ) -> Result<i64, StoreError>;
}

/// Persists the output of `Composer::build_batch` inside the same unit of
/// work the reads above were issued against, so the allocation engine's
/// cascade recursion stays within one database transaction per §5's
/// read-your-writes requirement. The returned GGOs carry their
/// storage-assigned `id` so the caller can tell which recipients are owned
/// by a different account and must be recursed into.
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    async fn persist_batch(
        &self,
        parent: &Ggo,
        batch: &Batch,
        children: &[Ggo],
    ) -> Result<Vec<Ggo>, StoreError>;
}

/// Bundles every port the composer and allocation engine need, so call
/// sites pass one handle instead of four.
pub struct Ports<'a> {
    pub ggo: &'a dyn GgoStore,
    pub measurement: &'a dyn MeasurementStore,
    pub meteringpoint: &'a dyn MeteringpointStore,
    pub agreement: &'a dyn AgreementStore,
    pub transaction: &'a dyn TransactionStore,
    pub writer: &'a dyn LedgerWriter,
    pub clock: &'a dyn Clock,
}

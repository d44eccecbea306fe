//! Storage and clock interfaces the agreement manager depends on.
//! `ggo-infra-db` implements these against libSQL; tests implement them
//! against an in-memory fake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use ggo_domain_models::common::AccountRef;
use ggo_domain_models::TradeAgreement;

use crate::errors::StoreError;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The query/write surface the manager needs against `TradeAgreement` rows.
#[async_trait]
pub trait AgreementRepository: Send + Sync {
    async fn insert(&self, agreement: TradeAgreement) -> Result<TradeAgreement, StoreError>;

    async fn find_by_public_id(&self, public_id: Uuid) -> Result<Option<TradeAgreement>, StoreError>;

    async fn update(&self, agreement: &TradeAgreement) -> Result<(), StoreError>;

    /// The highest `transfer_priority` among `user_from`'s currently
    /// accepted outbound agreements, or `None` if it has none.
    async fn max_priority(&self, user_from: &AccountRef) -> Result<Option<i32>, StoreError>;

    /// Every currently accepted agreement outbound from `user_from`, in no
    /// particular guaranteed order — the manager does its own sorting by
    /// `transfer_priority` before renumbering.
    async fn accepted_outbound(&self, user_from: &AccountRef) -> Result<Vec<TradeAgreement>, StoreError>;

    /// Whether `subject` names an account the proposal can reference as a
    /// counterpart (active, not the proposer).
    async fn account_exists(&self, subject: &AccountRef) -> Result<bool, StoreError>;
}

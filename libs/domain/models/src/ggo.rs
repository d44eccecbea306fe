use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::AccountRef;
use crate::measurement::Measurement;
use crate::meteringpoint::Meteringpoint;

/// The default lifetime of an issued GGO, matching `GGO_EXPIRE_TIME` in
/// `ggo-infra-db::config`. Kept here too since models stays free of any
/// environment access; callers that need the configured value should read
/// it once and pass it to `from_measurement`.
pub const DEFAULT_EXPIRE_AFTER_DAYS: i64 = 90;

/// A single Guarantee of Origin: an amount-bearing, lineage-tracked
/// certificate. GGOs are issued one-per-measurement for production
/// meteringpoints, and are split/transferred/retired from there.
///
/// `public_id` is the stable identifier: it is assigned the moment a GGO is
/// minted in memory (by `from_measurement`/`create_child`), so the engine
/// and composer never need a round-trip to storage to reference a GGO that
/// doesn't exist on disk yet. `id` is the storage-assigned surrogate row
/// key, `None` until the repository persists the GGO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ggo {
    pub id: Option<i64>,
    pub public_id: Uuid,

    pub issue_time: DateTime<Utc>,
    pub expire_time: DateTime<Utc>,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub amount: i64,
    pub sector: String,

    pub parent_id: Option<Uuid>,
    pub measurement_id: Option<i64>,
    pub subject: AccountRef,

    pub tech_code: Option<String>,
    pub fuel_code: Option<String>,

    /// False if this GGO is the product of a split/transfer rather than an
    /// original issuance.
    pub issued: bool,
    /// False once transferred, split, or retired.
    pub stored: bool,
    pub retired: bool,

    pub issue_gsrn: Option<String>,
    pub retire_gsrn: Option<String>,
    pub retire_measurement_id: Option<i64>,
}

impl Ggo {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expire_time
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_tradable(&self) -> bool {
        self.stored && !self.retired && !self.is_expired()
    }

    /// Mint the GGO corresponding to one production measurement.
    pub fn from_measurement(
        measurement: &Measurement,
        meteringpoint: &Meteringpoint,
        now: DateTime<Utc>,
        expire_after: Duration,
    ) -> Self {
        assert!(measurement.amount > 0);

        Ggo {
            id: None,
            public_id: Uuid::new_v4(),
            issue_time: now,
            expire_time: now + expire_after,
            begin: measurement.begin,
            end: measurement.end,
            amount: measurement.amount,
            sector: meteringpoint.sector.clone(),
            parent_id: None,
            measurement_id: Some(measurement.id),
            subject: meteringpoint.subject.clone(),
            tech_code: meteringpoint.tech_code.clone(),
            fuel_code: meteringpoint.fuel_code.clone(),
            issued: true,
            stored: true,
            retired: false,
            issue_gsrn: Some(meteringpoint.gsrn.clone()),
            retire_gsrn: None,
            retire_measurement_id: None,
        }
    }

    /// Produce a detached child carrying `amount` of this GGO's amount,
    /// owned by `recipient`. Does not mutate `self` — the caller (the
    /// composer) is responsible for bookkeeping the parent's own state via
    /// a `SplitTransaction`.
    pub fn create_child(&self, amount: i64, recipient: AccountRef) -> Ggo {
        assert!(amount > 0 && amount <= self.amount);

        Ggo {
            id: None,
            public_id: Uuid::new_v4(),
            issue_time: self.issue_time,
            expire_time: self.expire_time,
            begin: self.begin,
            end: self.end,
            amount,
            sector: self.sector.clone(),
            parent_id: Some(self.public_id),
            measurement_id: None,
            subject: recipient,
            tech_code: self.tech_code.clone(),
            fuel_code: self.fuel_code.clone(),
            issued: false,
            stored: false,
            retired: false,
            issue_gsrn: None,
            retire_gsrn: None,
            retire_measurement_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ggo() -> Ggo {
        let now = Utc::now();
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
            subject: AccountRef::new("user-a"),
            tech_code: Some("T010000".into()),
            fuel_code: Some("F01010100".into()),
            issued: true,
            stored: true,
            retired: false,
            issue_gsrn: Some("571234567890123456".into()),
            retire_gsrn: None,
            retire_measurement_id: None,
        }
    }

    #[test]
    fn expired_ggo_is_not_tradable() {
        let mut ggo = sample_ggo();
        ggo.expire_time = Utc::now() - Duration::seconds(1);
        assert!(!ggo.is_tradable());
    }

    #[test]
    fn create_child_conserves_lineage_not_amount_equality() {
        let parent = sample_ggo();
        let child = parent.create_child(400, AccountRef::new("user-b"));

        assert_eq!(child.parent_id, Some(parent.public_id));
        assert_eq!(child.amount, 400);
        assert!(!child.issued);
        assert!(!child.stored);
        assert_eq!(child.sector, parent.sector);
    }

    #[test]
    #[should_panic]
    fn create_child_rejects_amount_exceeding_parent() {
        let parent = sample_ggo();
        parent.create_child(parent.amount + 1, AccountRef::new("user-b"));
    }
}

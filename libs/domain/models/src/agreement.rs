use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::{AccountRef, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgreementDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgreementState {
    Pending,
    Accepted,
    Declined,
    Cancelled,
    Withdrawn,
}

/// A standing agreement to transfer GGOs from `user_from` to `user_to`,
/// optionally limited to specific facilities, technologies, a percentage or
/// fixed cap of each received GGO, or the recipient's unmet consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeAgreement {
    pub id: i64,
    pub public_id: Uuid,
    pub created: DateTime<Utc>,
    pub declined: Option<DateTime<Utc>>,
    pub cancelled: Option<DateTime<Utc>>,

    pub user_proposed: AccountRef,
    pub user_from: AccountRef,
    pub user_to: AccountRef,

    pub facility_gsrn: Vec<String>,

    pub state: AgreementState,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub technologies: Vec<String>,

    /// Client-visible reference; defaults to `public_id`'s string form
    /// (`transfer_reference` in the original) unless a caller-supplied
    /// `reference` overrides it.
    pub reference: Option<String>,

    pub amount: Option<i64>,
    pub unit: Option<Unit>,
    pub amount_percent: Option<u8>,
    pub limit_to_consumption: bool,

    /// Lowest number = highest priority. `None` until accepted.
    pub transfer_priority: Option<i32>,

    pub proposal_note: Option<String>,
}

impl TradeAgreement {
    pub fn transfer_reference(&self) -> String {
        self.reference
            .clone()
            .unwrap_or_else(|| self.public_id.to_string())
    }

    /// The fixed cap in Wh, if this agreement has a fixed amount rather
    /// than being percentage- or consumption-limited.
    pub fn calculated_amount(&self) -> Option<i64> {
        match (self.amount, self.unit) {
            (Some(amount), Some(unit)) => Some(amount * unit.multiplier() as i64),
            _ => None,
        }
    }

    pub fn is_proposed_by(&self, account: &AccountRef) -> bool {
        *account == self.user_proposed
    }

    pub fn is_inbound_to(&self, account: &AccountRef) -> bool {
        *account == self.user_to
    }

    pub fn is_outbound_from(&self, account: &AccountRef) -> bool {
        *account == self.user_from
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, AgreementState::Pending)
    }

    pub fn decline_proposal(&mut self, now: DateTime<Utc>) {
        self.state = AgreementState::Declined;
        self.declined = Some(now);
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.state = AgreementState::Cancelled;
        self.cancelled = Some(now);
        self.transfer_priority = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agreement() -> TradeAgreement {
        let now = Utc::now();
        TradeAgreement {
            id: 1,
            public_id: Uuid::new_v4(),
            created: now,
            declined: None,
            cancelled: None,
            user_proposed: AccountRef::new("a"),
            user_from: AccountRef::new("a"),
            user_to: AccountRef::new("b"),
            facility_gsrn: vec![],
            state: AgreementState::Pending,
            date_from: now.date_naive(),
            date_to: now.date_naive(),
            technologies: vec![],
            reference: None,
            amount: Some(100),
            unit: Some(Unit::KWh),
            amount_percent: None,
            limit_to_consumption: false,
            transfer_priority: None,
            proposal_note: None,
        }
    }

    #[test]
    fn calculated_amount_applies_unit_multiplier() {
        let agreement = agreement();
        assert_eq!(agreement.calculated_amount(), Some(100_000));
    }

    #[test]
    fn cancel_clears_priority() {
        let mut agreement = agreement();
        agreement.transfer_priority = Some(3);
        agreement.cancel(Utc::now());
        assert!(agreement.transfer_priority.is_none());
        assert!(matches!(agreement.state, AgreementState::Cancelled));
    }
}

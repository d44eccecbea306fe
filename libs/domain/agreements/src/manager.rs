//! Trade agreement lifecycle and transfer-priority bookkeeping (§4.4).
//! Grounded on `origin.agreements.controllers` (`SubmitAgreementProposal`,
//! `RespondToProposal`, `WithdrawProposal`, `CancelAgreement`,
//! `SetTransferPriority`) and `origin.agreements.helpers.update_transfer_priorities`.

use chrono::NaiveDate;
use tracing::instrument;
use uuid::Uuid;

use ggo_domain_models::common::{AccountRef, Unit};
use ggo_domain_models::{AgreementState, TradeAgreement};

use crate::errors::AgreementError;
use crate::ports::{AgreementRepository, Clock};

/// Fields a proposer supplies up front; everything else (`public_id`,
/// `created`, `state`, `transfer_priority`) is assigned by `propose`.
#[derive(Debug, Clone)]
pub struct ProposeAgreement {
    pub proposer: AccountRef,
    pub user_from: AccountRef,
    pub user_to: AccountRef,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub facility_gsrn: Vec<String>,
    pub technologies: Vec<String>,
    pub amount: Option<i64>,
    pub unit: Option<Unit>,
    pub amount_percent: Option<u8>,
    pub limit_to_consumption: bool,
    pub proposal_note: Option<String>,
    pub reference: Option<String>,
}

/// Fields the accepting party may optionally fill in, each subject to the
/// constraints in §4.4's `Accept`.
#[derive(Debug, Clone, Default)]
pub struct AcceptOverrides {
    pub technologies: Option<Vec<String>>,
    pub facility_gsrn: Option<Vec<String>>,
    pub amount_percent: Option<u8>,
}

/// Proposes, responds to, and renumbers `TradeAgreement`s against one
/// `AgreementRepository`. Holds no state of its own beyond the repository
/// and clock handles.
pub struct AgreementManager<'a> {
    store: &'a dyn AgreementRepository,
    clock: &'a dyn Clock,
}

impl<'a> AgreementManager<'a> {
    pub fn new(store: &'a dyn AgreementRepository, clock: &'a dyn Clock) -> Self {
        AgreementManager { store, clock }
    }

    /// Creates a `PENDING` agreement between two accounts. Enforces: the
    /// accounts differ, the counterpart exists, `amount_percent` (if set)
    /// is in `[1, 100]`, and the agreement is either consumption-limited or
    /// carries a fixed `amount`/`unit` pair.
    #[instrument(skip(self, request), fields(user_from = %request.user_from, user_to = %request.user_to))]
    pub async fn propose(&self, request: ProposeAgreement) -> Result<TradeAgreement, AgreementError> {
        if request.user_from == request.user_to {
            return Err(AgreementError::InvalidProposal(
                "user_from and user_to must differ".into(),
            ));
        }

        let counterpart = if request.proposer == request.user_from {
            &request.user_to
        } else {
            &request.user_from
        };
        if !self.store.account_exists(counterpart).await? {
            return Err(AgreementError::CounterpartUnavailable);
        }

        if let Some(percent) = request.amount_percent {
            if !(1..=100).contains(&percent) {
                return Err(AgreementError::InvalidProposal(
                    "amount_percent must be between 1 and 100".into(),
                ));
            }
        }

        if !request.limit_to_consumption && !(request.amount.is_some() && request.unit.is_some()) {
            return Err(AgreementError::InvalidProposal(
                "agreement must either limit_to_consumption or specify amount and unit".into(),
            ));
        }

        let now = self.clock.now();
        let agreement = TradeAgreement {
            id: 0,
            public_id: Uuid::new_v4(),
            created: now,
            declined: None,
            cancelled: None,
            user_proposed: request.proposer,
            user_from: request.user_from,
            user_to: request.user_to,
            facility_gsrn: request.facility_gsrn,
            state: AgreementState::Pending,
            date_from: request.date_from,
            date_to: request.date_to,
            technologies: request.technologies,
            reference: request.reference,
            amount: request.amount,
            unit: request.unit,
            amount_percent: request.amount_percent,
            limit_to_consumption: request.limit_to_consumption,
            transfer_priority: None,
            proposal_note: request.proposal_note,
        };

        Ok(self.store.insert(agreement).await?)
    }

    /// Transitions a `PENDING` agreement to `ACCEPTED`. Must be called by
    /// the non-proposing party. Assigns `transfer_priority` one past
    /// `user_from`'s current maximum (0 if it has none yet).
    #[instrument(skip(self, overrides))]
    pub async fn accept(
        &self,
        accepter: &AccountRef,
        public_id: Uuid,
        overrides: AcceptOverrides,
    ) -> Result<TradeAgreement, AgreementError> {
        let mut agreement = self.find_pending(public_id).await?;

        if agreement.is_proposed_by(accepter) {
            return Err(AgreementError::NotCounterpartOfProposal);
        }

        let next_priority = self.store.max_priority(&agreement.user_from).await?.map(|p| p + 1).unwrap_or(0);
        agreement.state = AgreementState::Accepted;
        agreement.transfer_priority = Some(next_priority);

        if let Some(technologies) = overrides.technologies {
            if agreement.technologies.is_empty() {
                agreement.technologies = technologies;
            }
        }
        if let Some(facility_gsrn) = overrides.facility_gsrn {
            if agreement.is_outbound_from(accepter) {
                agreement.facility_gsrn = facility_gsrn;
            }
        }
        if let Some(amount_percent) = overrides.amount_percent {
            if agreement.is_outbound_from(accepter) {
                agreement.amount_percent = Some(amount_percent);
            }
        }

        self.store.update(&agreement).await?;
        Ok(agreement)
    }

    /// Declines a `PENDING` agreement. Must be called by the non-proposing
    /// party (the one awaiting response).
    #[instrument(skip(self))]
    pub async fn decline(&self, decliner: &AccountRef, public_id: Uuid) -> Result<TradeAgreement, AgreementError> {
        let mut agreement = self.find_pending(public_id).await?;
        if agreement.is_proposed_by(decliner) {
            return Err(AgreementError::NotCounterpartOfProposal);
        }

        agreement.decline_proposal(self.clock.now());
        self.store.update(&agreement).await?;
        Ok(agreement)
    }

    /// Withdraws a `PENDING` agreement. Only the proposer may withdraw.
    #[instrument(skip(self))]
    pub async fn withdraw(&self, proposer: &AccountRef, public_id: Uuid) -> Result<TradeAgreement, AgreementError> {
        let mut agreement = self.find_pending(public_id).await?;
        if !agreement.is_proposed_by(proposer) {
            return Err(AgreementError::NotProposerOfAgreement);
        }

        agreement.state = AgreementState::Withdrawn;
        self.store.update(&agreement).await?;
        Ok(agreement)
    }

    /// Cancels an `ACCEPTED` agreement, then renumbers `user_from`'s
    /// remaining accepted agreements to close the gap. The cancellation
    /// and the renumbering are deliberately two separate repository calls
    /// (see DESIGN.md): the original commits the cancellation before
    /// running the renumbering query.
    #[instrument(skip(self))]
    pub async fn cancel(&self, canceller: &AccountRef, public_id: Uuid) -> Result<TradeAgreement, AgreementError> {
        let mut agreement = self
            .store
            .find_by_public_id(public_id)
            .await?
            .ok_or(AgreementError::AgreementNotFound)?;

        if !matches!(agreement.state, AgreementState::Accepted) {
            return Err(AgreementError::AgreementNotAccepted);
        }
        if !(agreement.is_outbound_from(canceller) || agreement.is_inbound_to(canceller)) {
            return Err(AgreementError::NotPartyToAgreement);
        }

        agreement.cancel(self.clock.now());
        self.store.update(&agreement).await?;

        self.renumber(&agreement.user_from).await?;

        Ok(agreement)
    }

    /// Given a sequence of `public_id`s belonging to one `owner`, assigns
    /// priorities in the order given starting at 0, clears priority for
    /// any of that owner's accepted agreements not named, then renumbers
    /// the whole set by prior order to close gaps.
    #[instrument(skip(self, ordered_public_ids))]
    pub async fn set_priority(&self, owner: &AccountRef, ordered_public_ids: &[Uuid]) -> Result<(), AgreementError> {
        let mut accepted = self.store.accepted_outbound(owner).await?;

        for (index, public_id) in ordered_public_ids.iter().enumerate() {
            if let Some(agreement) = accepted.iter_mut().find(|a| a.public_id == *public_id) {
                agreement.transfer_priority = Some(index as i32);
            }
        }
        for agreement in accepted.iter_mut() {
            if !ordered_public_ids.contains(&agreement.public_id) {
                agreement.transfer_priority = None;
            }
        }
        for agreement in &accepted {
            self.store.update(agreement).await?;
        }

        self.renumber(owner).await
    }

    async fn find_pending(&self, public_id: Uuid) -> Result<TradeAgreement, AgreementError> {
        let agreement = self
            .store
            .find_by_public_id(public_id)
            .await?
            .ok_or(AgreementError::AgreementNotFound)?;
        if !agreement.is_pending() {
            return Err(AgreementError::AgreementNotPending);
        }
        Ok(agreement)
    }

    /// Re-packs `user_from`'s accepted outbound agreements into a dense
    /// `0..k` sequence ordered by their current priority (ties/`None`
    /// broken by prior relative order), writing back only the ones whose
    /// priority actually changed.
    async fn renumber(&self, user_from: &AccountRef) -> Result<(), AgreementError> {
        let mut accepted = self.store.accepted_outbound(user_from).await?;
        accepted.sort_by_key(|a| a.transfer_priority.unwrap_or(i32::MAX));

        for (index, agreement) in accepted.iter_mut().enumerate() {
            let new_priority = Some(index as i32);
            if agreement.transfer_priority != new_priority {
                agreement.transfer_priority = new_priority;
                self.store.update(agreement).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Mutex;

    struct FixedClock(DateTime<Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct FakeRepository {
        agreements: Mutex<Vec<TradeAgreement>>,
        known_accounts: Vec<AccountRef>,
    }

    #[async_trait]
    impl AgreementRepository for FakeRepository {
        async fn insert(&self, mut agreement: TradeAgreement) -> Result<TradeAgreement, StoreError> {
            let mut agreements = self.agreements.lock().unwrap();
            agreement.id = agreements.len() as i64 + 1;
            agreements.push(agreement.clone());
            Ok(agreement)
        }

        async fn find_by_public_id(&self, public_id: Uuid) -> Result<Option<TradeAgreement>, StoreError> {
            Ok(self.agreements.lock().unwrap().iter().find(|a| a.public_id == public_id).cloned())
        }

        async fn update(&self, agreement: &TradeAgreement) -> Result<(), StoreError> {
            let mut agreements = self.agreements.lock().unwrap();
            if let Some(existing) = agreements.iter_mut().find(|a| a.public_id == agreement.public_id) {
                *existing = agreement.clone();
            }
            Ok(())
        }

        async fn max_priority(&self, user_from: &AccountRef) -> Result<Option<i32>, StoreError> {
            Ok(self
                .agreements
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.user_from == *user_from && matches!(a.state, AgreementState::Accepted))
                .filter_map(|a| a.transfer_priority)
                .max())
        }

        async fn accepted_outbound(&self, user_from: &AccountRef) -> Result<Vec<TradeAgreement>, StoreError> {
            Ok(self
                .agreements
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.user_from == *user_from && matches!(a.state, AgreementState::Accepted))
                .cloned()
                .collect())
        }

        async fn account_exists(&self, subject: &AccountRef) -> Result<bool, StoreError> {
            Ok(self.known_accounts.contains(subject))
        }
    }

    fn propose_request(from: &str, to: &str) -> ProposeAgreement {
        ProposeAgreement {
            proposer: AccountRef::new(from),
            user_from: AccountRef::new(from),
            user_to: AccountRef::new(to),
            date_from: Utc::now().date_naive(),
            date_to: Utc::now().date_naive() + Duration::days(30),
            facility_gsrn: vec![],
            technologies: vec![],
            amount: Some(1000),
            unit: Some(Unit::Wh),
            amount_percent: None,
            limit_to_consumption: false,
            proposal_note: None,
            reference: None,
        }
    }

    #[tokio::test]
    async fn propose_rejects_self_agreement() {
        let repo = FakeRepository { agreements: Mutex::new(vec![]), known_accounts: vec![] };
        let clock = FixedClock(Utc::now());
        let manager = AgreementManager::new(&repo, &clock);

        let err = manager.propose(propose_request("a", "a")).await.unwrap_err();
        assert!(matches!(err, AgreementError::InvalidProposal(_)));
    }

    #[tokio::test]
    async fn propose_rejects_missing_counterpart() {
        let repo = FakeRepository { agreements: Mutex::new(vec![]), known_accounts: vec![] };
        let clock = FixedClock(Utc::now());
        let manager = AgreementManager::new(&repo, &clock);

        let err = manager.propose(propose_request("a", "b")).await.unwrap_err();
        assert!(matches!(err, AgreementError::CounterpartUnavailable));
    }

    #[tokio::test]
    async fn accept_assigns_next_priority() {
        let repo = FakeRepository {
            agreements: Mutex::new(vec![]),
            known_accounts: vec![AccountRef::new("a"), AccountRef::new("b")],
        };
        let clock = FixedClock(Utc::now());
        let manager = AgreementManager::new(&repo, &clock);

        let proposed = manager.propose(propose_request("a", "b")).await.unwrap();
        let accepted = manager
            .accept(&AccountRef::new("b"), proposed.public_id, AcceptOverrides::default())
            .await
            .unwrap();

        assert!(matches!(accepted.state, AgreementState::Accepted));
        assert_eq!(accepted.transfer_priority, Some(0));
    }

    #[tokio::test]
    async fn accept_rejects_acceptance_by_proposer() {
        let repo = FakeRepository {
            agreements: Mutex::new(vec![]),
            known_accounts: vec![AccountRef::new("a"), AccountRef::new("b")],
        };
        let clock = FixedClock(Utc::now());
        let manager = AgreementManager::new(&repo, &clock);

        let proposed = manager.propose(propose_request("a", "b")).await.unwrap();
        let err = manager
            .accept(&AccountRef::new("a"), proposed.public_id, AcceptOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgreementError::NotCounterpartOfProposal));
    }

    #[tokio::test]
    async fn cancel_renumbers_remaining_accepted_agreements() {
        let repo = FakeRepository {
            agreements: Mutex::new(vec![]),
            known_accounts: vec![AccountRef::new("a"), AccountRef::new("b"), AccountRef::new("c"), AccountRef::new("d"), AccountRef::new("e")],
        };
        let clock = FixedClock(Utc::now());
        let manager = AgreementManager::new(&repo, &clock);

        let mut public_ids = Vec::new();
        for to in ["b", "c", "d", "e"] {
            let proposed = manager.propose(propose_request("a", to)).await.unwrap();
            manager
                .accept(&AccountRef::new(to), proposed.public_id, AcceptOverrides::default())
                .await
                .unwrap();
            public_ids.push(proposed.public_id);
        }

        // priorities are now 0,1,2,3 in proposal order; cancel index 1.
        manager.cancel(&AccountRef::new("a"), public_ids[1]).await.unwrap();

        let mut remaining: Vec<_> = repo
            .agreements
            .lock()
            .unwrap()
            .iter()
            .filter(|a| matches!(a.state, AgreementState::Accepted))
            .map(|a| a.transfer_priority.unwrap())
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn set_priority_orders_named_then_closes_gaps_for_rest() {
        let repo = FakeRepository {
            agreements: Mutex::new(vec![]),
            known_accounts: vec![AccountRef::new("a"), AccountRef::new("b"), AccountRef::new("c"), AccountRef::new("d")],
        };
        let clock = FixedClock(Utc::now());
        let manager = AgreementManager::new(&repo, &clock);

        let mut public_ids = Vec::new();
        for to in ["b", "c", "d"] {
            let proposed = manager.propose(propose_request("a", to)).await.unwrap();
            manager
                .accept(&AccountRef::new(to), proposed.public_id, AcceptOverrides::default())
                .await
                .unwrap();
            public_ids.push(proposed.public_id);
        }

        // Reverse the first two, leave the third unnamed.
        manager
            .set_priority(&AccountRef::new("a"), &[public_ids[1], public_ids[0]])
            .await
            .unwrap();

        let agreements = repo.agreements.lock().unwrap();
        let by_public_id = |id: Uuid| agreements.iter().find(|a| a.public_id == id).unwrap();
        assert_eq!(by_public_id(public_ids[1]).transfer_priority, Some(0));
        assert_eq!(by_public_id(public_ids[0]).transfer_priority, Some(1));
        assert_eq!(by_public_id(public_ids[2]).transfer_priority, Some(2));
    }
}

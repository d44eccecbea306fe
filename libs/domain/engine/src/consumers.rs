//! The priority-ordered chain of GGO consumers the allocation engine drives
//! on receipt of a new GGO. Grounded on
//! `origin.processes.consume_ggos.GgoConsumer` and its subclasses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ggo_domain_models::common::AccountRef;
use ggo_domain_models::{Ggo, Meteringpoint, TradeAgreement};

use crate::ports::{Ports, StoreError};

/// One step in the priority chain: asked how much of a just-received GGO it
/// wants, then told to act on its share once the engine has clipped that
/// desire to what remains.
#[async_trait]
pub trait GgoConsumer: Send + Sync {
    /// A label for logging/tracing only.
    fn label(&self) -> String;

    /// How much of `ggo`'s remaining amount this consumer would take, before
    /// the engine clips it to what's actually left. `already_allocated` is
    /// how much of `ggo.amount` earlier consumers in this same pass have
    /// already claimed (`ggo.amount - remaining`). Zero means "skip me".
    async fn desired_amount(&self, ggo: &Ggo, already_allocated: i64, ports: &Ports<'_>) -> Result<i64, StoreError>;

    /// Apply this consumer's share (already clipped by the engine) to the
    /// in-progress composer.
    async fn consume(
        &self,
        amount: i64,
        composer: &mut crate::composer::Composer<'_>,
    ) -> Result<(), crate::composer::ComposerError>;
}

/// Retires `ggo` against one consumption meteringpoint's unmet measurement,
/// up to that meteringpoint's remaining capacity for the interval.
pub struct RetiringConsumer {
    pub meteringpoint: Meteringpoint,
}

#[async_trait]
impl GgoConsumer for RetiringConsumer {
    fn label(&self) -> String {
        format!("retire:{}", self.meteringpoint.gsrn)
    }

    async fn desired_amount(&self, ggo: &Ggo, _already_allocated: i64, ports: &Ports<'_>) -> Result<i64, StoreError> {
        let measurement = ports
            .measurement
            .find(&self.meteringpoint.subject, &self.meteringpoint.gsrn, ggo.begin)
            .await?;
        let Some(measurement) = measurement else {
            return Ok(0);
        };
        if measurement.sector != ggo.sector {
            return Ok(0);
        }

        let retired = ports
            .ggo
            .total_retired_amount(&self.meteringpoint.subject, &self.meteringpoint.gsrn, measurement.id)
            .await?;
        Ok((measurement.amount - retired).max(0))
    }

    async fn consume(
        &self,
        amount: i64,
        composer: &mut crate::composer::Composer<'_>,
    ) -> Result<(), crate::composer::ComposerError> {
        if amount > 0 {
            composer.add_retire(self.meteringpoint.clone(), amount).await?;
        }
        Ok(())
    }
}

/// Transfers `ggo` to one accepted outbound agreement's recipient, up to
/// whatever the agreement still permits for the interval.
pub struct AgreementConsumer {
    pub agreement: TradeAgreement,
}

impl AgreementConsumer {
    async fn transferred_so_far(&self, ggo: &Ggo, ports: &Ports<'_>) -> Result<i64, StoreError> {
        ports
            .transaction
            .total_transferred(&self.agreement.user_from, &self.agreement.transfer_reference(), ggo.begin)
            .await
    }

    /// The raw ceiling on this agreement's transfer for `ggo`, before
    /// netting out what's already been transferred under it. Percentage
    /// agreements are additionally capped by a fixed amount if one is also
    /// set (the percentage-plus-ceiling case).
    fn raw_cap(&self, ggo: &Ggo) -> i64 {
        match self.agreement.amount_percent {
            Some(percent) => {
                let percent_cap = (ggo.amount * percent as i64) / 100;
                match self.agreement.calculated_amount() {
                    Some(fixed) => percent_cap.min(fixed),
                    None => percent_cap,
                }
            }
            None => self.agreement.calculated_amount().unwrap_or(0),
        }
    }
}

#[async_trait]
impl GgoConsumer for AgreementConsumer {
    fn label(&self) -> String {
        format!("agreement:{}", self.agreement.transfer_reference())
    }

    async fn desired_amount(&self, ggo: &Ggo, _already_allocated: i64, ports: &Ports<'_>) -> Result<i64, StoreError> {
        let transferred = self.transferred_so_far(ggo, ports).await?;
        let cap = self.raw_cap(ggo) - transferred;
        Ok(cap.min(ggo.amount).max(0))
    }

    async fn consume(
        &self,
        amount: i64,
        composer: &mut crate::composer::Composer<'_>,
    ) -> Result<(), crate::composer::ComposerError> {
        if amount > 0 {
            composer.add_transfer(
                self.agreement.user_to.clone(),
                amount,
                Some(self.agreement.transfer_reference()),
            )?;
        }
        Ok(())
    }
}

/// An `AgreementConsumer` further capped by the recipient's own unmet
/// consumption: never transfers more than the recipient still needs to
/// retire across their own retire-eligible facilities, net of what earlier
/// consumers in this same pass have already claimed and what the recipient
/// already holds in storage at the same instant.
pub struct AgreementLimitedToConsumptionConsumer {
    pub agreement: TradeAgreement,
    pub sector: String,
}

impl AgreementLimitedToConsumptionConsumer {
    /// Constructed directly with the agreement and sector; unlike the
    /// original, this does not also thread a storage handle through the
    /// constructor; `desired_amount`'s `ports` argument is always the one
    /// live for the call.
    pub fn new(agreement: TradeAgreement, sector: String) -> Self {
        AgreementLimitedToConsumptionConsumer { agreement, sector }
    }

    async fn recipient_unmet_consumption(&self, ggo: &Ggo, ports: &Ports<'_>) -> Result<i64, StoreError> {
        let facilities = ports
            .meteringpoint
            .eligible_to_retire(&self.agreement.user_to, &self.sector)
            .await?;

        let mut total = 0i64;
        for facility in &facilities {
            let measurement = ports
                .measurement
                .find(&facility.subject, &facility.gsrn, ggo.begin)
                .await?;
            let Some(measurement) = measurement else { continue };
            if measurement.sector != ggo.sector {
                continue;
            }
            let retired = ports
                .ggo
                .total_retired_amount(&facility.subject, &facility.gsrn, measurement.id)
                .await?;
            total += (measurement.amount - retired).max(0);
        }
        Ok(total)
    }
}

#[async_trait]
impl GgoConsumer for AgreementLimitedToConsumptionConsumer {
    fn label(&self) -> String {
        format!("agreement-limited:{}", self.agreement.transfer_reference())
    }

    async fn desired_amount(&self, ggo: &Ggo, already_allocated: i64, ports: &Ports<'_>) -> Result<i64, StoreError> {
        let inner = AgreementConsumer { agreement: self.agreement.clone() };
        let remaining = inner.desired_amount(ggo, already_allocated, ports).await?;
        if remaining <= 0 {
            return Ok(0);
        }

        let unmet = self.recipient_unmet_consumption(ggo, ports).await?;
        let already_stored = ports.ggo.total_stored_amount(&self.agreement.user_to, ggo.begin).await?;

        let desired = unmet - already_allocated - already_stored;
        Ok(desired.min(ggo.amount.min(remaining)).max(0))
    }

    async fn consume(
        &self,
        amount: i64,
        composer: &mut crate::composer::Composer<'_>,
    ) -> Result<(), crate::composer::ComposerError> {
        if amount > 0 {
            composer.add_transfer(
                self.agreement.user_to.clone(),
                amount,
                Some(self.agreement.transfer_reference()),
            )?;
        }
        Ok(())
    }
}

/// Builds the full priority-ordered consumer chain for a just-received GGO:
/// the owner's own retire-eligible facilities first (by `retiring_priority`
/// ascending), then their accepted outbound agreements eligible for this
/// GGO's issuing facility and technology (by `transfer_priority`
/// ascending).
pub async fn build_consumer_chain(
    ggo: &Ggo,
    ports: &Ports<'_>,
) -> Result<Vec<Box<dyn GgoConsumer>>, StoreError> {
    let mut chain: Vec<Box<dyn GgoConsumer>> = Vec::new();

    let mut facilities = ports.meteringpoint.eligible_to_retire(&ggo.subject, &ggo.sector).await?;
    facilities.sort_by_key(|f| f.retiring_priority.unwrap_or(i32::MAX));
    for meteringpoint in facilities {
        chain.push(Box::new(RetiringConsumer { meteringpoint }));
    }

    let agreements = ports
        .agreement
        .eligible_outbound(
            &ggo.subject,
            ggo.begin,
            ggo.issue_gsrn.as_deref(),
            ggo.tech_code.as_deref(),
            ggo.fuel_code.as_deref(),
        )
        .await?;
    for agreement in agreements {
        if agreement.limit_to_consumption {
            chain.push(Box::new(AgreementLimitedToConsumptionConsumer::new(
                agreement,
                ggo.sector.clone(),
            )));
        } else {
            chain.push(Box::new(AgreementConsumer { agreement }));
        }
    }

    Ok(chain)
}

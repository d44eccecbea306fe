//! The allocation engine: on receipt of a new GGO, drives the priority chain
//! of consumers, clipping each one's desire to what remains, and compiles
//! the result into one batch. Grounded on
//! `origin.processes.consume_ggos.GgoConsumerController.consume_ggo`.

use std::future::Future;
use std::pin::Pin;

use tracing::instrument;

use ggo_domain_models::Ggo;

use crate::composer::{ComposedBatch, Composer, ComposerError};
use crate::consumers::build_consumer_chain;
use crate::ports::Ports;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Composer(#[from] ComposerError),
    #[error("storage error: {0}")]
    Store(#[from] crate::ports::StoreError),
}

/// Stages (but does not persist) the result of consuming `ggo` against its
/// owner's priority chain of retire-eligible facilities and accepted
/// outbound agreements, stopping as soon as the GGO's amount is fully
/// accounted for. Returns `Err(Composer(Empty))` when every consumer
/// declined — callers that treat that as "nothing to do" should match on
/// it explicitly (see `allocate_on_receive`).
#[instrument(skip(ports), fields(ggo = %ggo.public_id, amount = ggo.amount))]
pub async fn consume_ggo(
    ggo: Ggo,
    batch_id: Option<i64>,
    ports: &Ports<'_>,
) -> Result<ComposedBatch, EngineError> {
    let chain = build_consumer_chain(&ggo, ports).await?;

    let mut composer = Composer::new(ggo, ports)?;

    for consumer in &chain {
        let remaining = composer.remaining_amount();
        if remaining <= 0 {
            break;
        }
        // `total_amount` is what earlier consumers in this pass have already
        // claimed (transfers + retires queued so far), recomputed fresh each
        // iteration since the previous consumer may have just added to it.
        let already_allocated = composer.total_amount();

        let desired = consumer.desired_amount(composer.ggo_ref(), already_allocated, ports).await?;
        let amount = desired.min(remaining);
        if amount <= 0 {
            continue;
        }

        tracing::debug!(consumer = %consumer.label(), amount, "allocating to consumer");
        consumer.consume(amount, &mut composer).await?;
    }

    Ok(composer.build_batch(batch_id)?)
}

/// The entry point invoked whenever a GGO transitions to `stored = true` in
/// some account: a fresh issuance from a measurement, or a transfer child
/// that just committed elsewhere. Stages a batch via `consume_ggo`,
/// persists it through `ports.writer`, and recurses into every transferred
/// child that landed in a different account. An `Empty` composer result
/// (every consumer declined) is not an error: the GGO simply stays stored.
///
/// Runs inside a single unit of work per §5 — `ports` is expected to be
/// backed by one open database transaction for the whole call tree,
/// including the recursive cascade.
pub fn allocate_on_receive<'a>(
    ggo: Ggo,
    ports: &'a Ports<'a>,
) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'a>> {
    Box::pin(async move {
        let owner = ggo.subject.clone();
        let parent_public_id = ggo.public_id;

        let composed = match consume_ggo(ggo, None, ports).await {
            Ok(composed) => composed,
            Err(EngineError::Composer(ComposerError::Empty)) => {
                tracing::debug!(ggo = %parent_public_id, "no eligible consumers, ggo remains stored");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let parent = composed
            .pool
            .get(&parent_public_id)
            .expect("composer always re-inserts the parent into the pool")
            .clone();
        // `pool` holds the parent plus every GGO the composer minted this
        // round — transfer recipients and retire-split children alike — so
        // the writer persists the whole lineage in one go, not just the
        // transfer targets.
        let children: Vec<Ggo> = composed
            .pool
            .values()
            .filter(|candidate| candidate.public_id != parent_public_id)
            .cloned()
            .collect();

        let persisted = ports.writer.persist_batch(&parent, &composed.batch, &children).await?;

        for persisted_child in persisted {
            if persisted_child.subject != owner {
                allocate_on_receive(persisted_child, ports).await?;
            }
        }

        Ok(())
    })
}

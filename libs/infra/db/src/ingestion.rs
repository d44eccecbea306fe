// [libs/infra/db/src/ingestion.rs]
/*!
 * APARATO: MEASUREMENT INGESTION ENTRY POINT
 * CLASIFICACIÓN: APPLICATION ORCHESTRATION (ESTRATO L3)
 * RESPONSABILIDAD: TRADUCIR UNA MEDICIÓN PUBLICADA EN EMISIÓN + CASCADA
 *
 * El único punto de entrada desde fuera del ledger: publica una medición
 * (§4.5) y, si el punto de medición es de producción, acuña un GGO y lo
 * empuja a través de `allocate_on_receive` — todo dentro de una sola
 * `LedgerUnitOfWork`, para que la recursión de la cascada nunca salga de la
 * transacción `BEGIN IMMEDIATE` que la abrió.
 */

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use ggo_domain_engine::ports::{Clock, Ports};
use ggo_domain_engine::{allocate_on_receive, EngineError};
use ggo_domain_models::common::AccountRef;
use ggo_domain_models::Ggo;

use crate::client::LedgerClient;
use crate::errors::DbError;
use crate::repositories::{GgoRepository, LedgerUnitOfWork, MeasurementRepository, MeteringpointRepository};

#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("measurement amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("meteringpoint {0} is not registered")]
    UnknownMeteringpoint(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Publishes a measurement for `gsrn` and, when it belongs to a production
/// meteringpoint, mints the corresponding GGO and runs it through the
/// allocation engine. Commits the unit of work on success, rolls it back on
/// any failure so a partially-staged cascade never reaches disk.
#[instrument(skip(client, expire_after), fields(gsrn, amount))]
pub async fn ingest_measurement(
    client: &LedgerClient,
    owner: AccountRef,
    gsrn: &str,
    sector: &str,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    amount: i64,
    expire_after: Duration,
) -> Result<(), IngestionError> {
    if amount <= 0 {
        return Err(IngestionError::NonPositiveAmount(amount));
    }

    let uow = LedgerUnitOfWork::begin(client).await?;

    let result = ingest_inside_unit_of_work(&uow, owner, gsrn, sector, begin, end, amount, expire_after).await;

    match result {
        Ok(()) => {
            uow.commit().await?;
            Ok(())
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(error = %rollback_err, "rollback after failed ingestion also failed");
            }
            Err(err)
        }
    }
}

async fn ingest_inside_unit_of_work(
    uow: &LedgerUnitOfWork,
    owner: AccountRef,
    gsrn: &str,
    sector: &str,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    amount: i64,
    expire_after: Duration,
) -> Result<(), IngestionError> {
    let meteringpoint = MeteringpointRepository::find_by_gsrn(uow.connection(), gsrn)
        .await?
        .ok_or_else(|| IngestionError::UnknownMeteringpoint(gsrn.to_string()))?;

    let measurement = MeasurementRepository::insert(uow.connection(), &owner, gsrn, sector, begin, end, amount).await?;
    info!(gsrn, amount, "measurement published");

    if !meteringpoint.is_producer() {
        return Ok(());
    }

    let now = uow.now();
    let ggo = Ggo::from_measurement(&measurement, &meteringpoint, now, expire_after);
    let id = GgoRepository::insert(uow.connection(), &ggo).await?;
    let mut stored_ggo = ggo;
    stored_ggo.id = Some(id);

    let ports = Ports {
        ggo: uow,
        measurement: uow,
        meteringpoint: uow,
        agreement: uow,
        transaction: uow,
        writer: uow,
        clock: uow,
    };

    allocate_on_receive(stored_ggo, &ports).await?;
    Ok(())
}

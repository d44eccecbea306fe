// [libs/infra/db/src/repositories/unit_of_work.rs]
/*!
 * APARATO: LEDGER UNIT OF WORK
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: FRONTERA TRANSACCIONAL ÚNICA PARA EL MOTOR DE ASIGNACIÓN
 *
 * Envuelve una única `libsql::Connection` bajo una transacción SQLite
 * `BEGIN IMMEDIATE`/`COMMIT` explícita e implementa sobre ella, directamente,
 * los puertos que `ggo-domain-engine` y `ggo-domain-agreements` consumen.
 * Esto asegura que toda una llamada a `allocate_on_receive` (incluida su
 * recursión en cascada) y cada operación del ciclo de vida de acuerdos
 * corran dentro de una sola transacción física — la garantía de
 * "lectura de las propias escrituras" exigida por §5.
 *
 * `BEGIN IMMEDIATE` adquiere el candado de escritura de inmediato en lugar
 * de esperar a la primera sentencia mutante, así que una segunda unidad de
 * trabajo concurrente contra el mismo GGO padre falla al intentar abrir su
 * propia transacción en lugar de fallar a mitad de camino.
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;

use ggo_domain_agreements::StoreError as AgreementStoreError;
use ggo_domain_engine::ports::StoreError as EngineStoreError;
use ggo_domain_models::common::AccountRef;
use ggo_domain_models::{Batch, Ggo, Measurement, Meteringpoint, TradeAgreement};

use crate::client::LedgerClient;
use crate::errors::DbError;
use crate::repositories::{AgreementRepository, BatchRepository, GgoRepository, MeasurementRepository, MeteringpointRepository, TransactionRepository};

pub struct LedgerUnitOfWork {
    connection: libsql::Connection,
}

impl LedgerUnitOfWork {
    #[instrument(skip(client))]
    pub async fn begin(client: &LedgerClient) -> Result<Self, DbError> {
        let connection = client.get_connection()?;
        connection.execute("BEGIN IMMEDIATE", ()).await?;
        Ok(Self { connection })
    }

    pub async fn commit(self) -> Result<(), DbError> {
        self.connection.execute("COMMIT", ()).await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), DbError> {
        self.connection.execute("ROLLBACK", ()).await?;
        Ok(())
    }

    /// Escape hatch for callers (the measurement ingestion entry point, the
    /// integration test harness) that need a repository method not named by
    /// either port trait.
    pub fn connection(&self) -> &libsql::Connection {
        &self.connection
    }
}

#[async_trait]
impl ggo_domain_engine::ports::GgoStore for LedgerUnitOfWork {
    async fn total_retired_amount(&self, owner: &AccountRef, gsrn: &str, measurement_id: i64) -> Result<i64, EngineStoreError> {
        Ok(GgoRepository::total_retired_amount(&self.connection, owner, gsrn, measurement_id).await?)
    }

    async fn total_stored_amount(&self, owner: &AccountRef, begin: DateTime<Utc>) -> Result<i64, EngineStoreError> {
        Ok(GgoRepository::total_stored_amount(&self.connection, owner, begin).await?)
    }
}

#[async_trait]
impl ggo_domain_engine::ports::MeasurementStore for LedgerUnitOfWork {
    async fn find(&self, owner: &AccountRef, gsrn: &str, begin: DateTime<Utc>) -> Result<Option<Measurement>, EngineStoreError> {
        Ok(MeasurementRepository::find(&self.connection, owner, gsrn, begin).await?)
    }
}

#[async_trait]
impl ggo_domain_engine::ports::MeteringpointStore for LedgerUnitOfWork {
    async fn eligible_to_retire(&self, owner: &AccountRef, sector: &str) -> Result<Vec<Meteringpoint>, EngineStoreError> {
        Ok(MeteringpointRepository::eligible_to_retire(&self.connection, owner, sector).await?)
    }
}

#[async_trait]
impl ggo_domain_engine::ports::AgreementStore for LedgerUnitOfWork {
    async fn eligible_outbound(
        &self,
        owner: &AccountRef,
        begin: DateTime<Utc>,
        issue_gsrn: Option<&str>,
        tech_code: Option<&str>,
        fuel_code: Option<&str>,
    ) -> Result<Vec<TradeAgreement>, EngineStoreError> {
        Ok(AgreementRepository::eligible_outbound(&self.connection, owner, begin, issue_gsrn, tech_code, fuel_code).await?)
    }
}

#[async_trait]
impl ggo_domain_engine::ports::TransactionStore for LedgerUnitOfWork {
    async fn total_transferred(&self, sender: &AccountRef, reference: &str, begin: DateTime<Utc>) -> Result<i64, EngineStoreError> {
        Ok(TransactionRepository::total_transferred(&self.connection, sender, reference, begin).await?)
    }
}

#[async_trait]
impl ggo_domain_engine::ports::LedgerWriter for LedgerUnitOfWork {
    async fn persist_batch(&self, parent: &Ggo, batch: &Batch, children: &[Ggo]) -> Result<Vec<Ggo>, EngineStoreError> {
        Ok(BatchRepository::persist(&self.connection, parent, batch, children).await?)
    }
}

impl ggo_domain_engine::ports::Clock for LedgerUnitOfWork {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
impl ggo_domain_agreements::AgreementRepository for LedgerUnitOfWork {
    async fn insert(&self, agreement: TradeAgreement) -> Result<TradeAgreement, AgreementStoreError> {
        let id = AgreementRepository::insert(&self.connection, &agreement).await?;
        Ok(TradeAgreement { id, ..agreement })
    }

    async fn find_by_public_id(&self, public_id: uuid::Uuid) -> Result<Option<TradeAgreement>, AgreementStoreError> {
        Ok(AgreementRepository::find_by_public_id(&self.connection, public_id).await?)
    }

    async fn update(&self, agreement: &TradeAgreement) -> Result<(), AgreementStoreError> {
        Ok(AgreementRepository::update(&self.connection, agreement).await?)
    }

    async fn max_priority(&self, user_from: &AccountRef) -> Result<Option<i32>, AgreementStoreError> {
        Ok(AgreementRepository::max_priority(&self.connection, user_from).await?)
    }

    async fn accepted_outbound(&self, user_from: &AccountRef) -> Result<Vec<TradeAgreement>, AgreementStoreError> {
        Ok(AgreementRepository::accepted_outbound(&self.connection, user_from).await?)
    }

    async fn account_exists(&self, subject: &AccountRef) -> Result<bool, AgreementStoreError> {
        Ok(AgreementRepository::account_exists(&self.connection, subject).await?)
    }
}

impl ggo_domain_agreements::Clock for LedgerUnitOfWork {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

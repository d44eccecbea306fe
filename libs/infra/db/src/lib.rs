// [libs/infra/db/src/lib.rs]
/*!
 * APARATO: GGO INFRASTRUCTURE DATABASE CRATE
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: ADAPTADOR LIBSQL PARA LOS PUERTOS DEL DOMINIO GGO
 *
 * Este crate es la única capa del workspace que sabe que el ledger vive en
 * SQLite/Turso. `ggo-domain-engine` y `ggo-domain-agreements` no importan
 * nada de aquí — al revés, aquí se importan sus puertos (`ports::*`,
 * `AgreementRepository`) y se implementan sobre `LedgerUnitOfWork`.
 */

pub mod client;
pub mod config;
pub mod errors;
pub mod ingestion;
pub mod mapping;
pub mod repositories;
pub mod schema;

pub use client::LedgerClient;
pub use config::EngineConfig;
pub use errors::DbError;
pub use ingestion::{ingest_measurement, IngestionError};
pub use repositories::{
    AgreementRepository, BatchRepository, GgoRepository, LedgerUnitOfWork, MeasurementRepository,
    MeteringpointRepository, TechnologyRepository, TransactionRepository,
};
pub use schema::apply_ledger_schema;

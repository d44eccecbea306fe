// [libs/infra/db/src/errors.rs]
/*!
 * =================================================================
 * APARATO: DATABASE ERROR CATALOG (V180.7 - SOBERANO)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CONFIGURATION AWARENESS: Inyecta 'ConfigurationError' para distinguir
 *    entre fallos de red y variables de entorno vacías (GitHub Actions).
 * 2. PANOPTICON COMPLIANCE: Formatea los mensajes con prefijos de estrato
 *    para su renderizado cromático en el Dashboard Zenith.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Error de enlace físico o de red con el cluster de Turso.
    #[error("[L3_DB_NET_FAULT]: DATABASE_UPLINK_SEVERED -> {0}")]
    ConnectionError(String),

    /// Fallo en la configuración del entorno (Variables vacías o malformadas).
    #[error("[L3_DB_CONFIG_FAULT]: STRATEGIC_ENV_VOID -> {0}")]
    ConfigurationError(String),

    /// Error de sintaxis o ejecución devuelto por el motor libSQL.
    #[error("[L3_DB_QUERY_FAULT]: SQL_QUERY_REJECTED -> {0}")]
    QueryError(#[from] libsql::Error),

    /// Fallo en la transformación de tipos entre SQLite y el Dominio Rust.
    #[error("[L3_DB_MAPPING_FAULT]: DATA_MAPPING_VIOLATION -> {0}")]
    MappingError(String),

    // --- ESTRATO DEL LEDGER GGO (L2/L3) ---

    /// El GGO solicitado no existe en las tablas activas.
    #[error("[L3_LEDGER_FAULT]: GGO_NOT_FOUND")]
    GgoNotFound,

    /// La medición (measurement) solicitada no existe.
    #[error("[L3_LEDGER_FAULT]: MEASUREMENT_NOT_FOUND")]
    MeasurementNotFound,

    /// El punto de medición (meteringpoint) solicitado no existe.
    #[error("[L3_LEDGER_FAULT]: METERINGPOINT_NOT_FOUND")]
    MeteringpointNotFound,

    /// El acuerdo de comercio (trade agreement) solicitado no existe.
    #[error("[L3_LEDGER_FAULT]: AGREEMENT_NOT_FOUND")]
    AgreementNotFound,

    /// Conflicto al insertar un lote: ya existe una transacción para el GGO padre.
    #[error("[L3_LEDGER_FAULT]: BATCH_CONFLICT -> parent GGO already spent")]
    BatchConflict,

    /// La medición ya fue ingerida previamente (violación de unicidad gsrn+begin).
    #[error("[L3_LEDGER_FAULT]: DUPLICATE_MEASUREMENT")]
    DuplicateMeasurement,

    /// El GGO no se encuentra en un estado apto para la operación solicitada.
    #[error("[L3_LEDGER_FAULT]: INVALID_GGO_STATE")]
    InvalidState,

    /// Error al comprometer cambios en una secuencia multi-tabla (batch + children).
    #[error("[L3_DB_FAULT]: TRANSACTION_COLLAPSE -> {0}")]
    TransactionError(String),
}

/// Opaque conversion into the allocation engine's storage-port error: the
/// engine only needs to know storage failed, not which stratum of the
/// database layer raised it.
impl From<DbError> for ggo_domain_engine::StoreError {
    fn from(source: DbError) -> Self {
        ggo_domain_engine::StoreError::Backend(source.to_string())
    }
}

/// Same opaque conversion for the agreement manager's storage port.
impl From<DbError> for ggo_domain_agreements::StoreError {
    fn from(source: DbError) -> Self {
        ggo_domain_agreements::StoreError::Backend(source.to_string())
    }
}

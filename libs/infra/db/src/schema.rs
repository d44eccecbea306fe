/**
 * =================================================================
 * APARATO: LEDGER SCHEMA (V151.0 - GGO STRATA)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL E IDEMPOTENCIA TOTAL
 *
 * VISION HIPER-HOLÍSTICA:
 * 1. GGO ENTITIES: Meteringpoints, Measurements, Ggos, TradeAgreements,
 *    LedgerBatches/Transactions/SplitTargets, Technologies.
 * 2. IDEMPOTENCIA: Gestión de errores para migraciones en caliente en Turso.
 * 3. PERFORMANCE: Índices de aceleración para las consultas del motor
 *    de asignación (§2.2).
 * =================================================================
 */

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument, warn};

/**
 * ESTRATO 1: SOLIDIFICACIÓN (Génesis de Tablas)
 * Define las entidades base del ledger de Garantías de Origen.
 */
const TACTICAL_TABLES: &[(&str, &str)] = &[
    ("TABLE_TECHNOLOGY", r#"
        CREATE TABLE IF NOT EXISTS technology (
            tech_code TEXT NOT NULL,
            fuel_code TEXT NOT NULL,
            label TEXT NOT NULL,
            PRIMARY KEY (tech_code, fuel_code)
        );
    "#),
    ("TABLE_METERINGPOINT", r#"
        CREATE TABLE IF NOT EXISTS meteringpoint (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            public_id TEXT NOT NULL UNIQUE,
            gsrn TEXT NOT NULL UNIQUE,
            meteringpoint_type TEXT NOT NULL,
            sector TEXT NOT NULL,
            tech_code TEXT,
            fuel_code TEXT,
            name TEXT NOT NULL DEFAULT '',
            retiring_priority INTEGER,
            subject TEXT NOT NULL
        );
    "#),
    ("TABLE_METERINGPOINT_TAG", r#"
        CREATE TABLE IF NOT EXISTS meteringpoint_tag (
            meteringpoint_id INTEGER NOT NULL REFERENCES meteringpoint(id),
            tag TEXT NOT NULL,
            PRIMARY KEY (meteringpoint_id, tag)
        );
    "#),
    ("TABLE_MEASUREMENT", r#"
        CREATE TABLE IF NOT EXISTS measurement (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            gsrn TEXT NOT NULL,
            subject TEXT NOT NULL,
            sector TEXT NOT NULL,
            begin_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            amount INTEGER NOT NULL,
            UNIQUE (gsrn, begin_time)
        );
    "#),
    ("TABLE_GGO", r#"
        CREATE TABLE IF NOT EXISTS ggo (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            public_id TEXT NOT NULL UNIQUE,
            issue_time TEXT NOT NULL,
            expire_time TEXT NOT NULL,
            begin_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            amount INTEGER NOT NULL,
            sector TEXT NOT NULL,
            parent_public_id TEXT,
            measurement_id INTEGER UNIQUE REFERENCES measurement(id),
            subject TEXT NOT NULL,
            tech_code TEXT,
            fuel_code TEXT,
            issued INTEGER NOT NULL DEFAULT 0,
            stored INTEGER NOT NULL DEFAULT 0,
            retired INTEGER NOT NULL DEFAULT 0,
            issue_gsrn TEXT,
            retire_gsrn TEXT,
            retire_measurement_id INTEGER
        );
    "#),
    ("TABLE_LEDGER_BATCH", r#"
        CREATE TABLE IF NOT EXISTS ledger_batch (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'PENDING',
            submitted TEXT,
            user_subject TEXT NOT NULL,
            handle TEXT,
            poll_count INTEGER NOT NULL DEFAULT 0
        );
    "#),
    ("TABLE_LEDGER_TRANSACTION", r#"
        CREATE TABLE IF NOT EXISTS ledger_transaction (
            batch_id INTEGER NOT NULL REFERENCES ledger_batch(id),
            tx_order INTEGER NOT NULL,
            kind TEXT NOT NULL,
            parent_ggo_id TEXT NOT NULL UNIQUE,
            retire_meteringpoint_gsrn TEXT,
            retire_measurement_id INTEGER,
            retire_begin TEXT,
            PRIMARY KEY (batch_id, tx_order)
        );
    "#),
    ("TABLE_SPLIT_TARGET", r#"
        CREATE TABLE IF NOT EXISTS split_target (
            batch_id INTEGER NOT NULL,
            tx_order INTEGER NOT NULL,
            child_ggo_id TEXT NOT NULL UNIQUE,
            reference TEXT,
            FOREIGN KEY (batch_id, tx_order) REFERENCES ledger_transaction(batch_id, tx_order)
        );
    "#),
    ("TABLE_TRADE_AGREEMENT", r#"
        CREATE TABLE IF NOT EXISTS trade_agreement (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            public_id TEXT NOT NULL UNIQUE,
            created TEXT NOT NULL,
            declined TEXT,
            cancelled TEXT,
            user_proposed TEXT NOT NULL,
            user_from TEXT NOT NULL,
            user_to TEXT NOT NULL,
            facility_gsrn TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL,
            date_from TEXT NOT NULL,
            date_to TEXT NOT NULL,
            technologies TEXT NOT NULL DEFAULT '',
            reference TEXT,
            amount INTEGER,
            unit TEXT,
            amount_percent INTEGER,
            limit_to_consumption INTEGER NOT NULL DEFAULT 0,
            transfer_priority INTEGER,
            proposal_note TEXT
        );
    "#),
];

/**
 * ESTRATO 2: EVOLUCIÓN (Mutaciones de Columna)
 * Asegura que las tablas existentes se adapten a las nuevas capacidades
 * sin exigir una migración destructiva.
 */
const EVOLUTIONARY_STRATA: &[(&str, &str)] = &[
    ("METERINGPOINT_RETIRING_PRIORITY", "ALTER TABLE meteringpoint ADD COLUMN retiring_priority INTEGER"),
    ("GGO_ISSUE_GSRN", "ALTER TABLE ggo ADD COLUMN issue_gsrn TEXT"),
    ("AGREEMENT_PROPOSAL_NOTE", "ALTER TABLE trade_agreement ADD COLUMN proposal_note TEXT"),
    ("AGREEMENT_REFERENCE", "ALTER TABLE trade_agreement ADD COLUMN reference TEXT"),
];

/**
 * ESTRATO 3: ENDURECIMIENTO (Índices de Aceleración)
 * Cubre exactamente las consultas que el motor de asignación (§2.2) emite.
 */
const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("IDX_GGO_SUBJECT_BEGIN", "CREATE INDEX IF NOT EXISTS idx_ggo_subject_begin ON ggo(subject, begin_time, stored);"),
    ("IDX_GGO_PARENT", "CREATE INDEX IF NOT EXISTS idx_ggo_parent ON ggo(parent_public_id);"),
    ("IDX_GGO_RETIRE", "CREATE INDEX IF NOT EXISTS idx_ggo_retire ON ggo(retire_gsrn, retire_measurement_id);"),
    ("IDX_METERINGPOINT_SUBJECT", "CREATE INDEX IF NOT EXISTS idx_meteringpoint_subject_sector ON meteringpoint(subject, sector, meteringpoint_type);"),
    ("IDX_AGREEMENT_OUTBOUND", "CREATE INDEX IF NOT EXISTS idx_agreement_outbound ON trade_agreement(user_from, state, transfer_priority);"),
    ("IDX_MEASUREMENT_LOOKUP", "CREATE INDEX IF NOT EXISTS idx_measurement_gsrn_begin ON measurement(gsrn, begin_time);"),
];

/**
 * Ejecuta la secuencia maestra de sincronización del esquema estructural.
 *
 * # Errors:
 * Retorna error si alguna tabla base falla en solidificarse, indicando
 * un colapso en el enlace con Turso.
 */
#[instrument(skip(database_connection))]
pub async fn apply_ledger_schema(database_connection: &Connection) -> Result<()> {
    info!("🏗️ [SCHEMA_ENGINE]: Initiating ledger structural synchronization V151.0...");

    solidify_base_strata(database_connection).await?;
    execute_evolutionary_repair(database_connection).await?;
    harden_access_layer(database_connection).await?;

    info!("✅ [SCHEMA_ENGINE]: GGO Ledger V151.0 level and certified.");
    Ok(())
}

async fn solidify_base_strata(db: &Connection) -> Result<()> {
    for (identifier, sql) in TACTICAL_TABLES {
        debug!("  ↳ Solidifying: {}", identifier);
        db.execute(*sql, ()).await
            .with_context(|| format!("CRITICAL_SOLIDIFICATION_FAULT: {}", identifier))?;
    }
    Ok(())
}

async fn execute_evolutionary_repair(db: &Connection) -> Result<()> {
    for (identifier, sql) in EVOLUTIONARY_STRATA {
        match db.execute(*sql, ()).await {
            Ok(_) => info!("  🟢 [REPAIR_OK]: Applied evolutionary stratum {}", identifier),
            Err(e) => {
                let message = e.to_string();
                if message.contains("duplicate column name") {
                    debug!("  ⚪ [REPAIR_SKIP]: {} already level.", identifier);
                } else {
                    warn!("  ⚠️ [REPAIR_BYPASS]: {} check incomplete: {}", identifier, message);
                }
            }
        }
    }
    Ok(())
}

async fn harden_access_layer(db: &Connection) -> Result<()> {
    for (identifier, sql) in ACCELERATION_INDEXES {
        debug!("  ↳ Hardening: {}", identifier);
        db.execute(*sql, ()).await
            .with_context(|| format!("CRITICAL_HARDENING_FAULT: {}", identifier))?;
    }
    Ok(())
}

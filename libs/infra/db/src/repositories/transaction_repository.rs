// [libs/infra/db/src/repositories/transaction_repository.rs]
/*!
 * APARATO: TRANSACTION REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CONSULTA DE TOTALES TRANSFERIDOS POR REFERENCIA
 */

use chrono::{DateTime, Utc};
use libsql::{params, Connection};
use tracing::instrument;

use ggo_domain_models::common::AccountRef;

use crate::errors::DbError;
use crate::mapping::datetime_to_text;

pub struct TransactionRepository;

impl TransactionRepository {
    /// Sum of amounts `sender` has transferred under `reference` for the
    /// GGO interval starting at `begin`. Joins the split target that
    /// recorded the reference back through its owning batch to confirm the
    /// batch belongs to `sender`.
    #[instrument(skip(connection))]
    pub async fn total_transferred(
        connection: &Connection,
        sender: &AccountRef,
        reference: &str,
        begin: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let mut rows = connection
            .query(
                "SELECT COALESCE(SUM(child.amount), 0)
                 FROM split_target AS target
                 JOIN ggo AS child ON child.public_id = target.child_ggo_id
                 JOIN ledger_transaction AS tx
                    ON tx.batch_id = target.batch_id AND tx.tx_order = target.tx_order
                 JOIN ledger_batch AS batch ON batch.id = tx.batch_id
                 WHERE target.reference = ?1 AND batch.user_subject = ?2 AND child.begin_time = ?3",
                params![reference.to_string(), sender.0.clone(), datetime_to_text(begin)],
            )
            .await?;
        let row = rows.next().await?.ok_or(DbError::GgoNotFound)?;
        Ok(row.get(0)?)
    }
}

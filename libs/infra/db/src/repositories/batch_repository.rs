// [libs/infra/db/src/repositories/batch_repository.rs]
/*!
 * APARATO: BATCH REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: MATERIALIZACIÓN ATÓMICA DE LOTES DE ASIGNACIÓN
 *
 * Traduce un `ComposedBatch` (ya aplicado en memoria por
 * `Batch::on_begin`/`on_commit`) a filas concretas: un `ledger_batch`, sus
 * `ledger_transaction`s en orden, los `split_target` de la transacción de
 * división si la hubo, y los nuevos GGO insertados con su estado final ya
 * resuelto por el compositor. La restricción UNIQUE sobre
 * `ledger_transaction.parent_ggo_id` es el mecanismo de "doble gasto": un
 * GGO padre solo puede aparecer en una transacción en toda la vida del
 * ledger.
 */

use libsql::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use ggo_domain_models::transaction::TransactionKind;
use ggo_domain_models::{Batch, BatchState, Ggo};

use crate::errors::DbError;
use crate::mapping::datetime_to_text;
use crate::repositories::ggo_repository::GgoRepository;

pub struct BatchRepository;

impl BatchRepository {
    #[instrument(skip(connection, parent, batch, children))]
    pub async fn persist(
        connection: &Connection,
        parent: &Ggo,
        batch: &Batch,
        children: &[Ggo],
    ) -> Result<Vec<Ggo>, DbError> {
        let state_label = match batch.state {
            BatchState::Pending => "PENDING",
            BatchState::Submitted => "SUBMITTED",
            BatchState::Completed => "COMPLETED",
            BatchState::Declined => "DECLINED",
        };

        let mut batch_rows = connection
            .query(
                "INSERT INTO ledger_batch (created, state, submitted, user_subject, handle, poll_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING id",
                params![
                    datetime_to_text(batch.created),
                    state_label,
                    batch.submitted.map(datetime_to_text),
                    batch.user.0.clone(),
                    batch.handle.clone(),
                    batch.poll_count,
                ],
            )
            .await?;
        let batch_row = batch_rows
            .next()
            .await?
            .ok_or_else(|| DbError::MappingError("insert into ledger_batch did not return an id".into()))?;
        let batch_id: i64 = batch_row.get(0)?;

        let mut persisted_by_public_id: std::collections::HashMap<Uuid, Ggo> = std::collections::HashMap::new();

        for transaction in &batch.transactions {
            match &transaction.kind {
                TransactionKind::Split(split) => {
                    Self::insert_transaction_row(connection, batch_id, transaction.order, "SPLIT", split.parent_ggo_id, None, None, None)
                        .await?;

                    if split.parent_ggo_id == parent.public_id {
                        GgoRepository::mark_split(connection, parent.public_id).await?;
                    }

                    for target in &split.targets {
                        let child = children
                            .iter()
                            .find(|candidate| candidate.public_id == target.ggo_id)
                            .ok_or(DbError::GgoNotFound)?;
                        Self::insert_child(connection, child, &mut persisted_by_public_id).await?;

                        connection
                            .execute(
                                "INSERT INTO split_target (batch_id, tx_order, child_ggo_id, reference)
                                 VALUES (?1, ?2, ?3, ?4)",
                                params![batch_id, transaction.order, target.ggo_id.to_string(), target.reference.clone()],
                            )
                            .await?;
                    }
                }
                TransactionKind::Retire(retire) => {
                    Self::insert_transaction_row(
                        connection,
                        batch_id,
                        transaction.order,
                        "RETIRE",
                        retire.parent_ggo_id,
                        Some(&retire.meteringpoint_gsrn),
                        Some(retire.measurement_id),
                        Some(retire.begin),
                    )
                    .await?;

                    if retire.parent_ggo_id == parent.public_id {
                        GgoRepository::mark_retired(
                            connection,
                            parent.public_id,
                            &retire.meteringpoint_gsrn,
                            retire.measurement_id,
                        )
                        .await?;
                    } else {
                        // A split-created retire child: already carries its
                        // final retired state via `Ggo::create_child` plus
                        // `RetireTransaction::build`, so a plain insert
                        // suffices.
                        let child = children
                            .iter()
                            .find(|candidate| candidate.public_id == retire.parent_ggo_id)
                            .ok_or(DbError::GgoNotFound)?;
                        Self::insert_child(connection, child, &mut persisted_by_public_id).await?;
                    }
                }
            }
        }

        Ok(children
            .iter()
            .map(|child| persisted_by_public_id.get(&child.public_id).cloned().unwrap_or_else(|| child.clone()))
            .collect())
    }

    #[instrument(skip(connection))]
    #[allow(clippy::too_many_arguments)]
    async fn insert_transaction_row(
        connection: &Connection,
        batch_id: i64,
        tx_order: i32,
        kind: &str,
        parent_ggo_id: Uuid,
        retire_meteringpoint_gsrn: Option<&str>,
        retire_measurement_id: Option<i64>,
        retire_begin: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<(), DbError> {
        let insert_result = connection
            .execute(
                "INSERT INTO ledger_transaction (
                    batch_id, tx_order, kind, parent_ggo_id, retire_meteringpoint_gsrn,
                    retire_measurement_id, retire_begin
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    batch_id,
                    tx_order,
                    kind,
                    parent_ggo_id.to_string(),
                    retire_meteringpoint_gsrn,
                    retire_measurement_id,
                    retire_begin.map(datetime_to_text),
                ],
            )
            .await;

        match insert_result {
            Ok(_) => Ok(()),
            Err(libsql::Error::SqliteFailure(_, message)) if message.contains("UNIQUE") => {
                Err(DbError::BatchConflict)
            }
            Err(e) => Err(DbError::QueryError(e)),
        }
    }

    async fn insert_child(
        connection: &Connection,
        child: &Ggo,
        persisted: &mut std::collections::HashMap<Uuid, Ggo>,
    ) -> Result<(), DbError> {
        if persisted.contains_key(&child.public_id) {
            return Ok(());
        }
        let id = GgoRepository::insert(connection, child).await?;
        let mut with_id = child.clone();
        with_id.id = Some(id);
        persisted.insert(child.public_id, with_id);
        Ok(())
    }
}

// [libs/infra/db/src/repositories/measurement_repository.rs]
/*!
 * APARATO: MEASUREMENT REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DE LECTURAS PUBLICADAS POR PUNTO DE MEDICIÓN
 */

use chrono::{DateTime, Utc};
use libsql::{params, Connection};
use tracing::instrument;

use ggo_domain_models::common::AccountRef;
use ggo_domain_models::Measurement;

use crate::errors::DbError;
use crate::mapping::{datetime_to_text, text_to_datetime};

pub struct MeasurementRepository;

impl MeasurementRepository {
    #[instrument(skip(connection))]
    pub async fn find(
        connection: &Connection,
        owner: &AccountRef,
        gsrn: &str,
        begin: DateTime<Utc>,
    ) -> Result<Option<Measurement>, DbError> {
        let mut rows = connection
            .query(
                "SELECT id, gsrn, subject, sector, begin_time, end_time, amount
                 FROM measurement WHERE subject = ?1 AND gsrn = ?2 AND begin_time = ?3",
                params![owner.0.clone(), gsrn.to_string(), datetime_to_text(begin)],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::map_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Inserts a new published measurement. Rejects a duplicate `(gsrn,
    /// begin)` pair with `DbError::DuplicateMeasurement` rather than
    /// surfacing the raw unique-constraint violation.
    #[instrument(skip(connection))]
    pub async fn insert(
        connection: &Connection,
        owner: &AccountRef,
        gsrn: &str,
        sector: &str,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
        amount: i64,
    ) -> Result<Measurement, DbError> {
        let insert_result = connection
            .query(
                "INSERT INTO measurement (gsrn, subject, sector, begin_time, end_time, amount)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING id",
                params![
                    gsrn.to_string(),
                    owner.0.clone(),
                    sector.to_string(),
                    datetime_to_text(begin),
                    datetime_to_text(end),
                    amount
                ],
            )
            .await;

        let mut rows = match insert_result {
            Ok(rows) => rows,
            Err(libsql::Error::SqliteFailure(_, message)) if message.contains("UNIQUE") => {
                return Err(DbError::DuplicateMeasurement);
            }
            Err(e) => return Err(DbError::QueryError(e)),
        };

        let row = rows
            .next()
            .await?
            .ok_or_else(|| DbError::MappingError("insert into measurement did not return an id".into()))?;

        Ok(Measurement {
            id: row.get(0)?,
            gsrn: gsrn.to_string(),
            subject: owner.clone(),
            sector: sector.to_string(),
            begin,
            end,
            amount,
        })
    }

    fn map_row(row: &libsql::Row) -> Result<Measurement, DbError> {
        let begin_raw: String = row.get(4)?;
        let end_raw: String = row.get(5)?;
        Ok(Measurement {
            id: row.get(0)?,
            gsrn: row.get(1)?,
            subject: AccountRef::new(row.get::<String>(2)?),
            sector: row.get(3)?,
            begin: text_to_datetime(&begin_raw)?,
            end: text_to_datetime(&end_raw)?,
            amount: row.get(6)?,
        })
    }
}

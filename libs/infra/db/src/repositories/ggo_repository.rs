// [libs/infra/db/src/repositories/ggo_repository.rs]
/*!
 * APARATO: GGO REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA Y CONSULTA DEL LINAJE DE CERTIFICADOS
 */

use chrono::{DateTime, Utc};
use libsql::{params, Connection};
use tracing::{debug, instrument};

use ggo_domain_models::common::AccountRef;
use ggo_domain_models::Ggo;

use crate::errors::DbError;
use crate::mapping::{datetime_to_text, text_to_datetime};

pub struct GgoRepository;

impl GgoRepository {
    #[instrument(skip(connection))]
    pub async fn total_retired_amount(
        connection: &Connection,
        owner: &AccountRef,
        gsrn: &str,
        measurement_id: i64,
    ) -> Result<i64, DbError> {
        let mut rows = connection
            .query(
                "SELECT COALESCE(SUM(amount), 0) FROM ggo
                 WHERE subject = ?1 AND retired = 1 AND retire_gsrn = ?2 AND retire_measurement_id = ?3",
                params![owner.0.clone(), gsrn.to_string(), measurement_id],
            )
            .await?;
        let row = rows.next().await?.ok_or(DbError::GgoNotFound)?;
        Ok(row.get(0)?)
    }

    #[instrument(skip(connection))]
    pub async fn total_stored_amount(
        connection: &Connection,
        owner: &AccountRef,
        begin: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let mut rows = connection
            .query(
                "SELECT COALESCE(SUM(amount), 0) FROM ggo
                 WHERE subject = ?1 AND stored = 1 AND begin_time = ?2",
                params![owner.0.clone(), datetime_to_text(begin)],
            )
            .await?;
        let row = rows.next().await?.ok_or(DbError::GgoNotFound)?;
        Ok(row.get(0)?)
    }

    #[instrument(skip(connection, ggo))]
    pub async fn insert(connection: &Connection, ggo: &Ggo) -> Result<i64, DbError> {
        let mut rows = connection
            .query(
                "INSERT INTO ggo (
                    public_id, issue_time, expire_time, begin_time, end_time, amount, sector,
                    parent_public_id, measurement_id, subject, tech_code, fuel_code,
                    issued, stored, retired, issue_gsrn, retire_gsrn, retire_measurement_id
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
                 RETURNING id",
                params![
                    ggo.public_id.to_string(),
                    datetime_to_text(ggo.issue_time),
                    datetime_to_text(ggo.expire_time),
                    datetime_to_text(ggo.begin),
                    datetime_to_text(ggo.end),
                    ggo.amount,
                    ggo.sector.clone(),
                    ggo.parent_id.map(|id| id.to_string()),
                    ggo.measurement_id,
                    ggo.subject.0.clone(),
                    ggo.tech_code.clone(),
                    ggo.fuel_code.clone(),
                    crate::mapping::bool_to_int(ggo.issued),
                    crate::mapping::bool_to_int(ggo.stored),
                    crate::mapping::bool_to_int(ggo.retired),
                    ggo.issue_gsrn.clone(),
                    ggo.retire_gsrn.clone(),
                    ggo.retire_measurement_id,
                ],
            )
            .await?;
        let row = rows.next().await?.ok_or_else(|| {
            DbError::MappingError("insert into ggo did not return an id".into())
        })?;
        let id: i64 = row.get(0)?;
        debug!(ggo = %ggo.public_id, id, "ggo persisted");
        Ok(id)
    }

    #[instrument(skip(connection))]
    pub async fn find_by_public_id(
        connection: &Connection,
        public_id: uuid::Uuid,
    ) -> Result<Option<Ggo>, DbError> {
        let mut rows = connection
            .query(
                "SELECT id, public_id, issue_time, expire_time, begin_time, end_time, amount, sector,
                        parent_public_id, measurement_id, subject, tech_code, fuel_code,
                        issued, stored, retired, issue_gsrn, retire_gsrn, retire_measurement_id
                 FROM ggo WHERE public_id = ?1",
                params![public_id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::map_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Flips `stored` off for the parent once it has been split or retired.
    #[instrument(skip(connection))]
    pub async fn mark_split(connection: &Connection, public_id: uuid::Uuid) -> Result<(), DbError> {
        connection
            .execute(
                "UPDATE ggo SET stored = 0 WHERE public_id = ?1",
                params![public_id.to_string()],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(connection))]
    pub async fn mark_retired(
        connection: &Connection,
        public_id: uuid::Uuid,
        retire_gsrn: &str,
        retire_measurement_id: i64,
    ) -> Result<(), DbError> {
        connection
            .execute(
                "UPDATE ggo SET stored = 0, retired = 1, retire_gsrn = ?2, retire_measurement_id = ?3
                 WHERE public_id = ?1",
                params![public_id.to_string(), retire_gsrn.to_string(), retire_measurement_id],
            )
            .await?;
        Ok(())
    }

    /// Reverses `mark_split`/`mark_retired`, mirroring `Ggo`'s in-memory
    /// `on_rollback` bookkeeping once a batch is declined.
    #[instrument(skip(connection))]
    pub async fn restore_stored(connection: &Connection, public_id: uuid::Uuid) -> Result<(), DbError> {
        connection
            .execute(
                "UPDATE ggo SET stored = 1, retired = 0, retire_gsrn = NULL, retire_measurement_id = NULL
                 WHERE public_id = ?1",
                params![public_id.to_string()],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(connection))]
    pub async fn delete(connection: &Connection, public_id: uuid::Uuid) -> Result<(), DbError> {
        connection
            .execute("DELETE FROM ggo WHERE public_id = ?1", params![public_id.to_string()])
            .await?;
        Ok(())
    }

    fn map_row(row: &libsql::Row) -> Result<Ggo, DbError> {
        let public_id_raw: String = row.get(1)?;
        let parent_raw: Option<String> = row.get(8)?;
        let begin_raw: String = row.get(4)?;
        let end_raw: String = row.get(5)?;
        let issue_raw: String = row.get(2)?;
        let expire_raw: String = row.get(3)?;

        Ok(Ggo {
            id: Some(row.get(0)?),
            public_id: uuid::Uuid::parse_str(&public_id_raw)
                .map_err(|e| DbError::MappingError(e.to_string()))?,
            issue_time: text_to_datetime(&issue_raw)?,
            expire_time: text_to_datetime(&expire_raw)?,
            begin: text_to_datetime(&begin_raw)?,
            end: text_to_datetime(&end_raw)?,
            amount: row.get(6)?,
            sector: row.get(7)?,
            parent_id: parent_raw
                .map(|raw| uuid::Uuid::parse_str(&raw).map_err(|e| DbError::MappingError(e.to_string())))
                .transpose()?,
            measurement_id: row.get(9)?,
            subject: AccountRef::new(row.get::<String>(10)?),
            tech_code: row.get(11)?,
            fuel_code: row.get(12)?,
            issued: crate::mapping::int_to_bool(row.get(13)?),
            stored: crate::mapping::int_to_bool(row.get(14)?),
            retired: crate::mapping::int_to_bool(row.get(15)?),
            issue_gsrn: row.get(16)?,
            retire_gsrn: row.get(17)?,
            retire_measurement_id: row.get(18)?,
        })
    }
}

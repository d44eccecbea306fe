// [libs/infra/db/src/repositories/meteringpoint_repository.rs]
/*!
 * APARATO: METERINGPOINT REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DE INSTALACIONES FÍSICAS Y SUS ETIQUETAS
 */

use libsql::{params, Connection};
use tracing::instrument;

use ggo_domain_models::common::AccountRef;
use ggo_domain_models::{Meteringpoint, MeteringPointType};

use crate::errors::DbError;

pub struct MeteringpointRepository;

impl MeteringpointRepository {
    /// Consumption facilities belonging to `owner`, eligible to retire a GGO
    /// in `sector`. `retiring_priority = NULL` means auto-retire is off, so
    /// those rows are excluded rather than just sorted last; the remainder
    /// is ordered by `retiring_priority` ascending.
    #[instrument(skip(connection))]
    pub async fn eligible_to_retire(
        connection: &Connection,
        owner: &AccountRef,
        sector: &str,
    ) -> Result<Vec<Meteringpoint>, DbError> {
        let mut rows = connection
            .query(
                "SELECT id, public_id, gsrn, meteringpoint_type, sector, tech_code, fuel_code,
                        name, retiring_priority, subject
                 FROM meteringpoint
                 WHERE subject = ?1 AND sector = ?2 AND meteringpoint_type = 'Consumption'
                   AND retiring_priority IS NOT NULL
                 ORDER BY retiring_priority ASC",
                params![owner.0.clone(), sector.to_string()],
            )
            .await?;

        let mut facilities = Vec::new();
        while let Some(row) = rows.next().await? {
            let internal_id: i64 = row.get(0)?;
            let tags = Self::tags_for(connection, internal_id).await?;
            facilities.push(Self::map_row(&row, tags)?);
        }
        Ok(facilities)
    }

    #[instrument(skip(connection))]
    pub async fn find_by_gsrn(connection: &Connection, gsrn: &str) -> Result<Option<Meteringpoint>, DbError> {
        let mut rows = connection
            .query(
                "SELECT id, public_id, gsrn, meteringpoint_type, sector, tech_code, fuel_code,
                        name, retiring_priority, subject
                 FROM meteringpoint WHERE gsrn = ?1",
                params![gsrn.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => {
                let internal_id: i64 = row.get(0)?;
                let tags = Self::tags_for(connection, internal_id).await?;
                Ok(Some(Self::map_row(&row, tags)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(connection, meteringpoint))]
    pub async fn insert(connection: &Connection, meteringpoint: &Meteringpoint) -> Result<i64, DbError> {
        let type_label = match meteringpoint.meteringpoint_type {
            MeteringPointType::Production => "Production",
            MeteringPointType::Consumption => "Consumption",
        };
        let mut rows = connection
            .query(
                "INSERT INTO meteringpoint (
                    public_id, gsrn, meteringpoint_type, sector, tech_code, fuel_code, name,
                    retiring_priority, subject
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 RETURNING id",
                params![
                    meteringpoint.public_id.clone(),
                    meteringpoint.gsrn.clone(),
                    type_label,
                    meteringpoint.sector.clone(),
                    meteringpoint.tech_code.clone(),
                    meteringpoint.fuel_code.clone(),
                    meteringpoint.name.clone(),
                    meteringpoint.retiring_priority,
                    meteringpoint.subject.0.clone(),
                ],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| DbError::MappingError("insert into meteringpoint did not return an id".into()))?;
        let id: i64 = row.get(0)?;

        for tag in &meteringpoint.tags {
            connection
                .execute(
                    "INSERT INTO meteringpoint_tag (meteringpoint_id, tag) VALUES (?1, ?2)",
                    params![id, tag.clone()],
                )
                .await?;
        }
        Ok(id)
    }

    pub async fn tags_for(connection: &Connection, meteringpoint_id: i64) -> Result<Vec<String>, DbError> {
        let mut rows = connection
            .query(
                "SELECT tag FROM meteringpoint_tag WHERE meteringpoint_id = ?1 ORDER BY tag ASC",
                params![meteringpoint_id],
            )
            .await?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next().await? {
            tags.push(row.get(0)?);
        }
        Ok(tags)
    }

    fn map_row(row: &libsql::Row, tags: Vec<String>) -> Result<Meteringpoint, DbError> {
        let type_label: String = row.get(3)?;
        Ok(Meteringpoint {
            public_id: row.get(1)?,
            gsrn: row.get(2)?,
            meteringpoint_type: match type_label.as_str() {
                "Production" => MeteringPointType::Production,
                _ => MeteringPointType::Consumption,
            },
            sector: row.get(4)?,
            tech_code: row.get(5)?,
            fuel_code: row.get(6)?,
            name: row.get(7)?,
            retiring_priority: row.get(8)?,
            subject: AccountRef::new(row.get::<String>(9)?),
            tags,
        })
    }
}

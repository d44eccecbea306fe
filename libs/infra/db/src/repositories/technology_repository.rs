// [libs/infra/db/src/repositories/technology_repository.rs]
/*!
 * APARATO: TECHNOLOGY REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: LECTURA DE ETIQUETAS HUMANAS PARA PARES TECH/FUEL
 */

use libsql::{params, Connection};
use tracing::instrument;

use ggo_domain_models::Technology;

use crate::errors::DbError;

pub struct TechnologyRepository;

impl TechnologyRepository {
    #[instrument(skip(connection))]
    pub async fn label_for(
        connection: &Connection,
        tech_code: &str,
        fuel_code: &str,
    ) -> Result<Option<String>, DbError> {
        let mut rows = connection
            .query(
                "SELECT label FROM technology WHERE tech_code = ?1 AND fuel_code = ?2",
                params![tech_code.to_string(), fuel_code.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(connection))]
    pub async fn upsert(connection: &Connection, technology: &Technology) -> Result<(), DbError> {
        connection
            .execute(
                "INSERT INTO technology (tech_code, fuel_code, label) VALUES (?1, ?2, ?3)
                 ON CONFLICT (tech_code, fuel_code) DO UPDATE SET label = excluded.label",
                params![
                    technology.tech_code.clone(),
                    technology.fuel_code.clone(),
                    technology.label.clone()
                ],
            )
            .await?;
        Ok(())
    }
}

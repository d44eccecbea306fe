// [libs/infra/db/src/repositories/agreement_repository.rs]
/*!
 * APARATO: AGREEMENT REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DEL CICLO DE VIDA DE ACUERDOS DE COMERCIO
 *
 * La ventana de fecha, el filtro de instalación y el filtro de tecnología
 * se resuelven en Rust sobre el conjunto ya acotado por `user_from`/estado:
 * son predicados baratos sobre, como mucho, unas pocas docenas de acuerdos
 * activos por cuenta, y evitan tener que indexar JSON dentro de SQLite.
 */

use chrono::{DateTime, Utc};
use libsql::{params, Connection};
use tracing::instrument;

use ggo_domain_models::common::{AccountRef, Unit};
use ggo_domain_models::agreement::AgreementState;
use ggo_domain_models::TradeAgreement;

use crate::errors::DbError;
use crate::mapping::{datetime_to_text, date_to_text, json_to_strings, strings_to_json, text_to_date, text_to_datetime};

pub struct AgreementRepository;

impl AgreementRepository {
    #[instrument(skip(connection, agreement))]
    pub async fn insert(connection: &Connection, agreement: &TradeAgreement) -> Result<i64, DbError> {
        let mut rows = connection
            .query(
                "INSERT INTO trade_agreement (
                    public_id, created, declined, cancelled, user_proposed, user_from, user_to,
                    facility_gsrn, state, date_from, date_to, technologies, reference, amount, unit,
                    amount_percent, limit_to_consumption, transfer_priority, proposal_note
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                 RETURNING id",
                params![
                    agreement.public_id.to_string(),
                    datetime_to_text(agreement.created),
                    agreement.declined.map(datetime_to_text),
                    agreement.cancelled.map(datetime_to_text),
                    agreement.user_proposed.0.clone(),
                    agreement.user_from.0.clone(),
                    agreement.user_to.0.clone(),
                    strings_to_json(&agreement.facility_gsrn),
                    state_to_text(agreement.state),
                    date_to_text(agreement.date_from),
                    date_to_text(agreement.date_to),
                    strings_to_json(&agreement.technologies),
                    agreement.reference.clone(),
                    agreement.amount,
                    agreement.unit.map(unit_to_text),
                    agreement.amount_percent.map(|v| v as i64),
                    crate::mapping::bool_to_int(agreement.limit_to_consumption),
                    agreement.transfer_priority,
                    agreement.proposal_note.clone(),
                ],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| DbError::MappingError("insert into trade_agreement did not return an id".into()))?;
        Ok(row.get(0)?)
    }

    #[instrument(skip(connection))]
    pub async fn find_by_public_id(
        connection: &Connection,
        public_id: uuid::Uuid,
    ) -> Result<Option<TradeAgreement>, DbError> {
        let mut rows = connection
            .query(&format!("{} WHERE public_id = ?1", SELECT_COLUMNS), params![public_id.to_string()])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::map_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(connection, agreement))]
    pub async fn update(connection: &Connection, agreement: &TradeAgreement) -> Result<(), DbError> {
        let affected = connection
            .execute(
                "UPDATE trade_agreement SET
                    declined = ?2, cancelled = ?3, facility_gsrn = ?4, state = ?5, date_from = ?6,
                    date_to = ?7, technologies = ?8, reference = ?9, amount = ?10, unit = ?11,
                    amount_percent = ?12, limit_to_consumption = ?13, transfer_priority = ?14,
                    proposal_note = ?15
                 WHERE public_id = ?1",
                params![
                    agreement.public_id.to_string(),
                    agreement.declined.map(datetime_to_text),
                    agreement.cancelled.map(datetime_to_text),
                    strings_to_json(&agreement.facility_gsrn),
                    state_to_text(agreement.state),
                    date_to_text(agreement.date_from),
                    date_to_text(agreement.date_to),
                    strings_to_json(&agreement.technologies),
                    agreement.reference.clone(),
                    agreement.amount,
                    agreement.unit.map(unit_to_text),
                    agreement.amount_percent.map(|v| v as i64),
                    crate::mapping::bool_to_int(agreement.limit_to_consumption),
                    agreement.transfer_priority,
                    agreement.proposal_note.clone(),
                ],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::AgreementNotFound);
        }
        Ok(())
    }

    #[instrument(skip(connection))]
    pub async fn max_priority(connection: &Connection, user_from: &AccountRef) -> Result<Option<i32>, DbError> {
        let mut rows = connection
            .query(
                "SELECT MAX(transfer_priority) FROM trade_agreement WHERE user_from = ?1 AND state = 'Accepted'",
                params![user_from.0.clone()],
            )
            .await?;
        let row = rows.next().await?.ok_or(DbError::AgreementNotFound)?;
        Ok(row.get(0)?)
    }

    #[instrument(skip(connection))]
    pub async fn accepted_outbound(
        connection: &Connection,
        user_from: &AccountRef,
    ) -> Result<Vec<TradeAgreement>, DbError> {
        let mut rows = connection
            .query(
                &format!("{} WHERE user_from = ?1 AND state = 'Accepted'", SELECT_COLUMNS),
                params![user_from.0.clone()],
            )
            .await?;
        let mut agreements = Vec::new();
        while let Some(row) = rows.next().await? {
            agreements.push(Self::map_row(&row)?);
        }
        Ok(agreements)
    }

    #[instrument(skip(connection))]
    pub async fn account_exists(connection: &Connection, subject: &AccountRef) -> Result<bool, DbError> {
        let mut rows = connection
            .query(
                "SELECT 1 FROM meteringpoint WHERE subject = ?1
                 UNION SELECT 1 FROM ggo WHERE subject = ?1
                 UNION SELECT 1 FROM trade_agreement WHERE user_from = ?1 OR user_to = ?1
                 LIMIT 1",
                params![subject.0.clone()],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Eligible, accepted agreements outbound from `owner` for a just-received
    /// GGO, filtered by facility/technology/date window. The filters run in
    /// Rust against the small accepted-outbound set fetched above.
    #[instrument(skip(connection))]
    pub async fn eligible_outbound(
        connection: &Connection,
        owner: &AccountRef,
        begin: DateTime<Utc>,
        issue_gsrn: Option<&str>,
        tech_code: Option<&str>,
        fuel_code: Option<&str>,
    ) -> Result<Vec<TradeAgreement>, DbError> {
        let mut agreements = Self::accepted_outbound(connection, owner).await?;
        let local_date = begin.date_naive();

        agreements.retain(|agreement| {
            let in_window = agreement.date_from <= local_date && local_date <= agreement.date_to;
            let facility_ok = agreement.facility_gsrn.is_empty()
                || issue_gsrn.map(|g| agreement.facility_gsrn.iter().any(|f| f == g)).unwrap_or(false);
            let technology_ok = agreement.technologies.is_empty() || {
                let tag = technology_tag(tech_code, fuel_code);
                agreement.technologies.iter().any(|t| Some(t.as_str()) == tag.as_deref())
            };
            in_window && facility_ok && technology_ok
        });

        agreements.sort_by_key(|a| a.transfer_priority.unwrap_or(i32::MAX));
        Ok(agreements)
    }

    fn map_row(row: &libsql::Row) -> Result<TradeAgreement, DbError> {
        let public_id_raw: String = row.get(1)?;
        let created_raw: String = row.get(2)?;
        let declined_raw: Option<String> = row.get(3)?;
        let cancelled_raw: Option<String> = row.get(4)?;
        let state_raw: String = row.get(8)?;
        let date_from_raw: String = row.get(9)?;
        let date_to_raw: String = row.get(10)?;
        let unit_raw: Option<String> = row.get(14)?;
        let amount_percent_raw: Option<i64> = row.get(15)?;

        Ok(TradeAgreement {
            id: row.get(0)?,
            public_id: uuid::Uuid::parse_str(&public_id_raw).map_err(|e| DbError::MappingError(e.to_string()))?,
            created: text_to_datetime(&created_raw)?,
            declined: declined_raw.map(|raw| text_to_datetime(&raw)).transpose()?,
            cancelled: cancelled_raw.map(|raw| text_to_datetime(&raw)).transpose()?,
            user_proposed: AccountRef::new(row.get::<String>(5)?),
            user_from: AccountRef::new(row.get::<String>(6)?),
            user_to: AccountRef::new(row.get::<String>(7)?),
            facility_gsrn: json_to_strings(&row.get::<String>(11)?),
            state: text_to_state(&state_raw)?,
            date_from: text_to_date(&date_from_raw)?,
            date_to: text_to_date(&date_to_raw)?,
            technologies: json_to_strings(&row.get::<String>(12)?),
            reference: row.get(13)?,
            amount: row.get(16)?,
            unit: unit_raw.map(|raw| text_to_unit(&raw)).transpose()?,
            amount_percent: amount_percent_raw.map(|v| v as u8),
            limit_to_consumption: crate::mapping::int_to_bool(row.get(17)?),
            transfer_priority: row.get(18)?,
            proposal_note: row.get(19)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, public_id, created, declined, cancelled, user_proposed, user_from,
    user_to, state, date_from, date_to, facility_gsrn, technologies, reference, unit, amount_percent,
    amount, limit_to_consumption, transfer_priority, proposal_note FROM trade_agreement";

fn technology_tag(tech_code: Option<&str>, fuel_code: Option<&str>) -> Option<String> {
    match (tech_code, fuel_code) {
        (Some(tech), Some(fuel)) => Some(format!("{}:{}", tech, fuel)),
        (Some(tech), None) => Some(tech.to_string()),
        _ => None,
    }
}

fn state_to_text(state: AgreementState) -> &'static str {
    match state {
        AgreementState::Pending => "Pending",
        AgreementState::Accepted => "Accepted",
        AgreementState::Declined => "Declined",
        AgreementState::Cancelled => "Cancelled",
        AgreementState::Withdrawn => "Withdrawn",
    }
}

fn text_to_state(raw: &str) -> Result<AgreementState, DbError> {
    Ok(match raw {
        "Pending" => AgreementState::Pending,
        "Accepted" => AgreementState::Accepted,
        "Declined" => AgreementState::Declined,
        "Cancelled" => AgreementState::Cancelled,
        "Withdrawn" => AgreementState::Withdrawn,
        other => return Err(DbError::MappingError(format!("unknown agreement state '{}'", other))),
    })
}

fn unit_to_text(unit: Unit) -> &'static str {
    match unit {
        Unit::Wh => "Wh",
        Unit::KWh => "KWh",
        Unit::MWh => "MWh",
        Unit::GWh => "GWh",
    }
}

fn text_to_unit(raw: &str) -> Result<Unit, DbError> {
    Ok(match raw {
        "Wh" => Unit::Wh,
        "KWh" => Unit::KWh,
        "MWh" => Unit::MWh,
        "GWh" => Unit::GWh,
        other => return Err(DbError::MappingError(format!("unknown unit '{}'", other))),
    })
}

// [libs/infra/db/src/config.rs]
/*!
 * =================================================================
 * APARATO: ENGINE CONFIGURATION (V1.0)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: HIDRATACIÓN DE PARÁMETROS TÁCTICOS DESDE EL ENTORNO
 *
 * Esta tríada no posee binario propio (§1 excluye la superficie HTTP/CLI),
 * así que la carga de configuración queda disponible como plomería que
 * el futuro llamador invoca explícitamente, en lugar de ejecutarse detrás
 * de un `main`.
 * =================================================================
 */

use std::env;
use std::time::Duration;

use tracing::{debug, warn};

const DEFAULT_GGO_EXPIRE_DAYS: i64 = 90;
const DEFAULT_GGO_ISSUE_INTERVAL_SECONDS: u64 = 3600;

/// Runtime parameters for the allocation engine that aren't hardcoded into
/// `ggo-domain-models`. Read once at process startup and passed down by the
/// caller; nothing here re-reads the environment on every call.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lifetime of a freshly-issued GGO (`GGO_EXPIRE_TIME`, in days).
    pub ggo_expire_after_days: i64,

    /// Kept for parity with the original scheduler cadence
    /// (`GGO_ISSUE_INTERVAL`); unused by the allocation core itself.
    pub ggo_issue_interval: Duration,

    pub database_url: String,
    pub database_auth_token: Option<String>,
}

impl EngineConfig {
    /// Loads `.env` (best-effort, via `dotenvy`) then reads the environment.
    /// `DATABASE_URL` is the only variable without a default — an empty or
    /// missing value is a configuration fault, not silently tolerated.
    pub fn from_env() -> Result<Self, crate::errors::DbError> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").map_err(|_| {
            crate::errors::DbError::ConfigurationError("DATABASE_URL not defined in runtime environment".into())
        })?;
        if database_url.is_empty() {
            return Err(crate::errors::DbError::ConfigurationError(
                "DATABASE_URL is present but empty".into(),
            ));
        }

        let database_auth_token = env::var("DATABASE_AUTH_TOKEN").ok().filter(|v| !v.is_empty());

        let ggo_expire_after_days = env::var("GGO_EXPIRE_TIME")
            .ok()
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or_else(|| {
                debug!("GGO_EXPIRE_TIME unset, defaulting to {} days", DEFAULT_GGO_EXPIRE_DAYS);
                DEFAULT_GGO_EXPIRE_DAYS
            });

        let ggo_issue_interval = env::var("GGO_ISSUE_INTERVAL")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| {
                warn!(
                    "GGO_ISSUE_INTERVAL unset, defaulting to {}s (unused by the allocation core)",
                    DEFAULT_GGO_ISSUE_INTERVAL_SECONDS
                );
                Duration::from_secs(DEFAULT_GGO_ISSUE_INTERVAL_SECONDS)
            });

        Ok(Self {
            ggo_expire_after_days,
            ggo_issue_interval,
            database_url,
            database_auth_token,
        })
    }
}

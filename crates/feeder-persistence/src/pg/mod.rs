//! Implementaciones Postgres (Diesel) de los contratos del core.
//!
//! - `PgFeederStore`: store primario y consulta de disponibilidad.
//! - `PgDataSvcStore`: espejo del data service.
//! - `PgMonitoringStore`: documentos de monitoreo en `request_monitoring`.
//! - `PgTriggerConfigSource` / `PgReadinessSource`: colaboradores que sólo
//!   leen.
//!
//! Todas las operaciones pasan por `with_retry`: los errores transitorios
//! (serialización, pool, desconexión) se reintentan con backoff corto.

mod availability;
mod datasvc;
mod feeder_store;
mod monitoring;
mod readiness;
mod trigger;

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use feeder_core::model::{LumiNumber, RunNumber};
use log::{debug, warn};

pub use datasvc::PgDataSvcStore;
pub use feeder_store::PgFeederStore;
pub use monitoring::{MonitoringRecord, PgMonitoringStore};
pub use readiness::PgReadinessSource;
pub use trigger::PgTriggerConfigSource;

use crate::config::DbConfig;
use crate::error::PersistenceError;
use crate::migrations::{run_pending_migrations, Schema};

/// Pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Debe devolver una conexión válida o `PersistenceError::TransientIo`.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

/// `ConnectionProvider` respaldado por un `PgPool`. Clonarlo comparte el
/// pool.
#[derive(Clone)]
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Determina si un error es transitorio (reintentable).
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        // Algunos errores de driver llegan como Unknown con texto.
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Reintento con backoff corto: hasta 3 reintentos (15ms, 30ms, 45ms).
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Ejecuta `f` con una conexión del proveedor (auto-commit).
pub(crate) fn with_conn<P, T, F>(provider: &P, mut f: F) -> Result<T, PersistenceError>
    where P: ConnectionProvider,
          F: FnMut(&mut PgConnection) -> QueryResult<T>
{
    with_retry(|| {
        let mut conn = provider.connection()?;
        f(&mut *conn).map_err(PersistenceError::from)
    })
}

/// Ejecuta `f` dentro de una transacción read-write; cualquier error la
/// revierte completa.
pub(crate) fn with_tx<P, T, F>(provider: &P, mut f: F) -> Result<T, PersistenceError>
    where P: ConnectionProvider,
          F: FnMut(&mut PgConnection) -> QueryResult<T>
{
    with_retry(|| {
        let mut conn = provider.connection()?;
        conn.build_transaction()
            .read_write()
            .run(|tx_conn| f(tx_conn))
            .map_err(PersistenceError::from)
    })
}

/// Los números de corrida se guardan como INTEGER.
pub(crate) fn db_run(run: RunNumber) -> Result<i32, PersistenceError> {
    i32::try_from(run).map_err(|_| PersistenceError::OutOfRange(format!("run {run} does not fit INTEGER")))
}

pub(crate) fn db_runs(runs: &[RunNumber]) -> Result<Vec<i32>, PersistenceError> {
    runs.iter().copied().map(db_run).collect()
}

pub(crate) fn core_run(run: i32) -> Result<RunNumber, PersistenceError> {
    RunNumber::try_from(run).map_err(|_| PersistenceError::OutOfRange(format!("stored run {run} is negative")))
}

pub(crate) fn core_lumi(lumi: i32) -> Result<LumiNumber, PersistenceError> {
    LumiNumber::try_from(lumi).map_err(|_| PersistenceError::OutOfRange(format!("stored lumi {lumi} is negative")))
}

/// Construye un pool r2d2 y migra `schema` en el primer checkout.
///
/// - Tamaños 0 se ajustan a 1; si `min_size > max_size` se usa `max_size`.
/// - Errores del pool/manager -> `PersistenceError::TransientIo`.
pub fn build_pool_for(database_url: &str, min_size: u32, max_size: u32, schema: Schema) -> Result<PgPool, PersistenceError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    if validated_min > validated_max {
        warn!("build_pool: min_size > max_size ({validated_min} > {validated_max}), ajustando min=max");
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn, schema)?;
    }
    debug!("build_pool:done schema={schema:?} min={final_min} max={validated_max}");
    Ok(pool)
}

/// Pool del store primario (migraciones `primary`).
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    build_pool_for(database_url, min_size, max_size, Schema::Primary)
}

/// Carga `.env`, lee `DATABASE_URL` y construye el pool primario migrado.
pub fn build_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

/// Pool opcional para una base secundaria (`None` si no está configurada).
pub fn build_optional_pool(cfg: Option<DbConfig>, schema: Schema) -> Result<Option<PgPool>, PersistenceError> {
    cfg.map(|c| build_pool_for(&c.url, c.min_connections, c.max_connections, schema))
       .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(is_retryable(&PersistenceError::SerializationConflict));
        assert!(is_retryable(&PersistenceError::TransientIo("pool".into())));
        assert!(is_retryable(&PersistenceError::Unknown("ERROR: deadlock detected".into())));
        assert!(!is_retryable(&PersistenceError::UniqueViolation("dup".into())));
        assert!(!is_retryable(&PersistenceError::NotFound));
    }

    #[test]
    fn retry_gives_up_after_three_retries() {
        let mut calls = 0;
        let res: Result<(), _> = with_retry(|| {
            calls += 1;
            Err(PersistenceError::SerializationConflict)
        });
        assert!(res.is_err());
        assert_eq!(calls, 4);
    }

    #[test]
    fn retry_stops_on_success() {
        let mut calls = 0;
        let res = with_retry(|| {
            calls += 1;
            if calls < 2 {
                Err(PersistenceError::TransientIo("blip".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(res.unwrap(), 2);
    }

    #[test]
    fn run_numbers_survive_integer_column() {
        assert_eq!(core_run(db_run(345_678).unwrap()).unwrap(), 345_678);
    }

    #[test]
    fn out_of_range_numbers_fail_loudly() {
        assert!(matches!(db_run(u32::MAX), Err(PersistenceError::OutOfRange(_))));
        assert!(matches!(core_run(-1), Err(PersistenceError::OutOfRange(_))));
        assert!(matches!(core_lumi(-7), Err(PersistenceError::OutOfRange(_))));
        assert_eq!(db_runs(&[1, 2]).unwrap(), vec![1, 2]);
        assert!(db_runs(&[1, u32::MAX]).is_err());
    }
}

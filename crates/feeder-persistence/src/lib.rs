//! feeder-persistence
//!
//! Backends Postgres (Diesel + r2d2) de los contratos de `feeder-core`:
//! store primario con su consulta de disponibilidad, espejo del data
//! service, store de monitoreo y las fuentes de trigger y readiness.
//!
//! Módulos:
//! - `pg`: implementaciones y construcción de pools.
//! - `migrations`: migraciones embebidas (`primary` y `datasvc`).
//! - `config`: URLs y tamaños de pool desde el entorno / `.env`.
//! - `schema`: tablas Diesel usadas por el DSL.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use migrations::Schema;
pub use pg::{build_optional_pool, build_pool, build_pool_for, build_pool_from_env, ConnectionProvider, PgDataSvcStore, PgFeederStore,
             PgMonitoringStore, PgPool, PgReadinessSource, PgTriggerConfigSource, PoolProvider};

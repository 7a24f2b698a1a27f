//! Migraciones embebidas.
//!
//! Dos conjuntos: `migrations/primary` (store primario, incluye el
//! monitoreo) y `migrations/datasvc` (espejo del data service). Se corren
//! una vez al construir cada pool.

use diesel::pg::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

use crate::error::PersistenceError;

pub const PRIMARY_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/primary");
pub const DATASVC_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/datasvc");

/// Esquema a migrar al construir un pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Primary,
    DataSvc,
    /// Base ajena (trigger, readiness): no se migra.
    External,
}

pub fn run_pending_migrations(conn: &mut PgConnection, schema: Schema) -> Result<(), PersistenceError> {
    let migrations = match schema {
        Schema::Primary => PRIMARY_MIGRATIONS,
        Schema::DataSvc => DATASVC_MIGRATIONS,
        Schema::External => return Ok(()),
    };
    let applied = conn.run_pending_migrations(migrations)
                      .map_err(|e| PersistenceError::Unknown(format!("migration error: {e}")))?;
    if !applied.is_empty() {
        info!("migrations:applied schema={schema:?} count={}", applied.len());
    }
    Ok(())
}

//! Cableado del loop de control con los backends productivos.

use std::sync::Arc;

use feeder_core::collab::{CommandCollaborator, ReadinessSource, TriggerConfigSource};
use feeder_core::store::{DataSvcStore, FeederStore, MonitoringStore};
use feeder_core::ControlLoop;
use feeder_persistence::{build_optional_pool, build_pool, PgDataSvcStore, PgFeederStore, PgMonitoringStore, PgReadinessSource,
                         PgTriggerConfigSource, PoolProvider, Schema};
use log::info;

use crate::config::AppConfig;
use crate::errors::AppError;

/// Construye los pools (migrando los esquemas propios) y el `ControlLoop`.
///
/// Bloqueante: abre conexiones y corre migraciones.
pub fn build_control_loop(config: &AppConfig) -> Result<ControlLoop, AppError> {
    let db = &config.database;
    let primary = PoolProvider { pool: build_pool(&db.url, db.min_connections, db.max_connections)? };
    let datasvc = build_optional_pool(config.datasvc.clone(), Schema::DataSvc)?;
    let trigger = build_optional_pool(config.trigger.clone(), Schema::External)?;
    let readiness = build_optional_pool(config.readiness.clone(), Schema::External)?;
    info!("wiring:pools datasvc={} trigger_db={} readiness={}",
          datasvc.is_some(),
          trigger.is_some(),
          readiness.is_some());

    let store: Arc<dyn FeederStore> = Arc::new(PgFeederStore::new(primary.clone(), config.feed_location.clone()));
    let triggers: Arc<dyn TriggerConfigSource> = match trigger {
        Some(pool) => Arc::new(PgTriggerConfigSource::new(PoolProvider { pool })),
        None => Arc::new(PgTriggerConfigSource::new(primary.clone())),
    };
    let datasvc = datasvc.map(|pool| Arc::new(PgDataSvcStore::new(PoolProvider { pool })) as Arc<dyn DataSvcStore>);
    let readiness = readiness.map(|pool| Arc::new(PgReadinessSource::new(PoolProvider { pool })) as Arc<dyn ReadinessSource>);
    let monitoring: Arc<dyn MonitoringStore> = Arc::new(PgMonitoringStore::new(primary));
    let collaborator = Arc::new(CommandCollaborator::new(&config.collaborator_program));

    let control = ControlLoop::builder(store, config.feeder.clone()).triggers(triggers)
                                                                     .configurator(collaborator.clone())
                                                                     .closure(collaborator.clone())
                                                                     .uploader(collaborator)
                                                                     .readiness(readiness)
                                                                     .datasvc(datasvc)
                                                                     .monitoring(monitoring)
                                                                     .build()?;
    info!("wiring:done datasvc={} notifications={}", control.has_datasvc(), control.has_notifications());
    Ok(control)
}

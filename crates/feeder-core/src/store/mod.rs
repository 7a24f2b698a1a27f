//! Contratos de almacenamiento.
//!
//! Cada operación del store primario tiene un método con nombre y tipos
//! propios, resuelto al construir el loop (sin búsqueda por nombre en cada
//! llamada). Hay dos backends: en memoria (tests y prototipos) y Postgres
//! (`feeder-persistence`).

mod memory;

pub use memory::{InMemoryDataSvcStore, InMemoryFeederStore, InMemoryMonitoringStore, MemoryRun, MemoryStreamer, MemoryTables,
                 MemoryWorkflow};

use crate::errors::FeederError;
use crate::model::{AvailableFile, CloseoutCandidate, DatasetLockRow, ExpressConfigRow, FinishedStreamer, MonitoredWorkflow, NewRun,
                   PrimaryDatasetKey, RecoConfigRow, RecoLockRecord, RecoReleaseMark, RecoReleaseRow, RunNumber, RunStreamKey,
                   SubscriptionId, WorkflowId};
use crate::monitoring::{MonitoringDocument, MonitoringStatus};

/// Store primario (fuente de verdad del feeder).
///
/// Todas las escrituras son auto-commit salvo `feed_streamers`, que es
/// atómica: o se admiten todos los archivos nuevos o ninguno.
pub trait FeederStore: Send + Sync {
    /// Corridas sin configurar, con su clave de trigger (None = local).
    fn find_new_runs(&self) -> Result<Vec<NewRun>, FeederError>;
    /// Pares (run, stream) con datos y sin configurar, de corridas ya
    /// configuradas.
    fn find_new_run_streams(&self) -> Result<Vec<RunStreamKey>, FeederError>;
    /// Candidatas a liberar Express según el resumen de corrida.
    fn find_new_express_runs(&self) -> Result<Vec<RunNumber>, FeederError>;
    fn release_express(&self, runs: &[RunNumber]) -> Result<(), FeederError>;

    /// Admite los streamers nuevos en los filesets abiertos, en una sola
    /// transacción. Devuelve la cantidad de archivos admitidos.
    fn feed_streamers(&self) -> Result<usize, FeederError>;

    /// Marca como inyectados los workflows Repack/Express cuyo fileset cerró.
    /// Con `require_notified` además exige que todos sus streamers hayan
    /// sido notificados al sistema de transferencia.
    fn mark_workflows_injected(&self, require_notified: bool) -> Result<usize, FeederError>;

    fn streamer_workflows_for_monitoring(&self) -> Result<Vec<MonitoredWorkflow>, FeederError>;
    fn prompt_reco_workflows_for_monitoring(&self) -> Result<Vec<MonitoredWorkflow>, FeederError>;
    fn mark_workflow_tracked(&self, workflow: WorkflowId) -> Result<(), FeederError>;
    fn not_closed_out_workflows(&self) -> Result<Vec<CloseoutCandidate>, FeederError>;
    fn mark_workflow_closed_out(&self, workflow: WorkflowId) -> Result<(), FeederError>;

    fn finished_streamers(&self) -> Result<Vec<FinishedStreamer>, FeederError>;
    fn mark_streamers_finished(&self, streamers: &[i64]) -> Result<(), FeederError>;

    fn pending_run_stream_done(&self) -> Result<Vec<RunStreamKey>, FeederError>;
    fn mark_run_stream_done_synced(&self, keys: &[RunStreamKey]) -> Result<(), FeederError>;
    fn pending_express_configs(&self) -> Result<Vec<ExpressConfigRow>, FeederError>;
    fn mark_express_configs_synced(&self, keys: &[RunStreamKey]) -> Result<(), FeederError>;
    fn pending_reco_configs(&self) -> Result<Vec<RecoConfigRow>, FeederError>;
    fn mark_reco_configs_synced(&self, keys: &[PrimaryDatasetKey]) -> Result<(), FeederError>;
    /// Filas de liberación PromptReco aún no sincronizadas como bloqueadas
    /// (`in_datasvc < 2`); la agregación por run la hace el protocolo.
    fn pending_reco_releases(&self) -> Result<Vec<RecoReleaseRow>, FeederError>;
    /// Sube el contador de todas las filas del run (nunca lo baja).
    fn mark_reco_releases_synced(&self, marks: &[RecoReleaseMark]) -> Result<(), FeederError>;
    fn pending_dataset_locks(&self) -> Result<Vec<DatasetLockRow>, FeederError>;
    fn mark_dataset_locks_synced(&self, ids: &[i64]) -> Result<(), FeederError>;
}

/// Consulta de archivos disponibles para una suscripción repack-merge.
pub trait FileAvailability: Send + Sync {
    /// Archivos disponibles con al menos una lumi y ninguna lumi bajo split
    /// activo para el stream dueño de la suscripción. Una fila por
    /// (archivo, ubicación), ordenadas por id y ubicación.
    fn available_repack_merge_files(&self, subscription: SubscriptionId) -> Result<Vec<AvailableFile>, FeederError>;
}

/// Data service: espejo derivado, sólo escrito por el protocolo de
/// sincronización. Los inserts deben ser idempotentes sobre la clave natural.
pub trait DataSvcStore: Send + Sync {
    fn insert_run_stream_done(&self, rows: &[RunStreamKey]) -> Result<(), FeederError>;
    fn insert_express_configs(&self, rows: &[ExpressConfigRow]) -> Result<(), FeederError>;
    fn insert_reco_configs(&self, rows: &[RecoConfigRow]) -> Result<(), FeederError>;
    /// Upsert monótono: un run bloqueado nunca vuelve a desbloquearse.
    fn insert_reco_locks(&self, rows: &[RecoLockRecord]) -> Result<(), FeederError>;
    fn insert_dataset_locks(&self, paths: &[String]) -> Result<(), FeederError>;
}

/// Store documental de monitoreo de workflows.
pub trait MonitoringStore: Send + Sync {
    fn insert(&self, document: &MonitoringDocument) -> Result<MonitoringStatus, FeederError>;
    fn update_status(&self, request_name: &str, status: &str) -> Result<MonitoringStatus, FeederError>;
}

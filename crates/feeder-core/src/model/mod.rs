//! Modelo de datos del feeder.
//!
//! Tipos planos (sin lógica de acceso a datos) que cruzan la frontera entre
//! el core y los stores: corridas, streams, archivos con su rango de lumis,
//! workflows observados por el monitoreo y filas pendientes de sincronizar.

mod file;
mod run;
mod sync;
mod workflow;

pub use file::{ActiveSplitLock, AvailableFile, FileId, FileLumi, FinishedStreamer, LumiNumber, SubscriptionId};
pub use run::{NewRun, RunNumber, RunStreamKey};
pub use sync::{DatasetLockRow, ExpressConfigRow, PrimaryDatasetKey, RecoConfigRow, RecoLockRecord, RecoReleaseMark, RecoReleaseRow};
pub use workflow::{CloseoutCandidate, FilesetId, MonitoredWorkflow, WorkflowId, WorkflowKind};

//! Core del feeder Tier0.
//!
//! Modelo de datos, contratos de almacenamiento y de colaboradores, y los
//! algoritmos del loop de control: disponibilidad de archivos con lumis,
//! descubrimiento de corridas, liberaciones, sincronización con el data
//! service, notificación al sistema de transferencia y monitoreo.
//!
//! No depende de ningún driver de base de datos; los backends Postgres
//! viven en `feeder-persistence`.

pub mod availability;
pub mod collab;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod errors;
pub mod model;
pub mod monitoring;
pub mod notify;
pub mod orchestrator;
pub mod process;
pub mod release;
pub mod store;
pub mod sync;

pub use config::{FeederSettings, PipelineConfig};
pub use errors::FeederError;
pub use orchestrator::{ControlLoop, ControlLoopBuilder, CycleReport};

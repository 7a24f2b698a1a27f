//! Filas del store primario pendientes de reflejar en el data service.

use serde::{Deserialize, Serialize};

use super::RunNumber;

/// Configuración express de un run/stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressConfigRow {
    pub run: RunNumber,
    pub stream: String,
    pub cmssw: String,
    pub scram_arch: String,
    pub reco_cmssw: Option<String>,
    pub reco_scram_arch: Option<String>,
    pub alca_skim: Option<String>,
    pub dqm_seq: Option<String>,
    pub global_tag: String,
    pub scenario: String,
}

/// Configuración PromptReco de un (run, primary dataset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoConfigRow {
    pub run: RunNumber,
    pub primds: String,
    pub cmssw: String,
    pub scram_arch: String,
    pub alca_skim: Option<String>,
    pub physics_skim: Option<String>,
    pub dqm_seq: Option<String>,
    pub global_tag: String,
    pub scenario: String,
}

/// Clave natural (run, primary dataset).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrimaryDatasetKey {
    pub run: RunNumber,
    pub primds: String,
}

/// Estado de liberación PromptReco de un (run, primary dataset).
///
/// `in_datasvc` es un contador: 0 = nunca sincronizado, 1 = sincronizado
/// sin lock, 2 = sincronizado con lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoReleaseRow {
    pub run: RunNumber,
    pub primds: String,
    pub released: i64,
    pub in_datasvc: i32,
}

/// Registro agregado por run enviado al data service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoLockRecord {
    pub run: RunNumber,
    pub locked: bool,
}

/// Actualización del contador `in_datasvc` de todas las filas de un run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoReleaseMark {
    pub run: RunNumber,
    pub in_datasvc: i32,
}

impl RecoLockRecord {
    /// Valor objetivo del contador para este registro.
    pub fn mark(&self) -> RecoReleaseMark {
        RecoReleaseMark { run: self.run,
                          in_datasvc: i32::from(self.locked) + 1 }
    }
}

/// Dataset bloqueado pendiente de publicar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetLockRow {
    pub id: i64,
    pub path: String,
}

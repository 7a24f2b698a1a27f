use serde::{Deserialize, Serialize};

use super::RunNumber;

pub type FileId = i64;
pub type SubscriptionId = i64;
pub type LumiNumber = u32;

/// Asociación archivo ↔ lumi section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileLumi {
    pub file: FileId,
    pub run: RunNumber,
    pub lumi: LumiNumber,
}

/// Lumi bajo protección de split multi-archivo para un stream.
///
/// Mientras exista, ningún archivo que toque esa lumi para ese stream puede
/// reportarse disponible por la vía de merge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActiveSplitLock {
    pub run: RunNumber,
    pub lumi: LumiNumber,
    pub stream: String,
}

/// Archivo elegible para una suscripción, con su rango de lumis.
///
/// Una fila por par (archivo, ubicación): un archivo replicado en dos
/// ubicaciones produce dos filas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableFile {
    pub id: FileId,
    pub filesize: i64,
    pub events: i64,
    pub lfn: String,
    pub location: String,
    pub first_lumi: LumiNumber,
    pub last_lumi: LumiNumber,
}

impl AvailableFile {
    /// El archivo contiene una única lumi.
    pub fn is_single_lumi(&self) -> bool {
        self.first_lumi == self.last_lumi
    }
}

/// Streamer cuyo run/stream cerró y todavía no fue notificado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedStreamer {
    pub id: i64,
    pub lfn: String,
}

impl FinishedStreamer {
    /// Nombre base del LFN (lo único que recibe el sistema de transferencia).
    pub fn basename(&self) -> &str {
        self.lfn.rsplit('/').next().unwrap_or(&self.lfn)
    }
}

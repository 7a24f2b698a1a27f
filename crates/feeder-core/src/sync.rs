//! Sincronización con el data service.
//!
//! Cinco categorías en orden fijo. Para cada una: leer las filas pendientes
//! del store primario, insertar en el data service y, sólo si el insert no
//! falló, marcarlas como sincronizadas. Una caída entre el insert y la marca
//! se resuelve en el ciclo siguiente repitiendo el insert, que es idempotente
//! sobre la clave natural.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info};
use serde::Serialize;

use crate::constants::MAX_LABEL_LENGTH;
use crate::errors::FeederError;
use crate::model::{ExpressConfigRow, PrimaryDatasetKey, RecoConfigRow, RecoLockRecord, RecoReleaseRow, RunNumber, RunStreamKey};
use crate::store::{DataSvcStore, FeederStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyncCategory {
    RunStreamDone,
    ExpressConfig,
    RecoConfig,
    RecoRelease,
    DatasetLock,
}

impl SyncCategory {
    /// Orden de ejecución de las sub-fases.
    pub const ORDER: [SyncCategory; 5] = [SyncCategory::RunStreamDone,
                                          SyncCategory::ExpressConfig,
                                          SyncCategory::RecoConfig,
                                          SyncCategory::RecoRelease,
                                          SyncCategory::DatasetLock];
}

impl fmt::Display for SyncCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncCategory::RunStreamDone => "run_stream_done",
            SyncCategory::ExpressConfig => "express_config",
            SyncCategory::RecoConfig => "reco_config",
            SyncCategory::RecoRelease => "reco_release",
            SyncCategory::DatasetLock => "dataset_lock",
        };
        f.write_str(name)
    }
}

/// Filas sincronizadas por categoría, en orden de ejecución.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    counts: IndexMap<SyncCategory, usize>,
}

impl SyncReport {
    pub fn count(&self, category: SyncCategory) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn categories(&self) -> impl Iterator<Item = (&SyncCategory, &usize)> {
        self.counts.iter()
    }
}

/// Recorta una etiqueta al largo máximo aceptado por el data service sin
/// partir un carácter.
pub fn truncate_label(label: &str) -> String {
    label.chars().take(MAX_LABEL_LENGTH).collect()
}

/// Normalización de frontera antes de transmitir.
pub fn normalize_express(mut row: ExpressConfigRow) -> ExpressConfigRow {
    row.global_tag = truncate_label(&row.global_tag);
    row
}

pub fn normalize_reco(mut row: RecoConfigRow) -> RecoConfigRow {
    row.global_tag = truncate_label(&row.global_tag);
    row
}

/// Agrega las filas de liberación por corrida: basta un primary dataset
/// liberado para bloquear la corrida entera. Se omiten las corridas cuyo
/// contador ya alcanzó el valor que les correspondería.
pub fn aggregate_reco_releases(rows: &[RecoReleaseRow]) -> Vec<RecoLockRecord> {
    let mut by_run: BTreeMap<RunNumber, (bool, i32)> = BTreeMap::new();
    for row in rows {
        let entry = by_run.entry(row.run).or_insert((false, i32::MAX));
        entry.0 |= row.released > 0;
        entry.1 = entry.1.min(row.in_datasvc);
    }
    by_run.into_iter()
          .map(|(run, (locked, lowest))| (RecoLockRecord { run, locked }, lowest))
          .filter(|(record, lowest)| *lowest < record.mark().in_datasvc)
          .map(|(record, _)| record)
          .collect()
}

pub struct DataSvcSync {
    store: Arc<dyn FeederStore>,
    datasvc: Arc<dyn DataSvcStore>,
}

impl DataSvcSync {
    pub fn new(store: Arc<dyn FeederStore>, datasvc: Arc<dyn DataSvcStore>) -> Self {
        Self { store, datasvc }
    }

    /// Ejecuta las cinco sub-fases. El primer error corta la secuencia.
    pub fn run(&self) -> Result<SyncReport, FeederError> {
        let mut report = SyncReport::default();
        for category in SyncCategory::ORDER {
            let synced = match category {
                SyncCategory::RunStreamDone => self.sync_run_stream_done()?,
                SyncCategory::ExpressConfig => self.sync_express_configs()?,
                SyncCategory::RecoConfig => self.sync_reco_configs()?,
                SyncCategory::RecoRelease => self.sync_reco_releases()?,
                SyncCategory::DatasetLock => self.sync_dataset_locks()?,
            };
            if synced > 0 {
                info!("sync:{category} synced={synced}");
            }
            report.counts.insert(category, synced);
        }
        Ok(report)
    }

    pub fn sync_run_stream_done(&self) -> Result<usize, FeederError> {
        let rows = self.store.pending_run_stream_done()?;
        if rows.is_empty() {
            return Ok(0);
        }
        self.datasvc.insert_run_stream_done(&rows)?;
        self.store.mark_run_stream_done_synced(&rows)?;
        Ok(rows.len())
    }

    pub fn sync_express_configs(&self) -> Result<usize, FeederError> {
        let pending = self.store.pending_express_configs()?;
        if pending.is_empty() {
            return Ok(0);
        }
        let keys: Vec<RunStreamKey> = pending.iter().map(|r| RunStreamKey::new(r.run, r.stream.clone())).collect();
        let rows: Vec<ExpressConfigRow> = pending.into_iter().map(normalize_express).collect();
        self.datasvc.insert_express_configs(&rows)?;
        self.store.mark_express_configs_synced(&keys)?;
        Ok(rows.len())
    }

    pub fn sync_reco_configs(&self) -> Result<usize, FeederError> {
        let pending = self.store.pending_reco_configs()?;
        if pending.is_empty() {
            return Ok(0);
        }
        let keys: Vec<PrimaryDatasetKey> = pending.iter()
                                                  .map(|r| PrimaryDatasetKey { run: r.run,
                                                                               primds: r.primds.clone() })
                                                  .collect();
        let rows: Vec<RecoConfigRow> = pending.into_iter().map(normalize_reco).collect();
        self.datasvc.insert_reco_configs(&rows)?;
        self.store.mark_reco_configs_synced(&keys)?;
        Ok(rows.len())
    }

    pub fn sync_reco_releases(&self) -> Result<usize, FeederError> {
        let records = aggregate_reco_releases(&self.store.pending_reco_releases()?);
        if records.is_empty() {
            return Ok(0);
        }
        debug!("sync:reco_release runs={}", records.len());
        let marks: Vec<_> = records.iter().map(RecoLockRecord::mark).collect();
        self.datasvc.insert_reco_locks(&records)?;
        self.store.mark_reco_releases_synced(&marks)?;
        Ok(records.len())
    }

    pub fn sync_dataset_locks(&self) -> Result<usize, FeederError> {
        let pending = self.store.pending_dataset_locks()?;
        if pending.is_empty() {
            return Ok(0);
        }
        let ids: Vec<i64> = pending.iter().map(|r| r.id).collect();
        let paths: Vec<String> = pending.into_iter().map(|r| r.path).collect();
        self.datasvc.insert_dataset_locks(&paths)?;
        self.store.mark_dataset_locks_synced(&ids)?;
        Ok(paths.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(run: RunNumber, primds: &str, released: i64, in_datasvc: i32) -> RecoReleaseRow {
        RecoReleaseRow { run,
                         primds: primds.into(),
                         released,
                         in_datasvc }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(60);
        let cut = truncate_label(&long);
        assert_eq!(cut.chars().count(), MAX_LABEL_LENGTH);
        assert_eq!(truncate_label("short_GT"), "short_GT");
    }

    #[test]
    fn one_released_dataset_locks_the_run() {
        let rows = vec![release(1, "ZeroBias", 0, 0), release(1, "JetMET", 3, 0), release(2, "ZeroBias", 0, 0)];
        let records = aggregate_reco_releases(&rows);
        assert_eq!(records,
                   vec![RecoLockRecord { run: 1, locked: true }, RecoLockRecord { run: 2, locked: false }]);
        assert_eq!(records[0].mark().in_datasvc, 2);
        assert_eq!(records[1].mark().in_datasvc, 1);
    }

    #[test]
    fn already_synced_unlocked_runs_are_skipped_until_released() {
        let synced = vec![release(7, "ZeroBias", 0, 1)];
        assert!(aggregate_reco_releases(&synced).is_empty());
        let now_released = vec![release(7, "ZeroBias", 1, 1)];
        assert_eq!(aggregate_reco_releases(&now_released), vec![RecoLockRecord { run: 7, locked: true }]);
    }
}

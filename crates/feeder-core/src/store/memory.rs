//! Backends en memoria.
//!
//! Reproducen la semántica de las consultas Postgres sobre tablas en
//! memoria protegidas por un `Mutex`. Se usan en los tests del core y como
//! referencia de paridad para el backend persistente.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::availability::{FileCatalog, FileDetails, Subscription};
use crate::errors::FeederError;
use crate::model::{AvailableFile, CloseoutCandidate, DatasetLockRow, ExpressConfigRow, FileId, FileLumi, FilesetId, FinishedStreamer,
                   LumiNumber, MonitoredWorkflow, NewRun, PrimaryDatasetKey, RecoConfigRow, RecoLockRecord, RecoReleaseMark,
                   RecoReleaseRow, RunNumber, RunStreamKey, SubscriptionId, WorkflowId, WorkflowKind};
use crate::monitoring::{MonitoringDocument, MonitoringStatus};

use super::{DataSvcStore, FeederStore, FileAvailability, MonitoringStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRun {
    pub trigger_key: Option<String>,
    pub configured: bool,
    pub has_summary: bool,
    pub express_released: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStreamer {
    pub id: i64,
    pub run: RunNumber,
    pub stream: String,
    pub lumi: LumiNumber,
    pub lfn: String,
    pub filesize: i64,
    pub events: i64,
    /// Ya admitido en un fileset.
    pub used: bool,
    /// Ya notificado al sistema de transferencia.
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryWorkflow {
    pub name: String,
    pub run: RunNumber,
    pub kind: WorkflowKind,
    pub injected: bool,
    pub tracked: bool,
    pub closeout: bool,
}

/// Tablas del store primario.
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    pub runs: BTreeMap<RunNumber, MemoryRun>,
    pub streamers: Vec<MemoryStreamer>,
    /// fileset -> abierto
    pub filesets: BTreeMap<FilesetId, bool>,
    pub catalog: FileCatalog,
    pub workflows: BTreeMap<WorkflowId, MemoryWorkflow>,
    pub run_stream_done_synced: BTreeSet<RunStreamKey>,
    pub express_configs: Vec<(ExpressConfigRow, bool)>,
    pub reco_configs: Vec<(RecoConfigRow, bool)>,
    pub reco_releases: Vec<RecoReleaseRow>,
    pub dataset_locks: Vec<(DatasetLockRow, bool)>,
}

impl MemoryTables {
    fn fileset_open(&self, fileset: FilesetId) -> bool {
        self.filesets.get(&fileset).copied().unwrap_or(false)
    }

    fn next_id<V>(map: &BTreeMap<i64, V>) -> i64 {
        map.keys().next_back().map(|k| k + 1).unwrap_or(1)
    }

    /// Fileset de entrada de un workflow (vía su suscripción).
    fn workflow_input(&self, workflow: WorkflowId) -> Option<FilesetId> {
        self.catalog.subscriptions.values().find(|s| s.workflow == workflow).map(|s| s.fileset)
    }

    fn run_stream_of_fileset(&self, fileset: FilesetId) -> Option<&RunStreamKey> {
        self.catalog.run_stream_filesets.iter().find(|(_, f)| **f == fileset).map(|(k, _)| k)
    }

    /// Admite un streamer: archivo, lumi, ubicación, fileset y
    /// disponibilidad para cada suscripción del fileset.
    fn admit(&mut self, streamer: &MemoryStreamer, fileset: FilesetId, location: &str) -> FileId {
        let existing = self.catalog.files.iter().find(|(_, d)| d.lfn == streamer.lfn).map(|(id, _)| *id);
        let file = existing.unwrap_or_else(|| Self::next_id(&self.catalog.files));
        self.catalog.files.entry(file).or_insert_with(|| FileDetails { lfn: streamer.lfn.clone(),
                                                                       filesize: streamer.filesize,
                                                                       events: streamer.events });
        self.catalog.lumis.insert(FileLumi { file,
                                             run: streamer.run,
                                             lumi: streamer.lumi });
        self.catalog.locations.insert((file, location.to_string()));
        self.catalog.fileset_files.insert((fileset, file));
        let subs: Vec<SubscriptionId> = self.catalog
                                            .subscriptions
                                            .iter()
                                            .filter(|(_, s)| s.fileset == fileset)
                                            .map(|(id, _)| *id)
                                            .collect();
        for sub in subs {
            self.catalog.sub_files_available.insert((sub, file));
        }
        file
    }
}

/// Store primario en memoria.
pub struct InMemoryFeederStore {
    tables: Mutex<MemoryTables>,
    feed_location: String,
    fail_next_feed: AtomicBool,
}

impl Default for InMemoryFeederStore {
    fn default() -> Self {
        Self::new("T0_CH_CERN_Disk")
    }
}

impl InMemoryFeederStore {
    pub fn new(feed_location: impl Into<String>) -> Self {
        Self { tables: Mutex::new(MemoryTables::default()),
               feed_location: feed_location.into(),
               fail_next_feed: AtomicBool::new(false) }
    }

    /// Acceso directo a las tablas (preparación de escenarios y
    /// colaboradores en memoria).
    pub fn tables(&self) -> MutexGuard<'_, MemoryTables> {
        match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn snapshot(&self) -> MemoryTables {
        self.tables().clone()
    }

    /// Hace fallar la próxima transacción de feed después de haber aplicado
    /// parte de las escrituras (que se descartan).
    pub fn fail_next_feed(&self) {
        self.fail_next_feed.store(true, Ordering::SeqCst);
    }

    pub fn add_run(&self, run: RunNumber, trigger_key: Option<&str>) {
        self.tables().runs.insert(run,
                                  MemoryRun { trigger_key: trigger_key.map(str::to_string),
                                              ..MemoryRun::default() });
    }

    pub fn add_streamer(&self, run: RunNumber, stream: &str, lumi: LumiNumber, lfn: &str) -> i64 {
        let mut t = self.tables();
        let id = t.streamers.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        t.streamers.push(MemoryStreamer { id,
                                          run,
                                          stream: stream.to_string(),
                                          lumi,
                                          lfn: lfn.to_string(),
                                          filesize: 1024,
                                          events: 100,
                                          used: false,
                                          deleted: false });
        id
    }

    /// Crea el fileset abierto de un run/stream (lo que hace la
    /// configuración de run/stream).
    pub fn register_run_stream(&self, key: RunStreamKey) -> FilesetId {
        let mut t = self.tables();
        if let Some(existing) = t.catalog.run_stream_filesets.get(&key) {
            return *existing;
        }
        let fileset = MemoryTables::next_id(&t.filesets);
        t.filesets.insert(fileset, true);
        t.catalog.run_stream_filesets.insert(key, fileset);
        fileset
    }

    /// Crea un workflow suscrito a `fileset`; devuelve (workflow, suscripción).
    pub fn add_workflow(&self, name: &str, run: RunNumber, kind: WorkflowKind, fileset: FilesetId) -> (WorkflowId, SubscriptionId) {
        let mut t = self.tables();
        let workflow = MemoryTables::next_id(&t.workflows);
        t.workflows.insert(workflow,
                           MemoryWorkflow { name: name.to_string(),
                                            run,
                                            kind,
                                            injected: false,
                                            tracked: false,
                                            closeout: false });
        let sub = MemoryTables::next_id(&t.catalog.subscriptions);
        t.catalog.subscriptions.insert(sub, Subscription { fileset, workflow, finished: false });
        (workflow, sub)
    }

    pub fn close_fileset(&self, fileset: FilesetId) {
        self.tables().filesets.insert(fileset, false);
    }
}

fn sorted_by_id(mut wfs: Vec<MonitoredWorkflow>) -> Vec<MonitoredWorkflow> {
    wfs.sort_by_key(|w| w.id);
    wfs
}

impl FeederStore for InMemoryFeederStore {
    fn find_new_runs(&self) -> Result<Vec<NewRun>, FeederError> {
        Ok(self.tables()
               .runs
               .iter()
               .filter(|(_, r)| !r.configured)
               .map(|(run, r)| NewRun { run: *run,
                                        trigger_key: r.trigger_key.clone() })
               .collect())
    }

    fn find_new_run_streams(&self) -> Result<Vec<RunStreamKey>, FeederError> {
        let t = self.tables();
        let keys: BTreeSet<RunStreamKey> =
            t.streamers
             .iter()
             .filter(|s| t.runs.get(&s.run).map(|r| r.configured).unwrap_or(false))
             .map(|s| RunStreamKey::new(s.run, s.stream.clone()))
             .filter(|k| !t.catalog.run_stream_filesets.contains_key(k))
             .collect();
        Ok(keys.into_iter().collect())
    }

    fn find_new_express_runs(&self) -> Result<Vec<RunNumber>, FeederError> {
        Ok(self.tables()
               .runs
               .iter()
               .filter(|(_, r)| r.configured && r.has_summary && !r.express_released)
               .map(|(run, _)| *run)
               .collect())
    }

    fn release_express(&self, runs: &[RunNumber]) -> Result<(), FeederError> {
        let mut t = self.tables();
        for run in runs {
            if let Some(r) = t.runs.get_mut(run) {
                r.express_released = true;
            }
        }
        Ok(())
    }

    fn feed_streamers(&self) -> Result<usize, FeederError> {
        let mut guard = self.tables();
        // Se trabaja sobre una copia y sólo se publica al final (commit).
        let mut staged = guard.clone();
        let pending: Vec<(MemoryStreamer, FilesetId)> =
            staged.streamers
                  .iter()
                  .filter(|s| !s.used)
                  .filter_map(|s| {
                      let key = RunStreamKey::new(s.run, s.stream.clone());
                      staged.catalog
                            .run_stream_filesets
                            .get(&key)
                            .copied()
                            .filter(|f| staged.fileset_open(*f))
                            .map(|f| (s.clone(), f))
                  })
                  .collect();

        let mut admitted = 0;
        for (streamer, fileset) in &pending {
            staged.admit(streamer, *fileset, &self.feed_location);
            if let Some(s) = staged.streamers.iter_mut().find(|s| s.id == streamer.id) {
                s.used = true;
            }
            admitted += 1;
        }

        if self.fail_next_feed.swap(false, Ordering::SeqCst) {
            return Err(FeederError::Feed(format!("injected failure after staging {admitted} files")));
        }
        *guard = staged;
        Ok(admitted)
    }

    fn mark_workflows_injected(&self, require_notified: bool) -> Result<usize, FeederError> {
        let mut t = self.tables();
        let eligible: Vec<WorkflowId> =
            t.workflows
             .iter()
             .filter(|(_, w)| !w.injected && matches!(w.kind, WorkflowKind::Repack | WorkflowKind::Express))
             .filter_map(|(id, _)| {
                 let fileset = t.workflow_input(*id)?;
                 let key = t.run_stream_of_fileset(fileset)?;
                 if t.fileset_open(fileset) {
                     return None;
                 }
                 let pending_notification =
                     t.streamers.iter().any(|s| s.run == key.run && s.stream == key.stream && !s.deleted);
                 if require_notified && pending_notification {
                     return None;
                 }
                 Some(*id)
             })
             .collect();
        for id in &eligible {
            if let Some(w) = t.workflows.get_mut(id) {
                w.injected = true;
            }
        }
        Ok(eligible.len())
    }

    fn streamer_workflows_for_monitoring(&self) -> Result<Vec<MonitoredWorkflow>, FeederError> {
        let t = self.tables();
        Ok(sorted_by_id(t.workflows
                         .iter()
                         .filter(|(_, w)| w.kind == WorkflowKind::Repack && !w.tracked)
                         .map(|(id, w)| MonitoredWorkflow { id: *id,
                                                            run: w.run,
                                                            name: w.name.clone() })
                         .collect()))
    }

    fn prompt_reco_workflows_for_monitoring(&self) -> Result<Vec<MonitoredWorkflow>, FeederError> {
        let t = self.tables();
        Ok(sorted_by_id(t.workflows
                         .iter()
                         .filter(|(_, w)| w.kind == WorkflowKind::PromptReco && !w.tracked)
                         .map(|(id, w)| MonitoredWorkflow { id: *id,
                                                            run: w.run,
                                                            name: w.name.clone() })
                         .collect()))
    }

    fn mark_workflow_tracked(&self, workflow: WorkflowId) -> Result<(), FeederError> {
        if let Some(w) = self.tables().workflows.get_mut(&workflow) {
            w.tracked = true;
        }
        Ok(())
    }

    fn not_closed_out_workflows(&self) -> Result<Vec<CloseoutCandidate>, FeederError> {
        let t = self.tables();
        Ok(t.workflows
            .iter()
            .filter(|(_, w)| !w.closeout && (w.tracked || w.kind == WorkflowKind::Express))
            .filter_map(|(id, w)| {
                let fileset = t.workflow_input(*id)?;
                Some(CloseoutCandidate { id: *id,
                                         fileset,
                                         fileset_open: t.fileset_open(fileset),
                                         name: w.name.clone() })
            })
            .collect())
    }

    fn mark_workflow_closed_out(&self, workflow: WorkflowId) -> Result<(), FeederError> {
        if let Some(w) = self.tables().workflows.get_mut(&workflow) {
            w.closeout = true;
        }
        Ok(())
    }

    fn finished_streamers(&self) -> Result<Vec<FinishedStreamer>, FeederError> {
        let t = self.tables();
        let mut out: Vec<FinishedStreamer> =
            t.streamers
             .iter()
             .filter(|s| s.used && !s.deleted)
             .filter(|s| {
                 t.catalog
                  .run_stream_filesets
                  .get(&RunStreamKey::new(s.run, s.stream.clone()))
                  .map(|f| !t.fileset_open(*f))
                  .unwrap_or(false)
             })
             .map(|s| FinishedStreamer { id: s.id, lfn: s.lfn.clone() })
             .collect();
        out.sort_by_key(|s| s.id);
        Ok(out)
    }

    fn mark_streamers_finished(&self, streamers: &[i64]) -> Result<(), FeederError> {
        let mut t = self.tables();
        for s in t.streamers.iter_mut().filter(|s| streamers.contains(&s.id)) {
            s.deleted = true;
        }
        Ok(())
    }

    fn pending_run_stream_done(&self) -> Result<Vec<RunStreamKey>, FeederError> {
        let t = self.tables();
        Ok(t.catalog
            .run_stream_filesets
            .iter()
            .filter(|(key, _)| !t.run_stream_done_synced.contains(*key))
            .filter(|(_, fileset)| !t.fileset_open(**fileset))
            .filter(|(_, fileset)| t.catalog.subscriptions.values().filter(|s| s.fileset == **fileset).all(|s| s.finished))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn mark_run_stream_done_synced(&self, keys: &[RunStreamKey]) -> Result<(), FeederError> {
        self.tables().run_stream_done_synced.extend(keys.iter().cloned());
        Ok(())
    }

    fn pending_express_configs(&self) -> Result<Vec<ExpressConfigRow>, FeederError> {
        Ok(self.tables().express_configs.iter().filter(|(_, synced)| !synced).map(|(row, _)| row.clone()).collect())
    }

    fn mark_express_configs_synced(&self, keys: &[RunStreamKey]) -> Result<(), FeederError> {
        for (row, synced) in self.tables().express_configs.iter_mut() {
            if keys.iter().any(|k| k.run == row.run && k.stream == row.stream) {
                *synced = true;
            }
        }
        Ok(())
    }

    fn pending_reco_configs(&self) -> Result<Vec<RecoConfigRow>, FeederError> {
        Ok(self.tables().reco_configs.iter().filter(|(_, synced)| !synced).map(|(row, _)| row.clone()).collect())
    }

    fn mark_reco_configs_synced(&self, keys: &[PrimaryDatasetKey]) -> Result<(), FeederError> {
        for (row, synced) in self.tables().reco_configs.iter_mut() {
            if keys.iter().any(|k| k.run == row.run && k.primds == row.primds) {
                *synced = true;
            }
        }
        Ok(())
    }

    fn pending_reco_releases(&self) -> Result<Vec<RecoReleaseRow>, FeederError> {
        Ok(self.tables().reco_releases.iter().filter(|r| r.in_datasvc < 2).cloned().collect())
    }

    fn mark_reco_releases_synced(&self, marks: &[RecoReleaseMark]) -> Result<(), FeederError> {
        let mut t = self.tables();
        for mark in marks {
            for row in t.reco_releases.iter_mut().filter(|r| r.run == mark.run) {
                row.in_datasvc = row.in_datasvc.max(mark.in_datasvc);
            }
        }
        Ok(())
    }

    fn pending_dataset_locks(&self) -> Result<Vec<DatasetLockRow>, FeederError> {
        Ok(self.tables().dataset_locks.iter().filter(|(_, synced)| !synced).map(|(row, _)| row.clone()).collect())
    }

    fn mark_dataset_locks_synced(&self, ids: &[i64]) -> Result<(), FeederError> {
        for (row, synced) in self.tables().dataset_locks.iter_mut() {
            if ids.contains(&row.id) {
                *synced = true;
            }
        }
        Ok(())
    }
}

impl FileAvailability for InMemoryFeederStore {
    fn available_repack_merge_files(&self, subscription: SubscriptionId) -> Result<Vec<AvailableFile>, FeederError> {
        Ok(self.tables().catalog.available_files(subscription))
    }
}

/// Data service en memoria: conserva las filas por clave natural y cuenta
/// las llamadas de inserción.
#[derive(Default)]
pub struct InMemoryDataSvcStore {
    pub run_stream_done: Mutex<BTreeSet<RunStreamKey>>,
    pub express_configs: Mutex<BTreeMap<RunStreamKey, ExpressConfigRow>>,
    pub reco_configs: Mutex<BTreeMap<PrimaryDatasetKey, RecoConfigRow>>,
    pub reco_locks: Mutex<BTreeMap<RunNumber, bool>>,
    pub dataset_locks: Mutex<BTreeSet<String>>,
    insert_calls: AtomicUsize,
    fail_inserts: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl InMemoryDataSvcStore {
    /// Cantidad de llamadas de inserción recibidas (todas las categorías).
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Simula un data service caído: toda inserción falla.
    pub fn set_failing(&self, failing: bool) {
        self.fail_inserts.store(failing, Ordering::SeqCst);
    }

    fn begin_insert(&self) -> Result<(), FeederError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(FeederError::Store("data service unavailable".into()));
        }
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl DataSvcStore for InMemoryDataSvcStore {
    fn insert_run_stream_done(&self, rows: &[RunStreamKey]) -> Result<(), FeederError> {
        self.begin_insert()?;
        lock(&self.run_stream_done).extend(rows.iter().cloned());
        Ok(())
    }

    fn insert_express_configs(&self, rows: &[ExpressConfigRow]) -> Result<(), FeederError> {
        self.begin_insert()?;
        let mut map = lock(&self.express_configs);
        for row in rows {
            map.entry(RunStreamKey::new(row.run, row.stream.clone())).or_insert_with(|| row.clone());
        }
        Ok(())
    }

    fn insert_reco_configs(&self, rows: &[RecoConfigRow]) -> Result<(), FeederError> {
        self.begin_insert()?;
        let mut map = lock(&self.reco_configs);
        for row in rows {
            map.entry(PrimaryDatasetKey { run: row.run,
                                          primds: row.primds.clone() })
               .or_insert_with(|| row.clone());
        }
        Ok(())
    }

    fn insert_reco_locks(&self, rows: &[RecoLockRecord]) -> Result<(), FeederError> {
        self.begin_insert()?;
        let mut map = lock(&self.reco_locks);
        for row in rows {
            let entry = map.entry(row.run).or_insert(false);
            *entry = *entry || row.locked;
        }
        Ok(())
    }

    fn insert_dataset_locks(&self, paths: &[String]) -> Result<(), FeederError> {
        self.begin_insert()?;
        lock(&self.dataset_locks).extend(paths.iter().cloned());
        Ok(())
    }
}

/// Store de monitoreo en memoria: documentos por nombre de request.
#[derive(Default)]
pub struct InMemoryMonitoringStore {
    pub documents: Mutex<BTreeMap<String, (MonitoringDocument, Option<String>)>>,
    rejected: Mutex<BTreeSet<String>>,
}

impl InMemoryMonitoringStore {
    /// Hace que las operaciones sobre `request_name` respondan con un
    /// estado de error.
    pub fn reject(&self, request_name: &str) {
        lock(&self.rejected).insert(request_name.to_string());
    }

    pub fn status_of(&self, request_name: &str) -> Option<String> {
        lock(&self.documents).get(request_name).and_then(|(_, s)| s.clone())
    }

    pub fn contains(&self, request_name: &str) -> bool {
        lock(&self.documents).contains_key(request_name)
    }
}

impl MonitoringStore for InMemoryMonitoringStore {
    fn insert(&self, document: &MonitoringDocument) -> Result<MonitoringStatus, FeederError> {
        if lock(&self.rejected).contains(&document.request_name) {
            return Ok(MonitoringStatus::Other("rejected".into()));
        }
        let mut docs = lock(&self.documents);
        if docs.contains_key(&document.request_name) {
            return Ok(MonitoringStatus::Exists);
        }
        docs.insert(document.request_name.clone(), (document.clone(), None));
        Ok(MonitoringStatus::Ok)
    }

    fn update_status(&self, request_name: &str, status: &str) -> Result<MonitoringStatus, FeederError> {
        if lock(&self.rejected).contains(request_name) {
            return Ok(MonitoringStatus::Other("rejected".into()));
        }
        let mut docs = lock(&self.documents);
        let entry = docs.entry(request_name.to_string()).or_insert_with(|| {
                                                               (MonitoringDocument { doc_id: crate::monitoring::stable_doc_id(request_name),
                                                                                     request_name: request_name.to_string(),
                                                                                     run: 0 },
                                                                None)
                                                           });
        entry.1 = Some(status.to_string());
        Ok(MonitoringStatus::Ok)
    }
}

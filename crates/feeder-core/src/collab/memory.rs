//! Dobles en memoria de los colaboradores: registran las llamadas y pueden
//! configurarse para fallar.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ClosureTracker, ConditionUploader, DropboxCredentials, Notifier, ReadinessSource, RunConfigurator, TriggerConfig,
            TriggerConfigSource};
use crate::config::PipelineConfig;
use crate::errors::FeederError;
use crate::model::{RunNumber, RunStreamKey};
use crate::process::ProcessOutput;
use crate::store::InMemoryFeederStore;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Fuente de trigger con configuraciones fijas por clave.
#[derive(Default)]
pub struct StaticTriggerSource {
    configs: BTreeMap<String, TriggerConfig>,
}

impl StaticTriggerSource {
    pub fn with(mut self, key: &str, config: TriggerConfig) -> Self {
        self.configs.insert(key.to_string(), config);
        self
    }
}

impl TriggerConfigSource for StaticTriggerSource {
    fn get_config(&self, trigger_key: &str) -> Result<TriggerConfig, FeederError> {
        self.configs
            .get(trigger_key)
            .cloned()
            .unwrap_or_default()
            .validate(trigger_key)
    }
}

/// Configurador que registra lo configurado y, si tiene store, refleja el
/// efecto (run configurado, fileset abierto por run/stream).
#[derive(Default)]
pub struct RecordingConfigurator {
    store: Option<Arc<InMemoryFeederStore>>,
    failing_runs: BTreeSet<RunNumber>,
    failing_run_streams: BTreeSet<RunStreamKey>,
    fail_prompt_reco: bool,
    pub runs: Mutex<Vec<(RunNumber, Option<TriggerConfig>)>>,
    pub run_streams: Mutex<Vec<RunStreamKey>>,
    prompt_reco_calls: AtomicUsize,
}

impl RecordingConfigurator {
    pub fn with_store(store: Arc<InMemoryFeederStore>) -> Self {
        Self { store: Some(store), ..Self::default() }
    }

    pub fn failing_run(mut self, run: RunNumber) -> Self {
        self.failing_runs.insert(run);
        self
    }

    pub fn failing_run_stream(mut self, key: RunStreamKey) -> Self {
        self.failing_run_streams.insert(key);
        self
    }

    pub fn failing_prompt_reco(mut self) -> Self {
        self.fail_prompt_reco = true;
        self
    }

    pub fn configured_runs(&self) -> Vec<RunNumber> {
        lock(&self.runs).iter().map(|(r, _)| *r).collect()
    }

    pub fn configured_run_streams(&self) -> Vec<RunStreamKey> {
        lock(&self.run_streams).clone()
    }

    pub fn prompt_reco_calls(&self) -> usize {
        self.prompt_reco_calls.load(Ordering::SeqCst)
    }
}

impl RunConfigurator for RecordingConfigurator {
    fn configure_run(&self, _config: &PipelineConfig, run: RunNumber, trigger: Option<&TriggerConfig>) -> Result<(), FeederError> {
        if self.failing_runs.contains(&run) {
            return Err(FeederError::collaborator("run-configurator", format!("run {run} rejected")));
        }
        lock(&self.runs).push((run, trigger.cloned()));
        if let Some(store) = &self.store {
            if let Some(r) = store.tables().runs.get_mut(&run) {
                r.configured = true;
            }
        }
        Ok(())
    }

    fn configure_run_stream(&self,
                            _config: &PipelineConfig,
                            run: RunNumber,
                            stream: &str,
                            _spec_dir: &Path,
                            _upload_proxy: Option<&Path>)
                            -> Result<(), FeederError> {
        let key = RunStreamKey::new(run, stream);
        if self.failing_runs.contains(&run) || self.failing_run_streams.contains(&key) {
            return Err(FeederError::collaborator("run-configurator", format!("run/stream {run}/{stream} rejected")));
        }
        if let Some(store) = &self.store {
            store.register_run_stream(key.clone());
        }
        lock(&self.run_streams).push(key);
        Ok(())
    }

    fn release_prompt_reco(&self, _config: &PipelineConfig, _spec_dir: &Path, _upload_proxy: Option<&Path>) -> Result<(), FeederError> {
        self.prompt_reco_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_prompt_reco {
            return Err(FeederError::collaborator("run-configurator", "prompt reco release failed"));
        }
        Ok(())
    }
}

/// Registra el orden de las llamadas de cierre.
#[derive(Default)]
pub struct RecordingClosureTracker {
    pub calls: Mutex<Vec<&'static str>>,
}

impl RecordingClosureTracker {
    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    fn record(&self, name: &'static str) -> Result<(), FeederError> {
        lock(&self.calls).push(name);
        Ok(())
    }
}

impl ClosureTracker for RecordingClosureTracker {
    fn stop_runs(&self) -> Result<(), FeederError> {
        self.record("stop_runs")
    }

    fn close_runs(&self) -> Result<(), FeederError> {
        self.record("close_runs")
    }

    fn close_lumi_sections(&self) -> Result<(), FeederError> {
        self.record("close_lumi_sections")
    }

    fn close_run_stream_filesets(&self) -> Result<(), FeederError> {
        self.record("close_run_stream_filesets")
    }

    fn check_active_split_lumis(&self) -> Result<(), FeederError> {
        self.record("check_active_split_lumis")
    }
}

/// Readiness fija: sólo las corridas listadas están listas.
pub struct StaticReadiness {
    ready: BTreeSet<RunNumber>,
}

impl StaticReadiness {
    pub fn new(ready: impl IntoIterator<Item = RunNumber>) -> Self {
        Self { ready: ready.into_iter().collect() }
    }
}

impl ReadinessSource for StaticReadiness {
    fn filter_ready(&self, candidates: &[RunNumber]) -> Result<Vec<RunNumber>, FeederError> {
        Ok(candidates.iter().filter(|r| self.ready.contains(r)).copied().collect())
    }
}

#[derive(Default)]
pub struct RecordingUploader {
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingUploader {
    pub fn failing() -> Self {
        Self { failing: AtomicBool::new(true), ..Self::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ConditionUploader for RecordingUploader {
    fn upload(&self, _credentials: &DropboxCredentials, _service_proxy: Option<&Path>) -> Result<(), FeederError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FeederError::collaborator("condition-uploader", "dropbox unreachable"));
        }
        Ok(())
    }
}

/// Cómo responde el notificador en memoria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifierBehavior {
    #[default]
    Succeed,
    /// Termina con salida de error.
    ErrorOutput,
    /// No se puede lanzar.
    Unreachable,
}

#[derive(Default)]
pub struct RecordingNotifier {
    behavior: NotifierBehavior,
    pub chunks: Mutex<Vec<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new(behavior: NotifierBehavior) -> Self {
        Self { behavior, chunks: Mutex::new(Vec::new()) }
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        lock(&self.chunks).iter().map(Vec::len).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, basenames: &[&str]) -> Result<ProcessOutput, FeederError> {
        lock(&self.chunks).push(basenames.iter().map(|s| s.to_string()).collect());
        match self.behavior {
            NotifierBehavior::Succeed => Ok(ProcessOutput { code: Some(0), ..ProcessOutput::default() }),
            NotifierBehavior::ErrorOutput => Ok(ProcessOutput { code: Some(1),
                                                                stdout: String::new(),
                                                                stderr: "connection refused".into() }),
            NotifierBehavior::Unreachable => Err(FeederError::Process("spawn /bin/bash: not found".into())),
        }
    }
}

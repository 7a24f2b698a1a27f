//! Loop de control del feeder.
//!
//! `ControlLoop::run_cycle` ejecuta las dieciséis fases de un ciclo de
//! sondeo en orden estricto. Cada fase vuelve a derivar su entrada del store,
//! así que un ciclo abortado a medias se retoma correctamente en el
//! siguiente.
//!
//! Política de errores
//! - Configuración de pipeline inválida: se saltan las fases 2 y 3 (y la
//!   liberación PromptReco, que la consume); el resto del ciclo sigue.
//! - Fallos por corrida o run/stream: quedan en el `ConfigurationReport`.
//! - Feed (fase 10): se registra y se relanza; el ciclo aborta.
//! - Notificador y subida de condiciones: best-effort, sólo se registran.
//! - Cualquier otro error propaga y aborta el ciclo.
//!
//! Los componentes opcionales (data service, notificación, readiness) se
//! deciden al construir: si no están, la fase no existe.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::collab::{ClosureTracker, ConditionUploader, DropboxCredentials, Notifier, ReadinessSource, RunConfigurator,
                    TriggerConfigSource};
use crate::config::{FeederSettings, PipelineConfig};
use crate::discovery::{ConfigurationReport, RunStreamDiscovery};
use crate::errors::FeederError;
use crate::model::RunNumber;
use crate::monitoring::MonitoringPublisher;
use crate::notify::{NotificationDispatcher, NotificationReport, ScriptNotifier};
use crate::release::ReleaseGates;
use crate::store::{DataSvcStore, FeederStore, MonitoringStore};
use crate::sync::{DataSvcSync, SyncReport};

/// Resumen de un ciclo.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pipeline_config_loaded: bool,
    pub configuration: ConfigurationReport,
    pub express_released: Vec<RunNumber>,
    pub prompt_reco_released: bool,
    pub sync: Option<SyncReport>,
    pub workflows_injected: usize,
    pub files_fed: usize,
    pub workflows_published: usize,
    pub workflows_closed: usize,
    pub notifications: Option<NotificationReport>,
    pub conditions_uploaded: bool,
}

impl CycleReport {
    fn start() -> Self {
        Self { cycle_id: Uuid::new_v4(),
               started_at: Utc::now(),
               finished_at: None,
               pipeline_config_loaded: false,
               configuration: ConfigurationReport::default(),
               express_released: Vec::new(),
               prompt_reco_released: false,
               sync: None,
               workflows_injected: 0,
               files_fed: 0,
               workflows_published: 0,
               workflows_closed: 0,
               notifications: None,
               conditions_uploaded: false }
    }
}

pub struct ControlLoop {
    store: Arc<dyn FeederStore>,
    settings: FeederSettings,
    discovery: RunStreamDiscovery,
    closure: Arc<dyn ClosureTracker>,
    release: ReleaseGates,
    sync: Option<DataSvcSync>,
    monitoring: MonitoringPublisher,
    notifications: Option<NotificationDispatcher>,
    uploader: Arc<dyn ConditionUploader>,
}

impl ControlLoop {
    pub fn builder(store: Arc<dyn FeederStore>, settings: FeederSettings) -> ControlLoopBuilder {
        ControlLoopBuilder::new(store, settings)
    }

    pub fn has_datasvc(&self) -> bool {
        self.sync.is_some()
    }

    pub fn has_notifications(&self) -> bool {
        self.notifications.is_some()
    }

    /// Ejecuta un ciclo completo.
    pub fn run_cycle(&self) -> Result<CycleReport, FeederError> {
        let mut report = CycleReport::start();
        let cycle = report.cycle_id;
        info!("cycle:start cycle_id={cycle}");

        // 1. configuración del pipeline
        let config = match self.settings.load_pipeline_config() {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                warn!("cycle:config unusable cycle_id={cycle} err={e}; skipping run configuration");
                None
            }
        };
        report.pipeline_config_loaded = config.is_some();

        // 2-3. corridas y run/streams nuevos
        if let Some(cfg) = &config {
            report.configuration = self.discovery.configure_new_runs(cfg)?;
            report.configuration.merge(self.discovery.configure_new_run_streams(cfg)?);
        }

        // 4. cierre de corridas
        self.closure.stop_runs()?;
        self.closure.close_runs()?;

        // 5-6. liberaciones
        report.express_released = self.release.release_express()?;
        // PromptReco necesita la configuración del pipeline; sin ella se salta.
        report.prompt_reco_released = self.release_prompt_reco(config.as_ref())?;

        // 7. data service
        if let Some(sync) = &self.sync {
            report.sync = Some(sync.run()?);
        }

        // 8. inyección
        report.workflows_injected = self.store.mark_workflows_injected(self.notifications.is_some())?;

        // 9. cierre de lumis
        self.closure.close_lumi_sections()?;

        // 10. feed transaccional
        report.files_fed = match self.store.feed_streamers() {
            Ok(n) => n,
            Err(e) => {
                error!("cycle:feed aborted cycle_id={cycle} err={e}");
                return Err(e);
            }
        };

        // 11-12. cierre de filesets y limpieza de splits activos
        self.closure.close_run_stream_filesets()?;
        self.closure.check_active_split_lumis()?;

        // 13-14. monitoreo
        report.workflows_published = self.monitoring.publish_new_workflows()?;
        report.workflows_closed = self.monitoring.close_out_workflows()?;

        // 15. notificación al sistema de transferencia
        if let Some(dispatcher) = &self.notifications {
            report.notifications = Some(dispatcher.dispatch()?);
        }

        // 16. condiciones
        report.conditions_uploaded = self.upload_conditions();

        report.finished_at = Some(Utc::now());
        info!("cycle:done cycle_id={cycle} configured={} express_released={} fed={} published={} closed={}",
              report.configuration.configured(),
              report.express_released.len(),
              report.files_fed,
              report.workflows_published,
              report.workflows_closed);
        Ok(report)
    }

    /// El colaborador de PromptReco exige un `PipelineConfig`.
    fn release_prompt_reco(&self, config: Option<&PipelineConfig>) -> Result<bool, FeederError> {
        match config {
            Some(cfg) => {
                self.release.release_prompt_reco(cfg)?;
                Ok(true)
            }
            None => {
                warn!("cycle:prompt_reco skipped without pipeline configuration");
                Ok(false)
            }
        }
    }

    fn upload_conditions(&self) -> bool {
        let credentials = DropboxCredentials { user: self.settings.dropbox_user.clone(),
                                               password: self.settings.dropbox_pass.clone() };
        match self.uploader.upload(&credentials, self.settings.service_proxy.as_deref()) {
            Ok(()) => true,
            Err(e) => {
                warn!("cycle:conditions upload failed err={e}");
                false
            }
        }
    }
}

/// Builder de `ControlLoop`.
///
/// Colaboradores obligatorios: fuente de trigger, configurador, cierre,
/// monitoreo y uploader. El data service, el readiness y el notificador son
/// opcionales; si no se da notificador pero el directorio del sistema de
/// transferencia existe, se usa `ScriptNotifier`.
pub struct ControlLoopBuilder {
    store: Arc<dyn FeederStore>,
    settings: FeederSettings,
    triggers: Option<Arc<dyn TriggerConfigSource>>,
    configurator: Option<Arc<dyn RunConfigurator>>,
    closure: Option<Arc<dyn ClosureTracker>>,
    readiness: Option<Arc<dyn ReadinessSource>>,
    datasvc: Option<Arc<dyn DataSvcStore>>,
    monitoring: Option<Arc<dyn MonitoringStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    uploader: Option<Arc<dyn ConditionUploader>>,
}

impl ControlLoopBuilder {
    pub fn new(store: Arc<dyn FeederStore>, settings: FeederSettings) -> Self {
        Self { store,
               settings,
               triggers: None,
               configurator: None,
               closure: None,
               readiness: None,
               datasvc: None,
               monitoring: None,
               notifier: None,
               uploader: None }
    }

    pub fn triggers(mut self, triggers: Arc<dyn TriggerConfigSource>) -> Self {
        self.triggers = Some(triggers);
        self
    }

    pub fn configurator(mut self, configurator: Arc<dyn RunConfigurator>) -> Self {
        self.configurator = Some(configurator);
        self
    }

    pub fn closure(mut self, closure: Arc<dyn ClosureTracker>) -> Self {
        self.closure = Some(closure);
        self
    }

    pub fn readiness(mut self, readiness: Option<Arc<dyn ReadinessSource>>) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn datasvc(mut self, datasvc: Option<Arc<dyn DataSvcStore>>) -> Self {
        self.datasvc = datasvc;
        self
    }

    pub fn monitoring(mut self, monitoring: Arc<dyn MonitoringStore>) -> Self {
        self.monitoring = Some(monitoring);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn uploader(mut self, uploader: Arc<dyn ConditionUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn build(self) -> Result<ControlLoop, FeederError> {
        fn required<T>(value: Option<T>, name: &str) -> Result<T, FeederError> {
            value.ok_or_else(|| FeederError::Config(format!("control loop requires {name}")))
        }

        let triggers = required(self.triggers, "a trigger configuration source")?;
        let configurator = required(self.configurator, "a run configurator")?;
        let closure = required(self.closure, "a closure tracker")?;
        let monitoring = required(self.monitoring, "a monitoring store")?;
        let uploader = required(self.uploader, "a condition uploader")?;

        let spec_dir: PathBuf = self.settings.spec_dir.clone();
        let upload_proxy = self.settings.dqm_upload_proxy.clone();

        let notifier: Option<Arc<dyn Notifier>> =
            self.notifier.or_else(|| {
                             self.settings
                                 .transfer_system_base_dir()
                                 .map(|dir| Arc::new(ScriptNotifier::new(dir)) as Arc<dyn Notifier>)
                         });
        let notifications =
            notifier.map(|n| NotificationDispatcher::new(self.store.clone(), n, self.settings.notify_chunk_size));
        let sync = self.datasvc.map(|d| DataSvcSync::new(self.store.clone(), d));
        debug!("control_loop:build datasvc={} notifications={} readiness={}",
               sync.is_some(),
               notifications.is_some(),
               self.readiness.is_some());

        Ok(ControlLoop { discovery: RunStreamDiscovery::new(self.store.clone(),
                                                            triggers,
                                                            configurator.clone(),
                                                            spec_dir.clone(),
                                                            upload_proxy.clone()),
                         release: ReleaseGates::new(self.store.clone(), self.readiness, configurator, spec_dir, upload_proxy),
                         monitoring: MonitoringPublisher::new(self.store.clone(), monitoring),
                         store: self.store,
                         settings: self.settings,
                         closure,
                         sync,
                         notifications,
                         uploader })
    }
}

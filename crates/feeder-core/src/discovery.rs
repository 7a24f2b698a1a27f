//! Descubrimiento y configuración de corridas y run/streams nuevos.
//!
//! Cada intento produce un `ConfigOutcome` que se acumula en un
//! `ConfigurationReport`. Un fallo queda aislado a su corrida o run/stream:
//! se registra y se sigue con el siguiente, y como el store no cambia, el
//! siguiente ciclo lo vuelve a intentar.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Serialize;

use crate::collab::{RunConfigurator, TriggerConfigSource};
use crate::config::PipelineConfig;
use crate::errors::FeederError;
use crate::model::{RunNumber, RunStreamKey};
use crate::store::FeederStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ConfigTarget {
    Run(RunNumber),
    RunStream(RunStreamKey),
}

impl fmt::Display for ConfigTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigTarget::Run(run) => write!(f, "run {run}"),
            ConfigTarget::RunStream(key) => write!(f, "run/stream {key}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConfigOutcome {
    Configured,
    /// Configuración de trigger ausente o inválida; se reintenta luego.
    Skipped { reason: String },
    Failed { reason: String },
}

/// Resultado por ítem, en el orden en que se intentaron.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigurationReport {
    outcomes: IndexMap<ConfigTarget, ConfigOutcome>,
}

impl ConfigurationReport {
    pub fn record(&mut self, target: ConfigTarget, outcome: ConfigOutcome) {
        self.outcomes.insert(target, outcome);
    }

    pub fn outcome(&self, target: &ConfigTarget) -> Option<&ConfigOutcome> {
        self.outcomes.get(target)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConfigTarget, &ConfigOutcome)> {
        self.outcomes.iter()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn configured(&self) -> usize {
        self.outcomes.values().filter(|o| matches!(o, ConfigOutcome::Configured)).count()
    }

    pub fn unconfigured(&self) -> Vec<&ConfigTarget> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, ConfigOutcome::Configured))
            .map(|(t, _)| t)
            .collect()
    }

    /// Une otro informe a continuación de este.
    pub fn merge(&mut self, other: ConfigurationReport) {
        self.outcomes.extend(other.outcomes);
    }
}

pub struct RunStreamDiscovery {
    store: Arc<dyn FeederStore>,
    triggers: Arc<dyn TriggerConfigSource>,
    configurator: Arc<dyn RunConfigurator>,
    spec_dir: PathBuf,
    upload_proxy: Option<PathBuf>,
}

impl RunStreamDiscovery {
    pub fn new(store: Arc<dyn FeederStore>,
               triggers: Arc<dyn TriggerConfigSource>,
               configurator: Arc<dyn RunConfigurator>,
               spec_dir: PathBuf,
               upload_proxy: Option<PathBuf>)
               -> Self {
        Self { store,
               triggers,
               configurator,
               spec_dir,
               upload_proxy }
    }

    /// Configura las corridas nuevas en orden de número de corrida.
    ///
    /// Los errores del store al listar se propagan; los de cada corrida
    /// quedan en el informe.
    pub fn configure_new_runs(&self, config: &PipelineConfig) -> Result<ConfigurationReport, FeederError> {
        let mut runs = self.store.find_new_runs()?;
        runs.sort_by_key(|r| r.run);
        debug!("discovery:runs count={}", runs.len());

        let mut report = ConfigurationReport::default();
        for new_run in runs {
            let target = ConfigTarget::Run(new_run.run);
            let trigger = match new_run.trigger_key.as_deref() {
                None => None,
                Some(key) => match self.triggers.get_config(key) {
                    Ok(cfg) => Some(cfg),
                    Err(e) => {
                        warn!("discovery:run skipped run={} trigger_key={key} err={e}", new_run.run);
                        report.record(target, ConfigOutcome::Skipped { reason: e.to_string() });
                        continue;
                    }
                },
            };
            let outcome = match self.configurator.configure_run(config, new_run.run, trigger.as_ref()) {
                Ok(()) => {
                    info!("discovery:run configured run={} local={}", new_run.run, new_run.is_local());
                    ConfigOutcome::Configured
                }
                Err(e) => {
                    warn!("discovery:run failed run={} err={e}", new_run.run);
                    ConfigOutcome::Failed { reason: e.to_string() }
                }
            };
            report.record(target, outcome);
        }
        Ok(report)
    }

    /// Configura los run/streams nuevos, ordenados por corrida y stream.
    pub fn configure_new_run_streams(&self, config: &PipelineConfig) -> Result<ConfigurationReport, FeederError> {
        let mut keys = self.store.find_new_run_streams()?;
        keys.sort();
        debug!("discovery:run_streams count={}", keys.len());

        let mut report = ConfigurationReport::default();
        for key in keys {
            let outcome = match self.configurator.configure_run_stream(config,
                                                                       key.run,
                                                                       &key.stream,
                                                                       &self.spec_dir,
                                                                       self.upload_proxy.as_deref())
            {
                Ok(()) => {
                    info!("discovery:run_stream configured key={key}");
                    ConfigOutcome::Configured
                }
                Err(e) => {
                    warn!("discovery:run_stream failed key={key} err={e}");
                    ConfigOutcome::Failed { reason: e.to_string() }
                }
            };
            report.record(ConfigTarget::RunStream(key), outcome);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{RecordingConfigurator, StaticTriggerSource, TriggerConfig, TriggerPath};
    use crate::store::InMemoryFeederStore;

    fn pipeline() -> PipelineConfig {
        PipelineConfig::parse(r#"{ "global": { "acquisition_era": "Run2026A" } }"#).unwrap()
    }

    fn valid_trigger() -> TriggerConfig {
        TriggerConfig { process: Some("HLT".into()),
                        mapping: vec![TriggerPath { stream: "A".into(),
                                                    primary_dataset: "ZeroBias".into(),
                                                    path: "HLT_ZeroBias_v1".into() }] }
    }

    fn discovery(store: Arc<InMemoryFeederStore>, configurator: Arc<RecordingConfigurator>) -> RunStreamDiscovery {
        let triggers = StaticTriggerSource::default().with("/cdaq/good", valid_trigger());
        RunStreamDiscovery::new(store, Arc::new(triggers), configurator, PathBuf::from("/specs"), None)
    }

    #[test]
    fn runs_are_configured_in_order_and_local_runs_skip_trigger_lookup() {
        let store = Arc::new(InMemoryFeederStore::default());
        store.add_run(300, Some("/cdaq/good"));
        store.add_run(100, None);
        let configurator = Arc::new(RecordingConfigurator::with_store(store.clone()));
        let report = discovery(store.clone(), configurator.clone()).configure_new_runs(&pipeline()).unwrap();

        assert_eq!(configurator.configured_runs(), vec![100, 300]);
        assert_eq!(report.configured(), 2);
        let runs = configurator.runs.lock().unwrap();
        assert!(runs[0].1.is_none());
        assert_eq!(runs[1].1.as_ref().and_then(|t| t.process.clone()), Some("HLT".into()));
    }

    #[test]
    fn invalid_trigger_key_only_skips_its_run() {
        let store = Arc::new(InMemoryFeederStore::default());
        store.add_run(100, Some("/cdaq/unknown"));
        store.add_run(200, Some("/cdaq/good"));
        let configurator = Arc::new(RecordingConfigurator::with_store(store.clone()));
        let report = discovery(store.clone(), configurator.clone()).configure_new_runs(&pipeline()).unwrap();

        assert_eq!(configurator.configured_runs(), vec![200]);
        assert!(matches!(report.outcome(&ConfigTarget::Run(100)), Some(ConfigOutcome::Skipped { .. })));
        assert_eq!(report.unconfigured(), vec![&ConfigTarget::Run(100)]);
        // La corrida saltada sigue pendiente para el próximo ciclo.
        let pending: Vec<_> = store.find_new_runs().unwrap().into_iter().map(|r| r.run).collect();
        assert_eq!(pending, vec![100]);
    }

    #[test]
    fn configurator_failure_is_isolated() {
        let store = Arc::new(InMemoryFeederStore::default());
        store.add_run(100, None);
        store.add_run(200, None);
        let configurator = Arc::new(RecordingConfigurator::with_store(store.clone()).failing_run(100));
        let report = discovery(store, configurator.clone()).configure_new_runs(&pipeline()).unwrap();
        assert!(matches!(report.outcome(&ConfigTarget::Run(100)), Some(ConfigOutcome::Failed { .. })));
        assert_eq!(configurator.configured_runs(), vec![200]);
    }

    #[test]
    fn run_streams_are_sorted_by_run_then_stream() {
        let store = Arc::new(InMemoryFeederStore::default());
        store.add_run(200, None);
        store.add_run(100, None);
        store.tables().runs.values_mut().for_each(|r| r.configured = true);
        store.add_streamer(200, "B", 1, "/store/200_B_1.dat");
        store.add_streamer(200, "A", 1, "/store/200_A_1.dat");
        store.add_streamer(100, "C", 1, "/store/100_C_1.dat");
        let configurator = Arc::new(RecordingConfigurator::with_store(store.clone()));
        let report = discovery(store.clone(), configurator.clone()).configure_new_run_streams(&pipeline()).unwrap();

        assert_eq!(configurator.configured_run_streams(),
                   vec![RunStreamKey::new(100, "C"), RunStreamKey::new(200, "A"), RunStreamKey::new(200, "B")]);
        assert_eq!(report.len(), 3);
        assert!(store.find_new_run_streams().unwrap().is_empty());
    }

    #[test]
    fn failed_run_stream_does_not_block_the_next_ones() {
        let store = Arc::new(InMemoryFeederStore::default());
        store.add_run(100, None);
        store.add_run(200, None);
        store.tables().runs.values_mut().for_each(|r| r.configured = true);
        store.add_streamer(100, "A", 1, "/store/100_A_1.dat");
        store.add_streamer(100, "B", 1, "/store/100_B_1.dat");
        store.add_streamer(200, "A", 1, "/store/200_A_1.dat");
        let configurator =
            Arc::new(RecordingConfigurator::with_store(store.clone()).failing_run_stream(RunStreamKey::new(100, "A")));
        let report = discovery(store.clone(), configurator.clone()).configure_new_run_streams(&pipeline()).unwrap();

        assert!(matches!(report.outcome(&ConfigTarget::RunStream(RunStreamKey::new(100, "A"))),
                         Some(ConfigOutcome::Failed { .. })));
        assert_eq!(report.outcome(&ConfigTarget::RunStream(RunStreamKey::new(100, "B"))),
                   Some(&ConfigOutcome::Configured));
        assert_eq!(report.outcome(&ConfigTarget::RunStream(RunStreamKey::new(200, "A"))),
                   Some(&ConfigOutcome::Configured));
        assert_eq!(configurator.configured_run_streams(), vec![RunStreamKey::new(100, "B"), RunStreamKey::new(200, "A")]);
        // El run/stream fallido se reintenta en el próximo ciclo.
        assert_eq!(store.find_new_run_streams().unwrap(), vec![RunStreamKey::new(100, "A")]);
    }
}

//! Liberación de Express y PromptReco.
//!
//! Express pasa por dos etapas de readiness: el resumen de corrida (consulta
//! del store) y, si hay fuente configurada, la confirmación externa. Sólo se
//! liberan las corridas presentes en ambas.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};

use crate::collab::{ReadinessSource, RunConfigurator};
use crate::config::PipelineConfig;
use crate::errors::FeederError;
use crate::model::RunNumber;
use crate::store::FeederStore;

pub struct ReleaseGates {
    store: Arc<dyn FeederStore>,
    readiness: Option<Arc<dyn ReadinessSource>>,
    configurator: Arc<dyn RunConfigurator>,
    spec_dir: PathBuf,
    upload_proxy: Option<PathBuf>,
}

impl ReleaseGates {
    pub fn new(store: Arc<dyn FeederStore>,
               readiness: Option<Arc<dyn ReadinessSource>>,
               configurator: Arc<dyn RunConfigurator>,
               spec_dir: PathBuf,
               upload_proxy: Option<PathBuf>)
               -> Self {
        Self { store,
               readiness,
               configurator,
               spec_dir,
               upload_proxy }
    }

    /// Libera Express para las corridas listas. Devuelve las liberadas en
    /// orden ascendente.
    pub fn release_express(&self) -> Result<Vec<RunNumber>, FeederError> {
        let candidates: BTreeSet<RunNumber> = self.store.find_new_express_runs()?.into_iter().collect();
        if candidates.is_empty() {
            debug!("release:express no candidates");
            return Ok(Vec::new());
        }

        let ready: BTreeSet<RunNumber> = match &self.readiness {
            None => candidates.clone(),
            Some(source) => {
                let as_vec: Vec<RunNumber> = candidates.iter().copied().collect();
                source.filter_ready(&as_vec)?.into_iter().collect()
            }
        };
        let released: Vec<RunNumber> = candidates.intersection(&ready).copied().collect();
        debug!("release:express candidates={} ready={}", candidates.len(), released.len());
        if released.is_empty() {
            return Ok(released);
        }

        self.store.release_express(&released)?;
        info!("release:express runs={released:?}");
        Ok(released)
    }

    /// Delegado por completo al configurador; su error se propaga.
    pub fn release_prompt_reco(&self, config: &PipelineConfig) -> Result<(), FeederError> {
        debug!("release:prompt_reco start");
        self.configurator.release_prompt_reco(config, &self.spec_dir, self.upload_proxy.as_deref())
    }
}

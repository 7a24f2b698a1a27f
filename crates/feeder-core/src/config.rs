//! Configuración del pipeline y parámetros del feeder.
//!
//! `PipelineConfig` es el documento JSON que describe cómo se procesa cada
//! stream y cada primary dataset. Se relee al comienzo de cada ciclo: si no
//! se puede leer o no valida, el ciclo sigue sin las fases de configuración.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_NOTIFY_CHUNK_SIZE;
use crate::errors::FeederError;

/// Parámetros globales de la toma de datos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSettings {
    pub acquisition_era: String,
    #[serde(default)]
    pub processing_site: Option<String>,
    /// Retardo (segundos) entre el fin de la corrida y la liberación de
    /// PromptReco.
    #[serde(default)]
    pub prompt_reco_delay_secs: u64,
}

/// Parámetros por stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    pub scenario: String,
    pub cmssw: String,
    pub scram_arch: String,
    #[serde(default)]
    pub express: Option<ExpressSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressSettings {
    pub global_tag: String,
    #[serde(default)]
    pub reco_cmssw: Option<String>,
    #[serde(default)]
    pub alca_skims: Vec<String>,
    #[serde(default)]
    pub dqm_sequences: Vec<String>,
}

/// Parámetros PromptReco por primary dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSettings {
    pub scenario: String,
    pub global_tag: String,
    #[serde(default = "default_true")]
    pub do_reco: bool,
    #[serde(default)]
    pub alca_skims: Vec<String>,
    #[serde(default)]
    pub physics_skims: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub global: GlobalSettings,
    #[serde(default)]
    pub streams: BTreeMap<String, StreamSettings>,
    /// Parámetros del dataset `Default` se aplican a los no listados.
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetSettings>,
}

impl PipelineConfig {
    /// Lee y valida el documento.
    pub fn load(path: &Path) -> Result<Self, FeederError> {
        let raw = fs::read_to_string(path).map_err(|e| FeederError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, FeederError> {
        let config: PipelineConfig = serde_json::from_str(raw).map_err(|e| FeederError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FeederError> {
        if self.global.acquisition_era.trim().is_empty() {
            return Err(FeederError::Config("global.acquisition_era is empty".into()));
        }
        for (name, stream) in &self.streams {
            if stream.cmssw.trim().is_empty() || stream.scram_arch.trim().is_empty() {
                return Err(FeederError::Config(format!("stream {name}: cmssw and scram_arch are required")));
            }
            if let Some(express) = &stream.express {
                if express.global_tag.trim().is_empty() {
                    return Err(FeederError::Config(format!("stream {name}: express global_tag is empty")));
                }
            }
        }
        for (name, dataset) in &self.datasets {
            if dataset.global_tag.trim().is_empty() {
                return Err(FeederError::Config(format!("dataset {name}: global_tag is empty")));
            }
        }
        Ok(())
    }

    pub fn stream(&self, name: &str) -> Option<&StreamSettings> {
        self.streams.get(name)
    }

    /// Parámetros del dataset, o los de `Default` si no está listado.
    pub fn dataset(&self, name: &str) -> Option<&DatasetSettings> {
        self.datasets.get(name).or_else(|| self.datasets.get("Default"))
    }
}

/// Parámetros operativos del feeder (rutas, credenciales, lotes).
#[derive(Clone, Default)]
pub struct FeederSettings {
    pub pipeline_config: PathBuf,
    pub spec_dir: PathBuf,
    pub dqm_upload_proxy: Option<PathBuf>,
    pub service_proxy: Option<PathBuf>,
    pub dropbox_user: Option<String>,
    pub dropbox_pass: Option<String>,
    transfer_system_base_dir: Option<PathBuf>,
    pub notify_chunk_size: usize,
}

impl std::fmt::Debug for FeederSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeederSettings")
         .field("pipeline_config", &self.pipeline_config)
         .field("spec_dir", &self.spec_dir)
         .field("dqm_upload_proxy", &self.dqm_upload_proxy)
         .field("service_proxy", &self.service_proxy)
         .field("dropbox_user", &self.dropbox_user)
         .field("dropbox_pass", &self.dropbox_pass.as_ref().map(|_| "***"))
         .field("transfer_system_base_dir", &self.transfer_system_base_dir)
         .field("notify_chunk_size", &self.notify_chunk_size)
         .finish()
    }
}

impl FeederSettings {
    pub fn new(pipeline_config: impl Into<PathBuf>, spec_dir: impl Into<PathBuf>) -> Self {
        Self { pipeline_config: pipeline_config.into(),
               spec_dir: spec_dir.into(),
               notify_chunk_size: DEFAULT_NOTIFY_CHUNK_SIZE,
               ..Self::default() }
    }

    /// Fija el directorio del sistema de transferencia. Si no existe se
    /// ignora y el despacho de notificaciones queda desactivado.
    pub fn with_transfer_system_base_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.transfer_system_base_dir = dir.filter(|d| {
                                               let exists = d.is_dir();
                                               if !exists {
                                                   log::warn!("settings:transfer_dir missing path={}", d.display());
                                               }
                                               exists
                                           });
        self
    }

    pub fn transfer_system_base_dir(&self) -> Option<&Path> {
        self.transfer_system_base_dir.as_deref()
    }

    pub fn with_notify_chunk_size(mut self, size: usize) -> Self {
        self.notify_chunk_size = size.max(1);
        self
    }

    pub fn load_pipeline_config(&self) -> Result<PipelineConfig, FeederError> {
        PipelineConfig::load(&self.pipeline_config)
    }
}

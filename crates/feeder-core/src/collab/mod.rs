//! Colaboradores externos del ciclo.
//!
//! Sólo se fija el contrato de llamada. Las implementaciones productivas
//! viven en `command` (programa externo) y en `feeder-persistence`
//! (configuración de trigger y readiness en Postgres); `memory` ofrece
//! dobles que registran las llamadas.

mod command;
mod memory;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use command::CommandCollaborator;
pub use memory::{NotifierBehavior, RecordingClosureTracker, RecordingConfigurator, RecordingNotifier, RecordingUploader,
                 StaticReadiness, StaticTriggerSource};

use crate::config::PipelineConfig;
use crate::errors::FeederError;
use crate::model::RunNumber;
use crate::process::ProcessOutput;

/// Entrada del mapeo stream -> primary dataset -> path de trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPath {
    pub stream: String,
    pub primary_dataset: String,
    pub path: String,
}

/// Configuración de trigger de una corrida.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub process: Option<String>,
    pub mapping: Vec<TriggerPath>,
}

impl TriggerConfig {
    /// Sin proceso o sin mapeo la configuración es inválida.
    pub fn validate(self, key: &str) -> Result<Self, FeederError> {
        let missing_process = self.process.as_deref().map(|p| p.trim().is_empty()).unwrap_or(true);
        if missing_process {
            return Err(FeederError::TriggerConfig { key: key.to_string(),
                                                    reason: "no process".into() });
        }
        if self.mapping.is_empty() {
            return Err(FeederError::TriggerConfig { key: key.to_string(),
                                                    reason: "empty mapping".into() });
        }
        Ok(self)
    }
}

pub trait TriggerConfigSource: Send + Sync {
    /// Devuelve la configuración ya validada.
    fn get_config(&self, trigger_key: &str) -> Result<TriggerConfig, FeederError>;
}

pub trait RunConfigurator: Send + Sync {
    fn configure_run(&self, config: &PipelineConfig, run: RunNumber, trigger: Option<&TriggerConfig>) -> Result<(), FeederError>;
    fn configure_run_stream(&self,
                            config: &PipelineConfig,
                            run: RunNumber,
                            stream: &str,
                            spec_dir: &Path,
                            upload_proxy: Option<&Path>)
                            -> Result<(), FeederError>;
    fn release_prompt_reco(&self, config: &PipelineConfig, spec_dir: &Path, upload_proxy: Option<&Path>) -> Result<(), FeederError>;
}

/// Detección y cierre de corridas, lumis y filesets. Todas las operaciones
/// son idempotentes y trabajan sobre el estado actual del store.
pub trait ClosureTracker: Send + Sync {
    fn stop_runs(&self) -> Result<(), FeederError>;
    fn close_runs(&self) -> Result<(), FeederError>;
    fn close_lumi_sections(&self) -> Result<(), FeederError>;
    fn close_run_stream_filesets(&self) -> Result<(), FeederError>;
    fn check_active_split_lumis(&self) -> Result<(), FeederError>;
}

/// Segunda etapa de readiness para Express.
pub trait ReadinessSource: Send + Sync {
    /// Subconjunto de `candidates` confirmado como listo.
    fn filter_ready(&self, candidates: &[RunNumber]) -> Result<Vec<RunNumber>, FeederError>;
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct DropboxCredentials {
    pub user: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for DropboxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropboxCredentials")
         .field("user", &self.user)
         .field("password", &self.password.as_ref().map(|_| "***"))
         .finish()
    }
}

pub trait ConditionUploader: Send + Sync {
    fn upload(&self, credentials: &DropboxCredentials, service_proxy: Option<&Path>) -> Result<(), FeederError>;
}

/// Notificador del sistema de transferencia: una invocación por lote.
pub trait Notifier: Send + Sync {
    fn notify(&self, basenames: &[&str]) -> Result<ProcessOutput, FeederError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> TriggerPath {
        TriggerPath { stream: "A".into(),
                      primary_dataset: "ZeroBias".into(),
                      path: "HLT_ZeroBias_v1".into() }
    }

    #[test]
    fn trigger_config_requires_process_and_mapping() {
        let ok = TriggerConfig { process: Some("HLT".into()), mapping: vec![path()] };
        assert!(ok.validate("k").is_ok());

        let no_process = TriggerConfig { process: None, mapping: vec![path()] };
        assert!(no_process.validate("k").unwrap_err().is_configuration());

        let blank = TriggerConfig { process: Some("  ".into()), mapping: vec![path()] };
        assert!(blank.validate("k").is_err());

        let empty = TriggerConfig { process: Some("HLT".into()), mapping: vec![] };
        let err = empty.validate("/cdaq/key").unwrap_err();
        assert_eq!(err.to_string(), "invalid trigger configuration for key /cdaq/key: empty mapping");
    }

    #[test]
    fn credentials_debug_hides_password() {
        let c = DropboxCredentials { user: Some("t0".into()), password: Some("pw".into()) };
        let text = format!("{c:?}");
        assert!(text.contains("t0"));
        assert!(!text.contains("pw\""));
    }
}

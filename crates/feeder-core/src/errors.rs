//! Errores del core del feeder.
//!
//! Una sola enumeración para todo el ciclo: las capas de persistencia
//! convierten sus errores propios a `FeederError::Store` y los colaboradores
//! externos a `FeederError::Collaborator`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeederError {
    #[error("store error: {0}")]
    Store(String),
    #[error("invalid pipeline configuration: {0}")]
    Config(String),
    #[error("invalid trigger configuration for key {key}: {reason}")]
    TriggerConfig { key: String, reason: String },
    #[error("collaborator {name} failed: {reason}")]
    Collaborator { name: &'static str, reason: String },
    #[error("external process failed: {0}")]
    Process(String),
    #[error("feed transaction aborted: {0}")]
    Feed(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl FeederError {
    /// Atajo para errores de colaboradores externos.
    pub fn collaborator(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Collaborator { name, reason: reason.into() }
    }

    /// Los errores de configuración quedan aislados a la corrida/stream
    /// afectada y se reintentan en el siguiente ciclo.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::TriggerConfig { .. })
    }
}

use feeder_core::FeederError;
use feeder_persistence::PersistenceError;
use thiserror::Error;

/// Errores del binario: arranque, cableado y runtime.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Error de configuración: {0}")]
    Config(String),
    #[error("Error de persistencia: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Error del feeder: {0}")]
    Feeder(#[from] FeederError),
    #[error("Tarea de ciclo abortada: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Error en IO: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_variant_format() {
        let err = AppError::Config("FEEDER_SPEC_DIR no definido".into());
        assert_eq!(err.to_string(), "Error de configuración: FEEDER_SPEC_DIR no definido");
    }

    #[test]
    fn feeder_error_converts() {
        let err: AppError = FeederError::Feed("rollback".into()).into();
        assert_eq!(err.to_string(), "Error del feeder: feed transaction aborted: rollback");
    }

    #[test]
    fn persistence_error_converts() {
        let err: AppError = PersistenceError::NotFound.into();
        assert!(matches!(err, AppError::Persistence(PersistenceError::NotFound)));
    }
}

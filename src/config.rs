//! Configuración central de la aplicación.
//!
//! Carga variables de entorno (.env) y arma `AppConfig`: conexiones a las
//! bases (vía `DbConfig` de la capa de persistencia) y los parámetros del
//! feeder (`FEEDER_*`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use feeder_core::constants::DEFAULT_NOTIFY_CHUNK_SIZE;
use feeder_core::FeederSettings;
use feeder_persistence::DbConfig;
use once_cell::sync::Lazy;

use crate::errors::AppError;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
});

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_FEED_LOCATION: &str = "T0_CH_CERN_Disk";

/// Configuración global de la aplicación.
#[derive(Debug)]
pub struct AppConfig {
    pub database: DbConfig,
    /// Sin URL no hay sincronización con el data service.
    pub datasvc: Option<DbConfig>,
    /// Sin URL se lee del store primario.
    pub trigger: Option<DbConfig>,
    /// Sin URL no hay segunda etapa de readiness Express.
    pub readiness: Option<DbConfig>,
    pub feeder: FeederSettings,
    /// Programa externo para configuración, cierre y condiciones.
    pub collaborator_program: PathBuf,
    pub feed_location: String,
    pub poll_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Lazy::force(&DOTENV_LOADED);
        let database = DbConfig::from_env()?;
        let mut cfg = Self::from_lookup(database, |key| env::var(key).ok())?;
        cfg.datasvc = DbConfig::datasvc_from_env();
        cfg.trigger = DbConfig::trigger_from_env();
        cfg.readiness = DbConfig::readiness_from_env();
        Ok(cfg)
    }

    /// Arma la configuración leyendo las variables `FEEDER_*` con `lookup`.
    pub fn from_lookup<F>(database: DbConfig, lookup: F) -> Result<Self, AppError>
        where F: Fn(&str) -> Option<String>
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| AppError::Config(format!("{key} no definido")));
        let parsed = |key: &str, default: u64| -> Result<u64, AppError> {
            match get(key) {
                None => Ok(default),
                Some(v) => v.trim().parse().map_err(|_| AppError::Config(format!("{key} inválido: {v}"))),
            }
        };

        let chunk_size = parsed("FEEDER_NOTIFY_CHUNK_SIZE", DEFAULT_NOTIFY_CHUNK_SIZE as u64)? as usize;
        let poll_secs = parsed("FEEDER_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_secs == 0 {
            return Err(AppError::Config("FEEDER_POLL_INTERVAL_SECS debe ser mayor a 0".into()));
        }

        let mut feeder = FeederSettings::new(required("FEEDER_PIPELINE_CONFIG")?, required("FEEDER_SPEC_DIR")?)
            .with_transfer_system_base_dir(get("FEEDER_TRANSFER_SYSTEM_BASE_DIR").map(PathBuf::from))
            .with_notify_chunk_size(chunk_size);
        feeder.dqm_upload_proxy = get("FEEDER_DQM_UPLOAD_PROXY").map(PathBuf::from);
        feeder.service_proxy = get("FEEDER_SERVICE_PROXY").map(PathBuf::from);
        feeder.dropbox_user = get("FEEDER_DROPBOX_USER");
        feeder.dropbox_pass = get("FEEDER_DROPBOX_PASS");

        Ok(Self { database,
                  datasvc: None,
                  trigger: None,
                  readiness: None,
                  feeder,
                  collaborator_program: PathBuf::from(required("FEEDER_COLLABORATOR_PROGRAM")?),
                  feed_location: get("FEEDER_FEED_LOCATION").unwrap_or_else(|| DEFAULT_FEED_LOCATION.to_string()),
                  poll_interval: Duration::from_secs(poll_secs) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn db() -> DbConfig {
        DbConfig { url: "postgres://localhost/t0".into(),
                   min_connections: 1,
                   max_connections: 2 }
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    const BASE: &[(&str, &str)] = &[("FEEDER_PIPELINE_CONFIG", "/etc/t0/pipeline.json"),
                                    ("FEEDER_SPEC_DIR", "/data/specs"),
                                    ("FEEDER_COLLABORATOR_PROGRAM", "/usr/bin/t0-collab")];

    #[test]
    fn defaults_apply_when_optional_vars_are_missing() {
        let env = vars(BASE);
        let cfg = AppConfig::from_lookup(db(), |k| env.get(k).cloned()).unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_secs(60));
        assert_eq!(cfg.feed_location, "T0_CH_CERN_Disk");
        assert_eq!(cfg.feeder.notify_chunk_size, 50);
        assert!(cfg.feeder.transfer_system_base_dir().is_none());
        assert!(cfg.datasvc.is_none());
    }

    #[test]
    fn missing_required_var_is_reported() {
        let env = vars(&BASE[..2]);
        let err = AppConfig::from_lookup(db(), |k| env.get(k).cloned()).unwrap_err();
        assert_eq!(err.to_string(), "Error de configuración: FEEDER_COLLABORATOR_PROGRAM no definido");
    }

    #[test]
    fn numeric_vars_are_validated() {
        let mut env = vars(BASE);
        env.insert("FEEDER_POLL_INTERVAL_SECS".into(), "soon".into());
        assert!(AppConfig::from_lookup(db(), |k| env.get(k).cloned()).is_err());
        env.insert("FEEDER_POLL_INTERVAL_SECS".into(), "0".into());
        assert!(AppConfig::from_lookup(db(), |k| env.get(k).cloned()).is_err());
        env.insert("FEEDER_POLL_INTERVAL_SECS".into(), "15".into());
        env.insert("FEEDER_NOTIFY_CHUNK_SIZE".into(), "20".into());
        let cfg = AppConfig::from_lookup(db(), |k| env.get(k).cloned()).unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_secs(15));
        assert_eq!(cfg.feeder.notify_chunk_size, 20);
    }

    #[test]
    fn transfer_dir_is_dropped_when_missing_and_kept_when_present() {
        let dir = std::env::temp_dir();
        let mut env = vars(BASE);
        env.insert("FEEDER_TRANSFER_SYSTEM_BASE_DIR".into(), "/definitely/not/here".into());
        let cfg = AppConfig::from_lookup(db(), |k| env.get(k).cloned()).unwrap();
        assert!(cfg.feeder.transfer_system_base_dir().is_none());

        env.insert("FEEDER_TRANSFER_SYSTEM_BASE_DIR".into(), dir.display().to_string());
        let cfg = AppConfig::from_lookup(db(), |k| env.get(k).cloned()).unwrap();
        assert_eq!(cfg.feeder.transfer_system_base_dir(), Some(dir.as_path()));
    }
}

//! Carga de configuración de conexión desde variables de entorno.
//!
//! `DATABASE_URL` es el store primario. El data service, la configuración
//! de trigger y la fuente de readiness pueden vivir en otras bases:
//! `DATASVC_DATABASE_URL`, `TRIGGER_DATABASE_URL` y
//! `READINESS_DATABASE_URL`. Si no están definidas el componente queda
//! desactivado (data service, readiness) o usa el store primario
//! (trigger). Los tamaños de pool se comparten.

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::error::PersistenceError;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

pub const DEFAULT_MIN_CONNECTIONS: u32 = 2;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, PersistenceError> {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL").map_err(|_| PersistenceError::Config("DATABASE_URL no definido".into()))?;
        Ok(Self::with_url(url))
    }

    fn with_url(url: String) -> Self {
        let min_connections = env_u32("DATABASE_MIN_CONNECTIONS").unwrap_or(DEFAULT_MIN_CONNECTIONS);
        let max_connections = env_u32("DATABASE_MAX_CONNECTIONS").unwrap_or(DEFAULT_MAX_CONNECTIONS);
        Self { url, min_connections, max_connections }
    }

    /// Configuración para una base secundaria (`None` si la variable no
    /// existe o está vacía).
    pub fn optional(var: &str) -> Option<Self> {
        Lazy::force(&DOTENV_LOADED);
        env::var(var).ok().filter(|v| !v.trim().is_empty()).map(Self::with_url)
    }

    pub fn datasvc_from_env() -> Option<Self> {
        Self::optional("DATASVC_DATABASE_URL")
    }

    pub fn trigger_from_env() -> Option<Self> {
        Self::optional("TRIGGER_DATABASE_URL")
    }

    pub fn readiness_from_env() -> Option<Self> {
        Self::optional("READINESS_DATABASE_URL")
    }
}

fn env_u32(var: &str) -> Option<u32> {
    env::var(var).ok().and_then(|v| v.parse().ok())
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

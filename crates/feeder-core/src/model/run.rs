use serde::{Deserialize, Serialize};

/// Número de corrida (único por sesión de toma de datos).
pub type RunNumber = u32;

/// Corrida descubierta y aún no configurada.
///
/// `trigger_key` es `None` para corridas locales: esas se configuran sin
/// consultar la fuente de configuración de trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRun {
    pub run: RunNumber,
    pub trigger_key: Option<String>,
}

impl NewRun {
    pub fn is_local(&self) -> bool {
        self.trigger_key.is_none()
    }
}

/// Clave natural (run, stream). El orden derivado (run, luego nombre del
/// stream) es el orden de configuración del ciclo.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunStreamKey {
    pub run: RunNumber,
    pub stream: String,
}

impl RunStreamKey {
    pub fn new(run: RunNumber, stream: impl Into<String>) -> Self {
        Self { run, stream: stream.into() }
    }
}

impl std::fmt::Display for RunStreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.run, self.stream)
    }
}

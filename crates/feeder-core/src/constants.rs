//! Constantes del feeder.
//!
//! Valores fijos compartidos por el protocolo de sincronización, el
//! despachador de notificaciones y el publicador de monitoreo.

/// Tamaño por defecto de cada lote de streamers enviados al notificador
/// externo. Acota la lista de argumentos del proceso y el alcance de un
/// fallo a un solo lote.
pub const DEFAULT_NOTIFY_CHUNK_SIZE: usize = 50;

/// Largo máximo de etiquetas de texto (global tag) enviadas al data service.
pub const MAX_LABEL_LENGTH: usize = 50;

/// Marca de nombre de los workflows PromptReco; se cierran apenas se
/// observan en el pase de closeout.
pub const PROMPT_RECO_MARKER: &str = "PromptReco";

/// Estado publicado en el store de monitoreo al cerrar un workflow.
pub const CLOSED_STATUS: &str = "Closed";

//! Publicación de workflows en el store documental de monitoreo.
//!
//! Dos pases por ciclo:
//! - `publish_new_workflows`: Repack y PromptReco recién creados se suben
//!   como documento mínimo (nombre, corrida). `Ok` y `Exists` cuentan como
//!   éxito y marcan el workflow como seguido; cualquier otra respuesta lo
//!   deja para el siguiente ciclo.
//! - `close_out_workflows`: PromptReco se cierra en cuanto se observa;
//!   Repack/Express esperan a que su fileset se cierre.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::constants::CLOSED_STATUS;
use crate::errors::FeederError;
use crate::model::{MonitoredWorkflow, RunNumber};
use crate::store::{FeederStore, MonitoringStore};

/// Respuesta del store de monitoreo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitoringStatus {
    Ok,
    Exists,
    Other(String),
}

impl MonitoringStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, MonitoringStatus::Ok | MonitoringStatus::Exists)
    }
}

/// Documento mínimo de un workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringDocument {
    /// Identificador estable: SHA-256 (hex) del nombre del workflow.
    pub doc_id: String,
    pub request_name: String,
    pub run: RunNumber,
}

impl MonitoringDocument {
    pub fn for_workflow(workflow: &MonitoredWorkflow) -> Self {
        Self { doc_id: stable_doc_id(&workflow.name),
               request_name: workflow.name.clone(),
               run: workflow.run }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({ "_id": self.doc_id, "RequestName": self.request_name, "Run": self.run })
    }
}

/// Identificador estable derivado del nombre del workflow.
pub fn stable_doc_id(request_name: &str) -> String {
    format!("{:x}", Sha256::digest(request_name.as_bytes()))
}

pub struct MonitoringPublisher {
    store: Arc<dyn FeederStore>,
    monitoring: Arc<dyn MonitoringStore>,
}

impl MonitoringPublisher {
    pub fn new(store: Arc<dyn FeederStore>, monitoring: Arc<dyn MonitoringStore>) -> Self {
        Self { store, monitoring }
    }

    /// Sube los workflows aún no publicados. Devuelve cuántos quedaron
    /// marcados como seguidos.
    pub fn publish_new_workflows(&self) -> Result<usize, FeederError> {
        let mut workflows = self.store.streamer_workflows_for_monitoring()?;
        workflows.extend(self.store.prompt_reco_workflows_for_monitoring()?);
        if workflows.is_empty() {
            debug!("monitoring:publish no workflows to publish");
            return Ok(0);
        }
        debug!("monitoring:publish count={}", workflows.len());

        let mut tracked = 0;
        for wf in &workflows {
            info!("monitoring:publish workflow={}", wf.name);
            let doc = MonitoringDocument::for_workflow(wf);
            match self.monitoring.insert(&doc) {
                Ok(status) if status.is_success() => {
                    self.store.mark_workflow_tracked(wf.id)?;
                    tracked += 1;
                }
                Ok(status) => warn!("monitoring:publish rejected workflow={} status={:?}", wf.name, status),
                Err(e) => warn!("monitoring:publish failed workflow={} err={e}", wf.name),
            }
        }
        Ok(tracked)
    }

    /// Marca como cerrados los workflows que ya terminaron. Devuelve
    /// cuántos se cerraron en este pase.
    pub fn close_out_workflows(&self) -> Result<usize, FeederError> {
        let candidates = self.store.not_closed_out_workflows()?;
        if candidates.is_empty() {
            debug!("monitoring:closeout nothing to close");
            return Ok(0);
        }

        let mut closed = 0;
        for c in candidates.iter().filter(|c| c.ready_to_close()) {
            if c.is_prompt_reco() {
                debug!("monitoring:closeout prompt reco closes immediately workflow={}", c.name);
            }
            match self.monitoring.update_status(&c.name, CLOSED_STATUS) {
                Ok(status) if status.is_success() => {
                    self.store.mark_workflow_closed_out(c.id)?;
                    closed += 1;
                }
                Ok(status) => warn!("monitoring:closeout rejected workflow={} status={:?}", c.name, status),
                Err(e) => warn!("monitoring:closeout failed workflow={} err={e}", c.name),
            }
        }
        Ok(closed)
    }
}

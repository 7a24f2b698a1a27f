use serde::{Deserialize, Serialize};

use super::RunNumber;
use crate::constants::PROMPT_RECO_MARKER;

pub type WorkflowId = i64;
pub type FilesetId = i64;

/// Etapa de procesamiento a la que pertenece un workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowKind {
    Repack,
    Express,
    PromptReco,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Repack => "Repack",
            WorkflowKind::Express => "Express",
            WorkflowKind::PromptReco => "PromptReco",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Repack" => Some(WorkflowKind::Repack),
            "Express" => Some(WorkflowKind::Express),
            "PromptReco" => Some(WorkflowKind::PromptReco),
            _ => None,
        }
    }
}

/// Workflow todavía no publicado en el store de monitoreo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredWorkflow {
    pub id: WorkflowId,
    pub run: RunNumber,
    pub name: String,
}

/// Workflow aún no marcado como cerrado en el monitoreo, con el estado de
/// su fileset de entrada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseoutCandidate {
    pub id: WorkflowId,
    pub fileset: FilesetId,
    pub fileset_open: bool,
    pub name: String,
}

impl CloseoutCandidate {
    pub fn is_prompt_reco(&self) -> bool {
        self.name.contains(PROMPT_RECO_MARKER)
    }

    /// PromptReco se cierra al crearse; Repack/Express esperan a que su
    /// fileset se cierre.
    pub fn ready_to_close(&self) -> bool {
        self.is_prompt_reco() || !self.fileset_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_reco_closes_regardless_of_fileset() {
        let c = CloseoutCandidate { id: 1,
                                    fileset: 10,
                                    fileset_open: true,
                                    name: "PromptReco_Run123_MinimumBias".into() };
        assert!(c.ready_to_close());
        let r = CloseoutCandidate { name: "Repack_Run123_StreamA".into(), ..c };
        assert!(!r.ready_to_close());
    }

    #[test]
    fn kind_round_trips_through_text() {
        for k in [WorkflowKind::Repack, WorkflowKind::Express, WorkflowKind::PromptReco] {
            assert_eq!(WorkflowKind::parse(k.as_str()), Some(k));
        }
        assert_eq!(WorkflowKind::parse("Merge"), None);
    }
}

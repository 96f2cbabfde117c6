use crate::model::MeshStats;
use crate::repair::RepairStats;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Skipped(String),
    Failed(String),
    Succeeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAttempt {
    pub stage: String,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SewingReport {
    pub faces_added: usize,
    pub faces_skipped: usize,
    pub shared_edges: usize,
    pub free_edges: usize,
    pub multiple_edges: usize,
    /// Shared edges walked the same way by both faces.
    pub misoriented_edges: usize,
    pub closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionReport {
    pub input: PathBuf,
    pub step_path: Option<PathBuf>,
    pub stl_path: PathBuf,
    pub repaired_stl_path: Option<PathBuf>,
    pub stage: Option<String>,
    pub mesh: MeshStats,
    pub repaired_mesh: Option<MeshStats>,
    pub repair: Option<RepairStats>,
    pub sewing: Option<SewingReport>,
    pub attempts: Vec<StageAttempt>,
    pub warnings: Vec<Warning>,
}

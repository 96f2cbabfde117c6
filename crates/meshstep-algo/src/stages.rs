//! Conversion stages tried in order by the pipeline.

use crate::command::CommandError;
use crate::config::KernelConfig;
use crate::sewing::Sewing;
use crate::step_writer::{write_shell_step, StepWriteError};
use meshstep_core::model::TriMesh;
use meshstep_core::report::SewingReport;
use nalgebra::Point3;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    /// Routing signal, not an error. Carries the reason for the report.
    Unavailable(String),
}

/// Inputs shared by every stage of one conversion.
#[derive(Debug, Clone, Copy)]
pub struct StageJob<'a> {
    pub mesh: &'a TriMesh,
    pub stl_path: &'a Path,
    pub step_path: &'a Path,
    pub name: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct StageReport {
    pub sewing: Option<SewingReport>,
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("STEP transfer failed")]
    Transfer(#[from] StepWriteError),
    #[error("write {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("converter timed out after {secs}s")]
    TimedOut { secs: u64 },
    #[error("converter exited with {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },
    #[error("converter finished but produced no file at {path:?}")]
    MissingOutput { path: PathBuf },
    #[error("{0}")]
    Unavailable(String),
}

pub trait Stage {
    fn name(&self) -> &str;
    fn availability(&self) -> Availability;
    fn run(&self, job: &StageJob<'_>) -> Result<StageReport, StageError>;
}

/// Builds a faceted BRep from the mesh triangles and writes it as STEP.
#[derive(Debug, Clone, Default)]
pub struct KernelStage {
    cfg: KernelConfig,
}

impl KernelStage {
    pub fn new(cfg: KernelConfig) -> Self {
        Self { cfg }
    }
}

impl Stage for KernelStage {
    fn name(&self) -> &str {
        "kernel"
    }

    fn availability(&self) -> Availability {
        if self.cfg.enabled {
            Availability::Available
        } else {
            Availability::Unavailable("CAD kernel disabled".to_string())
        }
    }

    fn run(&self, job: &StageJob<'_>) -> Result<StageReport, StageError> {
        let mut sewing = Sewing::new(self.cfg.tolerance);
        for face in 0..job.mesh.faces.len() {
            let corners = job
                .mesh
                .triangle(face)
                .map(|p| Point3::new(p.x, p.y, p.z));
            if let Err(err) = sewing.add_triangle(corners) {
                debug!(face, %err, "skipping triangle");
            }
        }

        let (shell, sewing_report) = sewing.perform();

        let text = write_shell_step(&shell, job.name, self.cfg.unit)?;
        std::fs::write(job.step_path, text).map_err(|source| StageError::Io {
            path: job.step_path.to_path_buf(),
            source,
        })?;
        info!(
            step = ?job.step_path,
            faces = sewing_report.faces_added,
            closed = sewing_report.closed,
            "kernel wrote STEP"
        );

        Ok(StageReport {
            sewing: Some(sewing_report),
        })
    }
}

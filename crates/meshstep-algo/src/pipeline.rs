//! GLB/GLTF -> STEP orchestration.
//!
//! Load, always export an STL, repair, then try each stage in order. The
//! first stage that writes the STEP wins. Intermediate files are never
//! removed, so a failed run still leaves an STL the user can convert by hand.

use crate::config::ConvertConfig;
use crate::error::ConvertError;
use crate::freecad::FreecadStage;
use crate::repair_stage::repair_stl;
use crate::stages::{Availability, KernelStage, Stage, StageJob};
use meshstep_core::report::{AttemptOutcome, ConversionReport, StageAttempt, Warning};
use meshstep_core::stl::write_stl;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Successful conversion.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub step_path: PathBuf,
    pub stl_path: PathBuf,
    pub repaired_stl_path: Option<PathBuf>,
    pub stage: String,
    pub report: ConversionReport,
}

pub struct Converter {
    cfg: ConvertConfig,
    stages: Vec<Box<dyn Stage>>,
}

impl Converter {
    /// Kernel first, FreeCAD second.
    pub fn new(cfg: ConvertConfig) -> Self {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(KernelStage::new(cfg.kernel.clone())),
            Box::new(FreecadStage::new(cfg.freecad.clone())),
        ];
        Self::with_stages(cfg, stages)
    }

    pub fn with_stages(cfg: ConvertConfig, stages: Vec<Box<dyn Stage>>) -> Self {
        Self { cfg, stages }
    }

    pub fn convert(&self, input: &Path, output: Option<&Path>) -> Result<Conversion, ConvertError> {
        self.cfg.validate()?;
        let mesh = meshstep_gltf::import_gltf(input).map_err(ConvertError::Load)?;
        if mesh.is_empty() {
            return Err(ConvertError::EmptyMesh {
                path: input.to_path_buf(),
            });
        }
        mesh.validate().map_err(|source| ConvertError::InvalidMesh {
            path: input.to_path_buf(),
            source,
        })?;
        info!(
            input = ?input,
            vertices = mesh.vertices.len(),
            faces = mesh.faces.len(),
            "mesh loaded"
        );

        let step_path = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_step_path(input));
        if let Some(parent) = step_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConvertError::OutputDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let stl_path = default_stl_path(input);
        write_stl(&stl_path, &mesh).map_err(ConvertError::ExportStl)?;
        debug!(stl = ?stl_path, "intermediate STL written");

        let mut report = ConversionReport {
            input: input.to_path_buf(),
            step_path: None,
            stl_path: stl_path.clone(),
            repaired_stl_path: None,
            stage: None,
            mesh: mesh.stats(),
            repaired_mesh: None,
            repair: None,
            sewing: None,
            attempts: Vec::new(),
            warnings: Vec::new(),
        };
        if !report.mesh.watertight {
            report.warnings.push(Warning {
                code: "not_watertight".to_string(),
                message: format!(
                    "Input mesh has {} boundary edges.",
                    report.mesh.boundary_edges
                ),
            });
        }

        if self.cfg.repair.enabled {
            let outcome = repair_stl(&stl_path, &self.cfg.repair);
            if outcome.path == stl_path {
                report.warnings.push(Warning {
                    code: "repair_skipped".to_string(),
                    message: "Mesh repair did not produce a repaired STL; using the original."
                        .to_string(),
                });
            } else {
                report.repaired_stl_path = Some(outcome.path.clone());
            }
            report.repaired_mesh = outcome.mesh.as_ref().map(|m| m.stats());
            report.repair = outcome.stats;
        }

        // The repaired STL feeds the external converter and error messages;
        // the kernel sews the mesh as loaded.
        let fallback_stl = report
            .repaired_stl_path
            .clone()
            .unwrap_or_else(|| stl_path.clone());
        let name = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("mesh");
        let job = StageJob {
            mesh: &mesh,
            stl_path: &fallback_stl,
            step_path: &step_path,
            name,
        };

        let mut reasons = Vec::new();
        let mut last_failure = None;
        for stage in &self.stages {
            let stage_name = stage.name().to_string();
            if let Availability::Unavailable(reason) = stage.availability() {
                debug!(stage = %stage_name, %reason, "stage unavailable");
                reasons.push(format!("{stage_name}: {reason}"));
                report.attempts.push(StageAttempt {
                    stage: stage_name,
                    outcome: AttemptOutcome::Skipped(reason),
                });
                continue;
            }

            match stage.run(&job) {
                Ok(stage_report) => {
                    info!(stage = %stage_name, step = ?step_path, "STEP written");
                    report.sewing = stage_report.sewing;
                    report.step_path = Some(step_path.clone());
                    report.stage = Some(stage_name.clone());
                    report.attempts.push(StageAttempt {
                        stage: stage_name.clone(),
                        outcome: AttemptOutcome::Succeeded,
                    });
                    return Ok(Conversion {
                        step_path,
                        stl_path,
                        repaired_stl_path: report.repaired_stl_path.clone(),
                        stage: stage_name,
                        report,
                    });
                }
                Err(err) => {
                    warn!(stage = %stage_name, error = %err, "stage failed");
                    report.attempts.push(StageAttempt {
                        stage: stage_name.clone(),
                        outcome: AttemptOutcome::Failed(err.to_string()),
                    });
                    if !self.cfg.fallthrough_on_failure {
                        return Err(ConvertError::StageFailed {
                            stage: stage_name,
                            stl_path: fallback_stl,
                            source: err,
                            report: Box::new(report),
                        });
                    }
                    last_failure = Some((stage_name, err));
                }
            }
        }

        Err(match last_failure {
            Some((stage, source)) => ConvertError::StageFailed {
                stage,
                stl_path: fallback_stl,
                source,
                report: Box::new(report),
            },
            None => ConvertError::NoConverter {
                stl_path: fallback_stl,
                reasons,
                report: Box::new(report),
            },
        })
    }
}

/// Input path with its extension replaced by `.step`.
pub fn default_step_path(input: &Path) -> PathBuf {
    input.with_extension("step")
}

/// `<input stem>.stl` next to the input.
pub fn default_stl_path(input: &Path) -> PathBuf {
    input.with_extension("stl")
}

/// Convert with default settings and return the STEP path.
pub fn glb_to_step(input: &Path, output: Option<&Path>) -> Result<PathBuf, ConvertError> {
    Converter::new(ConvertConfig::default())
        .convert(input, output)
        .map(|c| c.step_path)
}

use crate::config::ConfigError;
use crate::stages::StageError;
use meshstep_core::model::MeshError;
use meshstep_core::report::ConversionReport;
use meshstep_core::stl::StlError;
use meshstep_gltf::GltfError;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not load mesh")]
    Load(#[source] GltfError),
    #[error("loaded mesh is empty: {}", .path.display())]
    EmptyMesh { path: PathBuf },
    #[error("invalid mesh: {}", .path.display())]
    InvalidMesh {
        path: PathBuf,
        #[source]
        source: MeshError,
    },
    #[error("could not export intermediate STL")]
    ExportStl(#[source] StlError),
    #[error("create output directory {}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "STEP conversion failed in the {stage} stage. The intermediate STL has been written to: {}",
        .stl_path.display()
    )]
    StageFailed {
        stage: String,
        stl_path: PathBuf,
        #[source]
        source: StageError,
        report: Box<ConversionReport>,
    },
    #[error(
        "no STEP converter available ({}). The intermediate STL has been written to: {}",
        .reasons.join("; "),
        .stl_path.display()
    )]
    NoConverter {
        stl_path: PathBuf,
        reasons: Vec<String>,
        report: Box<ConversionReport>,
    },
}

impl ConvertError {
    /// Report of the run, when the failure happened after the STL was written.
    pub fn report(&self) -> Option<&ConversionReport> {
        match self {
            Self::StageFailed { report, .. } | Self::NoConverter { report, .. } => {
                Some(report.as_ref())
            }
            _ => None,
        }
    }

    /// STL the user can convert by hand.
    pub fn fallback_path(&self) -> Option<&Path> {
        match self {
            Self::StageFailed { stl_path, .. } | Self::NoConverter { stl_path, .. } => {
                Some(stl_path.as_path())
            }
            _ => None,
        }
    }
}

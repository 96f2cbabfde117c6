use crate::sewing::DEFAULT_TOLERANCE;
use meshstep_core::repair::RepairConfig;
use meshstep_core::step::LengthUnit;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub repair: RepairConfig,
    pub kernel: KernelConfig,
    pub freecad: FreecadConfig,
    /// Continue with FreeCAD when the kernel stage fails instead of aborting.
    pub fallthrough_on_failure: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            repair: RepairConfig::default(),
            kernel: KernelConfig::default(),
            freecad: FreecadConfig::default(),
            fallthrough_on_failure: false,
        }
    }
}

impl ConvertConfig {
    /// Missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Distances used as grid cell sizes must be positive and finite.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let distances = [
            ("repair.weld_epsilon", self.repair.weld_epsilon),
            ("kernel.tolerance", self.kernel.tolerance),
        ];
        for (key, value) in distances {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{key} must be a positive number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub enabled: bool,
    pub tolerance: f64,
    pub unit: LengthUnit,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tolerance: DEFAULT_TOLERANCE,
            unit: LengthUnit::Millimeters,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FreecadConfig {
    pub enabled: bool,
    /// Used as-is when set; otherwise `candidates` are looked up on `PATH`.
    pub binary: Option<PathBuf>,
    pub candidates: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for FreecadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: None,
            candidates: vec![
                "FreeCADCmd".to_string(),
                "freecadcmd".to_string(),
                "freecad".to_string(),
            ],
            timeout_secs: 300,
        }
    }
}

impl FreecadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

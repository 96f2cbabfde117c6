use meshstep_core::model::TriMesh;
use meshstep_core::repair::{repair_in_place, RepairConfig, RepairStats};
use meshstep_core::stl::{read_stl, write_stl};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of the repair pass. `mesh` and `stats` are set only when a repaired
/// file was written; otherwise `path` is the untouched input.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub path: PathBuf,
    pub stats: Option<RepairStats>,
    pub mesh: Option<TriMesh>,
}

impl RepairOutcome {
    fn unchanged(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            stats: None,
            mesh: None,
        }
    }
}

/// `<dir>/<stem>.repaired.stl` next to `stl`.
pub fn repaired_path(stl: &Path) -> PathBuf {
    let stem = stl
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mesh".to_string());
    stl.with_file_name(format!("{stem}.repaired.stl"))
}

/// Never fails: any problem falls back to the original STL.
pub fn repair_stl(path: &Path, cfg: &RepairConfig) -> RepairOutcome {
    let mut mesh = match read_stl(path) {
        Ok(mesh) if !mesh.is_empty() => mesh,
        Ok(_) => {
            warn!(stl = ?path, "STL has no faces; skipping repair");
            return RepairOutcome::unchanged(path);
        }
        Err(err) => {
            warn!(stl = ?path, error = %err, "could not load STL for repair");
            return RepairOutcome::unchanged(path);
        }
    };

    let stats = repair_in_place(&mut mesh, cfg);
    let out = repaired_path(path);
    if let Err(err) = write_stl(&out, &mesh) {
        warn!(stl = ?out, error = %err, "could not write repaired STL");
        return RepairOutcome::unchanged(path);
    }

    info!(
        stl = ?out,
        holes_filled = stats.holes_filled,
        faces_flipped = stats.faces_flipped,
        watertight = mesh.is_watertight(),
        "repaired mesh written"
    );
    RepairOutcome {
        path: out,
        stats: Some(stats),
        mesh: Some(mesh),
    }
}

//! STL -> STEP through FreeCAD's headless command-line binary.

use crate::command::{CommandOutcome, CommandRunner, CommandSpec, SystemRunner};
use crate::config::FreecadConfig;
use crate::stages::{Availability, Stage, StageError, StageJob, StageReport};
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct FreecadStage<R: CommandRunner = SystemRunner> {
    cfg: FreecadConfig,
    runner: R,
}

impl FreecadStage<SystemRunner> {
    pub fn new(cfg: FreecadConfig) -> Self {
        Self::with_runner(cfg, SystemRunner)
    }
}

impl<R: CommandRunner> FreecadStage<R> {
    pub fn with_runner(cfg: FreecadConfig, runner: R) -> Self {
        Self { cfg, runner }
    }

    /// Configured binary first, then the first candidate found on `PATH`.
    pub fn locate_binary(&self) -> Option<PathBuf> {
        if let Some(binary) = &self.cfg.binary {
            return which::which(binary).ok();
        }
        self.cfg
            .candidates
            .iter()
            .find_map(|name| which::which(name).ok())
    }

    fn run_script(
        &self,
        program: PathBuf,
        script: &Path,
        output: &Path,
    ) -> Result<CommandOutcome, StageError> {
        let spec = CommandSpec {
            program,
            args: vec![script.to_string_lossy().into_owned()],
            timeout: self.cfg.timeout(),
            expected_output: Some(output.to_path_buf()),
        };
        Ok(self.runner.run(&spec)?)
    }
}

impl<R: CommandRunner> Stage for FreecadStage<R> {
    fn name(&self) -> &str {
        "freecad"
    }

    fn availability(&self) -> Availability {
        if !self.cfg.enabled {
            return Availability::Unavailable("FreeCAD disabled".to_string());
        }
        match self.locate_binary() {
            Some(_) => Availability::Available,
            None => match &self.cfg.binary {
                Some(binary) => {
                    Availability::Unavailable(format!("FreeCAD binary not found: {binary:?}"))
                }
                None => Availability::Unavailable(format!(
                    "no FreeCAD executable on PATH (tried {})",
                    self.cfg.candidates.join(", ")
                )),
            },
        }
    }

    fn run(&self, job: &StageJob<'_>) -> Result<StageReport, StageError> {
        let program = self
            .locate_binary()
            .ok_or_else(|| StageError::Unavailable("FreeCAD executable not found".to_string()))?;

        // FreeCAD exports into a fresh directory next to the target; the target
        // is replaced only once a new file exists.
        let parent = job
            .step_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let staging = tempfile::Builder::new()
            .prefix(".meshstep-")
            .tempdir_in(parent)
            .map_err(|source| StageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        let staged = staging
            .path()
            .join(job.step_path.file_name().unwrap_or(OsStr::new("output.step")));

        let script = write_script(&freecad_script(job.stl_path, &staged))?;
        debug!(program = ?program, script = ?script, "running FreeCAD");

        let outcome = self.run_script(program, &script, &staged)?;
        if outcome.timed_out {
            warn!(script = ?script, "FreeCAD timed out; keeping script");
            return Err(StageError::TimedOut {
                secs: self.cfg.timeout_secs,
            });
        }
        if outcome.exit_code != Some(0) {
            return Err(StageError::ExitStatus {
                code: outcome.exit_code,
                stderr: outcome.stderr.trim().to_string(),
            });
        }
        if !outcome.output_exists {
            return Err(StageError::MissingOutput {
                path: job.step_path.to_path_buf(),
            });
        }

        std::fs::rename(&staged, job.step_path).map_err(|source| StageError::Io {
            path: job.step_path.to_path_buf(),
            source,
        })?;
        if let Err(err) = std::fs::remove_file(&script) {
            debug!(script = ?script, %err, "could not remove script");
        }
        info!(step = ?job.step_path, "FreeCAD wrote STEP");
        Ok(StageReport::default())
    }
}

fn write_script(contents: &str) -> Result<PathBuf, StageError> {
    let io_err = |path: PathBuf| move |source: std::io::Error| StageError::Io { path, source };
    let mut file = tempfile::Builder::new()
        .prefix("meshstep-freecad-")
        .suffix(".py")
        .tempfile()
        .map_err(io_err(std::env::temp_dir()))?;
    file.write_all(contents.as_bytes())
        .map_err(io_err(file.path().to_path_buf()))?;
    let (_, path) = file.keep().map_err(|err| StageError::Io {
        path: err.file.path().to_path_buf(),
        source: err.error,
    })?;
    Ok(path)
}

pub fn freecad_script(stl_path: &Path, step_path: &Path) -> String {
    let stl = python_string(&stl_path.to_string_lossy());
    let step = python_string(&step_path.to_string_lossy());
    format!(
        r#"import sys
import Mesh
import MeshPart
import Part

try:
    mesh = Mesh.Mesh({stl})
    shape = MeshPart.meshToShape(mesh)
    try:
        solid = Part.Solid(Part.Shell(list(shape.Faces)))
        Part.export([solid], {step})
    except Exception:
        Part.export([shape], {step})
except Exception as exc:
    sys.stderr.write("meshstep: FreeCAD conversion failed: %s\n" % exc)
    sys.exit(1)
"#
    )
}

/// Double-quoted Python literal; non-ASCII goes through `\u` escapes.
pub fn python_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c if (c as u32) <= 0xFFFF => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push_str(&format!("\\U{:08x}", c as u32)),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_string_escapes() {
        assert_eq!(r#""C:\\models\\a.stl""#, python_string(r"C:\models\a.stl"));
        assert_eq!(r#""say \"hi\"""#, python_string(r#"say "hi""#));
        assert_eq!(r#""caf\u00e9""#, python_string("café"));
        assert_eq!(r#""a\nb""#, python_string("a\nb"));
    }

    #[test]
    fn script_embeds_both_paths() {
        let script = freecad_script(Path::new("/tmp/x.repaired.stl"), Path::new("/tmp/x.step"));
        assert!(script.contains(r#"Mesh.Mesh("/tmp/x.repaired.stl")"#));
        assert!(script.contains(r#"Part.export([solid], "/tmp/x.step")"#));
        assert!(script.contains("MeshPart.meshToShape"));
    }
}

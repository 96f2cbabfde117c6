use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use meshstep_algo::{ConvertConfig, Converter};
use meshstep_core::report::ConversionReport;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "meshstep")]
#[command(about = "Convert a GLB/GLTF mesh to STEP (best-effort, with STL fallback).")]
struct Cli {
    /// Input .glb or .gltf file.
    input: PathBuf,
    /// Output STEP path; defaults to the input with a .step extension.
    output: Option<PathBuf>,
    /// JSON config file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the conversion report as JSON, also on failure.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Sewing tolerance for the kernel stage.
    #[arg(long)]
    tolerance: Option<f64>,
    #[arg(long)]
    no_repair: bool,
    #[arg(long)]
    no_kernel: bool,
    #[arg(long)]
    no_freecad: bool,
    #[arg(long)]
    freecad_bin: Option<PathBuf>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Try FreeCAD when the kernel stage fails.
    #[arg(long)]
    fallthrough: bool,
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    convert(&cli)
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn convert(cli: &Cli) -> Result<()> {
    ensure_input_file(&cli.input)?;
    let cfg = build_config(cli)?;

    let converter = Converter::new(cfg);
    match converter.convert(&cli.input, cli.output.as_deref()) {
        Ok(conversion) => {
            if let Some(path) = &cli.report {
                write_report(path, &conversion.report)?;
            }
            println!("Wrote STEP: {}", conversion.step_path.display());
            Ok(())
        }
        Err(err) => {
            if let (Some(path), Some(report)) = (&cli.report, err.report()) {
                write_report(path, report)?;
            }
            Err(err.into())
        }
    }
}

fn build_config(cli: &Cli) -> Result<ConvertConfig> {
    let mut cfg = match &cli.config {
        Some(path) => ConvertConfig::from_json_file(path)?,
        None => ConvertConfig::default(),
    };
    if let Some(tolerance) = cli.tolerance {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            bail!("--tolerance must be a positive number, got {tolerance}");
        }
        cfg.kernel.tolerance = tolerance;
    }
    if cli.no_repair {
        cfg.repair.enabled = false;
    }
    if cli.no_kernel {
        cfg.kernel.enabled = false;
    }
    if cli.no_freecad {
        cfg.freecad.enabled = false;
    }
    if let Some(bin) = &cli.freecad_bin {
        cfg.freecad.binary = Some(bin.clone());
    }
    if let Some(secs) = cli.timeout_secs {
        cfg.freecad.timeout_secs = secs;
    }
    if cli.fallthrough {
        cfg.fallthrough_on_failure = true;
    }
    Ok(cfg)
}

fn write_report(path: &Path, report: &ConversionReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("serialize report")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    std::fs::write(path, &json).with_context(|| format!("write report: {path:?}"))
}

fn ensure_input_file(input: &Path) -> Result<()> {
    match std::fs::metadata(input) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => bail!("input is not a file: {input:?}"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            bail!("input not found: {input:?} (cwd: {cwd:?})");
        }
        Err(err) => Err(err).with_context(|| format!("stat input: {input:?}")),
    }
}

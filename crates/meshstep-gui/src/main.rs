use eframe::egui;
use meshstep_algo::{ConvertConfig, ConvertError, Converter};
use meshstep_core::report::{AttemptOutcome, ConversionReport};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::SystemTime;
use tracing_subscriber::EnvFilter;

fn main() -> eframe::Result {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let native_options = eframe::NativeOptions::default();
    eframe::run_native(
        "meshstep",
        native_options,
        Box::new(|cc| Ok(Box::new(MeshStepApp::new(cc)))),
    )
}

/// What the worker thread sends back.
enum JobResult {
    Converted {
        step_path: PathBuf,
        report: ConversionReport,
    },
    Failed {
        message: String,
        fallback: Option<PathBuf>,
        report: Option<ConversionReport>,
    },
}

struct MeshStepApp {
    input_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    cfg: ConvertConfig,

    pending: Option<Receiver<JobResult>>,
    result_path: Option<PathBuf>,
    report: Option<ConversionReport>,

    status: String,
}

impl MeshStepApp {
    fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        Self {
            input_path: None,
            output_dir: None,
            cfg: ConvertConfig::default(),
            pending: None,
            result_path: None,
            report: None,
            status: "Open a GLB/GLTF to begin.".to_string(),
        }
    }

    fn pick_input(&mut self) {
        let file = rfd::FileDialog::new()
            .add_filter("Meshes", &["glb", "gltf"])
            .pick_file();
        if let Some(path) = file {
            self.set_input(&path);
        }
    }

    fn pick_latest(&mut self) {
        let Some(folder) = rfd::FileDialog::new().pick_folder() else {
            return;
        };
        match latest_glb(&folder) {
            Some(path) => self.set_input(&path),
            None => self.status = format!("No .glb found under {}", folder.display()),
        }
    }

    fn pick_output_dir(&mut self) {
        let folder = rfd::FileDialog::new().pick_folder();
        if let Some(path) = folder {
            self.output_dir = Some(path);
        }
    }

    fn set_input(&mut self, path: &Path) {
        if !is_mesh_file(path) {
            self.status = format!("Unsupported input: {}", path.display());
            return;
        }
        self.input_path = Some(path.to_path_buf());
        self.result_path = None;
        self.report = None;
        self.status = format!("Selected {}", path.display());
    }

    fn start_convert(&mut self, ctx: &egui::Context) {
        let Some(input) = self.input_path.clone() else {
            self.status = "No input selected.".to_string();
            return;
        };
        let output = self.output_dir.as_ref().map(|dir| {
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("mesh");
            dir.join(format!("{stem}.step"))
        });

        let (tx, rx) = mpsc::channel();
        let cfg = self.cfg.clone();
        let ctx = ctx.clone();
        std::thread::spawn(move || {
            let result = run_job(cfg, &input, output.as_deref());
            let _ = tx.send(result);
            ctx.request_repaint();
        });

        self.pending = Some(rx);
        self.result_path = None;
        self.report = None;
        self.status = "Converting…".to_string();
    }

    fn poll_job(&mut self) {
        let Some(rx) = &self.pending else {
            return;
        };
        let Ok(result) = rx.try_recv() else {
            return;
        };
        self.pending = None;
        match result {
            JobResult::Converted { step_path, report } => {
                self.status = "Conversion successful".to_string();
                self.result_path = Some(step_path);
                self.report = Some(report);
            }
            JobResult::Failed {
                message,
                fallback,
                report,
            } => {
                self.status = match &fallback {
                    Some(_) => format!("Conversion to STEP failed: {message}. Provided STL instead."),
                    None => format!("Conversion failed: {message}"),
                };
                self.result_path = fallback;
                self.report = report;
            }
        }
    }

    fn handle_file_drop(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        let Some(file) = dropped.into_iter().find(|f| f.path.is_some()) else {
            return;
        };
        if let Some(path) = file.path {
            self.set_input(&path);
        }
    }
}

fn run_job(cfg: ConvertConfig, input: &Path, output: Option<&Path>) -> JobResult {
    match Converter::new(cfg).convert(input, output) {
        Ok(conversion) => JobResult::Converted {
            step_path: conversion.step_path,
            report: conversion.report,
        },
        Err(err) => failed(err, input),
    }
}

fn failed(err: ConvertError, input: &Path) -> JobResult {
    let fallback = err
        .fallback_path()
        .map(Path::to_path_buf)
        .or_else(|| Some(input.with_extension("stl")).filter(|p| p.is_file()));
    JobResult::Failed {
        message: err.to_string(),
        fallback,
        report: err.report().cloned(),
    }
}

impl eframe::App for MeshStepApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_file_drop(ctx);
        self.poll_job();
        let busy = self.pending.is_some();

        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.add_enabled(!busy, egui::Button::new("Open GLB…")).clicked() {
                    self.pick_input();
                }
                if ui
                    .add_enabled(!busy, egui::Button::new("Latest GLB in folder…"))
                    .clicked()
                {
                    self.pick_latest();
                }
                if ui.button("Output folder…").clicked() {
                    self.pick_output_dir();
                }
                ui.separator();
                let can_convert = self.input_path.is_some() && !busy;
                if ui
                    .add_enabled(can_convert, egui::Button::new("Convert → STEP"))
                    .clicked()
                {
                    self.start_convert(ctx);
                }
                if busy {
                    ui.spinner();
                }
            });

            ui.horizontal(|ui| {
                ui.checkbox(&mut self.cfg.repair.enabled, "Repair mesh");
                ui.checkbox(&mut self.cfg.kernel.enabled, "CAD kernel");
                ui.checkbox(&mut self.cfg.freecad.enabled, "FreeCAD");
                ui.checkbox(&mut self.cfg.fallthrough_on_failure, "Fall through on failure");
            });

            if let Some(p) = &self.input_path {
                ui.label(format!("Input: {}", p.display()));
            }
            let output = match &self.output_dir {
                Some(p) => p.display().to_string(),
                None => "next to input".to_string(),
            };
            ui.label(format!("Output: {output}"));
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(&self.status);
                if let Some(p) = &self.result_path {
                    if ui.button("Copy path").clicked() {
                        ui.ctx().copy_text(p.display().to_string());
                    }
                    if ui.button("Open").clicked() {
                        let _ = open::that(p);
                    }
                    if let Some(dir) = p.parent() {
                        if ui.button("Open folder").clicked() {
                            let _ = open::that(dir);
                        }
                    }
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Result");
            ui.separator();
            draw_report(ui, self.report.as_ref());
        });
    }
}

fn draw_report(ui: &mut egui::Ui, report: Option<&ConversionReport>) {
    let Some(report) = report else {
        ui.label("No conversion yet.");
        return;
    };

    ui.label(format!(
        "Mesh: {} vertices, {} faces, watertight: {}",
        report.mesh.vertices, report.mesh.faces, report.mesh.watertight
    ));
    if let Some(repaired) = &report.repaired_mesh {
        ui.label(format!(
            "Repaired: {} vertices, {} faces, watertight: {}",
            repaired.vertices, repaired.faces, repaired.watertight
        ));
    }
    if let Some(sewing) = &report.sewing {
        ui.label(format!(
            "Sewing: {} faces, {} skipped, {} free edges, closed: {}",
            sewing.faces_added, sewing.faces_skipped, sewing.free_edges, sewing.closed
        ));
    }

    ui.separator();
    for attempt in &report.attempts {
        let line = match &attempt.outcome {
            AttemptOutcome::Skipped(reason) => format!("{}: skipped ({reason})", attempt.stage),
            AttemptOutcome::Failed(message) => format!("{}: failed ({message})", attempt.stage),
            AttemptOutcome::Succeeded => format!("{}: succeeded", attempt.stage),
        };
        ui.label(line);
    }
    for w in &report.warnings {
        ui.label(format!("[{}] {}", w.code, w.message));
    }

    ui.separator();
    egui::CollapsingHeader::new("Raw report JSON")
        .default_open(false)
        .show(ui, |ui| {
            let json = serde_json::to_string_pretty(report).unwrap_or_default();
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.monospace(json);
            });
        });
}

fn is_mesh_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "glb" | "gltf"))
        .unwrap_or(false)
}

/// Most recently modified `*.glb` anywhere beneath `root`.
fn latest_glb(root: &Path) -> Option<PathBuf> {
    let mut best: Option<(SystemTime, PathBuf)> = None;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if meta.is_dir() {
                stack.push(path);
                continue;
            }
            let is_glb = path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("glb"));
            if !is_glb {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if best.as_ref().map_or(true, |(t, _)| modified > *t) {
                best = Some((modified, path));
            }
        }
    }
    best.map(|(_, path)| path)
}

use assert_cmd::Command;
use meshstep_core::geom::Vec3;
use meshstep_core::model::TriMesh;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

fn cube_glb(dir: &Path) -> PathBuf {
    let mesh = TriMesh::new(
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ],
        vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ],
    );
    let path = dir.join("chair.glb");
    meshstep_gltf::export_glb(&path, &mesh, "chair").unwrap();
    path
}

fn meshstep() -> Command {
    Command::cargo_bin("meshstep").unwrap()
}

#[test]
fn missing_arguments_print_usage() {
    meshstep()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn converts_cube() {
    let dir = tempfile::tempdir().unwrap();
    let glb = cube_glb(dir.path());
    let step = dir.path().join("chair.step");

    meshstep()
        .arg(&glb)
        .arg("--no-freecad")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote STEP:").and(predicate::str::contains("chair.step")));

    let text = std::fs::read_to_string(&step).unwrap();
    assert!(text.starts_with("ISO-10303-21;"));
    assert!(dir.path().join("chair.stl").is_file());
}

#[test]
fn explicit_output_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let glb = cube_glb(dir.path());
    let step = dir.path().join("out").join("model.step");
    let report = dir.path().join("report.json");

    meshstep()
        .arg(&glb)
        .arg(&step)
        .args(["--no-freecad", "--no-repair", "--report"])
        .arg(&report)
        .assert()
        .success();

    assert!(step.is_file());
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!("kernel", json["stage"]);
    assert!(json["repaired_stl_path"].is_null());
}

#[test]
fn no_converter_fails_and_names_stl() {
    let dir = tempfile::tempdir().unwrap();
    let glb = cube_glb(dir.path());
    let report = dir.path().join("failed.json");

    meshstep()
        .arg(&glb)
        .args(["--no-kernel", "--no-freecad", "--report"])
        .arg(&report)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("chair.repaired.stl"));

    assert!(dir.path().join("chair.stl").is_file());
    assert!(!dir.path().join("chair.step").exists());
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!("skipped", json["attempts"][0]["outcome"]);
}

#[test]
fn missing_input_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    meshstep()
        .arg(dir.path().join("nope.glb"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("input not found"));
}

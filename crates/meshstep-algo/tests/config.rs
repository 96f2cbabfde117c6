use meshstep_algo::config::{ConfigError, ConvertConfig};
use meshstep_core::step::LengthUnit;
use std::time::Duration;

#[test]
fn defaults() {
    let cfg = ConvertConfig::default();
    assert!(cfg.repair.enabled);
    assert!(cfg.kernel.enabled);
    assert_eq!(1e-6, cfg.kernel.tolerance);
    assert_eq!(LengthUnit::Millimeters, cfg.kernel.unit);
    assert_eq!(Duration::from_secs(300), cfg.freecad.timeout());
    assert_eq!(
        vec!["FreeCADCmd", "freecadcmd", "freecad"],
        cfg.freecad.candidates
    );
    assert!(!cfg.fallthrough_on_failure);
}

#[test]
fn partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meshstep.json");
    std::fs::write(
        &path,
        r#"{ "freecad": { "timeout_secs": 5 }, "repair": { "aggressive": false } }"#,
    )
    .unwrap();

    let cfg = ConvertConfig::from_json_file(&path).unwrap();
    assert_eq!(5, cfg.freecad.timeout_secs);
    assert_eq!(3, cfg.freecad.candidates.len());
    assert!(!cfg.repair.aggressive);
    assert!(cfg.repair.enabled);
    assert!(cfg.kernel.enabled);
}

#[test]
fn bad_files_are_reported_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.json");
    assert!(matches!(
        ConvertConfig::from_json_file(&missing),
        Err(ConfigError::Read { .. })
    ));

    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, "{ nope").unwrap();
    let err = ConvertConfig::from_json_file(&broken).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("broken.json"));
}

#[test]
fn non_positive_distances_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weld.json");
    std::fs::write(&path, r#"{ "repair": { "weld_epsilon": 0.0 } }"#).unwrap();
    let err = ConvertConfig::from_json_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    assert!(err.to_string().contains("repair.weld_epsilon"));

    let mut cfg = ConvertConfig::default();
    cfg.kernel.tolerance = -1.0;
    assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    assert!(ConvertConfig::default().validate().is_ok());
}

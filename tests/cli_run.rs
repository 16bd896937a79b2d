mod common;

use common::{quiet_config, template_pdf, write_inputs};
use formfill::cli;
use formfill::config::Config;
use std::path::Path;

fn config_in(dir: &Path) -> Config {
    let mappings = dir.join("mappings.json");
    std::fs::write(
        &mappings,
        r#"{"Economics": {"NAME_FIELD": "Candidate_Name", "YEAR_FIELD": "Year"}}"#,
    )
    .unwrap();
    let mut cfg = quiet_config();
    cfg.paths.mappings_file = mappings.display().to_string();
    cfg.paths.out_dir = dir.join("output").display().to_string();
    cfg.raster.pdftoppm_exe = dir.join("no-such-pdftoppm").display().to_string();
    cfg
}

#[test]
fn unknown_subject_is_rejected_before_inputs_are_checked() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());
    let out = dir.path().join("out");

    let code = cli::run(
        &cfg,
        &dir.path().join("missing.csv"),
        &dir.path().join("missing.pdf"),
        "Physics",
        Some(&out),
    )
    .unwrap();

    assert_eq!(code, 1);
    assert!(!out.exists());
}

#[test]
fn known_subject_still_requires_existing_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());

    let err = cli::run(
        &cfg,
        &dir.path().join("missing.csv"),
        &dir.path().join("missing.pdf"),
        "Economics",
        Some(&dir.path().join("out")),
    )
    .unwrap_err();

    assert!(err.to_string().contains("input does not exist"));
}

#[test]
fn identical_rerun_is_refused_unless_resuming() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config_in(dir.path());
    let (roster, template) = write_inputs(
        dir.path(),
        "Candidate_Name,CS_Name,Year\nJane,J1,2024\n",
        &template_pdf(&["NAME_FIELD", "YEAR_FIELD"]),
    );
    let out = dir.path().join("out");

    // The rasterizer binary is missing, so every row fails, but the run itself succeeds.
    assert_eq!(cli::run(&cfg, &roster, &template, "Economics", Some(&out)).unwrap(), 0);
    assert!(cli::run(&cfg, &roster, &template, "Economics", Some(&out)).is_err());

    cfg.global.resume = true;
    assert_eq!(cli::run(&cfg, &roster, &template, "Economics", Some(&out)).unwrap(), 0);
    assert_eq!(cli::run(&cfg, &roster, &template, "Economics", Some(&out)).unwrap(), 0);
}

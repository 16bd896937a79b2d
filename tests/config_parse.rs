use formfill::config::Config;

#[test]
fn parse_example_config() {
    let raw = include_str!("../formfill.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.roster.person_column, "Candidate_Name");
    assert_eq!(cfg.roster.document_column, "CS_Name");
    assert_eq!(cfg.roster.delimiter, ',');
    assert!(!cfg.paths.out_dir.is_empty());
    assert_eq!(cfg.raster.jpeg_quality, 100);
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str("[roster]\nperson_column = \"Student\"\ndocument_column = \"File\"\ndelimiter = \";\"\n")
        .expect("parse TOML");
    assert_eq!(cfg.roster.person_column, "Student");
    assert_eq!(cfg.roster.delimiter, ';');
    assert_eq!(cfg.paths.mappings_file, "field_mappings.json");
    assert!(!cfg.global.resume);
}

use formfill::roster::{Cell, RosterTable};

fn parse(raw: &str) -> anyhow::Result<RosterTable> {
    RosterTable::from_reader(raw.as_bytes(), b',')
}

#[test]
fn numeric_cells_render_without_spurious_fraction() {
    assert_eq!(Cell::parse("5.0").render(), "5");
    assert_eq!(Cell::parse("5.5").render(), "5.5");
    assert_eq!(Cell::parse("2024").render(), "2024");
    assert_eq!(Cell::parse("-3.00").render(), "-3");
    assert_eq!(Cell::Float(5.0).render(), "5");
    assert_eq!(Cell::Float(5.5).render(), "5.5");
}

#[test]
fn negative_zero_renders_as_zero() {
    assert_eq!(Cell::parse("-0.0").render(), "0");
    assert_eq!(Cell::Float(-0.0).render(), "0");
    assert_eq!(Cell::parse("-0").render(), "0");
}

#[test]
fn text_cells_pass_through() {
    assert_eq!(Cell::parse("Jane Doe"), Cell::Text("Jane Doe".into()));
    assert_eq!(Cell::parse("Jane Doe").render(), "Jane Doe");
    assert_eq!(Cell::parse(" padded ").render(), " padded ");
    assert_eq!(Cell::parse("nan"), Cell::Text("nan".into()));
    assert_eq!(Cell::parse(""), Cell::Empty);
    assert_eq!(Cell::Empty.render(), "");
}

#[test]
fn blank_cells() {
    assert!(Cell::Empty.is_blank());
    assert!(Cell::Text("   ".into()).is_blank());
    assert!(!Cell::Integer(0).is_blank());
}

#[test]
fn parses_header_and_rows() {
    let table = parse("\u{feff}Candidate_Name, CS_Name ,Year\nJane Doe,Jane_CS1,2024\nJohn,John_CS1,\n")
        .unwrap();
    assert_eq!(table.columns(), ["Candidate_Name", "CS_Name", "Year"]);
    assert_eq!(table.len(), 2);

    let rows: Vec<_> = table.rows().collect();
    assert_eq!(rows[0].get("Candidate_Name"), Some(&Cell::Text("Jane Doe".into())));
    assert_eq!(rows[0].get("Year"), Some(&Cell::Integer(2024)));
    assert_eq!(rows[1].get("Year"), Some(&Cell::Empty));
    assert_eq!(rows[1].get("Missing"), None);
}

#[test]
fn short_rows_are_padded() {
    let table = parse("A,B,C\n1\n").unwrap();
    let row = table.rows().next().unwrap();
    assert_eq!(row.get("A"), Some(&Cell::Integer(1)));
    assert_eq!(row.get("C"), Some(&Cell::Empty));
}

#[test]
fn long_rows_are_malformed() {
    let err = parse("A,B\n1,2,3\n").unwrap_err();
    assert!(format!("{err:#}").contains("row 1 has 3 fields"));
}

#[test]
fn empty_input_is_malformed() {
    assert!(parse("").is_err());
}

#[test]
fn missing_columns_keep_requested_order() {
    let table = parse("Candidate_Name,Year\nJane,2024\n").unwrap();
    let missing = table.missing_columns(["Topic", "Year", "CS_Name", "Topic"]);
    assert_eq!(missing, vec!["Topic".to_string(), "CS_Name".to_string()]);
    assert!(table.missing_columns(["Year"]).is_empty());
}

#[test]
fn header_only_roster_has_no_rows() {
    let table = parse("Candidate_Name,CS_Name\n").unwrap();
    assert!(table.is_empty());
    assert!(table.has_column("CS_Name"));
}

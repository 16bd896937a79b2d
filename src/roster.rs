//! Roster CSV parsing into typed cells.

use anyhow::{Context, Result, anyhow, bail};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Infers the scalar type of a raw CSV field.
    pub fn parse(raw: &str) -> Cell {
        if raw.is_empty() {
            return Cell::Empty;
        }
        let t = raw.trim();
        if let Ok(i) = t.parse::<i64>() {
            return Cell::Integer(i);
        }
        if let Ok(f) = t.parse::<f64>() {
            if f.is_finite() {
                return Cell::Float(f);
            }
        }
        Cell::Text(raw.to_string())
    }

    /// Text form written into a form field: integral numbers lose their fraction.
    pub fn render(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Integer(i) => i.to_string(),
            // `+ 0.0` folds -0.0 into 0.0
            Cell::Float(f) if f.fract() == 0.0 => format!("{:.0}", f + 0.0),
            Cell::Float(f) => f.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }

    /// Empty or whitespace-only.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Clone)]
pub struct RosterTable {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
    rows: Vec<Vec<Cell>>,
}

/// Borrowed view of one roster row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a RosterTable,
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Cell> {
        self.table
            .positions
            .get(column)
            .and_then(|&i| self.cells.get(i))
    }
}

impl RosterTable {
    pub fn from_path(path: &Path, delimiter: u8) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("open roster: {}", path.display()))?;
        Self::from_reader(file, delimiter)
    }

    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(reader);

        let headers = reader.headers().with_context(|| "read header row")?.clone();
        let columns: Vec<String> = headers
            .iter()
            .map(|h| h.trim_matches('\u{feff}').trim().to_string())
            .collect();
        if columns.iter().all(|c| c.is_empty()) {
            bail!("no columns to parse from file");
        }

        let mut positions = HashMap::new();
        for (i, c) in columns.iter().enumerate() {
            // First occurrence wins for repeated header names.
            positions.entry(c.clone()).or_insert(i);
        }

        let mut rows = Vec::new();
        for (n, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("read record {}", n + 1))?;
            if record.len() > columns.len() {
                return Err(anyhow!(
                    "row {} has {} fields, header has {}",
                    n + 1,
                    record.len(),
                    columns.len()
                ));
            }
            let mut cells: Vec<Cell> = record.iter().map(Cell::parse).collect();
            cells.resize(columns.len(), Cell::Empty);
            rows.push(cells);
        }

        Ok(Self {
            columns,
            positions,
            rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }

    /// Every name in `required` absent from the header, in the given order.
    pub fn missing_columns<'c, I>(&self, required: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'c str>,
    {
        let mut missing: Vec<String> = Vec::new();
        for col in required {
            if !self.has_column(col) && !missing.iter().any(|m| m == col) {
                missing.push(col.to_string());
            }
        }
        missing
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row {
            table: self,
            cells,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

use crate::{
    config::Config,
    error::{BatchError, RowError},
    form::{self, FormError, FormFields, FormSource, FormTemplate},
    raster::{RASTER_DPI, Rasterizer, assemble_pdf},
    registry::{FieldMapping, MappingRegistry},
    report::{RowOutcome, RowReport, RunOutcome, RunStatus},
    roster::{Cell, RosterTable, Row},
    util::PathSanitizer,
};
use anyhow::{Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use lopdf::Document;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct Pipeline<R: Rasterizer> {
    cfg: Config,
    registry: MappingRegistry,
    rasterizer: R,
    sanitizer: PathSanitizer,
}

/// Result of a row that did not fail.
enum RowDone {
    Written { folder: String, path: PathBuf },
    Skipped(&'static str),
}

impl<R: Rasterizer> Pipeline<R> {
    pub fn new(cfg: &Config, registry: MappingRegistry, rasterizer: R) -> Result<Self> {
        if !cfg.roster.delimiter.is_ascii() {
            return Err(anyhow!(
                "roster.delimiter must be a single ASCII character: {:?}",
                cfg.roster.delimiter
            ));
        }
        Ok(Self {
            cfg: cfg.clone(),
            registry,
            rasterizer,
            sanitizer: PathSanitizer::new()?,
        })
    }

    /// Fails with `InvalidSubject` for unknown subjects and empty mappings.
    pub fn mapping_for(&self, subject: &str) -> Result<&FieldMapping, BatchError> {
        self.registry
            .lookup(subject)
            .ok_or_else(|| BatchError::InvalidSubject(subject.to_string()))
    }

    /// Fills `template` once per roster row and writes
    /// `<output_root>/<person>/<document>.pdf` for each row that succeeds.
    ///
    /// Subject, roster and column problems fail the whole batch before anything
    /// is written. Problems with a single row only drop that row.
    pub fn process(
        &self,
        roster: &Path,
        template: &Path,
        output_root: &Path,
        subject: &str,
    ) -> RunOutcome {
        let prepared = self.validate(roster, subject).and_then(|(mapping, table)| {
            let template = FormTemplate::from_path(template).map_err(|e| {
                BatchError::UnreadableTemplate(format!("{}: {e}", template.display()))
            })?;
            Ok((mapping, table, template))
        });

        match prepared {
            Ok((mapping, table, template)) => self.generate(mapping, &table, &template, output_root),
            Err(err) => rejected(err),
        }
    }

    /// Same as [`Pipeline::process`] with the template already in memory.
    pub fn process_with<T: FormSource + ?Sized>(
        &self,
        roster: &Path,
        template: &T,
        output_root: &Path,
        subject: &str,
    ) -> RunOutcome {
        match self.validate(roster, subject) {
            Ok((mapping, table)) => self.generate(mapping, &table, template, output_root),
            Err(err) => rejected(err),
        }
    }

    /// Subject lookup, roster parsing and column check. Reads nothing but the roster.
    pub fn validate(
        &self,
        roster: &Path,
        subject: &str,
    ) -> Result<(&FieldMapping, RosterTable), BatchError> {
        let mapping = self.mapping_for(subject)?;

        let table = RosterTable::from_path(roster, self.cfg.roster.delimiter as u8)
            .map_err(|e| BatchError::MalformedInput(format!("{e:#}")))?;

        let missing = table.missing_columns(self.required_columns(mapping));
        if !missing.is_empty() {
            return Err(BatchError::MissingColumns(missing));
        }

        info!(
            "subject={subject} fields={} rows={} columns={}",
            mapping.len(),
            table.len(),
            table.columns().len()
        );
        Ok((mapping, table))
    }

    fn required_columns<'a>(&'a self, mapping: &'a FieldMapping) -> impl Iterator<Item = &'a str> {
        mapping.columns().into_iter().chain([
            self.cfg.roster.person_column.as_str(),
            self.cfg.roster.document_column.as_str(),
        ])
    }

    fn generate<T: FormSource + ?Sized>(
        &self,
        mapping: &FieldMapping,
        table: &RosterTable,
        template: &T,
        output_root: &Path,
    ) -> RunOutcome {
        let started = Instant::now();
        let bar = self.progress_bar(table.len());
        let mut persons: BTreeSet<String> = BTreeSet::new();
        let mut rows = Vec::with_capacity(table.len());

        for (i, row) in table.rows().enumerate() {
            let n = i + 1;
            let outcome = match self.generate_row(mapping, row, template, output_root) {
                Ok(RowDone::Written { folder, path }) => {
                    debug!("row {n} -> {}", path.display());
                    persons.insert(folder);
                    RowOutcome::Written { path }
                }
                Ok(RowDone::Skipped(reason)) => {
                    info!("row {n} skipped: {reason}");
                    RowOutcome::Skipped {
                        reason: reason.to_string(),
                    }
                }
                Err(err) => {
                    warn!("row {n} failed: {err}");
                    RowOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            };
            rows.push(RowReport {
                row: n,
                person: self.cell_text(row, &self.cfg.roster.person_column),
                document: self.cell_text(row, &self.cfg.roster.document_column),
                outcome,
            });
            bar.inc(1);
        }
        bar.finish_and_clear();

        let failed = rows
            .iter()
            .filter(|r| matches!(r.outcome, RowOutcome::Failed { .. }))
            .count();
        if failed > 0 && failed == rows.len() {
            error!("every row failed; check the template and the output location");
        }

        let n = persons.len();
        info!(
            "generated persons={n} rows={} failed={failed} elapsed_ms={}",
            rows.len(),
            started.elapsed().as_millis()
        );

        RunOutcome {
            status: RunStatus::Success,
            message: success_message(n),
            persons_processed: n,
            rows,
        }
    }

    fn generate_row<T: FormSource + ?Sized>(
        &self,
        mapping: &FieldMapping,
        row: Row<'_>,
        template: &T,
        output_root: &Path,
    ) -> Result<RowDone, RowError> {
        let person_column = &self.cfg.roster.person_column;
        let Some(person) = row.get(person_column).filter(|c| !c.is_blank()) else {
            return Ok(RowDone::Skipped("missing person identifier"));
        };
        let folder_name = self.path_component(person_column, &person.render())?;
        let document_column = &self.cfg.roster.document_column;
        let document = row.get(document_column).map(Cell::render).unwrap_or_default();
        let file_stem = self.path_component(document_column, &document)?;

        let mut doc = template.working_copy()?;
        let filled = populate(&mut doc, mapping, row)?;
        debug!("populated {filled} field(s) for {folder_name}/{file_stem}");

        let folder = output_root.join(&folder_name);
        let created = !folder.is_dir();
        std::fs::create_dir_all(&folder).map_err(|source| RowError::Io {
            path: folder.clone(),
            source,
        })?;

        match self.render_into(&mut doc, &folder, &file_stem) {
            Ok(path) => Ok(RowDone::Written {
                folder: folder_name,
                path,
            }),
            Err(err) => {
                if created {
                    // Only succeeds while the folder is still empty.
                    let _ = std::fs::remove_dir(&folder);
                }
                Err(err)
            }
        }
    }

    /// Interim PDF → raster pages → image PDF. Scratch files live in `folder`
    /// and are removed when this returns.
    fn render_into(
        &self,
        doc: &mut Document,
        folder: &Path,
        file_stem: &str,
    ) -> Result<PathBuf, RowError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| RowError::Io { path, source }
        };

        let bytes = form::save_to_bytes(doc)?;
        let mut interim = tempfile::Builder::new()
            .prefix("temp_")
            .suffix(".pdf")
            .tempfile_in(folder)
            .map_err(io_err(folder))?;
        let interim_path = interim.path().to_path_buf();
        interim
            .write_all(&bytes)
            .and_then(|_| interim.flush())
            .map_err(io_err(&interim_path))?;

        let scratch = tempfile::Builder::new()
            .prefix(".raster-")
            .tempdir_in(folder)
            .map_err(io_err(folder))?;
        let pages = self
            .rasterizer
            .rasterize(&interim_path, RASTER_DPI, scratch.path())
            .map_err(RowError::Raster)?;
        let pdf = assemble_pdf(&pages, RASTER_DPI, self.cfg.raster.jpeg_quality)
            .map_err(RowError::Raster)?;

        let out = folder.join(format!("{file_stem}.pdf"));
        std::fs::write(&out, pdf).map_err(io_err(&out))?;
        Ok(out)
    }

    fn path_component(&self, column: &str, value: &str) -> Result<String, RowError> {
        self.sanitizer
            .component(value)
            .ok_or_else(|| RowError::InvalidName {
                column: column.to_string(),
                value: value.to_string(),
            })
    }

    fn cell_text(&self, row: Row<'_>, column: &str) -> Option<String> {
        row.get(column)
            .filter(|c| !c.is_blank())
            .map(Cell::render)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.cfg.global.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({elapsed_precise})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message("Processing students");
        bar
    }
}

fn rejected(err: BatchError) -> RunOutcome {
    warn!("batch rejected: {err}");
    RunOutcome {
        status: err.status(),
        message: err.to_string(),
        persons_processed: 0,
        rows: Vec::new(),
    }
}

/// Writes the mapped cells of `row` into every matching field of `doc`.
/// Returns how many distinct field names were filled.
pub fn populate(doc: &mut Document, mapping: &FieldMapping, row: Row<'_>) -> Result<usize, FormError> {
    let fields = FormFields::index(doc)?;
    let mut filled = 0;
    for (name, handles) in fields.iter() {
        let Some(column) = mapping.column_for(name) else {
            continue;
        };
        let value = row.get(column).map(Cell::render).unwrap_or_default();
        for handle in handles {
            handle.set_value(doc, &value)?;
            handle.clear_appearance(doc)?;
            handle.set_read_only(doc)?;
        }
        filled += 1;
    }
    if filled > 0 {
        form::request_appearance_regeneration(doc)?;
    }
    Ok(filled)
}

pub fn success_message(persons: usize) -> String {
    let noun = if persons == 1 { "student" } else { "students" };
    format!("Successfully processed {persons} {noun}.")
}

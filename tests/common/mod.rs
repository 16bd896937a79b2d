#![allow(dead_code)]

use anyhow::{Result, bail};
use formfill::config::Config;
use formfill::form::{FormError, FormFields, FormSource, FormTemplate};
use formfill::raster::{RasterDiag, Rasterizer};
use formfill::registry::MappingRegistry;
use image::{Rgb, RgbImage};
use lopdf::{Document, Object, Stream, dictionary};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One-page fillable template with a text widget per name. Every widget
/// carries a cached appearance stream.
pub fn template_pdf(fields: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut widgets: Vec<Object> = Vec::new();

    for (i, name) in fields.iter().enumerate() {
        let appearance = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 200.into(), 20.into()],
            },
            b"/Tx BMC EMC".to_vec(),
        ));
        let y = 700 - 40 * i as i64;
        let widget = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Tx",
            "T" => Object::string_literal(*name),
            "Rect" => vec![72.into(), y.into(), 272.into(), (y + 20).into()],
            "DA" => Object::string_literal("/Helv 10 Tf 0 g"),
            "AP" => dictionary! { "N" => appearance },
        });
        widgets.push(widget.into());
    }

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Annots" => widgets.clone(),
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let acro_form = doc.add_object(dictionary! { "Fields" => widgets });
    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => acro_form,
    });
    doc.trailer.set("Root", catalog);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

pub fn economics_registry() -> MappingRegistry {
    MappingRegistry::from_json_str(
        r#"{"Economics": {"NAME_FIELD": "Candidate_Name", "YEAR_FIELD": "Year"}}"#,
    )
    .unwrap()
}

pub fn quiet_config() -> Config {
    let mut cfg = Config::default();
    cfg.global.show_progress = false;
    cfg
}

/// Writes `roster.csv` and `template.pdf` into `dir`.
pub fn write_inputs(dir: &Path, csv: &str, template: &[u8]) -> (PathBuf, PathBuf) {
    let roster = dir.join("roster.csv");
    let tpl = dir.join("template.pdf");
    std::fs::write(&roster, csv).unwrap();
    std::fs::write(&tpl, template).unwrap();
    (roster, tpl)
}

/// What the interim PDF looked like when it reached the rasterizer.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub values: BTreeMap<String, String>,
    pub read_only: BTreeMap<String, bool>,
    pub has_appearance: BTreeMap<String, bool>,
}

/// Stands in for pdftoppm: records the filled fields and returns one blank
/// page per PDF page. Fails the calls listed in `fail_calls` (0-based).
#[derive(Default)]
pub struct StubRasterizer {
    pub fail_calls: Vec<usize>,
    calls: Cell<usize>,
    pub captures: RefCell<Vec<Capture>>,
}

impl StubRasterizer {
    pub fn failing_on(calls: &[usize]) -> Self {
        Self {
            fail_calls: calls.to_vec(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Rasterizer for StubRasterizer {
    fn diagnose(&self) -> Result<RasterDiag> {
        Ok(RasterDiag {
            exe: "stub".into(),
            version: Some("stub 1.0".into()),
            ok: true,
            error: None,
        })
    }

    fn rasterize(&self, pdf: &Path, _dpi: u32, work_dir: &Path) -> Result<Vec<RgbImage>> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        assert!(work_dir.is_dir());
        if self.fail_calls.contains(&call) {
            bail!("stub failure on call {call}");
        }

        let doc = Document::load(pdf)?;
        let fields = FormFields::index(&doc)?;
        let mut capture = Capture::default();
        for (name, handles) in fields.iter() {
            let h = handles[0];
            if let Some(v) = h.value(&doc) {
                capture.values.insert(name.to_string(), v);
            }
            capture.read_only.insert(name.to_string(), h.is_read_only(&doc));
            capture
                .has_appearance
                .insert(name.to_string(), h.has_appearance(&doc));
        }
        self.captures.borrow_mut().push(capture);

        let pages = doc.get_pages().len();
        Ok((0..pages)
            .map(|_| RgbImage::from_pixel(85, 110, Rgb([255, 255, 255])))
            .collect())
    }
}

/// Template whose listed working copies (0-based) have a dangling `/AcroForm`
/// reference, so filling them fails once values are in place.
pub struct BrokenCopies {
    inner: FormTemplate,
    broken: Vec<usize>,
    calls: Cell<usize>,
}

impl BrokenCopies {
    pub fn on(inner: FormTemplate, broken: &[usize]) -> Self {
        Self {
            inner,
            broken: broken.to_vec(),
            calls: Cell::new(0),
        }
    }
}

impl FormSource for BrokenCopies {
    fn working_copy(&self) -> Result<Document, FormError> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        let mut doc = self.inner.working_copy()?;
        if self.broken.contains(&call) {
            let root = doc.trailer.get(b"Root")?.as_reference()?;
            let acro_form = doc.get_dictionary(root)?.get(b"AcroForm")?.as_reference()?;
            doc.objects.remove(&acro_form);
        }
        Ok(doc)
    }
}

pub fn template(fields: &[&str]) -> FormTemplate {
    FormTemplate::from_bytes(template_pdf(fields))
}

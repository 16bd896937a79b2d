//! Typed access to the AcroForm fields of an in-memory PDF.

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Field flag bit 1 (`/Ff`): the field may not be changed by the user.
pub const FF_READ_ONLY: i64 = 1;

#[derive(Debug, Error)]
pub enum FormError {
    #[error("failed to parse PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("annotation {index} of {annots:?} disappeared from the document")]
    MissingAnnotation { annots: AnnotsAt, index: usize },

    #[error("failed to serialize PDF: {0}")]
    Save(String),
}

/// Source template bytes. Every row deserializes its own working copy.
#[derive(Debug, Clone)]
pub struct FormTemplate {
    bytes: Vec<u8>,
}

impl FormTemplate {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn working_copy(&self) -> Result<Document, FormError> {
        Ok(Document::load_mem(&self.bytes)?)
    }
}

/// Hands out an independent, mutable copy of a form for each row.
pub trait FormSource {
    fn working_copy(&self) -> Result<Document, FormError>;
}

impl FormSource for FormTemplate {
    fn working_copy(&self) -> Result<Document, FormError> {
        FormTemplate::working_copy(self)
    }
}

/// Where an inline annotation array lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotsAt {
    /// Direct `/Annots` array of this page.
    Page(ObjectId),
    /// Indirect array object referenced by a page.
    Array(ObjectId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Indirect(ObjectId),
    Inline { annots: AnnotsAt, index: usize },
}

impl Slot {
    fn dict<'d>(self, doc: &'d Document) -> Result<&'d Dictionary, FormError> {
        match self {
            Slot::Indirect(id) => Ok(doc.get_dictionary(id)?),
            Slot::Inline { annots, index } => {
                let array = match annots {
                    AnnotsAt::Page(page) => doc.get_dictionary(page)?.get(b"Annots")?.as_array()?,
                    AnnotsAt::Array(id) => doc.get_object(id)?.as_array()?,
                };
                match array.get(index) {
                    Some(obj) => Ok(obj.as_dict()?),
                    None => Err(FormError::MissingAnnotation { annots, index }),
                }
            }
        }
    }

    fn dict_mut(self, doc: &mut Document) -> Result<&mut Dictionary, FormError> {
        match self {
            Slot::Indirect(id) => Ok(doc.get_object_mut(id)?.as_dict_mut()?),
            Slot::Inline { annots, index } => {
                let array = match annots {
                    AnnotsAt::Page(page) => doc
                        .get_object_mut(page)?
                        .as_dict_mut()?
                        .get_mut(b"Annots")?
                        .as_array_mut()?,
                    AnnotsAt::Array(id) => doc.get_object_mut(id)?.as_array_mut()?,
                };
                match array.get_mut(index) {
                    Some(obj) => Ok(obj.as_dict_mut()?),
                    None => Err(FormError::MissingAnnotation { annots, index }),
                }
            }
        }
    }
}

/// One widget of a named field. The value and flags live on the field
/// dictionary, which is the widget itself unless the name sits on its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldHandle {
    field: Slot,
    widget: Slot,
}

impl FieldHandle {
    pub fn value(&self, doc: &Document) -> Option<String> {
        match self.field.dict(doc).ok()?.get(b"V").ok()? {
            Object::String(bytes, _) => Some(decode_text_string(bytes)),
            Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        }
    }

    pub fn set_value(&self, doc: &mut Document, value: &str) -> Result<(), FormError> {
        self.field.dict_mut(doc)?.set("V", encode_text_string(value));
        Ok(())
    }

    /// Drops the cached appearance stream so the viewer regenerates it.
    pub fn clear_appearance(&self, doc: &mut Document) -> Result<(), FormError> {
        self.widget.dict_mut(doc)?.remove(b"AP");
        if self.field != self.widget {
            self.field.dict_mut(doc)?.remove(b"AP");
        }
        Ok(())
    }

    pub fn set_read_only(&self, doc: &mut Document) -> Result<(), FormError> {
        let dict = self.field.dict_mut(doc)?;
        let flags = dict.get(b"Ff").and_then(Object::as_i64).unwrap_or(0);
        dict.set("Ff", flags | FF_READ_ONLY);
        Ok(())
    }

    pub fn is_read_only(&self, doc: &Document) -> bool {
        self.field
            .dict(doc)
            .ok()
            .and_then(|d| d.get(b"Ff").and_then(Object::as_i64).ok())
            .is_some_and(|ff| ff & FF_READ_ONLY != 0)
    }

    pub fn has_appearance(&self, doc: &Document) -> bool {
        self.widget
            .dict(doc)
            .is_ok_and(|d| d.has(b"AP"))
    }
}

/// Field name → widgets, built once per working copy.
#[derive(Debug, Clone, Default)]
pub struct FormFields {
    by_name: BTreeMap<String, Vec<FieldHandle>>,
}

impl FormFields {
    pub fn index(doc: &Document) -> Result<Self, FormError> {
        let mut by_name: BTreeMap<String, Vec<FieldHandle>> = BTreeMap::new();

        for (_, page_id) in doc.get_pages() {
            let page = doc.get_dictionary(page_id)?;
            let (annots, items) = match page.get(b"Annots") {
                Ok(Object::Reference(id)) => (AnnotsAt::Array(*id), doc.get_object(*id)?.as_array()?),
                Ok(Object::Array(items)) => (AnnotsAt::Page(page_id), items),
                _ => continue,
            };

            for (index, item) in items.iter().enumerate() {
                let (widget, dict) = match item {
                    Object::Reference(id) => match doc.get_dictionary(*id) {
                        Ok(d) => (Slot::Indirect(*id), d),
                        Err(_) => continue,
                    },
                    Object::Dictionary(d) => (Slot::Inline { annots, index }, d),
                    _ => continue,
                };

                let (field, name) = if let Some(name) = partial_name(dict) {
                    (widget, name)
                } else if let Ok(Object::Reference(parent)) = dict.get(b"Parent") {
                    match doc.get_dictionary(*parent).ok().and_then(partial_name) {
                        Some(name) => (Slot::Indirect(*parent), name),
                        None => continue,
                    }
                } else {
                    continue;
                };

                by_name
                    .entry(name)
                    .or_default()
                    .push(FieldHandle { field, widget });
            }
        }

        Ok(Self { by_name })
    }

    pub fn get(&self, name: &str) -> &[FieldHandle] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sorted, distinct.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FieldHandle])> {
        self.by_name.iter().map(|(n, h)| (n.as_str(), h.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn partial_name(dict: &Dictionary) -> Option<String> {
    match dict.get(b"T").ok()? {
        Object::String(bytes, _) => {
            let name = decode_text_string(bytes).trim().to_string();
            (!name.is_empty()).then_some(name)
        }
        _ => None,
    }
}

/// Asks the viewer (and the rasterizer) to rebuild field appearances.
pub fn request_appearance_regeneration(doc: &mut Document) -> Result<(), FormError> {
    let root = doc.trailer.get(b"Root")?.as_reference()?;
    let acro_ref = match doc.get_dictionary(root)?.get(b"AcroForm") {
        Ok(Object::Reference(id)) => Some(*id),
        Ok(Object::Dictionary(_)) => None,
        _ => return Ok(()),
    };
    let acro_form = match acro_ref {
        Some(id) => doc.get_object_mut(id)?.as_dict_mut()?,
        None => doc
            .get_object_mut(root)?
            .as_dict_mut()?
            .get_mut(b"AcroForm")?
            .as_dict_mut()?,
    };
    acro_form.set("NeedAppearances", true);
    Ok(())
}

pub fn save_to_bytes(doc: &mut Document) -> Result<Vec<u8>, FormError> {
    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| FormError::Save(e.to_string()))?;
    Ok(buf)
}

/// Sorted form field names of a template.
pub fn template_field_names(template: &FormTemplate) -> Result<Vec<String>, FormError> {
    let doc = template.working_copy()?;
    let fields = FormFields::index(&doc)?;
    Ok(fields.names().map(str::to_string).collect())
}

/// PDF text string: UTF-16BE with BOM, UTF-8 with BOM, else byte-per-char.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

pub fn encode_text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::String(s.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

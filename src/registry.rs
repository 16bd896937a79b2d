//! Subject → field mapping lookup, loaded once at startup.

use crate::error::ConfigError;
use serde::de::{Deserializer, Error as _, MapAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

/// Ordered association from PDF form-field name to roster column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pair; returns `false` (and changes nothing) if the field is already mapped.
    pub fn insert(&mut self, field: impl Into<String>, column: impl Into<String>) -> bool {
        let field = field.into();
        if self.index.contains_key(&field) {
            return false;
        }
        self.index.insert(field.clone(), self.entries.len());
        self.entries.push((field, column.into()));
        true
    }

    pub fn column_for(&self, field: &str) -> Option<&str> {
        self.index.get(field).map(|&i| self.entries[i].1.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(f, c)| (f.as_str(), c.as_str()))
    }

    /// Column names in mapping order, duplicates removed.
    pub fn columns(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::with_capacity(self.entries.len());
        for (_, col) in &self.entries {
            if !out.contains(&col.as_str()) {
                out.push(col);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<F: Into<String>, C: Into<String>> FromIterator<(F, C)> for FieldMapping {
    fn from_iter<T: IntoIterator<Item = (F, C)>>(iter: T) -> Self {
        let mut m = FieldMapping::new();
        for (f, c) in iter {
            m.insert(f, c);
        }
        m
    }
}

impl Serialize for FieldMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<'de> Deserialize<'de> for FieldMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = FieldMapping;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of PDF field name to column name")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMapping, A::Error> {
                let mut mapping = FieldMapping::new();
                while let Some((field, column)) = access.next_entry::<String, String>()? {
                    if !mapping.insert(field.clone(), column) {
                        return Err(A::Error::custom(format!("duplicate field name: {field}")));
                    }
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

/// Read-only for the lifetime of a run; there is no mutating API after load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingRegistry {
    subjects: BTreeMap<String, FieldMapping>,
}

impl MappingRegistry {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// An empty mapping could never populate a field, so it counts as absent.
    pub fn lookup(&self, subject: &str) -> Option<&FieldMapping> {
        self.subjects.get(subject).filter(|m| !m.is_empty())
    }

    pub fn subjects(&self) -> impl Iterator<Item = (&str, &FieldMapping)> {
        self.subjects.iter().map(|(s, m)| (s.as_str(), m))
    }
}

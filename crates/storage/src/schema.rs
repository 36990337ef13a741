//! Store-wide metadata schema
//!
//! Permissive: the first write of a field name fixes its type, and later
//! writes must agree. Fields are never removed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use svdb_core::{FieldType, Record, SvdbError, SvdbResult, Value};

/// Field name -> type mapping shared by every record in a store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: BTreeMap<String, FieldType>,
}

impl Schema {
    /// Empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Type of `field`, if defined
    pub fn get(&self, field: &str) -> Option<FieldType> {
        self.fields.get(field).copied()
    }

    /// Number of defined fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if no field has been defined
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over `(field, type)` in field-name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldType)> + '_ {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Validate `record` against the schema.
    ///
    /// Returns the fields the record would add. Fails with `SchemaConflict`
    /// if a value disagrees with a defined type, and with `InvalidArgument`
    /// for empty field names or non-finite floats.
    pub fn check(&self, record: &Record) -> SvdbResult<Vec<(String, FieldType)>> {
        let mut added = Vec::new();
        for (field, value) in record {
            if field.is_empty() {
                return Err(SvdbError::invalid_argument("field name must not be empty"));
            }
            if let Value::Float(f) = value {
                if !f.is_finite() {
                    return Err(SvdbError::invalid_argument(format!(
                        "field '{}' holds a non-finite number",
                        field
                    )));
                }
            }
            let got = value.field_type();
            match self.fields.get(field) {
                Some(&expected) if expected != got => {
                    return Err(SvdbError::SchemaConflict {
                        field: field.clone(),
                        expected,
                        got,
                    });
                }
                Some(_) => {}
                None => added.push((field.clone(), got)),
            }
        }
        Ok(added)
    }

    /// Record a field type. Returns false if the field was already defined
    /// with a different type (the schema is unchanged).
    pub(crate) fn define(&mut self, field: String, field_type: FieldType) -> bool {
        match self.fields.get(&field) {
            Some(&existing) => existing == field_type,
            None => {
                self.fields.insert(field, field_type);
                true
            }
        }
    }
}

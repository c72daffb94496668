//! Change record payloads.
//!
//! A record carries either a comment or a reverse diff. The diff maps each
//! changed field to the value it held *before* the change; fields absent
//! from the map were not touched by the record.
//!
//! # Stored form
//!
//! Diffs are persisted as a flat JSON object, field name to JSON scalar or
//! list of ids:
//!
//! ```text
//! {"title":"old title","assignee":null,"labels":[1,4]}
//! ```
//!
//! An empty diff is `{}`. Comments live in a separate column, so an empty
//! diff is never confused with a comment.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::collections::btree_map;

use super::field::{Field, FieldValue, UnknownField, ValueShapeError};

/// Reverse diff: field to its value immediately before the change.
///
/// Iteration follows field declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    old_values: BTreeMap<Field, FieldValue>,
}

impl Diff {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `old` as the value `field` held before the change.
    pub fn insert(&mut self, field: Field, old: FieldValue) {
        self.old_values.insert(field, old);
    }

    #[must_use]
    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.old_values.get(&field)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.old_values.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.old_values.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.old_values.keys().copied()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Field, FieldValue> {
        self.old_values.iter()
    }

    /// Encode as a flat JSON document.
    #[must_use]
    pub fn to_json(&self) -> String {
        let object: Map<String, Value> = self
            .old_values
            .iter()
            .map(|(field, value)| (field.name().to_string(), value.to_json()))
            .collect();
        Value::Object(object).to_string()
    }

    /// Decode a stored JSON document.
    ///
    /// # Errors
    ///
    /// Returns a [`DiffDecodeError`] if the text is not a JSON object, names a
    /// field outside the tracked set, or holds a value of the wrong shape.
    pub fn from_json(text: &str) -> Result<Self, DiffDecodeError> {
        let value: Value = serde_json::from_str(text).map_err(DiffDecodeError::Json)?;
        let Value::Object(object) = value else {
            return Err(DiffDecodeError::NotAnObject);
        };

        let mut diff = Self::new();
        for (name, raw) in &object {
            let field: Field = name.parse()?;
            diff.insert(field, FieldValue::from_json(field, raw)?);
        }
        Ok(diff)
    }
}

impl<'a> IntoIterator for &'a Diff {
    type Item = (&'a Field, &'a FieldValue);
    type IntoIter = btree_map::Iter<'a, Field, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<(Field, FieldValue)> for Diff {
    fn from_iter<I: IntoIterator<Item = (Field, FieldValue)>>(iter: I) -> Self {
        Self {
            old_values: iter.into_iter().collect(),
        }
    }
}

/// Why a stored diff document could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DiffDecodeError {
    #[error("invalid JSON: {0}")]
    Json(serde_json::Error),
    #[error("diff document is not a JSON object")]
    NotAnObject,
    #[error(transparent)]
    UnknownField(#[from] UnknownField),
    #[error(transparent)]
    Shape(#[from] ValueShapeError),
}

/// What a change record carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Free text. Never touches ticket state.
    Comment(String),
    /// Field values from before the change.
    Diff(Diff),
    /// A stored diff that could not be decoded. Kept as an anchor in the
    /// timeline; contributes no field events.
    Unreadable { raw: String, reason: String },
}

impl Payload {
    /// Decode the two disjoint stored columns into a payload.
    ///
    /// A present comment wins. A diff that fails to decode becomes
    /// [`Payload::Unreadable`] rather than an error.
    #[must_use]
    pub fn from_columns(old_values: Option<String>, comment: Option<String>) -> Self {
        if let Some(comment) = comment {
            return Self::Comment(comment);
        }
        let raw = old_values.unwrap_or_default();
        match Diff::from_json(&raw) {
            Ok(diff) => Self::Diff(diff),
            Err(err) => Self::Unreadable {
                raw,
                reason: err.to_string(),
            },
        }
    }

    /// Encode as `(old_values, comment)` columns.
    ///
    /// Unreadable payloads are written back verbatim.
    #[must_use]
    pub fn to_columns(&self) -> (Option<String>, Option<String>) {
        match self {
            Self::Comment(text) => (None, Some(text.clone())),
            Self::Diff(diff) => (Some(diff.to_json()), None),
            Self::Unreadable { raw, .. } => (Some(raw.clone()), None),
        }
    }

    #[must_use]
    pub const fn is_comment(&self) -> bool {
        matches!(self, Self::Comment(_))
    }
}

//! The closed set of tracked ticket fields.
//!
//! Each field has a descriptor naming its stored key and its [`FieldKind`].
//! Everything that needs per-field behavior (diffing, payload decoding,
//! reference collection, replay) dispatches on the descriptor table instead
//! of matching on field names.

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::model::{Ticket, TicketUpdate};

/// A tracked ticket field, in declaration order.
///
/// The derived `Ord` is the declaration order; diffs are replayed in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Title,
    Description,
    Open,
    Locked,
    Assignee,
    DupeOf,
    BlockedBy,
    Labels,
}

/// The kind of row a reference field points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    User,
    Ticket,
    Label,
}

impl RefKind {
    pub const ALL: [Self; 3] = [Self::User, Self::Ticket, Self::Label];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ticket => "ticket",
            Self::Label => "label",
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a field's value is stored and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text.
    Text,
    /// A boolean flag.
    Flag,
    /// An optional reference to one row.
    SingleRef(RefKind),
    /// A set of references.
    ManyRef(RefKind),
}

impl FieldKind {
    /// The referenced row kind, if this is a reference field.
    #[must_use]
    pub const fn ref_kind(self) -> Option<RefKind> {
        match self {
            Self::SingleRef(kind) | Self::ManyRef(kind) => Some(kind),
            Self::Text | Self::Flag => None,
        }
    }

    #[must_use]
    pub const fn is_many(self) -> bool {
        matches!(self, Self::ManyRef(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub field: Field,
    /// Key used in stored diff payloads and in reconstructed events.
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Descriptor table, indexed by `Field as usize`.
pub static FIELDS: [FieldDescriptor; 8] = [
    FieldDescriptor {
        field: Field::Title,
        name: "title",
        kind: FieldKind::Text,
    },
    FieldDescriptor {
        field: Field::Description,
        name: "description",
        kind: FieldKind::Text,
    },
    FieldDescriptor {
        field: Field::Open,
        name: "open",
        kind: FieldKind::Flag,
    },
    FieldDescriptor {
        field: Field::Locked,
        name: "locked",
        kind: FieldKind::Flag,
    },
    FieldDescriptor {
        field: Field::Assignee,
        name: "assignee",
        kind: FieldKind::SingleRef(RefKind::User),
    },
    FieldDescriptor {
        field: Field::DupeOf,
        name: "dupe_of",
        kind: FieldKind::SingleRef(RefKind::Ticket),
    },
    FieldDescriptor {
        field: Field::BlockedBy,
        name: "blocked_by",
        kind: FieldKind::ManyRef(RefKind::Ticket),
    },
    FieldDescriptor {
        field: Field::Labels,
        name: "labels",
        kind: FieldKind::ManyRef(RefKind::Label),
    },
];

impl Field {
    /// Every tracked field, in declaration order.
    pub fn all() -> impl Iterator<Item = Self> {
        FIELDS.iter().map(|d| d.field)
    }

    #[must_use]
    pub fn descriptor(self) -> &'static FieldDescriptor {
        &FIELDS[self as usize]
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    #[must_use]
    pub fn kind(self) -> FieldKind {
        self.descriptor().kind
    }

    /// The stored representation of this field on a ticket.
    #[must_use]
    pub fn value_of(self, ticket: &Ticket) -> FieldValue {
        match self {
            Self::Title => FieldValue::Text(ticket.title.clone()),
            Self::Description => FieldValue::Text(ticket.description.clone()),
            Self::Open => FieldValue::Flag(ticket.open),
            Self::Locked => FieldValue::Flag(ticket.locked),
            Self::Assignee => FieldValue::Ref(ticket.assignee.map(|id| id.get())),
            Self::DupeOf => FieldValue::Ref(ticket.dupe_of.map(|id| id.get())),
            Self::BlockedBy => FieldValue::Set(ticket.blocked_by.iter().map(|id| id.get()).collect()),
            Self::Labels => FieldValue::Set(ticket.labels.iter().map(|id| id.get()).collect()),
        }
    }

    /// The stored representation a caller proposes, or `None` when the
    /// caller left a many-valued field untouched.
    #[must_use]
    pub fn proposed_by(self, update: &TicketUpdate) -> Option<FieldValue> {
        match self {
            Self::Title => Some(FieldValue::Text(update.title.clone())),
            Self::Description => Some(FieldValue::Text(update.description.clone())),
            Self::Open => Some(FieldValue::Flag(update.open)),
            Self::Locked => Some(FieldValue::Flag(update.locked)),
            Self::Assignee => Some(FieldValue::Ref(update.assignee.map(|id| id.get()))),
            Self::DupeOf => Some(FieldValue::Ref(update.dupe_of.map(|id| id.get()))),
            Self::BlockedBy => update
                .blocked_by
                .as_ref()
                .map(|set| FieldValue::Set(set.iter().map(|id| id.get()).collect())),
            Self::Labels => update
                .labels
                .as_ref()
                .map(|set| FieldValue::Set(set.iter().map(|id| id.get()).collect())),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Error for a field name outside the tracked set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown field '{0}'")]
pub struct UnknownField(pub String);

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FIELDS
            .iter()
            .find(|d| d.name == s)
            .map(|d| d.field)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

/// A field value in its stored form: references are raw row ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Ref(Option<i64>),
    Set(BTreeSet<i64>),
}

/// Error for a stored JSON value whose shape does not match its field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field '{field}' expects {expected}, found {found}")]
pub struct ValueShapeError {
    pub field: Field,
    pub expected: &'static str,
    pub found: String,
}

impl FieldValue {
    /// Encode as a JSON-compatible scalar or list of ids.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Flag(flag) => Value::Bool(*flag),
            Self::Ref(id) => id.map_or(Value::Null, Value::from),
            Self::Set(ids) => Value::Array(ids.iter().copied().map(Value::from).collect()),
        }
    }

    /// Decode a stored JSON value according to `field`'s kind.
    ///
    /// # Errors
    ///
    /// Returns [`ValueShapeError`] if the JSON shape does not match the kind.
    pub fn from_json(field: Field, value: &Value) -> Result<Self, ValueShapeError> {
        let mismatch = |expected: &'static str| ValueShapeError {
            field,
            expected,
            found: value.to_string(),
        };

        match field.kind() {
            FieldKind::Text => value
                .as_str()
                .map(|s| Self::Text(s.to_string()))
                .ok_or_else(|| mismatch("a string")),
            FieldKind::Flag => value
                .as_bool()
                .map(Self::Flag)
                .ok_or_else(|| mismatch("a boolean")),
            FieldKind::SingleRef(_) => match value {
                Value::Null => Ok(Self::Ref(None)),
                other => other
                    .as_i64()
                    .map(|id| Self::Ref(Some(id)))
                    .ok_or_else(|| mismatch("an id or null")),
            },
            FieldKind::ManyRef(_) => {
                let items = value.as_array().ok_or_else(|| mismatch("a list of ids"))?;
                items
                    .iter()
                    .map(|item| item.as_i64().ok_or_else(|| mismatch("a list of ids")))
                    .collect::<Result<BTreeSet<_>, _>>()
                    .map(Self::Set)
            }
        }
    }

    /// Referenced ids held by this value, if any.
    pub fn ref_ids(&self) -> impl Iterator<Item = i64> + '_ {
        let (single, many) = match self {
            Self::Ref(id) => (*id, None),
            Self::Set(ids) => (None, Some(ids.iter().copied())),
            Self::Text(_) | Self::Flag(_) => (None, None),
        };
        single.into_iter().chain(many.into_iter().flatten())
    }
}

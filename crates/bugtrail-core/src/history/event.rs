//! Reconstructed history events.
//!
//! Events are derived on every read and never persisted. Their ids are
//! stable across reconstructions so they can be used as link anchors.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt::{self, Write as _};

use super::field::Field;
use super::resolve::DisplayObject;
use crate::model::{RecordId, User};

/// Hex characters of the BLAKE3 digest kept in a change anchor (64 bits).
pub const ANCHOR_HASH_LEN: usize = 16;

/// What an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventField {
    Comment,
    Change(Field),
}

impl EventField {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Change(field) => field.name(),
        }
    }
}

impl fmt::Display for EventField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One side of an event, resolved for display.
///
/// Many-valued fields carry only the delta (added or removed members),
/// sorted by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EventValue {
    Text(String),
    Flag(bool),
    Ref(DisplayObject),
    Refs(Vec<DisplayObject>),
}

impl EventValue {
    /// Canonical encoding used for anchor hashing. Depends only on stored
    /// values and ids, never on display names.
    fn anchor_repr(value: Option<&Self>) -> String {
        match value {
            None => "null".to_string(),
            Some(Self::Text(text)) => serde_json::Value::from(text.as_str()).to_string(),
            Some(Self::Flag(flag)) => flag.to_string(),
            Some(Self::Ref(object)) => format!("{}:{}", object.kind(), object.id()),
            Some(Self::Refs(objects)) => {
                let mut out = String::from("[");
                for (index, object) in objects.iter().enumerate() {
                    if index > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{}:{}", object.kind(), object.id());
                }
                out.push(']');
                out
            }
        }
    }
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Flag(flag) => write!(f, "{flag}"),
            Self::Ref(object) => object.fmt(f),
            Self::Refs(objects) => {
                for (index, object) in objects.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    object.fmt(f)?;
                }
                Ok(())
            }
        }
    }
}

/// A discrete, displayable entry in a ticket's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Stable anchor id.
    pub id: String,
    /// The record this event came from; `None` for the opening event.
    pub record_id: Option<RecordId>,
    pub authored_by: Option<User>,
    pub authored_on: DateTime<Utc>,
    pub field: EventField,
    pub old_value: Option<EventValue>,
    pub new_value: Option<EventValue>,
}

impl Event {
    #[must_use]
    pub fn is_comment(&self) -> bool {
        self.field == EventField::Comment
    }
}

/// Anchor id for a comment record.
#[must_use]
pub fn comment_anchor(record: RecordId) -> String {
    format!("comment-{record}")
}

/// Anchor id for the synthetic opening event of a ticket.
#[must_use]
pub fn opening_anchor(ticket: crate::model::TicketId) -> String {
    format!("ticket-{ticket}")
}

/// Anchor id for a field change: the record id plus a 64-bit BLAKE3 digest
/// of `(field, old, new)`.
///
/// Within one record a field emits at most one removal and one addition,
/// which always differ in which side is empty, so anchors never collide
/// inside a record.
#[must_use]
pub fn change_anchor(
    record: RecordId,
    field: Field,
    old: Option<&EventValue>,
    new: Option<&EventValue>,
) -> String {
    let canonical = format!(
        "{}\u{1f}{}\u{1f}{}",
        field.name(),
        EventValue::anchor_repr(old),
        EventValue::anchor_repr(new)
    );
    let digest = blake3::hash(canonical.as_bytes()).to_hex();
    format!("event-{record}-{}", &digest[..ANCHOR_HASH_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Label, LabelId};

    fn label(id: i64, name: &str) -> DisplayObject {
        DisplayObject::Label(Label {
            id: LabelId(id),
            name: name.into(),
            description: String::new(),
            color: "#ffffff".into(),
        })
    }

    #[test]
    fn comment_anchor_uses_record_id() {
        assert_eq!(comment_anchor(RecordId(12)), "comment-12");
    }

    #[test]
    fn change_anchor_is_stable_and_widened() {
        let old = EventValue::Text("a".into());
        let new = EventValue::Text("b".into());
        let first = change_anchor(RecordId(3), Field::Title, Some(&old), Some(&new));
        let second = change_anchor(RecordId(3), Field::Title, Some(&old), Some(&new));
        assert_eq!(first, second);
        assert!(first.starts_with("event-3-"));
        assert_eq!(first.len(), "event-3-".len() + ANCHOR_HASH_LEN);
    }

    #[test]
    fn change_anchor_separates_removal_from_addition() {
        let set = EventValue::Refs(vec![label(1, "urgent")]);
        let removed = change_anchor(RecordId(1), Field::Labels, Some(&set), None);
        let added = change_anchor(RecordId(1), Field::Labels, None, Some(&set));
        assert_ne!(removed, added);
    }

    #[test]
    fn change_anchor_ignores_display_names() {
        let before = EventValue::Refs(vec![label(1, "urgent")]);
        let renamed = EventValue::Refs(vec![label(1, "critical")]);
        assert_eq!(
            change_anchor(RecordId(1), Field::Labels, None, Some(&before)),
            change_anchor(RecordId(1), Field::Labels, None, Some(&renamed)),
        );
    }

    #[test]
    fn event_field_serializes_as_name() {
        let json = serde_json::to_string(&EventField::Change(Field::DupeOf)).expect("serialize");
        assert_eq!(json, "\"dupe_of\"");
        let json = serde_json::to_string(&EventField::Comment).expect("serialize");
        assert_eq!(json, "\"comment\"");
    }
}

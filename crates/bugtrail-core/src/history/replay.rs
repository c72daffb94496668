//! Log reconstruction by backward replay of reverse diffs.
//!
//! Replay starts from a ticket's present state and walks its records newest
//! first. For each diffed field the current replay state is the value *after*
//! the record's change and the stored value is the value *before* it; the
//! pair is reconciled into events, then the state is rewound to the stored
//! value so older records see their own baseline.
//!
//! Replay is a pure computation over already-fetched data. Store access
//! happens in [`build_log`] before the walk begins.

use std::collections::VecDeque;
use std::iter::Rev;
use std::slice;

use super::event::{
    Event, EventField, EventValue, change_anchor, comment_anchor, opening_anchor,
};
use super::field::{Field, FieldKind, FieldValue, RefKind};
use super::payload::Payload;
use super::record::ChangeRecord;
use super::resolve::{ReferenceRequest, ReferenceResolver, ReferenceTable};
use super::store::{RecordStore, TicketStore};
use crate::error::TrailError;
use crate::model::{Ticket, TicketId, User, UserId};

// ---------------------------------------------------------------------------
// Replay state
// ---------------------------------------------------------------------------

/// Per-field replay state, indexed by `Field as usize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    values: Vec<FieldValue>,
}

impl Snapshot {
    /// Seed from a ticket's present values.
    #[must_use]
    pub fn of(ticket: &Ticket) -> Self {
        Self {
            values: Field::all().map(|field| field.value_of(ticket)).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, field: Field) -> &FieldValue {
        &self.values[field as usize]
    }

    /// Set `field` back to the value it held before a record, returning the
    /// value it held after.
    pub fn rewind(&mut self, field: Field, before: FieldValue) -> FieldValue {
        std::mem::replace(&mut self.values[field as usize], before)
    }
}

// ---------------------------------------------------------------------------
// Reconciliation policy
// ---------------------------------------------------------------------------

/// One displayable transition produced for a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub old: Option<EventValue>,
    pub new: Option<EventValue>,
}

/// Turn a stored `(before, after)` pair into displayable changes.
///
/// - Text and flags: one change when the values differ.
/// - Single references: dropped entirely if either side names a row that no
///   longer exists; otherwise one change when the resolved values differ.
/// - Many references: a removal and an addition, each holding only members
///   that still resolve. Either is omitted when it ends up empty.
#[must_use]
pub fn reconcile(
    field: Field,
    before: &FieldValue,
    after: &FieldValue,
    refs: &ReferenceTable,
) -> Vec<Change> {
    match (field.kind(), before, after) {
        (FieldKind::Text, FieldValue::Text(old), FieldValue::Text(new)) => {
            if old == new {
                return Vec::new();
            }
            vec![Change {
                old: Some(EventValue::Text(old.clone())),
                new: Some(EventValue::Text(new.clone())),
            }]
        }
        (FieldKind::Flag, FieldValue::Flag(old), FieldValue::Flag(new)) => {
            if old == new {
                return Vec::new();
            }
            vec![Change {
                old: Some(EventValue::Flag(*old)),
                new: Some(EventValue::Flag(*new)),
            }]
        }
        (FieldKind::SingleRef(kind), FieldValue::Ref(old), FieldValue::Ref(new)) => {
            let (Some(old), Some(new)) = (resolve_one(refs, kind, *old), resolve_one(refs, kind, *new))
            else {
                return Vec::new();
            };
            if old == new {
                return Vec::new();
            }
            vec![Change { old, new }]
        }
        (FieldKind::ManyRef(kind), FieldValue::Set(old), FieldValue::Set(new)) => {
            let removed = resolve_many(refs, kind, old.difference(new).copied());
            let added = resolve_many(refs, kind, new.difference(old).copied());
            let mut changes = Vec::with_capacity(2);
            if let Some(removed) = removed {
                changes.push(Change {
                    old: Some(removed),
                    new: None,
                });
            }
            if let Some(added) = added {
                changes.push(Change {
                    old: None,
                    new: Some(added),
                });
            }
            changes
        }
        (kind, before, after) => {
            tracing::warn!(
                field = %field,
                ?kind,
                ?before,
                ?after,
                "replay state shape does not match field kind, skipping"
            );
            Vec::new()
        }
    }
}

/// `Some(None)` for an empty reference, `Some(Some(_))` when it resolves,
/// `None` when it dangles.
fn resolve_one(refs: &ReferenceTable, kind: RefKind, id: Option<i64>) -> Option<Option<EventValue>> {
    match id {
        None => Some(None),
        Some(id) => refs
            .lookup(kind, id)
            .map(|object| Some(EventValue::Ref(object.clone()))),
    }
}

fn resolve_many(
    refs: &ReferenceTable,
    kind: RefKind,
    ids: impl Iterator<Item = i64>,
) -> Option<EventValue> {
    let objects: Vec<_> = ids.filter_map(|id| refs.lookup(kind, id).cloned()).collect();
    (!objects.is_empty()).then_some(EventValue::Refs(objects))
}

// ---------------------------------------------------------------------------
// Replay iterator
// ---------------------------------------------------------------------------

/// Lazy, newest-first stream of events for one ticket.
///
/// Created by [`replay`] or [`TicketHistory::events`]. Each call starts from
/// the present state again, so the stream is restartable by calling again.
#[derive(Debug)]
pub struct Replay<'a> {
    records: Rev<slice::Iter<'a, ChangeRecord>>,
    state: Snapshot,
    refs: &'a ReferenceTable,
    pending: VecDeque<Event>,
}

/// Replay `records` (ordered oldest first) backward from `present`.
#[must_use]
pub fn replay<'a>(
    present: &Ticket,
    records: &'a [ChangeRecord],
    refs: &'a ReferenceTable,
) -> Replay<'a> {
    Replay {
        records: records.iter().rev(),
        state: Snapshot::of(present),
        refs,
        pending: VecDeque::new(),
    }
}

impl Replay<'_> {
    fn author(&self, id: Option<UserId>) -> Option<User> {
        id.and_then(|id| self.refs.user(id.get()).cloned())
    }

    fn step(&mut self, record: &ChangeRecord) {
        let authored_by = self.author(record.authored_by);

        match &record.payload {
            Payload::Comment(text) => self.pending.push_back(Event {
                id: comment_anchor(record.id),
                record_id: Some(record.id),
                authored_by,
                authored_on: record.authored_on,
                field: EventField::Comment,
                old_value: None,
                new_value: Some(EventValue::Text(text.clone())),
            }),
            Payload::Unreadable { reason, .. } => {
                tracing::warn!(
                    record = %record.id,
                    ticket = %record.ticket_id,
                    reason = %reason,
                    "unreadable change record payload, skipping its field changes"
                );
            }
            Payload::Diff(diff) => {
                for (&field, before) in diff {
                    let after = self.state.rewind(field, before.clone());
                    for change in reconcile(field, before, &after, self.refs) {
                        self.pending.push_back(Event {
                            id: change_anchor(
                                record.id,
                                field,
                                change.old.as_ref(),
                                change.new.as_ref(),
                            ),
                            record_id: Some(record.id),
                            authored_by: authored_by.clone(),
                            authored_on: record.authored_on,
                            field: EventField::Change(field),
                            old_value: change.old,
                            new_value: change.new,
                        });
                    }
                }
            }
        }
    }
}

impl Iterator for Replay<'_> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let record = self.records.next()?;
            self.step(record);
        }
    }
}

// ---------------------------------------------------------------------------
// Assembled history
// ---------------------------------------------------------------------------

/// Which way a materialized log is ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogOrder {
    #[default]
    NewestFirst,
    Chronological,
}

/// Everything needed to reconstruct one ticket's log without further store
/// access.
#[derive(Debug, Clone)]
pub struct TicketHistory {
    ticket: Ticket,
    records: Vec<ChangeRecord>,
    refs: ReferenceTable,
}

impl TicketHistory {
    /// Assemble a history. Records are ordered by `(authored_on, id)`.
    #[must_use]
    pub fn new(ticket: Ticket, mut records: Vec<ChangeRecord>, refs: ReferenceTable) -> Self {
        records.sort_by(|a, b| (a.authored_on, a.id).cmp(&(b.authored_on, b.id)));
        Self {
            ticket,
            records,
            refs,
        }
    }

    #[must_use]
    pub const fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    #[must_use]
    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Newest-first event stream.
    #[must_use]
    pub fn events(&self) -> Replay<'_> {
        replay(&self.ticket, &self.records, &self.refs)
    }

    #[must_use]
    pub fn to_vec(&self, order: LogOrder) -> Vec<Event> {
        let mut events: Vec<Event> = self.events().collect();
        if order == LogOrder::Chronological {
            events.reverse();
        }
        events
    }

    /// The ticket's description shown as the oldest entry of its timeline.
    #[must_use]
    pub fn opening_event(&self) -> Event {
        Event {
            id: opening_anchor(self.ticket.id),
            record_id: None,
            authored_by: self
                .ticket
                .authored_by
                .and_then(|id| self.refs.user(id.get()).cloned()),
            authored_on: self.ticket.created_on,
            field: EventField::Comment,
            old_value: None,
            new_value: Some(EventValue::Text(self.ticket.description.clone())),
        }
    }
}

/// Number of comment events in `events`.
#[must_use]
pub fn comment_count(events: &[Event]) -> usize {
    events.iter().filter(|event| event.is_comment()).count()
}

/// Fetch a ticket's present state and records, batch-resolve every id they
/// mention, and return a history ready for replay.
///
/// Callers that need a consistent view across the reads should run this
/// inside a single read transaction.
///
/// # Errors
///
/// Returns [`TrailError::NotFound`] if the ticket does not exist, or any
/// store failure unchanged.
pub fn build_log<S>(store: &S, id: TicketId) -> Result<TicketHistory, TrailError>
where
    S: TicketStore + RecordStore + ReferenceResolver + ?Sized,
{
    let ticket = store.get_current(id)?;
    let records = store.list_for(id)?;
    let refs = ReferenceRequest::for_history(&ticket, &records).resolve(store)?;
    tracing::debug!(
        ticket = %id,
        records = records.len(),
        references = refs.len(),
        "assembled ticket history"
    );
    Ok(TicketHistory::new(ticket, records, refs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::payload::Diff;
    use crate::history::resolve::DisplayObject;
    use crate::model::{Label, LabelId, RecordId, TicketSummary};
    use chrono::{DateTime, Duration, Utc};

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::minutes(minutes)
    }

    fn ticket() -> Ticket {
        Ticket {
            id: TicketId(1),
            title: "A".into(),
            description: "desc".into(),
            authored_by: Some(UserId(1)),
            created_on: at(0),
            open: true,
            locked: false,
            assignee: None,
            dupe_of: None,
            blocked_by: std::collections::BTreeSet::new(),
            labels: std::collections::BTreeSet::new(),
        }
    }

    fn diff(id: i64, minute: i64, entries: Vec<(Field, FieldValue)>) -> ChangeRecord {
        ChangeRecord {
            id: RecordId(id),
            ticket_id: TicketId(1),
            authored_by: Some(UserId(1)),
            authored_on: at(minute),
            payload: Payload::Diff(entries.into_iter().collect::<Diff>()),
        }
    }

    fn set(ids: &[i64]) -> FieldValue {
        FieldValue::Set(ids.iter().copied().collect())
    }

    fn label(id: i64) -> DisplayObject {
        DisplayObject::Label(Label {
            id: LabelId(id),
            name: format!("l{id}"),
            description: String::new(),
            color: "#ffffff".into(),
        })
    }

    fn user_table() -> ReferenceTable {
        [DisplayObject::User(User {
            id: UserId(1),
            username: "ada".into(),
        })]
        .into_iter()
        .collect()
    }

    #[test]
    fn scalar_changes_replay_in_order() {
        let mut present = ticket();
        present.title = "B".into();
        present.open = false;
        let records = vec![
            diff(1, 1, vec![(Field::Title, FieldValue::Text("A".into()))]),
            diff(2, 2, vec![(Field::Open, FieldValue::Flag(true))]),
        ];
        let refs = user_table();
        let history = TicketHistory::new(present, records, refs);
        let events = history.to_vec(LogOrder::Chronological);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].field, EventField::Change(Field::Title));
        assert_eq!(events[0].old_value, Some(EventValue::Text("A".into())));
        assert_eq!(events[0].new_value, Some(EventValue::Text("B".into())));
        assert_eq!(events[1].field, EventField::Change(Field::Open));
        assert_eq!(events[1].old_value, Some(EventValue::Flag(true)));
        assert_eq!(events[1].new_value, Some(EventValue::Flag(false)));
        assert_eq!(
            events[0].authored_by.as_ref().map(|u| u.username.as_str()),
            Some("ada")
        );
    }

    #[test]
    fn many_valued_change_splits_into_removal_and_addition() {
        let mut present = ticket();
        present.labels = [LabelId(2), LabelId(3)].into_iter().collect();
        let records = vec![diff(1, 1, vec![(Field::Labels, set(&[1, 2]))])];
        let refs: ReferenceTable = [label(1), label(2), label(3)].into_iter().collect();

        let events: Vec<_> = replay(&present, &records, &refs).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].old_value, Some(EventValue::Refs(vec![label(1)])));
        assert_eq!(events[0].new_value, None);
        assert_eq!(events[1].old_value, None);
        assert_eq!(events[1].new_value, Some(EventValue::Refs(vec![label(3)])));
        assert_ne!(events[0].id, events[1].id);
    }

    #[test]
    fn dangling_single_reference_suppresses_event() {
        let before = FieldValue::Ref(Some(7));
        let after = FieldValue::Ref(None);
        assert!(reconcile(Field::Assignee, &before, &after, &ReferenceTable::default()).is_empty());

        let refs: ReferenceTable = [DisplayObject::Ticket(TicketSummary {
            id: TicketId(7),
            title: "other".into(),
            open: true,
        })]
        .into_iter()
        .collect();
        let changes = reconcile(Field::DupeOf, &before, &after, &refs);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new, None);
    }

    #[test]
    fn dangling_members_are_dropped_from_deltas() {
        let refs: ReferenceTable = [label(2)].into_iter().collect();
        let changes = reconcile(Field::Labels, &set(&[]), &set(&[1, 2]), &refs);
        assert_eq!(
            changes,
            vec![Change {
                old: None,
                new: Some(EventValue::Refs(vec![label(2)])),
            }]
        );
        assert!(reconcile(Field::Labels, &set(&[1]), &set(&[]), &refs).is_empty());
    }

    #[test]
    fn comments_do_not_touch_state() {
        let mut present = ticket();
        present.title = "B".into();
        let records = vec![
            diff(1, 1, vec![(Field::Title, FieldValue::Text("A".into()))]),
            ChangeRecord {
                id: RecordId(2),
                ticket_id: TicketId(1),
                authored_by: None,
                authored_on: at(2),
                payload: Payload::Comment("hello".into()),
            },
        ];
        let refs = ReferenceTable::default();
        let events: Vec<_> = replay(&present, &records, &refs).collect();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, "comment-2");
        assert!(events[0].is_comment());
        assert_eq!(events[1].new_value, Some(EventValue::Text("B".into())));
        assert_eq!(comment_count(&events), 1);
    }

    #[test]
    fn unreadable_record_is_skipped_without_rewinding() {
        let mut present = ticket();
        present.title = "C".into();
        let records = vec![
            diff(1, 1, vec![(Field::Title, FieldValue::Text("A".into()))]),
            ChangeRecord {
                id: RecordId(2),
                ticket_id: TicketId(1),
                authored_by: None,
                authored_on: at(2),
                payload: Payload::from_columns(Some("{oops".into()), None),
            },
        ];
        let refs = ReferenceTable::default();
        let events: Vec<_> = replay(&present, &records, &refs).collect();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].record_id, Some(RecordId(1)));
        assert_eq!(events[0].new_value, Some(EventValue::Text("C".into())));
    }

    #[test]
    fn empty_diff_yields_no_events() {
        let records = vec![diff(1, 1, Vec::new())];
        let refs = ReferenceTable::default();
        assert_eq!(replay(&ticket(), &records, &refs).count(), 0);
    }

    #[test]
    fn history_orders_ties_by_record_id() {
        let mut present = ticket();
        present.title = "C".into();
        let records = vec![
            diff(5, 1, vec![(Field::Title, FieldValue::Text("B".into()))]),
            diff(4, 1, vec![(Field::Title, FieldValue::Text("A".into()))]),
        ];
        let history = TicketHistory::new(present, records, ReferenceTable::default());
        let events = history.to_vec(LogOrder::Chronological);

        assert_eq!(events[0].record_id, Some(RecordId(4)));
        assert_eq!(events[0].new_value, Some(EventValue::Text("B".into())));
        assert_eq!(events[1].record_id, Some(RecordId(5)));
        assert_eq!(events[1].new_value, Some(EventValue::Text("C".into())));
    }

    #[test]
    fn opening_event_carries_description() {
        let history = TicketHistory::new(ticket(), Vec::new(), user_table());
        let opening = history.opening_event();
        assert_eq!(opening.id, "ticket-1");
        assert!(opening.is_comment());
        assert_eq!(opening.new_value, Some(EventValue::Text("desc".into())));
        assert_eq!(opening.authored_on, at(0));
        assert!(history.events().next().is_none());
    }

    #[test]
    fn replay_is_restartable_and_deterministic() {
        let mut present = ticket();
        present.labels = [LabelId(2)].into_iter().collect();
        let records = vec![
            diff(1, 1, vec![(Field::Labels, set(&[]))]),
            diff(2, 2, vec![(Field::Labels, set(&[1, 2]))]),
        ];
        let refs: ReferenceTable = [label(1), label(2)].into_iter().collect();
        let history = TicketHistory::new(present, records, refs);

        let first: Vec<_> = history.events().map(|e| e.id).collect();
        let second: Vec<_> = history.events().map(|e| e.id).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}

//! Change recording.
//!
//! Every update re-reads the ticket inside a write transaction, computes a
//! reverse diff against that fresh state, applies the new values, and
//! appends exactly one [`ChangeRecord`], all before committing. Comments
//! append a record without touching ticket state.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::{BTreeMap, BTreeSet};

use super::field::{Field, RefKind};
use super::payload::{Diff, Payload};
use super::record::{ChangeRecord, NewRecord, monotonic_timestamp};
use super::resolve::ReferenceResolver;
use super::store::{RecordStore, TicketStore};
use crate::error::TrailError;
use crate::model::ticket::MAX_TITLE_LEN;
use crate::model::{Ticket, TicketId, TicketUpdate, UserId};

/// Attempts made by [`Recorder`] before a conflict is surfaced.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Reverse diff between a ticket's present state and a proposed update.
///
/// Holds the *current* value of every field whose proposed value differs.
/// Many-valued fields the update leaves unsupplied are never compared.
#[must_use]
pub fn compute_diff(current: &Ticket, update: &TicketUpdate) -> Diff {
    Field::all()
        .filter_map(|field| {
            let proposed = field.proposed_by(update)?;
            let present = field.value_of(current);
            (present != proposed).then_some((field, present))
        })
        .collect()
}

/// Checks that need no store access.
///
/// # Errors
///
/// [`TrailError::Validation`] for an empty or overlong title, or a ticket
/// marked as a duplicate of itself.
pub fn validate_update(id: TicketId, update: &TicketUpdate) -> Result<(), TrailError> {
    if update.title.trim().is_empty() {
        return Err(TrailError::invalid("title", "must not be empty"));
    }
    let len = update.title.chars().count();
    if len > MAX_TITLE_LEN {
        return Err(TrailError::invalid(
            "title",
            format!("{len} characters exceeds the maximum of {MAX_TITLE_LEN}"),
        ));
    }
    if update.dupe_of == Some(id) {
        return Err(TrailError::invalid(
            "dupe_of",
            format!("ticket {id} cannot be a duplicate of itself"),
        ));
    }
    Ok(())
}

/// Ensure every id the update points at (and the author) exists.
fn check_references<R>(
    resolver: &R,
    update: &TicketUpdate,
    author: Option<UserId>,
) -> Result<(), TrailError>
where
    R: ReferenceResolver + ?Sized,
{
    let mut wanted: BTreeMap<RefKind, BTreeSet<i64>> = BTreeMap::new();
    for field in Field::all() {
        let (Some(kind), Some(value)) = (field.kind().ref_kind(), field.proposed_by(update)) else {
            continue;
        };
        wanted.entry(kind).or_default().extend(value.ref_ids());
    }
    if let Some(author) = author {
        wanted.entry(RefKind::User).or_default().insert(author.get());
    }
    check_exist(resolver, &wanted)
}

fn check_exist<R>(resolver: &R, wanted: &BTreeMap<RefKind, BTreeSet<i64>>) -> Result<(), TrailError>
where
    R: ReferenceResolver + ?Sized,
{
    for (&kind, ids) in wanted {
        if ids.is_empty() {
            continue;
        }
        let found = resolver.resolve(kind, ids)?;
        if let Some(&id) = ids.iter().find(|id| !found.contains_key(id)) {
            return Err(TrailError::NotFound { kind, id });
        }
    }
    Ok(())
}

/// Record an update against `store`.
///
/// The caller owns the transaction: the re-read, the write, and the append
/// must all happen inside one.
///
/// # Errors
///
/// Validation and missing-reference errors are returned before anything is
/// written. Store failures propagate.
pub fn record_change_in<S>(
    store: &S,
    id: TicketId,
    update: &TicketUpdate,
    author: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<ChangeRecord, TrailError>
where
    S: TicketStore + RecordStore + ReferenceResolver + ?Sized,
{
    let current = store.get_current(id)?;
    commit_change(store, &current, update, author, now)
}

/// Like [`record_change_in`], but the update is derived from the state read
/// inside the transaction. Fields `build` leaves as they are in `current`
/// are not written back from a stale copy.
///
/// # Errors
///
/// Same as [`record_change_in`].
pub fn record_change_with_in<S, F>(
    store: &S,
    id: TicketId,
    build: F,
    author: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<ChangeRecord, TrailError>
where
    S: TicketStore + RecordStore + ReferenceResolver + ?Sized,
    F: FnOnce(&Ticket) -> TicketUpdate,
{
    let current = store.get_current(id)?;
    let update = build(&current);
    commit_change(store, &current, &update, author, now)
}

fn commit_change<S>(
    store: &S,
    current: &Ticket,
    update: &TicketUpdate,
    author: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<ChangeRecord, TrailError>
where
    S: TicketStore + RecordStore + ReferenceResolver + ?Sized,
{
    let id = current.id;
    validate_update(id, update)?;
    check_references(store, update, author)?;

    let diff = compute_diff(current, update);
    store.apply(id, update)?;

    let authored_on = monotonic_timestamp(now, store.latest_authored_on(id)?);
    let record = store.append(NewRecord {
        ticket_id: id,
        authored_by: author,
        authored_on,
        payload: Payload::Diff(diff),
    })?;
    tracing::debug!(
        ticket = %id,
        record = %record.id,
        fields = ?record_fields(&record),
        "recorded ticket update"
    );
    Ok(record)
}

/// Record a comment against `store`. Ticket state is not touched.
///
/// # Errors
///
/// [`TrailError::Validation`] for a blank comment, [`TrailError::NotFound`]
/// for a missing ticket or author, or a store failure.
pub fn record_comment_in<S>(
    store: &S,
    id: TicketId,
    text: &str,
    author: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<ChangeRecord, TrailError>
where
    S: TicketStore + RecordStore + ReferenceResolver + ?Sized,
{
    if text.trim().is_empty() {
        return Err(TrailError::invalid("comment", "must not be empty"));
    }
    store.get_current(id)?;
    if let Some(author) = author {
        let wanted = BTreeMap::from([(RefKind::User, BTreeSet::from([author.get()]))]);
        check_exist(store, &wanted)?;
    }

    let authored_on = monotonic_timestamp(now, store.latest_authored_on(id)?);
    let record = store.append(NewRecord {
        ticket_id: id,
        authored_by: author,
        authored_on,
        payload: Payload::Comment(text.to_string()),
    })?;
    tracing::debug!(ticket = %id, record = %record.id, "recorded comment");
    Ok(record)
}

fn record_fields(record: &ChangeRecord) -> Vec<&'static str> {
    match &record.payload {
        Payload::Diff(diff) => diff.fields().map(Field::name).collect(),
        Payload::Comment(_) | Payload::Unreadable { .. } => Vec::new(),
    }
}

/// Serialized writer over a SQLite connection.
///
/// Each operation runs in a `BEGIN IMMEDIATE` transaction so the re-read
/// and the write cannot interleave with another writer. Lock contention
/// that outlasts the busy timeout surfaces as [`TrailError::Conflict`] and
/// the whole operation is retried from a fresh read.
#[derive(Debug, Clone, Copy)]
pub struct Recorder<'conn> {
    conn: &'conn Connection,
    max_attempts: u32,
}

impl<'conn> Recorder<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Total attempts per operation, including the first. Clamped to 1.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Apply `update` to ticket `id` and append one change record.
    ///
    /// # Errors
    ///
    /// See [`record_change_in`]. Conflicts are returned once attempts run
    /// out.
    pub fn record_change(
        &self,
        id: TicketId,
        update: &TicketUpdate,
        author: Option<UserId>,
    ) -> Result<ChangeRecord, TrailError> {
        self.with_retry(id, |conn| {
            record_change_in(conn, id, update, author, Utc::now())
        })
    }

    /// Derive an update from the ticket's state as read inside the write
    /// transaction, apply it, and append one change record. `build` runs
    /// once per attempt.
    ///
    /// # Errors
    ///
    /// See [`record_change_with_in`].
    pub fn record_change_with<F>(
        &self,
        id: TicketId,
        build: F,
        author: Option<UserId>,
    ) -> Result<ChangeRecord, TrailError>
    where
        F: Fn(&Ticket) -> TicketUpdate,
    {
        self.with_retry(id, |conn| {
            record_change_with_in(conn, id, &build, author, Utc::now())
        })
    }

    /// Append a comment record to ticket `id`.
    ///
    /// # Errors
    ///
    /// See [`record_comment_in`].
    pub fn record_comment(
        &self,
        id: TicketId,
        text: &str,
        author: Option<UserId>,
    ) -> Result<ChangeRecord, TrailError> {
        self.with_retry(id, |conn| {
            record_comment_in(conn, id, text, author, Utc::now())
        })
    }

    fn with_retry<T>(
        &self,
        ticket: TicketId,
        op: impl Fn(&Connection) -> Result<T, TrailError>,
    ) -> Result<T, TrailError> {
        let mut attempt = 1;
        loop {
            match self.attempt(ticket, &op) {
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        ticket = %ticket,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "write conflict, retrying from a fresh read"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn attempt<T>(
        &self,
        ticket: TicketId,
        op: &impl Fn(&Connection) -> Result<T, TrailError>,
    ) -> Result<T, TrailError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(|err| TrailError::from(err).for_ticket(ticket))?;
        let out = op(&tx).map_err(|err| err.for_ticket(ticket))?;
        tx.commit()
            .map_err(|err| TrailError::from(err).for_ticket(ticket))?;
        Ok(out)
    }
}

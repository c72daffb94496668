//! SQLite implementations of the history storage seams.
//!
//! All three traits are implemented directly on [`Connection`], so a
//! [`rusqlite::Transaction`] can be passed anywhere a store is expected by
//! dereferencing it.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::collections::{BTreeMap, BTreeSet};

use super::query::{row_to_label, row_to_user};
use crate::error::TrailError;
use crate::history::payload::Payload;
use crate::history::record::{ChangeRecord, NewRecord};
use crate::history::replay::{TicketHistory, build_log};
use crate::history::resolve::{DisplayObject, ReferenceResolver};
use crate::history::store::{RecordStore, TicketStore};
use crate::history::RefKind;
use crate::model::{RecordId, Ticket, TicketId, TicketSummary, TicketUpdate};

/// Ids bound per `IN (...)` query, below SQLite's oldest variable limit.
const RESOLVE_CHUNK: usize = 500;

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Timestamps are stored as integer microseconds since the Unix epoch.
pub(crate) fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub(crate) fn from_micros(column: usize, us: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(us).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            format!("timestamp {us}us out of range").into(),
        )
    })
}

/// Drop sub-microsecond precision so values read back compare equal.
pub(crate) fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const TICKET_COLUMNS: &str = "ticket_id, title, description, authored_by, \
     created_at_us, is_open, is_locked, assignee_id, dupe_of_id";

/// Map a `TICKET_COLUMNS` row. Relation sets are left empty.
fn row_to_ticket(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        authored_by: row.get(3)?,
        created_on: from_micros(4, row.get(4)?)?,
        open: row.get(5)?,
        locked: row.get(6)?,
        assignee: row.get(7)?,
        dupe_of: row.get(8)?,
        blocked_by: BTreeSet::new(),
        labels: BTreeSet::new(),
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ChangeRecord> {
    Ok(ChangeRecord {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        authored_by: row.get(2)?,
        authored_on: from_micros(3, row.get(3)?)?,
        payload: Payload::from_columns(row.get(4)?, row.get(5)?),
    })
}

fn id_set<T>(conn: &Connection, sql: &str, ticket: TicketId) -> rusqlite::Result<BTreeSet<T>>
where
    T: rusqlite::types::FromSql + Ord,
{
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map([ticket], |row| row.get(0))?;
    rows.collect()
}

fn replace_relation<T>(
    conn: &Connection,
    table: &str,
    column: &str,
    ticket: TicketId,
    members: &BTreeSet<T>,
) -> rusqlite::Result<()>
where
    T: rusqlite::ToSql,
{
    conn.execute(&format!("DELETE FROM {table} WHERE ticket_id = ?1"), [ticket])?;
    let mut insert =
        conn.prepare(&format!("INSERT INTO {table} (ticket_id, {column}) VALUES (?1, ?2)"))?;
    for member in members {
        insert.execute(params![ticket, member])?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

impl TicketStore for Connection {
    fn get_current(&self, id: TicketId) -> Result<Ticket, TrailError> {
        let ticket = self
            .query_row(
                &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE ticket_id = ?1"),
                [id],
                row_to_ticket,
            )
            .optional()?;
        let Some(mut ticket) = ticket else {
            return Err(TrailError::NotFound {
                kind: RefKind::Ticket,
                id: id.get(),
            });
        };

        ticket.blocked_by = id_set(
            self,
            "SELECT blocker_id FROM ticket_blocked_by WHERE ticket_id = ?1",
            id,
        )?;
        ticket.labels = id_set(
            self,
            "SELECT label_id FROM ticket_labels WHERE ticket_id = ?1",
            id,
        )?;
        Ok(ticket)
    }

    fn apply(&self, id: TicketId, update: &TicketUpdate) -> Result<(), TrailError> {
        let changed = self.execute(
            "UPDATE tickets
             SET title = ?2, description = ?3, is_open = ?4, is_locked = ?5,
                 assignee_id = ?6, dupe_of_id = ?7
             WHERE ticket_id = ?1",
            params![
                id,
                update.title,
                update.description,
                update.open,
                update.locked,
                update.assignee,
                update.dupe_of,
            ],
        )?;
        if changed == 0 {
            return Err(TrailError::NotFound {
                kind: RefKind::Ticket,
                id: id.get(),
            });
        }

        if let Some(blockers) = &update.blocked_by {
            replace_relation(self, "ticket_blocked_by", "blocker_id", id, blockers)?;
        }
        if let Some(labels) = &update.labels {
            replace_relation(self, "ticket_labels", "label_id", id, labels)?;
        }
        Ok(())
    }
}

impl RecordStore for Connection {
    fn list_for(&self, ticket: TicketId) -> Result<Vec<ChangeRecord>, TrailError> {
        let mut stmt = self.prepare_cached(
            "SELECT record_id, ticket_id, authored_by, authored_at_us, old_values, comment
             FROM change_records
             WHERE ticket_id = ?1
             ORDER BY authored_at_us ASC, record_id ASC",
        )?;
        let rows = stmt.query_map([ticket], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn latest_authored_on(&self, ticket: TicketId) -> Result<Option<DateTime<Utc>>, TrailError> {
        let latest: Option<i64> = self.query_row(
            "SELECT MAX(authored_at_us) FROM change_records WHERE ticket_id = ?1",
            [ticket],
            |row| row.get(0),
        )?;
        Ok(latest.map(|us| from_micros(0, us)).transpose()?)
    }

    fn append(&self, record: NewRecord) -> Result<ChangeRecord, TrailError> {
        let (old_values, comment) = record.payload.to_columns();
        self.execute(
            "INSERT INTO change_records
                (ticket_id, authored_by, authored_at_us, old_values, comment)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.ticket_id,
                record.authored_by,
                to_micros(record.authored_on),
                old_values,
                comment,
            ],
        )?;
        let id = RecordId(self.last_insert_rowid());
        Ok(NewRecord {
            authored_on: truncate_micros(record.authored_on),
            ..record
        }
        .with_id(id))
    }
}

impl ReferenceResolver for Connection {
    fn resolve(
        &self,
        kind: RefKind,
        ids: &BTreeSet<i64>,
    ) -> Result<BTreeMap<i64, DisplayObject>, TrailError> {
        let ids: Vec<i64> = ids.iter().copied().collect();
        let mut found = BTreeMap::new();

        for chunk in ids.chunks(RESOLVE_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = match kind {
                RefKind::User => {
                    format!("SELECT user_id, username FROM users WHERE user_id IN ({placeholders})")
                }
                RefKind::Ticket => format!(
                    "SELECT ticket_id, title, is_open FROM tickets WHERE ticket_id IN ({placeholders})"
                ),
                RefKind::Label => format!(
                    "SELECT label_id, name, description, color FROM labels \
                     WHERE label_id IN ({placeholders})"
                ),
            };

            let mut stmt = self.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk), |row| match kind {
                RefKind::User => row_to_user(row).map(DisplayObject::User),
                RefKind::Ticket => Ok(DisplayObject::Ticket(TicketSummary {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    open: row.get(2)?,
                })),
                RefKind::Label => row_to_label(row).map(DisplayObject::Label),
            })?;
            for object in rows {
                let object = object?;
                found.insert(object.id(), object);
            }
        }

        Ok(found)
    }
}

/// Reconstruct a ticket's history from one consistent snapshot of the store.
///
/// The present state, the records, and every reference lookup are read in a
/// single read transaction, so a concurrent write is seen either entirely or
/// not at all.
///
/// # Errors
///
/// [`TrailError::NotFound`] for a missing ticket, or a store failure.
pub fn load_history(conn: &Connection, id: TicketId) -> Result<TicketHistory, TrailError> {
    let tx = conn.unchecked_transaction()?;
    let snapshot: &Connection = &tx;
    let history = build_log(snapshot, id)?;
    tx.commit()?;
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_in_memory, query};
    use crate::model::NewTicket;

    fn seeded() -> (Connection, Ticket) {
        let conn = open_in_memory().expect("open db");
        let ada = query::create_user(&conn, "ada").expect("create user");
        let ticket = query::create_ticket(
            &conn,
            &NewTicket {
                title: "Crash on save".into(),
                description: "Steps inside".into(),
                authored_by: Some(ada.id),
            },
        )
        .expect("create ticket");
        (conn, ticket)
    }

    #[test]
    fn get_current_reports_missing_ticket() {
        let conn = open_in_memory().expect("open db");
        let err = conn.get_current(TicketId(99)).expect_err("ticket is missing");
        assert!(matches!(
            err,
            TrailError::NotFound {
                kind: RefKind::Ticket,
                id: 99
            }
        ));
    }

    #[test]
    fn apply_leaves_unsupplied_relations_alone() {
        let (conn, ticket) = seeded();
        let bug = query::create_label(&conn, "bug", "", "#ff0000").expect("label");

        let with_label = TicketUpdate::from_ticket(&ticket).labels([bug.id]);
        conn.apply(ticket.id, &with_label).expect("apply labels");
        let retitled = TicketUpdate::from_ticket(&ticket).title("Crash on save (macOS)");
        conn.apply(ticket.id, &retitled).expect("apply title");

        let current = conn.get_current(ticket.id).expect("reload");
        assert_eq!(current.title, "Crash on save (macOS)");
        assert_eq!(current.labels, [bug.id].into_iter().collect());

        let cleared = TicketUpdate::from_ticket(&current).labels(std::iter::empty());
        conn.apply(ticket.id, &cleared).expect("clear labels");
        assert!(conn.get_current(ticket.id).expect("reload").labels.is_empty());
    }

    #[test]
    fn records_come_back_in_time_then_id_order() {
        let (conn, ticket) = seeded();
        let at = DateTime::<Utc>::from_timestamp_micros(1_000).expect("valid timestamp");
        for text in ["second", "first"] {
            let _ = conn
                .append(NewRecord {
                    ticket_id: ticket.id,
                    authored_by: None,
                    authored_on: at,
                    payload: Payload::Comment(text.into()),
                })
                .expect("append");
        }
        let earlier = DateTime::<Utc>::from_timestamp_micros(500).expect("valid timestamp");
        let _ = conn
            .append(NewRecord {
                ticket_id: ticket.id,
                authored_by: None,
                authored_on: earlier,
                payload: Payload::Comment("zeroth".into()),
            })
            .expect("append");

        let records = conn.list_for(ticket.id).expect("list");
        let texts: Vec<_> = records
            .iter()
            .map(|r| match &r.payload {
                Payload::Comment(text) => text.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(texts, ["zeroth", "second", "first"]);
        assert_eq!(conn.latest_authored_on(ticket.id).expect("latest"), Some(at));
    }

    #[test]
    fn resolve_omits_missing_rows() {
        let (conn, ticket) = seeded();
        let ids: BTreeSet<i64> = [ticket.id.get(), 404].into_iter().collect();
        let found = conn.resolve(RefKind::Ticket, &ids).expect("resolve");
        assert_eq!(found.len(), 1);
        assert_eq!(found[&ticket.id.get()].to_string(), "#1 Crash on save");

        let users = conn
            .resolve(RefKind::User, &[1, 2].into_iter().collect())
            .expect("resolve users");
        assert_eq!(users.keys().copied().collect::<Vec<_>>(), [1]);
    }

    #[test]
    fn resolve_handles_more_ids_than_one_chunk() {
        let (conn, _) = seeded();
        for n in 0..3 {
            query::create_label(&conn, &format!("l{n}"), "", "#ffffff").expect("label");
        }
        let ids: BTreeSet<i64> = (1..=1_200).collect();
        let found = conn.resolve(RefKind::Label, &ids).expect("resolve");
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn load_history_reads_one_snapshot() {
        let (conn, ticket) = seeded();
        let history = load_history(&conn, ticket.id).expect("history");
        assert_eq!(history.ticket().id, ticket.id);
        assert_eq!(history.events().count(), 0);
        assert_eq!(
            history
                .opening_event()
                .authored_by
                .map(|user| user.username),
            Some("ada".to_string())
        );
    }
}

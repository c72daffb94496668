//! Users, labels, and ticket creation and listing.
//!
//! Tracked ticket fields are never written here; updates go through the
//! change recorder so every mutation leaves a history record.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::BTreeSet;

use super::store::{to_micros, truncate_micros};
use crate::error::TrailError;
use crate::history::RefKind;
use crate::history::store::TicketStore;
use crate::model::label::MAX_LABEL_NAME_LEN;
use crate::model::ticket::MAX_TITLE_LEN;
use crate::model::{Label, LabelId, NewTicket, Ticket, TicketId, TicketSummary, User, UserId};

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Map a `(user_id, username)` row.
pub(crate) fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
    })
}

/// Map a `(label_id, name, description, color)` row.
pub(crate) fn row_to_label(row: &Row<'_>) -> rusqlite::Result<Label> {
    Ok(Label {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        color: row.get(3)?,
    })
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Create a user with a unique, non-blank username.
///
/// # Errors
///
/// [`TrailError::Validation`] for a blank or taken username, or a store
/// failure.
pub fn create_user(conn: &Connection, username: &str) -> Result<User, TrailError> {
    let username = username.trim();
    if username.is_empty() || username.chars().any(char::is_whitespace) {
        return Err(TrailError::invalid(
            "username",
            "must be non-empty and contain no whitespace",
        ));
    }
    if find_user_by_name(conn, username)?.is_some() {
        return Err(TrailError::invalid(
            "username",
            format!("'{username}' is already taken"),
        ));
    }

    conn.execute(
        "INSERT INTO users (username, created_at_us) VALUES (?1, ?2)",
        params![username, to_micros(Utc::now())],
    )?;
    let user = User {
        id: UserId(conn.last_insert_rowid()),
        username: username.to_string(),
    };
    tracing::debug!(user = %user.id, username = %user.username, "created user");
    Ok(user)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn get_user(conn: &Connection, id: UserId) -> Result<Option<User>, TrailError> {
    Ok(conn
        .query_row(
            "SELECT user_id, username FROM users WHERE user_id = ?1",
            [id],
            row_to_user,
        )
        .optional()?)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn find_user_by_name(conn: &Connection, username: &str) -> Result<Option<User>, TrailError> {
    Ok(conn
        .query_row(
            "SELECT user_id, username FROM users WHERE username = ?1",
            [username],
            row_to_user,
        )
        .optional()?)
}

/// All users ordered by username.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_users(conn: &Connection) -> Result<Vec<User>, TrailError> {
    let mut stmt = conn.prepare("SELECT user_id, username FROM users ORDER BY username")?;
    let rows = stmt.query_map([], row_to_user)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Delete a user. Tickets they authored or were assigned to, and records
/// they authored, lose the reference; history keeps the raw id.
///
/// # Errors
///
/// [`TrailError::NotFound`] if no such user exists, or a store failure.
pub fn delete_user(conn: &Connection, id: UserId) -> Result<(), TrailError> {
    let removed = conn.execute("DELETE FROM users WHERE user_id = ?1", [id])?;
    if removed == 0 {
        return Err(TrailError::NotFound {
            kind: RefKind::User,
            id: id.get(),
        });
    }
    tracing::info!(user = %id, "deleted user");
    Ok(())
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Create a label. `color` is stored verbatim.
///
/// # Errors
///
/// [`TrailError::Validation`] for a blank, overlong, or taken name, or a
/// store failure.
pub fn create_label(
    conn: &Connection,
    name: &str,
    description: &str,
    color: &str,
) -> Result<Label, TrailError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TrailError::invalid("name", "must not be empty"));
    }
    if name.chars().count() > MAX_LABEL_NAME_LEN {
        return Err(TrailError::invalid(
            "name",
            format!("exceeds the maximum of {MAX_LABEL_NAME_LEN} characters"),
        ));
    }
    if find_label_by_name(conn, name)?.is_some() {
        return Err(TrailError::invalid(
            "name",
            format!("label '{name}' already exists"),
        ));
    }

    conn.execute(
        "INSERT INTO labels (name, description, color) VALUES (?1, ?2, ?3)",
        params![name, description, color],
    )?;
    let label = Label {
        id: LabelId(conn.last_insert_rowid()),
        name: name.to_string(),
        description: description.to_string(),
        color: color.to_string(),
    };
    tracing::debug!(label = %label.id, name = %label.name, "created label");
    Ok(label)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn find_label_by_name(conn: &Connection, name: &str) -> Result<Option<Label>, TrailError> {
    Ok(conn
        .query_row(
            "SELECT label_id, name, description, color FROM labels WHERE name = ?1",
            [name],
            row_to_label,
        )
        .optional()?)
}

/// All labels ordered by name.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_labels(conn: &Connection) -> Result<Vec<Label>, TrailError> {
    let mut stmt =
        conn.prepare("SELECT label_id, name, description, color FROM labels ORDER BY name")?;
    let rows = stmt.query_map([], row_to_label)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Delete a label and detach it from every ticket. History that mentions it
/// keeps the raw id, which no longer resolves.
///
/// # Errors
///
/// [`TrailError::NotFound`] if no such label exists, or a store failure.
pub fn delete_label(conn: &Connection, id: LabelId) -> Result<(), TrailError> {
    let removed = conn.execute("DELETE FROM labels WHERE label_id = ?1", [id])?;
    if removed == 0 {
        return Err(TrailError::NotFound {
            kind: RefKind::Label,
            id: id.get(),
        });
    }
    tracing::info!(label = %id, "deleted label");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

/// Filter for [`list_tickets`]. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TicketFilter {
    /// Only open (`Some(true)`) or closed (`Some(false)`) tickets.
    pub open: Option<bool>,
    pub limit: Option<u32>,
}

/// Create a ticket. It starts open, unlocked, unassigned, with no relations.
/// Creation is not a change record; the description is shown as the
/// opening entry of the ticket's log instead.
///
/// # Errors
///
/// [`TrailError::Validation`] for a bad title, [`TrailError::NotFound`] for
/// a missing author, or a store failure.
pub fn create_ticket(conn: &Connection, new: &NewTicket) -> Result<Ticket, TrailError> {
    if new.title.trim().is_empty() {
        return Err(TrailError::invalid("title", "must not be empty"));
    }
    if new.title.chars().count() > MAX_TITLE_LEN {
        return Err(TrailError::invalid(
            "title",
            format!("exceeds the maximum of {MAX_TITLE_LEN} characters"),
        ));
    }
    if let Some(author) = new.authored_by {
        if get_user(conn, author)?.is_none() {
            return Err(TrailError::NotFound {
                kind: RefKind::User,
                id: author.get(),
            });
        }
    }

    let created_on = truncate_micros(Utc::now());
    conn.execute(
        "INSERT INTO tickets (title, description, authored_by, created_at_us)
         VALUES (?1, ?2, ?3, ?4)",
        params![new.title, new.description, new.authored_by, to_micros(created_on)],
    )?;
    let ticket = Ticket {
        id: TicketId(conn.last_insert_rowid()),
        title: new.title.clone(),
        description: new.description.clone(),
        authored_by: new.authored_by,
        created_on,
        open: true,
        locked: false,
        assignee: None,
        dupe_of: None,
        blocked_by: BTreeSet::new(),
        labels: BTreeSet::new(),
    };
    tracing::debug!(ticket = %ticket.id, "created ticket");
    Ok(ticket)
}

/// Present state of a ticket, or `None` if it does not exist.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_ticket(conn: &Connection, id: TicketId) -> Result<Option<Ticket>, TrailError> {
    match conn.get_current(id) {
        Ok(ticket) => Ok(Some(ticket)),
        Err(TrailError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Tickets matching `filter`, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_tickets(conn: &Connection, filter: &TicketFilter) -> Result<Vec<TicketSummary>, TrailError> {
    let where_clause = match filter.open {
        Some(true) => " WHERE is_open = 1",
        Some(false) => " WHERE is_open = 0",
        None => "",
    };
    let limit_clause = filter
        .limit
        .map_or_else(String::new, |limit| format!(" LIMIT {limit}"));
    let sql = format!(
        "SELECT ticket_id, title, is_open FROM tickets{where_clause} \
         ORDER BY created_at_us DESC, ticket_id DESC{limit_clause}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(TicketSummary {
            id: row.get(0)?,
            title: row.get(1)?,
            open: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Tickets whose `blocked_by` set contains `id`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_blocking(conn: &Connection, id: TicketId) -> Result<Vec<TicketSummary>, TrailError> {
    let mut stmt = conn.prepare(
        "SELECT t.ticket_id, t.title, t.is_open
         FROM ticket_blocked_by b
         INNER JOIN tickets t ON t.ticket_id = b.ticket_id
         WHERE b.blocker_id = ?1
         ORDER BY t.ticket_id",
    )?;
    let rows = stmt.query_map([id], |row| {
        Ok(TicketSummary {
            id: row.get(0)?,
            title: row.get(1)?,
            open: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::model::TicketUpdate;

    fn new_ticket(title: &str, author: Option<UserId>) -> NewTicket {
        NewTicket {
            title: title.into(),
            description: String::new(),
            authored_by: author,
        }
    }

    #[test]
    fn usernames_are_unique_and_trimmed() {
        let conn = open_in_memory().expect("open db");
        let ada = create_user(&conn, "  ada ").expect("create");
        assert_eq!(ada.username, "ada");
        assert!(matches!(
            create_user(&conn, "ada"),
            Err(TrailError::Validation { field: "username", .. })
        ));
        assert!(create_user(&conn, "two words").is_err());
        assert_eq!(find_user_by_name(&conn, "ada").expect("find"), Some(ada));
    }

    #[test]
    fn deleting_a_user_clears_assignments() {
        let conn = open_in_memory().expect("open db");
        let ada = create_user(&conn, "ada").expect("create");
        let ticket = create_ticket(&conn, &new_ticket("Leak", Some(ada.id))).expect("ticket");
        conn.apply(ticket.id, &TicketUpdate::from_ticket(&ticket).assignee(Some(ada.id)))
            .expect("assign");

        delete_user(&conn, ada.id).expect("delete");
        let reloaded = get_ticket(&conn, ticket.id).expect("get").expect("exists");
        assert_eq!(reloaded.assignee, None);
        assert_eq!(reloaded.authored_by, None);
        assert!(matches!(
            delete_user(&conn, ada.id),
            Err(TrailError::NotFound { kind: RefKind::User, .. })
        ));
    }

    #[test]
    fn deleting_a_label_detaches_it_everywhere() {
        let conn = open_in_memory().expect("open db");
        let bug = create_label(&conn, "bug", "Something broke", "#d73a4a").expect("label");
        let ui = create_label(&conn, "ui", "", "#ffffff").expect("label");
        let ticket = create_ticket(&conn, &new_ticket("Leak", None)).expect("ticket");
        conn.apply(ticket.id, &TicketUpdate::from_ticket(&ticket).labels([bug.id, ui.id]))
            .expect("label");

        delete_label(&conn, bug.id).expect("delete");
        let reloaded = get_ticket(&conn, ticket.id).expect("get").expect("exists");
        assert_eq!(reloaded.labels, [ui.id].into_iter().collect());
        assert_eq!(
            list_labels(&conn).expect("list").iter().map(|l| l.name.as_str()).collect::<Vec<_>>(),
            ["ui"]
        );
    }

    #[test]
    fn label_names_are_validated() {
        let conn = open_in_memory().expect("open db");
        assert!(create_label(&conn, " ", "", "#fff").is_err());
        assert!(create_label(&conn, &"x".repeat(MAX_LABEL_NAME_LEN + 1), "", "#fff").is_err());
        create_label(&conn, "bug", "", "not-a-color").expect("color is stored verbatim");
        assert!(create_label(&conn, "bug", "", "#fff").is_err());
    }

    #[test]
    fn new_tickets_start_open_and_unrelated() {
        let conn = open_in_memory().expect("open db");
        let ticket = create_ticket(&conn, &new_ticket("Leak", None)).expect("ticket");
        assert!(ticket.open);
        assert!(!ticket.locked);
        assert_eq!(get_ticket(&conn, ticket.id).expect("get"), Some(ticket));
        assert_eq!(get_ticket(&conn, TicketId(42)).expect("get"), None);
    }

    #[test]
    fn create_ticket_rejects_unknown_author_and_blank_title() {
        let conn = open_in_memory().expect("open db");
        assert!(matches!(
            create_ticket(&conn, &new_ticket("Leak", Some(UserId(5)))),
            Err(TrailError::NotFound { kind: RefKind::User, id: 5 })
        ));
        assert!(create_ticket(&conn, &new_ticket("  ", None)).is_err());
    }

    #[test]
    fn list_filters_by_state_and_limits() {
        let conn = open_in_memory().expect("open db");
        let first = create_ticket(&conn, &new_ticket("first", None)).expect("ticket");
        let second = create_ticket(&conn, &new_ticket("second", None)).expect("ticket");
        let third = create_ticket(&conn, &new_ticket("third", None)).expect("ticket");
        conn.apply(second.id, &TicketUpdate::from_ticket(&second).open(false))
            .expect("close");

        let all = list_tickets(&conn, &TicketFilter::default()).expect("list");
        assert_eq!(
            all.iter().map(|t| t.id).collect::<Vec<_>>(),
            [third.id, second.id, first.id]
        );

        let open = list_tickets(
            &conn,
            &TicketFilter {
                open: Some(true),
                limit: Some(1),
            },
        )
        .expect("list");
        assert_eq!(open.iter().map(|t| t.id).collect::<Vec<_>>(), [third.id]);

        let closed = list_tickets(
            &conn,
            &TicketFilter {
                open: Some(false),
                limit: None,
            },
        )
        .expect("list");
        assert_eq!(closed.iter().map(|t| t.id).collect::<Vec<_>>(), [second.id]);
    }

    #[test]
    fn blocking_lists_reverse_relation() {
        let conn = open_in_memory().expect("open db");
        let root = create_ticket(&conn, &new_ticket("root", None)).expect("ticket");
        let child = create_ticket(&conn, &new_ticket("child", None)).expect("ticket");
        conn.apply(child.id, &TicketUpdate::from_ticket(&child).blocked_by([root.id]))
            .expect("block");
        let blocking = list_blocking(&conn, root.id).expect("list");
        assert_eq!(blocking, vec![child.summary()]);
    }
}

//! `bt show` — display the present state of a single ticket.

use crate::cmd::Context;
use crate::output::{local_time, pretty_kv, pretty_rule, pretty_section, render_mode};
use bugtrail_core::db::{query, store::load_history};
use bugtrail_core::history::{LogOrder, comment_count};
use bugtrail_core::model::{Ticket, TicketId, TicketSummary, UserId};
use chrono::{DateTime, Utc};
use clap::Args;
use rusqlite::Connection;
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Ticket number, e.g. 12 or #12.
    pub id: String,
}

/// Full ticket detail as returned in JSON output.
#[derive(Debug, Serialize)]
pub struct ShowTicket {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub open: bool,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dupe_of: Option<TicketSummary>,
    pub labels: Vec<String>,
    /// Tickets blocking this one.
    pub blocked_by: Vec<TicketSummary>,
    /// Tickets this one blocks.
    pub blocks: Vec<TicketSummary>,
    pub comments: usize,
    pub created_on: DateTime<Utc>,
}

fn username(conn: &Connection, id: Option<UserId>) -> anyhow::Result<Option<String>> {
    let Some(id) = id else {
        return Ok(None);
    };
    Ok(query::get_user(conn, id)?.map(|user| user.username))
}

fn summaries(
    conn: &Connection,
    ids: impl IntoIterator<Item = TicketId>,
) -> anyhow::Result<Vec<TicketSummary>> {
    let mut out = Vec::new();
    for id in ids {
        if let Some(ticket) = query::get_ticket(conn, id)? {
            out.push(ticket.summary());
        }
    }
    Ok(out)
}

fn detail(conn: &Connection, ticket: Ticket) -> anyhow::Result<ShowTicket> {
    let labels = query::list_labels(conn)?
        .into_iter()
        .filter(|label| ticket.labels.contains(&label.id))
        .map(|label| label.name)
        .collect();
    let history = load_history(conn, ticket.id)?;
    let comments = comment_count(&history.to_vec(LogOrder::NewestFirst));

    Ok(ShowTicket {
        id: ticket.id.get(),
        author: username(conn, ticket.authored_by)?,
        assignee: username(conn, ticket.assignee)?,
        dupe_of: summaries(conn, ticket.dupe_of)?.pop(),
        blocked_by: summaries(conn, ticket.blocked_by.iter().copied())?,
        blocks: query::list_blocking(conn, ticket.id)?,
        labels,
        comments,
        created_on: ticket.created_on,
        title: ticket.title,
        description: ticket.description,
        open: ticket.open,
        locked: ticket.locked,
    })
}

fn joined(tickets: &[TicketSummary]) -> String {
    tickets
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Execute `bt show <id>`.
///
/// # Errors
///
/// Returns an error if the ticket does not exist or a query fails.
pub fn run_show(args: &ShowArgs, ctx: &Context) -> anyhow::Result<()> {
    let conn = ctx.open_store()?;
    let ticket = ctx.ticket(&conn, &args.id)?;
    let detail = detail(&conn, ticket)?;

    render_mode(
        ctx.output,
        &detail,
        render_show_text,
        render_show_human,
    )
}

fn state(t: &ShowTicket) -> &'static str {
    match (t.open, t.locked) {
        (true, false) => "open",
        (true, true) => "open, locked",
        (false, false) => "closed",
        (false, true) => "closed, locked",
    }
}

fn render_show_human(t: &ShowTicket, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Ticket #{}", t.id))?;
    writeln!(w, "{}", t.title)?;
    pretty_rule(w)?;
    pretty_kv(w, "state", state(t))?;
    pretty_kv(w, "created", local_time(t.created_on))?;
    if let Some(ref author) = t.author {
        pretty_kv(w, "author", author)?;
    }
    if let Some(ref assignee) = t.assignee {
        pretty_kv(w, "assignee", assignee)?;
    }
    if let Some(ref dupe) = t.dupe_of {
        pretty_kv(w, "duplicate", dupe.to_string())?;
    }
    if !t.labels.is_empty() {
        pretty_kv(w, "labels", t.labels.join(", "))?;
    }
    if !t.blocked_by.is_empty() {
        pretty_kv(w, "blocked_by", joined(&t.blocked_by))?;
    }
    if !t.blocks.is_empty() {
        pretty_kv(w, "blocks", joined(&t.blocks))?;
    }
    pretty_kv(w, "comments", t.comments.to_string())?;

    if !t.description.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Description")?;
        for line in t.description.lines() {
            writeln!(w, "{line}")?;
        }
    }
    Ok(())
}

fn render_show_text(t: &ShowTicket, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "id:          {}", t.id)?;
    writeln!(w, "title:       {}", t.title)?;
    writeln!(w, "state:       {}", state(t))?;
    if let Some(ref author) = t.author {
        writeln!(w, "author:      {author}")?;
    }
    if let Some(ref assignee) = t.assignee {
        writeln!(w, "assignee:    {assignee}")?;
    }
    if let Some(ref dupe) = t.dupe_of {
        writeln!(w, "dupe_of:     {}", dupe.id)?;
    }
    if !t.labels.is_empty() {
        writeln!(w, "labels:      {}", t.labels.join(", "))?;
    }
    let ids = |tickets: &[TicketSummary]| {
        tickets
            .iter()
            .map(|s| s.id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    if !t.blocked_by.is_empty() {
        writeln!(w, "blocked_by:  {}", ids(&t.blocked_by))?;
    }
    if !t.blocks.is_empty() {
        writeln!(w, "blocks:      {}", ids(&t.blocks))?;
    }
    writeln!(w, "comments:    {}", t.comments)?;
    Ok(())
}

//! `bt comment` — append a comment to a ticket's history.

use crate::cmd::Context;
use crate::output::render;
use crate::validate;
use bugtrail_core::history::comment_anchor;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug)]
pub struct CommentArgs {
    /// Ticket number, e.g. 12 or #12.
    pub id: String,

    /// Comment body.
    pub body: String,
}

#[derive(Debug, Serialize)]
struct CommentOutput {
    ok: bool,
    ticket: i64,
    /// Anchor of the new entry in `bt log`.
    anchor: String,
    author: String,
    authored_on: DateTime<Utc>,
}

/// Execute `bt comment <id> <body>`.
///
/// # Errors
///
/// Returns an error if the body is invalid, the ticket or author does not
/// exist, or the write conflicts past the retry budget.
pub fn run_comment(args: &CommentArgs, ctx: &Context) -> anyhow::Result<()> {
    validate::validate_comment(&args.body).map_err(|err| ctx.invalid(&err))?;

    let conn = ctx.open_store()?;
    let author = ctx.require_author(&conn)?;
    let ticket = ctx.ticket(&conn, &args.id)?;

    let record = ctx
        .recorder(&conn)
        .record_comment(ticket.id, &args.body, Some(author.id))
        .map_err(|err| ctx.trail(&err))?;

    let out = CommentOutput {
        ok: true,
        ticket: ticket.id.get(),
        anchor: comment_anchor(record.id),
        author: author.username,
        authored_on: record.authored_on,
    };
    render(ctx.output, &out, |o, w| {
        writeln!(w, "✓ commented on #{} ({})", o.ticket, o.anchor)
    })
}

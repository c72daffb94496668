use crate::cmd::Context;
use crate::output::render;
use crate::validate;
use bugtrail_core::db::query;
use bugtrail_core::model::NewTicket;
use clap::Args;
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Ticket title.
    #[arg(short, long)]
    pub title: String,

    /// Opening description, shown as the first entry of the ticket's log.
    #[arg(short, long, default_value = "")]
    pub description: String,
}

#[derive(Debug, Serialize)]
struct CreateOutput {
    ok: bool,
    id: i64,
    title: String,
    author: String,
}

/// Execute `bt create`.
///
/// # Errors
///
/// Returns an error if validation fails, the author is unknown, or the store
/// rejects the ticket.
pub fn run_create(args: &CreateArgs, ctx: &Context) -> anyhow::Result<()> {
    validate::validate_title(&args.title).map_err(|err| ctx.invalid(&err))?;

    let conn = ctx.open_store()?;
    let author = ctx.require_author(&conn)?;
    let ticket = query::create_ticket(
        &conn,
        &NewTicket {
            title: args.title.clone(),
            description: args.description.clone(),
            authored_by: Some(author.id),
        },
    )
    .map_err(|err| ctx.trail(&err))?;

    let out = CreateOutput {
        ok: true,
        id: ticket.id.get(),
        title: ticket.title,
        author: author.username,
    };
    render(ctx.output, &out, |o, w| {
        writeln!(w, "✓ created #{}: {}", o.id, o.title)
    })
}

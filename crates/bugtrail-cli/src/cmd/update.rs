//! `bt update` — change any subset of a ticket's tracked fields.
//!
//! Flags only name what changes; everything else is carried over from the
//! ticket as read inside the write transaction. Relations are replaced
//! wholesale when given: `--label a --label b` sets exactly {a, b},
//! `--clear-labels` sets {}.

use crate::cmd::Context;
use crate::output::{CliError, render};
use crate::validate;
use bugtrail_core::history::{FieldValue, Payload};
use bugtrail_core::model::{LabelId, Ticket, TicketId, TicketUpdate, UserId};
use clap::Args;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Ticket number, e.g. 12 or #12.
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Reopen the ticket.
    #[arg(long, conflicts_with = "close")]
    pub reopen: bool,

    #[arg(long)]
    pub close: bool,

    #[arg(long, conflicts_with = "unlock")]
    pub lock: bool,

    #[arg(long)]
    pub unlock: bool,

    /// Assign to this user.
    #[arg(long, value_name = "USER", conflicts_with = "unassign")]
    pub assign: Option<String>,

    #[arg(long)]
    pub unassign: bool,

    /// Mark as a duplicate of another ticket.
    #[arg(long, value_name = "TICKET", conflicts_with = "not_dupe")]
    pub dupe_of: Option<String>,

    #[arg(long)]
    pub not_dupe: bool,

    /// Replace the label set (repeatable).
    #[arg(long = "label", value_name = "NAME", conflicts_with = "clear_labels")]
    pub labels: Vec<String>,

    #[arg(long)]
    pub clear_labels: bool,

    /// Replace the set of blocking tickets (repeatable).
    #[arg(long = "blocked-by", value_name = "TICKET", conflicts_with = "clear_blocked_by")]
    pub blocked_by: Vec<String>,

    #[arg(long)]
    pub clear_blocked_by: bool,
}

impl UpdateArgs {
    fn requests_anything(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.reopen
            || self.close
            || self.lock
            || self.unlock
            || self.assign.is_some()
            || self.unassign
            || self.dupe_of.is_some()
            || self.not_dupe
            || !self.labels.is_empty()
            || self.clear_labels
            || !self.blocked_by.is_empty()
            || self.clear_blocked_by
    }
}

#[derive(Debug, Serialize)]
struct UpdateOutput {
    ok: bool,
    id: i64,
    record_id: i64,
    /// Changed fields and the values they held before this update.
    previous: BTreeMap<&'static str, serde_json::Value>,
}

/// A single-reference edit: left alone, or set (possibly to nothing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefEdit<T> {
    Keep,
    Set(Option<T>),
}

impl<T> Default for RefEdit<T> {
    fn default() -> Self {
        Self::Keep
    }
}

/// Requested edits with every name already resolved to an id. Applied to
/// whatever the ticket looks like inside the write transaction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Edits {
    title: Option<String>,
    description: Option<String>,
    open: Option<bool>,
    locked: Option<bool>,
    assignee: RefEdit<UserId>,
    dupe_of: RefEdit<TicketId>,
    labels: Option<Vec<LabelId>>,
    blocked_by: Option<Vec<TicketId>>,
}

impl Edits {
    fn resolve(ctx: &Context, conn: &Connection, args: &UpdateArgs) -> anyhow::Result<Self> {
        let mut edits = Self::default();
        if let Some(title) = &args.title {
            validate::validate_title(title).map_err(|err| ctx.invalid(&err))?;
            edits.title = Some(title.clone());
        }
        edits.description.clone_from(&args.description);
        if args.reopen || args.close {
            edits.open = Some(args.reopen);
        }
        if args.lock || args.unlock {
            edits.locked = Some(args.lock);
        }
        if let Some(name) = &args.assign {
            edits.assignee = RefEdit::Set(Some(ctx.user_named(conn, name)?.id));
        } else if args.unassign {
            edits.assignee = RefEdit::Set(None);
        }
        if let Some(raw) = &args.dupe_of {
            edits.dupe_of = RefEdit::Set(Some(ctx.ticket(conn, raw)?.id));
        } else if args.not_dupe {
            edits.dupe_of = RefEdit::Set(None);
        }
        if args.clear_labels || !args.labels.is_empty() {
            let mut ids = Vec::with_capacity(args.labels.len());
            for name in &args.labels {
                ids.push(ctx.label_named(conn, name)?.id);
            }
            edits.labels = Some(ids);
        }
        if args.clear_blocked_by || !args.blocked_by.is_empty() {
            let mut ids = Vec::with_capacity(args.blocked_by.len());
            for raw in &args.blocked_by {
                ids.push(ctx.ticket(conn, raw)?.id);
            }
            edits.blocked_by = Some(ids);
        }
        Ok(edits)
    }

    /// `current` with only the requested fields replaced.
    fn apply_to(&self, current: &Ticket) -> TicketUpdate {
        let mut update = TicketUpdate::from_ticket(current);
        if let Some(title) = &self.title {
            update = update.title(title.clone());
        }
        if let Some(description) = &self.description {
            update = update.description(description.clone());
        }
        if let Some(open) = self.open {
            update = update.open(open);
        }
        if let Some(locked) = self.locked {
            update = update.locked(locked);
        }
        if let RefEdit::Set(assignee) = self.assignee {
            update = update.assignee(assignee);
        }
        if let RefEdit::Set(dupe_of) = self.dupe_of {
            update = update.dupe_of(dupe_of);
        }
        if let Some(labels) = &self.labels {
            update = update.labels(labels.iter().copied());
        }
        if let Some(blocked_by) = &self.blocked_by {
            update = update.blocked_by(blocked_by.iter().copied());
        }
        update
    }
}

/// Execute `bt update`.
///
/// # Errors
///
/// Returns an error if nothing is requested, a referenced row does not exist,
/// validation fails, or the write conflicts past the retry budget.
pub fn run_update(args: &UpdateArgs, ctx: &Context) -> anyhow::Result<()> {
    if !args.requests_anything() {
        return Err(ctx.fail(CliError::with_details(
            "nothing to update",
            "pass at least one field flag; see `bt update --help`",
            "empty_update",
        )));
    }

    let conn = ctx.open_store()?;
    let author = ctx.require_author(&conn)?;
    let target = ctx.ticket(&conn, &args.id)?.id;
    let edits = Edits::resolve(ctx, &conn, args)?;

    let record = ctx
        .recorder(&conn)
        .record_change_with(target, |current| edits.apply_to(current), Some(author.id))
        .map_err(|err| ctx.trail(&err))?;

    let previous = match &record.payload {
        Payload::Diff(diff) => diff
            .iter()
            .map(|(field, old)| (field.name(), FieldValue::to_json(old)))
            .collect(),
        Payload::Comment(_) | Payload::Unreadable { .. } => BTreeMap::new(),
    };
    let out = UpdateOutput {
        ok: true,
        id: target.get(),
        record_id: record.id.get(),
        previous,
    };
    render(ctx.output, &out, |o, w| {
        if o.previous.is_empty() {
            writeln!(w, "no changes to #{}", o.id)
        } else {
            let fields: Vec<_> = o.previous.keys().copied().collect();
            writeln!(w, "✓ updated #{}: {}", o.id, fields.join(", "))
        }
    })
}

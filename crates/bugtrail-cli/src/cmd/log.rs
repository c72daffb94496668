//! `bt log` — a ticket's reconstructed history.
//!
//! The opening entry (the ticket description) is always the oldest entry;
//! change and comment events follow from the stored reverse diffs.

use crate::cmd::Context;
use crate::output::{local_time, pretty_section, render_mode};
use bugtrail_core::db::store::load_history;
use bugtrail_core::history::{Event, EventValue, LogOrder};
use bugtrail_core::model::TicketSummary;
use clap::Args;
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Ticket number, e.g. 12 or #12.
    pub id: String,

    /// Oldest entry first.
    #[arg(long, conflicts_with = "newest_first")]
    pub chronological: bool,

    /// Newest entry first.
    #[arg(long)]
    pub newest_first: bool,

    /// Keep only this many entries, counted from the newest.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

impl LogArgs {
    /// Flags win; otherwise the project's `[log] chronological` setting.
    const fn order(&self, chronological_default: bool) -> LogOrder {
        if self.chronological || (chronological_default && !self.newest_first) {
            LogOrder::Chronological
        } else {
            LogOrder::NewestFirst
        }
    }
}

#[derive(Debug, Serialize)]
struct LogOutput {
    ticket: TicketSummary,
    events: Vec<Event>,
}

/// Opening entry included, newest-first before ordering is applied.
fn timeline(newest_first: Vec<Event>, opening: Event, order: LogOrder, limit: Option<usize>) -> Vec<Event> {
    let mut events = newest_first;
    events.push(opening);
    if let Some(limit) = limit {
        events.truncate(limit);
    }
    if order == LogOrder::Chronological {
        events.reverse();
    }
    events
}

fn describe(event: &Event) -> String {
    if event.is_comment() {
        return event
            .new_value
            .as_ref()
            .map_or_else(String::new, ToString::to_string);
    }
    match (&event.old_value, &event.new_value) {
        (None, Some(added @ EventValue::Refs(_))) => format!("{} +{added}", event.field),
        (Some(removed @ EventValue::Refs(_)), None) => format!("{} -{removed}", event.field),
        (old, new) => format!("{}: {} → {}", event.field, shown(old.as_ref()), shown(new.as_ref())),
    }
}

fn shown(value: Option<&EventValue>) -> String {
    value.map_or_else(|| "(none)".to_string(), ToString::to_string)
}

fn author(event: &Event) -> String {
    event
        .authored_by
        .as_ref()
        .map_or_else(|| "(unknown)".to_string(), |user| user.username.clone())
}

/// Execute `bt log <id>`.
///
/// # Errors
///
/// Returns an error if the ticket does not exist or the history cannot be
/// read.
pub fn run_log(args: &LogArgs, ctx: &Context) -> anyhow::Result<()> {
    let conn = ctx.open_store()?;
    let ticket = ctx.ticket(&conn, &args.id)?;
    let history = load_history(&conn, ticket.id).map_err(|err| ctx.trail(&err))?;

    let order = args.order(ctx.config.project.log.chronological);
    let out = LogOutput {
        ticket: history.ticket().summary(),
        events: timeline(
            history.to_vec(LogOrder::NewestFirst),
            history.opening_event(),
            order,
            args.limit,
        ),
    };

    render_mode(
        ctx.output,
        &out,
        |log, w| {
            for event in &log.events {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}",
                    event.id,
                    event.authored_on.to_rfc3339(),
                    author(event),
                    describe(event)
                )?;
            }
            Ok(())
        },
        |log, w| {
            pretty_section(w, &format!("History of {}", log.ticket))?;
            for event in &log.events {
                let verb = if event.is_comment() { "commented" } else { "changed" };
                writeln!(
                    w,
                    "[{}] {} {verb}: {}",
                    local_time(event.authored_on),
                    author(event),
                    describe(event)
                )?;
            }
            Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bugtrail_core::history::{DisplayObject, EventField, Field};
    use bugtrail_core::model::{Label, LabelId, RecordId};
    use chrono::{DateTime, Utc};
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: LogArgs,
    }

    fn event(id: &str, field: EventField, old: Option<EventValue>, new: Option<EventValue>) -> Event {
        Event {
            id: id.to_string(),
            record_id: Some(RecordId(1)),
            authored_by: None,
            authored_on: DateTime::<Utc>::UNIX_EPOCH,
            field,
            old_value: old,
            new_value: new,
        }
    }

    #[test]
    fn order_follows_flags_then_config() {
        let w = Wrapper::parse_from(["test", "1"]);
        assert_eq!(w.args.order(true), LogOrder::Chronological);
        assert_eq!(w.args.order(false), LogOrder::NewestFirst);

        let w = Wrapper::parse_from(["test", "1", "--newest-first"]);
        assert_eq!(w.args.order(true), LogOrder::NewestFirst);

        let w = Wrapper::parse_from(["test", "1", "--chronological"]);
        assert_eq!(w.args.order(false), LogOrder::Chronological);
    }

    #[test]
    fn limit_keeps_newest_entries_in_either_order() {
        let comment = |id: &str| event(id, EventField::Comment, None, Some(EventValue::Text(id.into())));
        let newest_first = vec![comment("c3"), comment("c2"), comment("c1")];
        let ids = |events: Vec<Event>| events.into_iter().map(|e| e.id).collect::<Vec<_>>();

        let all = timeline(newest_first.clone(), comment("open"), LogOrder::Chronological, None);
        assert_eq!(ids(all), ["open", "c1", "c2", "c3"]);

        let last_two = timeline(newest_first.clone(), comment("open"), LogOrder::Chronological, Some(2));
        assert_eq!(ids(last_two), ["c2", "c3"]);

        let newest = timeline(newest_first, comment("open"), LogOrder::NewestFirst, Some(2));
        assert_eq!(ids(newest), ["c3", "c2"]);
    }

    #[test]
    fn describes_each_event_shape() {
        let urgent = DisplayObject::Label(Label {
            id: LabelId(1),
            name: "urgent".into(),
            description: String::new(),
            color: "#ff0000".into(),
        });
        let added = event(
            "a",
            EventField::Change(Field::Labels),
            None,
            Some(EventValue::Refs(vec![urgent.clone()])),
        );
        assert_eq!(describe(&added), "labels +urgent");

        let removed = event(
            "r",
            EventField::Change(Field::Labels),
            Some(EventValue::Refs(vec![urgent])),
            None,
        );
        assert_eq!(describe(&removed), "labels -urgent");

        let title = event(
            "t",
            EventField::Change(Field::Title),
            Some(EventValue::Text("old".into())),
            Some(EventValue::Text("new".into())),
        );
        assert_eq!(describe(&title), "title: old → new");

        let unassigned = event("u", EventField::Change(Field::Assignee), None, None);
        assert_eq!(describe(&unassigned), "assignee: (none) → (none)");

        let note = event("c", EventField::Comment, None, Some(EventValue::Text("hi".into())));
        assert_eq!(describe(&note), "hi");
        assert_eq!(author(&note), "(unknown)");
    }
}

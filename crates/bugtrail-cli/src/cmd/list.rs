//! `bt list` — list tickets, newest first.

use crate::cmd::Context;
use crate::output::{pretty_section, render_mode};
use bugtrail_core::db::query::{self, TicketFilter};
use clap::Args;
use std::io::Write;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only closed tickets.
    #[arg(long, conflicts_with = "all")]
    pub closed: bool,

    /// Open and closed tickets.
    #[arg(long)]
    pub all: bool,

    /// Maximum tickets to show.
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: u32,
}

impl ListArgs {
    fn filter(&self) -> TicketFilter {
        let open = if self.all {
            None
        } else {
            Some(!self.closed)
        };
        TicketFilter {
            open,
            limit: Some(self.limit),
        }
    }
}

pub fn run_list(args: &ListArgs, ctx: &Context) -> anyhow::Result<()> {
    let conn = ctx.open_store()?;
    let tickets = query::list_tickets(&conn, &args.filter()).map_err(|err| ctx.trail(&err))?;

    render_mode(
        ctx.output,
        &tickets,
        |tickets, w| {
            for t in tickets {
                let state = if t.open { "open" } else { "closed" };
                writeln!(w, "{}\t{state}\t{}", t.id, t.title)?;
            }
            Ok(())
        },
        |tickets, w| {
            pretty_section(w, &format!("Tickets ({})", tickets.len()))?;
            if tickets.is_empty() {
                return writeln!(w, "(none)");
            }
            for t in tickets {
                let state = if t.open { "open" } else { "closed" };
                writeln!(w, "{:>6}  {state:<7} {}", format!("#{}", t.id), t.title)?;
            }
            Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ListArgs,
    }

    #[test]
    fn defaults_to_open_tickets() {
        let w = Wrapper::parse_from(["test"]);
        assert_eq!(
            w.args.filter(),
            TicketFilter {
                open: Some(true),
                limit: Some(50)
            }
        );
    }

    #[test]
    fn closed_and_all_filters() {
        let w = Wrapper::parse_from(["test", "--closed", "-n", "5"]);
        assert_eq!(w.args.filter().open, Some(false));
        assert_eq!(w.args.filter().limit, Some(5));

        let w = Wrapper::parse_from(["test", "--all"]);
        assert_eq!(w.args.filter().open, None);

        assert!(Wrapper::try_parse_from(["test", "--all", "--closed"]).is_err());
    }
}

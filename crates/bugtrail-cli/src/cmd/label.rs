//! `bt label` — manage the tags attached to tickets.

use crate::cmd::Context;
use crate::output::{pretty_section, render, render_mode};
use bugtrail_core::db::query;
use bugtrail_core::model::Label;
use bugtrail_core::model::label::DEFAULT_LABEL_COLOR;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug)]
pub struct LabelArgs {
    #[command(subcommand)]
    pub command: LabelCommand,
}

#[derive(Subcommand, Debug)]
pub enum LabelCommand {
    #[command(
        about = "Add a label",
        after_help = "EXAMPLES:\n    bt label add urgent --color '#ff0000' --description 'Drop everything'"
    )]
    Add {
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Stored verbatim.
        #[arg(short, long, default_value = DEFAULT_LABEL_COLOR)]
        color: String,
    },

    #[command(about = "List labels")]
    List,

    #[command(
        about = "Remove a label",
        long_about = "Remove a label from every ticket and delete it. History entries \
                      that only mention this label are hidden."
    )]
    Rm { name: String },
}

#[derive(Debug, Serialize)]
struct LabelRemoved {
    ok: bool,
    removed: Label,
}

pub fn run_label(args: &LabelArgs, ctx: &Context) -> anyhow::Result<()> {
    let conn = ctx.open_store()?;
    match &args.command {
        LabelCommand::Add {
            name,
            description,
            color,
        } => {
            let label = query::create_label(&conn, name, description, color)
                .map_err(|err| ctx.trail(&err))?;
            render(ctx.output, &label, |l, w| {
                writeln!(w, "✓ added label {} (#{})", l, l.id)
            })
        }
        LabelCommand::List => {
            let labels = query::list_labels(&conn).map_err(|err| ctx.trail(&err))?;
            render_mode(
                ctx.output,
                &labels,
                |labels, w| {
                    for label in labels {
                        writeln!(w, "{}\t{}\t{}\t{}", label.id, label.name, label.color, label.description)?;
                    }
                    Ok(())
                },
                |labels, w| {
                    pretty_section(w, &format!("Labels ({})", labels.len()))?;
                    for label in labels {
                        writeln!(w, "{:>5}  {:<20} {}  {}", label.id, label.name, label.color, label.description)?;
                    }
                    Ok(())
                },
            )
        }
        LabelCommand::Rm { name } => {
            let label = ctx.label_named(&conn, name)?;
            query::delete_label(&conn, label.id).map_err(|err| ctx.trail(&err))?;
            let out = LabelRemoved {
                ok: true,
                removed: label,
            };
            render(ctx.output, &out, |o, w| writeln!(w, "✓ removed label {}", o.removed))
        }
    }
}

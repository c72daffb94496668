//! `bt user` — manage the people who author and own tickets.

use crate::cmd::Context;
use crate::output::{pretty_section, render, render_mode};
use bugtrail_core::db::query;
use bugtrail_core::model::User;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    #[command(
        about = "Add a user",
        after_help = "EXAMPLES:\n    bt user add zopieux"
    )]
    Add {
        /// Username (no whitespace).
        name: String,
    },

    #[command(about = "List users")]
    List,

    #[command(
        about = "Remove a user",
        long_about = "Remove a user. Tickets they authored or were assigned keep no \
                      reference to them; history entries naming them are hidden."
    )]
    Rm {
        name: String,
    },
}

#[derive(Debug, Serialize)]
struct UserRemoved {
    ok: bool,
    removed: User,
}

pub fn run_user(args: &UserArgs, ctx: &Context) -> anyhow::Result<()> {
    let conn = ctx.open_store()?;
    match &args.command {
        UserCommand::Add { name } => {
            let user = query::create_user(&conn, name).map_err(|err| ctx.trail(&err))?;
            render(ctx.output, &user, |u, w| writeln!(w, "✓ added user {} (#{})", u, u.id))
        }
        UserCommand::List => {
            let users = query::list_users(&conn).map_err(|err| ctx.trail(&err))?;
            render_mode(
                ctx.output,
                &users,
                |users, w| {
                    for user in users {
                        writeln!(w, "{}\t{}", user.id, user.username)?;
                    }
                    Ok(())
                },
                |users, w| {
                    pretty_section(w, &format!("Users ({})", users.len()))?;
                    for user in users {
                        writeln!(w, "{:>5}  {}", user.id, user.username)?;
                    }
                    Ok(())
                },
            )
        }
        UserCommand::Rm { name } => {
            let user = ctx.user_named(&conn, name)?;
            query::delete_user(&conn, user.id).map_err(|err| ctx.trail(&err))?;
            let out = UserRemoved {
                ok: true,
                removed: user,
            };
            render(ctx.output, &out, |o, w| writeln!(w, "✓ removed user {}", o.removed))
        }
    }
}

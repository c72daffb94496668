//! Command handlers for `bt`.
//!
//! Each handler takes its parsed arguments and a [`Context`]. Failures are
//! rendered to stderr in the active output mode before being returned, so
//! `main` only has to set the exit status.

pub mod comment;
pub mod completions;
pub mod create;
pub mod init;
pub mod label;
pub mod list;
pub mod log;
pub mod show;
pub mod update;
pub mod user;

use crate::identity;
use crate::output::{CliError, OutputMode, render_error};
use crate::validate::{self, ValidationError};
use anyhow::Context as _;
use bugtrail_core::ErrorCode;
use bugtrail_core::TrailError;
use bugtrail_core::config::{DATA_DIR, DB_FILE, EffectiveConfig};
use bugtrail_core::db;
use bugtrail_core::db::query;
use bugtrail_core::history::{Recorder, RefKind};
use bugtrail_core::model::{Label, Ticket, User};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Walk up from `start` to the nearest directory holding `.bugtrail/`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(DATA_DIR).is_dir() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Everything a command needs besides its own arguments.
pub struct Context {
    /// The project root, or the working directory when no project exists yet.
    pub root: PathBuf,
    pub initialized: bool,
    pub config: EffectiveConfig,
    pub output: OutputMode,
    pub user_flag: Option<String>,
}

impl Context {
    pub fn db_path(&self) -> PathBuf {
        self.root.join(DATA_DIR).join(DB_FILE)
    }

    /// Open the project's ticket store.
    ///
    /// # Errors
    ///
    /// Fails when the directory is not a bugtrail project or the database
    /// cannot be opened.
    pub fn open_store(&self) -> anyhow::Result<Connection> {
        if !self.initialized {
            let code = ErrorCode::NotInitialized;
            return Err(self.fail(CliError::with_details(
                format!("no {DATA_DIR}/ directory found from {}", self.root.display()),
                code.hint().unwrap_or_default(),
                code.code(),
            )));
        }
        let path = self.db_path();
        db::open_db(&path, self.config.project.store.busy_timeout())
            .with_context(|| format!("open ticket store at {}", path.display()))
    }

    /// A recorder honoring the configured attempt count.
    pub fn recorder<'conn>(&self, conn: &'conn Connection) -> Recorder<'conn> {
        Recorder::new(conn).with_max_attempts(self.config.project.recorder.max_attempts)
    }

    /// Render `error` and turn it into the command's failure.
    pub fn fail(&self, error: CliError) -> anyhow::Error {
        if let Err(render_err) = render_error(self.output, &error) {
            tracing::warn!(error = %render_err, "failed to render error");
        }
        anyhow::anyhow!(error.message)
    }

    pub fn invalid(&self, error: &ValidationError) -> anyhow::Error {
        self.fail(error.to_cli_error())
    }

    pub fn trail(&self, error: &TrailError) -> anyhow::Error {
        self.fail(CliError::from(error))
    }

    /// The acting user for commands that write history.
    ///
    /// # Errors
    ///
    /// Fails when no identity resolves or it names no existing user.
    pub fn require_author(&self, conn: &Connection) -> anyhow::Result<User> {
        let Some(name) = identity::resolve_user(self.user_flag.as_deref()) else {
            return Err(self.fail(CliError::with_details(
                "author identity required for this command",
                "pass --user <name> or set BUGTRAIL_USER",
                "missing_user",
            )));
        };
        self.user_named(conn, &name)
    }

    pub fn user_named(&self, conn: &Connection, name: &str) -> anyhow::Result<User> {
        match query::find_user_by_name(conn, name) {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(self.fail(CliError::with_details(
                format!("user '{name}' not found"),
                ErrorCode::UserNotFound.hint().unwrap_or_default(),
                ErrorCode::UserNotFound.code(),
            ))),
            Err(err) => Err(self.trail(&err)),
        }
    }

    pub fn label_named(&self, conn: &Connection, name: &str) -> anyhow::Result<Label> {
        match query::find_label_by_name(conn, name) {
            Ok(Some(label)) => Ok(label),
            Ok(None) => Err(self.fail(CliError::with_details(
                format!("label '{name}' not found"),
                ErrorCode::LabelNotFound.hint().unwrap_or_default(),
                ErrorCode::LabelNotFound.code(),
            ))),
            Err(err) => Err(self.trail(&err)),
        }
    }

    /// Parse `raw` as a ticket number and load the ticket.
    pub fn ticket(&self, conn: &Connection, raw: &str) -> anyhow::Result<Ticket> {
        let id = validate::parse_ticket_id(raw).map_err(|err| self.invalid(&err))?;
        match query::get_ticket(conn, id) {
            Ok(Some(ticket)) => Ok(ticket),
            Ok(None) => Err(self.trail(&TrailError::NotFound {
                kind: RefKind::Ticket,
                id: id.get(),
            })),
            Err(err) => Err(self.trail(&err)),
        }
    }
}

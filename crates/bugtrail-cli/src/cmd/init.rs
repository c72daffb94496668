use crate::cmd::Context;
use crate::output::{CliError, render};
use anyhow::{Context as _, Result};
use bugtrail_core::config::{DATA_DIR, DB_FILE};
use bugtrail_core::db;
use clap::Args;
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the default config even if `.bugtrail/` already exists.
    /// Existing tickets and history are kept.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "[store]\n\
    busy_timeout_ms = 5000\n\
    \n\
    [recorder]\n\
    max_attempts = 3\n\
    \n\
    [log]\n\
    chronological = true\n";

const GITIGNORE: &str = "bugtrail.sqlite3\nbugtrail.sqlite3-wal\nbugtrail.sqlite3-shm\n";

#[derive(Debug, Serialize)]
struct InitOutput {
    ok: bool,
    data_dir: String,
    database: String,
}

/// Execute `bt init`. Creates the project skeleton:
///
/// ```text
/// .bugtrail/
///   bugtrail.sqlite3    (ticket store, migrated to the latest schema)
///   config.toml         (default project config)
///   .gitignore          (database files)
/// ```
///
/// # Errors
///
/// Returns an error if `.bugtrail/` already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, ctx: &Context) -> Result<()> {
    let data_dir = ctx.root.join(DATA_DIR);

    if data_dir.exists() && !args.force {
        return Err(ctx.fail(CliError::with_details(
            format!("{DATA_DIR}/ already exists"),
            "use `bt init --force` to rewrite the default config",
            "already_initialized",
        )));
    }

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let config_path = data_dir.join("config.toml");
    std::fs::write(&config_path, CONFIG_TOML)
        .with_context(|| format!("Failed to write config: {}", config_path.display()))?;

    let gitignore_path = data_dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;

    let db_path = data_dir.join(DB_FILE);
    db::open_db(&db_path, db::DEFAULT_BUSY_TIMEOUT)?;
    tracing::info!(path = %db_path.display(), "initialized ticket store");

    let out = InitOutput {
        ok: true,
        data_dir: data_dir.display().to_string(),
        database: db_path.display().to_string(),
    };
    render(ctx.output, &out, |_, w| {
        writeln!(w, "✓ Initialized {DATA_DIR}/")?;
        writeln!(w)?;
        writeln!(w, "  Database: {DATA_DIR}/{DB_FILE}")?;
        writeln!(w, "  Config:   {DATA_DIR}/config.toml")?;
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  bt user add <name>")?;
        writeln!(w, "  export BUGTRAIL_USER=<name>")?;
        writeln!(w, "  bt create --title \"First ticket\"")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bugtrail_core::config::load_project_config;

    #[test]
    fn default_config_template_parses_to_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(dir.path().join(DATA_DIR)).expect("data dir");
        std::fs::write(dir.path().join(DATA_DIR).join("config.toml"), CONFIG_TOML)
            .expect("write");
        let cfg = load_project_config(dir.path()).expect("parse");
        assert_eq!(cfg, bugtrail_core::config::ProjectConfig::default());
    }
}

#![forbid(unsafe_code)]

mod cmd;
mod identity;
mod output;
mod validate;

use bugtrail_core::ErrorCode;
use bugtrail_core::config;
use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode};
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "bugtrail: tickets with a reverse-diff audit history",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Act as this user (skips env resolution).
    #[arg(long, global = true)]
    user: Option<String>,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Project",
        about = "Initialize a bugtrail project",
        long_about = "Create .bugtrail/ in the current directory with a migrated ticket store.",
        after_help = "EXAMPLES:\n    bt init\n\n    # Rewrite the default config, keeping tickets\n    bt init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(next_help_heading = "Project", about = "Manage users")]
    User(cmd::user::UserArgs),

    #[command(next_help_heading = "Project", about = "Manage labels")]
    Label(cmd::label::LabelArgs),

    #[command(
        next_help_heading = "Tickets",
        about = "Create a ticket",
        after_help = "EXAMPLES:\n    bt create --title \"Crash on save\" --description \"Steps: ...\"\n\n    bt --user seirl create --title \"Slow startup\" --json"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Tickets",
        about = "List tickets",
        after_help = "EXAMPLES:\n    # Open tickets (default)\n    bt list\n\n    bt list --all -n 10"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Tickets",
        about = "Show one ticket",
        after_help = "EXAMPLES:\n    bt show 12\n\n    bt show '#12' --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Tickets",
        about = "Change a ticket's fields",
        long_about = "Change any subset of a ticket's fields. One history record is stored per call.",
        after_help = "EXAMPLES:\n    bt update 12 --title \"Crash on save (macOS)\" --assign seirl\n\n    bt update 12 --close --label wontfix\n\n    bt update 12 --clear-blocked-by"
    )]
    Update(cmd::update::UpdateArgs),

    #[command(
        next_help_heading = "History",
        about = "Comment on a ticket",
        after_help = "EXAMPLES:\n    bt comment 12 \"Reproduced on 1.4.2\""
    )]
    Comment(cmd::comment::CommentArgs),

    #[command(
        next_help_heading = "History",
        about = "Show a ticket's history",
        long_about = "Reconstruct a ticket's history from its stored change records.",
        after_help = "EXAMPLES:\n    bt log 12\n\n    bt log 12 --newest-first -n 5\n\n    bt log 12 --json"
    )]
    Log(cmd::log::LogArgs),

    #[command(
        next_help_heading = "Project",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    bt completions bash > ~/.local/share/bash-completion/completions/bt"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env("BUGTRAIL_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "bugtrail=debug,info"
        } else if quiet {
            "error"
        } else {
            "bugtrail=info,warn"
        })
    });

    let format = env::var("BUGTRAIL_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let cwd = env::current_dir()?;
    let found = cmd::find_project_root(&cwd);
    let initialized = found.is_some();
    let root = found.unwrap_or(cwd);
    let config = match config::resolve_config(&root, cli.json) {
        Ok(config) => config,
        Err(err) => {
            let code = ErrorCode::ConfigParseError;
            let mode = if cli.json { OutputMode::Json } else { OutputMode::Text };
            output::render_error(
                mode,
                &CliError::with_details(
                    format!("{err:#}"),
                    code.hint().unwrap_or_default(),
                    code.code(),
                ),
            )?;
            return Err(err);
        }
    };
    debug!(root = %root.display(), initialized, output = %config.resolved_output, "resolved project");

    let ctx = cmd::Context {
        output: OutputMode::from_resolved(&config.resolved_output),
        root,
        initialized,
        config,
        user_flag: cli.user.clone(),
    };

    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, &ctx),
        Commands::User(args) => cmd::user::run_user(args, &ctx),
        Commands::Label(args) => cmd::label::run_label(args, &ctx),
        Commands::Create(args) => cmd::create::run_create(args, &ctx),
        Commands::List(args) => cmd::list::run_list(args, &ctx),
        Commands::Show(args) => cmd::show::run_show(args, &ctx),
        Commands::Update(args) => cmd::update::run_update(args, &ctx),
        Commands::Comment(args) => cmd::comment::run_comment(args, &ctx),
        Commands::Log(args) => cmd::log::run_log(args, &ctx),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args, &mut command)
        }
    }
}

//! Author identity resolution for CLI commands.
//!
//! The resolution chain: `--user` flag > `BUGTRAIL_USER` env > `USER` env (TTY only).
//! Commands that write tickets, updates, or comments require an identity that
//! names an existing user; everything else works without one.

use std::env;

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

/// Real environment reader.
struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

fn resolve_user_with(cli_flag: Option<&str>, env: &dyn EnvReader) -> Option<String> {
    if let Some(user) = cli_flag.map(str::trim).filter(|u| !u.is_empty()) {
        return Some(user.to_string());
    }

    if let Some(val) = env.get("BUGTRAIL_USER") {
        return Some(val.trim().to_string());
    }

    // A login name only counts when a person is at the keyboard.
    if env.is_tty() {
        return env.get("USER").map(|val| val.trim().to_string());
    }

    None
}

/// Resolve the acting username:
///
/// 1. `--user` CLI flag (passed as `cli_flag`)
/// 2. `BUGTRAIL_USER` environment variable
/// 3. `USER` environment variable (only if stdin is a TTY)
///
/// Returns `None` if no identity could be resolved.
pub fn resolve_user(cli_flag: Option<&str>) -> Option<String> {
    resolve_user_with(cli_flag, &RealEnv)
}

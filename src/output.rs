//! Human-oriented output that stays out of the protocol stream
//!
//! When an MCP client drives us it sets `MCP_STDIO` in our environment before
//! spawning us. In that mode stdout must carry nothing but the inner server's
//! protocol traffic, so every banner, spinner, and status line goes through
//! the quiet-mode check here.

use std::io::IsTerminal;
use std::sync::OnceLock;

static QUIET_MODE: OnceLock<bool> = OnceLock::new();

/// Check whether we are being driven by an automated caller.
///
/// `MCP_STDIO` in our own environment is a marker we never set for ourselves;
/// only a parent MCP client does. Cached for the process lifetime.
pub fn is_quiet_mode() -> bool {
    *QUIET_MODE.get_or_init(|| std::env::var_os("MCP_STDIO").is_some())
}

/// Whether spinners and colors are worth emitting at all.
pub fn use_fancy_output() -> bool {
    !is_quiet_mode() && std::io::stderr().is_terminal() && std::env::var_os("CI").is_none()
}

/// Print a status line to stderr unless quiet mode is active.
///
/// Status output goes to stderr, never stdout: even outside MCP mode a user
/// may pipe our stdout into another tool.
#[macro_export]
macro_rules! status {
    ($($arg:tt)*) => {
        if !$crate::output::is_quiet_mode() {
            eprintln!($($arg)*);
        }
    };
}

/// Create a spinner-style progress bar, or a hidden one in quiet mode.
pub fn spinner(msg: &str) -> indicatif::ProgressBar {
    if !use_fancy_output() {
        return indicatif::ProgressBar::hidden();
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_style(
        indicatif::ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_mode_is_cached() {
        // The OnceLock means repeated calls agree regardless of later env churn.
        let first = is_quiet_mode();
        assert_eq!(first, is_quiet_mode());
    }

    #[test]
    fn hidden_spinner_in_non_tty() {
        // Must not panic regardless of environment.
        let pb = spinner("working...");
        pb.finish_and_clear();
    }
}

//! Terminal detection.

use std::io::{self, IsTerminal};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Determines if stdout is a terminal that understands ANSI escape codes.
///
/// A `TERM` of `dumb` opts out even on a TTY. A missing `TERM` does not.
pub fn is_ansi_interactive_terminal() -> bool {
    let is_tty = io::stdout().is_terminal();
    let term = std::env::var("TERM").ok();

    if is_tty && term.is_none() {
        tracing::debug!("detected TTY without TERM environment variable");
    }

    is_tty && term.as_deref() != Some("dumb")
}

//! ui::output
//!
//! Terminal output.
//!
//! # Design
//!
//! Human-readable results go to stdout and respect `--quiet`. Errors go to
//! stderr. With `--json`, results are printed as one JSON
//! document instead.

use std::fmt::Display;

use serde::Serialize;

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Only errors and JSON results
    Quiet,
    Normal,
}

impl Verbosity {
    pub fn from_flags(quiet: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print `value` as pretty JSON. Shown even in quiet mode.
pub fn json<T: Serialize>(value: &T) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

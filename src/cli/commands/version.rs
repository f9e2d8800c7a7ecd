//! cli::commands::version
//!
//! Print the binary name and version.

use anyhow::Result;

/// Print the crate name and version.
pub fn version() -> Result<()> {
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    Ok(())
}

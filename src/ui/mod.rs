//! ui
//!
//! Presentation of engine results on the terminal.
//!
//! # Modules
//!
//! - [`output`] - Printing with verbosity and JSON handling
//! - [`format`] - Text rendering of change requests, status and catalogs

pub mod format;
pub mod output;

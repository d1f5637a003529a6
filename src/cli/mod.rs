//! Command-line interface
//!
//! Flag parsing and the interactive operator console.

pub mod commands;
pub mod console;

pub use commands::Opt;

//! CLI module - argument parsing and subcommands

mod args;
pub mod rules;

pub use args::{letter_labels, Cli, Commands};

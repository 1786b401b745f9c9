//! lectern-cli - Command-line pipeline for lectern.

pub mod cli;

pub use cli::{run, Cli, Commands};

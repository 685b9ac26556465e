//! Command-line front end.

mod cli_main;

pub use cli_main::cli;

//! CLI engine: argument parsing, option resolution and command handlers.

pub mod arg_parser;
pub mod cli;
pub mod handlers;

pub use arg_parser::{Cli, Commands, CommonArgs};
pub use cli::{handle_run, setup_opts};
pub use handlers::{handle_account_id, handle_scan_resources, parse_resources, scan_chain};

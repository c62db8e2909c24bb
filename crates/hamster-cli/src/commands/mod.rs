//! CLI subcommand implementations.

pub mod add;
pub mod list;
pub mod remove;
pub mod search;
pub mod settings;
pub mod stop;
pub mod today;
pub mod util;

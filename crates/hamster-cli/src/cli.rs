//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::{add, list, remove, search, settings, stop, today};

/// Personal time tracker.
///
/// Records facts (intervals of activity, optionally categorized and tagged)
/// and answers questions about them.
#[derive(Debug, Parser)]
#[command(name = "hamster", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Record a fact.
    Add(add::AddArgs),

    /// Stop the ongoing fact.
    Stop(stop::StopArgs),

    /// Stop the ongoing fact, or restart the most recent one.
    ToggleTracking,

    /// Delete a fact.
    Remove(remove::RemoveArgs),

    /// Show facts of the current hamster day.
    Today(today::TodayArgs),

    /// Search facts. Commas separate alternatives, spaces require all terms.
    Search(search::SearchArgs),

    /// List activity suggestions, most recently used first.
    Activities(list::ActivitiesArgs),

    /// List categories.
    Categories,

    /// List tags.
    Tags(list::TagsArgs),

    /// Read or change settings.
    #[command(subcommand)]
    Settings(settings::SettingsAction),
}

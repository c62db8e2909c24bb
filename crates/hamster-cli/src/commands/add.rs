//! Add command for recording a fact.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;

use hamster_client::Storage;
use hamster_core::{Fact, RecordStore};

use super::util::parse_datetime;

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Activity name.
    pub activity: String,

    /// Category of the activity.
    #[arg(short = 'C', long)]
    pub category: Option<String>,

    /// Tag to attach; repeat for several.
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Free-text description.
    #[arg(short, long)]
    pub description: Option<String>,

    /// Start time (e.g. "09:30", "2025-03-14 09:30", "20 minutes ago").
    #[arg(long)]
    pub start: Option<String>,

    /// End time. Leave out to keep the fact running.
    #[arg(long)]
    pub end: Option<String>,

    /// Keep a newly created activity out of suggestions.
    #[arg(long)]
    pub temporary: bool,
}

impl AddArgs {
    fn to_fact(&self) -> Result<Fact> {
        let mut fact = Fact::new(self.activity.trim()).with_tags(self.tags.iter().cloned());
        if let Some(category) = &self.category {
            fact = fact.with_category(category.trim());
        }
        if let Some(description) = &self.description {
            fact = fact.with_description(description.trim());
        }
        if let Some(start) = &self.start {
            fact = fact.with_start(parse_datetime(start).context("invalid --start")?);
        }
        if let Some(end) = &self.end {
            fact = fact.with_end(parse_datetime(end).context("invalid --end")?);
        }
        Ok(fact)
    }
}

pub fn run<W: Write, S: RecordStore>(
    writer: &mut W,
    storage: &Storage<S>,
    args: &AddArgs,
) -> Result<()> {
    let fact = args.to_fact()?;
    let id = storage.add_fact(&fact, args.temporary)?;
    writeln!(writer, "Added fact #{id}")?;
    Ok(())
}

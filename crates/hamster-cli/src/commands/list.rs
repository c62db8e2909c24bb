//! Listing commands: activities, categories and tags.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use hamster_client::Storage;
use hamster_core::RecordStore;

#[derive(Debug, Args)]
pub struct ActivitiesArgs {
    /// Only activities whose name contains this text.
    #[arg(default_value = "")]
    pub search: String,
}

#[derive(Debug, Args)]
pub struct TagsArgs {
    /// Only tags offered for autocompletion.
    #[arg(long)]
    pub autocomplete: bool,
}

pub fn activities<W: Write, S: RecordStore>(
    writer: &mut W,
    storage: &Storage<S>,
    args: &ActivitiesArgs,
) -> Result<()> {
    for suggestion in storage.get_activities(&args.search)? {
        if suggestion.category.is_empty() {
            writeln!(writer, "{}", suggestion.name)?;
        } else {
            writeln!(writer, "{}@{}", suggestion.name, suggestion.category)?;
        }
    }
    Ok(())
}

pub fn categories<W: Write, S: RecordStore>(writer: &mut W, storage: &Storage<S>) -> Result<()> {
    for category in storage.get_categories()? {
        writeln!(writer, "{}", category.name)?;
    }
    Ok(())
}

pub fn tags<W: Write, S: RecordStore>(
    writer: &mut W,
    storage: &Storage<S>,
    args: &TagsArgs,
) -> Result<()> {
    for tag in storage.get_tags(args.autocomplete)? {
        writeln!(writer, "{}", tag.name)?;
    }
    Ok(())
}

//! Remove command for deleting a fact.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use hamster_client::Storage;
use hamster_core::{FactId, RecordStore};

#[derive(Debug, Args)]
pub struct RemoveArgs {
    /// ID of the fact to delete.
    pub id: FactId,
}

pub fn run<W: Write, S: RecordStore>(
    writer: &mut W,
    storage: &Storage<S>,
    args: &RemoveArgs,
) -> Result<()> {
    storage.remove_fact(args.id)?;
    writeln!(writer, "Removed fact #{}", args.id)?;
    Ok(())
}

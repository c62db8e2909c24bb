//! Stop and toggle-tracking commands.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use hamster_client::Storage;
use hamster_core::{RecordStore, TrackingToggle};

use super::util::parse_datetime;

#[derive(Debug, Args)]
pub struct StopArgs {
    /// When the fact ended. Defaults to now.
    #[arg(long)]
    pub at: Option<String>,
}

pub fn run<W: Write, S: RecordStore>(
    writer: &mut W,
    storage: &Storage<S>,
    args: &StopArgs,
) -> Result<()> {
    let end = args.at.as_deref().map(parse_datetime).transpose()?;
    match storage.stop_tracking(end)? {
        Some(id) => writeln!(writer, "Stopped fact #{id}")?,
        None => writeln!(writer, "No ongoing fact.")?,
    }
    Ok(())
}

pub fn toggle<W: Write, S: RecordStore>(writer: &mut W, storage: &Storage<S>) -> Result<()> {
    match storage.stop_or_restart_tracking()? {
        TrackingToggle::Stopped(id) => writeln!(writer, "Stopped fact #{id}")?,
        TrackingToggle::Restarted(id) => writeln!(writer, "Restarted as fact #{id}")?,
        TrackingToggle::Idle => writeln!(writer, "Nothing to stop or restart.")?,
    }
    Ok(())
}

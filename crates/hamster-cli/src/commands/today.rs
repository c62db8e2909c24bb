//! Today command: facts of the current hamster day.

use std::io::Write;

use anyhow::Result;
use chrono::NaiveDateTime;
use clap::Args;

use hamster_client::Storage;
use hamster_core::{Fact, RecordStore};

use super::util::{format_duration, local_now};

#[derive(Debug, Args)]
pub struct TodayArgs {
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write, S: RecordStore>(
    writer: &mut W,
    storage: &Storage<S>,
    args: &TodayArgs,
) -> Result<()> {
    let facts = storage.get_todays_facts()?;
    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&facts)?)?;
        return Ok(());
    }
    write_facts(writer, &facts, local_now(), false)
}

/// Writes one line per fact followed by the total duration.
pub fn write_facts<W: Write>(
    writer: &mut W,
    facts: &[Fact],
    now: NaiveDateTime,
    with_date: bool,
) -> Result<()> {
    if facts.is_empty() {
        writeln!(writer, "No facts.")?;
        return Ok(());
    }

    let time_format = if with_date { "%Y-%m-%d %H:%M" } else { "%H:%M" };
    let mut total = chrono::Duration::zero();
    for fact in facts {
        let start = fact
            .start_time
            .map(|start| start.format(time_format).to_string())
            .unwrap_or_default();
        let end = fact
            .end_time
            .map_or_else(|| "now".to_string(), |end| end.format(time_format).to_string());
        let duration = fact.delta(now).unwrap_or_else(chrono::Duration::zero);
        total += duration;

        let id = fact.id.map(|id| id.to_string()).unwrap_or_default();
        let mut line = format!(
            "#{id}  {start} - {end}  {}  {}",
            format_duration(duration),
            fact.activity
        );
        if let Some(category) = fact.category_name() {
            line.push('@');
            line.push_str(category);
        }
        if !fact.description.is_empty() {
            line.push_str(", ");
            line.push_str(&fact.description);
        }
        for tag in &fact.tags {
            line.push_str(" #");
            line.push_str(tag);
        }
        writeln!(writer, "{line}")?;
    }
    writeln!(writer, "Total: {}", format_duration(total))?;
    Ok(())
}

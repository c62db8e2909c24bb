//! Search command over a span of hamster days.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::{Duration, NaiveDateTime};
use clap::Args;

use hamster_client::Storage;
use hamster_core::{Range, RecordStore, hamster_day};

use super::today::write_facts;
use super::util::{local_now, parse_datetime};

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Search terms: "work personal, urgent" means (work AND personal) OR urgent.
    #[arg(default_value = "")]
    pub terms: String,

    /// Start of the searched range. Defaults to the start of the hamster
    /// day `--days` days back.
    #[arg(long)]
    pub start: Option<String>,

    /// End of the searched range. Defaults to now.
    #[arg(long)]
    pub end: Option<String>,

    /// Number of hamster days to search, including today.
    #[arg(long, default_value_t = 7)]
    pub days: u32,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    fn range(&self, now: NaiveDateTime, day_start: chrono::NaiveTime) -> Result<Range> {
        let start = match &self.start {
            Some(start) => parse_datetime(start)?,
            None => {
                let back = Duration::days(i64::from(self.days.max(1)) - 1);
                let Some(first_day) = hamster_day(now, day_start).checked_sub_signed(back) else {
                    bail!("--days {} reaches too far back", self.days);
                };
                first_day.and_time(day_start)
            }
        };
        let end = self.end.as_deref().map(parse_datetime).transpose()?;
        if end.is_some_and(|end| end < start) {
            bail!("--end is before --start");
        }
        Ok(Range::from_start_end(start, end))
    }
}

pub fn run<W: Write, S: RecordStore>(
    writer: &mut W,
    storage: &Storage<S>,
    args: &SearchArgs,
) -> Result<()> {
    let now = local_now();
    let range = args.range(now, storage.day_start())?;
    tracing::debug!(?range, terms = %args.terms, "searching facts");
    let facts = storage.get_facts(range, &args.terms)?;
    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&facts)?)?;
        return Ok(());
    }
    write_facts(writer, &facts, now, true)
}

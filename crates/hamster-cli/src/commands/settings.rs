//! Settings command for reading and changing persisted preferences.

use std::io::Write;

use anyhow::{Result, bail};
use clap::Subcommand;

use hamster_core::{ConfigStore, SettingValue};

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Print one setting.
    Get {
        /// Setting key, e.g. day-start-minutes.
        key: String,
    },
    /// Change one setting. Integers are stored as integers, anything else as text.
    Set { key: String, value: String },
    /// Print every setting.
    List,
}

pub fn run<W: Write>(writer: &mut W, config: &ConfigStore, action: &SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Get { key } => {
            let Some(value) = config.get(key) else {
                bail!("unknown setting: {key}");
            };
            writeln!(writer, "{value}")?;
        }
        SettingsAction::Set { key, value } => {
            let value = SettingValue::parse_lenient(value);
            if !config.set(key, value.clone()) {
                bail!(
                    "failed to save settings to {}",
                    config.path().display()
                );
            }
            writeln!(writer, "{key} = {}", serde_json::to_string(&value)?)?;
        }
        SettingsAction::List => {
            for (key, value) in config.all() {
                writeln!(writer, "{key} = {}", serde_json::to_string(&value)?)?;
            }
            writeln!(writer, "(day starts at {})", config.day_start().format("%H:%M"))?;
        }
    }
    Ok(())
}

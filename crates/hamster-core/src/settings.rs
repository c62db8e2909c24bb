//! Persisted key/value settings.
//!
//! The settings file is a flat JSON object. On open, keys missing from the
//! file are filled in from the compiled-in defaults; keys the store does not
//! manage are kept and written back untouched. Every [`ConfigStore::set`]
//! rewrites the whole file. Writers in other processes are not coordinated:
//! the last write wins.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signals::{HandlerError, Signal, SubscriptionId};

/// Minutes after midnight at which a hamster day starts.
pub const DAY_START_MINUTES: &str = "day-start-minutes";

/// Folder the last report was saved to.
pub const LAST_REPORT_FOLDER: &str = "last-report-folder";

const DEFAULT_DAY_START_MINUTES: i64 = 5 * 60 + 30;
const MINUTES_PER_DAY: i64 = 24 * 60;

/// A setting value.
///
/// Managed keys hold integers or strings. Anything else found in the file is
/// kept as raw JSON so it survives a rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Integer(i64),
    Text(String),
    Other(serde_json::Value),
}

impl SettingValue {
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Name of the value's type, for diagnostics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Text(_) => "string",
            Self::Other(_) => "other",
        }
    }

    /// Parses command-line input: integers stay integers, anything else is text.
    pub fn parse_lenient(input: &str) -> Self {
        input
            .trim()
            .parse::<i64>()
            .map_or_else(|_| Self::Text(input.to_string()), Self::Integer)
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Other(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Payload of the `changed` notification.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingChange {
    pub key: String,
    pub value: SettingValue,
}

/// Failure to read or write the settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access settings file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The compiled-in default settings.
pub fn defaults() -> BTreeMap<String, SettingValue> {
    BTreeMap::from([
        (
            DAY_START_MINUTES.to_string(),
            SettingValue::Integer(DEFAULT_DAY_START_MINUTES),
        ),
        (
            LAST_REPORT_FOLDER.to_string(),
            SettingValue::Text(String::new()),
        ),
    ])
}

/// Returns the per-user settings file location.
///
/// On Linux: `~/.config/hamster/settings.json`
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hamster")
        .join("settings.json")
}

/// Settings store backed by a JSON file.
pub struct ConfigStore {
    path: PathBuf,
    settings: Mutex<BTreeMap<String, SettingValue>>,
    changed: Signal<SettingChange>,
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("path", &self.path)
            .field("changed", &self.changed)
            .finish_non_exhaustive()
    }
}

impl ConfigStore {
    /// Opens the store at the per-user default location.
    pub fn open() -> Self {
        Self::open_at(default_settings_path())
    }

    /// Opens the store at `path`.
    ///
    /// Never fails: a missing or unreadable file yields the defaults.
    pub fn open_at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match load_settings(&path) {
            Ok(Some(mut settings)) => {
                for (key, value) in defaults() {
                    settings.entry(key).or_insert(value);
                }
                tracing::debug!(path = %path.display(), "loaded settings");
                settings
            }
            Ok(None) => {
                tracing::info!(path = %path.display(), "no settings file found, using defaults");
                defaults()
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load settings, using defaults");
                defaults()
            }
        };
        Self {
            path,
            settings: Mutex::new(settings),
            changed: Signal::new("changed"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the value for `key`, or its compiled-in default.
    ///
    /// Keys absent from the store log a warning.
    pub fn get(&self, key: &str) -> Option<SettingValue> {
        if let Some(value) = self.lookup(key) {
            return Some(value);
        }
        tracing::warn!(key, "unknown settings key");
        defaults().remove(key)
    }

    /// Returns the value for `key`, or `default` if the store has none.
    pub fn get_or(&self, key: &str, default: impl Into<SettingValue>) -> SettingValue {
        self.lookup(key).unwrap_or_else(|| default.into())
    }

    /// Stores `value`, rewrites the settings file and notifies subscribers.
    ///
    /// The type check against the key's default is advisory: a mismatch is
    /// logged and the value is stored anyway. Returns `false` when the file
    /// could not be written; the new value is kept in memory regardless.
    pub fn set(&self, key: &str, value: impl Into<SettingValue>) -> bool {
        let value = value.into();
        tracing::debug!(key, %value, "setting");

        if let Some(default) = defaults().get(key) {
            let permissive = matches!(default, SettingValue::Text(text) if text.is_empty());
            if !permissive && default.kind() != value.kind() {
                tracing::warn!(
                    key,
                    expected = default.kind(),
                    actual = value.kind(),
                    "settings type mismatch"
                );
            }
        }

        let persisted = {
            let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
            settings.insert(key.to_string(), value.clone());
            match save_settings(&self.path, &settings) {
                Ok(()) => true,
                Err(err) => {
                    tracing::error!(error = %err, "failed to save settings");
                    false
                }
            }
        };

        self.changed.emit(&SettingChange {
            key: key.to_string(),
            value,
        });
        persisted
    }

    /// Subscribes to every change.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&SettingChange) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.changed.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.changed.unsubscribe(id)
    }

    /// One-way binding from `key` to `target`.
    ///
    /// `target` receives the current value now and every later value set for
    /// `key`. The store never reads anything back from the target.
    pub fn bind<F>(&self, key: &str, target: F) -> SubscriptionId
    where
        F: Fn(&SettingValue) + Send + Sync + 'static,
    {
        tracing::debug!(key, "binding setting");
        if let Some(value) = self.get(key) {
            target(&value);
        }
        let key = key.to_string();
        self.changed.subscribe(move |change| {
            if change.key == key {
                target(&change.value);
            }
            Ok(())
        })
    }

    /// Start of the hamster day.
    ///
    /// Non-integer values fall back to the default; values beyond one day
    /// wrap around midnight.
    pub fn day_start(&self) -> NaiveTime {
        let minutes = match self.get(DAY_START_MINUTES) {
            Some(SettingValue::Integer(minutes)) => minutes,
            other => {
                tracing::warn!(value = ?other, "invalid day start, using default");
                DEFAULT_DAY_START_MINUTES
            }
        };
        let minutes = minutes.rem_euclid(MINUTES_PER_DAY);
        let (hours, minutes) = (minutes / 60, minutes % 60);
        // Both components are in range after the wrap above.
        NaiveTime::from_hms_opt(
            u32::try_from(hours).unwrap_or_default(),
            u32::try_from(minutes).unwrap_or_default(),
            0,
        )
        .unwrap_or(NaiveTime::MIN)
    }

    /// Snapshot of every stored setting.
    pub fn all(&self) -> BTreeMap<String, SettingValue> {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lookup(&self, key: &str) -> Option<SettingValue> {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

fn load_settings(path: &Path) -> Result<Option<BTreeMap<String, SettingValue>>, SettingsError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn save_settings(
    path: &Path,
    settings: &BTreeMap<String, SettingValue>,
) -> Result<(), SettingsError> {
    let io_err = |source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let contents = serde_json::to_string_pretty(settings).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, contents + "\n").map_err(io_err)?;
    tracing::debug!(path = %path.display(), "saved settings");
    Ok(())
}

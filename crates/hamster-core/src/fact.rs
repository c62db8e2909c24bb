//! Facts and the classification records they reference.

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::types::{ActivityId, CategoryId, FactId, TagId};

/// A recorded interval of activity.
///
/// The category is derived through the activity: two facts with the same
/// activity name but different categories reference different activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// Store-assigned identifier. `None` until the fact is persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FactId>,

    /// Activity name.
    pub activity: String,

    /// Resolved activity, set on facts read back from a store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<ActivityId>,

    /// Category name of the activity, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// When the fact started. Required before the fact can be persisted.
    #[serde(default)]
    pub start_time: Option<NaiveDateTime>,

    /// When the fact ended. `None` means the fact is still ongoing.
    #[serde(default)]
    pub end_time: Option<NaiveDateTime>,

    /// Free-text description.
    #[serde(default)]
    pub description: String,

    /// Tag labels in the order they were attached.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Fact {
    /// Creates an unsaved fact for the given activity with no times set.
    pub fn new(activity: impl Into<String>) -> Self {
        Self {
            id: None,
            activity: activity.into(),
            activity_id: None,
            category: None,
            start_time: None,
            end_time: None,
            description: String::new(),
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_start(mut self, start: NaiveDateTime) -> Self {
        self.start_time = Some(start);
        self
    }

    #[must_use]
    pub fn with_end(mut self, end: NaiveDateTime) -> Self {
        self.end_time = Some(end);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the fact has no end time yet.
    pub const fn is_ongoing(&self) -> bool {
        self.end_time.is_none()
    }

    /// Elapsed time, measuring ongoing facts up to `now`.
    pub fn delta(&self, now: NaiveDateTime) -> Option<Duration> {
        let start = self.start_time?;
        Some(self.end_time.unwrap_or(now) - start)
    }

    /// Category name, treating a blank name as no category.
    pub fn category_name(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Returns a copy of the fact stripped of its stored identity, keeping
    /// only what a caller would submit.
    #[must_use]
    pub fn to_unsaved(&self) -> Self {
        Self {
            id: None,
            activity_id: None,
            ..self.clone()
        }
    }
}

/// Truncates a timestamp to whole seconds, the precision facts are stored at.
pub fn truncate_to_seconds(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp.with_nanosecond(0).unwrap_or(timestamp)
}

/// An activity: a named, optionally categorized classification of facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    /// Category name, empty string for uncategorized activities.
    #[serde(default)]
    pub category: String,
    /// Soft-delete flag. Deleted activities can be resurrected.
    #[serde(default)]
    pub deleted: bool,
}

/// An activity suggestion: name plus category name, most recently used first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySuggestion {
    pub name: String,
    /// Category name, empty string for uncategorized activities.
    pub category: String,
}

/// A named grouping of activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// A label attachable to facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    /// Whether the tag is offered in suggestion lists.
    pub autocomplete: bool,
    /// Soft-delete flag. Deleted tags are resurrected when referenced again.
    #[serde(default)]
    pub deleted: bool,
}

/// Outcome of toggling tracking on the most recent fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "fact_id", rename_all = "snake_case")]
pub enum TrackingToggle {
    /// The most recent fact was ongoing and has been closed.
    Stopped(FactId),
    /// A new ongoing fact was started as a copy of the most recent one.
    Restarted(FactId),
    /// There was no fact to stop or restart.
    Idle,
}

//! The record store capability.
//!
//! A [`RecordStore`] persists facts, activities, categories and tags. The
//! storage facade drives it and turns its [`Changes`] into notifications;
//! implementations only record what they touched.

use std::error::Error as StdError;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

use crate::fact::{Activity, ActivitySuggestion, Category, Fact, Tag, TrackingToggle};
use crate::range::Range;
use crate::search::SearchPredicate;
use crate::types::{ActivityId, CategoryId, FactId, TagId, ValidationError};

/// Errors raised by a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A business rule rejected the request.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The referenced record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The backend failed to read or write.
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Which record kinds a store mutated since the last [`RecordStore::take_changes`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    pub tags: bool,
    pub facts: bool,
    pub activities: bool,
}

impl Changes {
    pub const NONE: Self = Self {
        tags: false,
        facts: false,
        activities: false,
    };

    pub const fn is_empty(&self) -> bool {
        !(self.tags || self.facts || self.activities)
    }

    pub const fn merge(&mut self, other: Self) {
        self.tags |= other.tags;
        self.facts |= other.facts;
        self.activities |= other.activities;
    }
}

/// Persistence for facts and their classification records.
///
/// All methods are synchronous. Mutations that succeed must be visible to
/// every later read, and must be reported by the next call to
/// [`take_changes`](Self::take_changes). A failed mutation changes nothing.
pub trait RecordStore: Send {
    /// Facts of the hamster day containing `now`, ordered by start time.
    fn get_todays_facts(
        &mut self,
        now: NaiveDateTime,
        day_start: NaiveTime,
    ) -> Result<Vec<Fact>, StoreError> {
        self.get_facts(Range::today(now, day_start), &SearchPredicate::match_all())
    }

    /// Facts intersecting `range` that match `search`, ordered by start time.
    fn get_facts(&mut self, range: Range, search: &SearchPredicate)
    -> Result<Vec<Fact>, StoreError>;

    fn get_fact(&mut self, id: FactId) -> Result<Option<Fact>, StoreError>;

    /// Live activities whose name contains `search`, most recently used first.
    fn get_activities(&mut self, search: &str) -> Result<Vec<ActivitySuggestion>, StoreError>;

    fn get_categories(&mut self) -> Result<Vec<Category>, StoreError>;

    /// Live tags, optionally only those offered for autocompletion.
    fn get_tags(&mut self, only_autocomplete: bool) -> Result<Vec<Tag>, StoreError>;

    /// Resolves tag names, creating missing tags and resurrecting deleted ones.
    fn get_tag_ids(&mut self, names: &[String]) -> Result<Vec<Tag>, StoreError>;

    /// Makes exactly `names` the autocomplete tag set.
    fn update_autocomplete_tags(&mut self, names: &[String]) -> Result<(), StoreError>;

    /// Soft-deletes a tag. Facts keep their reference to it.
    fn remove_tag(&mut self, id: TagId) -> Result<(), StoreError>;

    /// Validates `fact` against the stored facts without writing anything.
    fn check_fact(&mut self, fact: &Fact, default_day: Option<NaiveDate>)
    -> Result<(), StoreError>;

    /// Persists a new fact and returns its id.
    ///
    /// A `temporary` fact creates its activity already soft-deleted, so it
    /// stays out of suggestions until it is used again.
    fn add_fact(&mut self, fact: &Fact, temporary: bool) -> Result<FactId, StoreError>;

    fn remove_fact(&mut self, id: FactId) -> Result<(), StoreError>;

    /// Replaces the fact `id` and returns the replacement's fresh id.
    fn update_fact(&mut self, id: FactId, fact: &Fact, temporary: bool)
    -> Result<FactId, StoreError>;

    /// Closes the ongoing fact at `end`. Returns the closed fact, if any.
    fn stop_tracking(&mut self, end: NaiveDateTime) -> Result<Option<FactId>, StoreError>;

    /// Stops the ongoing fact, or restarts the most recent one at `now`.
    fn stop_or_restart_tracking(&mut self, now: NaiveDateTime)
    -> Result<TrackingToggle, StoreError>;

    /// Live activities of a category. `None` lists uncategorized activities.
    fn get_category_activities(
        &mut self,
        category: Option<CategoryId>,
    ) -> Result<Vec<Activity>, StoreError>;

    fn get_category_id(&mut self, name: &str) -> Result<Option<CategoryId>, StoreError>;

    /// Looks up an activity by name within a category (`None` for none).
    ///
    /// A soft-deleted match is returned as is, or undeleted first when
    /// `resurrect` is set.
    fn get_activity_by_name(
        &mut self,
        name: &str,
        category: Option<CategoryId>,
        resurrect: bool,
    ) -> Result<Option<Activity>, StoreError>;

    /// Returns the existing activity with this name and category, or creates it.
    fn add_activity(
        &mut self,
        name: &str,
        category: Option<CategoryId>,
    ) -> Result<ActivityId, StoreError>;

    fn update_activity(
        &mut self,
        id: ActivityId,
        name: &str,
        category: Option<CategoryId>,
    ) -> Result<(), StoreError>;

    /// Removes an activity: soft-deleted while facts still reference it,
    /// hard-deleted otherwise.
    fn remove_activity(&mut self, id: ActivityId) -> Result<(), StoreError>;

    /// Moves an activity to another category.
    ///
    /// Returns `true` when the target already held an activity of the same
    /// name and the two were merged.
    fn change_category(
        &mut self,
        id: ActivityId,
        category: Option<CategoryId>,
    ) -> Result<bool, StoreError>;

    /// Returns the existing category with this name, or creates it.
    fn add_category(&mut self, name: &str) -> Result<CategoryId, StoreError>;

    fn update_category(&mut self, id: CategoryId, name: &str) -> Result<(), StoreError>;

    /// Deletes a category. Its activities become uncategorized.
    fn remove_category(&mut self, id: CategoryId) -> Result<(), StoreError>;

    /// Drains the record kinds mutated since the last call.
    fn take_changes(&mut self) -> Changes;
}

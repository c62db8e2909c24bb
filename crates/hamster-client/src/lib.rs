//! The storage facade.
//!
//! [`Storage`] is the single entry point for reading and changing facts,
//! activities, categories and tags. It owns a [`RecordStore`] behind a mutex,
//! reads the hamster day start from a [`ConfigStore`], and publishes change
//! notifications on its [`Hub`] once a mutation has committed and the lock has
//! been released. Subscribers may therefore call back into the facade.

use std::error::Error as StdError;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

use hamster_core::search;
use hamster_core::{
    Activity, ActivityId, ActivitySuggestion, Category, CategoryId, Changes, ConfigStore, Fact,
    FactId, HandlerError, Hub, Range, RecordStore, StoreError, SubscriptionId, Tag, TagId, Topic,
    TrackingToggle, ValidationError, truncate_to_seconds,
};

/// Errors returned by the facade.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A business rule rejected the request. Never retried.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The request itself was malformed.
    #[error("{0}")]
    Precondition(String),

    /// The referenced record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The record store failed.
    #[error("storage failure: {0}")]
    Persistence(#[source] Box<dyn StdError + Send + Sync>),
}

impl From<StoreError> for StorageError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(err) => Self::Validation(err),
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Backend(source) => Self::Persistence(source),
        }
    }
}

/// Facade behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageOptions {
    /// Fill in "now" for facts added without a start time.
    ///
    /// Deprecated behavior, kept for older callers. When disabled, such facts
    /// are rejected with [`ValidationError::MissingStartTime`].
    pub implicit_start: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            implicit_start: true,
        }
    }
}

/// The storage facade.
pub struct Storage<S> {
    store: Mutex<S>,
    hub: Hub,
    config: Arc<ConfigStore>,
    options: StorageOptions,
}

impl<S: RecordStore> Storage<S> {
    pub fn new(store: S, config: Arc<ConfigStore>) -> Self {
        Self::with_options(store, config, StorageOptions::default())
    }

    pub fn with_options(store: S, config: Arc<ConfigStore>, options: StorageOptions) -> Self {
        Self {
            store: Mutex::new(store),
            hub: Hub::new(),
            config,
            options,
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub const fn options(&self) -> StorageOptions {
        self.options
    }

    pub fn day_start(&self) -> NaiveTime {
        self.config.day_start()
    }

    // Notifications

    /// Subscribes `handler` to `topic`.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.hub.subscribe(topic, handler)
    }

    pub fn unsubscribe(&self, topic: Topic, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(topic, id)
    }

    /// Asks any attached presentation layer to show or hide itself.
    pub fn toggle(&self) {
        self.hub.publish(Topic::ToggleCalled);
    }

    // Facts

    /// Facts of the current hamster day.
    pub fn get_todays_facts(&self) -> Result<Vec<Fact>, StorageError> {
        self.get_todays_facts_at(now())
    }

    fn get_todays_facts_at(&self, now: NaiveDateTime) -> Result<Vec<Fact>, StorageError> {
        let day_start = self.day_start();
        self.with_store(|store| store.get_todays_facts(now, day_start))
    }

    /// Facts intersecting `range` that match `search_terms`.
    ///
    /// An open-ended range stops at now. See [`hamster_core::search`] for the
    /// query syntax.
    pub fn get_facts(&self, range: Range, search_terms: &str) -> Result<Vec<Fact>, StorageError> {
        self.get_facts_at(range, search_terms, now())
    }

    fn get_facts_at(
        &self,
        range: Range,
        search_terms: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<Fact>, StorageError> {
        let range = range.bounded(now);
        let predicate = search::parse(search_terms);
        self.with_store(|store| store.get_facts(range, &predicate))
    }

    pub fn get_fact(&self, id: FactId) -> Result<Option<Fact>, StorageError> {
        self.with_store(|store| store.get_fact(id))
    }

    /// Checks `fact` against the validation rules and stored facts.
    ///
    /// Nothing is written. `default_day` only shortens overlap messages.
    pub fn check_fact(
        &self,
        fact: &Fact,
        default_day: Option<NaiveDate>,
    ) -> Result<(), StorageError> {
        if fact.start_time.is_none() {
            return Err(ValidationError::MissingStartTime.into());
        }
        self.with_store(|store| store.check_fact(fact, default_day))
    }

    /// Stores a new fact and returns its id.
    ///
    /// Missing categories, activities and tags are created. An ongoing fact
    /// closes any ongoing fact that started before it.
    pub fn add_fact(&self, fact: &Fact, temporary_activity: bool) -> Result<FactId, StorageError> {
        self.add_fact_at(fact, temporary_activity, now())
    }

    fn add_fact_at(
        &self,
        fact: &Fact,
        temporary_activity: bool,
        now: NaiveDateTime,
    ) -> Result<FactId, StorageError> {
        let fact = self.prepare_fact(fact, now)?;
        let id = self.with_store(|store| store.add_fact(&fact, temporary_activity))?;
        tracing::info!(%id, activity = %fact.activity, "added fact");
        Ok(id)
    }

    /// Replaces fact `id` with `fact`.
    ///
    /// Fact ids do not survive an update: the returned id is new and `id`
    /// no longer resolves. Callers holding `id` must switch to the result.
    pub fn update_fact(
        &self,
        id: FactId,
        fact: &Fact,
        temporary_activity: bool,
    ) -> Result<FactId, StorageError> {
        self.update_fact_at(id, fact, temporary_activity, now())
    }

    fn update_fact_at(
        &self,
        id: FactId,
        fact: &Fact,
        temporary_activity: bool,
        now: NaiveDateTime,
    ) -> Result<FactId, StorageError> {
        let fact = self.prepare_fact(fact, now)?;
        let new_id = self.with_store(|store| store.update_fact(id, &fact, temporary_activity))?;
        tracing::info!(old = %id, new = %new_id, "updated fact");
        Ok(new_id)
    }

    pub fn remove_fact(&self, id: FactId) -> Result<(), StorageError> {
        self.with_store(|store| store.remove_fact(id))?;
        tracing::info!(%id, "removed fact");
        Ok(())
    }

    /// Stops the ongoing fact at `end_time`, or now.
    pub fn stop_tracking(
        &self,
        end_time: Option<NaiveDateTime>,
    ) -> Result<Option<FactId>, StorageError> {
        let end = end_time.map_or_else(now, truncate_to_seconds);
        self.with_store(|store| store.stop_tracking(end))
    }

    /// Stops the ongoing fact, or restarts the most recent one.
    pub fn stop_or_restart_tracking(&self) -> Result<TrackingToggle, StorageError> {
        self.stop_or_restart_tracking_at(now())
    }

    fn stop_or_restart_tracking_at(
        &self,
        now: NaiveDateTime,
    ) -> Result<TrackingToggle, StorageError> {
        let toggle = self.with_store(|store| store.stop_or_restart_tracking(now))?;
        tracing::debug!(?toggle, "toggled tracking");
        Ok(toggle)
    }

    // Tags

    pub fn get_tags(&self, only_autocomplete: bool) -> Result<Vec<Tag>, StorageError> {
        self.with_store(|store| store.get_tags(only_autocomplete))
    }

    /// Resolves labels to tags in input order, creating missing ones and
    /// resurrecting deleted ones.
    pub fn get_tag_ids(&self, labels: &[String]) -> Result<Vec<Tag>, StorageError> {
        self.with_store(|store| store.get_tag_ids(labels))
    }

    /// Makes exactly `labels` the autocomplete tags.
    pub fn update_autocomplete_tags(&self, labels: &[String]) -> Result<(), StorageError> {
        self.with_store(|store| store.update_autocomplete_tags(labels))
    }

    pub fn remove_tag(&self, id: TagId) -> Result<(), StorageError> {
        self.with_store(|store| store.remove_tag(id))
    }

    // Activities and categories

    /// Activity suggestions matching `search`, most recently used first.
    pub fn get_activities(&self, search: &str) -> Result<Vec<ActivitySuggestion>, StorageError> {
        self.with_store(|store| store.get_activities(search))
    }

    pub fn get_categories(&self) -> Result<Vec<Category>, StorageError> {
        self.with_store(RecordStore::get_categories)
    }

    /// Activities of a category; `None` lists the uncategorized ones.
    pub fn get_category_activities(
        &self,
        category: Option<CategoryId>,
    ) -> Result<Vec<Activity>, StorageError> {
        self.with_store(|store| store.get_category_activities(category))
    }

    pub fn get_category_id(&self, name: &str) -> Result<Option<CategoryId>, StorageError> {
        self.with_store(|store| store.get_category_id(name))
    }

    /// Finds an activity by name; `None` searches the uncategorized ones.
    ///
    /// A soft-deleted match is resurrected unless `resurrect` is `false`.
    pub fn get_activity_by_name(
        &self,
        name: &str,
        category: Option<CategoryId>,
        resurrect: bool,
    ) -> Result<Option<Activity>, StorageError> {
        self.with_store(|store| store.get_activity_by_name(name, category, resurrect))
    }

    pub fn add_activity(
        &self,
        name: &str,
        category: Option<CategoryId>,
    ) -> Result<ActivityId, StorageError> {
        self.with_store(|store| store.add_activity(name, category))
    }

    pub fn update_activity(
        &self,
        id: ActivityId,
        name: &str,
        category: Option<CategoryId>,
    ) -> Result<(), StorageError> {
        self.with_store(|store| store.update_activity(id, name, category))
    }

    pub fn remove_activity(&self, id: ActivityId) -> Result<(), StorageError> {
        self.with_store(|store| store.remove_activity(id))
    }

    /// Moves an activity to another category. Returns `true` if it was
    /// merged into a same-named activity already there.
    pub fn change_category(
        &self,
        id: ActivityId,
        category: Option<CategoryId>,
    ) -> Result<bool, StorageError> {
        self.with_store(|store| store.change_category(id, category))
    }

    pub fn add_category(&self, name: &str) -> Result<CategoryId, StorageError> {
        self.with_store(|store| store.add_category(name))
    }

    pub fn update_category(&self, id: CategoryId, name: &str) -> Result<(), StorageError> {
        self.with_store(|store| store.update_category(id, name))
    }

    pub fn remove_category(&self, id: CategoryId) -> Result<(), StorageError> {
        self.with_store(|store| store.remove_category(id))
    }

    fn prepare_fact(&self, fact: &Fact, now: NaiveDateTime) -> Result<Fact, StorageError> {
        if fact.activity.trim().is_empty() {
            return Err(StorageError::Precondition("missing activity".to_string()));
        }
        let mut fact = fact.to_unsaved();
        fact.start_time = match fact.start_time {
            Some(start) => Some(truncate_to_seconds(start)),
            None if self.options.implicit_start => {
                tracing::info!(
                    activity = %fact.activity,
                    "fact without start time, starting it now; this is deprecated"
                );
                Some(now)
            }
            None => return Err(ValidationError::MissingStartTime.into()),
        };
        fact.end_time = fact.end_time.map(truncate_to_seconds);
        Ok(fact)
    }

    /// Runs `op` under the store lock, then publishes what it changed.
    fn with_store<T>(
        &self,
        op: impl FnOnce(&mut S) -> Result<T, StoreError>,
    ) -> Result<T, StorageError> {
        let (result, changes) = {
            let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
            let result = op(&mut *store);
            (result, store.take_changes())
        };
        self.publish(changes);
        result.map_err(StorageError::from)
    }

    fn publish(&self, changes: Changes) {
        if changes.tags {
            self.hub.publish(Topic::TagsChanged);
        }
        if changes.activities {
            self.hub.publish(Topic::ActivitiesChanged);
        }
        if changes.facts {
            self.hub.publish(Topic::FactsChanged);
        }
    }
}

fn now() -> NaiveDateTime {
    truncate_to_seconds(Local::now().naive_local())
}

//! Core domain logic for the hamster time tracker.
//!
//! This crate contains the fundamental types and rules for:
//! - Facts: recorded intervals of activity, with their activities, categories and tags
//! - Validation: the business rules a fact must satisfy before it is stored
//! - Search: the comma/whitespace query language over facts
//! - Notifications: the change topics observers subscribe to
//! - Settings: persisted preferences, including the hamster day start
//!
//! Persistence lives behind the [`RecordStore`] trait.

pub mod fact;
pub mod range;
pub mod search;
pub mod settings;
pub mod signals;
pub mod store;
pub mod types;
pub mod validate;

pub use fact::{
    Activity, ActivitySuggestion, Category, Fact, Tag, TrackingToggle, truncate_to_seconds,
};
pub use range::{Range, hamster_day};
pub use search::SearchPredicate;
pub use settings::{ConfigStore, SettingChange, SettingValue};
pub use signals::{HandlerError, Hub, Signal, SubscriptionId, Topic};
pub use store::{Changes, RecordStore, StoreError};
pub use types::{ActivityId, CategoryId, FactId, TagId, ValidationError};
pub use validate::{check_overlap, validate_fact};

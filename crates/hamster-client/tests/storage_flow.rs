use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use hamster_client::{Storage, StorageError, StorageOptions};
use hamster_core::settings::{DAY_START_MINUTES, LAST_REPORT_FOLDER};
use hamster_core::{ConfigStore, Fact, FactId, Range, SettingValue, Topic, ValidationError};
use hamster_db::Database;
use tempfile::TempDir;

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 14)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn whole_day() -> Range {
    Range::from_start_end(at(0, 0), Some(at(23, 59)))
}

fn setup() -> (TempDir, Arc<Storage<Database>>) {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(ConfigStore::open_at(dir.path().join("settings.json")));
    let db = Database::open(&dir.path().join("hamster.db")).unwrap();
    (dir, Arc::new(Storage::new(db, config)))
}

fn record(storage: &Storage<Database>, topic: Topic, log: &Arc<Mutex<Vec<Topic>>>) {
    let log = Arc::clone(log);
    storage.subscribe(topic, move || {
        log.lock().unwrap().push(topic);
        Ok(())
    });
}

#[test]
fn test_implicit_start_is_now_in_whole_seconds() {
    let (_dir, storage) = setup();

    let before = Local::now().naive_local().with_nanosecond(0).unwrap();
    let id = storage.add_fact(&Fact::new("Coding"), false).unwrap();
    let after = Local::now().naive_local();

    let start = storage.get_fact(id).unwrap().unwrap().start_time.unwrap();
    assert_eq!(start.nanosecond(), 0);
    assert!(before <= start && start <= after);
}

#[test]
fn test_missing_start_fails_when_implicit_start_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(ConfigStore::open_at(dir.path().join("settings.json")));
    let storage = Storage::with_options(
        Database::open_in_memory().unwrap(),
        config,
        StorageOptions {
            implicit_start: false,
        },
    );

    let err = storage.add_fact(&Fact::new("Coding"), false).unwrap_err();
    assert!(matches!(
        err,
        StorageError::Validation(ValidationError::MissingStartTime)
    ));
    assert!(storage.get_facts(whole_day(), "").unwrap().is_empty());
}

#[test]
fn test_blank_activity_is_a_precondition_failure() {
    let (_dir, storage) = setup();
    let err = storage
        .add_fact(&Fact::new(" ").with_start(at(9, 0)), false)
        .unwrap_err();
    assert!(matches!(err, StorageError::Precondition(ref reason) if reason == "missing activity"));
}

#[test]
fn test_check_fact_requires_start_time() {
    let (_dir, storage) = setup();
    let err = storage.check_fact(&Fact::new("Coding"), None).unwrap_err();
    assert_eq!(err.to_string(), "missing start time");
}

#[test]
fn test_check_fact_surfaces_overlap_unchanged() {
    let (_dir, storage) = setup();
    storage
        .add_fact(&Fact::new("Meeting").with_start(at(9, 0)).with_end(at(10, 0)), false)
        .unwrap();

    let clash = Fact::new("Coding").with_start(at(9, 30)).with_end(at(11, 0));
    let day = NaiveDate::from_ymd_opt(2025, 3, 14);
    let err = storage.check_fact(&clash, day).unwrap_err();
    assert!(matches!(
        err,
        StorageError::Validation(ValidationError::Overlap { .. })
    ));
    assert!(err.to_string().starts_with("overlaps with 'Meeting'"));
    assert!(storage.check_fact(&clash, None).is_err());
}

#[test]
fn test_update_fact_hands_out_fresh_id() {
    let (_dir, storage) = setup();
    let id = storage
        .add_fact(
            &Fact::new("Coding").with_start(at(9, 0)).with_end(at(10, 0)),
            false,
        )
        .unwrap();

    let edited = Fact::new("Review")
        .with_category("Work")
        .with_start(at(9, 0))
        .with_end(at(10, 15))
        .with_description("edited")
        .with_tags(["rust"]);
    let new_id = storage.update_fact(id, &edited, false).unwrap();

    assert_ne!(new_id, id);
    assert!(storage.get_fact(id).unwrap().is_none());
    let stored = storage.get_fact(new_id).unwrap().unwrap();
    assert_eq!(stored.to_unsaved(), edited);

    let missing = FactId::new(999).unwrap();
    assert!(matches!(
        storage.update_fact(missing, &edited, false),
        Err(StorageError::NotFound(_))
    ));
}

#[test]
fn test_tag_ids_are_idempotent_and_resurrect() {
    let (_dir, storage) = setup();
    let labels = vec!["x".to_string()];

    let first = storage.get_tag_ids(&labels).unwrap();
    let second = storage.get_tag_ids(&labels).unwrap();
    assert_eq!(first[0].id, second[0].id);

    storage.remove_tag(first[0].id).unwrap();
    assert!(storage.get_tags(false).unwrap().is_empty());

    let log = Arc::new(Mutex::new(Vec::new()));
    record(&storage, Topic::TagsChanged, &log);
    let revived = storage.get_tag_ids(&labels).unwrap();
    assert_eq!(revived[0].id, first[0].id);
    assert!(!revived[0].deleted);
    assert_eq!(storage.get_tags(false).unwrap().len(), 1);
    assert_eq!(*log.lock().unwrap(), vec![Topic::TagsChanged]);

    storage.get_tag_ids(&labels).unwrap();
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn test_search_terms_combine_and_or() {
    let (_dir, storage) = setup();
    storage
        .add_fact(
            &Fact::new("Planning")
                .with_category("Work")
                .with_start(at(9, 0))
                .with_end(at(10, 0))
                .with_description("Personal goals"),
            false,
        )
        .unwrap();
    storage
        .add_fact(
            &Fact::new("Planning")
                .with_category("Work")
                .with_start(at(10, 0))
                .with_end(at(11, 0)),
            false,
        )
        .unwrap();
    storage
        .add_fact(
            &Fact::new("Email")
                .with_start(at(11, 0))
                .with_end(at(11, 30))
                .with_tags(["Urgent"]),
            false,
        )
        .unwrap();

    let found: Vec<_> = storage
        .get_facts(whole_day(), "work personal, urgent")
        .unwrap()
        .into_iter()
        .map(|fact| fact.start_time)
        .collect();
    assert_eq!(found, vec![Some(at(9, 0)), Some(at(11, 0))]);
    assert_eq!(storage.get_facts(whole_day(), "").unwrap().len(), 3);
}

#[test]
fn test_facts_changed_fires_once_after_fact_is_visible() {
    let (_dir, storage) = setup();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let weak = Arc::downgrade(&storage);
        let seen = Arc::clone(&seen);
        let calls = Arc::clone(&calls);
        storage.subscribe(Topic::FactsChanged, move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let storage = weak.upgrade().ok_or("storage dropped")?;
            let activities: Vec<String> = storage
                .get_facts(whole_day(), "")?
                .into_iter()
                .map(|fact| fact.activity)
                .collect();
            seen.lock().unwrap().push(activities);
            Ok(())
        });
    }

    let id = storage
        .add_fact(&Fact::new("Coding").with_start(at(9, 0)).with_end(at(10, 0)), false)
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock().unwrap(), vec![vec!["Coding".to_string()]]);
    assert!(storage.get_fact(id).unwrap().is_some());
}

#[test]
fn test_notifications_follow_tags_activities_facts_order() {
    let (_dir, storage) = setup();
    let log = Arc::new(Mutex::new(Vec::new()));
    for topic in [Topic::FactsChanged, Topic::ActivitiesChanged, Topic::TagsChanged] {
        record(&storage, topic, &log);
    }

    storage
        .add_fact(
            &Fact::new("Coding")
                .with_category("Work")
                .with_start(at(9, 0))
                .with_end(at(10, 0))
                .with_tags(["rust"]),
            false,
        )
        .unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec![Topic::TagsChanged, Topic::ActivitiesChanged, Topic::FactsChanged]
    );

    log.lock().unwrap().clear();
    storage
        .add_fact(
            &Fact::new("Coding")
                .with_category("Work")
                .with_start(at(10, 0))
                .with_end(at(11, 0))
                .with_tags(["rust"]),
            false,
        )
        .unwrap();
    assert_eq!(*log.lock().unwrap(), vec![Topic::FactsChanged]);
}

#[test]
fn test_failed_mutation_publishes_nothing() {
    let (_dir, storage) = setup();
    storage
        .add_fact(&Fact::new("Meeting").with_start(at(9, 0)).with_end(at(10, 0)), false)
        .unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    for topic in Topic::ALL {
        record(&storage, topic, &log);
    }

    let result = storage.add_fact(
        &Fact::new("Coding")
            .with_category("New")
            .with_start(at(9, 30))
            .with_end(at(9, 45)),
        false,
    );
    assert!(result.is_err());
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_failing_subscriber_does_not_block_others() {
    let (_dir, storage) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    storage.subscribe(Topic::FactsChanged, || Err("observer failed".into()));
    let counter = Arc::clone(&calls);
    storage.subscribe(Topic::FactsChanged, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    storage
        .add_fact(&Fact::new("Coding").with_start(at(9, 0)).with_end(at(10, 0)), false)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_toggle_publishes_toggle_called_only() {
    let (_dir, storage) = setup();
    let log = Arc::new(Mutex::new(Vec::new()));
    for topic in Topic::ALL {
        record(&storage, topic, &log);
    }

    storage.toggle();
    assert_eq!(*log.lock().unwrap(), vec![Topic::ToggleCalled]);
}

#[test]
fn test_uncategorized_activities_listed_with_none() {
    let (_dir, storage) = setup();
    let work = storage.add_category("Work").unwrap();
    storage.add_activity("Coding", Some(work)).unwrap();
    storage.add_activity("Reading", None).unwrap();
    storage
        .add_fact(&Fact::new("Walking").with_start(at(9, 0)).with_end(at(9, 30)), false)
        .unwrap();

    let names: Vec<_> = storage
        .get_category_activities(None)
        .unwrap()
        .into_iter()
        .map(|activity| activity.name)
        .collect();
    assert_eq!(names, vec!["Reading", "Walking"]);
    assert!(
        storage
            .get_category_activities(None)
            .unwrap()
            .iter()
            .all(|activity| activity.category_id.is_none())
    );
}

#[test]
fn test_temporary_activity_is_hidden_until_reused() {
    let (_dir, storage) = setup();
    storage
        .add_fact(&Fact::new("Fire drill").with_start(at(9, 0)).with_end(at(9, 15)), true)
        .unwrap();
    assert!(storage.get_activities("").unwrap().is_empty());

    let found = storage
        .get_activity_by_name("fire drill", None, false)
        .unwrap()
        .unwrap();
    assert!(found.deleted);
    let revived = storage
        .get_activity_by_name("fire drill", None, true)
        .unwrap()
        .unwrap();
    assert!(!revived.deleted);
    assert_eq!(storage.get_activities("fire").unwrap().len(), 1);
}

#[test]
fn test_stop_tracking_defaults_to_now() {
    let (_dir, storage) = setup();
    let started = Local::now().naive_local().with_nanosecond(0).unwrap() - chrono::Duration::hours(1);
    let id = storage
        .add_fact(&Fact::new("Coding").with_start(started), false)
        .unwrap();

    assert_eq!(storage.stop_tracking(None).unwrap(), Some(id));
    let fact = storage.get_fact(id).unwrap().unwrap();
    assert!(fact.end_time.is_some_and(|end| end > started));
    assert_eq!(storage.stop_tracking(None).unwrap(), None);
}

#[test]
fn test_day_start_setting_round_trips() {
    let (dir, storage) = setup();
    assert_eq!(
        storage.config().get(DAY_START_MINUTES),
        Some(SettingValue::Integer(330))
    );
    assert_eq!(
        storage.config().get(LAST_REPORT_FOLDER),
        Some(SettingValue::Text(String::new()))
    );

    assert!(storage.config().set(DAY_START_MINUTES, 270_i64));
    assert_eq!(
        storage.day_start(),
        chrono::NaiveTime::from_hms_opt(4, 30, 0).unwrap()
    );

    let reopened = ConfigStore::open_at(dir.path().join("settings.json"));
    assert_eq!(reopened.get(DAY_START_MINUTES), Some(SettingValue::Integer(270)));
}

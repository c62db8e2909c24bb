//! SQLite record store for the hamster time tracker.
//!
//! Implements [`RecordStore`] on top of `rusqlite`.
//!
//! # Thread Safety
//!
//! [`Database`] wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The storage facade keeps it behind a `Mutex`, which serializes access.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Fact times are local wall-clock times stored as TEXT in
//! `YYYY-MM-DD HH:MM:SS` form, so lexicographic ordering matches chronological
//! ordering.
//!
//! ## Names
//!
//! Categories, activities and tags keep the name as entered in `name` and a
//! lower-cased copy in `search_name`. Uniqueness and lookups go through
//! `search_name`, which makes them case-insensitive.
//!
//! ## Identifiers
//!
//! `facts.id` is `AUTOINCREMENT`: updating a fact deletes the row and inserts
//! a new one, and the old id is never handed out again.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use hamster_core::validate::{check_overlap, supersedes, validate_fact};
use hamster_core::{
    Activity, ActivityId, ActivitySuggestion, Category, CategoryId, Changes, Fact, FactId, Range,
    RecordStore, SearchPredicate, StoreError, Tag, TagId, TrackingToggle, ValidationError,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const FACT_SELECT: &str = "
    SELECT f.id, f.activity_id, a.name, c.name, f.start_time, f.end_time, f.description
    FROM facts f
    JOIN activities a ON a.id = f.activity_id
    LEFT JOIN categories c ON c.id = a.category_id
";

const ACTIVITY_SELECT: &str = "
    SELECT a.id, a.name, a.category_id, COALESCE(c.name, ''), a.deleted
    FROM activities a
    LEFT JOIN categories c ON c.id = a.category_id
";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored fact timestamp.
    #[error("invalid timestamp for fact {fact_id}: {timestamp}")]
    TimestampParse {
        fact_id: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A business rule rejected the write.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Validation(err) => Self::Validation(err),
            DbError::NotFound { kind, id } => Self::NotFound(format!("{kind} {id}")),
            other => Self::backend(other),
        }
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
    pending: Changes,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn,
            pending: Changes::NONE,
        };
        db.init()?;
        tracing::debug!(path = %path.display(), "opened database");
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            pending: Changes::NONE,
        };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                search_name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                search_name TEXT NOT NULL,
                category_id INTEGER,
                deleted INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_activities_search ON activities(search_name, category_id);

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                search_name TEXT NOT NULL UNIQUE,
                autocomplete INTEGER NOT NULL DEFAULT 1,
                deleted INTEGER NOT NULL DEFAULT 0
            );

            -- start_time/end_time: local time, 'YYYY-MM-DD HH:MM:SS'
            -- end_time NULL: the fact is ongoing
            CREATE TABLE IF NOT EXISTS facts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                activity_id INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                description TEXT NOT NULL DEFAULT '',
                FOREIGN KEY (activity_id) REFERENCES activities(id)
            );

            CREATE INDEX IF NOT EXISTS idx_facts_start ON facts(start_time);
            CREATE INDEX IF NOT EXISTS idx_facts_end ON facts(end_time);
            CREATE INDEX IF NOT EXISTS idx_facts_activity ON facts(activity_id);

            CREATE TABLE IF NOT EXISTS fact_tags (
                fact_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (fact_id, tag_id),
                FOREIGN KEY (fact_id) REFERENCES facts(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_fact_tags_tag ON fact_tags(tag_id);
            ",
        )?;
        Ok(())
    }

    /// Runs `op` in a transaction and records its changes once committed.
    fn write<T>(
        &mut self,
        op: impl FnOnce(&Connection, &mut Changes) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let tx = self.conn.transaction()?;
        let mut changes = Changes::NONE;
        let value = op(&*tx, &mut changes)?;
        tx.commit()?;
        self.pending.merge(changes);
        Ok(value)
    }
}

impl RecordStore for Database {
    fn get_facts(
        &mut self,
        range: Range,
        search: &SearchPredicate,
    ) -> Result<Vec<Fact>, StoreError> {
        let end = range.end.map(format_timestamp);
        let facts = query_facts(
            &self.conn,
            "WHERE (?1 IS NULL OR f.start_time < ?1)
               AND (f.end_time IS NULL OR f.end_time >= ?2)
             ORDER BY f.start_time ASC, f.id ASC",
            params![end, format_timestamp(range.start)],
        )?;
        Ok(facts
            .into_iter()
            .filter(|fact| range.contains_fact(fact) && search.matches(fact))
            .collect())
    }

    fn get_fact(&mut self, id: FactId) -> Result<Option<Fact>, StoreError> {
        Ok(fetch_fact(&self.conn, id)?)
    }

    fn get_activities(&mut self, search: &str) -> Result<Vec<ActivitySuggestion>, StoreError> {
        let needle = search.trim().to_lowercase();
        let mut stmt = self.conn.prepare(
            "
            SELECT a.name, a.search_name, COALESCE(c.name, ''), MAX(f.start_time) AS last_used
            FROM activities a
            LEFT JOIN categories c ON c.id = a.category_id
            LEFT JOIN facts f ON f.activity_id = a.id
            WHERE a.deleted = 0
            GROUP BY a.id
            ORDER BY last_used IS NULL, last_used DESC, a.search_name ASC
            ",
        )
        .map_err(DbError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(DbError::from)?;
        let mut suggestions = Vec::new();
        for row in rows {
            let (name, search_name, category) = row.map_err(DbError::from)?;
            if search_name.contains(&needle) {
                suggestions.push(ActivitySuggestion { name, category });
            }
        }
        Ok(suggestions)
    }

    fn get_categories(&mut self) -> Result<Vec<Category>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM categories ORDER BY search_name ASC")
            .map_err(DbError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: id_column(row, 0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(DbError::from)?;
        let mut categories = Vec::new();
        for row in rows {
            categories.push(row.map_err(DbError::from)?);
        }
        Ok(categories)
    }

    fn get_tags(&mut self, only_autocomplete: bool) -> Result<Vec<Tag>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, name, autocomplete, deleted
                FROM tags
                WHERE deleted = 0 AND (?1 = 0 OR autocomplete = 1)
                ORDER BY search_name ASC
                ",
            )
            .map_err(DbError::from)?;
        let rows = stmt
            .query_map(params![only_autocomplete], tag_from_row)
            .map_err(DbError::from)?;
        let mut tags = Vec::new();
        for row in rows {
            tags.push(row.map_err(DbError::from)?);
        }
        Ok(tags)
    }

    fn get_tag_ids(&mut self, names: &[String]) -> Result<Vec<Tag>, StoreError> {
        Ok(self.write(|conn, changes| resolve_tags(conn, names, changes))?)
    }

    fn update_autocomplete_tags(&mut self, names: &[String]) -> Result<(), StoreError> {
        Ok(self.write(|conn, changes| {
            let tags = resolve_tags(conn, names, changes)?;
            conn.execute("UPDATE tags SET autocomplete = 0", [])?;
            let mut stmt = conn.prepare("UPDATE tags SET autocomplete = 1 WHERE id = ?1")?;
            for tag in &tags {
                stmt.execute(params![tag.id.get()])?;
            }
            changes.tags = true;
            tracing::debug!(count = tags.len(), "replaced autocomplete tags");
            Ok(())
        })?)
    }

    fn remove_tag(&mut self, id: TagId) -> Result<(), StoreError> {
        Ok(self.write(|conn, changes| {
            let updated = conn.execute(
                "UPDATE tags SET deleted = 1 WHERE id = ?1",
                params![id.get()],
            )?;
            if updated == 0 {
                return Err(not_found("tag", id.get()));
            }
            changes.tags = true;
            Ok(())
        })?)
    }

    fn check_fact(
        &mut self,
        fact: &Fact,
        default_day: Option<NaiveDate>,
    ) -> Result<(), StoreError> {
        check_against_stored(&self.conn, fact, default_day)?;
        Ok(())
    }

    fn add_fact(&mut self, fact: &Fact, temporary: bool) -> Result<FactId, StoreError> {
        Ok(self.write(|conn, changes| insert_fact(conn, fact, temporary, changes))?)
    }

    fn remove_fact(&mut self, id: FactId) -> Result<(), StoreError> {
        Ok(self.write(|conn, changes| {
            let deleted = conn.execute("DELETE FROM facts WHERE id = ?1", params![id.get()])?;
            if deleted == 0 {
                return Err(not_found("fact", id.get()));
            }
            changes.facts = true;
            tracing::debug!(%id, "removed fact");
            Ok(())
        })?)
    }

    fn update_fact(
        &mut self,
        id: FactId,
        fact: &Fact,
        temporary: bool,
    ) -> Result<FactId, StoreError> {
        Ok(self.write(|conn, changes| {
            let deleted = conn.execute("DELETE FROM facts WHERE id = ?1", params![id.get()])?;
            if deleted == 0 {
                return Err(not_found("fact", id.get()));
            }
            let replacement = Fact {
                id: None,
                ..fact.clone()
            };
            let new_id = insert_fact(conn, &replacement, temporary, changes)?;
            tracing::debug!(old = %id, new = %new_id, "replaced fact");
            Ok(new_id)
        })?)
    }

    fn stop_tracking(&mut self, end: NaiveDateTime) -> Result<Option<FactId>, StoreError> {
        Ok(self.write(|conn, changes| {
            let ongoing = query_facts(
                conn,
                "WHERE f.end_time IS NULL ORDER BY f.start_time DESC, f.id DESC LIMIT 1",
                [],
            )?;
            let Some(fact) = ongoing.into_iter().next() else {
                return Ok(None);
            };
            close_fact(conn, &fact, end, changes).map(Some)
        })?)
    }

    fn stop_or_restart_tracking(
        &mut self,
        now: NaiveDateTime,
    ) -> Result<TrackingToggle, StoreError> {
        Ok(self.write(|conn, changes| {
            let latest = query_facts(
                conn,
                "ORDER BY f.start_time DESC, f.id DESC LIMIT 1",
                [],
            )?;
            let Some(fact) = latest.into_iter().next() else {
                return Ok(TrackingToggle::Idle);
            };
            if fact.is_ongoing() {
                return close_fact(conn, &fact, now, changes).map(TrackingToggle::Stopped);
            }
            let restarted = Fact {
                id: None,
                activity_id: None,
                start_time: Some(now),
                end_time: None,
                ..fact
            };
            insert_fact(conn, &restarted, false, changes).map(TrackingToggle::Restarted)
        })?)
    }

    fn get_category_activities(
        &mut self,
        category: Option<CategoryId>,
    ) -> Result<Vec<Activity>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{ACTIVITY_SELECT} WHERE a.deleted = 0 AND a.category_id IS ?1 ORDER BY a.search_name ASC"
            ))
            .map_err(DbError::from)?;
        let rows = stmt
            .query_map(params![category.map(CategoryId::get)], activity_from_row)
            .map_err(DbError::from)?;
        let mut activities = Vec::new();
        for row in rows {
            activities.push(row.map_err(DbError::from)?);
        }
        Ok(activities)
    }

    fn get_category_id(&mut self, name: &str) -> Result<Option<CategoryId>, StoreError> {
        Ok(find_category(&self.conn, name)?)
    }

    fn get_activity_by_name(
        &mut self,
        name: &str,
        category: Option<CategoryId>,
        resurrect: bool,
    ) -> Result<Option<Activity>, StoreError> {
        let found = find_activity(&self.conn, name, category)?;
        match found {
            Some(activity) if activity.deleted && resurrect => {
                Ok(Some(self.write(|conn, changes| {
                    undelete_activity(conn, activity.id, changes)?;
                    Ok(Activity {
                        deleted: false,
                        ..activity
                    })
                })?))
            }
            other => Ok(other),
        }
    }

    fn add_activity(
        &mut self,
        name: &str,
        category: Option<CategoryId>,
    ) -> Result<ActivityId, StoreError> {
        Ok(self.write(|conn, changes| {
            if let Some(category) = category {
                ensure_category_exists(conn, category)?;
            }
            get_or_create_activity(conn, name, category, false, changes)
        })?)
    }

    fn update_activity(
        &mut self,
        id: ActivityId,
        name: &str,
        category: Option<CategoryId>,
    ) -> Result<(), StoreError> {
        Ok(self.write(|conn, changes| {
            let name = required_name(name, "activity")?;
            ensure_activity_exists(conn, id)?;
            if let Some(category) = category {
                ensure_category_exists(conn, category)?;
            }
            if let Some(existing) = find_activity(conn, name, category)? {
                if existing.id != id && !existing.deleted {
                    return Err(ValidationError::Duplicate {
                        kind: "activity",
                        name: name.to_string(),
                    }
                    .into());
                }
            }
            conn.execute(
                "UPDATE activities SET name = ?1, search_name = ?2, category_id = ?3 WHERE id = ?4",
                params![
                    name,
                    name.to_lowercase(),
                    category.map(CategoryId::get),
                    id.get()
                ],
            )?;
            changes.activities = true;
            changes.facts = true;
            Ok(())
        })?)
    }

    fn remove_activity(&mut self, id: ActivityId) -> Result<(), StoreError> {
        Ok(self.write(|conn, changes| {
            ensure_activity_exists(conn, id)?;
            let referenced: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM facts WHERE activity_id = ?1)",
                params![id.get()],
                |row| row.get(0),
            )?;
            if referenced {
                conn.execute(
                    "UPDATE activities SET deleted = 1 WHERE id = ?1",
                    params![id.get()],
                )?;
                tracing::debug!(%id, "soft-deleted activity");
            } else {
                conn.execute("DELETE FROM activities WHERE id = ?1", params![id.get()])?;
                tracing::debug!(%id, "deleted activity");
            }
            changes.activities = true;
            Ok(())
        })?)
    }

    fn change_category(
        &mut self,
        id: ActivityId,
        category: Option<CategoryId>,
    ) -> Result<bool, StoreError> {
        Ok(self.write(|conn, changes| {
            if let Some(category) = category {
                ensure_category_exists(conn, category)?;
            }
            move_activity(conn, id, category, changes)
        })?)
    }

    fn add_category(&mut self, name: &str) -> Result<CategoryId, StoreError> {
        Ok(self.write(|conn, changes| get_or_create_category(conn, name, changes))?)
    }

    fn update_category(&mut self, id: CategoryId, name: &str) -> Result<(), StoreError> {
        Ok(self.write(|conn, changes| {
            let name = category_name(name)?;
            ensure_category_exists(conn, id)?;
            if let Some(existing) = find_category(conn, name)? {
                if existing != id {
                    return Err(ValidationError::Duplicate {
                        kind: "category",
                        name: name.to_string(),
                    }
                    .into());
                }
            }
            conn.execute(
                "UPDATE categories SET name = ?1, search_name = ?2 WHERE id = ?3",
                params![name, name.to_lowercase(), id.get()],
            )?;
            changes.activities = true;
            changes.facts = true;
            Ok(())
        })?)
    }

    fn remove_category(&mut self, id: CategoryId) -> Result<(), StoreError> {
        Ok(self.write(|conn, changes| {
            ensure_category_exists(conn, id)?;
            let members = {
                let mut stmt = conn.prepare("SELECT id FROM activities WHERE category_id = ?1")?;
                let rows = stmt.query_map(params![id.get()], |row| id_column(row, 0))?;
                let mut members: Vec<ActivityId> = Vec::new();
                for row in rows {
                    members.push(row?);
                }
                members
            };
            for activity in members {
                move_activity(conn, activity, None, changes)?;
            }
            conn.execute("DELETE FROM categories WHERE id = ?1", params![id.get()])?;
            changes.activities = true;
            tracing::debug!(%id, "removed category");
            Ok(())
        })?)
    }

    fn take_changes(&mut self) -> Changes {
        std::mem::take(&mut self.pending)
    }
}

struct FactRow {
    id: FactId,
    activity_id: ActivityId,
    activity: String,
    category: Option<String>,
    start_time: String,
    end_time: Option<String>,
    description: String,
}

impl FactRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: id_column(row, 0)?,
            activity_id: id_column(row, 1)?,
            activity: row.get(2)?,
            category: row.get(3)?,
            start_time: row.get(4)?,
            end_time: row.get(5)?,
            description: row.get(6)?,
        })
    }

    fn into_fact(self, tags: Vec<String>) -> Result<Fact, DbError> {
        let fact_id = self.id.get();
        let start_time = parse_timestamp(&self.start_time, fact_id)?;
        let end_time = self
            .end_time
            .as_deref()
            .map(|end| parse_timestamp(end, fact_id))
            .transpose()?;
        Ok(Fact {
            id: Some(self.id),
            activity: self.activity,
            activity_id: Some(self.activity_id),
            category: self.category,
            start_time: Some(start_time),
            end_time,
            description: self.description,
            tags,
        })
    }
}

fn query_facts<P: rusqlite::Params>(
    conn: &Connection,
    clause: &str,
    params: P,
) -> Result<Vec<Fact>, DbError> {
    let rows = {
        let mut stmt = conn.prepare(&format!("{FACT_SELECT} {clause}"))?;
        let rows = stmt.query_map(params, FactRow::from_row)?;
        let mut collected = Vec::new();
        for row in rows {
            collected.push(row?);
        }
        collected
    };
    let mut facts = Vec::with_capacity(rows.len());
    for row in rows {
        let tags = fact_tags(conn, row.id)?;
        facts.push(row.into_fact(tags)?);
    }
    Ok(facts)
}

fn fetch_fact(conn: &Connection, id: FactId) -> Result<Option<Fact>, DbError> {
    let facts = query_facts(conn, "WHERE f.id = ?1", params![id.get()])?;
    Ok(facts.into_iter().next())
}

fn fact_tags(conn: &Connection, fact_id: FactId) -> Result<Vec<String>, DbError> {
    let mut stmt = conn.prepare(
        "
        SELECT t.name
        FROM fact_tags ft
        JOIN tags t ON t.id = ft.tag_id
        WHERE ft.fact_id = ?1
        ORDER BY ft.rowid ASC
        ",
    )?;
    let rows = stmt.query_map(params![fact_id.get()], |row| row.get(0))?;
    let mut tags = Vec::new();
    for row in rows {
        tags.push(row?);
    }
    Ok(tags)
}

/// Runs the validator and the overlap check against facts that could collide.
fn check_against_stored(
    conn: &Connection,
    fact: &Fact,
    default_day: Option<NaiveDate>,
) -> Result<Vec<Fact>, DbError> {
    validate_fact(fact)?;
    let start = fact
        .start_time
        .ok_or(ValidationError::MissingStartTime)?;
    let candidates = query_facts(
        conn,
        "WHERE (f.end_time IS NULL OR f.end_time > ?1)
           AND (?2 IS NULL OR f.start_time < ?2)
         ORDER BY f.start_time ASC, f.id ASC",
        params![format_timestamp(start), fact.end_time.map(format_timestamp)],
    )?;
    check_overlap(fact, &candidates, default_day)?;
    Ok(candidates)
}

fn insert_fact(
    conn: &Connection,
    fact: &Fact,
    temporary: bool,
    changes: &mut Changes,
) -> Result<FactId, DbError> {
    let candidates = check_against_stored(conn, fact, None)?;
    let start = fact
        .start_time
        .ok_or(ValidationError::MissingStartTime)?;

    for other in candidates.iter().filter(|other| supersedes(fact, other)) {
        close_fact(conn, other, start, changes)?;
    }

    let category = match fact.category_name() {
        Some(name) => Some(get_or_create_category(conn, name, changes)?),
        None => None,
    };
    let activity = get_or_create_activity(conn, &fact.activity, category, temporary, changes)?;
    let tags = resolve_tags(conn, &fact.tags, changes)?;

    conn.execute(
        "INSERT INTO facts (activity_id, start_time, end_time, description) VALUES (?1, ?2, ?3, ?4)",
        params![
            activity.get(),
            format_timestamp(start),
            fact.end_time.map(format_timestamp),
            fact.description.trim(),
        ],
    )?;
    let id = row_id::<FactId>(conn.last_insert_rowid())?;

    let mut stmt = conn.prepare("INSERT OR IGNORE INTO fact_tags (fact_id, tag_id) VALUES (?1, ?2)")?;
    for tag in &tags {
        stmt.execute(params![id.get(), tag.id.get()])?;
    }
    changes.facts = true;
    tracing::debug!(%id, activity = %fact.activity, "inserted fact");
    Ok(id)
}

fn close_fact(
    conn: &Connection,
    fact: &Fact,
    end: NaiveDateTime,
    changes: &mut Changes,
) -> Result<FactId, DbError> {
    let id = fact.id.ok_or_else(|| not_found("fact", 0))?;
    validate_fact(&Fact {
        end_time: Some(end),
        ..fact.clone()
    })?;
    conn.execute(
        "UPDATE facts SET end_time = ?1 WHERE id = ?2",
        params![format_timestamp(end), id.get()],
    )?;
    changes.facts = true;
    tracing::debug!(%id, "stopped fact");
    Ok(id)
}

/// Resolves each label to a tag, in input order.
fn resolve_tags(
    conn: &Connection,
    names: &[String],
    changes: &mut Changes,
) -> Result<Vec<Tag>, DbError> {
    let mut tags = Vec::with_capacity(names.len());
    for name in names {
        let name = required_name(name, "tag")?;
        let existing = conn
            .query_row(
                "SELECT id, name, autocomplete, deleted FROM tags WHERE search_name = ?1",
                params![name.to_lowercase()],
                tag_from_row,
            )
            .optional()?;
        let tag = match existing {
            Some(tag) if tag.deleted => {
                conn.execute(
                    "UPDATE tags SET deleted = 0 WHERE id = ?1",
                    params![tag.id.get()],
                )?;
                changes.tags = true;
                tracing::debug!(tag = %tag.name, "resurrected tag");
                Tag {
                    deleted: false,
                    ..tag
                }
            }
            Some(tag) => tag,
            None => {
                conn.execute(
                    "INSERT INTO tags (name, search_name) VALUES (?1, ?2)",
                    params![name, name.to_lowercase()],
                )?;
                changes.tags = true;
                Tag {
                    id: row_id(conn.last_insert_rowid())?,
                    name: name.to_string(),
                    autocomplete: true,
                    deleted: false,
                }
            }
        };
        tags.push(tag);
    }
    Ok(tags)
}

fn find_category(conn: &Connection, name: &str) -> Result<Option<CategoryId>, DbError> {
    Ok(conn
        .query_row(
            "SELECT id FROM categories WHERE search_name = ?1",
            params![name.trim().to_lowercase()],
            |row| id_column(row, 0),
        )
        .optional()?)
}

fn get_or_create_category(
    conn: &Connection,
    name: &str,
    changes: &mut Changes,
) -> Result<CategoryId, DbError> {
    let name = category_name(name)?;
    if let Some(id) = find_category(conn, name)? {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO categories (name, search_name) VALUES (?1, ?2)",
        params![name, name.to_lowercase()],
    )?;
    changes.activities = true;
    tracing::debug!(category = name, "created category");
    row_id(conn.last_insert_rowid())
}

/// Finds an activity by name within a category, preferring live records.
fn find_activity(
    conn: &Connection,
    name: &str,
    category: Option<CategoryId>,
) -> Result<Option<Activity>, DbError> {
    Ok(conn
        .query_row(
            &format!(
                "{ACTIVITY_SELECT}
                 WHERE a.search_name = ?1 AND a.category_id IS ?2
                 ORDER BY a.deleted ASC, a.id ASC
                 LIMIT 1"
            ),
            params![name.trim().to_lowercase(), category.map(CategoryId::get)],
            activity_from_row,
        )
        .optional()?)
}

fn get_or_create_activity(
    conn: &Connection,
    name: &str,
    category: Option<CategoryId>,
    temporary: bool,
    changes: &mut Changes,
) -> Result<ActivityId, DbError> {
    let name = required_name(name, "activity")?;
    if let Some(activity) = find_activity(conn, name, category)? {
        if activity.deleted && !temporary {
            undelete_activity(conn, activity.id, changes)?;
        }
        return Ok(activity.id);
    }
    conn.execute(
        "INSERT INTO activities (name, search_name, category_id, deleted) VALUES (?1, ?2, ?3, ?4)",
        params![
            name,
            name.to_lowercase(),
            category.map(CategoryId::get),
            temporary
        ],
    )?;
    changes.activities = true;
    tracing::debug!(activity = name, temporary, "created activity");
    row_id(conn.last_insert_rowid())
}

fn undelete_activity(
    conn: &Connection,
    id: ActivityId,
    changes: &mut Changes,
) -> Result<(), DbError> {
    conn.execute(
        "UPDATE activities SET deleted = 0 WHERE id = ?1",
        params![id.get()],
    )?;
    changes.activities = true;
    tracing::debug!(%id, "resurrected activity");
    Ok(())
}

/// Moves an activity to `category`, merging into a same-named activity there.
fn move_activity(
    conn: &Connection,
    id: ActivityId,
    category: Option<CategoryId>,
    changes: &mut Changes,
) -> Result<bool, DbError> {
    let activity = conn
        .query_row(
            &format!("{ACTIVITY_SELECT} WHERE a.id = ?1"),
            params![id.get()],
            activity_from_row,
        )
        .optional()?
        .ok_or_else(|| not_found("activity", id.get()))?;
    if activity.category_id == category {
        return Ok(false);
    }

    let target = find_activity(conn, &activity.name, category)?;
    let merged = match target {
        Some(target) => {
            conn.execute(
                "UPDATE facts SET activity_id = ?1 WHERE activity_id = ?2",
                params![target.id.get(), id.get()],
            )?;
            conn.execute("DELETE FROM activities WHERE id = ?1", params![id.get()])?;
            if target.deleted && !activity.deleted {
                undelete_activity(conn, target.id, changes)?;
            }
            changes.facts = true;
            tracing::debug!(from = %id, into = %target.id, "merged activity");
            true
        }
        None => {
            conn.execute(
                "UPDATE activities SET category_id = ?1 WHERE id = ?2",
                params![category.map(CategoryId::get), id.get()],
            )?;
            changes.facts = true;
            false
        }
    };
    changes.activities = true;
    Ok(merged)
}

fn ensure_activity_exists(conn: &Connection, id: ActivityId) -> Result<(), DbError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM activities WHERE id = ?1)",
        params![id.get()],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(not_found("activity", id.get()))
    }
}

fn ensure_category_exists(conn: &Connection, id: CategoryId) -> Result<(), DbError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?1)",
        params![id.get()],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(not_found("category", id.get()))
    }
}

fn required_name<'a>(name: &'a str, field: &'static str) -> Result<&'a str, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(name)
}

fn category_name(name: &str) -> Result<&str, ValidationError> {
    let name = required_name(name, "category")?;
    if name.contains(',') {
        return Err(ValidationError::ForbiddenComma {
            field: "category",
            value: name.to_string(),
        });
    }
    Ok(name)
}

const fn not_found(kind: &'static str, id: i64) -> DbError {
    DbError::NotFound { kind, id }
}

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: id_column(row, 0)?,
        name: row.get(1)?,
        category_id: optional_id_column(row, 2)?,
        category: row.get(3)?,
        deleted: row.get(4)?,
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: id_column(row, 0)?,
        name: row.get(1)?,
        autocomplete: row.get(2)?,
        deleted: row.get(3)?,
    })
}

fn id_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: TryFrom<i64, Error = ValidationError>,
{
    let raw: i64 = row.get(idx)?;
    T::try_from(raw).map_err(|err| conversion_error(idx, err))
}

fn optional_id_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: TryFrom<i64, Error = ValidationError>,
{
    let raw: Option<i64> = row.get(idx)?;
    raw.map(T::try_from)
        .transpose()
        .map_err(|err| conversion_error(idx, err))
}

fn conversion_error(idx: usize, err: ValidationError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(err))
}

fn row_id<T>(raw: i64) -> Result<T, DbError>
where
    T: TryFrom<i64, Error = ValidationError>,
{
    Ok(T::try_from(raw)?)
}

fn parse_timestamp(timestamp: &str, fact_id: i64) -> Result<NaiveDateTime, DbError> {
    NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).map_err(|source| {
        DbError::TimestampParse {
            fact_id,
            timestamp: timestamp.to_string(),
            source,
        }
    })
}

fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

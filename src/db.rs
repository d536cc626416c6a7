//! Database module for Pollsmith
//!
//! Provides persistence for polls, their options, the message references
//! used to refresh rendered polls, and the poll each user is working on.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Poll not found: {0}")]
    PollNotFound(i64),
    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

const POLL_COLUMNS: &str =
    "id, user_id, name, description, vote_type, number_of_votes, expected_input, created, created_at";

const REFERENCE_COLUMNS: &str = "id, poll_id, kind, chat_id, message_id, created_at";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // ==================== Poll Operations ====================

    /// Create a poll that waits for its name
    pub fn create_poll(&self, user_id: i64, vote_type: VoteType) -> DbResult<Poll> {
        let conn = self.conn()?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO polls (user_id, vote_type, expected_input, created, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
            params![
                user_id,
                vote_type.as_str(),
                ExpectedInput::Name.as_str(),
                now.to_rfc3339()
            ],
        )?;

        let mut poll = Poll::draft(conn.last_insert_rowid(), user_id, vote_type);
        poll.created_at = now;
        Ok(poll)
    }

    /// Get poll by ID, options in display order
    pub fn get_poll(&self, id: i64) -> DbResult<Poll> {
        let conn = self.conn()?;

        let mut poll = conn
            .query_row(
                &format!("SELECT {POLL_COLUMNS} FROM polls WHERE id = ?1"),
                params![id],
                parse_poll_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DbError::PollNotFound(id),
                other => DbError::Sqlite(other),
            })?;

        let mut stmt = conn.prepare(
            "SELECT name FROM poll_options WHERE poll_id = ?1 ORDER BY position ASC",
        )?;
        poll.options = stmt
            .query_map(params![id], |row| Ok(PollOption::new(row.get::<_, String>(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(poll)
    }

    /// Persist a poll's mutable fields and any options not stored yet.
    ///
    /// Options are append-only, so everything past the stored count is new.
    pub fn save_poll(&self, poll: &Poll) -> DbResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let updated = tx.execute(
            "UPDATE polls SET name = ?1, description = ?2, number_of_votes = ?3,
                              expected_input = ?4, created = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                poll.name,
                poll.description,
                poll.number_of_votes,
                poll.expected_input.as_str(),
                poll.created,
                now.to_rfc3339(),
                poll.id,
            ],
        )?;

        if updated == 0 {
            return Err(DbError::PollNotFound(poll.id));
        }

        let stored: usize = tx.query_row(
            "SELECT COUNT(*) FROM poll_options WHERE poll_id = ?1",
            params![poll.id],
            |row| row.get(0),
        )?;

        for (position, option) in poll.options.iter().enumerate().skip(stored) {
            tx.execute(
                "INSERT INTO poll_options (poll_id, position, name) VALUES (?1, ?2, ?3)",
                params![poll.id, position, option.name],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    // ==================== User Operations ====================

    /// Point a user at the poll they are creating or editing
    pub fn set_current_poll(&self, user_id: i64, poll_id: Option<i64>) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (id, current_poll_id, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET current_poll_id = excluded.current_poll_id,
                                           updated_at = excluded.updated_at",
            params![user_id, poll_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_current_poll(&self, user_id: i64) -> DbResult<Option<i64>> {
        let conn = self.conn()?;
        let current = conn
            .query_row(
                "SELECT current_poll_id FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?;
        Ok(current.flatten())
    }

    // ==================== Reference Operations ====================

    /// Retire every admin reference for (poll, chat) and record the new one.
    ///
    /// Runs in one transaction: readers see either the old reference or the
    /// new one, never zero or two.
    pub fn replace_admin_reference(
        &self,
        poll_id: i64,
        chat_id: i64,
        message_id: i64,
    ) -> DbResult<Reference> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let retired = tx.execute(
            "DELETE FROM poll_references WHERE poll_id = ?1 AND chat_id = ?2 AND kind = 'admin'",
            params![poll_id, chat_id],
        )?;
        let reference = insert_reference(&tx, poll_id, ReferenceKind::Admin, chat_id, message_id)?;

        tx.commit()?;

        tracing::debug!(poll_id, chat_id, message_id, retired, "Replaced admin reference");
        Ok(reference)
    }

    /// Record a message showing the poll
    pub fn add_reference(
        &self,
        poll_id: i64,
        kind: ReferenceKind,
        chat_id: i64,
        message_id: i64,
    ) -> DbResult<Reference> {
        let conn = self.conn()?;
        insert_reference(&conn, poll_id, kind, chat_id, message_id)
    }

    pub fn list_references(&self, poll_id: i64) -> DbResult<Vec<Reference>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REFERENCE_COLUMNS} FROM poll_references WHERE poll_id = ?1 ORDER BY id ASC"
        ))?;

        let rows = stmt.query_map(params![poll_id], parse_reference_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

fn insert_reference(
    conn: &Connection,
    poll_id: i64,
    kind: ReferenceKind,
    chat_id: i64,
    message_id: i64,
) -> DbResult<Reference> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO poll_references (poll_id, kind, chat_id, message_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![poll_id, kind.as_str(), chat_id, message_id, now.to_rfc3339()],
    )?;

    Ok(Reference {
        id: conn.last_insert_rowid(),
        poll_id,
        kind,
        chat_id,
        message_id,
        created_at: now,
    })
}

/// Parse a poll row; options are loaded separately
fn parse_poll_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Poll> {
    let vote_type = row
        .get::<_, String>(4)?
        .parse::<VoteType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let expected_input = row
        .get::<_, String>(6)?
        .parse::<ExpectedInput>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(Poll {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        options: Vec::new(),
        vote_type,
        number_of_votes: row.get(5)?,
        expected_input,
        created: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn parse_reference_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reference> {
    let kind = row
        .get::<_, String>(2)?
        .parse::<ReferenceKind>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Reference {
        id: row.get(0)?,
        poll_id: row.get(1)?,
        kind,
        chat_id: row.get(3)?,
        message_id: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

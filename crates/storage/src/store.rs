//! SQLite event store implementation.

use crate::{CourseId, Error, Event, Result};
use rusqlite::{Connection, Params, Row, Transaction, TransactionBehavior, params};
use std::path::Path;
use std::time::Duration;

/// How long a writer waits for another connection's write lock.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_EVENTS: &str = "SELECT seq, id, timestamp, data FROM events";

/// SQLite-backed, append-only event store.
#[derive(Debug)]
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// Open or create an event store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory event store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                course_id INTEGER,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_course
                ON events(course_id, seq);
            "#,
        )?;
        Ok(())
    }

    /// Append an event to the store without checking what precedes it.
    pub fn append(&self, event: &Event) -> Result<()> {
        insert_event(&self.conn, event)
    }

    /// Take the database write lock for a checked append.
    ///
    /// Other connections to the same file cannot write until the returned
    /// [`AppendTx`] is committed or dropped. Dropping it rolls back.
    pub fn begin_append(&mut self) -> Result<AppendTx<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(AppendTx { tx })
    }

    /// Load the whole journal in append order.
    pub fn load_all(&self) -> Result<Vec<Event>> {
        self.load_events(None)
    }

    /// Load events in append order, optionally filtered by kind name
    /// (`course_created`, `student_enrolled`, `grade_posted`, ...).
    pub fn load_events(&self, kind_filter: Option<&str>) -> Result<Vec<Event>> {
        match kind_filter {
            Some(kind) => query_events(
                &self.conn,
                &format!("{SELECT_EVENTS} WHERE kind = ?1 ORDER BY seq"),
                params![kind],
            ),
            None => query_events(
                &self.conn,
                &format!("{SELECT_EVENTS} ORDER BY seq"),
                params![],
            ),
        }
    }

    /// Load every event that concerns one course, in append order.
    pub fn load_course(&self, course_id: CourseId) -> Result<Vec<Event>> {
        query_events(
            &self.conn,
            &format!("{SELECT_EVENTS} WHERE course_id = ?1 ORDER BY seq"),
            params![course_key(course_id)?],
        )
    }

    /// Number of stored events.
    pub fn count(&self) -> Result<u64> {
        count_events(&self.conn)
    }
}

/// A write-locked view of the store, see [`EventStore::begin_append`].
pub struct AppendTx<'a> {
    tx: Transaction<'a>,
}

impl AppendTx<'_> {
    /// Number of stored events, including ones written by other connections.
    pub fn count(&self) -> Result<u64> {
        count_events(&self.tx)
    }

    /// Events after the first `offset`, in append order.
    pub fn load_since(&self, offset: u64) -> Result<Vec<Event>> {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        query_events(
            &self.tx,
            &format!("{SELECT_EVENTS} ORDER BY seq LIMIT -1 OFFSET ?1"),
            params![offset],
        )
    }

    pub fn append(&self, event: &Event) -> Result<()> {
        insert_event(&self.tx, event)
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}

fn course_key(course_id: CourseId) -> Result<i64> {
    i64::try_from(course_id.0).map_err(|_| Error::CourseIdOverflow(course_id))
}

fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let course_id = event.kind.course_id().map(course_key).transpose()?;
    conn.execute(
        "INSERT INTO events (id, timestamp, kind, course_id, data) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.id.to_string(),
            event.timestamp.to_rfc3339(),
            event.kind.name(),
            course_id,
            serde_json::to_string(&event.kind)?,
        ],
    )?;
    Ok(())
}

fn count_events(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
    Ok(n as u64)
}

fn query_events(conn: &Connection, sql: &str, params: impl Params) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, raw_row)?;
    rows.map(|r| decode(r?)).collect()
}

type RawRow = (i64, String, String, String);

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode((seq, id, timestamp, data): RawRow) -> Result<Event> {
    let corrupt = |reason: String| Error::Corrupt { seq, reason };

    Ok(Event {
        id: id.parse().map_err(|e| corrupt(format!("bad id: {e}")))?,
        timestamp: timestamp
            .parse()
            .map_err(|e| corrupt(format!("bad timestamp: {e}")))?,
        kind: serde_json::from_str(&data).map_err(|e| corrupt(format!("bad data: {e}")))?,
    })
}

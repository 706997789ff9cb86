use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, params};
use uuid::Uuid;

use super::models::*;

const ISSUE_COLUMNS: &str = "id, image_reference, category, city, specific_area, description, \
     issue_date, status, last_status_update_notes, created_at, updated_at";

/// Async-safe handle to the issue store.
///
/// Wraps `IssueDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`. Each closure holds the lock for
/// its whole body, so a read-modify-write inside one `call` is atomic.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<IssueDb>>,
}

impl DbHandle {
    pub fn new(db: IssueDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R, E>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&IssueDb) -> std::result::Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: From<anyhow::Error> + Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| E::from(anyhow::anyhow!("DB lock poisoned: {}", e)))?;
            f(&guard)
        })
        .await
        .map_err(|e| E::from(anyhow::anyhow!("DB task panicked: {}", e)))?
    }

    /// Acquire the database mutex synchronously. Only for startup and tests.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, IssueDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub struct IssueDb {
    conn: Connection,
}

impl IssueDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .context("Failed to enable WAL journal")?;
        register_functions(&conn)?;
        let db = Self { conn };
        db.run_migrations().context("Failed to run migrations")?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        register_functions(&conn)?;
        let db = Self { conn };
        db.run_migrations().context("Failed to run migrations")?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS issues (
                    id TEXT PRIMARY KEY NOT NULL,
                    image_reference TEXT NOT NULL,
                    category TEXT NOT NULL CHECK (length(trim(category)) > 0),
                    city TEXT NOT NULL CHECK (length(trim(city)) > 0),
                    specific_area TEXT,
                    description TEXT,
                    issue_date INTEGER NOT NULL,
                    status TEXT NOT NULL DEFAULT 'reported'
                        CHECK (status IN ('reported', 'in_progress', 'resolved', 'rejected')),
                    last_status_update_notes TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_issues_created ON issues(created_at);
                CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Writes ────────────────────────────────────────────────────────

    /// Insert a new issue in its initial state and return it as stored.
    ///
    /// `created_at` is the wall clock in microseconds, bumped past the newest
    /// existing record so the sequence is strictly increasing even when the
    /// clock stalls or steps backwards.
    pub fn insert_issue(&self, new: &NewIssue) -> Result<Issue> {
        let newest: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(created_at), 0) FROM issues", [], |row| {
                row.get(0)
            })
            .context("Failed to read newest created_at")?;
        let created_at = Utc::now().timestamp_micros().max(newest + 1);
        let id = Uuid::new_v4();

        self.conn
            .execute(
                "INSERT INTO issues (id, image_reference, category, city, specific_area, description,
                     issue_date, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    id.to_string(),
                    new.image_reference,
                    new.category,
                    new.location.city,
                    new.location.specific_area,
                    new.description,
                    new.issue_date.timestamp_micros(),
                    IssueStatus::INITIAL.as_str(),
                    created_at,
                ],
            )
            .context("Failed to insert issue")?;
        self.get_issue(id)?.context("Issue not found after insert")
    }

    /// Replace every mutable field of a stored issue in one statement.
    /// Returns `None` when no issue has that id.
    ///
    /// `updated_at` never precedes `created_at`, which may run ahead of the
    /// wall clock after an insert bumped it.
    pub fn replace_issue(&self, issue: &Issue) -> Result<Option<Issue>> {
        let updated_at = Utc::now()
            .timestamp_micros()
            .max(issue.created_at.timestamp_micros());
        let count = self
            .conn
            .execute(
                "UPDATE issues
                 SET description = ?1, status = ?2, last_status_update_notes = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    issue.description,
                    issue.status.as_str(),
                    issue.last_status_update_notes,
                    updated_at,
                    issue.id.to_string(),
                ],
            )
            .context("Failed to update issue")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_issue(issue.id)
    }

    // ── Reads ─────────────────────────────────────────────────────────

    pub fn get_issue(&self, id: Uuid) -> Result<Option<Issue>> {
        let mut issues = self.select_issues("WHERE id = ?1", params![id.to_string()])?;
        Ok(issues.pop())
    }

    /// Every issue, newest first.
    pub fn list_issues(&self) -> Result<Vec<Issue>> {
        self.select_issues("", [])
    }

    /// Issues whose category contains `needle`, ignoring case.
    pub fn find_by_category(&self, needle: &str) -> Result<Vec<Issue>> {
        self.select_issues(
            "WHERE instr(unicode_lower(category), unicode_lower(?1)) > 0",
            params![needle],
        )
    }

    /// Issues whose city or specific area contains `needle`, ignoring case.
    pub fn find_by_location(&self, needle: &str) -> Result<Vec<Issue>> {
        self.select_issues(
            "WHERE instr(unicode_lower(city), unicode_lower(?1)) > 0
                OR instr(unicode_lower(COALESCE(specific_area, '')), unicode_lower(?1)) > 0",
            params![needle],
        )
    }

    pub fn count_issues(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))
            .context("Failed to count issues")
    }

    #[cfg(test)]
    pub(crate) fn drop_issues_table_for_test(&self) -> Result<()> {
        self.conn
            .execute_batch("DROP TABLE issues;")
            .context("Failed to drop issues table")
    }

    fn select_issues<P: rusqlite::Params>(&self, filter: &str, params: P) -> Result<Vec<Issue>> {
        let sql = format!(
            "SELECT {} FROM issues {} ORDER BY created_at DESC, rowid DESC",
            ISSUE_COLUMNS, filter
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare issue query")?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(IssueRow {
                    id: row.get(0)?,
                    image_reference: row.get(1)?,
                    category: row.get(2)?,
                    city: row.get(3)?,
                    specific_area: row.get(4)?,
                    description: row.get(5)?,
                    issue_date: row.get(6)?,
                    status: row.get(7)?,
                    last_status_update_notes: row.get(8)?,
                    created_at: row.get(9)?,
                    updated_at: row.get(10)?,
                })
            })
            .context("Failed to query issues")?;
        let mut issues = Vec::new();
        for row in rows {
            let r = row.context("Failed to read issue row")?;
            issues.push(r.into_issue()?);
        }
        Ok(issues)
    }
}

/// Intermediate row struct for reading issues from SQLite before converting
/// id / status / timestamp columns into typed values.
struct IssueRow {
    id: String,
    image_reference: String,
    category: String,
    city: String,
    specific_area: Option<String>,
    description: Option<String>,
    issue_date: i64,
    status: String,
    last_status_update_notes: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl IssueRow {
    fn into_issue(self) -> Result<Issue> {
        let id = Uuid::parse_str(&self.id).context("Failed to parse issue id")?;
        let status = IssueStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse issue status")?;

        Ok(Issue {
            id,
            image_reference: self.image_reference,
            category: self.category,
            location: Location {
                city: self.city,
                specific_area: self.specific_area,
            },
            description: self.description,
            issue_date: from_micros(self.issue_date, "issue_date")?,
            created_at: from_micros(self.created_at, "created_at")?,
            updated_at: from_micros(self.updated_at, "updated_at")?,
            status,
            last_status_update_notes: self.last_status_update_notes,
        })
    }
}

/// SQLite's built-in `lower()` folds ASCII only; searches need full Unicode
/// case folding.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|s| s.to_lowercase()))
        },
    )
    .context("Failed to register unicode_lower")
}

fn from_micros(micros: i64, column: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .with_context(|| format!("Timestamp out of range in column {}", column))
}

// ── Tests ─────────────────────────────────────────────────────────────

//! SQLite user directory
//!
//! Backs [`UserDirectory`] with a single `users` table. The connection is
//! shared behind a mutex and every query runs on the blocking pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hkers_auth::{DirectoryError, DirectoryResult, LocalAccount, NewAccount, UserDirectory};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT,
    username TEXT NOT NULL,
    oidc_sub TEXT NOT NULL UNIQUE,
    is_active INTEGER NOT NULL DEFAULT 0,
    trust_points INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
)";

const COLUMNS: &str = "id, email, username, oidc_sub, is_active, trust_points, created_at";

/// SQLite-backed user directory.
#[derive(Clone)]
pub struct SqliteDirectory {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDirectory").finish_non_exhaustive()
    }
}

fn backend(e: rusqlite::Error) -> DirectoryError {
    DirectoryError::Backend(e.to_string())
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<LocalAccount> {
    let created_at: String = row.get(6)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(LocalAccount {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        oidc_sub: row.get(3)?,
        is_active: row.get(4)?,
        trust_points: row.get(5)?,
        created_at,
    })
}

fn find_by_subject(conn: &Connection, oidc_sub: &str) -> rusqlite::Result<Option<LocalAccount>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE oidc_sub = ?1", COLUMNS),
        params![oidc_sub],
        account_from_row,
    )
    .optional()
}

fn find_by_id(conn: &Connection, id: i32) -> rusqlite::Result<Option<LocalAccount>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", COLUMNS),
        params![id],
        account_from_row,
    )
    .optional()
}

impl SqliteDirectory {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> DirectoryResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| DirectoryError::Backend(format!("create {}: {}", parent.display(), e)))?;
        }
        Self::from_connection(Connection::open(path).map_err(backend)?)
    }

    /// Private in-memory database, for tests.
    pub fn in_memory() -> DirectoryResult<Self> {
        Self::from_connection(Connection::open_in_memory().map_err(backend)?)
    }

    fn from_connection(conn: Connection) -> DirectoryResult<Self> {
        conn.execute(SCHEMA, []).map_err(backend)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> DirectoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> DirectoryResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || f(&mut conn.lock()))
            .await
            .map_err(|e| DirectoryError::Backend(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl UserDirectory for SqliteDirectory {
    async fn find_by_subject(&self, oidc_sub: &str) -> DirectoryResult<Option<LocalAccount>> {
        let oidc_sub = oidc_sub.to_string();
        self.with_conn(move |conn| find_by_subject(conn, &oidc_sub).map_err(backend))
            .await
    }

    async fn find_by_id(&self, id: i32) -> DirectoryResult<Option<LocalAccount>> {
        self.with_conn(move |conn| find_by_id(conn, id).map_err(backend))
            .await
    }

    async fn create(&self, account: NewAccount) -> DirectoryResult<LocalAccount> {
        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO users (email, username, oidc_sub, is_active, trust_points, created_at)
                 VALUES (?1, ?2, ?3, 0, 0, ?4)",
                params![
                    account.email,
                    account.username,
                    account.oidc_sub,
                    Utc::now().to_rfc3339()
                ],
            );

            match result {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    return Err(DirectoryError::Conflict(account.oidc_sub));
                }
                Err(e) => return Err(backend(e)),
            }

            let id = i32::try_from(conn.last_insert_rowid())
                .map_err(|e| DirectoryError::Backend(e.to_string()))?;
            find_by_id(conn, id)
                .map_err(backend)?
                .ok_or(DirectoryError::NotFound(id))
        })
        .await
    }

    async fn set_active(&self, id: i32, active: bool) -> DirectoryResult<LocalAccount> {
        self.with_conn(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE users SET is_active = ?1 WHERE id = ?2",
                    params![active, id],
                )
                .map_err(backend)?;
            if updated == 0 {
                return Err(DirectoryError::NotFound(id));
            }
            find_by_id(conn, id)
                .map_err(backend)?
                .ok_or(DirectoryError::NotFound(id))
        })
        .await
    }

    async fn list(&self) -> DirectoryResult<Vec<LocalAccount>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {} FROM users ORDER BY id", COLUMNS))
                .map_err(backend)?;
            let rows = stmt
                .query_map([], account_from_row)
                .map_err(backend)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(backend)?;
            Ok(rows)
        })
        .await
    }
}

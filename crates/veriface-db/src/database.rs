//! Pooled SQLite sessions.
//!
//! [`Database`] is built once at startup from a connection string and passed
//! by reference to whoever needs persistence. Each unit of work takes its own
//! [`Session`], which hands its connection back to the pool when closed or
//! dropped.

use crate::models;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("unsupported database url '{0}' (expected sqlite:// or a file path)")]
    UnsupportedUrl(String),
    #[error("database unreachable: {0}")]
    Connect(#[from] r2d2::Error),
    #[error("session already closed")]
    Closed,
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Where the backing store lives, parsed from a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Memory,
    File(PathBuf),
}

impl Location {
    /// Parse a connection string.
    ///
    /// Accepts `sqlite:///relative.db`, `sqlite:////abs/path.db`,
    /// `sqlite://:memory:`, `:memory:` and bare file paths.
    pub fn parse(url: &str) -> Result<Self, DbError> {
        let url = url.trim();
        let rest = match url.split_once("://") {
            Some(("sqlite", rest)) => rest.strip_prefix('/').unwrap_or(rest),
            Some(_) => return Err(DbError::UnsupportedUrl(url.to_string())),
            None => url,
        };

        match rest {
            "" | ":memory:" => Ok(Location::Memory),
            path => Ok(Location::File(PathBuf::from(path))),
        }
    }
}

/// Pool tuning.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_size: u32,
    /// How long `session()` waits before reporting the store unreachable.
    pub connect_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 5,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct TracingErrorHandler;

impl r2d2::HandleError<rusqlite::Error> for TracingErrorHandler {
    fn handle_error(&self, error: rusqlite::Error) {
        tracing::warn!(error = %error, "sqlite connection attempt failed");
    }
}

/// Session factory over a connection pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
    location: Location,
}

impl Database {
    /// Build the pool. Connections open lazily, so an unreachable store
    /// surfaces on the first [`session`](Self::session), not here.
    pub fn connect(url: &str, options: &PoolOptions) -> Result<Self, DbError> {
        let location = Location::parse(url)?;

        let manager = match &location {
            Location::Memory => SqliteConnectionManager::memory(),
            Location::File(path) => SqliteConnectionManager::file(path),
        }
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));

        let builder = Pool::<SqliteConnectionManager>::builder()
            .connection_timeout(options.connect_timeout)
            .error_handler(Box::new(TracingErrorHandler));

        // Every in-memory connection is its own database; keep exactly one alive.
        let builder = match &location {
            Location::Memory => builder.max_size(1).idle_timeout(None).max_lifetime(None),
            Location::File(_) => builder.max_size(options.max_size.max(1)),
        };

        let pool = builder.build_unchecked(manager);
        tracing::info!(location = ?location, max_size = pool.max_size(), "database pool created");

        Ok(Self { pool, location })
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Acquire a session. Fails with [`DbError::Connect`] if the store is unreachable.
    pub fn session(&self) -> Result<Session, DbError> {
        let conn = self.pool.get()?;
        tracing::trace!("session opened");
        Ok(Session { conn: Some(conn) })
    }

    /// Run `f` with a fresh session and close it afterwards, whether `f`
    /// succeeds, fails or panics.
    pub fn with_session<T, E>(&self, f: impl FnOnce(&mut Session) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let mut session = self.session()?;
        let result = f(&mut session);
        session.close();
        result
    }

    /// Create any missing tables. Safe to run on every startup.
    pub fn init_db(&self) -> Result<(), DbError> {
        self.with_session(|session| -> Result<(), DbError> {
            let tx = session.conn_mut()?.transaction()?;
            for table in models::SCHEMA {
                tx.execute_batch(table.ddl)?;
                tracing::debug!(table = table.name, "table ensured");
            }
            tx.pragma_update(None, "user_version", models::SCHEMA_VERSION)?;
            tx.commit()?;
            tracing::info!(
                tables = models::SCHEMA.len(),
                version = models::SCHEMA_VERSION,
                "database schema initialized"
            );
            Ok(())
        })
    }

    /// Round-trip a trivial query through a fresh session.
    pub fn ping(&self) -> Result<(), DbError> {
        self.with_session(|session| -> Result<(), DbError> {
            session.conn()?.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }
}

/// One unit of work against the store.
///
/// Owns its pooled connection exclusively. `rusqlite::Connection` is not
/// `Sync`, so neither is a session: sharing one across threads does not compile.
pub struct Session {
    conn: Option<PooledConnection<SqliteConnectionManager>>,
}

impl Session {
    pub fn conn(&self) -> Result<&Connection, DbError> {
        self.conn.as_deref().ok_or(DbError::Closed)
    }

    pub fn conn_mut(&mut self) -> Result<&mut Connection, DbError> {
        self.conn.as_deref_mut().ok_or(DbError::Closed)
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Return the connection to the pool. Further calls are no-ops.
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            tracing::trace!("session closed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

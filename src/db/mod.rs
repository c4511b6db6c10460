//! Database connection and transaction management.

use std::{str::FromStr as _, time::Duration};

use anyhow::{Context as _, Result};
use sqlx::{
    Sqlite, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

pub mod pagination;
pub mod tables;
pub mod util;

use util::retry_sqlite;

/// The shared connection pool.
pub type Db = SqlitePool;
/// A transaction scoped to one workflow operation.
pub type Tx = Transaction<'static, Sqlite>;

/// Current wall-clock time in milliseconds, the unit every `*_time` column uses.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Open a connection pool to `url`, creating the database file if needed.
pub async fn establish_pool(url: &str) -> Result<Db> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid database url {url:?}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

/// Apply the embedded migrations.
pub async fn migrate(db: &Db) -> Result<()> {
    sqlx::migrate!()
        .run(db)
        .await
        .context("failed to apply migrations")
}

/// Open a transaction for a multi-statement mutation.
///
/// Statements issued through the returned handle become visible only on
/// `commit()`. Dropping it uncommitted (early return, `?`, panic) rolls back.
pub async fn begin(db: &Db) -> Result<Tx> {
    retry_sqlite(|| db.begin())
        .await
        .context("failed to begin transaction")
}

//! Utility functions for working with SQLite through SQLx.

use sqlx::Error;

/// SQLite's compiled-in ceiling on bound parameters in one statement.
pub const MAX_BIND_PARAMS: usize = 32_766;
/// Upper bound on ids bound into a single `IN (...)` list.
pub const IDS_PER_STATEMENT: usize = 500;

/// SQLite result codes that indicate lock contention rather than a real failure.
const RETRY_ERRORS: &[&str] = &[
    "5",   // SQLITE_BUSY
    "261", // SQLITE_BUSY_RECOVERY
    "517", // SQLITE_BUSY_SNAPSHOT
    "773", // SQLITE_BUSY_TIMEOUT
    "6",   // SQLITE_LOCKED
];

/// Retries an asynchronous SQLite operation with SQLite's own backoff schedule.
pub async fn retry_sqlite<F, Fut, T>(operation: F) -> Result<T, Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) if is_retryable_sqlite_error(&err) => match wait_ms_sqlite(attempt, 5000) {
                Some(wait_ms) => {
                    tokio::time::sleep(std::time::Duration::from_millis(wait_ms)).await;
                    attempt += 1;
                }
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }
}

/// Checks if an error is retryable for SQLite.
fn is_retryable_sqlite_error(err: &Error) -> bool {
    matches!(
        err,
        Error::Database(db_err) if db_err
            .code()
            .is_some_and(|code| RETRY_ERRORS.contains(&&*code))
    )
}

/// Delay before retry `attempt`, or `None` once the cumulative wait would exceed `timeout`.
fn wait_ms_sqlite(attempt: usize, timeout: u64) -> Option<u64> {
    const DELAYS: [u64; 12] = [1, 2, 5, 10, 15, 20, 25, 25, 25, 50, 50, 100];
    const TOTALS: [u64; 12] = [0, 1, 3, 8, 18, 33, 53, 78, 103, 128, 178, 228];

    let (delay, prior) = match DELAYS.get(attempt) {
        Some(&delay) => (delay, TOTALS[attempt]),
        None => {
            let delay = DELAYS[DELAYS.len() - 1];
            let extra = (attempt - (DELAYS.len() - 1)) as u64;
            (delay, TOTALS[TOTALS.len() - 1] + delay * extra)
        }
    };

    (prior + delay <= timeout).then_some(delay)
}

/// Checks if an error is a unique constraint violation.
pub fn is_err_unique_violation(err: &Error) -> bool {
    matches!(err, Error::Database(db_err) if db_err.is_unique_violation())
}

use sqlx::{Executor, SqlitePool};

use crate::domain::error::RelayError;

pub async fn migrate(pool: &SqlitePool) -> Result<(), RelayError> {
    let migration = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;

    CREATE TABLE IF NOT EXISTS chat_settings (
        chat_id INTEGER PRIMARY KEY NOT NULL,
        snapshot_interval_secs INTEGER,
        updated_at_ms INTEGER NOT NULL
    );
    "#;

    pool.execute(migration)
        .await
        .map_err(|error| RelayError::Storage(format!("migration failed: {error}")))?;

    Ok(())
}

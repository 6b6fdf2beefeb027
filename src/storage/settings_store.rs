use crate::{
    domain::{error::RelayError, models::ChatSettings},
    storage::SqliteStore,
};

impl SqliteStore {
    /// Reads the settings row for a chat, creating an unconfigured row
    /// (no interval yet) when the chat is seen for the first time.
    pub async fn ensure_chat_settings(&self, chat_id: i64) -> Result<ChatSettings, RelayError> {
        let now = super::util::now_unix_ms();

        sqlx::query(
            "INSERT INTO chat_settings(chat_id, snapshot_interval_secs, updated_at_ms) \
             VALUES(?, NULL, ?) ON CONFLICT(chat_id) DO NOTHING",
        )
        .bind(chat_id)
        .bind(i64::try_from(now).unwrap_or(i64::MAX))
        .execute(self.pool())
        .await
        .map_err(|error| RelayError::Storage(format!("failed to seed chat settings: {error}")))?;

        self.get_chat_settings(chat_id).await?.ok_or_else(|| {
            RelayError::Storage(format!("chat settings row missing after seed: {chat_id}"))
        })
    }

    pub async fn get_chat_settings(
        &self,
        chat_id: i64,
    ) -> Result<Option<ChatSettings>, RelayError> {
        let row = sqlx::query_as::<_, (i64, Option<i64>, i64)>(
            "SELECT chat_id, snapshot_interval_secs, updated_at_ms \
             FROM chat_settings WHERE chat_id = ? LIMIT 1",
        )
        .bind(chat_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|error| RelayError::Storage(format!("failed to read chat settings: {error}")))?;

        Ok(row.map(|(chat_id, snapshot_interval_secs, updated_at_ms)| ChatSettings {
            chat_id,
            snapshot_interval_secs,
            updated_at_ms: u64::try_from(updated_at_ms).unwrap_or(0),
        }))
    }

    /// The configured snapshot interval, or `None` when the chat has
    /// never set one.
    pub async fn snapshot_interval(&self, chat_id: i64) -> Result<Option<i64>, RelayError> {
        Ok(self
            .get_chat_settings(chat_id)
            .await?
            .and_then(|settings| settings.snapshot_interval_secs))
    }

    pub async fn set_snapshot_interval(
        &self,
        chat_id: i64,
        interval_secs: i64,
    ) -> Result<ChatSettings, RelayError> {
        let now = super::util::now_unix_ms();

        sqlx::query(
            "INSERT INTO chat_settings(chat_id, snapshot_interval_secs, updated_at_ms) \
             VALUES(?, ?, ?) \
             ON CONFLICT(chat_id) DO UPDATE SET \
             snapshot_interval_secs = excluded.snapshot_interval_secs, \
             updated_at_ms = excluded.updated_at_ms",
        )
        .bind(chat_id)
        .bind(interval_secs)
        .bind(i64::try_from(now).unwrap_or(i64::MAX))
        .execute(self.pool())
        .await
        .map_err(|error| {
            RelayError::Storage(format!("failed to persist chat settings: {error}"))
        })?;

        Ok(ChatSettings {
            chat_id,
            snapshot_interval_secs: Some(interval_secs),
            updated_at_ms: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::SqliteStore;

    async fn open_store(temp: &tempfile::TempDir) -> SqliteStore {
        SqliteStore::connect(&temp.path().join("relay.db"))
            .await
            .expect("store should connect")
    }

    #[tokio::test]
    async fn interval_is_unconfigured_until_first_set() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = open_store(&temp).await;

        let seeded = store
            .ensure_chat_settings(42)
            .await
            .expect("settings should seed");
        assert_eq!(seeded.snapshot_interval_secs, None);
        assert_eq!(
            store.snapshot_interval(42).await.expect("read should work"),
            None
        );
    }

    #[tokio::test]
    async fn set_interval_round_trips_and_overwrites() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = open_store(&temp).await;

        store
            .set_snapshot_interval(42, 30)
            .await
            .expect("interval should persist");
        assert_eq!(
            store.snapshot_interval(42).await.expect("read should work"),
            Some(30)
        );

        store
            .set_snapshot_interval(42, 0)
            .await
            .expect("interval should persist");
        assert_eq!(
            store.snapshot_interval(42).await.expect("read should work"),
            Some(0)
        );
    }

    #[tokio::test]
    async fn chats_are_keyed_independently() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = open_store(&temp).await;

        store
            .set_snapshot_interval(1, 15)
            .await
            .expect("interval should persist");

        assert_eq!(
            store.snapshot_interval(1).await.expect("read should work"),
            Some(15)
        );
        assert_eq!(
            store.snapshot_interval(2).await.expect("read should work"),
            None
        );
    }
}

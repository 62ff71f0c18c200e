//! SQLite backend over a sqlx pool; the database file is created on connect.

use serde_json::Value;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};

use atb_core::{domain::UserId, errors::Error, utils::unix_timestamp, Result};

use crate::StoredUser;

fn storage_err(e: sqlx::Error) -> Error {
    Error::Storage(e.to_string())
}

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Accepts a bare path or a `sqlite:`/`sqlite://` URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);
        tracing::info!("Initializing SQLite pool: {path}");

        let options = SqliteConnectOptions::new()
            .create_if_missing(true)
            .filename(path);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                first_name TEXT,
                first_seen INTEGER NOT NULL,
                last_seen INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS statistics (
                stat TEXT PRIMARY KEY,
                value INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        tracing::debug!("database tables ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn add_user(
        &self,
        user_id: UserId,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, first_name, first_seen, last_seen)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(user_id.0)
        .bind(username)
        .bind(first_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<Option<StoredUser>> {
        let row = sqlx::query_as::<_, (i64, Option<String>, Option<String>, i64, i64)>(
            "SELECT user_id, username, first_name, first_seen, last_seen FROM users WHERE user_id = ?",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(
            |(id, username, first_name, first_seen, last_seen)| StoredUser {
                user_id: UserId(id),
                username,
                first_name,
                first_seen,
                last_seen,
            },
        ))
    }

    pub async fn all_user_ids(&self) -> Result<Vec<UserId>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT user_id FROM users ORDER BY first_seen, user_id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(ids.into_iter().map(UserId).collect())
    }

    pub async fn user_count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)
    }

    pub async fn set_data(&self, namespace: &str, key: &str, value: &Value) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        sqlx::query(
            r#"
            INSERT INTO kv (namespace, key, value) VALUES (?, ?, ?)
            ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(namespace)
        .bind(key)
        .bind(encoded)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    pub async fn get_data(&self, namespace: &str, key: &str) -> Result<Option<Value>> {
        let raw = sqlx::query_scalar::<_, String>(
            "SELECT value FROM kv WHERE namespace = ? AND key = ?",
        )
        .bind(namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_data(&self, namespace: &str, key: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM kv WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn increment_stat(&self, stat: &str, by: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO statistics (stat, value) VALUES (?, ?)
            ON CONFLICT(stat) DO UPDATE SET value = value + excluded.value
            "#,
        )
        .bind(stat)
        .bind(by)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    pub async fn get_stat(&self, stat: &str) -> Result<i64> {
        let v = sqlx::query_scalar::<_, i64>("SELECT value FROM statistics WHERE stat = ?")
            .bind(stat)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(v.unwrap_or(0))
    }

    pub async fn collection_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut out = vec![
            ("users".to_string(), self.user_count().await?),
            (
                "statistics".to_string(),
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM statistics")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(storage_err)?,
            ),
        ];

        let namespaces = sqlx::query_as::<_, (String, i64)>(
            "SELECT namespace, COUNT(*) FROM kv GROUP BY namespace ORDER BY namespace",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        out.extend(
            namespaces
                .into_iter()
                .map(|(ns, n)| (format!("kv:{ns}"), n)),
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Store;

    async fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.db");
        let store = Store::connect(Some(path.to_str().unwrap())).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn users_upsert_and_list() {
        let (_dir, store) = store().await;
        assert!(store.is_connected());

        store.add_user(UserId(10), Some("alice"), Some("Alice")).await.unwrap();
        store.add_user(UserId(20), None, Some("Bob")).await.unwrap();
        store.add_user(UserId(10), Some("alice2"), Some("Alice")).await.unwrap();

        let u = store.get_user(UserId(10)).await.unwrap().unwrap();
        assert_eq!(u.username.as_deref(), Some("alice2"));
        assert!(u.last_seen >= u.first_seen);

        assert_eq!(store.user_count().await.unwrap(), 2);
        let mut ids = store.all_user_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec![UserId(10), UserId(20)]);
        assert!(store.get_user(UserId(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn kv_round_trip_and_delete() {
        let (_dir, store) = store().await;
        let v = json!({"enabled": true, "words": ["spam"]});

        store.set_data("filters", "-100", &v).await.unwrap();
        assert_eq!(store.get_data("filters", "-100").await.unwrap(), Some(v));

        store.set_data("filters", "-100", &json!(1)).await.unwrap();
        assert_eq!(store.get_data("filters", "-100").await.unwrap(), Some(json!(1)));
        assert_eq!(store.get_data("other", "-100").await.unwrap(), None);

        assert!(store.delete_data("filters", "-100").await.unwrap());
        assert!(!store.delete_data("filters", "-100").await.unwrap());
    }

    #[tokio::test]
    async fn stats_increment_and_counts() {
        let (_dir, store) = store().await;
        store.increment_stat("commands_total", 1).await.unwrap();
        store.increment_stat("commands_total", 2).await.unwrap();
        store.increment_stat("cmd:ping", 1).await.unwrap();
        assert_eq!(store.get_stat("commands_total").await.unwrap(), 3);
        assert_eq!(store.get_stat("missing").await.unwrap(), 0);

        store.add_user(UserId(1), None, None).await.unwrap();
        store.set_data("notes", "a", &json!("x")).await.unwrap();
        let counts = store.collection_counts().await.unwrap();
        assert_eq!(
            counts,
            vec![
                ("users".to_string(), 1),
                ("statistics".to_string(), 2),
                ("kv:notes".to_string(), 1),
            ]
        );
    }

    #[tokio::test]
    async fn data_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("persist.db").display());

        let first = SqliteStore::connect(&url).await.unwrap();
        first.increment_stat("restarts", 1).await.unwrap();
        first.close().await;

        let second = SqliteStore::connect(&url).await.unwrap();
        assert_eq!(second.get_stat("restarts").await.unwrap(), 1);
    }
}
